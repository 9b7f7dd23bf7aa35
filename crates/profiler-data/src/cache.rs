//! Per-run memo of which addresses carry deployed code.

use alloy::primitives::Address;
use dashmap::DashMap;

use crate::error::ProfilerError;
use crate::rpc::{has_code, ChainGateway};

/// Address → is-contract, shared by every receipt worker of a run.
///
/// Entries are insert-if-absent: two workers racing on the same address both
/// compute the same answer, and whichever lands second leaves the first alone.
#[derive(Debug, Default)]
pub struct ContractCache {
    entries: DashMap<Address, bool>,
}

impl ContractCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &Address) -> Option<bool> {
        self.entries.get(address).map(|entry| *entry)
    }

    /// Stores `is_contract` unless the address is already known, returning the stored value.
    pub fn insert_if_absent(&self, address: Address, is_contract: bool) -> bool {
        *self.entries.entry(address).or_insert(is_contract)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the cached answer or asks the gateway for `eth_getCode`.
    ///
    /// Failed lookups are not cached so a later transaction may retry them.
    pub async fn is_contract(
        &self,
        gateway: &dyn ChainGateway,
        address: Address,
    ) -> Result<bool, ProfilerError> {
        if let Some(known) = self.get(&address) {
            return Ok(known);
        }

        let code = gateway.code_at(address).await?;
        let is_contract = has_code(&code);
        tracing::debug!(%address, is_contract, "code lookup");

        Ok(self.insert_if_absent(address, is_contract))
    }
}
