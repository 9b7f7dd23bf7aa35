//! Transaction classification.
//!
//! A closed decision tree over the transaction envelope and, when one was
//! fetched, its receipt logs. The only non-local input, whether `to` carries
//! code, is resolved by the caller beforehand and handed in as
//! [`CodePresence`], which keeps [`classify`] pure and synchronous.
//!
//! ERC-20 and ERC-721 share the `Transfer` signature; the split is made on
//! whether the log carries `data`. That is a heuristic, not a protocol rule.

use alloy::primitives::{Address, U256};
use profiler_data::signatures::{token_event, TokenEvent};
use profiler_data::{Log, Receipt, Transaction, TxType};

/// Result of the code lookup for `tx.to`, as far as the caller performed it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodePresence {
    /// Lookup disabled or not needed.
    Unchecked,
    Contract,
    NotContract,
}

/// Classification output for one transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Classification {
    pub tx_type: TxType,
    /// Most frequent token-event emitter in the receipt, if any.
    pub token: Option<Address>,
}

/// Token-event counts over one receipt.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenLogTally {
    pub erc20: u64,
    pub erc721: u64,
    pub erc1155: u64,
    /// Emitters in first-seen order with their event counts.
    emitters: Vec<(Address, u64)>,
}

impl TokenLogTally {
    pub fn from_logs(logs: &[Log]) -> Self {
        let mut tally = Self::default();
        for log in logs {
            let Some(event) = token_event(log) else {
                continue;
            };
            match event {
                TokenEvent::Erc20Transfer => tally.erc20 += 1,
                TokenEvent::Erc721Transfer => tally.erc721 += 1,
                TokenEvent::Erc1155Transfer => tally.erc1155 += 1,
            }
            match tally.emitters.iter_mut().find(|(a, _)| *a == log.address) {
                Some((_, n)) => *n += 1,
                None => tally.emitters.push((log.address, 1)),
            }
        }
        tally
    }

    pub fn is_empty(&self) -> bool {
        self.erc20 == 0 && self.erc721 == 0 && self.erc1155 == 0
    }

    /// Highest count wins; ties go to the emitter seen first.
    pub fn dominant(&self) -> Option<Address> {
        let mut best: Option<(Address, u64)> = None;
        for &(address, count) in &self.emitters {
            if best.map_or(true, |(_, n)| count > n) {
                best = Some((address, count));
            }
        }
        best.map(|(address, _)| address)
    }

    /// Every emitter with its count, first-seen order.
    pub fn emitters(&self) -> &[(Address, u64)] {
        &self.emitters
    }

    fn token_type(&self) -> Option<TxType> {
        let standards = [self.erc20, self.erc721, self.erc1155]
            .iter()
            .filter(|n| **n > 0)
            .count();
        match standards {
            0 => None,
            1 if self.erc20 > 0 => Some(TxType::Erc20Transfer),
            1 if self.erc721 > 0 => Some(TxType::Erc721Transfer),
            1 => Some(TxType::Erc1155Transfer),
            _ => Some(TxType::MixedTokenActivity),
        }
    }
}

/// Maps one transaction onto exactly one [`TxType`].
///
/// Decision order:
/// 1. no `to` is a contract creation, whatever the logs or value say
/// 2. receipt token events: one standard gives that type, several give mixed
/// 3. non-zero value is an ETH transfer
/// 4. a confirmed code-less `to` is an EOA call
/// 5. anything else is a contract call
///
/// Without a receipt step 2 is skipped.
pub fn classify(tx: &Transaction, receipt: Option<&Receipt>, code: CodePresence) -> Classification {
    if tx.to.is_none() {
        return Classification {
            tx_type: TxType::ContractCreation,
            token: None,
        };
    }

    if let Some(receipt) = receipt {
        let tally = TokenLogTally::from_logs(&receipt.logs);
        if let Some(tx_type) = tally.token_type() {
            return Classification {
                tx_type,
                token: tally.dominant(),
            };
        }
    }

    let tx_type = if tx.value > U256::ZERO {
        TxType::EthTransfer
    } else if code == CodePresence::NotContract {
        TxType::OtherEoaCall
    } else {
        TxType::OtherContractCall
    };

    Classification {
        tx_type,
        token: None,
    }
}

/// The address whose code [`classify`] would consult, if any.
///
/// Lets the scanner skip `eth_getCode` for every transaction the decision
/// tree settles before step 4.
pub fn code_lookup_target(tx: &Transaction, receipt: Option<&Receipt>) -> Option<Address> {
    let to = tx.to?;
    if tx.value > U256::ZERO {
        return None;
    }
    if let Some(receipt) = receipt {
        if receipt.logs.iter().any(|log| token_event(log).is_some()) {
            return None;
        }
    }
    Some(to)
}
