//! Token event signatures and the topic0 matcher shared by both scan passes.

use alloy::primitives::{b256, B256};

use crate::types::Log;

/// `keccak256("Transfer(address,address,uint256)")`, shared by ERC-20 and ERC-721.
pub const TRANSFER_TOPIC: B256 =
    b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");

/// `keccak256("TransferSingle(address,address,address,uint256,uint256)")`.
pub const TRANSFER_SINGLE_TOPIC: B256 =
    b256!("c3d58168c5ae7397731d063d5bbf3d657854427343f4c083240f7aacaa2d0f62");

/// `keccak256("TransferBatch(address,address,address,uint256[],uint256[])")`.
pub const TRANSFER_BATCH_TOPIC: B256 =
    b256!("4a39dc06d4c0dbc64b70af90fd698a233a518aa5d07e595d983b8c0526c8f7fb");

/// The topic0 filter used by the `eth_getLogs` sweep.
pub const TOKEN_EVENT_TOPICS: [B256; 3] =
    [TRANSFER_TOPIC, TRANSFER_SINGLE_TOPIC, TRANSFER_BATCH_TOPIC];

/// Which token standard a transfer-like log looks like.
///
/// ERC-20 vs ERC-721 is inferred from the `Transfer` payload: the amount sits
/// in `data` for ERC-20, while ERC-721 indexes the token id and leaves `data`
/// empty. Some ERC-721 contracts pad `data`, so this is a heuristic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenEvent {
    Erc20Transfer,
    Erc721Transfer,
    Erc1155Transfer,
}

/// Matches a log against the token transfer signatures.
pub fn token_event(log: &Log) -> Option<TokenEvent> {
    let topic0 = log.topic0()?;
    if *topic0 == TRANSFER_TOPIC {
        if log.data.is_empty() {
            Some(TokenEvent::Erc721Transfer)
        } else {
            Some(TokenEvent::Erc20Transfer)
        }
    } else if *topic0 == TRANSFER_SINGLE_TOPIC || *topic0 == TRANSFER_BATCH_TOPIC {
        Some(TokenEvent::Erc1155Transfer)
    } else {
        None
    }
}
