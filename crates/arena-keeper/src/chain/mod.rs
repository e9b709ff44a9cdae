//! Chain access used by the synchronizer and the scheduler.
//!
//! The two sides get separate traits so they can run on separate
//! connections: the synchronizer owns a streaming connection for log
//! subscriptions, the scheduler an HTTP connection carrying the operator
//! wallet. Tests swap both for in-memory mocks.

mod provider;

pub use provider::{
    AlloyArenaChain,
    AlloyEventFeed,
};

use alloy::{
    primitives::{
        Address,
        B256,
        Bytes,
        U256,
        keccak256,
    },
    rpc::types::Log,
};
use arena_core::Tier;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

/// Source of contract logs for the event synchronizer.
#[async_trait]
pub trait EventFeed: Send + Sync {
    async fn block_number(&self) -> Result<u64, ChainError>;

    /// All contract logs in `[from_block, to_block]`, inclusive.
    async fn logs(&self, from_block: u64, to_block: u64) -> Result<Vec<Log>, ChainError>;

    /// Opens a live subscription. The receiver closes when the upstream
    /// subscription ends or drops logs, which callers treat as a disconnect.
    /// Implementations must never skip a log and keep the channel open.
    async fn subscribe(&self) -> Result<mpsc::Receiver<Log>, ChainError>;

    /// Cheap request that keeps an idle connection from timing out.
    async fn keepalive(&self) -> Result<(), ChainError>;
}

/// Transaction side of the arena engine contract.
#[async_trait]
pub trait ArenaChain: Send + Sync {
    async fn block_number(&self) -> Result<u64, ChainError>;

    async fn create_arena(&self, request: CreateArena) -> Result<TxOutcome, ChainError>;

    async fn submit_price_tape(&self, arena_id: u64, tape: Vec<U256>)
    -> Result<TxOutcome, ChainError>;

    async fn finalize_arena(
        &self,
        arena_id: u64,
        players: Vec<Address>,
    ) -> Result<TxOutcome, ChainError>;

    /// Player count as recorded by the contract.
    async fn arena_player_count(&self, arena_id: u64) -> Result<u64, ChainError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateArena {
    pub tier: Tier,
    pub entry_fee: U256,
    pub duration_blocks: u64,
    pub asset_pair: String,
}

/// A confirmed, successful transaction.
#[derive(Debug, Clone, Default)]
pub struct TxOutcome {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
    /// Logs from the receipt, in emission order.
    pub logs: Vec<Log>,
}

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("Transport error: {0}")]
    Transport(String),

    /// The node rejected the call or the transaction reverted on-chain.
    #[error("Reverted: {reason}")]
    Reverted { reason: String, data: Option<Bytes> },

    #[error("Contract call failed: {0}")]
    Contract(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Subscription closed")]
    SubscriptionClosed,

    #[error("Invalid chain configuration: {0}")]
    InvalidConfig(String),
}

impl ChainError {
    /// Whether this is a revert identified by `marker`, matched either
    /// against the revert message or as the selector of a custom error
    /// `marker()` at the start of the revert data.
    pub fn is_revert_matching(&self, marker: &str) -> bool {
        if marker.is_empty() {
            return false;
        }
        let ChainError::Reverted { reason, data } = self else {
            return false;
        };
        if reason.contains(marker) {
            return true;
        }
        let selector = &keccak256(format!("{marker}()"))[..4];
        data.as_ref().is_some_and(|d| d.starts_with(selector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revert_matches_message() {
        let err = ChainError::Reverted {
            reason: "execution reverted: AlreadyFinalized".into(),
            data: None,
        };
        assert!(err.is_revert_matching("AlreadyFinalized"));
        assert!(!err.is_revert_matching("NotStarted"));
        assert!(!err.is_revert_matching(""));
    }

    #[test]
    fn test_revert_matches_custom_error_selector() {
        let selector = keccak256("AlreadyFinalized()");
        let err = ChainError::Reverted {
            reason: "execution reverted".into(),
            data: Some(Bytes::copy_from_slice(&selector[..4])),
        };
        assert!(err.is_revert_matching("AlreadyFinalized"));
    }

    #[test]
    fn test_non_revert_never_matches() {
        let err = ChainError::Transport("AlreadyFinalized".into());
        assert!(!err.is_revert_matching("AlreadyFinalized"));
    }
}
