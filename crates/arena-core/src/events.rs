//! Decoding of arena engine logs into typed events.

use crate::abi::IArenaEngine;
use alloy::{
    primitives::{
        Address,
        B256,
        U256,
    },
    rpc::types::Log,
    sol_types::SolEvent,
};
use std::cmp::Ordering;

/// Contract event after ABI decoding, with ids and blocks narrowed to `u64`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArenaEvent {
    ArenaCreated {
        arena_id: u64,
        tier: u8,
        entry_fee: U256,
        start_block: u64,
        end_block: u64,
        asset_pair: String,
    },
    PlayerJoined {
        arena_id: u64,
        player: Address,
    },
    PredictionCommitted {
        arena_id: u64,
        player: Address,
        commit_hash: B256,
    },
    PredictionRevealed {
        arena_id: u64,
        player: Address,
        prediction: U256,
    },
    ArenaFinalized {
        arena_id: u64,
        final_price: U256,
    },
    GodStreakUpdate {
        player: Address,
        streak: u64,
    },
    PotDistributed {
        arena_id: u64,
        winner: Address,
        amount: U256,
    },
}

impl ArenaEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ArenaEvent::ArenaCreated { .. } => "ArenaCreated",
            ArenaEvent::PlayerJoined { .. } => "PlayerJoined",
            ArenaEvent::PredictionCommitted { .. } => "PredictionCommitted",
            ArenaEvent::PredictionRevealed { .. } => "PredictionRevealed",
            ArenaEvent::ArenaFinalized { .. } => "ArenaFinalized",
            ArenaEvent::GodStreakUpdate { .. } => "GodStreakUpdate",
            ArenaEvent::PotDistributed { .. } => "PotDistributed",
        }
    }

    /// Arena the event refers to, if any.
    pub fn arena_id(&self) -> Option<u64> {
        match self {
            ArenaEvent::ArenaCreated { arena_id, .. }
            | ArenaEvent::PlayerJoined { arena_id, .. }
            | ArenaEvent::PredictionCommitted { arena_id, .. }
            | ArenaEvent::PredictionRevealed { arena_id, .. }
            | ArenaEvent::ArenaFinalized { arena_id, .. }
            | ArenaEvent::PotDistributed { arena_id, .. } => Some(*arena_id),
            ArenaEvent::GodStreakUpdate { .. } => None,
        }
    }
}

/// A decoded event with its position in the chain.
///
/// Logs order by `(block_number, log_index)`, the order they must be applied in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArenaLog {
    pub block_number: u64,
    pub log_index: u64,
    pub tx_hash: Option<B256>,
    pub event: ArenaEvent,
}

impl ArenaLog {
    pub fn position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}

impl PartialOrd for ArenaLog {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ArenaLog {
    fn cmp(&self, other: &Self) -> Ordering {
        self.position()
            .cmp(&other.position())
            .then_with(|| self.tx_hash.cmp(&other.tx_hash))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("log has no topic0 or an unrecognized one: {0:?}")]
    Unrecognized(Option<B256>),
    #[error("malformed {event} log: {reason}")]
    Malformed { event: &'static str, reason: String },
    #[error("log is missing its block number or log index")]
    MissingPosition,
}

fn narrow(value: U256, event: &'static str, field: &str) -> Result<u64, DecodeError> {
    u64::try_from(value).map_err(|_| DecodeError::Malformed {
        event,
        reason: format!("{field} {value} does not fit in u64"),
    })
}

fn decode_as<E: SolEvent>(log: &Log) -> Result<E, DecodeError> {
    E::decode_log_data(&log.inner.data).map_err(|e| DecodeError::Malformed {
        event: E::SIGNATURE,
        reason: e.to_string(),
    })
}

/// Decodes a raw contract log.
///
/// Pending logs (no block number or index) are rejected: the synchronizer only
/// applies logs whose position is final enough to be checkpointed.
pub fn decode_log(log: &Log) -> Result<ArenaLog, DecodeError> {
    let topic0 = log.inner.data.topics().first().copied();
    let Some(topic0) = topic0 else {
        return Err(DecodeError::Unrecognized(None));
    };

    let event = if topic0 == IArenaEngine::ArenaCreated::SIGNATURE_HASH {
        let e = decode_as::<IArenaEngine::ArenaCreated>(log)?;
        ArenaEvent::ArenaCreated {
            arena_id: narrow(e.arenaId, "ArenaCreated", "arenaId")?,
            tier: e.tier,
            entry_fee: e.entryFee,
            start_block: narrow(e.startBlock, "ArenaCreated", "startBlock")?,
            end_block: narrow(e.endBlock, "ArenaCreated", "endBlock")?,
            asset_pair: e.assetPair,
        }
    } else if topic0 == IArenaEngine::PlayerJoined::SIGNATURE_HASH {
        let e = decode_as::<IArenaEngine::PlayerJoined>(log)?;
        ArenaEvent::PlayerJoined {
            arena_id: narrow(e.arenaId, "PlayerJoined", "arenaId")?,
            player: e.player,
        }
    } else if topic0 == IArenaEngine::PredictionCommitted::SIGNATURE_HASH {
        let e = decode_as::<IArenaEngine::PredictionCommitted>(log)?;
        ArenaEvent::PredictionCommitted {
            arena_id: narrow(e.arenaId, "PredictionCommitted", "arenaId")?,
            player: e.player,
            commit_hash: e.commitHash,
        }
    } else if topic0 == IArenaEngine::PredictionRevealed::SIGNATURE_HASH {
        let e = decode_as::<IArenaEngine::PredictionRevealed>(log)?;
        ArenaEvent::PredictionRevealed {
            arena_id: narrow(e.arenaId, "PredictionRevealed", "arenaId")?,
            player: e.player,
            prediction: e.prediction,
        }
    } else if topic0 == IArenaEngine::ArenaFinalized::SIGNATURE_HASH {
        let e = decode_as::<IArenaEngine::ArenaFinalized>(log)?;
        ArenaEvent::ArenaFinalized {
            arena_id: narrow(e.arenaId, "ArenaFinalized", "arenaId")?,
            final_price: e.finalPrice,
        }
    } else if topic0 == IArenaEngine::GodStreakUpdate::SIGNATURE_HASH {
        let e = decode_as::<IArenaEngine::GodStreakUpdate>(log)?;
        ArenaEvent::GodStreakUpdate {
            player: e.player,
            streak: narrow(e.streak, "GodStreakUpdate", "streak")?,
        }
    } else if topic0 == IArenaEngine::PotDistributed::SIGNATURE_HASH {
        let e = decode_as::<IArenaEngine::PotDistributed>(log)?;
        ArenaEvent::PotDistributed {
            arena_id: narrow(e.arenaId, "PotDistributed", "arenaId")?,
            winner: e.winner,
            amount: e.amount,
        }
    } else {
        return Err(DecodeError::Unrecognized(Some(topic0)));
    };

    let (Some(block_number), Some(log_index)) = (log.block_number, log.log_index) else {
        return Err(DecodeError::MissingPosition);
    };

    Ok(ArenaLog {
        block_number,
        log_index,
        tx_hash: log.transaction_hash,
        event,
    })
}
