use crate::{
    Arena,
    events::{
        ArenaEvent,
        ArenaLog,
    },
};
use alloy::primitives::{
    Address,
    B256,
    U256,
};
use serde::Serialize;
use serde_json::{
    Value,
    json,
};

/// Notification fanned out to gateway subscribers: `{ "type": .., "data": .. }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub data: Value,
}

fn dec(value: U256) -> String {
    value.to_string()
}

impl GatewayMessage {
    pub fn new(kind: &'static str, data: Value) -> Self {
        Self { kind, data }
    }

    /// Message announcing an event that was applied to the local store.
    pub fn from_log(log: &ArenaLog) -> Self {
        let (kind, mut data) = match &log.event {
            ArenaEvent::ArenaCreated {
                arena_id,
                tier,
                entry_fee,
                start_block,
                end_block,
                asset_pair,
            } => (
                "arena:created",
                json!({
                    "arenaId": arena_id,
                    "tier": tier,
                    "entryFee": dec(*entry_fee),
                    "startBlock": start_block,
                    "endBlock": end_block,
                    "assetPair": asset_pair,
                }),
            ),
            ArenaEvent::PlayerJoined { arena_id, player } => (
                "arena:player_joined",
                json!({ "arenaId": arena_id, "player": player }),
            ),
            ArenaEvent::PredictionCommitted {
                arena_id,
                player,
                commit_hash,
            } => (
                "arena:prediction_committed",
                json!({ "arenaId": arena_id, "player": player, "commitHash": commit_hash }),
            ),
            ArenaEvent::PredictionRevealed {
                arena_id,
                player,
                prediction,
            } => (
                "arena:prediction_revealed",
                json!({ "arenaId": arena_id, "player": player, "prediction": dec(*prediction) }),
            ),
            ArenaEvent::ArenaFinalized {
                arena_id,
                final_price,
            } => (
                "arena:finalized",
                json!({ "arenaId": arena_id, "finalPrice": dec(*final_price) }),
            ),
            ArenaEvent::GodStreakUpdate { player, streak } => (
                "player:god_streak",
                json!({ "player": player, "streak": streak }),
            ),
            ArenaEvent::PotDistributed {
                arena_id,
                winner,
                amount,
            } => (
                "arena:pot_distributed",
                json!({ "arenaId": arena_id, "winner": winner, "amount": dec(*amount) }),
            ),
        };
        if let Value::Object(map) = &mut data {
            map.insert("blockNumber".into(), json!(log.block_number));
            if let Some(tx_hash) = log.tx_hash {
                map.insert("txHash".into(), json!(tx_hash));
            }
        }
        Self::new(kind, data)
    }

    pub fn create_submitted(tier: u8, duration_blocks: u64, tx_hash: B256) -> Self {
        Self::new(
            "arena:create_submitted",
            json!({ "tier": tier, "durationBlocks": duration_blocks, "txHash": tx_hash }),
        )
    }

    pub fn tape_submitted(arena_id: u64, ticks: usize, tx_hash: B256) -> Self {
        Self::new(
            "arena:tape_submitted",
            json!({ "arenaId": arena_id, "ticks": ticks, "txHash": tx_hash }),
        )
    }

    pub fn finalize_submitted(arena_id: u64, players: &[Address], tx_hash: Option<B256>) -> Self {
        Self::new(
            "arena:finalize_submitted",
            json!({ "arenaId": arena_id, "players": players.len(), "txHash": tx_hash }),
        )
    }

    pub fn finalized_empty(arena: &Arena) -> Self {
        Self::new(
            "arena:finalized_empty",
            json!({ "arenaId": arena.id, "endBlock": arena.end_block }),
        )
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
