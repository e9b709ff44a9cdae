use alloy::primitives::{
    Address,
    B256,
    U256,
};
use serde::Serialize;
use std::fmt;

/// Stakes bucket an arena belongs to. Discriminants match the contract's `uint8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Tier {
    Low = 0,
    Mid = 1,
    High = 2,
    Vip = 3,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tier {0}")]
pub struct TierError(pub u8);

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Low, Tier::Mid, Tier::High, Tier::Vip];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Entry fee in wei for arenas created in this tier.
    pub fn entry_fee(self) -> U256 {
        const FINNEY: u128 = 1_000_000_000_000_000;
        let wei = match self {
            Tier::Low => FINNEY,
            Tier::Mid => 10 * FINNEY,
            Tier::High => 100 * FINNEY,
            Tier::Vip => 1_000 * FINNEY,
        };
        U256::from(wei)
    }
}

impl TryFrom<u8> for Tier {
    type Error = TierError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Tier::Low),
            1 => Ok(Tier::Mid),
            2 => Ok(Tier::High),
            3 => Ok(Tier::Vip),
            other => Err(TierError(other)),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Low => "low",
            Tier::Mid => "mid",
            Tier::High => "high",
            Tier::Vip => "vip",
        };
        f.write_str(name)
    }
}

/// Lifecycle of an arena. Only moves forward.
///
/// `Active` and `Revealing` are never persisted: they are derived from the
/// current block at read time, see [`Arena::status_at`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArenaStatus {
    Scheduled,
    Active,
    Revealing,
    Finalized,
}

impl ArenaStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ArenaStatus::Scheduled => "scheduled",
            ArenaStatus::Active => "active",
            ArenaStatus::Revealing => "revealing",
            ArenaStatus::Finalized => "finalized",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "scheduled" => Some(Self::Scheduled),
            "active" => Some(Self::Active),
            "revealing" => Some(Self::Revealing),
            "finalized" => Some(Self::Finalized),
            _ => None,
        }
    }
}

/// One game round, as mirrored from the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Arena {
    pub id: u64,
    pub tier: Tier,
    #[serde(with = "decimal")]
    pub entry_fee: U256,
    pub start_block: u64,
    pub end_block: u64,
    pub status: ArenaStatus,
    #[serde(with = "decimal")]
    pub pot: U256,
    pub player_count: u64,
    pub asset_pair: String,
    pub creation_tx_hash: Option<B256>,
    #[serde(with = "decimal::option")]
    pub final_price: Option<U256>,
    /// Unix seconds at which the finalization was recorded locally.
    pub finalized_at: Option<i64>,
    /// Created from a player event before its `ArenaCreated` was seen.
    pub placeholder: bool,
}

impl Arena {
    /// Status as seen at `current_block`.
    pub fn status_at(&self, current_block: u64) -> ArenaStatus {
        if self.status == ArenaStatus::Finalized {
            return ArenaStatus::Finalized;
        }
        let derived = if current_block > self.end_block {
            ArenaStatus::Revealing
        } else if current_block >= self.start_block {
            ArenaStatus::Active
        } else {
            ArenaStatus::Scheduled
        };
        derived.max(self.status)
    }

    /// Whether the reveal window has closed at `current_block`.
    pub fn reveal_closed(&self, current_block: u64, reveal_period_blocks: u64) -> bool {
        self.end_block.saturating_add(reveal_period_blocks) < current_block
    }
}

/// One player's participation in one arena.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerEntry {
    pub arena_id: u64,
    pub address: Address,
    pub commitment_hash: Option<B256>,
    pub revealed: bool,
    #[serde(with = "decimal::option")]
    pub prediction: Option<U256>,
    #[serde(with = "decimal::option")]
    pub payout: Option<U256>,
}

/// Per-address aggregates across every arena.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    pub address: Address,
    pub total_arenas: u64,
    pub wins: u64,
    pub god_streak: u64,
    pub current_streak: u64,
    pub best_streak: u64,
    #[serde(rename = "totalPnL", with = "decimal")]
    pub total_pnl: U256,
}

impl PlayerStats {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            total_arenas: 0,
            wins: 0,
            god_streak: 0,
            current_streak: 0,
            best_streak: 0,
            total_pnl: U256::ZERO,
        }
    }
}

/// Serialises wei amounts as decimal strings, the format clients expect.
pub mod decimal {
    use alloy::primitives::U256;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub mod option {
        use alloy::primitives::U256;
        use serde::Serializer;

        #[allow(clippy::ref_option)]
        pub fn serialize<S: Serializer>(
            value: &Option<U256>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => serializer.collect_str(v),
                None => serializer.serialize_none(),
            }
        }
    }
}
