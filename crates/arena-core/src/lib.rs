//! Shared types for the arena keeper.
//!
//! Holds the data model mirrored from the arena engine contract, the contract
//! ABI, log decoding into typed [`ArenaEvent`]s and the message schema pushed
//! to gateway subscribers. Nothing in here performs I/O.
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod abi;
pub mod constants;
mod events;
mod message;
mod types;

pub use events::{
    ArenaEvent,
    ArenaLog,
    DecodeError,
    decode_log,
};
pub use message::GatewayMessage;
pub use types::{
    Arena,
    ArenaStatus,
    PlayerEntry,
    PlayerStats,
    Tier,
    TierError,
    decimal,
};

/// Lowercase, `0x`-prefixed hex used as the storage key for addresses.
pub fn address_key(address: &alloy::primitives::Address) -> String {
    alloy::hex::encode_prefixed(address)
}
