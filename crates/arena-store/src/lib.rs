//! Local relational mirror of the arena engine's on-chain state.
//!
//! # Tables
//!
//! - `arenas` - one row per arena, keyed by the chain-assigned id
//! - `players` - one row per `(arena_id, address)` entry
//! - `player_stats` - per-address aggregates
//! - `indexer_state` - key/value progress markers, `last_block` is the sync
//!   checkpoint and `pruned_below` the ledger horizon
//! - `processed_logs` - every `(block_number, log_index)` already applied
//!
//! The processed-log ledger is what makes replay safe: counters such as
//! `player_count` or `total_pnl` are not natural upserts, so the synchronizer
//! records each log position in the same transaction as its effects and skips
//! positions that are already present.
//!
//! The ledger grows by one row per applied event. [`StoreTxn::prune_processed`]
//! drops positions below a block and records that block as the horizon;
//! replays must start at or above [`ArenaStore::pruned_below`].
//!
//! # Writes
//!
//! All mutations go through [`ArenaStore::write`], which hands a [`StoreTxn`]
//! to a closure and commits only if the closure succeeds. The checkpoint is
//! advanced with [`StoreTxn::advance_checkpoint`] inside the same transaction
//! as the entity writes it covers.
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

mod codec;
mod error;
mod schema;
mod store;
mod txn;

#[cfg(test)]
mod tests;

pub use error::{
    StoreError,
    StoreResult,
};
pub use store::ArenaStore;
pub use txn::{
    ArenaInsert,
    NewArena,
    StoreTxn,
};
