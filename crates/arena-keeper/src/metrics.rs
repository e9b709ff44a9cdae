//! Metrics emitted through the `metrics` facade.
//!
//! No exporter is installed here; the binary's host decides where they go.
//!
//! ### Synchronizer
//! - `arena_keeper_events_applied_total{event}`: events applied to the store
//! - `arena_keeper_events_duplicate_total`: events skipped by the processed-log ledger
//! - `arena_keeper_events_skipped_total{reason}`: undecodable or removed logs
//! - `arena_keeper_checkpoint_block`: last persisted checkpoint
//! - `arena_keeper_sync_reconnects_total`: sync sessions that ended and restarted
//!
//! ### Scheduler
//! - `arena_keeper_tx_submitted_total{kind}`: confirmed transactions
//! - `arena_keeper_tx_failed_total{kind}`: failed or timed out transactions
//! - `arena_keeper_arenas_finalized_empty_total`: arenas closed locally with no players

#![allow(clippy::cast_precision_loss)]

use metrics::{
    counter,
    gauge,
};

pub fn record_event_applied(event: &'static str) {
    counter!("arena_keeper_events_applied_total", "event" => event).increment(1);
}

pub fn record_event_duplicate() {
    counter!("arena_keeper_events_duplicate_total").increment(1);
}

pub fn record_event_skipped(reason: &'static str) {
    counter!("arena_keeper_events_skipped_total", "reason" => reason).increment(1);
}

pub fn record_checkpoint(block: u64) {
    gauge!("arena_keeper_checkpoint_block").set(block as f64);
}

pub fn record_reconnect() {
    counter!("arena_keeper_sync_reconnects_total").increment(1);
}

pub fn record_tx_submitted(kind: &'static str) {
    counter!("arena_keeper_tx_submitted_total", "kind" => kind).increment(1);
}

pub fn record_tx_failed(kind: &'static str) {
    counter!("arena_keeper_tx_failed_total", "kind" => kind).increment(1);
}

pub fn record_finalized_empty() {
    counter!("arena_keeper_arenas_finalized_empty_total").increment(1);
}
