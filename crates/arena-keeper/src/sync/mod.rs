//! Event synchronizer: replicates contract events into the local store.
//!
//! Each session subscribes to live logs, backfills from the checkpoint to
//! the current head, then drains the live channel until it closes, a
//! keepalive fails or the store rejects a write. The outer loop waits a fixed
//! delay and starts a new session, whose backfill covers whatever the
//! previous one missed.
//!
//! The subscription is opened before the backfill so nothing emitted during
//! the backfill is lost; overlap between the two is dropped by the store's
//! processed-log ledger. With `ledger_retention` set, ledger positions far
//! below the checkpoint are pruned and a `start_block` below the pruned
//! horizon is raised to it.

mod handlers;

pub use handlers::{
    ApplyOutcome,
    apply,
};

use crate::{
    chain::{
        ChainError,
        EventFeed,
    },
    critical,
    gateway::Gateway,
    head::ChainHead,
    metrics,
};
use alloy::rpc::types::Log;
use arena_core::{
    ArenaLog,
    GatewayMessage,
    decode_log,
};
use arena_store::{
    ArenaStore,
    StoreError,
};
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::time::{
    self,
    MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;
use tracing::{
    debug,
    info,
    warn,
};

const MAX_CONSECUTIVE_FAILURES: u32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Chain error")]
    Chain(#[from] ChainError),
    #[error("Store error")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Overrides the checkpoint for the first successful backfill.
    pub start_block: Option<u64>,
    /// Largest block span requested in one `eth_getLogs` call.
    pub max_log_range: u64,
    pub keepalive_interval: Duration,
    pub reconnect_delay: Duration,
    /// Blocks of processed-log ledger kept below the checkpoint. `None`
    /// keeps the whole ledger.
    pub ledger_retention: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            start_block: None,
            max_log_range: 10_000,
            keepalive_interval: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(5),
            ledger_retention: None,
        }
    }
}

pub struct Synchronizer {
    feed: Arc<dyn EventFeed>,
    store: ArenaStore,
    gateway: Gateway,
    head: ChainHead,
    config: SyncConfig,
    start_override: Option<u64>,
    /// Set once a session reaches the live tail; resets the failure count.
    reached_live: bool,
}

impl Synchronizer {
    pub fn new(
        feed: Arc<dyn EventFeed>,
        store: ArenaStore,
        gateway: Gateway,
        head: ChainHead,
        config: SyncConfig,
    ) -> Self {
        let start_override = config.start_block;
        Self {
            feed,
            store,
            gateway,
            head,
            config,
            start_override,
            reached_live: false,
        }
    }

    /// Runs sessions until `shutdown` is cancelled. Session failures are
    /// retried after `reconnect_delay`; this only returns on shutdown.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        let mut failures: u32 = 0;
        loop {
            match self.session(&shutdown).await {
                Ok(()) => {
                    info!(target: "arena_keeper::sync", "Synchronizer stopped");
                    return;
                }
                Err(err) => {
                    if std::mem::take(&mut self.reached_live) {
                        failures = 0;
                    }
                    failures = failures.saturating_add(1);
                    metrics::record_reconnect();
                    if failures >= MAX_CONSECUTIVE_FAILURES {
                        critical!(error = ?err, failures, "Synchronizer keeps failing to stay connected");
                    } else {
                        warn!(target: "arena_keeper::sync", error = ?err, failures, "Sync session ended, reconnecting");
                    }
                }
            }

            tokio::select! {
                () = shutdown.cancelled() => {
                    info!(target: "arena_keeper::sync", "Shutdown during reconnect delay");
                    return;
                }
                () = time::sleep(self.config.reconnect_delay) => {}
            }
        }
    }

    /// One subscribe + backfill + live-tail cycle. `Ok` means shutdown.
    async fn session(&mut self, shutdown: &CancellationToken) -> Result<(), SyncError> {
        let mut live = self.feed.subscribe().await?;
        debug!(target: "arena_keeper::sync", "Live subscription opened");

        if self.backfill(shutdown).await? {
            return Ok(());
        }

        let mut keepalive = time::interval(self.config.keepalive_interval);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        keepalive.tick().await;
        self.reached_live = true;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => return Ok(()),
                received = live.recv() => {
                    let Some(log) = received else {
                        return Err(ChainError::SubscriptionClosed.into());
                    };
                    self.apply_live(&log)?;
                }
                _ = keepalive.tick() => {
                    self.feed.keepalive().await?;
                    debug!(target: "arena_keeper::sync", "Keepalive ok");
                    self.prune_ledger()?;
                }
            }
        }
    }

    fn next_block(&self) -> Result<u64, StoreError> {
        if let Some(block) = self.start_override {
            let horizon = self.store.pruned_below()?.unwrap_or(0);
            if block < horizon {
                warn!(
                    target: "arena_keeper::sync",
                    start_block = block,
                    horizon,
                    "Start block is below the pruned ledger, replaying from the horizon"
                );
                return Ok(horizon);
            }
            return Ok(block);
        }
        Ok(self.store.checkpoint()?.map_or(0, |c| c.saturating_add(1)))
    }

    /// Replays `[next_block, head]` in chunks. Returns `true` if interrupted
    /// by shutdown.
    async fn backfill(&mut self, shutdown: &CancellationToken) -> Result<bool, SyncError> {
        let head = self.feed.block_number().await?;
        self.head.observe(head);
        let from_block = self.next_block()?;

        if from_block > head {
            debug!(target: "arena_keeper::sync", from_block, head, "No backfill needed");
            self.start_override = None;
            return Ok(false);
        }

        info!(target: "arena_keeper::sync", from_block, head, "Backfilling");
        let span = self.config.max_log_range.max(1);
        let mut chunk_start = from_block;
        while chunk_start <= head {
            if shutdown.is_cancelled() {
                return Ok(true);
            }
            let chunk_end = chunk_start.saturating_add(span - 1).min(head);
            let logs = self.feed.logs(chunk_start, chunk_end).await?;
            self.apply_range(&logs, chunk_end)?;
            let Some(next) = chunk_end.checked_add(1) else {
                break;
            };
            chunk_start = next;
        }

        self.start_override = None;
        info!(target: "arena_keeper::sync", head, "Backfill complete");
        self.prune_ledger()?;
        Ok(false)
    }

    /// Drops ledger positions older than `ledger_retention` blocks below the
    /// checkpoint. Returns the number of positions removed.
    pub fn prune_ledger(&self) -> Result<usize, StoreError> {
        let (Some(retention), Some(checkpoint)) =
            (self.config.ledger_retention, self.store.checkpoint()?)
        else {
            return Ok(0);
        };
        let horizon = checkpoint.saturating_sub(retention);
        if horizon == 0 {
            return Ok(0);
        }
        let removed = self.store.write(|txn| txn.prune_processed(horizon))?;
        if removed > 0 {
            debug!(target: "arena_keeper::sync", horizon, removed, "Pruned processed-log ledger");
        }
        Ok(removed)
    }

    /// Applies one backfill chunk and raises the checkpoint to `range_end`
    /// in a single transaction.
    pub fn apply_range(&self, logs: &[Log], range_end: u64) -> Result<usize, StoreError> {
        let mut decoded: Vec<ArenaLog> = logs.iter().filter_map(decode_or_skip).collect();
        decoded.sort();

        let applied = self.store.write(|txn| {
            let mut applied = Vec::with_capacity(decoded.len());
            for log in &decoded {
                match apply(txn, log)? {
                    ApplyOutcome::Applied => applied.push(log),
                    ApplyOutcome::Duplicate => metrics::record_event_duplicate(),
                    ApplyOutcome::Skipped => metrics::record_event_skipped("inapplicable"),
                }
            }
            txn.advance_checkpoint(range_end)?;
            Ok::<_, StoreError>(applied)
        })?;

        metrics::record_checkpoint(range_end);
        for log in &applied {
            self.announce(log);
        }
        debug!(target: "arena_keeper::sync", range_end, logs = decoded.len(), applied = applied.len(), "Applied range");
        Ok(applied.len())
    }

    /// Applies a single live log. The checkpoint moves to the block before
    /// it, the last one known to be complete.
    pub fn apply_live(&self, log: &Log) -> Result<ApplyOutcome, StoreError> {
        let Some(decoded) = decode_or_skip(log) else {
            return Ok(ApplyOutcome::Skipped);
        };
        self.head.observe(decoded.block_number);

        let outcome = self.store.write(|txn| {
            let outcome = apply(txn, &decoded)?;
            if let Some(complete) = decoded.block_number.checked_sub(1) {
                txn.advance_checkpoint(complete)?;
            }
            Ok::<_, StoreError>(outcome)
        })?;

        match outcome {
            ApplyOutcome::Applied => self.announce(&decoded),
            ApplyOutcome::Duplicate => metrics::record_event_duplicate(),
            ApplyOutcome::Skipped => metrics::record_event_skipped("inapplicable"),
        }
        Ok(outcome)
    }

    fn announce(&self, log: &ArenaLog) {
        metrics::record_event_applied(log.event.name());
        self.gateway.publish(GatewayMessage::from_log(log));
    }
}

fn decode_or_skip(log: &Log) -> Option<ArenaLog> {
    if log.removed {
        warn!(
            target: "arena_keeper::sync",
            block_number = ?log.block_number,
            log_index = ?log.log_index,
            "Ignoring removed log"
        );
        metrics::record_event_skipped("removed");
        return None;
    }
    match decode_log(log) {
        Ok(decoded) => Some(decoded),
        Err(err) => {
            warn!(
                target: "arena_keeper::sync",
                error = %err,
                block_number = ?log.block_number,
                log_index = ?log.log_index,
                "Skipping undecodable log"
            );
            metrics::record_event_skipped("undecodable");
            None
        }
    }
}
