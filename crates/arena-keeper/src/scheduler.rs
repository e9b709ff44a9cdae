//! Arena scheduler: creates arenas on a fixed cadence and finalizes those
//! whose reveal window has closed.
//!
//! The local store decides which arenas are due and who played in them. The
//! scheduler never writes arena status itself, except for arenas nobody
//! joined: those are closed locally without any transaction. Everything else
//! flips to finalized when the synchronizer applies `ArenaFinalized`.

use crate::{
    chain::{
        ArenaChain,
        ChainError,
        CreateArena,
        TxOutcome,
    },
    critical,
    gateway::Gateway,
    head::ChainHead,
    metrics,
    price_tape::PriceTapeSource,
    sync::{
        self,
        ApplyOutcome,
    },
};
use arena_core::{
    Arena,
    ArenaEvent,
    GatewayMessage,
    Tier,
    constants::{
        DEFAULT_BLOCK_TIME,
        blocks_for,
    },
    decode_log,
};
use arena_store::{
    ArenaStore,
    StoreError,
};
use futures::future::join_all;
use parking_lot::Mutex;
use std::{
    collections::HashSet,
    future::Future,
    sync::{
        Arc,
        atomic::{
            AtomicUsize,
            Ordering,
        },
    },
    time::Duration,
};
use tokio::{
    task::{
        JoinError,
        JoinSet,
    },
    time::{
        self,
        MissedTickBehavior,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{
    debug,
    info,
    warn,
};

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Chain error")]
    Chain(#[from] ChainError),
    #[error("Store error")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub create_interval: Duration,
    pub finalize_interval: Duration,
    pub arena_duration: Duration,
    pub reveal_period: Duration,
    pub block_time: Duration,
    /// Tiers cycled through by the create cycle, in order.
    pub tiers: Vec<Tier>,
    pub asset_pair: String,
    /// Upper bound on each chain call, including waiting for its receipt.
    pub tx_timeout: Duration,
    /// Revert marker that means the arena is already finalized on-chain.
    /// Empty disables the check.
    pub already_finalized_marker: String,
    /// Compare local and on-chain player counts before finalizing.
    pub cross_check: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            create_interval: Duration::from_secs(60),
            finalize_interval: Duration::from_secs(5),
            arena_duration: Duration::from_secs(60),
            reveal_period: Duration::from_secs(30),
            block_time: DEFAULT_BLOCK_TIME,
            tiers: vec![Tier::Low, Tier::Mid, Tier::High],
            asset_pair: "ETH/USD".into(),
            tx_timeout: Duration::from_secs(60),
            already_finalized_marker: "AlreadyFinalized".into(),
            cross_check: false,
        }
    }
}

impl SchedulerConfig {
    pub fn duration_blocks(&self) -> u64 {
        blocks_for(self.arena_duration, self.block_time)
    }

    pub fn reveal_period_blocks(&self) -> u64 {
        blocks_for(self.reveal_period, self.block_time)
    }
}

/// Result of one finalize attempt for one arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// No players; closed locally.
    Empty,
    Submitted,
    /// The contract rejected it as already finalized.
    AlreadyFinalized,
    /// Another tick is still working on this arena.
    InFlight,
    /// Local and on-chain player counts disagree; retried next tick.
    CountMismatch { local: u64, onchain: u64 },
    /// Will be re-selected on the next tick.
    Failed,
}

pub struct Scheduler {
    chain: Arc<dyn ArenaChain>,
    tape: Arc<dyn PriceTapeSource>,
    store: ArenaStore,
    gateway: Gateway,
    head: ChainHead,
    config: SchedulerConfig,
    tier_cursor: AtomicUsize,
    in_flight: Mutex<HashSet<u64>>,
}

/// Removes an arena from the in-flight set when dropped.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<u64>>,
    arena_id: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.arena_id);
    }
}

impl Scheduler {
    pub fn new(
        chain: Arc<dyn ArenaChain>,
        tape: Arc<dyn PriceTapeSource>,
        store: ArenaStore,
        gateway: Gateway,
        head: ChainHead,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            chain,
            tape,
            store,
            gateway,
            head,
            config,
            tier_cursor: AtomicUsize::new(0),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Runs both cycles until `shutdown` is cancelled. Finalize work already
    /// started is allowed to finish (each call is bounded by `tx_timeout`).
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            target: "arena_keeper::scheduler",
            create_interval = ?self.config.create_interval,
            finalize_interval = ?self.config.finalize_interval,
            duration_blocks = self.config.duration_blocks(),
            reveal_period_blocks = self.config.reveal_period_blocks(),
            tiers = ?self.config.tiers,
            "Scheduler starting"
        );

        let create = tokio::spawn(Arc::clone(&self).create_loop(shutdown.clone()));
        let finalize = tokio::spawn(Arc::clone(&self).finalize_loop(shutdown));
        let (create, finalize) = tokio::join!(create, finalize);
        for (cycle, result) in [("create", create), ("finalize", finalize)] {
            if let Err(err) = result {
                critical!(error = ?err, cycle, "Scheduler cycle aborted");
            }
        }
        info!(target: "arena_keeper::scheduler", "Scheduler stopped");
    }

    async fn create_loop(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = time::interval(self.config.create_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => return,
                _ = ticker.tick() => {
                    if let Err(err) = self.create_tick().await {
                        warn!(target: "arena_keeper::scheduler", error = ?err, "Create cycle failed, waiting for next tick");
                    }
                }
            }
        }
    }

    async fn finalize_loop(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = time::interval(self.config.finalize_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        let mut ticks = JoinSet::new();

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let this = Arc::clone(&self);
                    ticks.spawn(async move { this.finalize_tick().await });
                }
                Some(done) = ticks.join_next(), if !ticks.is_empty() => log_finalize_tick(done),
            }
        }

        if !ticks.is_empty() {
            info!(target: "arena_keeper::scheduler", pending = ticks.len(), "Waiting for in-flight finalize work");
        }
        while let Some(done) = ticks.join_next().await {
            log_finalize_tick(done);
        }
    }

    /// Next tier in round-robin order.
    pub fn next_tier(&self) -> Tier {
        let index = self.tier_cursor.fetch_add(1, Ordering::Relaxed);
        match self.config.tiers.len() {
            0 => Tier::Low,
            len => self.config.tiers.get(index % len).copied().unwrap_or(Tier::Low),
        }
    }

    async fn timed<T>(
        &self,
        call: impl Future<Output = Result<T, ChainError>>,
    ) -> Result<T, ChainError> {
        time::timeout(self.config.tx_timeout, call)
            .await
            .map_err(|_| ChainError::Timeout(self.config.tx_timeout))?
    }

    /// Submits one create-arena transaction for the next tier. The receipt's
    /// `ArenaCreated` log is applied right away so the arena is visible
    /// before the synchronizer delivers the same log.
    pub async fn create_tick(&self) -> Result<TxOutcome, SchedulerError> {
        let tier = self.next_tier();
        let duration_blocks = self.config.duration_blocks();
        let request = CreateArena {
            tier,
            entry_fee: tier.entry_fee(),
            duration_blocks,
            asset_pair: self.config.asset_pair.clone(),
        };

        let outcome = match self.timed(self.chain.create_arena(request)).await {
            Ok(outcome) => outcome,
            Err(err) => {
                metrics::record_tx_failed("create");
                return Err(err.into());
            }
        };
        metrics::record_tx_submitted("create");
        info!(target: "arena_keeper::scheduler", %tier, duration_blocks, tx_hash = %outcome.tx_hash, "Arena created");
        self.gateway.publish(GatewayMessage::create_submitted(
            tier.as_u8(),
            duration_blocks,
            outcome.tx_hash,
        ));

        for log in &outcome.logs {
            let Ok(decoded) = decode_log(log) else {
                continue;
            };
            if !matches!(decoded.event, ArenaEvent::ArenaCreated { .. }) {
                continue;
            }
            let applied = self.store.write(|txn| sync::apply(txn, &decoded))?;
            if applied == ApplyOutcome::Applied {
                self.gateway.publish(GatewayMessage::from_log(&decoded));
            }
        }

        Ok(outcome)
    }

    /// Finalizes every arena past its reveal window, concurrently.
    pub async fn finalize_tick(&self) -> Result<Vec<(u64, FinalizeOutcome)>, SchedulerError> {
        let current_block = self.timed(self.chain.block_number()).await?;
        self.head.observe(current_block);
        let reveal_blocks = self.config.reveal_period_blocks();
        let due = self.store.finalizable_arenas(current_block, reveal_blocks)?;
        if due.is_empty() {
            return Ok(Vec::new());
        }

        debug!(target: "arena_keeper::scheduler", current_block, due = due.len(), "Finalizing arenas");
        let work = due.into_iter().map(|arena| {
            async move {
                let id = arena.id;
                (id, self.finalize_arena(arena).await)
            }
        });
        Ok(join_all(work).await)
    }

    async fn finalize_arena(&self, arena: Arena) -> FinalizeOutcome {
        if !self.in_flight.lock().insert(arena.id) {
            debug!(target: "arena_keeper::scheduler", arena_id = arena.id, "Finalize already in flight");
            return FinalizeOutcome::InFlight;
        }
        let _guard = InFlightGuard {
            set: &self.in_flight,
            arena_id: arena.id,
        };

        match self.try_finalize(&arena).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(target: "arena_keeper::scheduler", arena_id = arena.id, error = ?err, "Finalize failed, will retry");
                FinalizeOutcome::Failed
            }
        }
    }

    async fn try_finalize(&self, arena: &Arena) -> Result<FinalizeOutcome, SchedulerError> {
        let players = self.store.player_addresses(arena.id)?;
        let local = u64::try_from(players.len()).unwrap_or(u64::MAX);

        // Checked before the empty shortcut: a join the synchronizer has not
        // applied yet must not close the arena locally.
        if self.config.cross_check {
            let onchain = self.timed(self.chain.arena_player_count(arena.id)).await?;
            if onchain != local {
                warn!(
                    target: "arena_keeper::scheduler",
                    arena_id = arena.id,
                    local,
                    onchain,
                    "Local player list disagrees with chain, skipping finalize"
                );
                return Ok(FinalizeOutcome::CountMismatch { local, onchain });
            }
        }

        if players.is_empty() {
            let now = chrono::Utc::now().timestamp();
            if self.store.write(|txn| txn.mark_finalized(arena.id, None, now))? {
                metrics::record_finalized_empty();
                info!(target: "arena_keeper::scheduler", arena_id = arena.id, "Closed arena with no players");
                self.gateway.publish(GatewayMessage::finalized_empty(arena));
            }
            return Ok(FinalizeOutcome::Empty);
        }

        self.submit_tape(arena).await;

        match self
            .timed(self.chain.finalize_arena(arena.id, players.clone()))
            .await
        {
            Ok(outcome) => {
                metrics::record_tx_submitted("finalize");
                info!(
                    target: "arena_keeper::scheduler",
                    arena_id = arena.id,
                    players = local,
                    tx_hash = %outcome.tx_hash,
                    "Finalize submitted"
                );
                self.gateway.publish(GatewayMessage::finalize_submitted(
                    arena.id,
                    &players,
                    Some(outcome.tx_hash),
                ));
                Ok(FinalizeOutcome::Submitted)
            }
            Err(err) if err.is_revert_matching(&self.config.already_finalized_marker) => {
                info!(target: "arena_keeper::scheduler", arena_id = arena.id, "Arena already finalized on-chain");
                Ok(FinalizeOutcome::AlreadyFinalized)
            }
            Err(err) => {
                metrics::record_tx_failed("finalize");
                Err(err.into())
            }
        }
    }

    /// Best effort: any failure is logged and finalize goes ahead.
    async fn submit_tape(&self, arena: &Arena) {
        let tape = match time::timeout(
            self.config.tx_timeout,
            self.tape
                .build_tape(&arena.asset_pair, arena.start_block, arena.end_block),
        )
        .await
        {
            Ok(Ok(tape)) => tape,
            Ok(Err(err)) => {
                warn!(target: "arena_keeper::scheduler", arena_id = arena.id, error = %err, "Price tape unavailable");
                return;
            }
            Err(_) => {
                warn!(target: "arena_keeper::scheduler", arena_id = arena.id, "Price tape request timed out");
                return;
            }
        };
        if tape.is_empty() {
            debug!(target: "arena_keeper::scheduler", arena_id = arena.id, "Empty price tape, not submitting");
            return;
        }

        let ticks = tape.len();
        match self
            .timed(self.chain.submit_price_tape(arena.id, tape))
            .await
        {
            Ok(outcome) => {
                metrics::record_tx_submitted("tape");
                debug!(target: "arena_keeper::scheduler", arena_id = arena.id, ticks, "Price tape submitted");
                self.gateway.publish(GatewayMessage::tape_submitted(
                    arena.id,
                    ticks,
                    outcome.tx_hash,
                ));
            }
            Err(err) => {
                metrics::record_tx_failed("tape");
                warn!(target: "arena_keeper::scheduler", arena_id = arena.id, error = ?err, "Price tape submission failed");
            }
        }
    }
}

fn log_finalize_tick(
    done: Result<Result<Vec<(u64, FinalizeOutcome)>, SchedulerError>, JoinError>,
) {
    match done {
        Ok(Ok(results)) => {
            for (arena_id, outcome) in results {
                debug!(target: "arena_keeper::scheduler", arena_id, ?outcome, "Finalize result");
            }
        }
        Ok(Err(err)) => {
            warn!(target: "arena_keeper::scheduler", error = ?err, "Finalize cycle failed, waiting for next tick");
        }
        Err(err) => critical!(error = ?err, "Finalize task aborted"),
    }
}

#[cfg(test)]
mod tests;
