//! In-memory chain and oracle doubles plus log builders for tests.

use crate::{
    chain::{
        ArenaChain,
        ChainError,
        CreateArena,
        EventFeed,
        TxOutcome,
    },
    price_tape::{
        PriceTapeError,
        PriceTapeSource,
    },
};
use alloy::{
    primitives::{
        Address,
        B256,
        LogData,
        U256,
        address,
    },
    rpc::types::Log,
    sol_types::SolEvent,
};
use arena_core::abi::IArenaEngine;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    time::Duration,
};
use tokio::sync::mpsc;

pub const CONTRACT: Address = address!("De32993819Ca96eb08e8bE8b7D5A31585a17D033");

/// Wraps encoded event data into an RPC log at `(block_number, log_index)`.
pub fn log_at(data: LogData, block_number: u64, log_index: u64) -> Log {
    Log {
        inner: alloy::primitives::Log {
            address: CONTRACT,
            data,
        },
        block_number: Some(block_number),
        log_index: Some(log_index),
        transaction_hash: Some(B256::with_last_byte(u8::try_from(block_number % 256).unwrap_or(0))),
        ..Default::default()
    }
}

pub fn arena_created_log(
    arena_id: u64,
    tier: u8,
    entry_fee: U256,
    start_block: u64,
    end_block: u64,
    block_number: u64,
    log_index: u64,
) -> Log {
    let event = IArenaEngine::ArenaCreated {
        arenaId: U256::from(arena_id),
        tier,
        entryFee: entry_fee,
        startBlock: U256::from(start_block),
        endBlock: U256::from(end_block),
        assetPair: "ETH/USD".into(),
    };
    log_at(event.encode_log_data(), block_number, log_index)
}

pub fn player_joined_log(arena_id: u64, player: Address, block_number: u64, log_index: u64) -> Log {
    let event = IArenaEngine::PlayerJoined {
        arenaId: U256::from(arena_id),
        player,
    };
    log_at(event.encode_log_data(), block_number, log_index)
}

pub fn committed_log(
    arena_id: u64,
    player: Address,
    commit_hash: B256,
    block_number: u64,
    log_index: u64,
) -> Log {
    let event = IArenaEngine::PredictionCommitted {
        arenaId: U256::from(arena_id),
        player,
        commitHash: commit_hash,
    };
    log_at(event.encode_log_data(), block_number, log_index)
}

pub fn revealed_log(
    arena_id: u64,
    player: Address,
    prediction: U256,
    block_number: u64,
    log_index: u64,
) -> Log {
    let event = IArenaEngine::PredictionRevealed {
        arenaId: U256::from(arena_id),
        player,
        prediction,
    };
    log_at(event.encode_log_data(), block_number, log_index)
}

pub fn finalized_log(arena_id: u64, final_price: U256, block_number: u64, log_index: u64) -> Log {
    let event = IArenaEngine::ArenaFinalized {
        arenaId: U256::from(arena_id),
        finalPrice: final_price,
    };
    log_at(event.encode_log_data(), block_number, log_index)
}

pub fn god_streak_log(player: Address, streak: u64, block_number: u64, log_index: u64) -> Log {
    let event = IArenaEngine::GodStreakUpdate {
        player,
        streak: U256::from(streak),
    };
    log_at(event.encode_log_data(), block_number, log_index)
}

pub fn pot_distributed_log(
    arena_id: u64,
    winner: Address,
    amount: U256,
    block_number: u64,
    log_index: u64,
) -> Log {
    let event = IArenaEngine::PotDistributed {
        arenaId: U256::from(arena_id),
        winner,
        amount,
    };
    log_at(event.encode_log_data(), block_number, log_index)
}

#[derive(Default)]
struct FeedState {
    head: u64,
    history: Vec<Log>,
    live: Option<mpsc::Sender<Log>>,
    subscriptions: usize,
    queries: Vec<(u64, u64)>,
    fail_keepalive: bool,
    fail_logs: bool,
}

/// Scriptable [`EventFeed`]: historical logs are served from memory, live
/// logs are pushed through the most recent subscription.
#[derive(Default)]
pub struct MockFeed {
    state: Mutex<FeedState>,
}

impl MockFeed {
    pub fn new(head: u64) -> Self {
        let feed = Self::default();
        feed.state.lock().head = head;
        feed
    }

    pub fn set_head(&self, head: u64) {
        self.state.lock().head = head;
    }

    /// Adds a log to the history served by `logs`.
    pub fn push_history(&self, log: Log) {
        self.state.lock().history.push(log);
    }

    /// Delivers a log on the live subscription. Returns `false` if there is
    /// no open subscription.
    pub async fn send_live(&self, log: Log) -> bool {
        let sender = self.state.lock().live.clone();
        match sender {
            Some(tx) => tx.send(log).await.is_ok(),
            None => false,
        }
    }

    /// Drops the live sender, which the synchronizer sees as a disconnect.
    /// This is also how a lagged subscription surfaces.
    pub fn close_live(&self) {
        self.state.lock().live = None;
    }

    pub fn fail_keepalive(&self, fail: bool) {
        self.state.lock().fail_keepalive = fail;
    }

    pub fn fail_logs(&self, fail: bool) {
        self.state.lock().fail_logs = fail;
    }

    pub fn subscriptions(&self) -> usize {
        self.state.lock().subscriptions
    }

    /// Every `(from, to)` range requested so far.
    pub fn queries(&self) -> Vec<(u64, u64)> {
        self.state.lock().queries.clone()
    }
}

#[async_trait]
impl EventFeed for MockFeed {
    async fn block_number(&self) -> Result<u64, ChainError> {
        Ok(self.state.lock().head)
    }

    async fn logs(&self, from_block: u64, to_block: u64) -> Result<Vec<Log>, ChainError> {
        let mut state = self.state.lock();
        state.queries.push((from_block, to_block));
        if state.fail_logs {
            return Err(ChainError::Transport("logs unavailable".into()));
        }
        Ok(state
            .history
            .iter()
            .filter(|log| {
                log.block_number
                    .is_some_and(|b| b >= from_block && b <= to_block)
            })
            .cloned()
            .collect())
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<Log>, ChainError> {
        let (tx, rx) = mpsc::channel(256);
        let mut state = self.state.lock();
        state.live = Some(tx);
        state.subscriptions += 1;
        Ok(rx)
    }

    async fn keepalive(&self) -> Result<(), ChainError> {
        if self.state.lock().fail_keepalive {
            return Err(ChainError::Transport("keepalive failed".into()));
        }
        Ok(())
    }
}

/// How a scripted [`MockChain`] call fails.
#[derive(Debug, Clone)]
pub enum Failure {
    Revert(String),
    Transport(String),
}

impl Failure {
    fn to_error(&self) -> ChainError {
        match self {
            Failure::Revert(reason) => {
                ChainError::Reverted {
                    reason: reason.clone(),
                    data: None,
                }
            }
            Failure::Transport(msg) => ChainError::Transport(msg.clone()),
        }
    }
}

#[derive(Default)]
struct ChainState {
    block: u64,
    next_arena_id: u64,
    tx_counter: u8,
    created: Vec<CreateArena>,
    tapes: Vec<(u64, Vec<U256>)>,
    finalized: Vec<(u64, Vec<Address>)>,
    player_counts: HashMap<u64, u64>,
    create_failure: Option<Failure>,
    tape_failure: Option<Failure>,
    finalize_failure: Option<Failure>,
    finalize_delay: Option<Duration>,
}

/// Scriptable [`ArenaChain`] recording every transaction it receives.
#[derive(Default)]
pub struct MockChain {
    state: Mutex<ChainState>,
}

impl MockChain {
    pub fn new(block: u64) -> Self {
        let chain = Self::default();
        {
            let mut state = chain.state.lock();
            state.block = block;
            state.next_arena_id = 1;
        }
        chain
    }

    pub fn set_block(&self, block: u64) {
        self.state.lock().block = block;
    }

    pub fn set_player_count(&self, arena_id: u64, count: u64) {
        self.state.lock().player_counts.insert(arena_id, count);
    }

    pub fn fail_create(&self, failure: Option<Failure>) {
        self.state.lock().create_failure = failure;
    }

    pub fn fail_tape(&self, failure: Option<Failure>) {
        self.state.lock().tape_failure = failure;
    }

    pub fn fail_finalize(&self, failure: Option<Failure>) {
        self.state.lock().finalize_failure = failure;
    }

    pub fn delay_finalize(&self, delay: Option<Duration>) {
        self.state.lock().finalize_delay = delay;
    }

    pub fn created(&self) -> Vec<CreateArena> {
        self.state.lock().created.clone()
    }

    pub fn tapes(&self) -> Vec<(u64, Vec<U256>)> {
        self.state.lock().tapes.clone()
    }

    pub fn finalized(&self) -> Vec<(u64, Vec<Address>)> {
        self.state.lock().finalized.clone()
    }

    fn next_tx(state: &mut ChainState) -> B256 {
        state.tx_counter = state.tx_counter.wrapping_add(1);
        B256::repeat_byte(state.tx_counter)
    }
}

#[async_trait]
impl ArenaChain for MockChain {
    async fn block_number(&self) -> Result<u64, ChainError> {
        Ok(self.state.lock().block)
    }

    /// Records the request and returns a receipt carrying `ArenaCreated`,
    /// with the arena starting at the next block. The log index is the
    /// arena id, so repeated creates in one block never share a position.
    async fn create_arena(&self, request: CreateArena) -> Result<TxOutcome, ChainError> {
        let mut state = self.state.lock();
        if let Some(failure) = &state.create_failure {
            return Err(failure.to_error());
        }
        let arena_id = state.next_arena_id;
        state.next_arena_id += 1;
        let block = state.block;
        let start_block = block + 1;
        let log = arena_created_log(
            arena_id,
            request.tier.as_u8(),
            request.entry_fee,
            start_block,
            start_block + request.duration_blocks,
            block,
            arena_id,
        );
        state.created.push(request);
        let tx_hash = Self::next_tx(&mut state);
        Ok(TxOutcome {
            tx_hash,
            block_number: Some(block),
            logs: vec![log],
        })
    }

    async fn submit_price_tape(
        &self,
        arena_id: u64,
        tape: Vec<U256>,
    ) -> Result<TxOutcome, ChainError> {
        let mut state = self.state.lock();
        if let Some(failure) = &state.tape_failure {
            return Err(failure.to_error());
        }
        state.tapes.push((arena_id, tape));
        let tx_hash = Self::next_tx(&mut state);
        Ok(TxOutcome {
            tx_hash,
            block_number: Some(state.block),
            logs: Vec::new(),
        })
    }

    async fn finalize_arena(
        &self,
        arena_id: u64,
        players: Vec<Address>,
    ) -> Result<TxOutcome, ChainError> {
        let delay = self.state.lock().finalize_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock();
        if let Some(failure) = &state.finalize_failure {
            return Err(failure.to_error());
        }
        state.finalized.push((arena_id, players));
        let tx_hash = Self::next_tx(&mut state);
        Ok(TxOutcome {
            tx_hash,
            block_number: Some(state.block),
            logs: Vec::new(),
        })
    }

    async fn arena_player_count(&self, arena_id: u64) -> Result<u64, ChainError> {
        Ok(self
            .state
            .lock()
            .player_counts
            .get(&arena_id)
            .copied()
            .unwrap_or(0))
    }
}

/// Scriptable [`PriceTapeSource`].
#[derive(Default)]
pub struct MockTape {
    ticks: Mutex<Option<Vec<U256>>>,
    calls: Mutex<Vec<(String, u64, u64)>>,
}

impl MockTape {
    /// A source that always returns `ticks`.
    pub fn with_ticks(ticks: Vec<U256>) -> Self {
        Self {
            ticks: Mutex::new(Some(ticks)),
            calls: Mutex::default(),
        }
    }

    /// A source whose oracle is always unavailable.
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(String, u64, u64)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl PriceTapeSource for MockTape {
    async fn build_tape(
        &self,
        asset_pair: &str,
        start_block: u64,
        end_block: u64,
    ) -> Result<Vec<U256>, PriceTapeError> {
        self.calls
            .lock()
            .push((asset_pair.to_owned(), start_block, end_block));
        self.ticks
            .lock()
            .clone()
            .ok_or_else(|| PriceTapeError::InvalidTick("oracle unavailable".into()))
    }
}
