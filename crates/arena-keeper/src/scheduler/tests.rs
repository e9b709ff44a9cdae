use super::*;
use crate::{
    sync::{
        SyncConfig,
        Synchronizer,
    },
    test_utils::{
        Failure,
        MockChain,
        MockFeed,
        MockTape,
        arena_created_log,
        finalized_log,
        player_joined_log,
    },
};
use alloy::primitives::{
    Address,
    U256,
    address,
};
use arena_core::ArenaStatus;

const ALICE: Address = address!("00000000000000000000000000000000000a11ce");
const BOB: Address = address!("0000000000000000000000000000000000000b0b");

/// 100 reveal blocks at the default 10ms block time.
fn config() -> SchedulerConfig {
    SchedulerConfig {
        reveal_period: Duration::from_secs(1),
        tx_timeout: Duration::from_secs(5),
        ..SchedulerConfig::default()
    }
}

struct Harness {
    chain: Arc<MockChain>,
    tape: Arc<MockTape>,
    store: ArenaStore,
    gateway: Gateway,
    scheduler: Arc<Scheduler>,
}

fn harness(block: u64, tape: MockTape, config: SchedulerConfig) -> Harness {
    let chain = Arc::new(MockChain::new(block));
    let tape = Arc::new(tape);
    let store = ArenaStore::in_memory().unwrap();
    let gateway = Gateway::new(64);
    let scheduler = Arc::new(Scheduler::new(
        chain.clone(),
        tape.clone(),
        store.clone(),
        gateway.clone(),
        ChainHead::new(),
        config,
    ));
    Harness {
        chain,
        tape,
        store,
        gateway,
        scheduler,
    }
}

/// Arena `id` spanning `[start, end]`, joined by `players`. Logs sit at block `id`.
fn seed_arena(store: &ArenaStore, id: u64, start: u64, end: u64, players: &[Address]) {
    let mut logs = vec![arena_created_log(id, 0, Tier::Low.entry_fee(), start, end, id, 0)];
    for (index, player) in players.iter().enumerate() {
        logs.push(player_joined_log(id, *player, id, index as u64 + 1));
    }
    store
        .write(|txn| {
            for log in &logs {
                sync::apply(txn, &decode_log(log).unwrap())?;
            }
            Ok::<_, StoreError>(())
        })
        .unwrap();
}

#[tokio::test]
async fn test_create_rotates_through_tiers() {
    let h = harness(1_000, MockTape::failing(), config());
    for _ in 0..6 {
        h.scheduler.create_tick().await.unwrap();
    }

    let created = h.chain.created();
    let tiers: Vec<Tier> = created.iter().map(|c| c.tier).collect();
    assert_eq!(
        tiers,
        vec![Tier::Low, Tier::Mid, Tier::High, Tier::Low, Tier::Mid, Tier::High]
    );
    for request in &created {
        assert_eq!(request.entry_fee, request.tier.entry_fee());
        assert_eq!(request.duration_blocks, 6_000);
        assert_eq!(request.asset_pair, "ETH/USD");
    }
}

#[tokio::test]
async fn test_custom_tier_list() {
    let h = harness(
        1_000,
        MockTape::failing(),
        SchedulerConfig {
            tiers: vec![Tier::Vip, Tier::Low],
            ..config()
        },
    );
    assert_eq!(h.scheduler.next_tier(), Tier::Vip);
    assert_eq!(h.scheduler.next_tier(), Tier::Low);
    assert_eq!(h.scheduler.next_tier(), Tier::Vip);
}

#[tokio::test]
async fn test_create_receipt_is_applied_to_store() {
    let h = harness(1_000, MockTape::failing(), config());
    let mut messages = h.gateway.subscribe();

    let outcome = h.scheduler.create_tick().await.unwrap();
    assert_eq!(outcome.logs.len(), 1);

    let arena = h.store.arena(1).unwrap().unwrap();
    assert_eq!(arena.tier, Tier::Low);
    assert_eq!(arena.start_block, 1_001);
    assert_eq!(arena.end_block, 7_001);
    assert_eq!(arena.status, ArenaStatus::Scheduled);
    assert!(!arena.placeholder);

    assert_eq!(messages.recv().await.unwrap().kind, "arena:create_submitted");
    assert_eq!(messages.recv().await.unwrap().kind, "arena:created");
}

#[tokio::test]
async fn test_create_failure_is_reported() {
    let h = harness(1_000, MockTape::failing(), config());
    h.chain
        .fail_create(Some(Failure::Transport("connection refused".into())));

    let err = h.scheduler.create_tick().await.unwrap_err();
    assert!(matches!(err, SchedulerError::Chain(ChainError::Transport(_))));
    assert!(h.store.arenas(10).unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_arena_is_closed_without_transaction() {
    let h = harness(300, MockTape::with_ticks(vec![U256::from(1)]), config());
    seed_arena(&h.store, 1, 50, 150, &[]);
    let mut messages = h.gateway.subscribe();

    let results = h.scheduler.finalize_tick().await.unwrap();
    assert_eq!(results, vec![(1, FinalizeOutcome::Empty)]);

    assert!(h.chain.finalized().is_empty());
    assert!(h.chain.tapes().is_empty());
    assert!(h.tape.calls().is_empty());

    let arena = h.store.arena(1).unwrap().unwrap();
    assert_eq!(arena.status, ArenaStatus::Finalized);
    assert_eq!(arena.final_price, None);
    assert_eq!(messages.recv().await.unwrap().kind, "arena:finalized_empty");

    // Closed arenas are no longer selected.
    assert!(h.scheduler.finalize_tick().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_finalize_waits_for_reveal_window() {
    let h = harness(249, MockTape::failing(), config());
    seed_arena(&h.store, 1, 50, 150, &[ALICE]);

    assert!(h.scheduler.finalize_tick().await.unwrap().is_empty());
    h.chain.set_block(250);
    assert!(h.scheduler.finalize_tick().await.unwrap().is_empty());
    h.chain.set_block(251);
    assert_eq!(
        h.scheduler.finalize_tick().await.unwrap(),
        vec![(1, FinalizeOutcome::Submitted)]
    );
    assert_eq!(h.chain.finalized(), vec![(1, vec![ALICE])]);
}

#[tokio::test]
async fn test_tape_is_submitted_before_finalize() {
    let ticks = vec![U256::from(3_000), U256::from(3_010)];
    let h = harness(300, MockTape::with_ticks(ticks.clone()), config());
    seed_arena(&h.store, 1, 50, 150, &[BOB, ALICE]);
    let mut messages = h.gateway.subscribe();

    h.scheduler.finalize_tick().await.unwrap();

    assert_eq!(h.tape.calls(), vec![("ETH/USD".to_owned(), 50, 150)]);
    assert_eq!(h.chain.tapes(), vec![(1, ticks)]);
    // Players are listed in address order.
    assert_eq!(h.chain.finalized(), vec![(1, vec![BOB, ALICE])]);
    assert_eq!(messages.recv().await.unwrap().kind, "arena:tape_submitted");
    let submitted = messages.recv().await.unwrap();
    assert_eq!(submitted.kind, "arena:finalize_submitted");
    assert_eq!(submitted.data["players"], 2);
}

#[tokio::test]
async fn test_empty_tape_is_not_submitted() {
    let h = harness(300, MockTape::with_ticks(Vec::new()), config());
    seed_arena(&h.store, 1, 50, 150, &[ALICE]);

    h.scheduler.finalize_tick().await.unwrap();
    assert!(h.chain.tapes().is_empty());
    assert_eq!(h.chain.finalized().len(), 1);
}

#[tokio::test]
async fn test_tape_failure_still_finalizes() {
    let h = harness(300, MockTape::failing(), config());
    seed_arena(&h.store, 1, 50, 150, &[ALICE]);

    assert_eq!(
        h.scheduler.finalize_tick().await.unwrap(),
        vec![(1, FinalizeOutcome::Submitted)]
    );
    assert!(h.chain.tapes().is_empty());

    // Status only flips when the synchronizer sees the event.
    assert_eq!(h.store.arena(1).unwrap().unwrap().status, ArenaStatus::Scheduled);
    let sync = Synchronizer::new(
        Arc::new(MockFeed::new(300)),
        h.store.clone(),
        h.gateway.clone(),
        ChainHead::new(),
        SyncConfig::default(),
    );
    sync.apply_live(&finalized_log(1, U256::from(3_005), 301, 0))
        .unwrap();
    let arena = h.store.arena(1).unwrap().unwrap();
    assert_eq!(arena.status, ArenaStatus::Finalized);
    assert_eq!(arena.final_price, Some(U256::from(3_005)));
}

#[tokio::test]
async fn test_tape_transaction_failure_still_finalizes() {
    let h = harness(300, MockTape::with_ticks(vec![U256::from(1)]), config());
    h.chain
        .fail_tape(Some(Failure::Revert("execution reverted: TapeTooLong".into())));
    seed_arena(&h.store, 1, 50, 150, &[ALICE]);

    assert_eq!(
        h.scheduler.finalize_tick().await.unwrap(),
        vec![(1, FinalizeOutcome::Submitted)]
    );
}

#[tokio::test]
async fn test_already_finalized_revert_is_not_a_failure() {
    let h = harness(300, MockTape::failing(), config());
    h.chain.fail_finalize(Some(Failure::Revert(
        "execution reverted: AlreadyFinalized".into(),
    )));
    seed_arena(&h.store, 1, 50, 150, &[ALICE]);

    assert_eq!(
        h.scheduler.finalize_tick().await.unwrap(),
        vec![(1, FinalizeOutcome::AlreadyFinalized)]
    );
    assert_eq!(h.store.arena(1).unwrap().unwrap().status, ArenaStatus::Scheduled);
}

#[tokio::test]
async fn test_other_finalize_errors_are_retried() {
    let h = harness(300, MockTape::failing(), config());
    h.chain
        .fail_finalize(Some(Failure::Revert("execution reverted: NotEnded".into())));
    seed_arena(&h.store, 1, 50, 150, &[ALICE]);

    assert_eq!(
        h.scheduler.finalize_tick().await.unwrap(),
        vec![(1, FinalizeOutcome::Failed)]
    );

    h.chain.fail_finalize(None);
    assert_eq!(
        h.scheduler.finalize_tick().await.unwrap(),
        vec![(1, FinalizeOutcome::Submitted)]
    );
}

#[tokio::test]
async fn test_cross_check_mismatch_skips_finalize() {
    let h = harness(
        300,
        MockTape::failing(),
        SchedulerConfig {
            cross_check: true,
            ..config()
        },
    );
    seed_arena(&h.store, 1, 50, 150, &[ALICE]);
    h.chain.set_player_count(1, 2);

    assert_eq!(
        h.scheduler.finalize_tick().await.unwrap(),
        vec![(1, FinalizeOutcome::CountMismatch { local: 1, onchain: 2 })]
    );
    assert!(h.chain.finalized().is_empty());

    h.chain.set_player_count(1, 1);
    assert_eq!(
        h.scheduler.finalize_tick().await.unwrap(),
        vec![(1, FinalizeOutcome::Submitted)]
    );
}

#[tokio::test]
async fn test_cross_check_keeps_arena_open_until_late_join_syncs() {
    let h = harness(
        300,
        MockTape::failing(),
        SchedulerConfig {
            cross_check: true,
            ..config()
        },
    );
    seed_arena(&h.store, 1, 50, 150, &[]);
    h.chain.set_player_count(1, 1);

    assert_eq!(
        h.scheduler.finalize_tick().await.unwrap(),
        vec![(1, FinalizeOutcome::CountMismatch { local: 0, onchain: 1 })]
    );
    assert!(h.chain.finalized().is_empty());
    assert_eq!(h.store.arena(1).unwrap().unwrap().status, ArenaStatus::Scheduled);

    // The join lands once the synchronizer catches up.
    h.store
        .write(|txn| sync::apply(txn, &decode_log(&player_joined_log(1, ALICE, 400, 0)).unwrap()))
        .unwrap();
    assert_eq!(
        h.scheduler.finalize_tick().await.unwrap(),
        vec![(1, FinalizeOutcome::Submitted)]
    );
    assert_eq!(h.chain.finalized(), vec![(1, vec![ALICE])]);
}

#[tokio::test]
async fn test_cross_check_still_closes_arena_empty_on_chain() {
    let h = harness(
        300,
        MockTape::failing(),
        SchedulerConfig {
            cross_check: true,
            ..config()
        },
    );
    seed_arena(&h.store, 1, 50, 150, &[]);

    assert_eq!(
        h.scheduler.finalize_tick().await.unwrap(),
        vec![(1, FinalizeOutcome::Empty)]
    );
    assert!(h.chain.finalized().is_empty());
    assert_eq!(h.store.arena(1).unwrap().unwrap().status, ArenaStatus::Finalized);
}

#[tokio::test]
async fn test_slow_finalize_times_out() {
    let h = harness(
        300,
        MockTape::failing(),
        SchedulerConfig {
            tx_timeout: Duration::from_millis(50),
            ..config()
        },
    );
    h.chain.delay_finalize(Some(Duration::from_millis(500)));
    seed_arena(&h.store, 1, 50, 150, &[ALICE]);

    assert_eq!(
        h.scheduler.finalize_tick().await.unwrap(),
        vec![(1, FinalizeOutcome::Failed)]
    );
}

#[tokio::test]
async fn test_overlapping_ticks_finalize_once() {
    let h = harness(300, MockTape::failing(), config());
    h.chain.delay_finalize(Some(Duration::from_millis(100)));
    seed_arena(&h.store, 1, 50, 150, &[ALICE]);

    let (first, second) = tokio::join!(h.scheduler.finalize_tick(), h.scheduler.finalize_tick());
    let mut outcomes: Vec<FinalizeOutcome> = first
        .unwrap()
        .into_iter()
        .chain(second.unwrap())
        .map(|(_, outcome)| outcome)
        .collect();
    outcomes.sort_by_key(|o| matches!(o, FinalizeOutcome::InFlight));
    assert_eq!(outcomes, vec![FinalizeOutcome::Submitted, FinalizeOutcome::InFlight]);
    assert_eq!(h.chain.finalized().len(), 1);
}

#[tokio::test]
async fn test_arenas_finalize_independently() {
    let h = harness(1_000, MockTape::failing(), config());
    seed_arena(&h.store, 1, 50, 150, &[ALICE]);
    seed_arena(&h.store, 2, 60, 160, &[]);
    seed_arena(&h.store, 3, 900, 990, &[BOB]);

    let mut results = h.scheduler.finalize_tick().await.unwrap();
    results.sort_by_key(|(id, _)| *id);
    assert_eq!(
        results,
        vec![(1, FinalizeOutcome::Submitted), (2, FinalizeOutcome::Empty)]
    );
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let h = harness(
        300,
        MockTape::failing(),
        SchedulerConfig {
            create_interval: Duration::from_millis(20),
            finalize_interval: Duration::from_millis(20),
            ..config()
        },
    );
    seed_arena(&h.store, 100, 50, 150, &[ALICE]);
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(Arc::clone(&h.scheduler).run(shutdown.clone()));

    tokio::time::sleep(Duration::from_millis(150)).await;
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();

    assert!(!h.chain.created().is_empty());
    let finalized = h.chain.finalized();
    assert!(!finalized.is_empty());
    assert!(finalized.iter().all(|f| *f == (100, vec![ALICE])));
}
