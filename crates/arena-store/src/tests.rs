use crate::{
    ArenaInsert,
    ArenaStore,
    NewArena,
    StoreError,
};
use alloy::primitives::{
    Address,
    B256,
    U256,
    address,
};
use arena_core::{
    ArenaStatus,
    Tier,
};

const ALICE: Address = address!("00000000000000000000000000000000000000a1");
const BOB: Address = address!("00000000000000000000000000000000000000b2");

fn new_arena(id: u64, end_block: u64) -> NewArena {
    NewArena {
        id,
        tier: Tier::Mid,
        entry_fee: U256::from(100),
        start_block: end_block.saturating_sub(100),
        end_block,
        asset_pair: "ETH/USD".into(),
        creation_tx_hash: Some(B256::repeat_byte(0x11)),
    }
}

fn join(store: &ArenaStore, arena_id: u64, player: &Address) {
    store
        .write(|txn| {
            if txn.insert_player(arena_id, player)? {
                txn.bump_arena_entry(arena_id)?;
                txn.bump_total_arenas(player)?;
            }
            Ok::<_, StoreError>(())
        })
        .unwrap();
}

#[test]
fn test_first_arena_writer_wins() {
    let store = ArenaStore::in_memory().unwrap();
    let first = new_arena(1, 200);
    let mut second = new_arena(1, 999);
    second.asset_pair = "BTC/USD".into();

    let outcomes = store
        .write(|txn| Ok::<_, StoreError>((txn.insert_arena(&first)?, txn.insert_arena(&second)?)))
        .unwrap();
    assert_eq!(outcomes, (ArenaInsert::Inserted, ArenaInsert::Existing));

    let arena = store.arena(1).unwrap().unwrap();
    assert_eq!(arena.end_block, 200);
    assert_eq!(arena.asset_pair, "ETH/USD");
    assert_eq!(arena.status, ArenaStatus::Scheduled);
    assert_eq!(arena.creation_tx_hash, Some(B256::repeat_byte(0x11)));
}

#[test]
fn test_placeholder_is_filled_and_pot_recomputed() {
    let store = ArenaStore::in_memory().unwrap();
    store
        .write(|txn| {
            assert!(txn.insert_placeholder_arena(5)?);
            assert!(!txn.insert_placeholder_arena(5)?);
            Ok::<_, StoreError>(())
        })
        .unwrap();
    join(&store, 5, &ALICE);
    join(&store, 5, &BOB);

    let placeholder = store.arena(5).unwrap().unwrap();
    assert!(placeholder.placeholder);
    assert_eq!(placeholder.player_count, 2);
    assert_eq!(placeholder.pot, U256::ZERO);

    let outcome = store.write(|txn| txn.insert_arena(&new_arena(5, 300))).unwrap();
    assert_eq!(outcome, ArenaInsert::FilledPlaceholder);

    let arena = store.arena(5).unwrap().unwrap();
    assert!(!arena.placeholder);
    assert_eq!(arena.player_count, 2);
    assert_eq!(arena.pot, U256::from(200));
    assert_eq!(arena.end_block, 300);
}

#[test]
fn test_player_entry_is_unique() {
    let store = ArenaStore::in_memory().unwrap();
    store.write(|txn| txn.insert_arena(&new_arena(1, 200))).unwrap();
    for _ in 0..3 {
        join(&store, 1, &ALICE);
    }

    assert_eq!(store.players(1).unwrap().len(), 1);
    let arena = store.arena(1).unwrap().unwrap();
    assert_eq!(arena.player_count, 1);
    assert_eq!(arena.pot, U256::from(100));
    assert_eq!(store.player_stats(&ALICE).unwrap().unwrap().total_arenas, 1);
}

#[test]
fn test_commit_reveal_and_payout() {
    let store = ArenaStore::in_memory().unwrap();
    store.write(|txn| txn.insert_arena(&new_arena(1, 200))).unwrap();
    join(&store, 1, &ALICE);
    store
        .write(|txn| {
            txn.set_commitment(1, &ALICE, &B256::repeat_byte(0xaa))?;
            txn.set_revealed(1, &ALICE, U256::from(3_000))?;
            txn.add_payout(1, &ALICE, U256::from(150))?;
            txn.add_payout(1, &ALICE, U256::from(50))
        })
        .unwrap();

    let entry = &store.players(1).unwrap()[0];
    assert_eq!(entry.commitment_hash, Some(B256::repeat_byte(0xaa)));
    assert!(entry.revealed);
    assert_eq!(entry.prediction, Some(U256::from(3_000)));
    assert_eq!(entry.payout, Some(U256::from(200)));
}

#[test]
fn test_finalize_only_moves_forward() {
    let store = ArenaStore::in_memory().unwrap();
    store.write(|txn| txn.insert_arena(&new_arena(1, 200))).unwrap();

    let first = store
        .write(|txn| txn.mark_finalized(1, Some(U256::from(42)), 1_700_000_000))
        .unwrap();
    let second = store
        .write(|txn| txn.mark_finalized(1, Some(U256::from(43)), 1_800_000_000))
        .unwrap();
    assert!(first);
    assert!(!second);

    let arena = store.arena(1).unwrap().unwrap();
    assert_eq!(arena.status, ArenaStatus::Finalized);
    assert_eq!(arena.final_price, Some(U256::from(42)));
    assert_eq!(arena.finalized_at, Some(1_700_000_000));
}

#[test]
fn test_checkpoint_never_decreases() {
    let store = ArenaStore::in_memory().unwrap();
    assert_eq!(store.checkpoint().unwrap(), None);

    for block in [100, 105, 103, 0, 105] {
        store.write(|txn| txn.advance_checkpoint(block)).unwrap();
    }
    assert_eq!(store.checkpoint().unwrap(), Some(105));
}

#[test]
fn test_failed_write_rolls_back() {
    let store = ArenaStore::in_memory().unwrap();
    let result: Result<(), StoreError> = store.write(|txn| {
        txn.mark_processed(10, 0)?;
        txn.insert_arena(&new_arena(1, 200))?;
        txn.advance_checkpoint(10)?;
        Err(StoreError::OutOfRange(u64::MAX))
    });
    assert!(result.is_err());

    assert!(!store.is_processed(10, 0).unwrap());
    assert!(store.arena(1).unwrap().is_none());
    assert_eq!(store.checkpoint().unwrap(), None);
}

#[test]
fn test_processed_ledger_dedups() {
    let store = ArenaStore::in_memory().unwrap();
    assert!(store.write(|txn| txn.mark_processed(7, 2)).unwrap());
    assert!(!store.write(|txn| txn.mark_processed(7, 2)).unwrap());
    assert!(store.write(|txn| txn.mark_processed(7, 3)).unwrap());
    assert!(store.is_processed(7, 2).unwrap());
}

#[test]
fn test_finalizable_respects_reveal_boundary() {
    let store = ArenaStore::in_memory().unwrap();
    store.write(|txn| txn.insert_arena(&new_arena(1, 200))).unwrap();
    store
        .write(|txn| txn.insert_placeholder_arena(2).map(|_| ()))
        .unwrap();

    assert!(store.finalizable_arenas(249, 50).unwrap().is_empty());
    assert!(store.finalizable_arenas(250, 50).unwrap().is_empty());
    let ready = store.finalizable_arenas(251, 50).unwrap();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].id, 1);

    assert!(store.finalizable_arenas(10, 50).unwrap().is_empty());

    store
        .write(|txn| txn.mark_finalized(1, None, 0).map(|_| ()))
        .unwrap();
    assert!(store.finalizable_arenas(10_000, 50).unwrap().is_empty());
}

#[test]
fn test_streaks_and_losses() {
    let store = ArenaStore::in_memory().unwrap();
    for id in 1..=3 {
        store.write(|txn| txn.insert_arena(&new_arena(id, 200))).unwrap();
        join(&store, id, &ALICE);
        join(&store, id, &BOB);
    }

    // Alice wins arenas 1 and 2, Bob wins 3.
    for (arena_id, winner) in [(1, ALICE), (2, ALICE), (3, BOB)] {
        store
            .write(|txn| {
                txn.add_payout(arena_id, &winner, U256::from(200))?;
                txn.record_win(&winner, U256::from(200))?;
                txn.mark_finalized(arena_id, Some(U256::from(1)), 0)?;
                txn.reset_streaks_for_losers(arena_id)
            })
            .unwrap();
    }

    let alice = store.player_stats(&ALICE).unwrap().unwrap();
    assert_eq!(alice.wins, 2);
    assert_eq!(alice.current_streak, 0);
    assert_eq!(alice.best_streak, 2);
    assert_eq!(alice.total_pnl, U256::from(400));
    assert_eq!(alice.total_arenas, 3);

    let bob = store.player_stats(&BOB).unwrap().unwrap();
    assert_eq!(bob.wins, 1);
    assert_eq!(bob.current_streak, 1);
    assert_eq!(bob.best_streak, 1);

    let board = store.leaderboard(10).unwrap();
    assert_eq!(board[0].address, ALICE);
    assert_eq!(board[1].address, BOB);
    assert_eq!(store.leaderboard(1).unwrap().len(), 1);
}

#[test]
fn test_payout_after_finalize_restores_streak() {
    let store = ArenaStore::in_memory().unwrap();
    for id in 1..=3 {
        store.write(|txn| txn.insert_arena(&new_arena(id, 200))).unwrap();
        join(&store, id, &ALICE);
        join(&store, id, &BOB);
    }

    // Alice wins every arena, but the payout lands after the finalize.
    for arena_id in 1..=3 {
        store
            .write(|txn| {
                txn.mark_finalized(arena_id, Some(U256::from(1)), 0)?;
                txn.reset_streaks_for_losers(arena_id)?;
                txn.add_payout(arena_id, &ALICE, U256::from(200))?;
                assert!(txn.restore_reset_streak(arena_id, &ALICE)?);
                txn.record_win(&ALICE, U256::from(200))
            })
            .unwrap();
    }

    let alice = store.player_stats(&ALICE).unwrap().unwrap();
    assert_eq!(alice.wins, 3);
    assert_eq!(alice.current_streak, 3);
    assert_eq!(alice.best_streak, 3);

    let bob = store.player_stats(&BOB).unwrap().unwrap();
    assert_eq!(bob.current_streak, 0);
    // Nothing pending once restored, and never for a loser's untouched entry.
    assert!(!store.write(|txn| txn.restore_reset_streak(1, &ALICE)).unwrap());
    assert!(!store.write(|txn| txn.restore_reset_streak(9, &BOB)).unwrap());
}

#[test]
fn test_prune_processed_records_horizon() {
    let store = ArenaStore::in_memory().unwrap();
    assert_eq!(store.pruned_below().unwrap(), None);
    store
        .write(|txn| {
            for block in [5, 10, 15] {
                txn.mark_processed(block, 0)?;
            }
            Ok::<_, StoreError>(())
        })
        .unwrap();

    assert_eq!(store.write(|txn| txn.prune_processed(11)).unwrap(), 2);
    assert!(!store.is_processed(5, 0).unwrap());
    assert!(!store.is_processed(10, 0).unwrap());
    assert!(store.is_processed(15, 0).unwrap());
    assert_eq!(store.pruned_below().unwrap(), Some(11));

    // The horizon never moves back.
    assert_eq!(store.write(|txn| txn.prune_processed(3)).unwrap(), 0);
    assert_eq!(store.pruned_below().unwrap(), Some(11));
}

#[test]
fn test_god_streak_keeps_maximum() {
    let store = ArenaStore::in_memory().unwrap();
    for streak in [3, 7, 5] {
        store.write(|txn| txn.record_god_streak(&ALICE, streak)).unwrap();
    }
    assert_eq!(store.player_stats(&ALICE).unwrap().unwrap().god_streak, 7);
}

#[test]
fn test_arenas_newest_first() {
    let store = ArenaStore::in_memory().unwrap();
    for id in [3, 1, 2] {
        store.write(|txn| txn.insert_arena(&new_arena(id, 200))).unwrap();
    }
    let ids: Vec<_> = store.arenas(2).unwrap().iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![3, 2]);
}

#[test]
fn test_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("arena.db");
    {
        let store = ArenaStore::open(&path).unwrap();
        store.write(|txn| txn.insert_arena(&new_arena(1, 200))).unwrap();
        join(&store, 1, &ALICE);
        store.write(|txn| txn.advance_checkpoint(120)).unwrap();
    }

    let store = ArenaStore::open(&path).unwrap();
    assert_eq!(store.checkpoint().unwrap(), Some(120));
    assert_eq!(store.player_addresses(1).unwrap(), vec![ALICE]);
    assert_eq!(store.arena(1).unwrap().unwrap().player_count, 1);
}
