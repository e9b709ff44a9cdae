//! Per-event store mutations.
//!
//! [`apply`] runs inside the caller's store transaction. The log position is
//! recorded in the processed-log ledger first; if it was already there the
//! event is a replay and nothing else is written.

use alloy::primitives::Address;
use arena_core::{
    ArenaEvent,
    ArenaLog,
    Tier,
};
use arena_store::{
    ArenaInsert,
    NewArena,
    StoreResult,
    StoreTxn,
};
use tracing::{
    debug,
    warn,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Position already in the ledger.
    Duplicate,
    /// Recorded as processed but carried nothing applicable.
    Skipped,
}

pub fn apply(txn: &StoreTxn<'_>, log: &ArenaLog) -> StoreResult<ApplyOutcome> {
    if !txn.mark_processed(log.block_number, log.log_index)? {
        debug!(
            target: "arena_keeper::sync",
            block_number = log.block_number,
            log_index = log.log_index,
            event = log.event.name(),
            "Skipping already processed log"
        );
        return Ok(ApplyOutcome::Duplicate);
    }

    match &log.event {
        ArenaEvent::ArenaCreated {
            arena_id,
            tier,
            entry_fee,
            start_block,
            end_block,
            asset_pair,
        } => {
            let Ok(tier) = Tier::try_from(*tier) else {
                warn!(target: "arena_keeper::sync", arena_id, tier, "ArenaCreated with unknown tier, skipping");
                return Ok(ApplyOutcome::Skipped);
            };
            let outcome = txn.insert_arena(&NewArena {
                id: *arena_id,
                tier,
                entry_fee: *entry_fee,
                start_block: *start_block,
                end_block: *end_block,
                asset_pair: asset_pair.clone(),
                creation_tx_hash: log.tx_hash,
            })?;
            match outcome {
                ArenaInsert::Inserted => {}
                ArenaInsert::FilledPlaceholder => {
                    warn!(target: "arena_keeper::sync", arena_id, "ArenaCreated filled a placeholder arena");
                }
                ArenaInsert::Existing => {
                    debug!(target: "arena_keeper::sync", arena_id, "Arena already recorded, keeping first write");
                }
            }
        }
        ArenaEvent::PlayerJoined { arena_id, player } => {
            ensure_entry(txn, *arena_id, player, "PlayerJoined")?;
        }
        ArenaEvent::PredictionCommitted {
            arena_id,
            player,
            commit_hash,
        } => {
            if ensure_entry(txn, *arena_id, player, "PredictionCommitted")? {
                warn!(target: "arena_keeper::sync", arena_id, %player, "Commit for unknown entry, entry created");
            }
            txn.set_commitment(*arena_id, player, commit_hash)?;
        }
        ArenaEvent::PredictionRevealed {
            arena_id,
            player,
            prediction,
        } => {
            if ensure_entry(txn, *arena_id, player, "PredictionRevealed")? {
                warn!(target: "arena_keeper::sync", arena_id, %player, "Reveal for unknown entry, entry created");
            }
            txn.set_revealed(*arena_id, player, *prediction)?;
        }
        ArenaEvent::ArenaFinalized {
            arena_id,
            final_price,
        } => {
            if txn.insert_placeholder_arena(*arena_id)? {
                warn!(target: "arena_keeper::sync", arena_id, "ArenaFinalized for unknown arena, placeholder created");
            }
            let finalized_at = chrono::Utc::now().timestamp();
            if txn.mark_finalized(*arena_id, Some(*final_price), finalized_at)? {
                let reset = txn.reset_streaks_for_losers(*arena_id)?;
                debug!(target: "arena_keeper::sync", arena_id, streaks_reset = reset, "Arena finalized");
            } else {
                debug!(target: "arena_keeper::sync", arena_id, "Arena already finalized");
            }
        }
        ArenaEvent::GodStreakUpdate { player, streak } => {
            txn.record_god_streak(player, *streak)?;
        }
        ArenaEvent::PotDistributed {
            arena_id,
            winner,
            amount,
        } => {
            if ensure_entry(txn, *arena_id, winner, "PotDistributed")? {
                warn!(target: "arena_keeper::sync", arena_id, %winner, "Payout for unknown entry, entry created");
            }
            txn.add_payout(*arena_id, winner, *amount)?;
            if txn.restore_reset_streak(*arena_id, winner)? {
                debug!(target: "arena_keeper::sync", arena_id, %winner, "Payout after finalize, streak restored");
            }
            txn.record_win(winner, *amount)?;
        }
    }

    Ok(ApplyOutcome::Applied)
}

/// Makes sure the `(arena, player)` entry exists, creating a placeholder
/// arena first if needed. A new entry carries the join side effects
/// (player count, pot, `total_arenas`), so a join delivered after its
/// commit or payout does not count twice. Returns `true` if the entry was
/// created.
fn ensure_entry(
    txn: &StoreTxn<'_>,
    arena_id: u64,
    player: &Address,
    event: &'static str,
) -> StoreResult<bool> {
    if txn.insert_placeholder_arena(arena_id)? {
        warn!(target: "arena_keeper::sync", arena_id, event, "Event references unknown arena, placeholder created");
    }
    let created = txn.insert_player(arena_id, player)?;
    if created {
        txn.bump_arena_entry(arena_id)?;
        txn.bump_total_arenas(player)?;
    }
    Ok(created)
}
