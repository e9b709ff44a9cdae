//! Write primitives available inside [`ArenaStore::write`](crate::ArenaStore::write).
//!
//! Every primitive is a single-purpose statement (or a read-modify-write of
//! one row for the decimal TEXT amounts). None of them commit: the enclosing
//! transaction commits once the caller's closure returns `Ok`.

use crate::{
    codec,
    error::StoreResult,
    schema::{
        CHECKPOINT_KEY,
        PRUNED_KEY,
    },
};
use alloy::primitives::{
    Address,
    B256,
    U256,
};
use arena_core::{
    ArenaStatus,
    Tier,
};
use rusqlite::{
    OptionalExtension,
    Transaction,
    params,
};

/// Arena fields carried by an `ArenaCreated` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewArena {
    pub id: u64,
    pub tier: Tier,
    pub entry_fee: U256,
    pub start_block: u64,
    pub end_block: u64,
    pub asset_pair: String,
    pub creation_tx_hash: Option<B256>,
}

/// Outcome of [`StoreTxn::insert_arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArenaInsert {
    Inserted,
    /// A placeholder row existed and now carries the real fields.
    FilledPlaceholder,
    /// A complete row already existed and was left untouched.
    Existing,
}

pub struct StoreTxn<'a> {
    pub(crate) tx: &'a Transaction<'a>,
}

impl StoreTxn<'_> {
    /// Records a log position in the dedup ledger. Returns `false` if the
    /// position was already processed.
    pub fn mark_processed(&self, block_number: u64, log_index: u64) -> StoreResult<bool> {
        let changed = self.tx.execute(
            "INSERT OR IGNORE INTO processed_logs (block_number, log_index) VALUES (?1, ?2)",
            params![codec::int(block_number)?, codec::int(log_index)?],
        )?;
        Ok(changed == 1)
    }

    /// Inserts an arena. The first complete writer wins; a placeholder is the
    /// only row that gets overwritten.
    pub fn insert_arena(&self, arena: &NewArena) -> StoreResult<ArenaInsert> {
        let existing: Option<(bool, i64)> = self
            .tx
            .query_row(
                "SELECT placeholder, player_count FROM arenas WHERE id = ?1",
                params![codec::int(arena.id)?],
                |row| Ok((row.get::<_, bool>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        match existing {
            None => {
                self.tx.execute(
                    "INSERT INTO arenas (id, tier, entry_fee, start_block, end_block, status, \
                     pot, player_count, asset_pair, creation_tx_hash, placeholder) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, '0', 0, ?7, ?8, 0)",
                    params![
                        codec::int(arena.id)?,
                        arena.tier.as_u8(),
                        codec::amount(arena.entry_fee),
                        codec::int(arena.start_block)?,
                        codec::int(arena.end_block)?,
                        ArenaStatus::Scheduled.as_str(),
                        arena.asset_pair,
                        arena.creation_tx_hash.as_ref().map(codec::hash),
                    ],
                )?;
                Ok(ArenaInsert::Inserted)
            }
            Some((true, player_count)) => {
                let count = codec::uint("player_count", player_count)?;
                let pot = arena.entry_fee.saturating_mul(U256::from(count));
                self.tx.execute(
                    "UPDATE arenas SET tier = ?2, entry_fee = ?3, start_block = ?4, end_block = ?5, \
                     pot = ?6, asset_pair = ?7, creation_tx_hash = ?8, placeholder = 0 \
                     WHERE id = ?1",
                    params![
                        codec::int(arena.id)?,
                        arena.tier.as_u8(),
                        codec::amount(arena.entry_fee),
                        codec::int(arena.start_block)?,
                        codec::int(arena.end_block)?,
                        codec::amount(pot),
                        arena.asset_pair,
                        arena.creation_tx_hash.as_ref().map(codec::hash),
                    ],
                )?;
                Ok(ArenaInsert::FilledPlaceholder)
            }
            Some((false, _)) => Ok(ArenaInsert::Existing),
        }
    }

    /// Inserts a minimal arena row for an id referenced before its creation
    /// event. Returns `true` if the row was created.
    pub fn insert_placeholder_arena(&self, arena_id: u64) -> StoreResult<bool> {
        let changed = self.tx.execute(
            "INSERT OR IGNORE INTO arenas (id, tier, entry_fee, start_block, end_block, status, \
             pot, player_count, asset_pair, placeholder) \
             VALUES (?1, 0, '0', 0, 0, ?2, '0', 0, '', 1)",
            params![codec::int(arena_id)?, ArenaStatus::Scheduled.as_str()],
        )?;
        Ok(changed == 1)
    }

    /// Returns `true` if the `(arena, address)` entry was newly created.
    pub fn insert_player(&self, arena_id: u64, address: &Address) -> StoreResult<bool> {
        let changed = self.tx.execute(
            "INSERT OR IGNORE INTO players (arena_id, address) VALUES (?1, ?2)",
            params![codec::int(arena_id)?, codec::address(address)],
        )?;
        Ok(changed == 1)
    }

    /// Adds one player and one entry fee to the arena's counters.
    pub fn bump_arena_entry(&self, arena_id: u64) -> StoreResult<()> {
        let row: Option<(String, String)> = self
            .tx
            .query_row(
                "SELECT pot, entry_fee FROM arenas WHERE id = ?1",
                params![codec::int(arena_id)?],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((pot, entry_fee)) = row else {
            return Ok(());
        };
        let pot = codec::parse_amount("pot", &pot)?
            .saturating_add(codec::parse_amount("entry_fee", &entry_fee)?);
        self.tx.execute(
            "UPDATE arenas SET player_count = player_count + 1, pot = ?2 WHERE id = ?1",
            params![codec::int(arena_id)?, codec::amount(pot)],
        )?;
        Ok(())
    }

    pub fn set_commitment(&self, arena_id: u64, address: &Address, hash: &B256) -> StoreResult<()> {
        self.tx.execute(
            "UPDATE players SET commitment_hash = ?3 WHERE arena_id = ?1 AND address = ?2",
            params![
                codec::int(arena_id)?,
                codec::address(address),
                codec::hash(hash)
            ],
        )?;
        Ok(())
    }

    pub fn set_revealed(&self, arena_id: u64, address: &Address, prediction: U256) -> StoreResult<()> {
        self.tx.execute(
            "UPDATE players SET revealed = 1, prediction = ?3 WHERE arena_id = ?1 AND address = ?2",
            params![
                codec::int(arena_id)?,
                codec::address(address),
                codec::amount(prediction)
            ],
        )?;
        Ok(())
    }

    /// Moves the arena to `finalized`. Returns `false` if it already was
    /// finalized (or does not exist); a finalized row is never touched again.
    pub fn mark_finalized(
        &self,
        arena_id: u64,
        final_price: Option<U256>,
        finalized_at: i64,
    ) -> StoreResult<bool> {
        let changed = self.tx.execute(
            "UPDATE arenas SET status = ?2, final_price = ?3, finalized_at = ?4 \
             WHERE id = ?1 AND status != ?2",
            params![
                codec::int(arena_id)?,
                ArenaStatus::Finalized.as_str(),
                final_price.map(codec::amount),
                finalized_at,
            ],
        )?;
        Ok(changed == 1)
    }

    /// Resets the current streak of every player in the arena that received
    /// no payout. The previous streak is kept on the entry so a payout
    /// applied after the finalize can undo the reset. Returns the number of
    /// stats rows reset.
    pub fn reset_streaks_for_losers(&self, arena_id: u64) -> StoreResult<usize> {
        let arena_id = codec::int(arena_id)?;
        self.tx.execute(
            "UPDATE players SET streak_reset_from = \
             (SELECT current_streak FROM player_stats WHERE player_stats.address = players.address) \
             WHERE arena_id = ?1 AND payout IS NULL",
            params![arena_id],
        )?;
        let changed = self.tx.execute(
            "UPDATE player_stats SET current_streak = 0 \
             WHERE address IN (SELECT address FROM players WHERE arena_id = ?1 AND payout IS NULL)",
            params![arena_id],
        )?;
        Ok(changed)
    }

    /// Puts back the streak a finalize reset for this entry, if any.
    /// Returns `true` if a reset was undone.
    pub fn restore_reset_streak(&self, arena_id: u64, address: &Address) -> StoreResult<bool> {
        let arena_id = codec::int(arena_id)?;
        let key = codec::address(address);
        let saved: Option<Option<i64>> = self
            .tx
            .query_row(
                "SELECT streak_reset_from FROM players WHERE arena_id = ?1 AND address = ?2",
                params![arena_id, key],
                |row| row.get(0),
            )
            .optional()?;
        let Some(Some(streak)) = saved else {
            return Ok(false);
        };
        self.tx.execute(
            "UPDATE player_stats SET current_streak = MAX(current_streak, ?2) WHERE address = ?1",
            params![key, streak],
        )?;
        self.tx.execute(
            "UPDATE players SET streak_reset_from = NULL WHERE arena_id = ?1 AND address = ?2",
            params![arena_id, key],
        )?;
        Ok(true)
    }

    /// Adds `amount` to the entry's payout. The entry must exist.
    pub fn add_payout(&self, arena_id: u64, address: &Address, amount: U256) -> StoreResult<()> {
        let current: Option<Option<String>> = self
            .tx
            .query_row(
                "SELECT payout FROM players WHERE arena_id = ?1 AND address = ?2",
                params![codec::int(arena_id)?, codec::address(address)],
                |row| row.get(0),
            )
            .optional()?;
        let Some(current) = current else {
            return Ok(());
        };
        let payout = codec::parse_opt_amount("payout", current)?
            .unwrap_or(U256::ZERO)
            .saturating_add(amount);
        self.tx.execute(
            "UPDATE players SET payout = ?3 WHERE arena_id = ?1 AND address = ?2",
            params![
                codec::int(arena_id)?,
                codec::address(address),
                codec::amount(payout)
            ],
        )?;
        Ok(())
    }

    fn ensure_stats(&self, address: &Address) -> StoreResult<String> {
        let key = codec::address(address);
        self.tx.execute(
            "INSERT OR IGNORE INTO player_stats (address) VALUES (?1)",
            params![key],
        )?;
        Ok(key)
    }

    /// One more win: `wins`, `total_pnl` and both streak counters move up.
    pub fn record_win(&self, address: &Address, amount: U256) -> StoreResult<()> {
        let key = self.ensure_stats(address)?;
        let pnl: String = self.tx.query_row(
            "SELECT total_pnl FROM player_stats WHERE address = ?1",
            params![key],
            |row| row.get(0),
        )?;
        let pnl = codec::parse_amount("total_pnl", &pnl)?.saturating_add(amount);
        self.tx.execute(
            "UPDATE player_stats SET wins = wins + 1, total_pnl = ?2, \
             current_streak = current_streak + 1, \
             best_streak = MAX(best_streak, current_streak + 1) \
             WHERE address = ?1",
            params![key, codec::amount(pnl)],
        )?;
        Ok(())
    }

    pub fn record_god_streak(&self, address: &Address, streak: u64) -> StoreResult<()> {
        let key = self.ensure_stats(address)?;
        self.tx.execute(
            "UPDATE player_stats SET god_streak = MAX(god_streak, ?2) WHERE address = ?1",
            params![key, codec::int(streak)?],
        )?;
        Ok(())
    }

    pub fn bump_total_arenas(&self, address: &Address) -> StoreResult<()> {
        let key = self.ensure_stats(address)?;
        self.tx.execute(
            "UPDATE player_stats SET total_arenas = total_arenas + 1 WHERE address = ?1",
            params![key],
        )?;
        Ok(())
    }

    /// Raises the sync checkpoint to `block`. Never lowers it.
    pub fn advance_checkpoint(&self, block: u64) -> StoreResult<()> {
        self.tx.execute(
            "INSERT INTO indexer_state (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = MAX(value, excluded.value)",
            params![CHECKPOINT_KEY, codec::int(block)?],
        )?;
        Ok(())
    }

    /// Drops ledger positions below `block` and raises the pruned horizon
    /// to it. Returns the number of positions removed.
    pub fn prune_processed(&self, block: u64) -> StoreResult<usize> {
        let block = codec::int(block)?;
        let removed = self.tx.execute(
            "DELETE FROM processed_logs WHERE block_number < ?1",
            params![block],
        )?;
        self.tx.execute(
            "INSERT INTO indexer_state (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = MAX(value, excluded.value)",
            params![PRUNED_KEY, block],
        )?;
        Ok(removed)
    }
}
