use crate::{
    codec,
    error::{
        StoreError,
        StoreResult,
    },
    schema::{
        self,
        CHECKPOINT_KEY,
        PRUNED_KEY,
    },
    txn::StoreTxn,
};
use alloy::primitives::Address;
use arena_core::{
    Arena,
    ArenaStatus,
    PlayerEntry,
    PlayerStats,
    Tier,
};
use parking_lot::Mutex;
use rusqlite::{
    Connection,
    OptionalExtension,
    Row,
    params,
};
use std::{
    path::Path,
    sync::Arc,
    time::Duration,
};
use tracing::{
    debug,
    info,
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const ARENA_COLUMNS: &str = "id, tier, entry_fee, start_block, end_block, status, pot, \
     player_count, asset_pair, creation_tx_hash, final_price, finalized_at, placeholder";

const STATS_COLUMNS: &str =
    "address, total_arenas, wins, god_streak, current_streak, best_streak, total_pnl";

/// Handle to the local relational mirror of on-chain state.
///
/// Cloning is cheap; all clones share one SQLite connection. Writers are
/// serialised by the connection mutex and each [`write`](Self::write) runs
/// in its own SQLite transaction, so readers never observe a torn update.
#[derive(Clone)]
pub struct ArenaStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for ArenaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArenaStore").finish_non_exhaustive()
    }
}

impl ArenaStore {
    /// Opens (or creates) the database at `path` in WAL mode and migrates it.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        info!(target: "arena_store", path = %path.display(), journal_mode = %mode, "Opened store");
        Self::from_connection(conn)
    }

    /// Opens a private in-memory database.
    pub fn in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` inside one transaction. Commits on `Ok`, rolls back on `Err`.
    pub fn write<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&StoreTxn<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(StoreError::from)?;
        let out = f(&StoreTxn { tx: &tx })?;
        tx.commit().map_err(StoreError::from)?;
        Ok(out)
    }

    /// Last fully-processed block, if any block was ever processed.
    pub fn checkpoint(&self) -> StoreResult<Option<u64>> {
        self.state_value(CHECKPOINT_KEY)
    }

    /// Lowest block still covered by the processed-log ledger. Replays that
    /// start below it would apply events twice.
    pub fn pruned_below(&self) -> StoreResult<Option<u64>> {
        self.state_value(PRUNED_KEY)
    }

    fn state_value(&self, key: &str) -> StoreResult<Option<u64>> {
        let conn = self.conn.lock();
        let value: Option<i64> = conn
            .query_row(
                "SELECT value FROM indexer_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        value.map(|v| codec::uint("indexer_state.value", v)).transpose()
    }

    pub fn is_processed(&self, block_number: u64, log_index: u64) -> StoreResult<bool> {
        let conn = self.conn.lock();
        let found = conn
            .query_row(
                "SELECT 1 FROM processed_logs WHERE block_number = ?1 AND log_index = ?2",
                params![codec::int(block_number)?, codec::int(log_index)?],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn arena(&self, id: u64) -> StoreResult<Option<Arena>> {
        let conn = self.conn.lock();
        let raw = conn
            .query_row(
                &format!("SELECT {ARENA_COLUMNS} FROM arenas WHERE id = ?1"),
                params![codec::int(id)?],
                ArenaRow::read,
            )
            .optional()?;
        raw.map(ArenaRow::into_arena).transpose()
    }

    /// Most recent arenas first.
    pub fn arenas(&self, limit: usize) -> StoreResult<Vec<Arena>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare(&format!("SELECT {ARENA_COLUMNS} FROM arenas ORDER BY id DESC LIMIT ?1"))?;
        let rows = stmt.query_map(params![limit_param(limit)], ArenaRow::read)?;
        rows.map(|row| row.map_err(StoreError::from)?.into_arena())
            .collect()
    }

    /// Arenas whose reveal window closed before `current_block` and that are
    /// not yet finalized. Placeholders are skipped until their creation event
    /// arrives.
    pub fn finalizable_arenas(
        &self,
        current_block: u64,
        reveal_period_blocks: u64,
    ) -> StoreResult<Vec<Arena>> {
        // end_block + reveal < current  <=>  end_block < current - reveal
        let Some(bound) = current_block.checked_sub(reveal_period_blocks) else {
            return Ok(Vec::new());
        };
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ARENA_COLUMNS} FROM arenas \
             WHERE status != ?1 AND placeholder = 0 AND end_block < ?2 ORDER BY id"
        ))?;
        let rows = stmt.query_map(
            params![ArenaStatus::Finalized.as_str(), codec::int(bound)?],
            ArenaRow::read,
        )?;
        let arenas = rows
            .map(|row| row.map_err(StoreError::from)?.into_arena())
            .collect::<StoreResult<Vec<_>>>()?;
        debug!(target: "arena_store", current_block, count = arenas.len(), "Selected finalizable arenas");
        Ok(arenas)
    }

    pub fn players(&self, arena_id: u64) -> StoreResult<Vec<PlayerEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT arena_id, address, commitment_hash, revealed, prediction, payout \
             FROM players WHERE arena_id = ?1 ORDER BY address",
        )?;
        let rows = stmt.query_map(params![codec::int(arena_id)?], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, bool>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;
        rows.map(|row| {
            let (arena_id, address, commitment, revealed, prediction, payout) = row?;
            Ok(PlayerEntry {
                arena_id: codec::uint("players.arena_id", arena_id)?,
                address: codec::parse_address("players.address", &address)?,
                commitment_hash: codec::parse_opt_hash("players.commitment_hash", commitment)?,
                revealed,
                prediction: codec::parse_opt_amount("players.prediction", prediction)?,
                payout: codec::parse_opt_amount("players.payout", payout)?,
            })
        })
        .collect()
    }

    /// Addresses of every player in the arena, in a stable order.
    pub fn player_addresses(&self, arena_id: u64) -> StoreResult<Vec<Address>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT address FROM players WHERE arena_id = ?1 ORDER BY address")?;
        let rows = stmt.query_map(params![codec::int(arena_id)?], |row| {
            row.get::<_, String>(0)
        })?;
        rows.map(|row| codec::parse_address("players.address", &row?))
            .collect()
    }

    pub fn player_stats(&self, address: &Address) -> StoreResult<Option<PlayerStats>> {
        let conn = self.conn.lock();
        let raw = conn
            .query_row(
                &format!("SELECT {STATS_COLUMNS} FROM player_stats WHERE address = ?1"),
                params![codec::address(address)],
                StatsRow::read,
            )
            .optional()?;
        raw.map(StatsRow::into_stats).transpose()
    }

    /// Players ranked by wins, then best streak.
    pub fn leaderboard(&self, limit: usize) -> StoreResult<Vec<PlayerStats>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {STATS_COLUMNS} FROM player_stats \
             ORDER BY wins DESC, best_streak DESC, address LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit_param(limit)], StatsRow::read)?;
        rows.map(|row| row.map_err(StoreError::from)?.into_stats())
            .collect()
    }
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

struct ArenaRow {
    id: i64,
    tier: i64,
    entry_fee: String,
    start_block: i64,
    end_block: i64,
    status: String,
    pot: String,
    player_count: i64,
    asset_pair: String,
    creation_tx_hash: Option<String>,
    final_price: Option<String>,
    finalized_at: Option<i64>,
    placeholder: bool,
}

impl ArenaRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            tier: row.get(1)?,
            entry_fee: row.get(2)?,
            start_block: row.get(3)?,
            end_block: row.get(4)?,
            status: row.get(5)?,
            pot: row.get(6)?,
            player_count: row.get(7)?,
            asset_pair: row.get(8)?,
            creation_tx_hash: row.get(9)?,
            final_price: row.get(10)?,
            finalized_at: row.get(11)?,
            placeholder: row.get(12)?,
        })
    }

    fn into_arena(self) -> StoreResult<Arena> {
        let tier = u8::try_from(self.tier)
            .ok()
            .and_then(|t| Tier::try_from(t).ok())
            .ok_or_else(|| {
                StoreError::Corrupt {
                    column: "arenas.tier",
                    value: self.tier.to_string(),
                }
            })?;
        let status = ArenaStatus::from_db(&self.status).ok_or_else(|| {
            StoreError::Corrupt {
                column: "arenas.status",
                value: self.status.clone(),
            }
        })?;
        Ok(Arena {
            id: codec::uint("arenas.id", self.id)?,
            tier,
            entry_fee: codec::parse_amount("arenas.entry_fee", &self.entry_fee)?,
            start_block: codec::uint("arenas.start_block", self.start_block)?,
            end_block: codec::uint("arenas.end_block", self.end_block)?,
            status,
            pot: codec::parse_amount("arenas.pot", &self.pot)?,
            player_count: codec::uint("arenas.player_count", self.player_count)?,
            asset_pair: self.asset_pair,
            creation_tx_hash: codec::parse_opt_hash("arenas.creation_tx_hash", self.creation_tx_hash)?,
            final_price: codec::parse_opt_amount("arenas.final_price", self.final_price)?,
            finalized_at: self.finalized_at,
            placeholder: self.placeholder,
        })
    }
}

struct StatsRow {
    address: String,
    total_arenas: i64,
    wins: i64,
    god_streak: i64,
    current_streak: i64,
    best_streak: i64,
    total_pnl: String,
}

impl StatsRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            address: row.get(0)?,
            total_arenas: row.get(1)?,
            wins: row.get(2)?,
            god_streak: row.get(3)?,
            current_streak: row.get(4)?,
            best_streak: row.get(5)?,
            total_pnl: row.get(6)?,
        })
    }

    fn into_stats(self) -> StoreResult<PlayerStats> {
        Ok(PlayerStats {
            address: codec::parse_address("player_stats.address", &self.address)?,
            total_arenas: codec::uint("player_stats.total_arenas", self.total_arenas)?,
            wins: codec::uint("player_stats.wins", self.wins)?,
            god_streak: codec::uint("player_stats.god_streak", self.god_streak)?,
            current_streak: codec::uint("player_stats.current_streak", self.current_streak)?,
            best_streak: codec::uint("player_stats.best_streak", self.best_streak)?,
            total_pnl: codec::parse_amount("player_stats.total_pnl", &self.total_pnl)?,
        })
    }
}
