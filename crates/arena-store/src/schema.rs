use rusqlite::Connection;

pub(crate) const CHECKPOINT_KEY: &str = "last_block";
/// Ledger positions below this block have been pruned.
pub(crate) const PRUNED_KEY: &str = "pruned_below";

/// Creates every table and index if missing. Safe to run on every open.
pub(crate) fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS arenas (
            id INTEGER PRIMARY KEY NOT NULL,
            tier INTEGER NOT NULL,
            entry_fee TEXT NOT NULL,
            start_block INTEGER NOT NULL,
            end_block INTEGER NOT NULL,
            status TEXT NOT NULL,
            pot TEXT NOT NULL DEFAULT '0',
            player_count INTEGER NOT NULL DEFAULT 0,
            asset_pair TEXT NOT NULL,
            creation_tx_hash TEXT,
            final_price TEXT,
            finalized_at INTEGER,
            placeholder INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_arenas_status_end ON arenas(status, end_block);

        CREATE TABLE IF NOT EXISTS players (
            arena_id INTEGER NOT NULL,
            address TEXT NOT NULL,
            commitment_hash TEXT,
            revealed INTEGER NOT NULL DEFAULT 0,
            prediction TEXT,
            payout TEXT,
            streak_reset_from INTEGER,
            PRIMARY KEY (arena_id, address)
        );
        CREATE INDEX IF NOT EXISTS idx_players_address ON players(address);

        CREATE TABLE IF NOT EXISTS player_stats (
            address TEXT PRIMARY KEY NOT NULL,
            total_arenas INTEGER NOT NULL DEFAULT 0,
            wins INTEGER NOT NULL DEFAULT 0,
            god_streak INTEGER NOT NULL DEFAULT 0,
            current_streak INTEGER NOT NULL DEFAULT 0,
            best_streak INTEGER NOT NULL DEFAULT 0,
            total_pnl TEXT NOT NULL DEFAULT '0'
        );

        CREATE TABLE IF NOT EXISTS indexer_state (
            key TEXT PRIMARY KEY NOT NULL,
            value INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS processed_logs (
            block_number INTEGER NOT NULL,
            log_index INTEGER NOT NULL,
            PRIMARY KEY (block_number, log_index)
        );
        ",
    )?;

    // Stores created before loss resets were restorable.
    let has_reset_column: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info('players') WHERE name = 'streak_reset_from'",
        [],
        |row| row.get(0),
    )?;
    if has_reset_column == 0 {
        conn.execute("ALTER TABLE players ADD COLUMN streak_reset_from INTEGER", [])?;
    }
    Ok(())
}
