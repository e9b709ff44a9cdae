//! Command-line configuration for the arena keeper.

use crate::{
    scheduler::SchedulerConfig,
    sync::SyncConfig,
};
use alloy::primitives::Address;
use arena_core::Tier;
use clap::Parser;
use std::{
    net::SocketAddr,
    path::PathBuf,
    time::Duration,
};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// WebSocket endpoint used for log subscriptions and backfill.
    #[arg(long, env = "ARENA_WS_URL")]
    pub ws_url: Option<String>,

    /// HTTP endpoint used for sending operator transactions.
    #[arg(long, env = "ARENA_RPC_URL")]
    pub rpc_url: Option<String>,

    #[arg(long, env = "ARENA_CONTRACT_ADDRESS")]
    pub contract_address: Option<Address>,

    /// Hex private key of the operator account.
    #[arg(long, env = "ARENA_OPERATOR_KEY", hide_env_values = true)]
    pub operator_key: Option<String>,

    #[arg(long, env = "ARENA_DB_PATH", default_value = "arena.db")]
    pub db_path: PathBuf,

    #[arg(long, env = "ARENA_GATEWAY_BIND_ADDR", default_value = "0.0.0.0:3001")]
    pub gateway_bind_addr: SocketAddr,

    /// Capacity of the broadcast buffer; slower subscribers are dropped.
    #[arg(long, env = "ARENA_GATEWAY_CAPACITY", default_value = "1024")]
    pub gateway_capacity: usize,

    /// Base URL of the price oracle. Without it no price tapes are submitted.
    #[arg(long, env = "ARENA_ORACLE_URL")]
    pub oracle_url: Option<String>,

    #[arg(long, env = "ARENA_ORACLE_TIMEOUT_SECS", default_value = "10")]
    pub oracle_timeout_secs: u64,

    /// Block to start syncing from, ignoring the stored checkpoint once.
    #[arg(long, env = "ARENA_START_BLOCK")]
    pub start_block: Option<u64>,

    #[arg(long, env = "ARENA_MAX_LOG_RANGE", default_value = "10000")]
    pub max_log_range: u64,

    #[arg(long, env = "ARENA_KEEPALIVE_SECS", default_value = "30")]
    pub keepalive_secs: u64,

    #[arg(long, env = "ARENA_RECONNECT_DELAY_SECS", default_value = "5")]
    pub reconnect_delay_secs: u64,

    /// Prune processed-log ledger entries this many blocks below the
    /// checkpoint. Unset keeps every entry.
    #[arg(long, env = "ARENA_LEDGER_RETENTION_BLOCKS")]
    pub ledger_retention_blocks: Option<u64>,

    #[arg(long, env = "ARENA_CREATE_INTERVAL_SECS", default_value = "60")]
    pub create_interval_secs: u64,

    #[arg(long, env = "ARENA_FINALIZE_INTERVAL_SECS", default_value = "5")]
    pub finalize_interval_secs: u64,

    #[arg(long, env = "ARENA_DURATION_SECS", default_value = "60")]
    pub arena_duration_secs: u64,

    #[arg(long, env = "ARENA_REVEAL_PERIOD_SECS", default_value = "30")]
    pub reveal_period_secs: u64,

    #[arg(long, env = "ARENA_BLOCK_TIME_MS", default_value = "10")]
    pub block_time_ms: u64,

    /// Tiers the create cycle rotates through, e.g. `0,1,2`.
    #[arg(
        long,
        env = "ARENA_TIERS",
        value_delimiter = ',',
        default_value = "0,1,2",
        value_parser = parse_tier
    )]
    pub tiers: Vec<Tier>,

    #[arg(long, env = "ARENA_ASSET_PAIR", default_value = "ETH/USD")]
    pub asset_pair: String,

    /// Upper bound on one transaction, including its receipt.
    #[arg(long, env = "ARENA_TX_TIMEOUT_SECS", default_value = "60")]
    pub tx_timeout_secs: u64,

    /// Revert reason (or custom error name) meaning the arena is already
    /// finalized. Empty disables the check.
    #[arg(long, env = "ARENA_ALREADY_FINALIZED_MARKER", default_value = "AlreadyFinalized")]
    pub already_finalized_marker: String,

    /// Compare local and on-chain player counts before finalizing.
    #[arg(long, env = "ARENA_FINALIZE_CROSS_CHECK", default_value_t = false)]
    pub finalize_cross_check: bool,

    /// Emit logs as JSON lines.
    #[arg(long, env = "ARENA_LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

fn parse_tier(value: &str) -> Result<Tier, String> {
    let raw: u8 = value
        .trim()
        .parse()
        .map_err(|_| format!("Invalid tier: {value}"))?;
    Tier::try_from(raw).map_err(|e| e.to_string())
}

impl Args {
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            start_block: self.start_block,
            max_log_range: self.max_log_range.max(1),
            keepalive_interval: Duration::from_secs(self.keepalive_secs.max(1)),
            reconnect_delay: Duration::from_secs(self.reconnect_delay_secs),
            ledger_retention: self.ledger_retention_blocks,
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        let defaults = SchedulerConfig::default();
        SchedulerConfig {
            create_interval: Duration::from_secs(self.create_interval_secs.max(1)),
            finalize_interval: Duration::from_secs(self.finalize_interval_secs.max(1)),
            arena_duration: Duration::from_secs(self.arena_duration_secs),
            reveal_period: Duration::from_secs(self.reveal_period_secs),
            block_time: Duration::from_millis(self.block_time_ms),
            tiers: if self.tiers.is_empty() {
                defaults.tiers
            } else {
                self.tiers.clone()
            },
            asset_pair: self.asset_pair.clone(),
            tx_timeout: Duration::from_secs(self.tx_timeout_secs.max(1)),
            already_finalized_marker: self.already_finalized_marker.clone(),
            cross_check: self.finalize_cross_check,
        }
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle_timeout_secs.max(1))
    }
}
