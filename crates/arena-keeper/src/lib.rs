#![doc = include_str!("../README.md")]
#![allow(clippy::missing_errors_doc)]
#![deny(clippy::panic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::unreachable)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![warn(clippy::indexing_slicing)]
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::indexing_slicing))]

pub mod chain;
pub mod cli;
pub mod gateway;
pub mod head;
mod macros;
pub mod metrics;
pub mod price_tape;
pub mod scheduler;
pub mod sync;
#[cfg(any(test, feature = "test"))]
pub mod test_utils;

pub use cli::Args;

use crate::{
    chain::{
        AlloyArenaChain,
        AlloyEventFeed,
        ArenaChain,
        EventFeed,
    },
    gateway::{
        Gateway,
        GatewayServer,
    },
    head::ChainHead,
    price_tape::{
        DisabledPriceTape,
        HttpPriceTape,
        PriceTapeSource,
    },
    scheduler::Scheduler,
    sync::Synchronizer,
};
use alloy::primitives::Address;
use anyhow::{
    Context,
    Result,
};
use arena_store::ArenaStore;
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{
    error,
    info,
    warn,
};

/// Runs every enabled component until `shutdown` is cancelled.
///
/// The store and the gateway always run. The synchronizer needs a WebSocket
/// URL and a contract address; the scheduler additionally needs an RPC URL
/// and the operator key. A component missing its configuration is disabled
/// with a warning instead of failing the process.
pub async fn run(args: Args, shutdown: CancellationToken) -> Result<()> {
    let store = ArenaStore::open(&args.db_path)
        .with_context(|| format!("failed to open store at {}", args.db_path.display()))?;
    let gateway = Gateway::new(args.gateway_capacity.max(1));
    let head = ChainHead::new();
    if let Some(checkpoint) = store.checkpoint().context("failed to read checkpoint")? {
        head.observe(checkpoint);
    }

    let mut tasks: JoinSet<(&'static str, Result<()>)> = JoinSet::new();

    let server = GatewayServer::new(
        args.gateway_bind_addr,
        gateway.clone(),
        store.clone(),
        head.clone(),
    );
    let token = shutdown.clone();
    tasks.spawn(async move {
        let result = server.run(token).await.context("gateway server failed");
        ("gateway", result)
    });

    match (&args.ws_url, args.contract_address) {
        (Some(ws_url), Some(contract)) => {
            let feed = connect_feed(ws_url, contract, args.sync_config().reconnect_delay, &shutdown).await;
            if let Some(feed) = feed {
                let mut synchronizer = Synchronizer::new(
                    feed,
                    store.clone(),
                    gateway.clone(),
                    head.clone(),
                    args.sync_config(),
                );
                let token = shutdown.clone();
                tasks.spawn(async move {
                    synchronizer.run(token).await;
                    ("synchronizer", Ok(()))
                });
            }
        }
        _ => {
            warn!("Synchronizer disabled: --ws-url and --contract-address are required");
        }
    }

    match scheduler_chain(&args) {
        Ok(Some(chain)) => {
            let tape = price_tape(&args);
            let scheduler = Arc::new(Scheduler::new(
                chain,
                tape,
                store.clone(),
                gateway.clone(),
                head.clone(),
                args.scheduler_config(),
            ));
            let token = shutdown.clone();
            tasks.spawn(async move {
                scheduler.run(token).await;
                ("scheduler", Ok(()))
            });
        }
        Ok(None) => {
            warn!(
                "Scheduler disabled: --rpc-url, --contract-address and --operator-key are required"
            );
        }
        Err(err) => {
            error!(error = ?err, "Scheduler disabled: invalid configuration");
        }
    }

    let mut failure = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((component, Ok(()))) => info!(component, "Component stopped"),
            Ok((component, Err(err))) => {
                critical!(component, error = ?err, "Component failed, shutting down");
                shutdown.cancel();
                failure.get_or_insert(err);
            }
            Err(err) => {
                critical!(error = ?err, "Component task aborted, shutting down");
                shutdown.cancel();
                failure.get_or_insert_with(|| anyhow::Error::new(err).context("component task aborted"));
            }
        }
    }

    match failure {
        Some(err) => Err(err),
        None => {
            info!("Arena keeper stopped");
            Ok(())
        }
    }
}

/// Connects the event feed, retrying with a fixed delay. `None` on shutdown.
async fn connect_feed(
    ws_url: &str,
    contract: Address,
    retry_delay: Duration,
    shutdown: &CancellationToken,
) -> Option<Arc<dyn EventFeed>> {
    loop {
        match AlloyEventFeed::connect(ws_url, contract).await {
            Ok(feed) => return Some(Arc::new(feed)),
            Err(err) => {
                warn!(error = ?err, "Failed to connect event feed, retrying");
            }
        }
        tokio::select! {
            () = shutdown.cancelled() => return None,
            () = tokio::time::sleep(retry_delay) => {}
        }
    }
}

fn scheduler_chain(args: &Args) -> Result<Option<Arc<dyn ArenaChain>>> {
    let (Some(rpc_url), Some(contract), Some(key)) =
        (&args.rpc_url, args.contract_address, &args.operator_key)
    else {
        return Ok(None);
    };
    let chain = AlloyArenaChain::connect(rpc_url, contract, key)
        .context("failed to set up transaction client")?;
    Ok(Some(Arc::new(chain)))
}

fn price_tape(args: &Args) -> Arc<dyn PriceTapeSource> {
    let Some(url) = &args.oracle_url else {
        warn!("No --oracle-url configured, price tapes will not be submitted");
        return Arc::new(DisabledPriceTape);
    };
    match HttpPriceTape::new(url, args.oracle_timeout()) {
        Ok(tape) => Arc::new(tape),
        Err(err) => {
            error!(error = ?err, "Invalid oracle configuration, price tapes will not be submitted");
            Arc::new(DisabledPriceTape)
        }
    }
}
