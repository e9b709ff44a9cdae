//! `alloy` backed implementations of the chain traits.

use super::{
    ArenaChain,
    ChainError,
    CreateArena,
    EventFeed,
    TxOutcome,
};
use alloy::{
    contract::{
        Error as ContractError,
        SolCallBuilder,
    },
    network::{
        EthereumWallet,
        ReceiptResponse,
    },
    primitives::{
        Address,
        U256,
    },
    providers::{
        DynProvider,
        Provider,
        ProviderBuilder,
        WsConnect,
    },
    rpc::types::{
        Filter,
        Log,
    },
    signers::local::PrivateKeySigner,
    sol_types::SolCall,
    transports::{
        RpcError,
        TransportErrorKind,
    },
};
use arena_core::{
    abi::IArenaEngine::{
        self,
        IArenaEngineInstance,
    },
    constants::{
        MAX_FEE_PER_GAS,
        MAX_PRIORITY_FEE_PER_GAS,
    },
};
use async_trait::async_trait;
use tokio::sync::{
    broadcast::error::RecvError,
    mpsc,
};
use tracing::{
    debug,
    info,
    warn,
};
use url::Url;

const SUBSCRIPTION_BUFFER: usize = 1_024;

fn transport(err: RpcError<TransportErrorKind>) -> ChainError {
    ChainError::Transport(err.to_string())
}

/// Converts a contract error into a [`ChainError`], keeping the revert
/// message and data when the node returned them.
fn classify(err: ContractError) -> ChainError {
    match err {
        ContractError::TransportError(rpc) => {
            match rpc.as_error_resp() {
                Some(payload) => {
                    ChainError::Reverted {
                        reason: payload.message.to_string(),
                        data: payload.as_revert_data(),
                    }
                }
                None => transport(rpc),
            }
        }
        other => ChainError::Contract(other.to_string()),
    }
}

/// Log source over a WebSocket connection.
#[derive(Clone)]
pub struct AlloyEventFeed {
    provider: DynProvider,
    contract: Address,
}

impl AlloyEventFeed {
    pub async fn connect(ws_url: &str, contract: Address) -> Result<Self, ChainError> {
        let provider = ProviderBuilder::new()
            .connect_ws(WsConnect::new(ws_url))
            .await
            .map_err(transport)?
            .erased();
        info!(target: "arena_keeper::chain", %contract, "Connected event feed");
        Ok(Self { provider, contract })
    }

    fn filter(&self) -> Filter {
        Filter::new().address(self.contract)
    }
}

#[async_trait]
impl EventFeed for AlloyEventFeed {
    async fn block_number(&self) -> Result<u64, ChainError> {
        self.provider.get_block_number().await.map_err(transport)
    }

    async fn logs(&self, from_block: u64, to_block: u64) -> Result<Vec<Log>, ChainError> {
        let filter = self.filter().from_block(from_block).to_block(to_block);
        let logs = self.provider.get_logs(&filter).await.map_err(transport)?;
        debug!(target: "arena_keeper::chain", from_block, to_block, count = logs.len(), "Fetched logs");
        Ok(logs)
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<Log>, ChainError> {
        let mut subscription = self
            .provider
            .subscribe_logs(&self.filter())
            .await
            .map_err(transport)?;
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);

        tokio::spawn(async move {
            while forward_log(subscription.recv().await, &tx).await {}
        });

        Ok(rx)
    }

    async fn keepalive(&self) -> Result<(), ChainError> {
        self.provider.get_chain_id().await.map_err(transport)?;
        Ok(())
    }
}

/// Forwards one subscription item into the session channel. Returns `false`
/// once forwarding has to stop.
///
/// A lagged subscription has dropped logs that no later backfill would
/// query, so the forwarder stops and the session reconnects from the
/// checkpoint instead of skipping past the gap.
async fn forward_log(received: Result<Log, RecvError>, tx: &mpsc::Sender<Log>) -> bool {
    match received {
        Ok(log) => {
            if tx.send(log).await.is_err() {
                debug!(target: "arena_keeper::chain", "Log receiver dropped, stopping forwarder");
                return false;
            }
            true
        }
        Err(RecvError::Lagged(skipped)) => {
            warn!(target: "arena_keeper::chain", skipped, "Log subscription lagged, closing it to resync");
            false
        }
        Err(RecvError::Closed) => {
            warn!(target: "arena_keeper::chain", "Log subscription stream ended");
            false
        }
    }
}

/// Transaction sender over HTTP, signing with the operator key.
#[derive(Clone)]
pub struct AlloyArenaChain {
    provider: DynProvider,
    contract: IArenaEngineInstance<DynProvider>,
}

impl AlloyArenaChain {
    pub fn connect(rpc_url: &str, contract: Address, private_key: &str) -> Result<Self, ChainError> {
        let signer: PrivateKeySigner = private_key
            .trim()
            .parse()
            .map_err(|_| ChainError::InvalidConfig("operator key is not a valid private key".into()))?;
        let url: Url = rpc_url
            .parse()
            .map_err(|e| ChainError::InvalidConfig(format!("invalid RPC URL {rpc_url}: {e}")))?;
        let operator = signer.address();

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(url)
            .erased();
        let contract = IArenaEngine::new(contract, provider.clone());
        info!(target: "arena_keeper::chain", %operator, contract = %contract.address(), "Connected arena chain");

        Ok(Self { provider, contract })
    }

    /// Sends a call with the fixed fee pair and waits for a successful receipt.
    async fn send<C>(&self, call: SolCallBuilder<&DynProvider, C>) -> Result<TxOutcome, ChainError>
    where
        C: SolCall + Send + Sync,
    {
        let pending = call
            .max_fee_per_gas(MAX_FEE_PER_GAS)
            .max_priority_fee_per_gas(MAX_PRIORITY_FEE_PER_GAS)
            .send()
            .await
            .map_err(classify)?;
        let tx_hash = *pending.tx_hash();
        debug!(target: "arena_keeper::chain", %tx_hash, "Transaction sent");

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;
        if !receipt.status() {
            return Err(ChainError::Reverted {
                reason: format!("transaction {tx_hash} reverted"),
                data: None,
            });
        }

        Ok(TxOutcome {
            tx_hash,
            block_number: receipt.block_number(),
            logs: receipt.inner.logs().to_vec(),
        })
    }
}

#[async_trait]
impl ArenaChain for AlloyArenaChain {
    async fn block_number(&self) -> Result<u64, ChainError> {
        self.provider.get_block_number().await.map_err(transport)
    }

    async fn create_arena(&self, request: CreateArena) -> Result<TxOutcome, ChainError> {
        let call = self.contract.createArena(
            request.tier.as_u8(),
            request.entry_fee,
            U256::from(request.duration_blocks),
            request.asset_pair,
        );
        self.send(call).await
    }

    async fn submit_price_tape(
        &self,
        arena_id: u64,
        tape: Vec<U256>,
    ) -> Result<TxOutcome, ChainError> {
        let call = self.contract.submitPriceTape(U256::from(arena_id), tape);
        self.send(call).await
    }

    async fn finalize_arena(
        &self,
        arena_id: u64,
        players: Vec<Address>,
    ) -> Result<TxOutcome, ChainError> {
        let call = self.contract.finalizeArena(U256::from(arena_id), players);
        self.send(call).await
    }

    async fn arena_player_count(&self, arena_id: u64) -> Result<u64, ChainError> {
        let info = self
            .contract
            .getArena(U256::from(arena_id))
            .call()
            .await
            .map_err(classify)?;
        Ok(u64::from(info.playerCount))
    }
}
