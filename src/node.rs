//! Node orchestration: owns the chain store and turns payloads and competing
//! chains from the transports into store operations.

use crate::blockchain::{Block, Chain, ChainStore};
use crate::config::Config;
use crate::consensus::{ForkChoice, ForkOutcome};
use crate::error::ChainError;
use crate::miner::{create_block, CancelToken, MiningControl};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Booting,
    Ready,
    ShuttingDown,
}

/// Published after every successful chain mutation.
#[derive(Debug, Clone)]
pub enum ChainEvent {
    Appended(Block),
    Replaced { previous_len: usize, new_len: usize },
}

/// Cheap to clone; every clone shares the same store.
#[derive(Clone)]
pub struct Node {
    store: Arc<ChainStore>,
    fork_choice: ForkChoice,
    mining_timeout: Option<Duration>,
    max_append_retries: u32,
    shutdown: CancelToken,
    stopped: Arc<watch::Sender<bool>>,
    state: Arc<RwLock<NodeState>>,
    events: broadcast::Sender<ChainEvent>,
}

impl Node {
    pub fn new(config: &Config) -> Self {
        let store = Arc::new(ChainStore::new(config.chain.params()));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let genesis = store.genesis();
        info!(
            digest = %config.chain.digest,
            difficulty = config.chain.difficulty,
            fork_choice = ?config.chain.fork_choice,
            genesis = %genesis.hash,
            "chain initialised"
        );

        Self {
            store,
            fork_choice: config.chain.fork_choice,
            mining_timeout: config.chain.mining_timeout(),
            max_append_retries: config.chain.max_append_retries,
            shutdown: CancelToken::new(),
            stopped: Arc::new(watch::Sender::new(false)),
            state: Arc::new(RwLock::new(NodeState::Booting)),
            events,
        }
    }

    pub fn store(&self) -> &Arc<ChainStore> {
        &self.store
    }

    pub fn fork_choice(&self) -> ForkChoice {
        self.fork_choice
    }

    pub fn state(&self) -> NodeState {
        *self.state.read()
    }

    pub fn set_state(&self, state: NodeState) {
        *self.state.write() = state;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.events.subscribe()
    }

    pub fn shutdown_token(&self) -> CancelToken {
        self.shutdown.clone()
    }

    /// Abort in-flight mining and flag the node as stopping.
    pub fn shutdown(&self) {
        self.set_state(NodeState::ShuttingDown);
        self.shutdown.cancel();
        self.stopped.send_replace(true);
    }

    /// Resolves once [`Node::shutdown`] has been called, immediately if it already was.
    pub async fn stopped(&self) {
        let mut rx = self.stopped.subscribe();
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// Build, mine and append a block carrying `payload`.
    ///
    /// Mining runs without the store lock. If another producer extended the
    /// tip in the meantime, the block is rebuilt on the new tip, up to the
    /// configured number of retries. Blocks the calling thread.
    pub fn submit_payload(&self, payload: u64) -> Result<Block, ChainError> {
        let params = self.store.params();
        let mut retries = 0;
        loop {
            let parent = self.store.tip();
            let control = MiningControl::new(self.shutdown.clone(), self.mining_timeout);
            let block = create_block(&parent, payload, params.difficulty_target(), params.algorithm, &control)?;

            match self.store.try_append(block.clone()) {
                Ok(()) => {
                    debug!(index = block.index, payload, hash = %block.hash, "block appended");
                    let _ = self.events.send(ChainEvent::Appended(block.clone()));
                    return Ok(block);
                }
                Err(e) if retries < self.max_append_retries && self.store.tip().hash != parent.hash => {
                    retries += 1;
                    debug!(payload, retries, "tip moved while mining, rebuilding: {}", e);
                }
                Err(e) => {
                    warn!(index = block.index, payload, "block discarded: {}", e);
                    return Err(e);
                }
            }
        }
    }

    /// [`Node::submit_payload`] on the blocking thread pool.
    pub async fn submit_payload_async(&self, payload: u64) -> Result<Block, ChainError> {
        let node = self.clone();
        tokio::task::spawn_blocking(move || node.submit_payload(payload))
            .await
            .map_err(|e| ChainError::Internal(format!("mining task failed: {}", e)))?
    }

    /// Hand a competing chain to fork choice under the node's rule.
    pub fn consider_replacement(&self, candidate: Chain) -> Result<ForkOutcome, ChainError> {
        let candidate_len = candidate.len();
        let outcome = self
            .store
            .consider_replacement(candidate, self.fork_choice)
            .inspect_err(|e| warn!(candidate_len, "competing chain rejected: {}", e))?;

        if let ForkOutcome::Replaced { previous_len, new_len } = outcome {
            info!(previous_len, new_len, "local chain replaced by longer chain");
            let _ = self.events.send(ChainEvent::Replaced { previous_len, new_len });
        }
        Ok(outcome)
    }

    /// [`Node::consider_replacement`] on the blocking thread pool, since
    /// validating a long candidate hashes every block.
    pub async fn consider_replacement_async(&self, candidate: Chain) -> Result<ForkOutcome, ChainError> {
        let node = self.clone();
        tokio::task::spawn_blocking(move || node.consider_replacement(candidate))
            .await
            .map_err(|e| ChainError::Internal(format!("fork choice task failed: {}", e)))?
    }

    /// Log every chain change, dumping the whole chain at debug level.
    pub fn spawn_chain_logger(&self) -> tokio::task::JoinHandle<()> {
        let mut events = self.subscribe();
        let store = self.store.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ChainEvent::Appended(block)) => {
                        info!(index = block.index, payload = block.payload, "chain extended");
                    }
                    Ok(ChainEvent::Replaced { previous_len, new_len }) => {
                        info!(previous_len, new_len, "chain replaced");
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "chain logger lagging");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                if tracing::enabled!(tracing::Level::DEBUG) {
                    match serde_json::to_string_pretty(&store.snapshot()) {
                        Ok(dump) => debug!("current chain:\n{}", dump),
                        Err(e) => warn!("failed to serialize chain: {}", e),
                    }
                }
            }
        })
    }
}
