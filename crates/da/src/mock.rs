//! In-process DA layer backed by a keyed store.
//!
//! Blocks are stored under two key families in one flat namespace:
//! - `{da_height}/{rollup_height}` -> block hash (index)
//! - `{hex(block_hash)}` -> encoded block (content)
//!
//! The content entry is always written before the index entry, so an index entry
//! never points at missing content. A DA height is only served once the height
//! oracle has moved past it.

use crate::oracle::HeightOracle;
use crate::{
    BaseResult, BlockRetriever, DaError, DataAvailabilityLayerClient, ResultCheckBlock,
    ResultRetrieveBlocks, ResultSubmitBlock,
};
use async_trait::async_trait;
use block_schema::{Block, Hash32, NamespaceId};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use store::KeyedStore;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// DA block time used when the backend config is empty.
pub const DEFAULT_BLOCK_TIME: Duration = Duration::from_secs(3);

/// DA height of a freshly initialized client.
pub const INITIAL_DA_HEIGHT: u64 = 1;

/// Configuration of the mock backend, parsed from a duration string such as `"3s"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockConfig {
    pub block_time: Duration,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            block_time: DEFAULT_BLOCK_TIME,
        }
    }
}

impl MockConfig {
    pub fn parse(config: &[u8]) -> Result<Self, DaError> {
        if config.is_empty() {
            return Ok(Self::default());
        }
        let raw = std::str::from_utf8(config)
            .map_err(|e| DaError::Config(format!("block time is not utf-8: {}", e)))?;
        let block_time = humantime::parse_duration(raw.trim())
            .map_err(|e| DaError::Config(format!("invalid block time {:?}: {}", raw, e)))?;
        if block_time.is_zero() {
            return Err(DaError::Config("block time must be greater than zero".to_string()));
        }
        Ok(Self { block_time })
    }
}

fn index_prefix(da_height: u64) -> String {
    format!("{}/", da_height)
}

fn index_key(da_height: u64, height: u64) -> String {
    format!("{}/{}", da_height, height)
}

fn content_key(hash: &Hash32) -> String {
    hex::encode(hash)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock DA layer client. Stores blocks locally; intended for tests and devnets.
pub struct MockDaClient {
    namespace_id: NamespaceId,
    config: MockConfig,
    store: Option<Arc<dyn KeyedStore>>,
    da_height: Option<watch::Receiver<u64>>,
    /// Held until `start` moves it into the background task.
    oracle: Mutex<Option<HeightOracle>>,
    shutdown: Mutex<Option<CancellationToken>>,
}

impl Default for MockDaClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDaClient {
    pub fn new() -> Self {
        Self {
            namespace_id: NamespaceId::default(),
            config: MockConfig::default(),
            store: None,
            da_height: None,
            oracle: Mutex::new(None),
            shutdown: Mutex::new(None),
        }
    }

    pub fn config(&self) -> MockConfig {
        self.config
    }

    pub fn namespace_id(&self) -> NamespaceId {
        self.namespace_id
    }

    /// Current DA height (the retrieval frontier).
    pub fn da_height(&self) -> Result<u64, DaError> {
        self.da_height
            .as_ref()
            .map(|rx| *rx.borrow())
            .ok_or(DaError::NotInitialized)
    }

    /// Subscribe to DA height changes.
    pub fn subscribe_height(&self) -> Result<watch::Receiver<u64>, DaError> {
        self.da_height.clone().ok_or(DaError::NotInitialized)
    }

    /// Take the height oracle out of the client to drive the height by hand.
    ///
    /// After this, `start` fails: there is no background clock left to run.
    pub fn detach_oracle(&self) -> Option<HeightOracle> {
        lock(&self.oracle).take()
    }

    fn store(&self) -> Result<&dyn KeyedStore, DaError> {
        self.store.as_deref().ok_or(DaError::NotInitialized)
    }

    // `try_submit` and `try_retrieve` call the store synchronously from the async
    // contract methods. A store that can block for long must be moved to
    // `tokio::task::spawn_blocking` first.
    fn try_submit(&self, block: &Block) -> Result<u64, DaError> {
        let store = self.store()?;
        let da_height = self.da_height()?;
        debug!(
            "Submitting block to DA layer: height={}, da_height={}",
            block.height(),
            da_height
        );

        let hash = block.hash();
        let blob = block.encode()?;

        store.put(&content_key(&hash), &blob)?;
        store.put(&index_key(da_height, block.height()), &hash)?;

        Ok(da_height)
    }

    fn try_retrieve(&self, da_height: u64) -> Result<Vec<Block>, DaError> {
        let store = self.store()?;
        if da_height >= self.da_height()? {
            return Err(DaError::BlockNotFound);
        }

        let entries = store.prefix_scan(&index_prefix(da_height))?;
        let mut blocks = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let hash: Hash32 =
                value
                    .as_slice()
                    .try_into()
                    .map_err(|_| DaError::CorruptIndex {
                        reason: format!("expected 32-byte hash, got {} bytes", value.len()),
                        key,
                    })?;
            let blob = store.get(&content_key(&hash))?;
            blocks.push(Block::decode(&blob)?);
        }

        blocks.sort_by_key(Block::height);
        Ok(blocks)
    }
}

#[async_trait]
impl DataAvailabilityLayerClient for MockDaClient {
    fn init(
        &mut self,
        namespace_id: NamespaceId,
        config: &[u8],
        store: Arc<dyn KeyedStore>,
    ) -> Result<(), DaError> {
        self.config = MockConfig::parse(config)?;
        self.namespace_id = namespace_id;
        self.store = Some(store);

        let (oracle, rx) = HeightOracle::new(INITIAL_DA_HEIGHT, self.config.block_time);
        self.da_height = Some(rx);
        *lock(&self.oracle) = Some(oracle);

        info!(
            "Mock DA layer initialized: namespace={}, block_time={}",
            namespace_id,
            humantime::format_duration(self.config.block_time)
        );
        Ok(())
    }

    fn start(&self) -> Result<(), DaError> {
        if self.store.is_none() {
            return Err(DaError::NotInitialized);
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| DaError::Startup(e.to_string()))?;
        let oracle = lock(&self.oracle).take().ok_or_else(|| {
            DaError::Startup("height oracle already started or detached".to_string())
        })?;

        let token = CancellationToken::new();
        runtime.spawn(oracle.run(token.child_token()));
        *lock(&self.shutdown) = Some(token);

        debug!("Mock Data Availability Layer Client starting");
        Ok(())
    }

    fn stop(&self) -> Result<(), DaError> {
        if let Some(token) = lock(&self.shutdown).take() {
            token.cancel();
        }
        debug!("Mock Data Availability Layer Client stopped");
        Ok(())
    }

    async fn submit_block(&self, block: &Block) -> ResultSubmitBlock {
        match self.try_submit(block) {
            Ok(da_height) => ResultSubmitBlock {
                base: BaseResult::success(da_height),
            },
            Err(e) => {
                warn!("Failed to submit block {}: {}", block.height(), e);
                ResultSubmitBlock {
                    base: BaseResult::error(e),
                }
            }
        }
    }

    async fn check_block_availability(&self, da_height: u64) -> ResultCheckBlock {
        let result = self.retrieve_blocks(da_height).await;
        ResultCheckBlock {
            data_available: !result.blocks.is_empty(),
            base: result.base,
        }
    }
}

#[async_trait]
impl BlockRetriever for MockDaClient {
    async fn retrieve_blocks(&self, da_height: u64) -> ResultRetrieveBlocks {
        match self.try_retrieve(da_height) {
            Ok(blocks) => ResultRetrieveBlocks {
                base: BaseResult::success(da_height),
                blocks,
            },
            Err(DaError::BlockNotFound) => ResultRetrieveBlocks {
                base: BaseResult {
                    da_height,
                    ..BaseResult::error(DaError::BlockNotFound)
                },
                blocks: Vec::new(),
            },
            Err(e) => {
                warn!("Failed to retrieve blocks at DA height {}: {}", da_height, e);
                ResultRetrieveBlocks {
                    base: BaseResult {
                        da_height,
                        ..BaseResult::error(e)
                    },
                    blocks: Vec::new(),
                }
            }
        }
    }
}

impl Drop for MockDaClient {
    fn drop(&mut self) {
        if let Some(token) = lock(&self.shutdown).take() {
            token.cancel();
        }
    }
}
