//! Data availability layer client.
//!
//! This crate defines the contract a rollup node uses to anchor its blocks on an
//! external DA layer and to read them back by DA height:
//! - [`DataAvailabilityLayerClient`]: lifecycle, block submission and availability checks
//! - [`BlockRetriever`]: retrieval of every block anchored at a DA height
//!
//! All operations report a tagged [`StatusCode`] with a message instead of
//! failing; callers decide whether to retry. The [`mock`] backend is the
//! reference implementation of the contract, backed by a keyed store and a
//! simulated height clock ([`oracle::HeightOracle`]).

pub mod mock;
pub mod oracle;
pub mod registry;

use async_trait::async_trait;
use block_schema::{Block, BlockError, NamespaceId};
use std::sync::Arc;
use store::{KeyedStore, StoreError};
use thiserror::Error;

pub use mock::MockDaClient;
pub use oracle::HeightOracle;

/// Message of a retrieval at or beyond the current DA height.
pub const BLOCK_NOT_FOUND: &str = "block not found";

/// Errors that can occur inside a DA layer client.
///
/// Contract operations render these into the message of a failed result.
#[derive(Error, Debug)]
pub enum DaError {
    #[error("invalid DA config: {0}")]
    Config(String),
    #[error("failed to start DA client: {0}")]
    Startup(String),
    #[error("DA client used before initialization")]
    NotInitialized,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Serialization(#[from] BlockError),
    #[error("block not found")]
    BlockNotFound,
    #[error("corrupt index entry {key}: {reason}")]
    CorruptIndex { key: String, reason: String },
    #[error("unknown DA layer client: {0}")]
    UnknownBackend(String),
}

/// Outcome of a DA operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusCode {
    #[default]
    Unknown,
    Success,
    Timeout,
    Error,
}

/// Fields shared by every DA result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaseResult {
    pub code: StatusCode,
    pub message: String,
    /// DA height the operation refers to (the anchoring height for submissions).
    pub da_height: u64,
}

impl BaseResult {
    pub fn success(da_height: u64) -> Self {
        Self {
            code: StatusCode::Success,
            message: "OK".to_string(),
            da_height,
        }
    }

    pub fn error(err: impl ToString) -> Self {
        Self {
            code: StatusCode::Error,
            message: err.to_string(),
            da_height: 0,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::Timeout,
            message: message.into(),
            da_height: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == StatusCode::Success
    }
}

/// Result of [`DataAvailabilityLayerClient::submit_block`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSubmitBlock {
    pub base: BaseResult,
}

/// Result of [`DataAvailabilityLayerClient::check_block_availability`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultCheckBlock {
    pub base: BaseResult,
    pub data_available: bool,
}

/// Result of [`BlockRetriever::retrieve_blocks`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultRetrieveBlocks {
    pub base: BaseResult,
    pub blocks: Vec<Block>,
}

impl ResultRetrieveBlocks {
    /// Whether the height was not yet served by the DA layer.
    pub fn is_not_found(&self) -> bool {
        self.base.code == StatusCode::Error && self.base.message == BLOCK_NOT_FOUND
    }
}

/// Client side of a DA layer.
///
/// Lifecycle: `init` once, then `start`; `submit_block` and
/// `check_block_availability` are meaningful while running; `stop` ends
/// background activity.
#[async_trait]
pub trait DataAvailabilityLayerClient: Send + Sync {
    /// Read the backend configuration and bind the store. Called once before `start`.
    fn init(
        &mut self,
        namespace_id: NamespaceId,
        config: &[u8],
        store: Arc<dyn KeyedStore>,
    ) -> Result<(), DaError>;

    /// Begin background activity and return immediately.
    fn start(&self) -> Result<(), DaError>;

    /// Signal background activity to cease.
    fn stop(&self) -> Result<(), DaError>;

    /// Anchor `block` at the current DA height.
    async fn submit_block(&self, block: &Block) -> ResultSubmitBlock;

    /// Whether at least one block is anchored at `da_height`.
    async fn check_block_availability(&self, da_height: u64) -> ResultCheckBlock;
}

/// Retrieval of anchored blocks by DA height.
#[async_trait]
pub trait BlockRetriever: Send + Sync {
    /// All blocks anchored at `da_height`.
    async fn retrieve_blocks(&self, da_height: u64) -> ResultRetrieveBlocks;
}

/// A DA client that also serves retrieval.
pub trait DaLayer: DataAvailabilityLayerClient + BlockRetriever {}

impl<T: DataAvailabilityLayerClient + BlockRetriever> DaLayer for T {}
