//! Core rollup node implementation.

use crate::executor::BlockExecutor;
use crate::sync::DaSyncer;
use anyhow::{bail, Context, Result};
use block_schema::Block;
use config::NodeConfig;
use da::{registry, BaseResult, DaLayer, ResultSubmitBlock};
use state::{ChainState, ChainStateStore, GenesisDoc};
use std::sync::Arc;
use store::SledStore;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Tree holding the DA client's index and content entries.
pub const DA_TREE: &str = "da";
/// Tree holding the chain state.
pub const STATE_TREE: &str = "state";

/// The rollup node.
pub struct RollupNode {
    config: NodeConfig,
    da: Arc<dyn DaLayer>,
    state_store: Arc<ChainStateStore<SledStore>>,
    state: Arc<RwLock<ChainState>>,
}

impl RollupNode {
    /// Open a node backed by the database in `config.db_dir()`.
    pub fn open(config: NodeConfig, genesis: &GenesisDoc) -> Result<Self> {
        config.validate()?;
        let db_dir = config.db_dir();
        std::fs::create_dir_all(&db_dir)
            .with_context(|| format!("failed to create {}", db_dir.display()))?;
        let db = sled::open(&db_dir)
            .with_context(|| format!("failed to open database at {}", db_dir.display()))?;
        // The DA client's blocks live for this process only; its height starts
        // over on every open.
        let da_db = sled::Config::new().temporary(true).open()?;
        let da = Self::init_da_client(&config, &da_db)?;
        Self::build(config, genesis, &db, da, true)
    }

    /// Create an in-memory node (for testing).
    pub fn in_memory(config: NodeConfig, genesis: &GenesisDoc) -> Result<Self> {
        config.validate()?;
        let db = sled::Config::new().temporary(true).open()?;
        let da = Self::init_da_client(&config, &db)?;
        Self::build(config, genesis, &db, da, true)
    }

    /// Resolve the configured DA backend and initialize it on the `da` tree of `db`.
    pub fn init_da_client(config: &NodeConfig, db: &sled::Db) -> Result<Arc<dyn DaLayer>> {
        let mut da = registry::get_client(&config.da_layer)?;
        da.init(
            config.block_manager.header_namespace_id,
            config.da_config.as_bytes(),
            Arc::new(SledStore::from_db(db, DA_TREE)?),
        )
        .with_context(|| format!("failed to initialize DA layer client {}", config.da_layer))?;
        Ok(Arc::from(da))
    }

    /// Build a node around an already initialized DA client whose history
    /// persists alongside `db`.
    ///
    /// Loads the persisted chain state, or creates it from `genesis` on first start.
    pub fn with_da_client(
        config: NodeConfig,
        genesis: &GenesisDoc,
        db: &sled::Db,
        da: Arc<dyn DaLayer>,
    ) -> Result<Self> {
        Self::build(config, genesis, db, da, false)
    }

    /// With `fresh_da`, the DA client starts without history and the DA cursor
    /// restarts at `da_start_height`.
    fn build(
        config: NodeConfig,
        genesis: &GenesisDoc,
        db: &sled::Db,
        da: Arc<dyn DaLayer>,
        fresh_da: bool,
    ) -> Result<Self> {
        let state_store = ChainStateStore::new(SledStore::from_db(db, STATE_TREE)?);

        let mut state = match state_store.load()? {
            Some(state) => {
                if state.chain_id != genesis.chain_id {
                    bail!(
                        "database belongs to chain {}, genesis is for {}",
                        state.chain_id,
                        genesis.chain_id
                    );
                }
                info!(
                    "Loaded chain state: height={}, da_height={}",
                    state.last_block_height, state.da_height
                );
                state
            }
            None => {
                let state = ChainState::from_genesis(genesis)?;
                info!(
                    "Created genesis state for chain {} at initial height {}",
                    state.chain_id, state.initial_height
                );
                state
            }
        };

        let da_start_height = config.block_manager.da_start_height;
        if fresh_da {
            if state.da_height != da_start_height {
                info!(
                    "DA layer has no history, restarting DA sync at height {} (was {})",
                    da_start_height, state.da_height
                );
                state.restart_da_height(da_start_height);
            }
            state_store.save_after_da_restart(&state)?;
        } else {
            if state.da_height < da_start_height {
                state.advance_da_height(da_start_height)?;
            }
            state_store.save(&state)?;
        }
        state_store.inner().flush()?;

        Ok(Self {
            config,
            da,
            state_store: Arc::new(state_store),
            state: Arc::new(RwLock::new(state)),
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// The DA layer client.
    pub fn da(&self) -> Arc<dyn DaLayer> {
        Arc::clone(&self.da)
    }

    /// Snapshot of the current chain state.
    pub async fn state(&self) -> ChainState {
        self.state.read().await.clone()
    }

    /// Start background activity of the DA client.
    pub fn start(&self) -> Result<()> {
        self.da.start()?;
        info!("Rollup node started with DA layer {}", self.config.da_layer);
        Ok(())
    }

    /// Stop background activity of the DA client.
    pub fn stop(&self) -> Result<()> {
        self.da.stop()?;
        info!("Rollup node stopped");
        Ok(())
    }

    /// Anchor `block` on the DA layer.
    ///
    /// Gives up with a timeout result after one DA block time.
    pub async fn submit_block(&self, block: &Block) -> ResultSubmitBlock {
        let deadline = self.config.block_manager.da_block_time;
        let result = match tokio::time::timeout(deadline, self.da.submit_block(block)).await {
            Ok(result) => result,
            Err(_) => ResultSubmitBlock {
                base: BaseResult::timeout(format!(
                    "submission timed out after {}",
                    humantime::format_duration(deadline)
                )),
            },
        };

        if result.base.is_success() {
            info!(
                "Block {} ({}) anchored at DA height {}",
                block.height(),
                hex::encode(block.hash()),
                result.base.da_height
            );
        } else {
            warn!(
                "Failed to submit block {} to DA layer: {:?}: {}",
                block.height(),
                result.base.code,
                result.base.message
            );
        }
        result
    }

    /// A syncer that applies blocks retrieved from the DA layer to this node's state.
    pub fn syncer(&self, executor: Arc<dyn BlockExecutor>) -> DaSyncer {
        DaSyncer::new(
            Arc::clone(&self.da),
            Arc::clone(&self.state),
            Arc::clone(&self.state_store),
            executor,
            self.config.block_manager.da_block_time,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use da::StatusCode;

    fn genesis() -> GenesisDoc {
        GenesisDoc::new("rollup-1").with_validator(b"sequencer".to_vec(), 1)
    }

    #[tokio::test]
    async fn test_in_memory_genesis() {
        let node = RollupNode::in_memory(NodeConfig::default(), &genesis()).unwrap();
        let state = node.state().await;
        assert_eq!(state.chain_id, "rollup-1");
        assert_eq!(state.last_block_height, 0);
        assert_eq!(state.da_height, 1);
    }

    #[tokio::test]
    async fn test_da_start_height_lifts_cursor() {
        let mut config = NodeConfig::default();
        config.block_manager.da_start_height = 42;
        let node = RollupNode::in_memory(config, &genesis()).unwrap();
        assert_eq!(node.state().await.da_height, 42);
    }

    #[tokio::test]
    async fn test_reopen_restarts_da_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let config = NodeConfig {
            root_dir: dir.path().to_path_buf(),
            ..Default::default()
        };

        {
            let mut config = config.clone();
            config.block_manager.da_start_height = 7;
            let node = RollupNode::open(config, &genesis()).unwrap();
            assert_eq!(node.state().await.da_height, 7);
        }

        // the mock DA layer starts over, so does the DA cursor
        let node = RollupNode::open(config, &genesis()).unwrap();
        let state = node.state().await;
        assert_eq!(state.chain_id, "rollup-1");
        assert_eq!(state.da_height, 1);
    }

    #[test]
    fn test_with_da_client_keeps_cursor() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let mut config = NodeConfig::default();
        config.block_manager.da_start_height = 7;
        let da = RollupNode::init_da_client(&config, &db).unwrap();
        drop(RollupNode::with_da_client(config.clone(), &genesis(), &db, da).unwrap());

        // a DA layer that keeps its history never moves the cursor back
        config.block_manager.da_start_height = 1;
        let da = RollupNode::init_da_client(&config, &db).unwrap();
        let node = RollupNode::with_da_client(config, &genesis(), &db, da).unwrap();
        assert_eq!(node.state.blocking_read().da_height, 7);
    }

    #[tokio::test]
    async fn test_reopen_with_other_chain_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = NodeConfig {
            root_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        drop(RollupNode::open(config.clone(), &genesis()).unwrap());

        let other = GenesisDoc::new("rollup-2").with_validator(b"sequencer".to_vec(), 1);
        assert!(RollupNode::open(config, &other).is_err());
    }

    #[test]
    fn test_unknown_da_layer() {
        let config = NodeConfig {
            da_layer: "carrier-pigeon".to_string(),
            ..Default::default()
        };
        let err = RollupNode::in_memory(config, &genesis()).err().unwrap();
        assert!(err.to_string().contains("carrier-pigeon"));
    }

    #[test]
    fn test_bad_da_config() {
        let config = NodeConfig {
            da_config: "notaduration".to_string(),
            ..Default::default()
        };
        assert!(RollupNode::in_memory(config, &genesis()).is_err());
    }

    #[tokio::test]
    async fn test_submit_block() {
        let node = RollupNode::in_memory(NodeConfig::default(), &genesis()).unwrap();
        let block = Block::new("rollup-1", 1, 0, [0u8; 32], vec![]);

        let result = node.submit_block(&block).await;
        assert_eq!(result.base.code, StatusCode::Success);
        assert_eq!(result.base.da_height, 1);
    }
}
