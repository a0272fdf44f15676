//! Sync of rollup blocks from the DA layer.

use crate::executor::BlockExecutor;
use anyhow::{bail, Context, Result};
use block_schema::Block;
use da::DaLayer;
use state::{ChainState, ChainStateStore};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use store::SledStore;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of one sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// First DA height queried.
    pub from_da_height: u64,
    /// DA height the next pass starts from.
    pub next_da_height: u64,
    /// Number of blocks applied to the chain state.
    pub blocks_applied: u64,
    /// Blocks seen again after they were applied or buffered.
    pub duplicates: u64,
}

/// Retrieves blocks from the DA layer height by height and applies them in
/// rollup-height order.
///
/// Blocks ahead of the next rollup height are buffered until the gap is filled.
/// The persisted DA cursor never moves past the lowest DA height that still has
/// a buffered block, so a restart re-reads everything not yet applied.
pub struct DaSyncer {
    da: Arc<dyn DaLayer>,
    state: Arc<RwLock<ChainState>>,
    state_store: Arc<ChainStateStore<SledStore>>,
    executor: Arc<dyn BlockExecutor>,
    da_block_time: Duration,
    /// Next DA height to query; starts at the persisted cursor.
    cursor: Option<u64>,
    /// Buffered blocks by rollup height, with the DA height they came from.
    pending: BTreeMap<u64, (u64, Block)>,
}

impl DaSyncer {
    pub fn new(
        da: Arc<dyn DaLayer>,
        state: Arc<RwLock<ChainState>>,
        state_store: Arc<ChainStateStore<SledStore>>,
        executor: Arc<dyn BlockExecutor>,
        da_block_time: Duration,
    ) -> Self {
        Self {
            da,
            state,
            state_store,
            executor,
            da_block_time,
            cursor: None,
            pending: BTreeMap::new(),
        }
    }

    /// Number of blocks waiting for a missing predecessor.
    pub fn pending_blocks(&self) -> usize {
        self.pending.len()
    }

    /// Query DA heights from the cursor up to the DA frontier and apply what they hold.
    ///
    /// Each processed height is persisted before the next one is queried. A failed
    /// or timed out retrieval ends the pass with an error and leaves the cursor on
    /// the failing height.
    pub async fn sync_once(&mut self) -> Result<SyncReport> {
        let mut state = self.state.read().await.clone();
        let from_da_height = *self.cursor.get_or_insert(state.da_height);
        let mut report = SyncReport {
            from_da_height,
            next_da_height: from_da_height,
            ..Default::default()
        };

        loop {
            let da_height = report.next_da_height;
            let result =
                match tokio::time::timeout(self.da_block_time, self.da.retrieve_blocks(da_height))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => bail!(
                        "retrieving DA height {} timed out after {}",
                        da_height,
                        humantime::format_duration(self.da_block_time)
                    ),
                };

            if result.is_not_found() {
                debug!("DA height {} not available yet", da_height);
                break;
            }
            if !result.base.is_success() {
                bail!(
                    "failed to retrieve DA height {}: {:?}: {}",
                    da_height,
                    result.base.code,
                    result.base.message
                );
            }

            for block in result.blocks {
                if self.buffer(&state, da_height, block) {
                    report.duplicates += 1;
                }
            }

            let mut next_state = state.clone();
            let mut applied = Vec::new();
            while let Some((_, block)) = self.pending.get(&next_state.next_height()) {
                let outcome = self
                    .executor
                    .execute(&next_state, block)
                    .with_context(|| format!("failed to execute block {}", block.height()))?;
                next_state = next_state
                    .apply_block(block, outcome)
                    .with_context(|| format!("failed to apply block {}", block.height()))?;
                applied.push(block.height());
            }
            for height in &applied {
                self.pending.remove(height);
            }

            let cursor = da_height + 1;
            let resume_from = self
                .pending
                .values()
                .map(|(buffered_at, _)| *buffered_at)
                .min()
                .map_or(cursor, |lowest| lowest.min(cursor));
            if resume_from > next_state.da_height {
                next_state.advance_da_height(resume_from)?;
            }
            self.state_store.save(&next_state)?;
            self.state_store.inner().flush()?;
            *self.state.write().await = next_state.clone();

            if !applied.is_empty() {
                info!(
                    "Applied {} block(s) from DA height {}, rollup height is now {}",
                    applied.len(),
                    da_height,
                    next_state.last_block_height
                );
            }
            state = next_state;
            report.blocks_applied += applied.len() as u64;
            report.next_da_height = cursor;
            self.cursor = Some(cursor);
        }

        Ok(report)
    }

    /// Buffer `block` unless it is foreign, already applied or already buffered.
    ///
    /// Returns whether the block was a duplicate.
    fn buffer(&mut self, state: &ChainState, da_height: u64, block: Block) -> bool {
        if block.header.chain_id != state.chain_id {
            warn!(
                "Skipping block {} of foreign chain {} at DA height {}",
                block.height(),
                block.header.chain_id,
                da_height
            );
            return false;
        }
        if block.height() <= state.last_block_height {
            debug!("Block {} already applied", block.height());
            return true;
        }
        match self.pending.get(&block.height()) {
            Some((_, buffered)) => {
                if buffered.hash() != block.hash() {
                    warn!(
                        "Conflicting block {} at DA height {}, keeping the first one seen",
                        block.height(),
                        da_height
                    );
                }
                true
            }
            None => {
                self.pending.insert(block.height(), (da_height, block));
                false
            }
        }
    }

    /// Sync every DA block time until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.da_block_time);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "DA syncer running every {}",
            humantime::format_duration(self.da_block_time)
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("DA syncer stopped");
                    return;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.sync_once().await {
                        warn!("DA sync failed: {:#}", e);
                    }
                }
            }
        }
    }
}
