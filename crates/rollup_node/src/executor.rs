//! Block execution seam.

use anyhow::Result;
use block_schema::Block;
use state::{ChainState, ExecutionOutcome};

/// Executes a block against the application and reports the outcome.
pub trait BlockExecutor: Send + Sync {
    fn execute(&self, state: &ChainState, block: &Block) -> Result<ExecutionOutcome>;
}

/// Executor that adopts the commitments carried in the block header.
///
/// Never changes validators or consensus parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughExecutor;

impl BlockExecutor for PassthroughExecutor {
    fn execute(&self, _state: &ChainState, block: &Block) -> Result<ExecutionOutcome> {
        Ok(ExecutionOutcome {
            app_hash: block.header.app_hash,
            last_results_hash: block.header.last_results_hash,
            ..Default::default()
        })
    }
}
