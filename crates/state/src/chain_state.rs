//! The persisted record of rollup progress.

use crate::genesis::GenesisDoc;
use crate::params::ConsensusParams;
use crate::validators::{ValidatorSet, ValidatorUpdate};
use crate::StateError;
use block_schema::{Block, BlockId, Hash32, Version, BLOCK_PROTOCOL_VERSION};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Results of executing a block, produced by the state-transition function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub app_hash: Hash32,
    pub last_results_hash: Hash32,
    pub validator_updates: Vec<ValidatorUpdate>,
    /// New consensus parameters, if execution changed them.
    pub consensus_params: Option<ConsensusParams>,
}

/// Rollup chain state.
///
/// A validator-set change decided while applying block `H` becomes the active set
/// at `H + 2`; a consensus-parameter change is active at `H + 1`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChainState {
    pub version: Version,
    pub chain_id: String,
    pub initial_height: u64,

    pub last_block_height: u64,
    pub last_block_id: BlockId,
    /// Unix milliseconds.
    pub last_block_time: u64,

    /// DA retrieval cursor: every DA height below it has been ingested.
    pub da_height: u64,

    pub next_validators: ValidatorSet,
    pub validators: ValidatorSet,
    pub last_validators: ValidatorSet,
    pub last_height_validators_changed: u64,

    pub consensus_params: ConsensusParams,
    pub last_height_consensus_params_changed: u64,

    pub last_results_hash: Hash32,
    pub app_hash: Hash32,
}

impl ChainState {
    /// Build the initial state from a genesis document.
    pub fn from_genesis(genesis: &GenesisDoc) -> Result<Self, StateError> {
        genesis.validate()?;
        let validators = genesis.validator_set()?;

        Ok(Self {
            version: Version {
                block: BLOCK_PROTOCOL_VERSION,
                app: genesis.consensus_params.version.app,
            },
            chain_id: genesis.chain_id.clone(),
            initial_height: genesis.initial_height,
            last_block_height: genesis.initial_height - 1,
            last_block_id: BlockId::default(),
            last_block_time: genesis.genesis_time,
            da_height: 1,
            next_validators: validators.clone(),
            validators,
            last_validators: ValidatorSet::empty(),
            last_height_validators_changed: genesis.initial_height,
            consensus_params: genesis.consensus_params.clone(),
            last_height_consensus_params_changed: genesis.initial_height,
            last_results_hash: [0u8; 32],
            app_hash: genesis.app_hash,
        })
    }

    /// Height the next applied block must have.
    pub fn next_height(&self) -> u64 {
        self.last_block_height + 1
    }

    /// Whether no block has been applied yet.
    pub fn is_genesis(&self) -> bool {
        self.last_block_height + 1 == self.initial_height
    }

    /// Produce the state after applying `block` with the given execution outcome.
    ///
    /// `da_height` is carried unchanged: it only moves through [`Self::advance_da_height`].
    pub fn apply_block(
        &self,
        block: &Block,
        outcome: ExecutionOutcome,
    ) -> Result<ChainState, StateError> {
        let header = &block.header;
        if header.chain_id != self.chain_id {
            return Err(StateError::WrongChainId {
                expected: self.chain_id.clone(),
                got: header.chain_id.clone(),
            });
        }
        if header.height != self.next_height() {
            return Err(StateError::NonContiguousHeight {
                expected: self.next_height(),
                got: header.height,
            });
        }
        if header.time < self.last_block_time {
            return Err(StateError::TimeRegression {
                last: self.last_block_time,
                got: header.time,
            });
        }

        let mut next_validators = self.next_validators.clone();
        let mut last_height_validators_changed = self.last_height_validators_changed;
        if !outcome.validator_updates.is_empty() {
            let updated = self.next_validators.apply_updates(&outcome.validator_updates)?;
            if updated != self.next_validators {
                last_height_validators_changed = header.height + 2;
                debug!(
                    "Validator set changes at height {}, active from {}",
                    header.height, last_height_validators_changed
                );
            }
            next_validators = updated;
        }

        let mut consensus_params = self.consensus_params.clone();
        let mut last_height_consensus_params_changed = self.last_height_consensus_params_changed;
        if let Some(params) = outcome.consensus_params {
            params.validate()?;
            if params != self.consensus_params {
                consensus_params = params;
                last_height_consensus_params_changed = header.height + 1;
            }
        }

        Ok(ChainState {
            version: Version {
                block: self.version.block,
                app: consensus_params.version.app,
            },
            chain_id: self.chain_id.clone(),
            initial_height: self.initial_height,
            last_block_height: header.height,
            last_block_id: block.id(),
            last_block_time: header.time,
            da_height: self.da_height,
            next_validators,
            validators: self.next_validators.clone(),
            last_validators: self.validators.clone(),
            last_height_validators_changed,
            consensus_params,
            last_height_consensus_params_changed,
            last_results_hash: outcome.last_results_hash,
            app_hash: outcome.app_hash,
        })
    }

    /// Move the DA cursor forward. Moving it backwards is an error.
    pub fn advance_da_height(&mut self, da_height: u64) -> Result<(), StateError> {
        if da_height < self.da_height {
            return Err(StateError::DaHeightRegression {
                current: self.da_height,
                got: da_height,
            });
        }
        self.da_height = da_height;
        Ok(())
    }

    /// Point the DA cursor at `da_height` regardless of its current value.
    ///
    /// Only valid when the DA layer's history was lost, so heights below the old
    /// cursor carry new blocks.
    pub fn restart_da_height(&mut self, da_height: u64) {
        debug!("DA cursor restarted at {} (was {})", da_height, self.da_height);
        self.da_height = da_height;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn genesis() -> GenesisDoc {
        GenesisDoc::new("rollup-1")
            .with_validator(b"alice".to_vec(), 10)
            .with_validator(b"bob".to_vec(), 10)
    }

    fn block_on(state: &ChainState, time: u64) -> Block {
        Block::new(
            state.chain_id.clone(),
            state.next_height(),
            time,
            state.last_block_id.hash,
            vec![],
        )
    }

    #[test]
    fn test_from_genesis() {
        let state = ChainState::from_genesis(&genesis()).unwrap();
        assert_eq!(state.last_block_height, 0);
        assert_eq!(state.next_height(), 1);
        assert_eq!(state.da_height, 1);
        assert!(state.is_genesis());
        assert_eq!(state.validators, state.next_validators);
        assert!(state.last_validators.is_empty());
        assert_eq!(state.last_height_validators_changed, 1);
        assert_eq!(state.last_height_consensus_params_changed, 1);
    }

    #[test]
    fn test_custom_initial_height() {
        let mut doc = genesis();
        doc.initial_height = 100;
        let state = ChainState::from_genesis(&doc).unwrap();
        assert_eq!(state.last_block_height, 99);

        let next = state
            .apply_block(&block_on(&state, 1), ExecutionOutcome::default())
            .unwrap();
        assert_eq!(next.last_block_height, 100);
        assert!(!next.is_genesis());
    }

    #[test]
    fn test_apply_advances_height_and_rotates_sets() {
        let state = ChainState::from_genesis(&genesis()).unwrap();
        let block = block_on(&state, 10);

        let outcome = ExecutionOutcome {
            app_hash: [9u8; 32],
            last_results_hash: [8u8; 32],
            ..Default::default()
        };
        let next = state.apply_block(&block, outcome).unwrap();

        assert_eq!(next.last_block_height, 1);
        assert_eq!(next.last_block_id, block.id());
        assert_eq!(next.last_block_time, 10);
        assert_eq!(next.app_hash, [9u8; 32]);
        assert_eq!(next.last_results_hash, [8u8; 32]);
        assert_eq!(next.last_validators, state.validators);
        assert_eq!(next.validators, state.next_validators);
        assert_eq!(next.last_height_validators_changed, 1);
        assert_eq!(next.da_height, state.da_height);
    }

    #[test]
    fn test_validator_change_takes_effect_two_blocks_later() {
        let s0 = ChainState::from_genesis(&genesis()).unwrap();

        let outcome = ExecutionOutcome {
            validator_updates: vec![ValidatorUpdate::new(b"carol".to_vec(), 5)],
            ..Default::default()
        };
        let s1 = s0.apply_block(&block_on(&s0, 1), outcome).unwrap();
        assert_eq!(s1.last_height_validators_changed, 3);
        assert_eq!(s1.validators, s0.validators);
        assert_eq!(s1.next_validators.len(), 3);

        let s2 = s1
            .apply_block(&block_on(&s1, 2), ExecutionOutcome::default())
            .unwrap();
        // block 3 is the first validated by the new set
        assert_eq!(s2.validators.len(), 3);
        assert_eq!(s2.last_validators.len(), 2);
        assert_eq!(s2.last_height_validators_changed, 3);

        let s3 = s2
            .apply_block(&block_on(&s2, 3), ExecutionOutcome::default())
            .unwrap();
        assert_eq!(s3.last_validators.len(), 3);
        assert_eq!(s3.last_height_validators_changed, 3);
    }

    #[test]
    fn test_noop_validator_update_keeps_changed_height() {
        let s0 = ChainState::from_genesis(&genesis()).unwrap();
        let outcome = ExecutionOutcome {
            validator_updates: vec![ValidatorUpdate::new(b"alice".to_vec(), 10)],
            ..Default::default()
        };
        let s1 = s0.apply_block(&block_on(&s0, 1), outcome).unwrap();
        assert_eq!(s1.last_height_validators_changed, 1);
    }

    #[test]
    fn test_consensus_params_change() {
        let s0 = ChainState::from_genesis(&genesis()).unwrap();

        let mut params = s0.consensus_params.clone();
        params.block.max_gas = 1_000_000;
        params.version.app = 2;
        let outcome = ExecutionOutcome {
            consensus_params: Some(params.clone()),
            ..Default::default()
        };
        let s1 = s0.apply_block(&block_on(&s0, 1), outcome).unwrap();
        assert_eq!(s1.consensus_params, params);
        assert_eq!(s1.last_height_consensus_params_changed, 2);
        assert_eq!(s1.version.app, 2);

        // identical params are not a change
        let outcome = ExecutionOutcome {
            consensus_params: Some(params),
            ..Default::default()
        };
        let s2 = s1.apply_block(&block_on(&s1, 2), outcome).unwrap();
        assert_eq!(s2.last_height_consensus_params_changed, 2);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let s0 = ChainState::from_genesis(&genesis()).unwrap();
        let mut params = s0.consensus_params.clone();
        params.block.max_bytes = 0;
        let outcome = ExecutionOutcome {
            consensus_params: Some(params),
            ..Default::default()
        };
        assert!(matches!(
            s0.apply_block(&block_on(&s0, 1), outcome),
            Err(StateError::InvalidConsensusParams(_))
        ));
    }

    #[test]
    fn test_rejects_gaps_and_regressions() {
        let s0 = ChainState::from_genesis(&genesis()).unwrap();
        let s1 = s0
            .apply_block(&block_on(&s0, 50), ExecutionOutcome::default())
            .unwrap();

        let mut gap = block_on(&s1, 60);
        gap.header.height = 3;
        assert!(matches!(
            s1.apply_block(&gap, ExecutionOutcome::default()),
            Err(StateError::NonContiguousHeight {
                expected: 2,
                got: 3
            })
        ));

        assert!(matches!(
            s1.apply_block(&block_on(&s0, 60), ExecutionOutcome::default()),
            Err(StateError::NonContiguousHeight { .. })
        ));

        assert!(matches!(
            s1.apply_block(&block_on(&s1, 49), ExecutionOutcome::default()),
            Err(StateError::TimeRegression { last: 50, got: 49 })
        ));

        // equal time is allowed
        s1.apply_block(&block_on(&s1, 50), ExecutionOutcome::default())
            .unwrap();

        let mut foreign = block_on(&s1, 60);
        foreign.header.chain_id = "other".to_string();
        assert!(matches!(
            s1.apply_block(&foreign, ExecutionOutcome::default()),
            Err(StateError::WrongChainId { .. })
        ));
    }

    #[test]
    fn test_da_height_never_regresses() {
        let mut state = ChainState::from_genesis(&genesis()).unwrap();
        state.advance_da_height(7).unwrap();
        state.advance_da_height(7).unwrap();
        assert!(matches!(
            state.advance_da_height(6),
            Err(StateError::DaHeightRegression { current: 7, got: 6 })
        ));
        assert_eq!(state.da_height, 7);

        let next = state
            .apply_block(&block_on(&state, 1), ExecutionOutcome::default())
            .unwrap();
        assert_eq!(next.da_height, 7);
    }
}
