//! Rollup chain state.
//!
//! This crate provides the persisted record of rollup progress: the last applied
//! block, the DA retrieval cursor, and the versioned validator sets and consensus
//! parameters, together with the transition bookkeeping that keeps them
//! consistent from one block to the next.

pub mod chain_state;
pub mod genesis;
pub mod params;
pub mod state_store;
pub mod validators;

pub use chain_state::{ChainState, ExecutionOutcome};
pub use genesis::{GenesisDoc, GenesisValidator};
pub use params::ConsensusParams;
pub use state_store::ChainStateStore;
pub use validators::{Validator, ValidatorSet, ValidatorUpdate};

use thiserror::Error;

/// Errors that can occur during state operations.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("store error: {0}")]
    Store(#[from] store::StoreError),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid genesis json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid genesis: {0}")]
    InvalidGenesis(String),
    #[error("wrong chain id: expected {expected}, got {got}")]
    WrongChainId { expected: String, got: String },
    #[error("non-contiguous block height: expected {expected}, got {got}")]
    NonContiguousHeight { expected: u64, got: u64 },
    #[error("block time went backwards: last {last}, got {got}")]
    TimeRegression { last: u64, got: u64 },
    #[error("block height regression: persisted {persisted}, got {got}")]
    HeightRegression { persisted: u64, got: u64 },
    #[error("DA height regression: current {current}, got {got}")]
    DaHeightRegression { current: u64, got: u64 },
    #[error("invalid validator: {0}")]
    InvalidValidator(String),
    #[error("duplicate validator: {0}")]
    DuplicateValidator(String),
    #[error("unknown validator: {0}")]
    UnknownValidator(String),
    #[error("validator set would be empty")]
    EmptyValidatorSet,
    #[error("total voting power overflow")]
    VotingPowerOverflow,
    #[error("invalid consensus params: {0}")]
    InvalidConsensusParams(String),
}
