//! Rollup node.
//!
//! This crate wires the pieces of a rollup node that talk to the DA layer:
//! - Persists the chain state and resumes from it on restart
//! - Anchors produced blocks on the DA layer
//! - Syncs blocks back from the DA layer and applies them in order

pub mod executor;
pub mod node;
pub mod sync;

pub use executor::{BlockExecutor, PassthroughExecutor};
pub use node::RollupNode;
pub use sync::{DaSyncer, SyncReport};
