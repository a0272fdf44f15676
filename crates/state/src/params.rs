//! Consensus parameters.

use crate::StateError;
use serde::{Deserialize, Serialize};

/// Hard cap on the block size (100 MiB).
pub const MAX_BLOCK_SIZE_BYTES: i64 = 104_857_600;

/// Public key types a validator may use.
pub const KNOWN_PUB_KEY_TYPES: &[&str] = &["ed25519", "secp256k1"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockParams {
    /// Maximum block size in bytes, or -1 for the hard cap.
    pub max_bytes: i64,
    /// Maximum gas per block, or -1 for unlimited.
    pub max_gas: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvidenceParams {
    pub max_age_num_blocks: i64,
    pub max_age_duration_ms: u64,
    pub max_bytes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidatorParams {
    pub pub_key_types: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionParams {
    pub app: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsensusParams {
    pub block: BlockParams,
    pub evidence: EvidenceParams,
    pub validator: ValidatorParams,
    #[serde(default)]
    pub version: VersionParams,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            block: BlockParams {
                max_bytes: 22_020_096,
                max_gas: -1,
            },
            evidence: EvidenceParams {
                max_age_num_blocks: 100_000,
                max_age_duration_ms: 48 * 60 * 60 * 1000,
                max_bytes: 1_048_576,
            },
            validator: ValidatorParams {
                pub_key_types: vec!["ed25519".to_string()],
            },
            version: VersionParams::default(),
        }
    }
}

impl ConsensusParams {
    /// Check the parameters are internally consistent.
    pub fn validate(&self) -> Result<(), StateError> {
        let invalid = |msg: String| Err(StateError::InvalidConsensusParams(msg));

        if self.block.max_bytes == 0 || self.block.max_bytes < -1 {
            return invalid(format!(
                "block.max_bytes must be -1 or greater than 0, got {}",
                self.block.max_bytes
            ));
        }
        if self.block.max_bytes > MAX_BLOCK_SIZE_BYTES {
            return invalid(format!(
                "block.max_bytes is too big: {} > {}",
                self.block.max_bytes, MAX_BLOCK_SIZE_BYTES
            ));
        }
        if self.block.max_gas < -1 {
            return invalid(format!(
                "block.max_gas must be greater or equal to -1, got {}",
                self.block.max_gas
            ));
        }
        if self.evidence.max_age_num_blocks <= 0 {
            return invalid(format!(
                "evidence.max_age_num_blocks must be greater than 0, got {}",
                self.evidence.max_age_num_blocks
            ));
        }
        if self.evidence.max_age_duration_ms == 0 {
            return invalid("evidence.max_age_duration_ms must be greater than 0".to_string());
        }
        let block_cap = if self.block.max_bytes == -1 {
            MAX_BLOCK_SIZE_BYTES
        } else {
            self.block.max_bytes
        };
        if self.evidence.max_bytes < 0 || self.evidence.max_bytes > block_cap {
            return invalid(format!(
                "evidence.max_bytes must be in [0, {}], got {}",
                block_cap, self.evidence.max_bytes
            ));
        }
        if self.validator.pub_key_types.is_empty() {
            return invalid("validator.pub_key_types must not be empty".to_string());
        }
        for key_type in &self.validator.pub_key_types {
            if !KNOWN_PUB_KEY_TYPES.contains(&key_type.as_str()) {
                return invalid(format!("unknown pub key type: {}", key_type));
            }
        }
        Ok(())
    }
}
