//! Rollup node configuration.
//!
//! Plain data consumed at startup by the node and its DA layer client. Values
//! arrive from the command line; anything malformed here is a fatal startup
//! error.

use block_schema::{Hash32, NamespaceId, NAMESPACE_ID_LEN};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const FLAG_AGGREGATOR: &str = "rollkit.aggregator";
pub const FLAG_DA_LAYER: &str = "rollkit.da_layer";
pub const FLAG_DA_CONFIG: &str = "rollkit.da_config";
pub const FLAG_BLOCK_TIME: &str = "rollkit.block_time";
pub const FLAG_DA_BLOCK_TIME: &str = "rollkit.da_block_time";
pub const FLAG_DA_START_HEIGHT: &str = "rollkit.da_start_height";
pub const FLAG_HEADER_NAMESPACE_ID: &str = "rollkit.header_namespace_id";
pub const FLAG_DATA_NAMESPACE_ID: &str = "rollkit.data_namespace_id";
pub const FLAG_FRAUD_PROOFS: &str = "rollkit.experimental_insecure_fraud_proofs";
pub const FLAG_LIGHT: &str = "rollkit.light";
pub const FLAG_TRUSTED_HASH: &str = "rollkit.trusted_hash";
pub const FLAG_LAZY_AGGREGATOR: &str = "rollkit.lazy_aggregator";

/// Configuration errors.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("invalid hex for '{flag}': {source}")]
    InvalidHex {
        flag: String,
        source: hex::FromHexError,
    },
    #[error("invalid length of namespace ID for '{flag}', expected: {expected}, got: {got}")]
    InvalidNamespaceLength {
        flag: String,
        expected: usize,
        got: usize,
    },
    #[error("invalid value for '{flag}': {reason}")]
    InvalidValue { flag: String, reason: String },
}

/// Parse a hex-encoded namespace ID given for `flag`.
pub fn parse_namespace_id(flag: &str, value: &str) -> Result<NamespaceId, ConfigError> {
    let bytes = hex::decode(value).map_err(|source| ConfigError::InvalidHex {
        flag: flag.to_string(),
        source,
    })?;
    NamespaceId::from_bytes(&bytes).map_err(|_| ConfigError::InvalidNamespaceLength {
        flag: flag.to_string(),
        expected: NAMESPACE_ID_LEN,
        got: bytes.len(),
    })
}

/// Parameters of the block manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockManagerConfig {
    /// How often new blocks are produced.
    pub block_time: Duration,
    /// Block time of the underlying DA layer; also the DA polling cadence.
    pub da_block_time: Duration,
    /// First DA height to query when syncing.
    pub da_start_height: u64,
    pub header_namespace_id: NamespaceId,
    pub data_namespace_id: NamespaceId,
    pub fraud_proofs: bool,
}

impl Default for BlockManagerConfig {
    fn default() -> Self {
        Self {
            block_time: Duration::from_secs(1),
            da_block_time: Duration::from_secs(15),
            da_start_height: 1,
            header_namespace_id: NamespaceId::default(),
            data_namespace_id: NamespaceId::default(),
            fraud_proofs: false,
        }
    }
}

/// Initial trusted header for header-exchange sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderConfig {
    /// Hex-encoded header hash; empty when unset.
    pub trusted_hash: String,
}

/// Node configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub root_dir: PathBuf,
    /// Database directory, relative to `root_dir` unless absolute.
    pub db_path: PathBuf,
    pub aggregator: bool,
    /// Skip empty-block production while idle.
    pub lazy_aggregator: bool,
    pub light: bool,
    /// Name of the DA layer client.
    pub da_layer: String,
    /// Backend-specific DA client configuration.
    pub da_config: String,
    pub block_manager: BlockManagerConfig,
    pub header: HeaderConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./data"),
            db_path: PathBuf::from("db"),
            aggregator: false,
            lazy_aggregator: false,
            light: false,
            da_layer: "mock".to_string(),
            da_config: String::new(),
            block_manager: BlockManagerConfig::default(),
            header: HeaderConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Resolved database directory.
    pub fn db_dir(&self) -> PathBuf {
        if self.db_path.is_absolute() {
            self.db_path.clone()
        } else {
            self.root_dir.join(&self.db_path)
        }
    }

    /// The trusted header hash, if one is configured.
    pub fn trusted_hash(&self) -> Result<Option<Hash32>, ConfigError> {
        if self.header.trusted_hash.is_empty() {
            return Ok(None);
        }
        let bytes =
            hex::decode(&self.header.trusted_hash).map_err(|source| ConfigError::InvalidHex {
                flag: FLAG_TRUSTED_HASH.to_string(),
                source,
            })?;
        let hash: Hash32 = bytes
            .as_slice()
            .try_into()
            .map_err(|_| ConfigError::InvalidValue {
                flag: FLAG_TRUSTED_HASH.to_string(),
                reason: format!("expected 32 bytes, got {}", bytes.len()),
            })?;
        Ok(Some(hash))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.da_layer.is_empty() {
            return Err(ConfigError::InvalidValue {
                flag: FLAG_DA_LAYER.to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.block_manager.block_time.is_zero() {
            return Err(ConfigError::InvalidValue {
                flag: FLAG_BLOCK_TIME.to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.block_manager.da_block_time.is_zero() {
            return Err(ConfigError::InvalidValue {
                flag: FLAG_DA_BLOCK_TIME.to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        self.trusted_hash()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = NodeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.da_layer, "mock");
        assert_eq!(config.db_dir(), PathBuf::from("./data/db"));
    }

    #[test]
    fn test_absolute_db_path() {
        let config = NodeConfig {
            db_path: PathBuf::from("/var/lib/rollup"),
            ..Default::default()
        };
        assert_eq!(config.db_dir(), PathBuf::from("/var/lib/rollup"));
    }

    #[test]
    fn test_parse_namespace_id() {
        let ns = parse_namespace_id(FLAG_HEADER_NAMESPACE_ID, "0001020304050607").unwrap();
        assert_eq!(ns.0, [0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_namespace_id_wrong_length() {
        let err = parse_namespace_id(FLAG_DATA_NAMESPACE_ID, "00010203").unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidNamespaceLength {
                flag: FLAG_DATA_NAMESPACE_ID.to_string(),
                expected: 8,
                got: 4,
            }
        );
        assert_eq!(
            err.to_string(),
            "invalid length of namespace ID for 'rollkit.data_namespace_id', expected: 8, got: 4"
        );

        assert!(parse_namespace_id(FLAG_DATA_NAMESPACE_ID, "000102030405060708").is_err());
    }

    #[test]
    fn test_namespace_id_bad_hex() {
        assert!(matches!(
            parse_namespace_id(FLAG_HEADER_NAMESPACE_ID, "xyz"),
            Err(ConfigError::InvalidHex { .. })
        ));
        assert_eq!(
            parse_namespace_id(FLAG_HEADER_NAMESPACE_ID, "abc"),
            Err(ConfigError::InvalidHex {
                flag: FLAG_HEADER_NAMESPACE_ID.to_string(),
                source: hex::FromHexError::OddLength,
            })
        );
    }

    #[test]
    fn test_trusted_hash() {
        let mut config = NodeConfig::default();
        assert_eq!(config.trusted_hash().unwrap(), None);

        config.header.trusted_hash = "ab".repeat(32);
        assert_eq!(config.trusted_hash().unwrap(), Some([0xab; 32]));

        config.header.trusted_hash = "abcd".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_zero_durations_rejected() {
        let mut config = NodeConfig::default();
        config.block_manager.da_block_time = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.block_manager.block_time = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
