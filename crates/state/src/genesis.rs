//! Genesis document.

use crate::params::ConsensusParams;
use crate::validators::{Validator, ValidatorSet};
use crate::StateError;
use block_schema::Hash32;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_initial_height() -> u64 {
    1
}

/// A validator listed in the genesis document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenesisValidator {
    #[serde(with = "hex::serde")]
    pub pub_key: Vec<u8>,
    pub power: u64,
    #[serde(default)]
    pub name: String,
}

/// Chain parameters fixed at genesis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenesisDoc {
    pub chain_id: String,
    #[serde(default = "default_initial_height")]
    pub initial_height: u64,
    /// Genesis time in unix milliseconds.
    #[serde(default)]
    pub genesis_time: u64,
    #[serde(default)]
    pub validators: Vec<GenesisValidator>,
    #[serde(default)]
    pub consensus_params: ConsensusParams,
    #[serde(default, with = "hex::serde")]
    pub app_hash: Hash32,
}

impl GenesisDoc {
    /// Genesis with a single chain id and default everything else.
    pub fn new(chain_id: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            initial_height: default_initial_height(),
            genesis_time: 0,
            validators: Vec::new(),
            consensus_params: ConsensusParams::default(),
            app_hash: [0u8; 32],
        }
    }

    /// Add a validator.
    pub fn with_validator(mut self, pub_key: Vec<u8>, power: u64) -> Self {
        self.validators.push(GenesisValidator {
            pub_key,
            power,
            name: String::new(),
        });
        self
    }

    /// Read a genesis document from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, StateError> {
        let content = std::fs::read_to_string(path)?;
        let doc: Self = serde_json::from_str(&content)?;
        doc.validate()?;
        Ok(doc)
    }

    pub fn validate(&self) -> Result<(), StateError> {
        if self.chain_id.is_empty() {
            return Err(StateError::InvalidGenesis("chain_id is empty".to_string()));
        }
        if self.initial_height == 0 {
            return Err(StateError::InvalidGenesis(
                "initial_height must be at least 1".to_string(),
            ));
        }
        self.consensus_params.validate()?;
        self.validator_set()?;
        Ok(())
    }

    /// The genesis validator set.
    pub fn validator_set(&self) -> Result<ValidatorSet, StateError> {
        ValidatorSet::new(
            self.validators
                .iter()
                .map(|v| Validator::new(v.pub_key.clone(), v.power))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_json_defaults() {
        let doc: GenesisDoc = serde_json::from_str(r#"{"chain_id": "rollup-1"}"#).unwrap();
        assert_eq!(doc, GenesisDoc::new("rollup-1"));
        doc.validate().unwrap();
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"chain_id": "rollup-1", "initial_height": 5,
                "validators": [{{"pub_key": "0a0b", "power": 7, "name": "seq"}}]}}"#
        )
        .unwrap();

        let doc = GenesisDoc::from_json_file(file.path()).unwrap();
        assert_eq!(doc.initial_height, 5);
        assert_eq!(doc.validators[0].pub_key, vec![0x0a, 0x0b]);
        assert_eq!(doc.validator_set().unwrap().total_voting_power(), 7);
    }

    #[test]
    fn test_invalid_genesis() {
        assert!(matches!(
            GenesisDoc::new("").validate(),
            Err(StateError::InvalidGenesis(_))
        ));

        let mut doc = GenesisDoc::new("rollup-1");
        doc.initial_height = 0;
        assert!(doc.validate().is_err());

        let doc = GenesisDoc::new("rollup-1")
            .with_validator(b"alice".to_vec(), 1)
            .with_validator(b"alice".to_vec(), 2);
        assert!(matches!(
            doc.validate(),
            Err(StateError::DuplicateValidator(_))
        ));
    }
}
