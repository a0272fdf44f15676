//! Rollup block schema.
//!
//! This crate defines the rollup block entity that is anchored on the DA layer,
//! together with the namespace identifiers that scope a rollup's data on a shared
//! DA network. Blocks are deterministically encoded using bincode; the same
//! encoding of the header is the input of the block hash.

mod namespace;

pub use namespace::{NamespaceError, NamespaceId, NAMESPACE_ID_LEN};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Current block protocol version.
pub const BLOCK_PROTOCOL_VERSION: u64 = 11;

/// Errors that can occur during block encoding/decoding.
#[derive(Error, Debug)]
pub enum BlockError {
    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("unsupported block protocol version: expected {expected}, got {got}")]
    InvalidVersion { expected: u64, got: u64 },
}

/// A 32-byte hash value.
pub type Hash32 = [u8; 32];

/// Block and application protocol versions carried in every header.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Version {
    pub block: u64,
    pub app: u64,
}

/// Rollup block header.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Header {
    pub version: Version,
    pub chain_id: String,
    /// Rollup block height (distinct from the DA height the block is anchored at).
    pub height: u64,
    /// Block time in unix milliseconds.
    pub time: u64,
    pub last_header_hash: Hash32,
    pub last_commit_hash: Hash32,
    pub data_hash: Hash32,
    pub app_hash: Hash32,
    pub last_results_hash: Hash32,
    pub proposer_address: Vec<u8>,
}

impl Header {
    /// Compute the header hash, which identifies the whole block.
    pub fn hash(&self) -> Hash32 {
        let encoded = bincode::serialize(self).expect("encoding should not fail for a header");
        hash_bytes(&encoded)
    }
}

/// Transactions included in a block.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Data {
    pub txs: Vec<Vec<u8>>,
}

impl Data {
    /// Hash over the concatenated transaction hashes.
    pub fn hash(&self) -> Hash32 {
        let mut hasher = Sha256::new();
        for tx in &self.txs {
            hasher.update(hash_bytes(tx));
        }
        hasher.finalize().into()
    }
}

/// Signatures of the previous block.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Commit {
    pub height: u64,
    pub header_hash: Hash32,
    pub signatures: Vec<Vec<u8>>,
}

impl Commit {
    pub fn hash(&self) -> Hash32 {
        let mut hasher = Sha256::new();
        hasher.update(self.height.to_le_bytes());
        hasher.update(self.header_hash);
        for sig in &self.signatures {
            hasher.update(sig);
        }
        hasher.finalize().into()
    }
}

/// A rollup block.
///
/// The DA layer client treats blocks as opaque: it only hashes and (de)serializes them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub header: Header,
    pub data: Data,
    pub last_commit: Commit,
}

impl Block {
    /// Create a block on top of `last_header_hash`, filling in the data and commit hashes.
    pub fn new(
        chain_id: impl Into<String>,
        height: u64,
        time: u64,
        last_header_hash: Hash32,
        txs: Vec<Vec<u8>>,
    ) -> Self {
        let data = Data { txs };
        let last_commit = Commit {
            height: height.saturating_sub(1),
            header_hash: last_header_hash,
            signatures: Vec::new(),
        };
        let header = Header {
            version: Version {
                block: BLOCK_PROTOCOL_VERSION,
                app: 0,
            },
            chain_id: chain_id.into(),
            height,
            time,
            last_header_hash,
            last_commit_hash: last_commit.hash(),
            data_hash: data.hash(),
            app_hash: [0u8; 32],
            last_results_hash: [0u8; 32],
            proposer_address: Vec::new(),
        };
        Self {
            header,
            data,
            last_commit,
        }
    }

    /// Set the proposer address.
    pub fn with_proposer(mut self, address: Vec<u8>) -> Self {
        self.header.proposer_address = address;
        self
    }

    /// Set the app hash committed by this block.
    pub fn with_app_hash(mut self, app_hash: Hash32) -> Self {
        self.header.app_hash = app_hash;
        self
    }

    /// Rollup height of this block.
    pub fn height(&self) -> u64 {
        self.header.height
    }

    /// Block hash (the header hash).
    pub fn hash(&self) -> Hash32 {
        self.header.hash()
    }

    /// Identifier of this block as recorded in chain state.
    pub fn id(&self) -> BlockId {
        BlockId {
            hash: self.hash(),
            part_set_total: 1,
            part_set_hash: self.header.data_hash,
        }
    }

    /// Encode the block to bytes using bincode (deterministic).
    pub fn encode(&self) -> Result<Vec<u8>, BlockError> {
        bincode::serialize(self).map_err(BlockError::from)
    }

    /// Decode a block from bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, BlockError> {
        let block: Self = bincode::deserialize(bytes)?;
        if block.header.version.block != BLOCK_PROTOCOL_VERSION {
            return Err(BlockError::InvalidVersion {
                expected: BLOCK_PROTOCOL_VERSION,
                got: block.header.version.block,
            });
        }
        Ok(block)
    }
}

/// Identifier of a block: its hash plus the part-set header.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockId {
    pub hash: Hash32,
    pub part_set_total: u32,
    pub part_set_hash: Hash32,
}

/// Helper to compute hash of arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Convert a hash to hex string.
pub fn hash_to_hex(hash: &Hash32) -> String {
    hex::encode(hash)
}

/// Parse a hex string to hash.
pub fn hex_to_hash(s: &str) -> Result<Hash32, hex::FromHexError> {
    let bytes = hex::decode(s)?;
    if bytes.len() != 32 {
        return Err(hex::FromHexError::InvalidStringLength);
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&bytes);
    Ok(hash)
}
