//! Namespace identifiers scoping a rollup's header and data streams.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Length of a namespace ID in bytes.
pub const NAMESPACE_ID_LEN: usize = 8;

#[derive(Error, Debug, PartialEq)]
pub enum NamespaceError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("invalid length of namespace ID, expected: {expected}, got: {got}")]
    Length { expected: usize, got: usize },
}

/// Fixed-length namespace identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamespaceId(pub [u8; NAMESPACE_ID_LEN]);

impl NamespaceId {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, NamespaceError> {
        let id: [u8; NAMESPACE_ID_LEN] =
            bytes.try_into().map_err(|_| NamespaceError::Length {
                expected: NAMESPACE_ID_LEN,
                got: bytes.len(),
            })?;
        Ok(Self(id))
    }

    /// Parse a hex-encoded namespace ID.
    pub fn from_hex(s: &str) -> Result<Self, NamespaceError> {
        let bytes = hex::decode(s)?;
        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; NAMESPACE_ID_LEN] {
        &self.0
    }
}

impl fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_hex() {
        let ns = NamespaceId::from_hex("0102030405060708").unwrap();
        assert_eq!(ns.0, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(ns.to_string(), "0102030405060708");
    }

    #[test]
    fn test_wrong_length() {
        let err = NamespaceId::from_hex("010203").unwrap_err();
        assert_eq!(
            err,
            NamespaceError::Length {
                expected: 8,
                got: 3
            }
        );
        assert!(err.to_string().contains("expected: 8, got: 3"));
    }

    #[test]
    fn test_bad_hex() {
        assert!(matches!(
            NamespaceId::from_hex("zz"),
            Err(NamespaceError::Hex(_))
        ));
        assert_eq!(
            NamespaceId::from_hex("0g"),
            Err(NamespaceError::Hex(hex::FromHexError::InvalidHexCharacter {
                c: 'g',
                index: 1
            }))
        );
    }
}
