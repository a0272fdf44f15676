//! Validator sets and validator updates.

use crate::StateError;
use block_schema::hash_bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Length of a validator address in bytes.
pub const ADDRESS_LEN: usize = 20;

/// Upper bound on the total voting power of a set.
pub const MAX_TOTAL_VOTING_POWER: u64 = (i64::MAX / 8) as u64;

/// Validator address: truncated SHA-256 of the public key.
pub type Address = [u8; ADDRESS_LEN];

/// Derive a validator address from its public key.
pub fn address_from_pub_key(pub_key: &[u8]) -> Address {
    let hash = hash_bytes(pub_key);
    let mut address = [0u8; ADDRESS_LEN];
    address.copy_from_slice(&hash[..ADDRESS_LEN]);
    address
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Validator {
    pub address: Address,
    pub pub_key: Vec<u8>,
    pub voting_power: u64,
}

impl Validator {
    pub fn new(pub_key: Vec<u8>, voting_power: u64) -> Self {
        Self {
            address: address_from_pub_key(&pub_key),
            pub_key,
            voting_power,
        }
    }
}

/// A change to the validator set reported by execution. Power 0 removes the validator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidatorUpdate {
    pub pub_key: Vec<u8>,
    pub power: u64,
}

impl ValidatorUpdate {
    pub fn new(pub_key: impl Into<Vec<u8>>, power: u64) -> Self {
        Self {
            pub_key: pub_key.into(),
            power,
        }
    }
}

/// An ordered validator set.
///
/// Validators are kept sorted by voting power (descending), then address, so two
/// sets with the same members always compare equal.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidatorSet {
    validators: Vec<Validator>,
}

impl ValidatorSet {
    /// Build a set, rejecting duplicate addresses and zero-power members.
    pub fn new(validators: Vec<Validator>) -> Result<Self, StateError> {
        let mut by_address = BTreeMap::new();
        for validator in validators {
            if validator.voting_power == 0 {
                return Err(StateError::InvalidValidator(format!(
                    "validator {} has zero voting power",
                    hex::encode(validator.address)
                )));
            }
            let address = validator.address;
            if by_address.insert(address, validator).is_some() {
                return Err(StateError::DuplicateValidator(hex::encode(address)));
            }
        }
        Self::from_map(by_address)
    }

    /// The empty set (used for `last_validators` at genesis).
    pub fn empty() -> Self {
        Self::default()
    }

    fn from_map(by_address: BTreeMap<Address, Validator>) -> Result<Self, StateError> {
        let mut total: u64 = 0;
        for validator in by_address.values() {
            total = total
                .checked_add(validator.voting_power)
                .filter(|t| *t <= MAX_TOTAL_VOTING_POWER)
                .ok_or(StateError::VotingPowerOverflow)?;
        }

        let mut validators: Vec<Validator> = by_address.into_values().collect();
        validators.sort_by(|a, b| {
            b.voting_power
                .cmp(&a.voting_power)
                .then_with(|| a.address.cmp(&b.address))
        });
        Ok(Self { validators })
    }

    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn total_voting_power(&self) -> u64 {
        self.validators.iter().map(|v| v.voting_power).sum()
    }

    pub fn get_by_address(&self, address: &Address) -> Option<&Validator> {
        self.validators.iter().find(|v| &v.address == address)
    }

    /// Hash committing to the members and their powers.
    pub fn hash(&self) -> block_schema::Hash32 {
        let mut buf = Vec::new();
        for validator in &self.validators {
            buf.extend_from_slice(&validator.address);
            buf.extend_from_slice(&validator.voting_power.to_le_bytes());
        }
        hash_bytes(&buf)
    }

    /// Return a new set with the updates applied.
    ///
    /// Each public key may appear at most once in `updates`; removing a validator
    /// that is not in the set is an error, as is removing every validator.
    pub fn apply_updates(&self, updates: &[ValidatorUpdate]) -> Result<Self, StateError> {
        let mut by_address: BTreeMap<Address, Validator> = self
            .validators
            .iter()
            .map(|v| (v.address, v.clone()))
            .collect();

        let mut seen = Vec::with_capacity(updates.len());
        for update in updates {
            let address = address_from_pub_key(&update.pub_key);
            if seen.contains(&address) {
                return Err(StateError::DuplicateValidator(hex::encode(address)));
            }
            seen.push(address);

            if update.power == 0 {
                if by_address.remove(&address).is_none() {
                    return Err(StateError::UnknownValidator(hex::encode(address)));
                }
            } else {
                by_address.insert(address, Validator::new(update.pub_key.clone(), update.power));
            }
        }

        if by_address.is_empty() {
            return Err(StateError::EmptyValidatorSet);
        }
        Self::from_map(by_address)
    }
}
