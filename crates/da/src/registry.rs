//! Lookup of DA layer clients by name.

use crate::mock::MockDaClient;
use crate::{DaError, DaLayer};

type Constructor = fn() -> Box<dyn DaLayer>;

fn new_mock() -> Box<dyn DaLayer> {
    Box::new(MockDaClient::new())
}

const CLIENTS: &[(&str, Constructor)] = &[("mock", new_mock)];

/// Create an uninitialized client for the named backend.
pub fn get_client(name: &str) -> Result<Box<dyn DaLayer>, DaError> {
    CLIENTS
        .iter()
        .find(|(registered, _)| *registered == name)
        .map(|(_, constructor)| constructor())
        .ok_or_else(|| DaError::UnknownBackend(name.to_string()))
}

/// Names of all registered backends.
pub fn registered_clients() -> Vec<&'static str> {
    CLIENTS.iter().map(|(name, _)| *name).collect()
}
