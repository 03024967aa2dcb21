//! Persisted state shape and storage trait.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::Chain;

/// Error type for state persistence.
#[derive(Debug, Error)]
pub enum StateError {
    /// A state record exists but cannot be parsed. Never overwritten.
    #[error("State record {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("State I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode state: {0}")]
    Encode(#[source] serde_json::Error),
}

/// The chain registry record as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainsRecord {
    #[serde(default)]
    pub chains: Vec<Chain>,
}

/// Everything the process remembers between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedState {
    /// WR number to job number.
    pub job_numbers: BTreeMap<String, String>,
    /// Chain registry, in registry order.
    pub chains: Vec<Chain>,
}

/// Trait for state storage backends.
pub trait StateStore: Send + Sync {
    /// Load state. Missing records load as empty defaults.
    fn load(&self) -> Result<PersistedState, StateError>;

    /// Replace the stored state atomically.
    fn save(&self, state: &PersistedState) -> Result<(), StateError>;
}
