//! Durable memory across runs: job-number assignments and the chain registry.

mod json_store;
mod store;

pub use json_store::{JsonStateStore, CHAINS_FILE, JOB_NUMBERS_FILE};
pub use store::{ChainsRecord, PersistedState, StateError, StateStore};
