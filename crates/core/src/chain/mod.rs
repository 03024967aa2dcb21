//! Chains of a source sheet and its duplicates.

mod registry;
mod types;

pub use registry::ChainRegistry;
pub use types::{Chain, ChainError, ChainTemplate};
