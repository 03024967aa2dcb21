//! One reconciliation pass over every configured chain.
//!
//! A pass loads persisted state, reads every chain, numbers the WR rows it
//! finds, rewrites job cells that disagree, lands intake rows through the
//! update engine, and checkpoints state along the way.

mod runner;
mod types;

pub use runner::Reconciler;
pub use types::{ChainOutcome, ChainReport, ChainSummary, PassError, PassReport};
