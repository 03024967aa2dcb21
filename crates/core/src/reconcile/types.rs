//! Types for the reconciliation pass.

use thiserror::Error;

use crate::engine::Placement;
use crate::sheet_service::SheetId;
use crate::state::StateError;

/// Errors that abort a whole pass.
#[derive(Debug, Error)]
pub enum PassError {
    /// Persisted state could not be read or parsed. Nothing was written.
    #[error("failed to load state: {0}")]
    StateLoad(#[source] StateError),

    /// A checkpoint or the final save failed.
    #[error("failed to save state: {0}")]
    StateSave(#[source] StateError),
}

/// What a completed chain did during the pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainSummary {
    /// Job numbers newly issued for this chain.
    pub issued: usize,
    /// Job numbers found on sheets and recorded for the first time.
    pub adopted: usize,
    /// Existing rows whose job cell was rewritten.
    pub updated_rows: usize,
    /// Existing rows whose rewrite was refused for capacity.
    pub capacity_blocked: usize,
    /// Intake rows appended to the chain.
    pub added_rows: usize,
    /// Intake rows held back because part of the chain was unreadable.
    pub held_back: usize,
    /// Where the new-row batch landed, if there was one.
    pub placement: Option<Placement>,
    pub target_sheet: Option<SheetId>,
    pub capacity_errors: usize,
    pub duplicates_created: usize,
    /// Sheets that could not be read this pass.
    pub skipped_sheets: Vec<SheetId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    Completed(ChainSummary),
    /// Nothing in the chain could be read; no numbers were issued.
    Skipped { reason: String },
    /// The chain's writes failed part-way. State is still checkpointed.
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReport {
    pub source: SheetId,
    pub name: String,
    pub outcome: ChainOutcome,
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub chains: Vec<ChainReport>,
    /// Job numbers issued across every chain.
    pub new_job_numbers: usize,
}

impl PassReport {
    /// True when every chain completed.
    pub fn is_fully_successful(&self) -> bool {
        self.chains
            .iter()
            .all(|c| matches!(c.outcome, ChainOutcome::Completed(_)))
    }

    pub fn summary(&self, source: SheetId) -> Option<&ChainSummary> {
        self.chains
            .iter()
            .find(|c| c.source == source)
            .and_then(|c| match &c.outcome {
                ChainOutcome::Completed(summary) => Some(summary),
                _ => None,
            })
    }

    pub fn rows_added(&self) -> usize {
        self.completed().map(|s| s.added_rows).sum()
    }

    pub fn duplicates_created(&self) -> usize {
        self.completed().map(|s| s.duplicates_created).sum()
    }

    pub fn failed_count(&self) -> usize {
        self.chains
            .iter()
            .filter(|c| !matches!(c.outcome, ChainOutcome::Completed(_)))
            .count()
    }

    fn completed(&self) -> impl Iterator<Item = &ChainSummary> {
        self.chains.iter().filter_map(|c| match &c.outcome {
            ChainOutcome::Completed(summary) => Some(summary),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(source: u64, outcome: ChainOutcome) -> ChainReport {
        ChainReport {
            source: SheetId(source),
            name: format!("Chain {}", source),
            outcome,
        }
    }

    #[test]
    fn test_success_requires_every_chain_completed() {
        let mut pass = PassReport {
            chains: vec![report(1, ChainOutcome::Completed(ChainSummary::default()))],
            new_job_numbers: 0,
        };
        assert!(pass.is_fully_successful());

        pass.chains.push(report(
            2,
            ChainOutcome::Skipped {
                reason: "unreadable".to_string(),
            },
        ));
        assert!(!pass.is_fully_successful());
        assert_eq!(pass.failed_count(), 1);
    }

    #[test]
    fn test_totals_only_count_completed_chains() {
        let pass = PassReport {
            chains: vec![
                report(
                    1,
                    ChainOutcome::Completed(ChainSummary {
                        added_rows: 3,
                        duplicates_created: 1,
                        ..Default::default()
                    }),
                ),
                report(
                    2,
                    ChainOutcome::Failed {
                        error: "boom".to_string(),
                    },
                ),
            ],
            new_job_numbers: 3,
        };
        assert_eq!(pass.rows_added(), 3);
        assert_eq!(pass.duplicates_created(), 1);
        assert_eq!(pass.summary(SheetId(1)).map(|s| s.added_rows), Some(3));
        assert!(pass.summary(SheetId(2)).is_none());
    }
}
