//! The reconciliation pass: numbering, in-place fixes and new-row placement
//! for every configured chain.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::capacity::is_capacity_error;
use crate::chain::{ChainError, ChainRegistry};
use crate::collector::{collect_wr_numbers, usable_rows, ChainInventory};
use crate::config::ChainConfig;
use crate::engine::{EngineError, UpdateEngine};
use crate::numbering::{AssignmentBook, AssignmentSource, ExclusionRules, JobFormat, JobSequence};
use crate::sheet_service::{NewRow, RowUpdate, SheetId, SheetService, SheetServiceError};
use crate::state::{PersistedState, StateStore};

use super::types::{ChainOutcome, ChainReport, ChainSummary, PassError, PassReport};

/// Why a single chain stopped part-way.
#[derive(Debug, Error)]
enum ChainFailure {
    #[error("updating rows on sheet {sheet} failed: {source}")]
    Update {
        sheet: SheetId,
        #[source]
        source: SheetServiceError,
    },

    #[error("reading intake sheet {sheet} failed: {source}")]
    Intake {
        sheet: SheetId,
        #[source]
        source: SheetServiceError,
    },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Registry(#[from] ChainError),

    /// A checkpoint failed; this aborts the pass, not just the chain.
    #[error(transparent)]
    Pass(#[from] PassError),
}

/// Mutable state shared by every chain of one pass.
struct PassContext {
    registry: ChainRegistry,
    book: AssignmentBook,
    sequence: JobSequence,
}

/// Runs reconciliation passes against a sheet service and a state store.
pub struct Reconciler {
    service: Arc<dyn SheetService>,
    store: Arc<dyn StateStore>,
    exclusions: ExclusionRules,
}

impl Reconciler {
    pub fn new(
        service: Arc<dyn SheetService>,
        store: Arc<dyn StateStore>,
        exclusions: ExclusionRules,
    ) -> Self {
        Self {
            service,
            store,
            exclusions,
        }
    }

    /// Run one pass over the configured chains.
    ///
    /// Errors local to a chain are recorded in the report and the pass moves
    /// on. Only state load and save failures abort the pass.
    pub async fn run_pass(&self, configured: &[ChainConfig]) -> Result<PassReport, PassError> {
        let persisted = self.store.load().map_err(PassError::StateLoad)?;
        let registry = ChainRegistry::from_parts(persisted.chains, configured);
        let book = AssignmentBook::new(persisted.job_numbers);
        info!(
            service = self.service.name(),
            chains = configured.len(),
            job_numbers = book.len(),
            "Starting reconciliation pass"
        );

        // Collect every chain before numbering so the format and counters
        // see all job numbers already in use.
        let mut inventories = HashMap::new();
        for config in configured {
            let chain = match registry.get_chain(config.source_id) {
                Ok(chain) => chain,
                Err(e) => {
                    error!(chain = %config.source_id, error = %e, "Configured chain missing from registry");
                    continue;
                }
            };
            let collected = collect_wr_numbers(self.service.as_ref(), chain, &self.exclusions).await;
            inventories.insert(config.source_id, collected);
        }

        let sequence = {
            let chain_inventories: Vec<&ChainInventory> = configured
                .iter()
                .filter_map(|c| inventories.get(&c.source_id))
                .filter_map(|c| c.as_ref().ok())
                .collect();
            seed_sequence(&book, &chain_inventories, &self.exclusions)
        };

        let mut ctx = PassContext {
            registry,
            book,
            sequence,
        };
        let mut report = PassReport::default();

        for config in configured {
            let outcome = match inventories.remove(&config.source_id) {
                None => ChainOutcome::Failed {
                    error: ChainError::NotFound(config.source_id).to_string(),
                },
                Some(Err(e)) => {
                    warn!(chain = %config.source_id, error = %e, "Skipping chain: no sheet could be read");
                    ChainOutcome::Skipped {
                        reason: e.to_string(),
                    }
                }
                Some(Ok(inventory)) => {
                    match self.reconcile_chain(&mut ctx, config, inventory).await {
                        Ok(summary) => {
                            info!(
                                chain = %config.source_id,
                                issued = summary.issued,
                                updated_rows = summary.updated_rows,
                                added_rows = summary.added_rows,
                                duplicates_created = summary.duplicates_created,
                                "Chain reconciled"
                            );
                            ChainOutcome::Completed(summary)
                        }
                        Err(ChainFailure::Pass(e)) => return Err(e),
                        Err(e) => {
                            error!(chain = %config.source_id, error = %e, "Chain failed");
                            ChainOutcome::Failed {
                                error: e.to_string(),
                            }
                        }
                    }
                }
            };

            // Record duplicates and assignments from this chain even when it failed.
            self.save(&ctx)?;
            report.chains.push(ChainReport {
                source: config.source_id,
                name: config.name.clone(),
                outcome,
            });
        }

        self.save(&ctx)?;
        report.new_job_numbers = ctx.sequence.issued();
        info!(
            chains = report.chains.len(),
            failed = report.failed_count(),
            new_job_numbers = report.new_job_numbers,
            rows_added = report.rows_added(),
            duplicates_created = report.duplicates_created(),
            "Reconciliation pass finished"
        );
        Ok(report)
    }

    async fn reconcile_chain(
        &self,
        ctx: &mut PassContext,
        config: &ChainConfig,
        inventory: ChainInventory,
    ) -> Result<ChainSummary, ChainFailure> {
        let source = config.source_id;
        let mut summary = ChainSummary {
            skipped_sheets: inventory.skipped_sheets.clone(),
            ..Default::default()
        };

        log_repeated_wr_numbers(source, &inventory);

        // Existing rows: every occurrence gets the assigned number.
        let mut updates: BTreeMap<SheetId, Vec<RowUpdate>> = BTreeMap::new();
        for row in &inventory.rows {
            let assignment = ctx.book.resolve(
                &row.wr_number,
                &row.dept,
                inventory.known_job(&row.wr_number),
                &mut ctx.sequence,
            );
            match assignment.source {
                AssignmentSource::Issued => summary.issued += 1,
                AssignmentSource::Adopted => summary.adopted += 1,
                AssignmentSource::Persisted => {}
            }

            let current = row.job_number.as_deref().map(str::trim);
            if current != Some(assignment.job_number.as_str()) {
                if self.exclusions.usable_job(current).is_none() {
                    debug!(sheet = %row.sheet, wr_number = %row.wr_number, job_number = %assignment.job_number, "Filling job number");
                } else {
                    info!(
                        sheet = %row.sheet,
                        wr_number = %row.wr_number,
                        from = current.unwrap_or_default(),
                        to = %assignment.job_number,
                        "Replacing job number"
                    );
                }
                updates.entry(row.sheet).or_default().push(RowUpdate {
                    row_id: row.row_id,
                    job_number: assignment.job_number,
                });
            }
        }

        // Intake rows not yet in the chain become the new-row batch.
        let mut batch = Vec::new();
        if let Some(intake) = config.intake_sheet_id {
            let rows = self
                .service
                .get_rows(intake)
                .await
                .map_err(|source| ChainFailure::Intake {
                    sheet: intake,
                    source,
                })?;
            let partial = !inventory.skipped_sheets.is_empty();
            let mut seen = BTreeSet::new();
            for row in usable_rows(intake, rows, &self.exclusions) {
                if inventory.contains(&row.wr_number) || !seen.insert(row.wr_number.clone()) {
                    continue;
                }
                // With part of the chain unreadable, a known WR may already be on a skipped sheet.
                if partial && ctx.book.get(&row.wr_number).is_some() {
                    warn!(chain = %source, wr_number = %row.wr_number, "Holding back intake row: chain only partly readable");
                    summary.held_back += 1;
                    continue;
                }
                let assignment =
                    ctx.book
                        .resolve(&row.wr_number, &row.dept, None, &mut ctx.sequence);
                if assignment.source == AssignmentSource::Issued {
                    summary.issued += 1;
                }
                batch.push(NewRow {
                    dept: row.dept,
                    wr_number: row.wr_number,
                    job_number: assignment.job_number,
                });
            }
        }

        // Assignments are durable before any write that uses them.
        if summary.issued + summary.adopted > 0 {
            self.save(ctx)?;
        }

        for (sheet, sheet_updates) in updates {
            match self.service.update_rows(sheet, &sheet_updates).await {
                Ok(()) => {
                    info!(chain = %source, sheet = %sheet, rows = sheet_updates.len(), "Updated job numbers");
                    summary.updated_rows += sheet_updates.len();
                }
                Err(e) if is_capacity_error(&e) => {
                    warn!(
                        chain = %source,
                        sheet = %sheet,
                        rows = sheet_updates.len(),
                        error = %e,
                        "Sheet refused in-place update for capacity; rows stay unchanged"
                    );
                    summary.capacity_blocked += sheet_updates.len();
                }
                Err(source_err) => {
                    return Err(ChainFailure::Update {
                        sheet,
                        source: source_err,
                    })
                }
            }
        }

        if !batch.is_empty() {
            let before = ctx.registry.get_chain(source)?.duplicates.len();
            let outcome = UpdateEngine::new(self.service.as_ref())
                .write_batch(&mut ctx.registry, source, &batch)
                .await?;
            let after = ctx.registry.get_chain(source)?.duplicates.len();

            summary.added_rows = outcome.rows_written;
            summary.placement = Some(outcome.placement);
            summary.target_sheet = Some(outcome.sheet);
            summary.capacity_errors = outcome.capacity_errors;
            summary.duplicates_created = after - before;
        }

        Ok(summary)
    }

    fn save(&self, ctx: &PassContext) -> Result<(), PassError> {
        self.store
            .save(&PersistedState {
                job_numbers: ctx.book.to_map(),
                chains: ctx.registry.to_persisted(),
            })
            .map_err(PassError::StateSave)
    }
}

/// Detect the job-number format and advance every department's counter past
/// the numbers already in use, persisted or on sheets.
fn seed_sequence(
    book: &AssignmentBook,
    inventories: &[&ChainInventory],
    exclusions: &ExclusionRules,
) -> JobSequence {
    let mut dept_by_wr: HashMap<&str, &str> = HashMap::new();
    let mut on_sheets: Vec<(Option<&str>, &str)> = Vec::new();
    for row in inventories.iter().flat_map(|i| i.rows.iter()) {
        dept_by_wr
            .entry(row.wr_number.as_str())
            .or_insert(row.dept.as_str());
        if let Some(job) = exclusions.usable_job(row.job_number.as_deref()) {
            on_sheets.push((Some(row.dept.as_str()), job));
        }
    }

    // Persisted numbers first; a WR no longer on any sheet has no department.
    let mut samples: Vec<(Option<&str>, &str)> = book
        .entries()
        .map(|(wr_number, job)| (dept_by_wr.get(wr_number).copied(), job))
        .collect();
    samples.extend(on_sheets);

    let mut sequence = JobSequence::new(JobFormat::detect(samples.iter().copied()));
    for (dept, job) in samples {
        sequence.observe(dept, job);
    }
    sequence
}

fn log_repeated_wr_numbers(source: SheetId, inventory: &ChainInventory) {
    let mut sheets_per_wr: BTreeMap<&str, BTreeSet<SheetId>> = BTreeMap::new();
    for row in &inventory.rows {
        sheets_per_wr
            .entry(row.wr_number.as_str())
            .or_default()
            .insert(row.sheet);
    }
    for (wr_number, sheets) in sheets_per_wr {
        if sheets.len() > 1 {
            warn!(
                chain = %source,
                wr_number = %wr_number,
                sheets = sheets.len(),
                "WR number appears on several sheets; all occurrences share one job number"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet_service::ServiceErrorKind;
    use crate::testing::{fixtures, MemoryStateStore, MockSheetService};

    fn reconciler(service: &MockSheetService, store: &MemoryStateStore) -> Reconciler {
        Reconciler::new(
            Arc::new(service.clone()),
            Arc::new(store.clone()),
            ExclusionRules::new(["no match", "not assigned"]),
        )
    }

    #[tokio::test]
    async fn test_assigns_missing_job_numbers_in_place() {
        let service = MockSheetService::new();
        service
            .add_sheet(
                1,
                "Tracker",
                100,
                vec![
                    fixtures::wr_row(1, "500", "WR-1", Some("500-007")),
                    fixtures::wr_row(2, "500", "WR-2", None),
                    fixtures::wr_row(3, "600", "WR-3", Some("Not Assigned")),
                ],
            )
            .await;
        let store = MemoryStateStore::new();

        let report = reconciler(&service, &store)
            .run_pass(&[fixtures::chain_config(1, "Tracker", 100)])
            .await
            .unwrap();

        assert!(report.is_fully_successful());
        let summary = report.summary(SheetId(1)).unwrap();
        assert_eq!(summary.adopted, 1);
        assert_eq!(summary.issued, 2);
        assert_eq!(summary.updated_rows, 2);

        let rows = service.rows(1).await;
        assert_eq!(rows[1].job_number.as_deref(), Some("500-008"));
        assert_eq!(rows[2].job_number.as_deref(), Some("600-001"));

        let state = store.snapshot();
        assert_eq!(state.job_numbers.len(), 3);
        assert_eq!(state.job_numbers["WR-1"], "500-007");
    }

    #[tokio::test]
    async fn test_persisted_assignment_overrides_sheet_value() {
        let service = MockSheetService::new();
        service
            .add_sheet(1, "Tracker", 100, vec![fixtures::wr_row(1, "500", "WR-1", Some("500-099"))])
            .await;
        let mut state = PersistedState::default();
        state
            .job_numbers
            .insert("WR-1".to_string(), "500-001".to_string());
        let store = MemoryStateStore::with_state(state);

        let report = reconciler(&service, &store)
            .run_pass(&[fixtures::chain_config(1, "Tracker", 100)])
            .await
            .unwrap();

        assert_eq!(report.new_job_numbers, 0);
        assert_eq!(service.rows(1).await[0].job_number.as_deref(), Some("500-001"));
    }

    #[tokio::test]
    async fn test_capacity_refused_update_is_not_a_failure() {
        let service = MockSheetService::new();
        service
            .add_sheet(1, "Tracker", 100, vec![fixtures::wr_row(1, "500", "WR-1", None)])
            .await;
        service.fail_writes(1, ServiceErrorKind::ReferenceLimit).await;
        let store = MemoryStateStore::new();

        let report = reconciler(&service, &store)
            .run_pass(&[fixtures::chain_config(1, "Tracker", 100)])
            .await
            .unwrap();

        assert!(report.is_fully_successful());
        let summary = report.summary(SheetId(1)).unwrap();
        assert_eq!(summary.capacity_blocked, 1);
        assert_eq!(summary.updated_rows, 0);
        // The assignment is kept for the next pass.
        assert_eq!(store.snapshot().job_numbers["WR-1"], "500-001");
    }

    #[tokio::test]
    async fn test_other_update_error_fails_chain() {
        let service = MockSheetService::new();
        service
            .add_sheet(1, "Tracker", 100, vec![fixtures::wr_row(1, "500", "WR-1", None)])
            .await;
        service.fail_writes(1, ServiceErrorKind::Unauthorized).await;
        let store = MemoryStateStore::new();

        let report = reconciler(&service, &store)
            .run_pass(&[fixtures::chain_config(1, "Tracker", 100)])
            .await
            .unwrap();

        assert!(!report.is_fully_successful());
        assert!(matches!(
            report.chains[0].outcome,
            ChainOutcome::Failed { .. }
        ));
        assert_eq!(store.snapshot().job_numbers["WR-1"], "500-001");
    }

    #[tokio::test]
    async fn test_intake_rows_already_in_chain_are_skipped() {
        let service = MockSheetService::new();
        service
            .add_sheet(1, "Tracker", 100, vec![fixtures::wr_row(1, "500", "WR-1", Some("500-001"))])
            .await;
        service
            .add_sheet(
                50,
                "Intake",
                100,
                vec![
                    fixtures::wr_row(1, "500", "WR-1", None),
                    fixtures::wr_row(2, "500", "WR-2", None),
                    fixtures::wr_row(3, "500", "WR-2", None),
                ],
            )
            .await;
        let store = MemoryStateStore::new();
        let mut config = fixtures::chain_config(1, "Tracker", 100);
        config.intake_sheet_id = Some(SheetId(50));

        let report = reconciler(&service, &store).run_pass(&[config]).await.unwrap();

        let summary = report.summary(SheetId(1)).unwrap();
        assert_eq!(summary.added_rows, 1);
        let rows = service.rows(1).await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].wr_number.as_deref(), Some("WR-2"));
        assert_eq!(rows[1].job_number.as_deref(), Some("500-002"));
    }

    #[tokio::test]
    async fn test_corrupt_state_aborts_before_reads() {
        let service = MockSheetService::new();
        service
            .add_sheet(1, "Tracker", 100, vec![fixtures::wr_row(1, "500", "WR-1", None)])
            .await;
        let store = MemoryStateStore::new();
        store.set_corrupt(true);

        let err = reconciler(&service, &store)
            .run_pass(&[fixtures::chain_config(1, "Tracker", 100)])
            .await
            .unwrap_err();

        assert!(matches!(err, PassError::StateLoad(_)));
        assert!(service.update_calls().await.is_empty());
        assert_eq!(store.save_count(), 0);
    }
}
