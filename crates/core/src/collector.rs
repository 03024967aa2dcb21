//! Collects the WR numbers already present anywhere in a chain.

use std::collections::{BTreeSet, HashMap};

use thiserror::Error;
use tracing::{debug, warn};

use crate::chain::Chain;
use crate::numbering::ExclusionRules;
use crate::sheet_service::{SheetId, SheetRow, SheetService, SheetServiceError};

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("Could not read any sheet of chain {chain}: {source}")]
    AllSheetsUnreadable {
        chain: SheetId,
        #[source]
        source: SheetServiceError,
    },
}

/// A usable WR row tagged with the sheet it lives on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrRow {
    pub sheet: SheetId,
    pub row_id: u64,
    pub dept: String,
    pub wr_number: String,
    pub job_number: Option<String>,
}

/// Everything readable in a chain at collection time.
#[derive(Debug, Clone, Default)]
pub struct ChainInventory {
    /// Usable rows in chain order.
    pub rows: Vec<WrRow>,
    /// Every WR number seen on any readable sheet.
    pub wr_numbers: BTreeSet<String>,
    /// First usable job number seen for each WR number.
    known_jobs: HashMap<String, String>,
    /// Sheets whose rows could not be read this pass.
    pub skipped_sheets: Vec<SheetId>,
}

impl ChainInventory {
    pub fn contains(&self, wr_number: &str) -> bool {
        self.wr_numbers.contains(wr_number)
    }

    /// Job number already written on some occurrence of this WR number.
    pub fn known_job(&self, wr_number: &str) -> Option<&str> {
        self.known_jobs.get(wr_number).map(String::as_str)
    }

    fn absorb(&mut self, rows: Vec<WrRow>, rules: &ExclusionRules) {
        for row in rows {
            self.wr_numbers.insert(row.wr_number.clone());
            if let Some(job) = rules.usable_job(row.job_number.as_deref()) {
                self.known_jobs
                    .entry(row.wr_number.clone())
                    .or_insert_with(|| job.to_string());
            }
            self.rows.push(row);
        }
    }
}

/// Keep the rows that carry a real department and WR number.
pub fn usable_rows(sheet: SheetId, rows: Vec<SheetRow>, rules: &ExclusionRules) -> Vec<WrRow> {
    rows.into_iter()
        .filter_map(|row| match (row.dept, row.wr_number) {
            (Some(dept), Some(wr_number)) => {
                if rules.is_excluded(&dept) || rules.is_excluded(&wr_number) {
                    debug!(sheet = %sheet, dept = %dept, wr_number = %wr_number, "Excluding placeholder row");
                    None
                } else {
                    Some(WrRow {
                        sheet,
                        row_id: row.row_id,
                        dept,
                        wr_number,
                        job_number: row.job_number,
                    })
                }
            }
            _ => None,
        })
        .collect()
}

/// Read every sheet of a chain, source first, and merge what was found.
///
/// A sheet that fails to read is skipped with a warning. Fails only when
/// no sheet at all could be read.
pub async fn collect_wr_numbers(
    service: &dyn SheetService,
    chain: &Chain,
    rules: &ExclusionRules,
) -> Result<ChainInventory, CollectError> {
    let mut inventory = ChainInventory::default();
    let mut last_error = None;
    let mut read_any = false;

    for sheet in chain.all_sheets() {
        match service.get_rows(sheet.id).await {
            Ok(rows) => {
                read_any = true;
                inventory.absorb(usable_rows(sheet.id, rows, rules), rules);
            }
            Err(e) => {
                warn!(
                    chain = %chain.source_id(),
                    sheet = %sheet.id,
                    error = %e,
                    "Skipping unreadable sheet while collecting WR numbers"
                );
                inventory.skipped_sheets.push(sheet.id);
                last_error = Some(e);
            }
        }
    }

    match (read_any, last_error) {
        (false, Some(source)) => Err(CollectError::AllSheetsUnreadable {
            chain: chain.source_id(),
            source,
        }),
        _ => {
            debug!(
                chain = %chain.source_id(),
                rows = inventory.rows.len(),
                wr_numbers = inventory.wr_numbers.len(),
                "Collected chain inventory"
            );
            Ok(inventory)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainTemplate;
    use crate::sheet_service::{ServiceErrorKind, SheetRef};
    use crate::testing::MockSheetService;

    fn rules() -> ExclusionRules {
        ExclusionRules::new(["no match", "not assigned"])
    }

    fn row(row_id: u64, dept: &str, wr: &str, job: Option<&str>) -> SheetRow {
        SheetRow {
            row_id,
            dept: Some(dept.to_string()),
            wr_number: Some(wr.to_string()),
            job_number: job.map(str::to_string),
        }
    }

    fn chain_of(ids: &[u64]) -> Chain {
        let mut chain = Chain::new(
            SheetRef::new(ids[0], "Tracker"),
            ChainTemplate {
                name: "Tracker".to_string(),
                row_limit: 100,
                intake_sheet_id: None,
            },
        );
        for id in &ids[1..] {
            chain.duplicates.push(SheetRef::new(*id, format!("Dup {}", id)));
        }
        chain
    }

    #[test]
    fn test_usable_rows_filters_blank_and_placeholder() {
        let rows = vec![
            row(1, "500", "WR-1", None),
            row(2, "No Match - 004", "WR-2", None),
            row(3, "500", "not assigned", None),
            SheetRow {
                row_id: 4,
                dept: None,
                wr_number: Some("WR-4".to_string()),
                job_number: None,
            },
        ];
        let usable = usable_rows(SheetId(1), rows, &rules());
        assert_eq!(usable.len(), 1);
        assert_eq!(usable[0].wr_number, "WR-1");
    }

    #[tokio::test]
    async fn test_collect_merges_across_sheets() {
        let service = MockSheetService::new();
        service
            .add_sheet(1, "Tracker", 100, vec![row(1, "500", "WR-1", Some("500-001"))])
            .await;
        service
            .add_sheet(
                2,
                "Dup",
                100,
                vec![
                    row(1, "500", "WR-1", Some("no match")),
                    row(2, "600", "WR-2", None),
                ],
            )
            .await;

        let inventory = collect_wr_numbers(&service, &chain_of(&[1, 2]), &rules())
            .await
            .unwrap();
        assert_eq!(inventory.rows.len(), 3);
        assert!(inventory.contains("WR-1"));
        assert!(inventory.contains("WR-2"));
        assert_eq!(inventory.known_job("WR-1"), Some("500-001"));
        assert_eq!(inventory.known_job("WR-2"), None);
        assert!(inventory.skipped_sheets.is_empty());
    }

    #[tokio::test]
    async fn test_collect_skips_unreadable_sheet() {
        let service = MockSheetService::new();
        service
            .add_sheet(1, "Tracker", 100, vec![row(1, "500", "WR-1", None)])
            .await;
        service
            .add_sheet(2, "Dup", 100, vec![row(1, "500", "WR-9", None)])
            .await;
        service
            .fail_reads(2, ServiceErrorKind::Connection)
            .await;

        let inventory = collect_wr_numbers(&service, &chain_of(&[1, 2]), &rules())
            .await
            .unwrap();
        assert!(inventory.contains("WR-1"));
        assert!(!inventory.contains("WR-9"));
        assert_eq!(inventory.skipped_sheets, vec![SheetId(2)]);
    }

    #[tokio::test]
    async fn test_collect_fails_when_nothing_readable() {
        let service = MockSheetService::new();
        service.add_sheet(1, "Tracker", 100, vec![]).await;
        service.fail_reads(1, ServiceErrorKind::Unauthorized).await;

        let err = collect_wr_numbers(&service, &chain_of(&[1]), &rules())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CollectError::AllSheetsUnreadable { chain: SheetId(1), .. }
        ));
    }
}
