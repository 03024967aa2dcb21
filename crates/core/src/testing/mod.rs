//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the collaborator traits,
//! allowing full reconciliation passes to be tested without a real sheet
//! service or state directory.
//!
//! # Example
//!
//! ```rust,ignore
//! use jobnum_core::testing::{fixtures, MemoryStateStore, MockSheetService};
//!
//! let service = MockSheetService::new();
//! service.add_sheet(1, "Tracker", 10, fixtures::filler_rows(10)).await;
//! let store = MemoryStateStore::new();
//!
//! // Run a pass, then inspect service.add_calls() and store.snapshot()
//! ```

mod mock_sheet_service;
mod mock_state_store;

pub use mock_sheet_service::{MockSheetService, RecordedDuplicate, RecordedWrite};
pub use mock_state_store::MemoryStateStore;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::config::ChainConfig;
    use crate::sheet_service::{NewRow, SheetId, SheetRow};

    /// A row with a department and WR number.
    pub fn wr_row(row_id: u64, dept: &str, wr_number: &str, job_number: Option<&str>) -> SheetRow {
        SheetRow {
            row_id,
            dept: Some(dept.to_string()),
            wr_number: Some(wr_number.to_string()),
            job_number: job_number.map(str::to_string),
        }
    }

    /// Blank rows that only take up space.
    pub fn filler_rows(count: usize) -> Vec<SheetRow> {
        (0..count as u64)
            .map(|i| SheetRow {
                row_id: 1_000_000 + i,
                dept: None,
                wr_number: None,
                job_number: None,
            })
            .collect()
    }

    /// Rows ready to append, numbered `{dept}-9xx` so they are easy to spot.
    pub fn new_rows(dept: &str, wr_numbers: &[&str]) -> Vec<NewRow> {
        wr_numbers
            .iter()
            .enumerate()
            .map(|(i, wr)| NewRow {
                dept: dept.to_string(),
                wr_number: wr.to_string(),
                job_number: format!("{}-{}", dept, 900 + i),
            })
            .collect()
    }

    /// Chain configuration with defaults suitable for tests.
    pub fn chain_config(source_id: u64, name: &str, row_limit: usize) -> ChainConfig {
        ChainConfig {
            source_id: SheetId(source_id),
            name: name.to_string(),
            row_limit,
            intake_sheet_id: None,
        }
    }
}
