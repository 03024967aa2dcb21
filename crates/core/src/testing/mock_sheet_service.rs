//! Mock sheet service for testing.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::sheet_service::{
    NewRow, RowUpdate, ServiceErrorKind, SheetId, SheetRef, SheetRow, SheetService,
    SheetServiceError,
};

/// First id handed out to duplicates created through the mock.
const FIRST_DUPLICATE_ID: u64 = 9_000_000;

/// A recorded write for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub sheet: SheetId,
    pub rows: usize,
}

/// A recorded duplicate_sheet call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedDuplicate {
    pub source: SheetId,
    pub name: String,
    pub created: Option<SheetId>,
}

#[derive(Debug, Clone)]
struct MockSheet {
    name: String,
    row_limit: usize,
    rows: Vec<SheetRow>,
}

#[derive(Debug, Default)]
struct Failures {
    reads: HashMap<SheetId, ServiceErrorKind>,
    writes: HashMap<SheetId, ServiceErrorKind>,
    duplicates: Option<ServiceErrorKind>,
}

/// Mock implementation of the SheetService trait.
///
/// Provides controllable behavior for testing:
/// - In-memory sheets that refuse writes past their row limit
/// - Track writes and duplicate creation for assertions
/// - Simulate read, write and duplication failures
/// - Simulate archival freeing rows between calls
///
/// # Example
///
/// ```rust,ignore
/// let service = MockSheetService::new();
/// service.add_sheet(1, "Tracker", 10, fixtures::filler_rows(10)).await;
///
/// // Source is full: the next add_rows fails with a RowLimit error
/// let err = service.add_rows(SheetId(1), &rows).await.unwrap_err();
/// assert_eq!(err.kind, ServiceErrorKind::RowLimit);
///
/// // Archival frees some rows
/// service.archive_rows(1, 4).await;
/// ```
#[derive(Debug, Clone)]
pub struct MockSheetService {
    sheets: Arc<RwLock<BTreeMap<SheetId, MockSheet>>>,
    failures: Arc<RwLock<Failures>>,
    adds: Arc<RwLock<Vec<RecordedWrite>>>,
    updates: Arc<RwLock<Vec<RecordedWrite>>>,
    duplicates: Arc<RwLock<Vec<RecordedDuplicate>>>,
    /// Counter for row ids and duplicate sheet ids.
    next_id: Arc<RwLock<u64>>,
    /// Report capacity failures with only code and message, as an
    /// unclassifying client would.
    unclassified_capacity: bool,
}

impl Default for MockSheetService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSheetService {
    /// Create a new mock sheet service with no sheets.
    pub fn new() -> Self {
        Self {
            sheets: Arc::new(RwLock::new(BTreeMap::new())),
            failures: Arc::new(RwLock::new(Failures::default())),
            adds: Arc::new(RwLock::new(Vec::new())),
            updates: Arc::new(RwLock::new(Vec::new())),
            duplicates: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(RwLock::new(FIRST_DUPLICATE_ID)),
            unclassified_capacity: false,
        }
    }

    /// Create a mock whose capacity errors carry no structured kind.
    pub fn with_unclassified_capacity_errors() -> Self {
        Self {
            unclassified_capacity: true,
            ..Self::new()
        }
    }

    /// Add a sheet holding `rows`, refusing writes beyond `row_limit` rows.
    pub async fn add_sheet(&self, id: u64, name: &str, row_limit: usize, rows: Vec<SheetRow>) {
        self.sheets.write().await.insert(
            SheetId(id),
            MockSheet {
                name: name.to_string(),
                row_limit,
                rows,
            },
        );
    }

    /// Current rows of a sheet (empty for unknown sheets).
    pub async fn rows(&self, id: u64) -> Vec<SheetRow> {
        self.sheets
            .read()
            .await
            .get(&SheetId(id))
            .map(|s| s.rows.clone())
            .unwrap_or_default()
    }

    pub async fn row_count(&self, id: u64) -> usize {
        self.rows(id).await.len()
    }

    /// Name a sheet was created under (None for unknown sheets).
    pub async fn sheet_name(&self, id: u64) -> Option<String> {
        self.sheets
            .read()
            .await
            .get(&SheetId(id))
            .map(|s| s.name.clone())
    }

    /// Remove the oldest `count` rows of a sheet, as an archival job would.
    pub async fn archive_rows(&self, id: u64, count: usize) {
        if let Some(sheet) = self.sheets.write().await.get_mut(&SheetId(id)) {
            let count = count.min(sheet.rows.len());
            sheet.rows.drain(..count);
        }
    }

    /// Make every read of a sheet fail with the given kind.
    pub async fn fail_reads(&self, id: u64, kind: ServiceErrorKind) {
        self.failures.write().await.reads.insert(SheetId(id), kind);
    }

    /// Make every write to a sheet fail with the given kind.
    pub async fn fail_writes(&self, id: u64, kind: ServiceErrorKind) {
        self.failures.write().await.writes.insert(SheetId(id), kind);
    }

    /// Make duplicate_sheet fail with the given kind.
    pub async fn fail_duplicates(&self, kind: ServiceErrorKind) {
        self.failures.write().await.duplicates = Some(kind);
    }

    /// Recorded add_rows calls that succeeded.
    pub async fn add_calls(&self) -> Vec<RecordedWrite> {
        self.adds.read().await.clone()
    }

    /// Recorded update_rows calls that succeeded.
    pub async fn update_calls(&self) -> Vec<RecordedWrite> {
        self.updates.read().await.clone()
    }

    /// Recorded duplicate_sheet calls, failed ones included.
    pub async fn duplicate_calls(&self) -> Vec<RecordedDuplicate> {
        self.duplicates.read().await.clone()
    }

    /// Number of duplicates actually created.
    pub async fn duplicate_count(&self) -> usize {
        self.duplicates
            .read()
            .await
            .iter()
            .filter(|d| d.created.is_some())
            .count()
    }

    async fn allocate_id(&self) -> u64 {
        let mut next = self.next_id.write().await;
        *next += 1;
        *next
    }

    fn injected(kind: ServiceErrorKind, sheet: SheetId) -> SheetServiceError {
        SheetServiceError::new(kind, format!("injected {:?} failure on sheet {}", kind, sheet))
    }

    fn capacity_error(&self, sheet: SheetId) -> SheetServiceError {
        let message = format!("Maximum number of rows exceeded on sheet {}", sheet);
        if self.unclassified_capacity {
            SheetServiceError::unclassified(None, message)
        } else {
            SheetServiceError::new(ServiceErrorKind::RowLimit, message).with_code(1036)
        }
    }

    fn not_found(sheet: SheetId) -> SheetServiceError {
        SheetServiceError::new(ServiceErrorKind::NotFound, format!("sheet {} not found", sheet))
            .with_code(1006)
    }

    async fn check_write(&self, sheet: SheetId) -> Result<(), SheetServiceError> {
        match self.failures.read().await.writes.get(&sheet) {
            Some(kind) => Err(Self::injected(*kind, sheet)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SheetService for MockSheetService {
    fn name(&self) -> &str {
        "mock"
    }

    async fn get_rows(&self, sheet: SheetId) -> Result<Vec<SheetRow>, SheetServiceError> {
        if let Some(kind) = self.failures.read().await.reads.get(&sheet) {
            return Err(Self::injected(*kind, sheet));
        }
        self.sheets
            .read()
            .await
            .get(&sheet)
            .map(|s| s.rows.clone())
            .ok_or_else(|| Self::not_found(sheet))
    }

    async fn add_rows(&self, sheet: SheetId, rows: &[NewRow]) -> Result<(), SheetServiceError> {
        self.check_write(sheet).await?;

        let mut new_rows = Vec::with_capacity(rows.len());
        for row in rows {
            new_rows.push(SheetRow {
                row_id: self.allocate_id().await,
                dept: Some(row.dept.clone()),
                wr_number: Some(row.wr_number.clone()),
                job_number: Some(row.job_number.clone()),
            });
        }

        let mut sheets = self.sheets.write().await;
        let target = sheets.get_mut(&sheet).ok_or_else(|| Self::not_found(sheet))?;
        if target.rows.len() + rows.len() > target.row_limit {
            return Err(self.capacity_error(sheet));
        }
        target.rows.extend(new_rows);
        drop(sheets);

        self.adds.write().await.push(RecordedWrite {
            sheet,
            rows: rows.len(),
        });
        Ok(())
    }

    async fn update_rows(
        &self,
        sheet: SheetId,
        updates: &[RowUpdate],
    ) -> Result<(), SheetServiceError> {
        self.check_write(sheet).await?;

        let mut sheets = self.sheets.write().await;
        let target = sheets.get_mut(&sheet).ok_or_else(|| Self::not_found(sheet))?;
        for update in updates {
            let row = target
                .rows
                .iter_mut()
                .find(|r| r.row_id == update.row_id)
                .ok_or_else(|| {
                    SheetServiceError::new(
                        ServiceErrorKind::NotFound,
                        format!("row {} not found on sheet {}", update.row_id, sheet),
                    )
                })?;
            row.job_number = Some(update.job_number.clone());
        }
        drop(sheets);

        self.updates.write().await.push(RecordedWrite {
            sheet,
            rows: updates.len(),
        });
        Ok(())
    }

    async fn duplicate_sheet(
        &self,
        source: SheetId,
        name: &str,
    ) -> Result<SheetRef, SheetServiceError> {
        let failure = self.failures.read().await.duplicates;
        if let Some(kind) = failure {
            self.duplicates.write().await.push(RecordedDuplicate {
                source,
                name: name.to_string(),
                created: None,
            });
            return Err(SheetServiceError::new(kind, "injected duplicate failure"));
        }

        let row_limit = self
            .sheets
            .read()
            .await
            .get(&source)
            .map(|s| s.row_limit)
            .ok_or_else(|| Self::not_found(source))?;

        let id = SheetId(self.allocate_id().await);
        self.sheets.write().await.insert(
            id,
            MockSheet {
                name: name.to_string(),
                row_limit,
                rows: Vec::new(),
            },
        );
        self.duplicates.write().await.push(RecordedDuplicate {
            source,
            name: name.to_string(),
            created: Some(id),
        });
        Ok(SheetRef::new(id, name))
    }
}
