//! Types for sheet service operations.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of a sheet on the hosted service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SheetId(pub u64);

impl fmt::Display for SheetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SheetId {
    fn from(id: u64) -> Self {
        SheetId(id)
    }
}

/// Lifecycle state of a sheet tracked by a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SheetState {
    #[default]
    Active,
}

/// Reference to a physical sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetRef {
    pub id: SheetId,
    pub name: String,
    #[serde(default)]
    pub state: SheetState,
    /// Set for duplicates created by this system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl SheetRef {
    pub fn new(id: impl Into<SheetId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            state: SheetState::Active,
            created_at: None,
        }
    }

    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }
}

/// A row as read from a sheet.
///
/// All cells are optional because real sheets contain blank and partial rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRow {
    pub row_id: u64,
    pub dept: Option<String>,
    pub wr_number: Option<String>,
    pub job_number: Option<String>,
}

/// A row to append to a sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRow {
    pub dept: String,
    pub wr_number: String,
    pub job_number: String,
}

/// A job-number cell update for an existing row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowUpdate {
    pub row_id: u64,
    pub job_number: String,
}

/// Structured classification of a service failure, filled in by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    /// The sheet has reached its row limit.
    RowLimit,
    /// The sheet has reached its formula/cell reference limit.
    ReferenceLimit,
    RateLimited,
    Unauthorized,
    NotFound,
    Connection,
    Timeout,
    /// The sheet is missing a required column or returned an unexpected shape.
    Schema,
    /// The client could not classify the failure.
    Unknown,
}

/// Error returned by sheet service operations.
#[derive(Debug, Clone, Error)]
#[error("{kind:?} (code {}): {message}", code.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string()))]
pub struct SheetServiceError {
    pub kind: ServiceErrorKind,
    pub code: Option<u32>,
    pub message: String,
}

impl SheetServiceError {
    pub fn new(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: u32) -> Self {
        self.code = Some(code);
        self
    }

    /// An error the client could not classify, carrying the raw code and message.
    pub fn unclassified(code: Option<u32>, message: impl Into<String>) -> Self {
        Self {
            kind: ServiceErrorKind::Unknown,
            code,
            message: message.into(),
        }
    }
}

/// Operations the reconciler needs from the hosted sheet service.
#[async_trait]
pub trait SheetService: Send + Sync {
    /// Returns the name of this service backend.
    fn name(&self) -> &str;

    /// Read every row of a sheet, blank rows included.
    async fn get_rows(&self, sheet: SheetId) -> Result<Vec<SheetRow>, SheetServiceError>;

    /// Append rows to the bottom of a sheet.
    async fn add_rows(&self, sheet: SheetId, rows: &[NewRow]) -> Result<(), SheetServiceError>;

    /// Update the job-number cell of existing rows.
    async fn update_rows(
        &self,
        sheet: SheetId,
        updates: &[RowUpdate],
    ) -> Result<(), SheetServiceError>;

    /// Copy the structure of `source` into a new, empty sheet called `name`.
    async fn duplicate_sheet(
        &self,
        source: SheetId,
        name: &str,
    ) -> Result<SheetRef, SheetServiceError>;
}
