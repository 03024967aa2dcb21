//! Smartsheet REST API 2.0 implementation.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::{ColumnConfig, SheetServiceConfig};

use super::{
    NewRow, RowUpdate, ServiceErrorKind, SheetId, SheetRef, SheetRow, SheetService,
    SheetServiceError,
};

/// Error codes Smartsheet documents for a sheet that cannot take more rows.
const ROW_LIMIT_CODES: &[u32] = &[1036];
const RATE_LIMIT_CODES: &[u32] = &[4003];
const UNAUTHORIZED_CODES: &[u32] = &[1002, 1003, 1004];
const NOT_FOUND_CODES: &[u32] = &[1006];

/// Column ids of the three WR columns on one sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnMap {
    dept: u64,
    wr_number: u64,
    job_number: u64,
}

/// Smartsheet client implementation.
pub struct SmartsheetClient {
    client: Client,
    config: SheetServiceConfig,
    columns: ColumnConfig,
    /// Column ids per sheet. Ids are stable for the life of a sheet; row
    /// counts are not and are never cached.
    column_cache: RwLock<HashMap<SheetId, ColumnMap>>,
}

impl SmartsheetClient {
    /// Create a new Smartsheet client.
    pub fn new(config: SheetServiceConfig, columns: ColumnConfig) -> Result<Self, SheetServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| {
                SheetServiceError::new(
                    ServiceErrorKind::Connection,
                    format!("Failed to create HTTP client: {}", e),
                )
            })?;

        Ok(Self {
            client,
            config,
            columns,
            column_cache: RwLock::new(HashMap::new()),
        })
    }

    /// Get the base URL without trailing slash.
    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url(), endpoint);
        self.client
            .request(method, url)
            .bearer_auth(&self.config.api_token)
    }

    /// Send a request and decode the JSON body, mapping failures to typed errors.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, SheetServiceError> {
        let response = request.send().await.map_err(map_transport_error)?;
        let response = check_status(response).await?;
        response.json::<T>().await.map_err(|e| {
            SheetServiceError::new(
                ServiceErrorKind::Schema,
                format!("Failed to parse response: {}", e),
            )
        })
    }

    /// Fetch a sheet with its columns and rows.
    async fn fetch_sheet(&self, sheet: SheetId) -> Result<SsSheet, SheetServiceError> {
        self.send(self.request(Method::GET, &format!("/sheets/{}", sheet)))
            .await
    }

    /// Resolve the WR column ids for a sheet, from cache when known.
    async fn column_map(&self, sheet: SheetId) -> Result<ColumnMap, SheetServiceError> {
        if let Some(map) = self.column_cache.read().await.get(&sheet) {
            return Ok(*map);
        }

        let response: SsColumnPage = self
            .send(self.request(
                Method::GET,
                &format!("/sheets/{}/columns?includeAll=true", sheet),
            ))
            .await?;
        let map = resolve_columns(&self.columns, &response.data, sheet)?;
        self.column_cache.write().await.insert(sheet, map);
        Ok(map)
    }
}

/// Map a reqwest transport failure to a service error.
fn map_transport_error(e: reqwest::Error) -> SheetServiceError {
    if e.is_timeout() {
        SheetServiceError::new(ServiceErrorKind::Timeout, e.to_string())
    } else if e.is_connect() {
        SheetServiceError::new(ServiceErrorKind::Connection, e.to_string())
    } else {
        SheetServiceError::unclassified(None, e.to_string())
    }
}

/// Pass successful responses through; turn error responses into typed errors.
async fn check_status(response: Response) -> Result<Response, SheetServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let parsed: Option<SsError> = serde_json::from_str(&body).ok();
    let (code, message) = match parsed {
        Some(err) => (err.error_code, err.message),
        None => (None, body.chars().take(200).collect::<String>()),
    };

    Err(SheetServiceError {
        kind: classify_response(status.as_u16(), code),
        code,
        message: if message.is_empty() {
            format!("HTTP {}", status)
        } else {
            message
        },
    })
}

/// Derive the structured kind from the HTTP status and Smartsheet error code.
fn classify_response(status: u16, code: Option<u32>) -> ServiceErrorKind {
    if let Some(code) = code {
        if ROW_LIMIT_CODES.contains(&code) {
            return ServiceErrorKind::RowLimit;
        }
        if RATE_LIMIT_CODES.contains(&code) {
            return ServiceErrorKind::RateLimited;
        }
        if UNAUTHORIZED_CODES.contains(&code) {
            return ServiceErrorKind::Unauthorized;
        }
        if NOT_FOUND_CODES.contains(&code) {
            return ServiceErrorKind::NotFound;
        }
    }

    match status {
        401 | 403 => ServiceErrorKind::Unauthorized,
        404 => ServiceErrorKind::NotFound,
        429 => ServiceErrorKind::RateLimited,
        _ => ServiceErrorKind::Unknown,
    }
}

/// Find the configured WR columns by title, case-insensitively.
fn resolve_columns(
    config: &ColumnConfig,
    columns: &[SsColumn],
    sheet: SheetId,
) -> Result<ColumnMap, SheetServiceError> {
    let by_title: HashMap<String, u64> = columns
        .iter()
        .filter_map(|c| c.title.as_ref().map(|t| (t.trim().to_lowercase(), c.id)))
        .collect();

    let lookup = |title: &str| by_title.get(&title.trim().to_lowercase()).copied();

    let mut missing = Vec::new();
    let dept = lookup(&config.dept);
    let wr_number = lookup(&config.wr_number);
    let job_number = lookup(&config.job_number);
    if dept.is_none() {
        missing.push(config.dept.as_str());
    }
    if wr_number.is_none() {
        missing.push(config.wr_number.as_str());
    }
    if job_number.is_none() {
        missing.push(config.job_number.as_str());
    }

    match (dept, wr_number, job_number) {
        (Some(dept), Some(wr_number), Some(job_number)) => Ok(ColumnMap {
            dept,
            wr_number,
            job_number,
        }),
        _ => Err(SheetServiceError::new(
            ServiceErrorKind::Schema,
            format!("sheet {} is missing required columns: {:?}", sheet, missing),
        )),
    }
}

/// Text of a cell, preferring the display value. Blank cells become None.
fn cell_text(cell: &SsCell) -> Option<String> {
    let text = match (&cell.display_value, &cell.value) {
        (Some(display), _) => display.clone(),
        (None, Some(Value::String(s))) => s.clone(),
        (None, Some(Value::Number(n))) => n.to_string(),
        (None, Some(Value::Bool(b))) => b.to_string(),
        _ => return None,
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn into_sheet_row(row: SsRow, columns: &ColumnMap) -> SheetRow {
    let mut dept = None;
    let mut wr_number = None;
    let mut job_number = None;
    for cell in &row.cells {
        if cell.column_id == columns.dept {
            dept = cell_text(cell);
        } else if cell.column_id == columns.wr_number {
            wr_number = cell_text(cell);
        } else if cell.column_id == columns.job_number {
            job_number = cell_text(cell);
        }
    }
    SheetRow {
        row_id: row.id,
        dept,
        wr_number,
        job_number,
    }
}

/// Smartsheet error body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SsError {
    #[serde(default)]
    error_code: Option<u32>,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct SsColumn {
    id: u64,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SsColumnPage {
    #[serde(default)]
    data: Vec<SsColumn>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SsCell {
    column_id: u64,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    display_value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SsRow {
    id: u64,
    #[serde(default)]
    cells: Vec<SsCell>,
}

#[derive(Debug, Deserialize)]
struct SsSheet {
    #[serde(default)]
    columns: Vec<SsColumn>,
    #[serde(default)]
    rows: Vec<SsRow>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SsCellWrite<'a> {
    column_id: u64,
    value: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    strict: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SsRowWrite<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    to_bottom: Option<bool>,
    cells: Vec<SsCellWrite<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SsCopyRequest<'a> {
    destination_type: &'a str,
    new_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct SsCopyResult {
    id: u64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct SsResultEnvelope<T> {
    result: T,
}

#[async_trait]
impl SheetService for SmartsheetClient {
    fn name(&self) -> &str {
        "smartsheet"
    }

    async fn get_rows(&self, sheet: SheetId) -> Result<Vec<SheetRow>, SheetServiceError> {
        let response = self.fetch_sheet(sheet).await?;
        let columns = resolve_columns(&self.columns, &response.columns, sheet)?;
        self.column_cache.write().await.insert(sheet, columns);

        debug!(sheet = %sheet, rows = response.rows.len(), "Fetched sheet rows");
        Ok(response
            .rows
            .into_iter()
            .map(|row| into_sheet_row(row, &columns))
            .collect())
    }

    async fn add_rows(&self, sheet: SheetId, rows: &[NewRow]) -> Result<(), SheetServiceError> {
        if rows.is_empty() {
            return Ok(());
        }
        let columns = self.column_map(sheet).await?;

        let body: Vec<SsRowWrite<'_>> = rows
            .iter()
            .map(|row| SsRowWrite {
                id: None,
                to_bottom: Some(true),
                cells: vec![
                    SsCellWrite {
                        column_id: columns.dept,
                        value: &row.dept,
                        strict: None,
                    },
                    SsCellWrite {
                        column_id: columns.wr_number,
                        value: &row.wr_number,
                        strict: None,
                    },
                    SsCellWrite {
                        column_id: columns.job_number,
                        value: &row.job_number,
                        strict: Some(false),
                    },
                ],
            })
            .collect();

        let _: Value = self
            .send(
                self.request(Method::POST, &format!("/sheets/{}/rows", sheet))
                    .json(&body),
            )
            .await?;
        debug!(sheet = %sheet, rows = rows.len(), "Added rows");
        Ok(())
    }

    async fn update_rows(
        &self,
        sheet: SheetId,
        updates: &[RowUpdate],
    ) -> Result<(), SheetServiceError> {
        if updates.is_empty() {
            return Ok(());
        }
        let columns = self.column_map(sheet).await?;

        let body: Vec<SsRowWrite<'_>> = updates
            .iter()
            .map(|update| SsRowWrite {
                id: Some(update.row_id),
                to_bottom: None,
                cells: vec![SsCellWrite {
                    column_id: columns.job_number,
                    value: &update.job_number,
                    strict: Some(false),
                }],
            })
            .collect();

        let _: Value = self
            .send(
                self.request(Method::PUT, &format!("/sheets/{}/rows", sheet))
                    .json(&body),
            )
            .await?;
        debug!(sheet = %sheet, rows = updates.len(), "Updated rows");
        Ok(())
    }

    async fn duplicate_sheet(
        &self,
        source: SheetId,
        name: &str,
    ) -> Result<SheetRef, SheetServiceError> {
        let body = SsCopyRequest {
            destination_type: "home",
            new_name: name,
        };
        let response: SsResultEnvelope<SsCopyResult> = self
            .send(
                self.request(Method::POST, &format!("/sheets/{}/copy", source))
                    .json(&body),
            )
            .await?;

        debug!(source = %source, sheet = response.result.id, "Copied sheet structure");
        Ok(SheetRef::new(response.result.id, response.result.name))
    }
}
