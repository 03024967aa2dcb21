//! Update-with-fallback: land a batch of rows somewhere in a chain.
//!
//! The batch is first written to the chain's designated sheet. When that
//! sheet refuses with a capacity error the engine looks for another sheet in
//! the chain with room for the whole batch, and only when none has room does
//! it create a new duplicate of the source and write there. Any other error
//! ends the batch unchanged.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::capacity::{find_sheet_with_capacity_excluding, is_capacity_error};
use crate::chain::{ChainError, ChainRegistry};
use crate::sheet_service::{NewRow, SheetId, SheetService, SheetServiceError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Batch of {rows} rows exceeds the {row_limit}-row limit of chain {chain}")]
    BatchTooLarge {
        chain: SheetId,
        rows: usize,
        row_limit: usize,
    },

    #[error("Writing to sheet {sheet} failed: {source}")]
    Write {
        sheet: SheetId,
        #[source]
        source: SheetServiceError,
    },

    #[error("Creating a duplicate for chain {chain} failed: {source}")]
    DuplicateCreation {
        chain: SheetId,
        #[source]
        source: SheetServiceError,
    },

    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// How the target sheet of a batch was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// The designated sheet took the batch.
    Primary,
    /// Another existing sheet of the chain had room.
    ExistingSheet,
    /// A new duplicate was created for the batch.
    NewDuplicate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub sheet: SheetId,
    pub placement: Placement,
    pub rows_written: usize,
    /// Capacity errors observed while placing the batch.
    pub capacity_errors: usize,
}

/// Name for the `position`-th duplicate of a chain.
pub fn duplicate_name(chain_name: &str, position: usize, at: DateTime<Utc>) -> String {
    format!("{} (Dup {}, {})", chain_name, position, at.format("%Y-%m-%d"))
}

pub struct UpdateEngine<'a> {
    service: &'a dyn SheetService,
}

impl<'a> UpdateEngine<'a> {
    pub fn new(service: &'a dyn SheetService) -> Self {
        Self { service }
    }

    /// Write a whole batch to one sheet of the chain rooted at `source`.
    pub async fn write_batch(
        &self,
        registry: &mut ChainRegistry,
        source: SheetId,
        rows: &[NewRow],
    ) -> Result<WriteOutcome, EngineError> {
        let chain = registry.get_chain(source)?;
        let primary = chain.designated_sheet().id;
        let row_limit = chain.template.row_limit;

        if rows.is_empty() {
            return Ok(WriteOutcome {
                sheet: primary,
                placement: Placement::Primary,
                rows_written: 0,
                capacity_errors: 0,
            });
        }
        if rows.len() > row_limit {
            return Err(EngineError::BatchTooLarge {
                chain: source,
                rows: rows.len(),
                row_limit,
            });
        }

        let mut capacity_errors = 0;
        let mut refused = Vec::new();

        match self.service.add_rows(primary, rows).await {
            Ok(()) => {
                info!(chain = %source, sheet = %primary, rows = rows.len(), "Wrote batch to designated sheet");
                return Ok(WriteOutcome {
                    sheet: primary,
                    placement: Placement::Primary,
                    rows_written: rows.len(),
                    capacity_errors,
                });
            }
            Err(e) if is_capacity_error(&e) => {
                warn!(chain = %source, sheet = %primary, error = %e, "Designated sheet is full");
                capacity_errors += 1;
                refused.push(primary);
            }
            Err(e) => {
                return Err(EngineError::Write {
                    sheet: primary,
                    source: e,
                })
            }
        }

        // Find-Space: capacity is read live on every round.
        loop {
            let candidate = find_sheet_with_capacity_excluding(
                self.service,
                registry.get_chain(source)?,
                rows.len(),
                &refused,
            )
            .await;
            let Some(sheet) = candidate else { break };

            match self.service.add_rows(sheet.id, rows).await {
                Ok(()) => {
                    registry.designate(source, sheet.id)?;
                    info!(chain = %source, sheet = %sheet.id, rows = rows.len(), "Wrote batch to existing sheet with room");
                    return Ok(WriteOutcome {
                        sheet: sheet.id,
                        placement: Placement::ExistingSheet,
                        rows_written: rows.len(),
                        capacity_errors,
                    });
                }
                Err(e) if is_capacity_error(&e) => {
                    warn!(chain = %source, sheet = %sheet.id, error = %e, "Sheet refused batch despite free rows");
                    capacity_errors += 1;
                    refused.push(sheet.id);
                }
                Err(e) => {
                    return Err(EngineError::Write {
                        sheet: sheet.id,
                        source: e,
                    })
                }
            }
        }

        // Create-Duplicate
        let chain = registry.get_chain(source)?;
        let now = Utc::now();
        let name = duplicate_name(&chain.template.name, chain.duplicates.len() + 1, now);
        info!(chain = %source, name = %name, "No sheet in chain has room; creating duplicate");

        let created = self
            .service
            .duplicate_sheet(source, &name)
            .await
            .map_err(|e| EngineError::DuplicateCreation {
                chain: source,
                source: e,
            })?
            .with_created_at(now);
        let new_sheet = created.id;
        registry.append_duplicate(source, created)?;
        registry.designate(source, new_sheet)?;

        self.service
            .add_rows(new_sheet, rows)
            .await
            .map_err(|e| EngineError::Write {
                sheet: new_sheet,
                source: e,
            })?;
        info!(chain = %source, sheet = %new_sheet, rows = rows.len(), "Wrote batch to new duplicate");

        Ok(WriteOutcome {
            sheet: new_sheet,
            placement: Placement::NewDuplicate,
            rows_written: rows.len(),
            capacity_errors,
        })
    }
}
