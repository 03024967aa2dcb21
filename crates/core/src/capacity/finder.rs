//! Finds a sheet in a chain with room for a batch.

use tracing::{debug, warn};

use crate::chain::Chain;
use crate::sheet_service::{SheetId, SheetRef, SheetService, SheetServiceError};

/// Free row slots on a sheet, read live. Never cached.
pub async fn free_rows(
    service: &dyn SheetService,
    sheet: SheetId,
    row_limit: usize,
) -> Result<usize, SheetServiceError> {
    let rows = service.get_rows(sheet).await?;
    Ok(row_limit.saturating_sub(rows.len()))
}

/// The first sheet, source first, whose live free-row count fits `rows_needed`.
pub async fn find_sheet_with_capacity(
    service: &dyn SheetService,
    chain: &Chain,
    rows_needed: usize,
) -> Option<SheetRef> {
    find_sheet_with_capacity_excluding(service, chain, rows_needed, &[]).await
}

/// Like [`find_sheet_with_capacity`], passing over the `excluded` sheets.
///
/// Sheets that cannot be read are passed over with a warning.
pub async fn find_sheet_with_capacity_excluding(
    service: &dyn SheetService,
    chain: &Chain,
    rows_needed: usize,
    excluded: &[SheetId],
) -> Option<SheetRef> {
    for sheet in chain.all_sheets() {
        if excluded.contains(&sheet.id) {
            continue;
        }
        match free_rows(service, sheet.id, chain.template.row_limit).await {
            Ok(free) if free >= rows_needed => {
                debug!(chain = %chain.source_id(), sheet = %sheet.id, free, rows_needed, "Found sheet with capacity");
                return Some(sheet.clone());
            }
            Ok(free) => {
                debug!(chain = %chain.source_id(), sheet = %sheet.id, free, rows_needed, "Sheet lacks capacity");
            }
            Err(e) => {
                warn!(
                    chain = %chain.source_id(),
                    sheet = %sheet.id,
                    error = %e,
                    "Could not measure sheet capacity; passing over it"
                );
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainTemplate;
    use crate::sheet_service::ServiceErrorKind;
    use crate::testing::{fixtures, MockSheetService};

    fn chain_of(ids: &[u64], row_limit: usize) -> Chain {
        let mut chain = Chain::new(
            SheetRef::new(ids[0], "Tracker"),
            ChainTemplate {
                name: "Tracker".to_string(),
                row_limit,
                intake_sheet_id: None,
            },
        );
        for id in &ids[1..] {
            chain.duplicates.push(SheetRef::new(*id, format!("Dup {}", id)));
        }
        chain
    }

    #[tokio::test]
    async fn test_source_preferred_when_it_fits() {
        let service = MockSheetService::new();
        service.add_sheet(1, "Tracker", 10, fixtures::filler_rows(5)).await;
        service.add_sheet(2, "Dup", 10, vec![]).await;

        let found = find_sheet_with_capacity(&service, &chain_of(&[1, 2], 10), 5).await;
        assert_eq!(found.map(|s| s.id), Some(SheetId(1)));
    }

    #[tokio::test]
    async fn test_whole_batch_must_fit() {
        let service = MockSheetService::new();
        service.add_sheet(1, "Tracker", 10, fixtures::filler_rows(8)).await;
        service.add_sheet(2, "Dup", 10, fixtures::filler_rows(6)).await;

        let found = find_sheet_with_capacity(&service, &chain_of(&[1, 2], 10), 3).await;
        assert_eq!(found.map(|s| s.id), Some(SheetId(2)));

        let none = find_sheet_with_capacity(&service, &chain_of(&[1, 2], 10), 5).await;
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_capacity_is_recomputed_each_call() {
        let service = MockSheetService::new();
        service.add_sheet(1, "Tracker", 10, fixtures::filler_rows(10)).await;
        let chain = chain_of(&[1], 10);

        assert!(find_sheet_with_capacity(&service, &chain, 2).await.is_none());
        service.archive_rows(1, 4).await;
        assert_eq!(
            find_sheet_with_capacity(&service, &chain, 2).await.map(|s| s.id),
            Some(SheetId(1))
        );
    }

    #[tokio::test]
    async fn test_excluded_and_unreadable_sheets_are_passed_over() {
        let service = MockSheetService::new();
        service.add_sheet(1, "Tracker", 10, vec![]).await;
        service.add_sheet(2, "Dup", 10, vec![]).await;
        service.add_sheet(3, "Dup", 10, vec![]).await;
        service.fail_reads(2, ServiceErrorKind::Timeout).await;

        let found = find_sheet_with_capacity_excluding(
            &service,
            &chain_of(&[1, 2, 3], 10),
            1,
            &[SheetId(1)],
        )
        .await;
        assert_eq!(found.map(|s| s.id), Some(SheetId(3)));
    }
}
