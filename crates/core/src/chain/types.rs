//! Chain data model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sheet_service::{SheetId, SheetRef};

/// Errors from chain registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("No chain configured for source sheet {0}")]
    NotFound(SheetId),

    #[error("Sheet {sheet} is already part of chain {chain}")]
    AlreadyInChain { chain: SheetId, sheet: SheetId },

    #[error("Sheet {sheet} is not part of chain {chain}")]
    NotInChain { chain: SheetId, sheet: SheetId },
}

/// Per-chain settings that come from static configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTemplate {
    /// Display name used when naming duplicates.
    pub name: String,
    /// Maximum rows any one sheet of the chain can hold.
    pub row_limit: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intake_sheet_id: Option<SheetId>,
}

/// A source sheet plus the duplicates created from it, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    pub source: SheetRef,
    #[serde(default)]
    pub duplicates: Vec<SheetRef>,
    /// Sheet that receives the next write. None means the newest sheet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub designated: Option<SheetId>,
    pub template: ChainTemplate,
}

impl Chain {
    /// Create a chain that holds only its source sheet.
    pub fn new(source: SheetRef, template: ChainTemplate) -> Self {
        Self {
            source,
            duplicates: Vec::new(),
            designated: None,
            template,
        }
    }

    pub fn source_id(&self) -> SheetId {
        self.source.id
    }

    /// Every sheet of the chain in order: source first, then duplicates by age.
    pub fn all_sheets(&self) -> Vec<&SheetRef> {
        std::iter::once(&self.source)
            .chain(self.duplicates.iter())
            .collect()
    }

    pub fn contains(&self, sheet: SheetId) -> bool {
        self.source.id == sheet || self.duplicates.iter().any(|d| d.id == sheet)
    }

    /// The sheet that should receive the next write.
    pub fn designated_sheet(&self) -> &SheetRef {
        self.designated
            .and_then(|id| self.all_sheets().into_iter().find(|s| s.id == id))
            .unwrap_or_else(|| self.duplicates.last().unwrap_or(&self.source))
    }

    /// Number of sheets, source included.
    pub fn len(&self) -> usize {
        1 + self.duplicates.len()
    }

    /// A chain always holds its source, so it is never empty.
    pub fn is_empty(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Chain {
        Chain::new(
            SheetRef::new(1u64, "Tracker"),
            ChainTemplate {
                name: "Tracker".to_string(),
                row_limit: 10,
                intake_sheet_id: None,
            },
        )
    }

    #[test]
    fn test_designated_defaults_to_source() {
        let chain = chain();
        assert_eq!(chain.designated_sheet().id, SheetId(1));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_designated_defaults_to_newest_duplicate() {
        let mut chain = chain();
        chain.duplicates.push(SheetRef::new(2u64, "Dup 1"));
        chain.duplicates.push(SheetRef::new(3u64, "Dup 2"));
        assert_eq!(chain.designated_sheet().id, SheetId(3));

        chain.designated = Some(SheetId(2));
        assert_eq!(chain.designated_sheet().id, SheetId(2));
    }

    #[test]
    fn test_stale_designated_falls_back() {
        let mut chain = chain();
        chain.designated = Some(SheetId(99));
        assert_eq!(chain.designated_sheet().id, SheetId(1));
    }

    #[test]
    fn test_all_sheets_order() {
        let mut chain = chain();
        chain.duplicates.push(SheetRef::new(5u64, "Dup 1"));
        chain.duplicates.push(SheetRef::new(4u64, "Dup 2"));
        let ids: Vec<_> = chain.all_sheets().iter().map(|s| s.id.0).collect();
        assert_eq!(ids, vec![1, 5, 4]);
    }
}
