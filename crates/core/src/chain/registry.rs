//! Registry of chains owned by a single reconciliation pass.

use tracing::{info, warn};

use crate::config::ChainConfig;
use crate::sheet_service::{SheetId, SheetRef};

use super::{Chain, ChainError, ChainTemplate};

/// All chains known to the process, in configuration order.
///
/// Chains are only ever added, and a chain's duplicate list only ever grows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainRegistry {
    chains: Vec<Chain>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge persisted chains with static configuration.
    ///
    /// A configured source with no persisted record becomes a single-sheet
    /// chain. Configuration refreshes the template of known chains; their
    /// duplicates are kept as persisted. Persisted chains that are no longer
    /// configured are kept so their history is not lost.
    pub fn from_parts(persisted: Vec<Chain>, configured: &[ChainConfig]) -> Self {
        let mut registry = Self::new();

        for config in configured {
            let template = ChainTemplate {
                name: config.name.clone(),
                row_limit: config.row_limit,
                intake_sheet_id: config.intake_sheet_id,
            };
            match persisted.iter().find(|c| c.source_id() == config.source_id) {
                Some(existing) => {
                    let mut chain = existing.clone();
                    chain.template = template;
                    registry.chains.push(chain);
                }
                None => {
                    info!(chain = %config.source_id, name = %config.name, "Registering new chain");
                    registry.chains.push(Chain::new(
                        SheetRef::new(config.source_id, config.name.clone()),
                        template,
                    ));
                }
            }
        }

        for chain in persisted {
            if !registry.chains.iter().any(|c| c.source_id() == chain.source_id()) {
                warn!(
                    chain = %chain.source_id(),
                    "Persisted chain is no longer configured; keeping it"
                );
                registry.chains.push(chain);
            }
        }

        registry
    }

    pub fn get_chain(&self, source: SheetId) -> Result<&Chain, ChainError> {
        self.chains
            .iter()
            .find(|c| c.source_id() == source)
            .ok_or(ChainError::NotFound(source))
    }

    fn get_chain_mut(&mut self, source: SheetId) -> Result<&mut Chain, ChainError> {
        self.chains
            .iter_mut()
            .find(|c| c.source_id() == source)
            .ok_or(ChainError::NotFound(source))
    }

    /// Ordered sheets of a chain: `[source, dup_1, …, dup_N]`.
    pub fn all_sheets(&self, source: SheetId) -> Result<Vec<SheetRef>, ChainError> {
        Ok(self
            .get_chain(source)?
            .all_sheets()
            .into_iter()
            .cloned()
            .collect())
    }

    /// Append a newly created duplicate to a chain.
    ///
    /// Rejects a sheet id that is already anywhere in the chain.
    pub fn append_duplicate(&mut self, source: SheetId, sheet: SheetRef) -> Result<(), ChainError> {
        let chain = self.get_chain_mut(source)?;
        if chain.contains(sheet.id) {
            return Err(ChainError::AlreadyInChain {
                chain: source,
                sheet: sheet.id,
            });
        }
        info!(
            chain = %source,
            sheet = %sheet.id,
            name = %sheet.name,
            position = chain.duplicates.len() + 1,
            "Appended duplicate sheet to chain"
        );
        chain.duplicates.push(sheet);
        Ok(())
    }

    /// Point future writes of a chain at one of its sheets.
    pub fn designate(&mut self, source: SheetId, sheet: SheetId) -> Result<(), ChainError> {
        let chain = self.get_chain_mut(source)?;
        if !chain.contains(sheet) {
            return Err(ChainError::NotInChain {
                chain: source,
                sheet,
            });
        }
        chain.designated = Some(sheet);
        Ok(())
    }

    pub fn source_ids(&self) -> Vec<SheetId> {
        self.chains.iter().map(Chain::source_id).collect()
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Snapshot for persistence.
    pub fn to_persisted(&self) -> Vec<Chain> {
        self.chains.clone()
    }
}
