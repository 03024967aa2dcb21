pub mod capacity;
pub mod chain;
pub mod collector;
pub mod config;
pub mod engine;
pub mod numbering;
pub mod reconcile;
pub mod sheet_service;
pub mod state;
pub mod testing;

pub use capacity::{
    find_sheet_with_capacity, find_sheet_with_capacity_excluding, free_rows, is_capacity_error,
};
pub use chain::{Chain, ChainError, ChainRegistry, ChainTemplate};
pub use collector::{collect_wr_numbers, ChainInventory, CollectError, WrRow};
pub use config::{
    load_config, load_config_from_str, validate_config, ChainConfig, ColumnConfig, Config,
    ConfigError, NumberingConfig, SheetServiceConfig, StateConfig,
};
pub use engine::{EngineError, Placement, UpdateEngine, WriteOutcome};
pub use numbering::{AssignmentBook, ExclusionRules, JobFormat, JobSequence};
pub use reconcile::{ChainOutcome, ChainReport, ChainSummary, PassError, PassReport, Reconciler};
pub use sheet_service::{
    NewRow, RowUpdate, ServiceErrorKind, SheetId, SheetRef, SheetRow, SheetService,
    SheetServiceError, SmartsheetClient,
};
pub use state::{JsonStateStore, PersistedState, StateError, StateStore};
