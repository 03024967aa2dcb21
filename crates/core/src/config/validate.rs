use std::collections::HashSet;

use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - At least one chain is configured
/// - Chain source ids are unique and no chain uses another source as intake
/// - Row limits and the request timeout are not 0
/// - Column titles are not blank
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.chains.is_empty() {
        return Err(ConfigError::ValidationError(
            "at least one [[chains]] entry is required".to_string(),
        ));
    }

    if config.sheet_service.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "sheet_service.timeout_secs cannot be 0".to_string(),
        ));
    }

    let columns = [
        ("columns.dept", &config.columns.dept),
        ("columns.wr_number", &config.columns.wr_number),
        ("columns.job_number", &config.columns.job_number),
    ];
    for (key, title) in columns {
        if title.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!("{} cannot be empty", key)));
        }
    }

    let mut sources = HashSet::new();
    for chain in &config.chains {
        if !sources.insert(chain.source_id) {
            return Err(ConfigError::ValidationError(format!(
                "chain source {} is configured more than once",
                chain.source_id
            )));
        }
        if chain.row_limit == 0 {
            return Err(ConfigError::ValidationError(format!(
                "chain {} row_limit cannot be 0",
                chain.source_id
            )));
        }
    }

    for chain in &config.chains {
        if let Some(intake) = chain.intake_sheet_id {
            if sources.contains(&intake) {
                return Err(ConfigError::ValidationError(format!(
                    "chain {} uses chain source {} as its intake sheet",
                    chain.source_id, intake
                )));
            }
        }
    }

    Ok(())
}
