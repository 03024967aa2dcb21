use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::sheet_service::SheetId;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub sheet_service: SheetServiceConfig,
    #[serde(default)]
    pub columns: ColumnConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub numbering: NumberingConfig,
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
}

/// Smartsheet API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SheetServiceConfig {
    /// API base URL (e.g., "https://api.smartsheet.com/2.0")
    #[serde(default = "default_service_url")]
    pub url: String,
    /// API token. Falls back to SMARTSHEET_API_TOKEN when empty.
    #[serde(default)]
    pub api_token: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

impl Default for SheetServiceConfig {
    fn default() -> Self {
        Self {
            url: default_service_url(),
            api_token: String::new(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_service_url() -> String {
    "https://api.smartsheet.com/2.0".to_string()
}

fn default_timeout() -> u32 {
    30
}

/// Column titles used to locate WR data on every sheet of every chain.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ColumnConfig {
    #[serde(default = "default_dept_column")]
    pub dept: String,
    #[serde(default = "default_wr_column")]
    pub wr_number: String,
    #[serde(default = "default_job_column")]
    pub job_number: String,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            dept: default_dept_column(),
            wr_number: default_wr_column(),
            job_number: default_job_column(),
        }
    }
}

fn default_dept_column() -> String {
    "Dept #".to_string()
}

fn default_wr_column() -> String {
    "Work Request #".to_string()
}

fn default_job_column() -> String {
    "Job #".to_string()
}

/// Persisted state location
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StateConfig {
    #[serde(default = "default_state_dir")]
    pub dir: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: default_state_dir(),
        }
    }
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("state")
}

/// Job numbering rules
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NumberingConfig {
    /// Case-insensitive placeholder values. Rows whose dept or WR number
    /// contain one are skipped; job cells containing one are overwritten.
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
}

impl Default for NumberingConfig {
    fn default() -> Self {
        Self {
            exclude_patterns: default_exclude_patterns(),
        }
    }
}

fn default_exclude_patterns() -> Vec<String> {
    vec!["no match".to_string(), "not assigned".to_string()]
}

/// Static configuration of one chain, keyed by its source sheet.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ChainConfig {
    pub source_id: SheetId,
    /// Display name, used when naming new duplicates.
    pub name: String,
    /// Maximum rows a single sheet of this chain can hold.
    #[serde(default = "default_row_limit")]
    pub row_limit: usize,
    /// Sheet where new work requests arrive before landing in the chain.
    #[serde(default)]
    pub intake_sheet_id: Option<SheetId>,
}

fn default_row_limit() -> usize {
    20_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal_config() {
        let toml = r#"
[[chains]]
source_id = 3239244454645636
name = "Tracker"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.chains.len(), 1);
        assert_eq!(config.chains[0].source_id, SheetId(3239244454645636));
        assert_eq!(config.chains[0].row_limit, 20_000);
        assert!(config.chains[0].intake_sheet_id.is_none());
        assert_eq!(config.sheet_service.url, "https://api.smartsheet.com/2.0");
        assert_eq!(config.sheet_service.timeout_secs, 30);
        assert_eq!(config.columns.wr_number, "Work Request #");
        assert_eq!(config.state.dir.to_str().unwrap(), "state");
    }

    #[test]
    fn test_default_exclude_patterns() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(
            config.numbering.exclude_patterns,
            vec!["no match".to_string(), "not assigned".to_string()]
        );
        assert!(config.chains.is_empty());
    }

    #[test]
    fn test_deserialize_full_config() {
        let toml = r#"
[sheet_service]
url = "http://localhost:9000/2.0"
api_token = "secret"
timeout_secs = 10

[columns]
dept = "Department"
wr_number = "WR"
job_number = "Job"

[state]
dir = "/var/lib/jobnum"

[numbering]
exclude_patterns = ["tbd"]

[[chains]]
source_id = 1
name = "North"
row_limit = 500
intake_sheet_id = 99

[[chains]]
source_id = 2
name = "South"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.sheet_service.api_token, "secret");
        assert_eq!(config.columns.dept, "Department");
        assert_eq!(config.numbering.exclude_patterns, vec!["tbd".to_string()]);
        assert_eq!(config.chains.len(), 2);
        assert_eq!(config.chains[0].row_limit, 500);
        assert_eq!(config.chains[0].intake_sheet_id, Some(SheetId(99)));
        assert_eq!(config.chains[1].name, "South");
    }
}
