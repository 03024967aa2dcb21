use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jobnum_core::{
    load_config, validate_config, ChainOutcome, Config, ExclusionRules, JsonStateStore,
    PassReport, Reconciler, SheetService, SmartsheetClient, StateStore,
};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Token variable used when the config leaves `sheet_service.api_token` empty.
const TOKEN_ENV: &str = "SMARTSHEET_API_TOKEN";

/// Exit code when the pass finished but some chains failed or were skipped.
const EXIT_PARTIAL: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    match run().await {
        Ok(report) => ExitCode::from(exit_code(&report)),
        Err(e) => {
            error!("Fatal error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let json = std::env::var("JOBNUM_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

async fn run() -> Result<PassReport> {
    let run_id = uuid::Uuid::new_v4();

    // Determine config path
    let config_path = std::env::var("JOBNUM_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("jobnum.toml"));

    // Load configuration
    info!(version = VERSION, %run_id, "Loading configuration from {:?}", config_path);
    let mut config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    if config.sheet_service.api_token.trim().is_empty() {
        config.sheet_service.api_token = std::env::var(TOKEN_ENV).unwrap_or_default();
    }
    if config.sheet_service.api_token.trim().is_empty() {
        bail!("No API token: set sheet_service.api_token or {}", TOKEN_ENV);
    }

    info!(
        %run_id,
        config_hash = %config_hash(&config),
        chains = config.chains.len(),
        state_dir = %config.state.dir.display(),
        "Configuration loaded successfully"
    );

    let service: Arc<dyn SheetService> = Arc::new(
        SmartsheetClient::new(config.sheet_service.clone(), config.columns.clone())
            .context("Failed to create Smartsheet client")?,
    );
    info!("Using sheet service: {}", service.name());

    let store: Arc<dyn StateStore> = Arc::new(JsonStateStore::new(config.state.dir.clone()));
    let exclusions = ExclusionRules::new(&config.numbering.exclude_patterns);

    let report = Reconciler::new(service, store, exclusions)
        .run_pass(&config.chains)
        .await
        .context("Reconciliation pass aborted")?;

    log_report(&report);
    info!(%run_id, "Run complete");
    Ok(report)
}

/// Short SHA-256 of the effective config with the token blanked out.
fn config_hash(config: &Config) -> String {
    let mut sanitized = config.clone();
    sanitized.sheet_service.api_token.clear();
    let config_json = serde_json::to_string(&sanitized).unwrap_or_default();
    let hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    hash[..16].to_string()
}

fn log_report(report: &PassReport) {
    for chain in &report.chains {
        match &chain.outcome {
            ChainOutcome::Completed(summary) => info!(
                chain = %chain.source,
                name = %chain.name,
                issued = summary.issued,
                adopted = summary.adopted,
                updated_rows = summary.updated_rows,
                capacity_blocked = summary.capacity_blocked,
                added_rows = summary.added_rows,
                held_back = summary.held_back,
                duplicates_created = summary.duplicates_created,
                skipped_sheets = summary.skipped_sheets.len(),
                "Chain completed"
            ),
            ChainOutcome::Skipped { reason } => {
                warn!(chain = %chain.source, name = %chain.name, reason = %reason, "Chain skipped")
            }
            ChainOutcome::Failed { error } => {
                error!(chain = %chain.source, name = %chain.name, error = %error, "Chain failed")
            }
        }
    }
}

fn exit_code(report: &PassReport) -> u8 {
    if report.is_fully_successful() {
        0
    } else {
        EXIT_PARTIAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobnum_core::{load_config_from_str, ChainReport, ChainSummary, SheetId};

    fn config() -> Config {
        load_config_from_str(
            r#"
[sheet_service]
api_token = "secret"

[[chains]]
source_id = 1
name = "Tracker"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_config_hash_ignores_token() {
        let mut other = config();
        other.sheet_service.api_token = "different".to_string();
        assert_eq!(config_hash(&config()), config_hash(&other));
        assert_eq!(config_hash(&config()).len(), 16);

        other.chains[0].row_limit = 10;
        assert_ne!(config_hash(&config()), config_hash(&other));
    }

    #[test]
    fn test_exit_code() {
        let mut report = PassReport {
            chains: vec![ChainReport {
                source: SheetId(1),
                name: "Tracker".to_string(),
                outcome: ChainOutcome::Completed(ChainSummary::default()),
            }],
            new_job_numbers: 0,
        };
        assert_eq!(exit_code(&report), 0);

        report.chains.push(ChainReport {
            source: SheetId(2),
            name: "Other".to_string(),
            outcome: ChainOutcome::Skipped {
                reason: "unreadable".to_string(),
            },
        });
        assert_eq!(exit_code(&report), EXIT_PARTIAL);
    }
}
