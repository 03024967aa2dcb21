//! File-backed state store: one JSON document per record.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::{ChainsRecord, PersistedState, StateError, StateStore};

pub const JOB_NUMBERS_FILE: &str = "job_numbers.json";
pub const CHAINS_FILE: &str = "chains.json";

/// Stores the job-number map and chain registry as JSON files in a directory.
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    dir: PathBuf,
}

impl JsonStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn job_numbers_path(&self) -> PathBuf {
        self.dir.join(JOB_NUMBERS_FILE)
    }

    fn chains_path(&self) -> PathBuf {
        self.dir.join(CHAINS_FILE)
    }
}

/// Read and parse one record. A missing file yields None.
fn read_record<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StateError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StateError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| StateError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

/// Write a record to a temp file in the same directory, then rename it into place.
fn write_record<T: Serialize>(path: &Path, value: &T) -> Result<(), StateError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(StateError::Encode)?;
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let io_err = |source| StateError::Io {
        path: path.to_path_buf(),
        source,
    };

    fs::create_dir_all(parent).map_err(io_err)?;
    let mut tmp = NamedTempFile::new_in(parent).map_err(io_err)?;
    tmp.write_all(&bytes).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

impl StateStore for JsonStateStore {
    fn load(&self) -> Result<PersistedState, StateError> {
        let job_numbers: BTreeMap<String, String> =
            read_record(&self.job_numbers_path())?.unwrap_or_default();
        let chains: ChainsRecord = read_record(&self.chains_path())?.unwrap_or_default();

        info!(
            dir = %self.dir.display(),
            job_numbers = job_numbers.len(),
            chains = chains.chains.len(),
            "Loaded state"
        );
        Ok(PersistedState {
            job_numbers,
            chains: chains.chains,
        })
    }

    fn save(&self, state: &PersistedState) -> Result<(), StateError> {
        // Chains go first: a duplicate recorded without its job numbers is
        // found again on the next pass, a lost duplicate is not.
        write_record(
            &self.chains_path(),
            &ChainsRecord {
                chains: state.chains.clone(),
            },
        )?;
        write_record(&self.job_numbers_path(), &state.job_numbers)?;
        debug!(
            dir = %self.dir.display(),
            job_numbers = state.job_numbers.len(),
            "Saved state"
        );
        Ok(())
    }
}
