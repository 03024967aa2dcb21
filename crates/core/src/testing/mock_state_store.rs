//! In-memory state store for testing.

use std::io;
use std::sync::{Arc, Mutex};

use crate::state::{PersistedState, StateError, StateStore};

/// Mock implementation of the StateStore trait.
///
/// Keeps the last saved state in memory and counts saves. It can be told to
/// fail loads with a corruption error, or to fail one particular save.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    state: Arc<Mutex<PersistedState>>,
    saves: Arc<Mutex<usize>>,
    attempts: Arc<Mutex<usize>>,
    fail_save: Arc<Mutex<Option<usize>>>,
    corrupt: Arc<Mutex<bool>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with state.
    pub fn with_state(state: PersistedState) -> Self {
        let store = Self::new();
        *store.state.lock().unwrap() = state;
        store
    }

    /// The last saved (or initial) state.
    pub fn snapshot(&self) -> PersistedState {
        self.state.lock().unwrap().clone()
    }

    /// Number of saves that succeeded.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap()
    }

    /// Make loads fail as if the stored record could not be parsed.
    pub fn set_corrupt(&self, corrupt: bool) {
        *self.corrupt.lock().unwrap() = corrupt;
    }

    /// Make the `nth` save attempt (counting from 1) fail with an I/O error.
    /// The stored state is left as it was.
    pub fn fail_save_number(&self, nth: usize) {
        *self.fail_save.lock().unwrap() = Some(nth);
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<PersistedState, StateError> {
        if *self.corrupt.lock().unwrap() {
            let source = serde_json::from_str::<serde_json::Value>("{ corrupt")
                .expect_err("literal is not valid JSON");
            return Err(StateError::Corrupt {
                path: "memory".into(),
                source,
            });
        }
        Ok(self.snapshot())
    }

    fn save(&self, state: &PersistedState) -> Result<(), StateError> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            *attempts += 1;
            *attempts
        };
        if *self.fail_save.lock().unwrap() == Some(attempt) {
            return Err(StateError::Io {
                path: "memory".into(),
                source: io::Error::other(format!("injected failure on save {}", attempt)),
            });
        }

        *self.state.lock().unwrap() = state.clone();
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }
}
