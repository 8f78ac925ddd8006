//! The one piece of state that outlives a run: which problem set and which
//! problem the user is focused on.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem_set: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem: Option<String>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.problem_set.is_none() && self.problem.is_none()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not access selection file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("selection file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub trait SelectionStore: Send + Sync {
    fn load(&self) -> Result<Selection, StoreError>;
    fn save(&self, selection: &Selection) -> Result<(), StoreError>;
}

/// Keeps the selection in a small JSON file. A missing file reads as an
/// empty selection; an empty selection removes the file.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl SelectionStore for FileStore {
    fn load(&self) -> Result<Selection, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Selection::default()),
            Err(e) => Err(self.io_err(e)),
        }
    }

    fn save(&self, selection: &Selection) -> Result<(), StoreError> {
        if selection.is_empty() {
            return match fs::remove_file(&self.path) {
                Err(e) if e.kind() != ErrorKind::NotFound => Err(self.io_err(e)),
                _ => Ok(()),
            };
        }
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| self.io_err(e))?;
        }
        let json = serde_json::to_string_pretty(selection).map_err(|source| {
            StoreError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })?;
        fs::write(&self.path, json).map_err(|e| self.io_err(e))
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    slot: Mutex<Selection>,
}

impl SelectionStore for MemoryStore {
    fn load(&self) -> Result<Selection, StoreError> {
        Ok(self.slot.lock().clone())
    }

    fn save(&self, selection: &Selection) -> Result<(), StoreError> {
        *self.slot.lock() = selection.clone();
        Ok(())
    }
}

/// Current selection plus the store it is written through to. Every change
/// is saved immediately; the last write wins.
pub struct Session<S: SelectionStore> {
    store: S,
    selection: Selection,
}

impl<S: SelectionStore> Session<S> {
    pub fn open(store: S) -> Result<Self, StoreError> {
        let selection = store.load()?;
        debug!(?selection, "session opened");
        Ok(Self { store, selection })
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Focuses a problem set. Any selected problem is forgotten.
    pub fn select_set(&mut self, set: &str) -> Result<(), StoreError> {
        self.selection.problem_set = Some(set.to_string());
        self.selection.problem = None;
        self.persist()
    }

    /// Selects `problem`, or deselects it when it is already selected.
    pub fn toggle_problem(&mut self, problem: &str) -> Result<(), StoreError> {
        if self.selection.problem.as_deref() == Some(problem) {
            self.selection.problem = None;
        } else {
            self.selection.problem = Some(problem.to_string());
        }
        self.persist()
    }

    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.selection = Selection::default();
        self.persist()
    }

    fn persist(&self) -> Result<(), StoreError> {
        self.store.save(&self.selection)
    }
}
