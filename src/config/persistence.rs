//! Results persistence module
//!
//! Handles saving, loading, and rotation of run summaries.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::models::RunSummary;
use crate::{NetOrbError, Result, APP_NAME, MAX_RESULTS_HISTORY, RESULTS_FILE};

/// Run history storage
#[derive(Debug)]
pub struct ResultsStorage {
    results_path: PathBuf,
}

/// History file structure for JSON persistence
#[derive(Debug, Serialize, Deserialize)]
struct ResultsFile {
    version: u32,
    results: Vec<RunSummary>,
}

impl ResultsStorage {
    /// Storage at the standard location
    pub fn new() -> Result<Self> {
        Ok(Self {
            results_path: Self::results_file_path()?,
        })
    }

    /// Storage backed by an explicit file
    pub fn at(results_path: impl Into<PathBuf>) -> Self {
        Self {
            results_path: results_path.into(),
        }
    }

    /// `$DATA_HOME/netorb/history.json`
    pub fn results_file_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir().ok_or_else(|| {
            NetOrbError::PersistenceError("Unable to determine data directory".to_string())
        })?;

        Ok(data_dir.join(APP_NAME).join(RESULTS_FILE))
    }

    /// Load every stored summary, oldest first
    pub fn load_results(&self) -> Result<Vec<RunSummary>> {
        if !self.results_path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.results_path).map_err(|e| {
            NetOrbError::PersistenceError(format!(
                "Failed to read history file {}: {}",
                self.results_path.display(),
                e
            ))
        })?;

        let results_file: ResultsFile = serde_json::from_str(&content).map_err(|e| {
            NetOrbError::PersistenceError(format!(
                "Failed to parse history file {}: {}",
                self.results_path.display(),
                e
            ))
        })?;

        Ok(results_file.results)
    }

    /// Append a summary, keeping only the newest `MAX_RESULTS_HISTORY`
    pub fn append_result(&self, result: RunSummary) -> Result<()> {
        let mut results = self.load_results()?;
        results.push(result);

        if results.len() > MAX_RESULTS_HISTORY {
            let skip_count = results.len() - MAX_RESULTS_HISTORY;
            results.drain(..skip_count);
        }

        self.save_results(results)
    }

    fn save_results(&self, results: Vec<RunSummary>) -> Result<()> {
        if let Some(parent) = self.results_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                NetOrbError::PersistenceError(format!(
                    "Failed to create history directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let content = serde_json::to_string_pretty(&ResultsFile { version: 1, results })?;

        fs::write(&self.results_path, content).map_err(|e| {
            NetOrbError::PersistenceError(format!(
                "Failed to write history file {}: {}",
                self.results_path.display(),
                e
            ))
        })?;

        Ok(())
    }

    pub fn count_results(&self) -> Result<usize> {
        Ok(self.load_results()?.len())
    }

    pub fn clear_results(&self) -> Result<()> {
        if self.results_path.exists() {
            fs::remove_file(&self.results_path)?;
        }
        Ok(())
    }

    /// The newest `count` summaries, oldest first
    pub fn get_recent_results(&self, count: usize) -> Result<Vec<RunSummary>> {
        let mut results = self.load_results()?;
        if results.len() > count {
            results.drain(..results.len() - count);
        }
        Ok(results)
    }

    pub fn path(&self) -> &Path {
        &self.results_path
    }
}
