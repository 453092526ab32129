//! Rolling log of client-side failures, capped so it never grows unbounded.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CAPACITY: usize = 50;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub occurred_at: DateTime<Utc>,
    pub context: String,
    pub message: String,
    pub correlation_id: Option<String>,
}

impl ErrorEntry {
    pub fn new(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            occurred_at: Utc::now(),
            context: context.into(),
            message: message.into(),
            correlation_id: None,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum ErrorLogError {
    #[error("could not write error log `{path}`: {source}")]
    Write { path: PathBuf, source: std::io::Error },
    #[error("could not encode error log: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorLog {
    capacity: usize,
    entries: VecDeque<ErrorEntry>,
}

impl Default for ErrorLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl ErrorLog {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, entries: VecDeque::with_capacity(capacity) }
    }

    /// Reads a persisted log. A missing or corrupt file starts a fresh log.
    pub fn load(path: &Path, capacity: usize) -> Self {
        let mut log = Self::with_capacity(capacity);
        let entries = fs::read_to_string(path)
            .ok()
            .and_then(|raw| serde_json::from_str::<Vec<ErrorEntry>>(&raw).ok())
            .unwrap_or_default();
        for entry in entries {
            log.push(entry);
        }
        log
    }

    pub fn save(&self, path: &Path) -> Result<(), ErrorLogError> {
        let encoded = serde_json::to_string_pretty(&self.entries)?;
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|source| ErrorLogError::Write { path: path.to_path_buf(), source })?;
        }
        fs::write(path, encoded)
            .map_err(|source| ErrorLogError::Write { path: path.to_path_buf(), source })
    }

    pub fn push(&mut self, entry: ErrorEntry) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &ErrorEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::{ErrorEntry, ErrorLog, DEFAULT_CAPACITY};

    #[test]
    fn log_keeps_only_the_newest_entries() {
        let mut log = ErrorLog::default();
        for index in 0..(DEFAULT_CAPACITY + 7) {
            log.push(ErrorEntry::new("test", format!("failure {index}")));
        }

        assert_eq!(log.len(), DEFAULT_CAPACITY);
        assert_eq!(log.entries().next().map(|e| e.message.as_str()), Some("failure 7"));
    }

    #[test]
    fn persisted_log_survives_reload_and_is_recapped() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("logs/errors.json");

        let mut log = ErrorLog::with_capacity(10);
        for index in 0..10 {
            log.push(ErrorEntry::new("cli", format!("e{index}")).with_correlation_id("c-1"));
        }
        log.save(&path).expect("save");

        let reloaded = ErrorLog::load(&path, 4);
        let messages: Vec<_> = reloaded.entries().map(|e| e.message.clone()).collect();
        assert_eq!(messages, vec!["e6", "e7", "e8", "e9"]);
    }

    #[test]
    fn corrupt_file_starts_fresh() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("errors.json");
        std::fs::write(&path, "not json").expect("write");

        assert!(ErrorLog::load(&path, DEFAULT_CAPACITY).is_empty());
    }
}
