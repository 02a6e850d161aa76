//! Key statistics file.
//!
//! `key_stats.json` is one flat JSON object shared by several producers
//! (the statistics step, the last-update stamp). Every write merges: keys
//! given are added or replaced, all other keys are kept.

use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StatsError;
use crate::output::write_atomic;

pub const KEY_STATS_FILE: &str = "key_stats.json";

/// Handle on a key statistics file.
pub struct KeyStatsStore {
    path: PathBuf,
}

impl KeyStatsStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Store at `<dir>/key_stats.json`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(KEY_STATS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current contents. A missing file is an empty object.
    pub fn load(&self) -> Result<Map<String, Value>, StatsError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str(&content)? {
            Value::Object(map) => Ok(map),
            _ => Err(StatsError::NotAnObject(self.path.clone())),
        }
    }

    /// Merge `entries` into the file and return the merged object.
    pub fn merge(&self, entries: Map<String, Value>) -> Result<Map<String, Value>, StatsError> {
        let mut stats = self.load()?;
        stats.extend(entries);
        write_atomic(&self.path, &serde_json::to_vec(&stats)?)?;
        Ok(stats)
    }

    pub fn set(&self, key: &str, value: Value) -> Result<Map<String, Value>, StatsError> {
        let mut entries = Map::new();
        entries.insert(key.to_string(), value);
        self.merge(entries)
    }
}
