//! Serializable snapshots of parameter values
//!
//! A snapshot records the value and freeze state of every in-use parameter so
//! that a caller (for example the confidence search) can put the table back
//! exactly as it was.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::error::Result;

/// Value and freeze state of one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub global_index: usize,
    pub full_name: String,
    pub value: f64,
    pub frozen: bool,
}

/// Values of every in-use parameter at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSnapshot {
    pub entries: Vec<SnapshotEntry>,
}

impl ParameterSnapshot {
    /// Value recorded for a global index.
    pub fn value(&self, global_index: usize) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.global_index == global_index)
            .map(|e| e.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize to a JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Save to a JSON file
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path).map_err(|e| format!("cannot create snapshot file: {}", e))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Load from a JSON file
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path).map_err(|e| format!("cannot open snapshot file: {}", e))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}
