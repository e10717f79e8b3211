//! Progress file for resuming an interrupted run.
//!
//! After each successful document the set of completed standard numbers is
//! rewritten to `processing_progress.json`:
//!
//! ```json
//! { "completed_standards": [1, 2, 5], "last_updated": "2026-03-01T10:00:00+03:00", "total_completed": 3 }
//! ```
//!
//! A missing or unreadable file is treated as an empty set.

use crate::error::WriteError;
use crate::pipeline::write::write_json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Serialize, Deserialize)]
struct ProgressFile {
    #[serde(default)]
    completed_standards: Vec<u32>,
    #[serde(default)]
    last_updated: Option<String>,
    #[serde(default)]
    total_completed: usize,
}

/// Completed standard numbers, persisted after every change.
#[derive(Debug)]
pub struct Checkpoint {
    path: PathBuf,
    completed: BTreeSet<u32>,
}

impl Checkpoint {
    /// Load from `path`; missing or corrupt files yield an empty checkpoint.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let completed = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<ProgressFile>(&content) {
                Ok(file) => file.completed_standards.into_iter().collect(),
                Err(e) => {
                    warn!("Could not parse progress file {}: {}", path.display(), e);
                    BTreeSet::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeSet::new(),
            Err(e) => {
                warn!("Could not read progress file {}: {}", path.display(), e);
                BTreeSet::new()
            }
        };
        if !completed.is_empty() {
            info!(
                "Progress file lists {} completed standard(s)",
                completed.len()
            );
        }
        Self { path, completed }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, index: u32) -> bool {
        self.completed.contains(&index)
    }

    pub fn len(&self) -> usize {
        self.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }

    /// Record `index` as complete and rewrite the file.
    pub async fn mark_completed(&mut self, index: u32) -> Result<(), WriteError> {
        self.completed.insert(index);
        let file = ProgressFile {
            completed_standards: self.completed.iter().copied().collect(),
            last_updated: Some(chrono::Local::now().to_rfc3339()),
            total_completed: self.completed.len(),
        };
        write_json(&file, &self.path).await?;
        Ok(())
    }
}
