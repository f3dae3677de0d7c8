//! On-disk download counter.
//!
//! A tiny JSON file next to the cookie store. A missing or corrupt file
//! resets the counter to zero rather than failing.

use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub total_downloads: u64,
    pub last_updated: String,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            total_downloads: 0,
            last_updated: Utc::now().to_rfc3339(),
        }
    }
}

pub struct StatsStore {
    path: PathBuf,
}

impl StatsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> Stats {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Stats file unreadable, resetting: {}", e);
                Stats::default()
            }),
            Err(_) => Stats::default(),
        }
    }

    /// Bump the counter and return the new total.
    pub fn increment(&self) -> u64 {
        let mut stats = self.load();
        stats.total_downloads += 1;
        stats.last_updated = Utc::now().to_rfc3339();

        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(&stats) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.path, json) {
                    warn!("Failed to write stats file: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize stats: {}", e),
        }

        stats.total_downloads
    }
}
