//! Progress status file polled by external dashboards.

use serde::{Deserialize, Serialize};

use std::path::PathBuf;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::{BenchError, BenchResult, write_json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Starting,
    Running,
    Reporting,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub timestamp: String,
    pub status: SessionState,
    pub current_tool: Option<String>,
    pub progress_percent: f64,
    pub pid: u32,
}

#[derive(Debug, Clone)]
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Overwrites the status file. A write failure is logged and otherwise ignored.
    pub fn update(&self, status: SessionState, current_tool: Option<&str>, progress_percent: f64) {
        let update = StatusUpdate {
            timestamp: now_rfc3339(),
            status,
            current_tool: current_tool.map(str::to_string),
            progress_percent: progress_percent.clamp(0.0, 100.0),
            pid: std::process::id(),
        };
        if let Err(err) = write_json(&self.path, &update) {
            tracing::warn!("failed to update status file {}: {err}", self.path.display());
        }
    }

    pub fn read(&self) -> BenchResult<StatusUpdate> {
        let bytes = std::fs::read(&self.path).map_err(|e| {
            BenchError::Config(format!(
                "no status file at {}: {e}",
                self.path.display()
            ))
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string())
}
