//! Report writers -- JSON and HTML artifacts plus the external render tool.
//!
//! Writers are independent: each enabled writer runs for every recorded
//! run, and one writer failing never blocks another. Failures are collected
//! per writer and logged; the underlying result row is always persisted
//! before any writer runs.

pub mod allure;
pub mod html;
pub mod json;
pub mod sanitize;

use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::dispatch::result::{RunResult, RunStatus};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("template rendering failed: {0}")]
    Render(#[from] askama::Error),

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Everything a writer needs about one finished run.
#[derive(Debug, Clone, Serialize)]
pub struct ReportData {
    pub category: String,
    pub name: String,
    pub status: RunStatus,
    pub timestamp: DateTime<Utc>,
    pub duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Captured runner output, attached verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Optional key-value details (request parameters, environment facts).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<(String, String)>,
}

impl ReportData {
    pub fn from_result(result: &RunResult, timestamp: DateTime<Utc>) -> Self {
        Self {
            category: result.category.clone(),
            name: result.name.clone(),
            status: result.status,
            timestamp,
            duration: result.duration,
            error_message: result.error_message.clone(),
            output: result.output.clone(),
            parameters: Vec::new(),
        }
    }
}

/// A single report writer (JSON, HTML, ...).
pub trait ReportWriter: Send + Sync {
    fn kind(&self) -> &'static str;
    fn save(&self, data: &ReportData) -> Result<PathBuf, ReportError>;
    fn output_dir(&self) -> &std::path::Path;
}

/// Result of one writer's attempt for one run.
pub struct ReportOutcome {
    pub writer: &'static str,
    pub result: Result<PathBuf, ReportError>,
}

/// Runs every enabled writer for each finished run.
pub struct ReportManager {
    writers: Vec<Box<dyn ReportWriter>>,
}

impl ReportManager {
    pub fn from_config(config: &Config) -> Self {
        let base = config.effective_reports_dir();
        let mut writers: Vec<Box<dyn ReportWriter>> = Vec::new();

        if config.reporting.json {
            writers.push(Box::new(json::JsonReporter::new(base.clone())));
        }
        if config.reporting.html {
            writers.push(Box::new(html::HtmlReporter::new(base)));
        }

        debug!(writers = writers.len(), "initialized report writers");
        Self { writers }
    }

    #[cfg(test)]
    pub fn with_writers(writers: Vec<Box<dyn ReportWriter>>) -> Self {
        Self { writers }
    }

    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }

    /// Run every writer, collecting per-writer outcomes. A failing writer is
    /// logged and does not affect the others.
    pub fn save_all(&self, data: &ReportData) -> Vec<ReportOutcome> {
        let mut outcomes = Vec::with_capacity(self.writers.len());

        for writer in &self.writers {
            let result = writer.save(data);
            match &result {
                Ok(path) => {
                    info!(writer = writer.kind(), path = %path.display(), "saved report")
                }
                Err(e) => {
                    warn!(writer = writer.kind(), error = %e, "report writer failed")
                }
            }
            outcomes.push(ReportOutcome {
                writer: writer.kind(),
                result,
            });
        }

        outcomes
    }

    /// Delete report files older than `days` in every writer's output
    /// directory. Individual deletion failures are logged and skipped.
    pub fn sweep_old(&self, days: u64) -> usize {
        let cutoff = SystemTime::now() - std::time::Duration::from_secs(days * 24 * 60 * 60);
        let mut removed = 0;

        let mut dirs: Vec<&std::path::Path> = self.writers.iter().map(|w| w.output_dir()).collect();
        dirs.sort();
        dirs.dedup();

        for dir in dirs {
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(_) => continue, // nothing written yet
            };
            for entry in entries.flatten() {
                let path = entry.path();
                let old = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .map(|mtime| mtime < cutoff)
                    .unwrap_or(false);
                if !old || !path.is_file() {
                    continue;
                }
                match std::fs::remove_file(&path) {
                    Ok(()) => {
                        info!(path = %path.display(), "deleted old report");
                        removed += 1;
                    }
                    Err(e) => warn!(path = %path.display(), error = %e, "failed to delete old report"),
                }
            }
        }

        removed
    }
}
