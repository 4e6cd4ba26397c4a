//! Execution backends behind trait seams.
//!
//! The dispatcher never raises past its boundary, so every backend is
//! `Result`-shaped: an `Err` here becomes a recorded fail result, not a
//! propagated error.

use std::path::Path;

use thiserror::Error;

pub mod local;
pub mod nav;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to launch test runner '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Outcome of a local test-command invocation. The command completing with
/// a nonzero exit status is a valid outcome (failed tests), not an error.
#[derive(Debug, Clone)]
pub struct RunnerOutcome {
    pub passed: bool,
    pub duration: f64,
    /// Combined stdout + stderr of the runner process.
    pub output: String,
}

/// Runs an external test command against a directory or a single file.
#[async_trait::async_trait]
pub trait TestCommandRunner: Send + Sync {
    async fn run(&self, target: &Path) -> Result<RunnerOutcome, BackendError>;
}

/// A completed page navigation.
#[derive(Debug, Clone)]
pub struct Navigation {
    pub duration: f64,
}

/// Checks that a URL can be navigated to. A completed exchange is a pass
/// regardless of HTTP status; only transport-level failures err.
#[async_trait::async_trait]
pub trait Navigator: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<Navigation, BackendError>;
}
