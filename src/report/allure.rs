//! Wrapper around the external `allure` report tool.
//!
//! The tool renders the raw results the unit runner drops in
//! `allure_results_dir`. A missing binary is a distinct condition from a
//! failed generation so the CLI can tell the user to install it.

use std::path::Path;
use std::process::Command;

use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum RenderToolError {
    #[error("allure is not installed or not on PATH")]
    NotInstalled,

    #[error("allure exited with {status}: {stderr}")]
    Failed { status: i32, stderr: String },

    #[error(transparent)]
    Io(std::io::Error),
}

fn run_allure(args: &[&std::ffi::OsStr]) -> Result<(), RenderToolError> {
    let output = Command::new("allure").args(args).output().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RenderToolError::NotInstalled
        } else {
            RenderToolError::Io(e)
        }
    })?;

    if !output.status.success() {
        return Err(RenderToolError::Failed {
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    Ok(())
}

/// Whether the allure binary is reachable on PATH.
pub fn is_available() -> bool {
    Command::new("allure").arg("--version").output().is_ok()
}

/// Render the raw results in `results_dir` into `output_dir`.
pub fn generate(results_dir: &Path, output_dir: &Path) -> Result<(), RenderToolError> {
    info!(results = %results_dir.display(), output = %output_dir.display(), "generating allure report");
    run_allure(&[
        "generate".as_ref(),
        results_dir.as_os_str(),
        "--clean".as_ref(),
        "-o".as_ref(),
        output_dir.as_os_str(),
    ])
}

/// Serve the raw results interactively; blocks until the tool exits.
pub fn serve(results_dir: &Path) -> Result<(), RenderToolError> {
    info!(results = %results_dir.display(), "serving allure report");
    run_allure(&["serve".as_ref(), results_dir.as_os_str()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_installed_is_distinguishable() {
        // When allure is absent the error must name installation, not a
        // generation failure. Skip on machines that have it.
        if is_available() {
            return;
        }
        let err = generate(Path::new("allure-results"), Path::new("allure-report")).unwrap_err();
        assert!(matches!(err, RenderToolError::NotInstalled));
    }
}
