//! Local test runner -- spawns the configured test command as a subprocess.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::debug;

use super::{BackendError, RunnerOutcome, TestCommandRunner};
use crate::config::Config;

/// Subprocess wrapper around the configured test command (pytest by
/// default). Exit status 0 maps to pass; combined output is captured so a
/// failing run can attach it.
pub struct LocalRunner {
    program: String,
    args: Vec<String>,
    allure_results_dir: Option<PathBuf>,
}

impl LocalRunner {
    pub fn from_config(config: &Config) -> Self {
        Self {
            program: config.runner.program.clone(),
            args: config.runner.args.clone(),
            allure_results_dir: config.reporting.allure_results_dir.clone(),
        }
    }

    #[cfg(test)]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            allure_results_dir: None,
        }
    }
}

#[async_trait::async_trait]
impl TestCommandRunner for LocalRunner {
    async fn run(&self, target: &Path) -> Result<RunnerOutcome, BackendError> {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.allure_results_dir {
            cmd.arg("--alluredir").arg(dir);
        }
        cmd.arg(target);

        debug!(program = %self.program, target = %target.display(), "launching test runner");

        let start = Instant::now();
        let output = cmd.output().await.map_err(|e| BackendError::Launch {
            program: self.program.clone(),
            source: e,
        })?;
        let duration = start.elapsed().as_secs_f64();

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.stderr.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&String::from_utf8_lossy(&output.stderr));
        }

        Ok(RunnerOutcome {
            passed: output.status.success(),
            duration,
            output: text,
        })
    }
}
