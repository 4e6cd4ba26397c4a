//! TOML configuration for the qamedic appliance.
//!
//! A single settings file carries the plugin map, the e2e URL list, the
//! reporting toggles, cloud flags, filesystem paths, and the unit-runner
//! command line. Missing file or missing sections fall back to compiled-in
//! defaults. Mutations (URL registration) are persisted back immediately;
//! last writer wins.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Root configuration for the qamedic process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Category name -> plugin implementation reference (e.g. `builtin:smoke`).
    pub plugins: BTreeMap<String, String>,
    /// URLs checked by the e2e category when no explicit URL is given.
    pub e2e_urls: Vec<String>,
    pub reporting: ReportingConfig,
    pub cloud: CloudConfig,
    pub paths: PathsConfig,
    pub runner: RunnerConfig,

    /// Where this config was loaded from; `save` writes back here.
    #[serde(skip)]
    source_path: Option<PathBuf>,
}

/// Which report writers are enabled, and where the external report tool
/// finds its raw results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    pub json: bool,
    pub html: bool,
    /// Passed to the unit runner as `--alluredir` when set, and used as the
    /// input directory for `qamedic report generate`.
    pub allure_results_dir: Option<PathBuf>,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            json: true,
            html: true,
            allure_results_dir: None,
        }
    }
}

/// Hosted-execution flags. `enabled` only marks result rows and relocates
/// writable paths under `temp_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    pub enabled: bool,
    pub temp_dir: PathBuf,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            temp_dir: std::env::temp_dir(),
        }
    }
}

/// Filesystem layout: database, report output, and the directories the
/// unit/sample categories execute against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub database: PathBuf,
    pub reports_dir: PathBuf,
    pub unit_dir: PathBuf,
    pub sample_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("data/qamedic.db"),
            reports_dir: PathBuf::from("reports"),
            unit_dir: PathBuf::from("tests/unit"),
            sample_dir: PathBuf::from("tests/sample"),
        }
    }
}

/// The external test command invoked for unit/sample runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Binary name or path, resolved via `$PATH`.
    pub program: String,
    /// Flags passed before the target directory or file.
    pub args: Vec<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            program: "pytest".to_string(),
            args: vec!["-v".to_string(), "--tb=short".to_string()],
        }
    }
}

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config.source_path = Some(path.to_path_buf());
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Try to load configuration from, in order:
    /// 1. The path specified by the `QAMEDIC_CONFIG` environment variable.
    /// 2. `qamedic.toml` in the working directory.
    /// 3. Fall back to compiled-in defaults (still writable to `qamedic.toml`).
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var("QAMEDIC_CONFIG") {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "QAMEDIC_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local_path = Path::new("qamedic.toml");
        if local_path.exists() {
            match Self::load(local_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %local_path.display(),
                        error = %e,
                        "config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        let mut cfg = Self::default();
        cfg.source_path = Some(local_path.to_path_buf());
        cfg
    }

    /// Persist the current configuration back to its source file.
    pub fn save(&self) -> Result<()> {
        let path = self
            .source_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("qamedic.toml"));
        let content = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write config file: {}", path.display()))?;
        debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Register a URL in the e2e list if not already present.
    /// Returns true (and persists) when the list changed.
    pub fn register_e2e_url(&mut self, url: &str) -> Result<bool> {
        if self.e2e_urls.iter().any(|u| u == url) {
            return Ok(false);
        }
        self.e2e_urls.push(url.to_string());
        self.save()?;
        info!(%url, "registered new e2e URL");
        Ok(true)
    }

    /// Remove a URL from the e2e list. Returns true (and persists) when the
    /// list changed.
    pub fn remove_e2e_url(&mut self, url: &str) -> Result<bool> {
        let before = self.e2e_urls.len();
        self.e2e_urls.retain(|u| u != url);
        if self.e2e_urls.len() == before {
            return Ok(false);
        }
        self.save()?;
        info!(%url, "removed e2e URL");
        Ok(true)
    }

    /// Effective report output directory: relocated under the cloud temp
    /// directory when running hosted.
    pub fn effective_reports_dir(&self) -> PathBuf {
        if self.cloud.enabled {
            self.cloud.temp_dir.join(&self.paths.reports_dir)
        } else {
            self.paths.reports_dir.clone()
        }
    }

    /// Effective database path, relocated like the reports directory.
    pub fn effective_database_path(&self) -> PathBuf {
        if self.cloud.enabled {
            self.cloud.temp_dir.join("qamedic.db")
        } else {
            self.paths.database.clone()
        }
    }

    #[cfg(test)]
    pub fn with_source_path(mut self, path: PathBuf) -> Self {
        self.source_path = Some(path);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = Config::default();

        assert!(cfg.plugins.is_empty());
        assert!(cfg.e2e_urls.is_empty());
        assert!(cfg.reporting.json);
        assert!(cfg.reporting.html);
        assert!(cfg.reporting.allure_results_dir.is_none());
        assert!(!cfg.cloud.enabled);
        assert_eq!(cfg.paths.database, PathBuf::from("data/qamedic.db"));
        assert_eq!(cfg.paths.unit_dir, PathBuf::from("tests/unit"));
        assert_eq!(cfg.paths.sample_dir, PathBuf::from("tests/sample"));
        assert_eq!(cfg.runner.program, "pytest");
    }

    #[test]
    fn test_parse_example_toml() {
        let toml_str = r#"
e2e_urls = ["https://example.com", "https://example.org/login"]

[plugins]
custom = "builtin:smoke"

[reporting]
json = true
html = false
allure_results_dir = "allure-results"

[cloud]
enabled = true
temp_dir = "/tmp/qamedic"

[paths]
database = "qa.db"
reports_dir = "out/reports"
unit_dir = "qa/unit"
sample_dir = "qa/sample"

[runner]
program = "pytest"
args = ["-q"]
"#;

        let cfg: Config = toml::from_str(toml_str).unwrap();

        assert_eq!(cfg.e2e_urls.len(), 2);
        assert_eq!(cfg.plugins.get("custom").unwrap(), "builtin:smoke");
        assert!(cfg.reporting.json);
        assert!(!cfg.reporting.html);
        assert_eq!(
            cfg.reporting.allure_results_dir,
            Some(PathBuf::from("allure-results"))
        );
        assert!(cfg.cloud.enabled);
        assert_eq!(cfg.paths.unit_dir, PathBuf::from("qa/unit"));
        assert_eq!(cfg.runner.args, vec!["-q"]);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
e2e_urls = ["https://example.com"]
"#;
        let cfg: Config = toml::from_str(toml_str).unwrap();

        assert_eq!(cfg.e2e_urls, vec!["https://example.com"]);
        assert!(cfg.reporting.json);
        assert_eq!(cfg.runner.program, "pytest");
    }

    #[test]
    fn test_register_url_persists_and_deduplicates() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("qamedic.toml");
        let mut cfg = Config::default().with_source_path(path.clone());

        assert!(cfg.register_e2e_url("https://example.com").unwrap());
        assert!(!cfg.register_e2e_url("https://example.com").unwrap());
        assert_eq!(cfg.e2e_urls.len(), 1);

        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded.e2e_urls, vec!["https://example.com"]);
    }

    #[test]
    fn test_remove_url_persists() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("qamedic.toml");
        let mut cfg = Config::default().with_source_path(path.clone());

        cfg.register_e2e_url("https://example.com").unwrap();
        assert!(cfg.remove_e2e_url("https://example.com").unwrap());
        assert!(!cfg.remove_e2e_url("https://example.com").unwrap());

        let reloaded = Config::load(&path).unwrap();
        assert!(reloaded.e2e_urls.is_empty());
    }

    #[test]
    fn test_effective_paths_follow_cloud_flag() {
        let mut cfg = Config::default();
        assert_eq!(cfg.effective_reports_dir(), PathBuf::from("reports"));

        cfg.cloud.enabled = true;
        cfg.cloud.temp_dir = PathBuf::from("/tmp/host");
        assert_eq!(
            cfg.effective_reports_dir(),
            PathBuf::from("/tmp/host/reports")
        );
        assert_eq!(
            cfg.effective_database_path(),
            PathBuf::from("/tmp/host/qamedic.db")
        );
    }

    #[test]
    fn test_load_missing_file_errors() {
        let result = Config::load(Path::new("/nonexistent/path/qamedic.toml"));
        assert!(result.is_err());
    }
}
