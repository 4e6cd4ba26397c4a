//! The test-run dispatcher -- the orchestration core.
//!
//! Given a category and request parameters, selects the backend, executes
//! one run to completion, normalizes the outcome, and records exactly one
//! row per logical unit of work (per file, per URL, or per invocation).
//! Backend and configuration failures become recorded fail results; only
//! result-store errors propagate to the caller.

pub mod result;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use anyhow::Result;
use tracing::{info, warn};

use crate::backends::{
    local::LocalRunner, nav::HttpNavigator, Navigator, TestCommandRunner,
};
use crate::config::Config;
use crate::plugin::{load_plugins, Plugin};
use crate::report::{ReportData, ReportManager};
use crate::storage::{self, NewRun, Pool};

pub use result::{Category, RunResult, RunStatus};

/// Optional parameters for one dispatch call.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Test file under the category directory (unit/sample).
    pub file: Option<String>,
    /// Caller-supplied label (sample/custom).
    pub name: Option<String>,
    /// Explicit URL (e2e).
    pub url: Option<String>,
}

pub struct Dispatcher {
    pool: Pool,
    config: Arc<RwLock<Config>>,
    plugins: HashMap<String, Arc<dyn Plugin>>,
    plugin_failures: Vec<(String, String)>,
    reports: ReportManager,
    runner: Box<dyn TestCommandRunner>,
    navigator: Box<dyn Navigator>,
}

impl Dispatcher {
    /// Build the dispatcher with production backends. Plugins are resolved
    /// here, once; later dispatches see a fixed set.
    pub fn new(pool: Pool, config: Config) -> Self {
        let loaded = load_plugins(&config.plugins);
        let reports = ReportManager::from_config(&config);
        let runner = Box::new(LocalRunner::from_config(&config));

        Self {
            pool,
            config: Arc::new(RwLock::new(config)),
            plugins: loaded.plugins,
            plugin_failures: loaded.failures,
            reports,
            runner,
            navigator: Box::new(HttpNavigator::default()),
        }
    }

    #[cfg(test)]
    pub fn with_backends(
        pool: Pool,
        config: Config,
        runner: Box<dyn TestCommandRunner>,
        navigator: Box<dyn Navigator>,
    ) -> Self {
        let loaded = load_plugins(&config.plugins);
        let reports = ReportManager::from_config(&config);
        Self {
            pool,
            config: Arc::new(RwLock::new(config)),
            plugins: loaded.plugins,
            plugin_failures: loaded.failures,
            reports,
            runner,
            navigator,
        }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Shared configuration handle (the API's URL management writes here).
    pub fn config_handle(&self) -> Arc<RwLock<Config>> {
        Arc::clone(&self.config)
    }

    /// Plugin entries that failed to resolve at construction, for diagnostics.
    pub fn plugin_failures(&self) -> &[(String, String)] {
        &self.plugin_failures
    }

    /// Execute one test request to completion.
    ///
    /// Every logical unit of work yields exactly one stored row and one
    /// entry in the returned vec, on success and on caught failure alike.
    /// The returned Err is reserved for result-store failures.
    pub async fn run(&self, category: &str, req: RunRequest) -> Result<Vec<RunResult>> {
        info!(%category, file = ?req.file, url = ?req.url, "dispatching test run");

        match category.parse::<Category>() {
            Ok(Category::Unit) => self.run_local(Category::Unit, req).await,
            Ok(Category::Sample) => {
                if req.file.is_some() {
                    self.run_local(Category::Sample, req).await
                } else {
                    let name = req.name.unwrap_or_else(|| "sample_test".to_string());
                    let result = RunResult::pass(Category::Sample.as_str(), name);
                    Ok(vec![self.record(result)?])
                }
            }
            Ok(Category::E2e) => self.run_e2e(req).await,
            Ok(Category::Custom) => self.run_plugin("custom", req),
            Err(_) if self.plugins.contains_key(category) => self.run_plugin(category, req),
            Err(_) => {
                let name = req
                    .name
                    .or(req.file)
                    .or(req.url)
                    .unwrap_or_else(|| category.to_string());
                let result = RunResult::fail(
                    category,
                    name,
                    format!("Unsupported test category: {category}"),
                );
                Ok(vec![self.record(result)?])
            }
        }
    }

    /// unit, and sample-with-file: run the external test command against the
    /// category directory or one file beneath it.
    async fn run_local(&self, category: Category, req: RunRequest) -> Result<Vec<RunResult>> {
        let (dir, default_name) = {
            let config = self.config.read().expect("config lock poisoned");
            match category {
                Category::Sample => (config.paths.sample_dir.clone(), "all_sample_tests"),
                _ => (config.paths.unit_dir.clone(), "all_unit_tests"),
            }
        };

        let (target, name) = match &req.file {
            Some(file) => {
                let path = dir.join(file);
                if !path.exists() {
                    let result = RunResult::fail(
                        category.as_str(),
                        file.clone(),
                        format!("Test file not found: {}", path.display()),
                    );
                    return Ok(vec![self.record(result)?]);
                }
                (path, file.clone())
            }
            None => (dir, default_name.to_string()),
        };

        let result = match self.runner.run(&target).await {
            Ok(outcome) => {
                let status = RunStatus::from_exit_success(outcome.passed);
                let mut result = RunResult {
                    category: category.as_str().to_string(),
                    name,
                    status,
                    error_message: match status {
                        RunStatus::Fail => Some(if outcome.output.is_empty() {
                            "test runner exited with a failure status".to_string()
                        } else {
                            outcome.output.clone()
                        }),
                        RunStatus::Pass => None,
                    },
                    duration: outcome.duration,
                    report_path: None,
                    output: None,
                };
                if !outcome.output.is_empty() {
                    result = result.with_output(outcome.output);
                }
                result
            }
            Err(e) => RunResult::fail(category.as_str(), name, e.to_string()),
        };

        Ok(vec![self.record(result)?])
    }

    /// e2e: check one explicit URL, or every configured URL. Each URL is an
    /// independent unit of work; one failure never aborts the rest.
    async fn run_e2e(&self, req: RunRequest) -> Result<Vec<RunResult>> {
        let urls: Vec<String> = match &req.url {
            Some(url) => {
                // First-use registration of a not-yet-configured URL.
                let mut config = self.config.write().expect("config lock poisoned");
                if let Err(e) = config.register_e2e_url(url) {
                    warn!(%url, error = %e, "could not persist newly seen e2e URL");
                }
                vec![url.clone()]
            }
            None => {
                let config = self.config.read().expect("config lock poisoned");
                config.e2e_urls.clone()
            }
        };

        if urls.is_empty() {
            let result = RunResult::fail(
                Category::E2e.as_str(),
                "all_urls",
                "No E2E test URLs configured",
            );
            return Ok(vec![self.record(result)?]);
        }

        let mut results = Vec::with_capacity(urls.len());
        for url in urls {
            let result = match self.navigator.navigate(&url).await {
                Ok(nav) => {
                    RunResult::pass(Category::E2e.as_str(), &url).with_duration(nav.duration)
                }
                Err(e) => RunResult::fail(Category::E2e.as_str(), &url, e.to_string()),
            };
            results.push(self.record(result)?);
        }

        Ok(results)
    }

    /// custom (and configuration-defined categories): invoke the resolved
    /// plugin for `category`, or record the structured missing-plugin
    /// failure.
    fn run_plugin(&self, category: &str, req: RunRequest) -> Result<Vec<RunResult>> {
        let default_name = || format!("{category}_test");

        let Some(plugin) = self.plugins.get(category) else {
            let message = if category == "custom" {
                "No custom plugin configured".to_string()
            } else {
                format!("No plugin configured for category '{category}'")
            };
            let name = req.name.unwrap_or_else(default_name);
            let result = RunResult::fail(category, name, message);
            return Ok(vec![self.record(result)?]);
        };

        let snapshot = self.config.read().expect("config lock poisoned").clone();
        let start = Instant::now();
        let result = match plugin.run(&snapshot) {
            Ok(outcome) => RunResult {
                category: category.to_string(),
                name: req.name.or(outcome.name).unwrap_or_else(default_name),
                status: outcome.status,
                error_message: outcome.error_message,
                duration: start.elapsed().as_secs_f64(),
                report_path: None,
                output: None,
            },
            Err(e) => RunResult::fail(
                category,
                req.name.unwrap_or_else(default_name),
                e.to_string(),
            )
            .with_duration(start.elapsed().as_secs_f64()),
        };

        Ok(vec![self.record(result)?])
    }

    /// Persist one normalized result, then attempt report generation.
    ///
    /// The row always lands before any writer runs; report failures are
    /// logged per writer and never affect the stored row. The first
    /// successful artifact path is filled into the row and mirrored on the
    /// returned result.
    fn record(&self, result: RunResult) -> Result<RunResult> {
        let is_cloud = self
            .config
            .read()
            .expect("config lock poisoned")
            .cloud
            .enabled;

        let run = storage::insert_run(
            &self.pool,
            NewRun {
                category: result.category.clone(),
                name: result.name.clone(),
                status: result.status,
                duration: result.duration,
                error_message: result.error_message.clone(),
                is_cloud,
            },
        )?;

        let mut result = result;
        // Keep the returned result aligned with the normalized row.
        result.error_message = run.error_message.clone();
        result.duration = run.duration;

        if !self.reports.is_empty() {
            let data = ReportData::from_result(&result, run.created_at);
            let outcomes = self.reports.save_all(&data);
            if let Some(path) = outcomes.iter().find_map(|o| o.result.as_ref().ok()) {
                let path_str = path.to_string_lossy().into_owned();
                storage::set_report_path(&self.pool, run.id, &path_str)?;
                result.report_path = Some(path_str);
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{BackendError, Navigation, RunnerOutcome};
    use crate::storage::{open_memory_pool, query_runs, RunFilter};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeRunner {
        calls: Arc<AtomicUsize>,
        passed: bool,
        output: &'static str,
    }

    #[async_trait::async_trait]
    impl TestCommandRunner for FakeRunner {
        async fn run(&self, _target: &Path) -> Result<RunnerOutcome, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RunnerOutcome {
                passed: self.passed,
                duration: 0.25,
                output: self.output.to_string(),
            })
        }
    }

    struct FakeNavigator {
        calls: Arc<AtomicUsize>,
        /// Substrings of URLs that should fail to navigate.
        failing: Vec<&'static str>,
    }

    #[async_trait::async_trait]
    impl Navigator for FakeNavigator {
        async fn navigate(&self, url: &str) -> Result<Navigation, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.iter().any(|f| url.contains(f)) {
                Err(BackendError::Navigation {
                    url: url.to_string(),
                    message: "net::ERR_NAME_NOT_RESOLVED".to_string(),
                })
            } else {
                Ok(Navigation { duration: 0.1 })
            }
        }
    }

    struct Harness {
        dispatcher: Dispatcher,
        runner_calls: Arc<AtomicUsize>,
        nav_calls: Arc<AtomicUsize>,
        _dir: tempfile::TempDir,
        unit_dir: PathBuf,
    }

    fn harness(mutate: impl FnOnce(&mut Config)) -> Harness {
        harness_with_runner(true, "", mutate)
    }

    fn harness_with_runner(
        runner_passes: bool,
        runner_output: &'static str,
        mutate: impl FnOnce(&mut Config),
    ) -> Harness {
        let dir = tempfile::TempDir::new().unwrap();
        let unit_dir = dir.path().join("unit");
        std::fs::create_dir_all(&unit_dir).unwrap();

        let mut config = Config::default().with_source_path(dir.path().join("qamedic.toml"));
        config.paths.unit_dir = unit_dir.clone();
        config.paths.sample_dir = dir.path().join("sample");
        config.reporting.json = false;
        config.reporting.html = false;
        mutate(&mut config);

        let runner_calls = Arc::new(AtomicUsize::new(0));
        let nav_calls = Arc::new(AtomicUsize::new(0));

        let dispatcher = Dispatcher::with_backends(
            open_memory_pool().unwrap(),
            config,
            Box::new(FakeRunner {
                calls: Arc::clone(&runner_calls),
                passed: runner_passes,
                output: runner_output,
            }),
            Box::new(FakeNavigator {
                calls: Arc::clone(&nav_calls),
                failing: vec!["bad"],
            }),
        );

        Harness {
            dispatcher,
            runner_calls,
            nav_calls,
            _dir: dir,
            unit_dir,
        }
    }

    fn stored(dispatcher: &Dispatcher) -> Vec<crate::storage::TestRun> {
        query_runs(dispatcher.pool(), &RunFilter::default()).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_category_records_one_fail_without_backend() {
        let h = harness(|_| {});
        let results = h.dispatcher.run("bogus", RunRequest::default()).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, RunStatus::Fail);
        assert!(results[0].error_message.as_ref().unwrap().contains("bogus"));

        let rows = stored(&h.dispatcher);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].category, "bogus");
        assert_eq!(h.runner_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.nav_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_unit_file_fails_without_invoking_runner() {
        let h = harness(|_| {});
        let req = RunRequest {
            file: Some("does_not_exist.py".to_string()),
            ..RunRequest::default()
        };
        let results = h.dispatcher.run("unit", req).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, RunStatus::Fail);
        assert!(results[0].error_message.as_ref().unwrap().contains("not found"));
        assert_eq!(h.runner_calls.load(Ordering::SeqCst), 0);
        assert_eq!(stored(&h.dispatcher).len(), 1);
    }

    #[tokio::test]
    async fn test_unit_file_runs_and_passes() {
        let h = harness(|_| {});
        std::fs::write(h.unit_dir.join("test_math.py"), "def test(): pass\n").unwrap();

        let req = RunRequest {
            file: Some("test_math.py".to_string()),
            ..RunRequest::default()
        };
        let results = h.dispatcher.run("unit", req).await.unwrap();

        assert_eq!(results[0].status, RunStatus::Pass);
        assert_eq!(results[0].name, "test_math.py");
        assert!(results[0].duration > 0.0);
        assert_eq!(h.runner_calls.load(Ordering::SeqCst), 1);

        let rows = stored(&h.dispatcher);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].error_message.is_none());
    }

    #[tokio::test]
    async fn test_unit_without_file_targets_directory() {
        let h = harness(|_| {});
        let results = h.dispatcher.run("unit", RunRequest::default()).await.unwrap();

        assert_eq!(results[0].name, "all_unit_tests");
        assert_eq!(h.runner_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_runner_output_becomes_error_message() {
        let h = harness_with_runner(false, "assert 1 == 2\nFAILED test_math.py", |_| {});
        let results = h.dispatcher.run("unit", RunRequest::default()).await.unwrap();

        assert_eq!(results[0].status, RunStatus::Fail);
        assert!(results[0]
            .error_message
            .as_ref()
            .unwrap()
            .contains("assert 1 == 2"));

        let rows = stored(&h.dispatcher);
        assert!(rows[0].error_message.as_ref().unwrap().contains("FAILED"));
    }

    #[tokio::test]
    async fn test_sample_without_file_synthesizes_pass() {
        let h = harness(|_| {});
        let req = RunRequest {
            name: Some("demo".to_string()),
            ..RunRequest::default()
        };
        let results = h.dispatcher.run("sample", req).await.unwrap();

        assert_eq!(results[0].status, RunStatus::Pass);
        assert_eq!(results[0].name, "demo");
        assert_eq!(results[0].duration, 0.0);
        assert_eq!(h.runner_calls.load(Ordering::SeqCst), 0);
        assert_eq!(stored(&h.dispatcher).len(), 1);
    }

    #[tokio::test]
    async fn test_sample_without_file_or_name_uses_placeholder() {
        let h = harness(|_| {});
        let results = h.dispatcher.run("sample", RunRequest::default()).await.unwrap();
        assert_eq!(results[0].name, "sample_test");
    }

    #[tokio::test]
    async fn test_e2e_partial_failure_records_every_url() {
        let h = harness(|config| {
            config.e2e_urls = vec![
                "https://good.example".to_string(),
                "https://bad.example".to_string(),
            ];
        });

        let results = h.dispatcher.run("e2e", RunRequest::default()).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status, RunStatus::Pass);
        assert_eq!(results[1].status, RunStatus::Fail);
        assert!(results[1]
            .error_message
            .as_ref()
            .unwrap()
            .contains("bad.example"));

        let rows = stored(&h.dispatcher);
        assert_eq!(rows.len(), 2);
        assert_eq!(h.nav_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_e2e_without_urls_is_config_error() {
        let h = harness(|_| {});
        let results = h.dispatcher.run("e2e", RunRequest::default()).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, RunStatus::Fail);
        assert!(results[0]
            .error_message
            .as_ref()
            .unwrap()
            .contains("No E2E test URLs configured"));
        assert_eq!(h.nav_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_e2e_explicit_url_is_registered() {
        let h = harness(|_| {});
        let req = RunRequest {
            url: Some("https://new.example".to_string()),
            ..RunRequest::default()
        };
        h.dispatcher.run("e2e", req).await.unwrap();

        let config = h.dispatcher.config_handle();
        let urls = config.read().unwrap().e2e_urls.clone();
        assert_eq!(urls, vec!["https://new.example"]);
    }

    #[tokio::test]
    async fn test_custom_without_plugin_uses_exact_message() {
        let h = harness(|_| {});
        let results = h.dispatcher.run("custom", RunRequest::default()).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].error_message.as_deref(),
            Some("No custom plugin configured")
        );

        let rows = stored(&h.dispatcher);
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].error_message.as_deref(),
            Some("No custom plugin configured")
        );
    }

    #[tokio::test]
    async fn test_custom_plugin_runs_and_passes() {
        let h = harness(|config| {
            config
                .plugins
                .insert("custom".to_string(), "builtin:smoke".to_string());
        });
        let results = h.dispatcher.run("custom", RunRequest::default()).await.unwrap();

        assert_eq!(results[0].status, RunStatus::Pass);
        assert_eq!(results[0].name, "smoke_test");
        assert_eq!(stored(&h.dispatcher).len(), 1);
    }

    #[tokio::test]
    async fn test_configuration_defined_category_dispatches_plugin() {
        let h = harness(|config| {
            config
                .plugins
                .insert("audit".to_string(), "builtin:url-audit".to_string());
        });
        let results = h.dispatcher.run("audit", RunRequest::default()).await.unwrap();

        assert_eq!(results[0].category, "audit");
        assert_eq!(results[0].status, RunStatus::Pass);
    }

    #[tokio::test]
    async fn test_unresolved_plugin_entry_is_reported_and_recoverable() {
        let h = harness(|config| {
            config
                .plugins
                .insert("custom".to_string(), "builtin:no-such".to_string());
        });

        assert_eq!(h.dispatcher.plugin_failures().len(), 1);

        let results = h.dispatcher.run("custom", RunRequest::default()).await.unwrap();
        assert_eq!(
            results[0].error_message.as_deref(),
            Some("No custom plugin configured")
        );
    }

    #[tokio::test]
    async fn test_reports_generated_after_persistence() {
        let dir = tempfile::TempDir::new().unwrap();

        let mut config = Config::default().with_source_path(dir.path().join("qamedic.toml"));
        config.reporting.json = true;
        config.reporting.html = false;
        config.paths.reports_dir = dir.path().join("reports");
        let dispatcher = Dispatcher::with_backends(
            open_memory_pool().unwrap(),
            config,
            Box::new(FakeRunner {
                calls: Arc::new(AtomicUsize::new(0)),
                passed: true,
                output: "",
            }),
            Box::new(FakeNavigator {
                calls: Arc::new(AtomicUsize::new(0)),
                failing: vec![],
            }),
        );

        let results = dispatcher.run("sample", RunRequest::default()).await.unwrap();
        let path = results[0].report_path.as_ref().expect("report path set");
        assert!(Path::new(path).exists());

        let rows = query_runs(dispatcher.pool(), &RunFilter::default()).unwrap();
        assert_eq!(rows[0].report_path.as_deref(), Some(path.as_str()));
    }

    #[tokio::test]
    async fn test_every_category_records_exactly_one_row_per_unit() {
        let h = harness(|config| {
            config.e2e_urls = vec!["https://good.example".to_string()];
        });

        let mut expected = 0usize;
        for (category, req) in [
            ("unit", RunRequest::default()),
            ("e2e", RunRequest::default()),
            ("sample", RunRequest::default()),
            ("custom", RunRequest::default()),
            ("bogus", RunRequest::default()),
        ] {
            let results = h.dispatcher.run(category, req).await.unwrap();
            expected += results.len();
            assert_eq!(stored(&h.dispatcher).len(), expected);
        }
    }
}
