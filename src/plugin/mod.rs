//! Custom-plugin contract and loader.
//!
//! Configuration maps a category name to an implementation reference
//! (`builtin:<name>`). References resolve against a registry populated at
//! startup; a reference that fails to resolve is logged and omitted, never
//! fatal -- dispatching to a missing plugin later yields a structured
//! failure instead.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::dispatch::result::RunStatus;

/// Outcome returned by a plugin's single-method contract.
#[derive(Debug, Clone)]
pub struct PluginOutcome {
    /// Name for the result row; falls back to the caller-supplied or
    /// category-derived name when absent.
    pub name: Option<String>,
    pub status: RunStatus,
    pub error_message: Option<String>,
}

impl PluginOutcome {
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            status: RunStatus::Pass,
            error_message: None,
        }
    }

    pub fn fail(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            status: RunStatus::Fail,
            error_message: Some(error.into()),
        }
    }
}

/// The single-method plugin contract.
pub trait Plugin: Send + Sync {
    fn run(&self, config: &Config) -> Result<PluginOutcome>;
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("unsupported reference '{0}', expected builtin:<name>")]
    UnsupportedReference(String),

    #[error("no builtin plugin named '{0}'")]
    UnknownBuiltin(String),
}

/// Plugins resolved from configuration, plus the per-entry failures kept
/// for diagnostics.
pub struct LoadedPlugins {
    pub plugins: HashMap<String, Arc<dyn Plugin>>,
    pub failures: Vec<(String, String)>,
}

impl LoadedPlugins {
    pub fn empty() -> Self {
        Self {
            plugins: HashMap::new(),
            failures: Vec::new(),
        }
    }
}

/// Resolve a configured `{category: reference}` mapping into live plugin
/// instances. Bad entries are collected and logged; the load itself never
/// fails.
pub fn load_plugins(mapping: &BTreeMap<String, String>) -> LoadedPlugins {
    let mut loaded = LoadedPlugins::empty();

    for (name, reference) in mapping {
        match resolve(reference) {
            Ok(plugin) => {
                info!(%name, %reference, "loaded plugin");
                loaded.plugins.insert(name.clone(), plugin);
            }
            Err(e) => {
                warn!(%name, %reference, error = %e, "could not load plugin");
                loaded.failures.push((name.clone(), e.to_string()));
            }
        }
    }

    loaded
}

fn resolve(reference: &str) -> Result<Arc<dyn Plugin>, ResolveError> {
    let builtin = reference
        .strip_prefix("builtin:")
        .ok_or_else(|| ResolveError::UnsupportedReference(reference.to_string()))?;

    match builtin {
        "smoke" => Ok(Arc::new(SmokePlugin)),
        "url-audit" => Ok(Arc::new(UrlAuditPlugin)),
        other => Err(ResolveError::UnknownBuiltin(other.to_string())),
    }
}

/// Trivial always-pass plugin, the reference implementation of the contract.
pub struct SmokePlugin;

impl Plugin for SmokePlugin {
    fn run(&self, _config: &Config) -> Result<PluginOutcome> {
        info!("running smoke plugin");
        Ok(PluginOutcome::pass("smoke_test"))
    }
}

/// Checks that every configured e2e URL carries an http(s) scheme.
pub struct UrlAuditPlugin;

impl Plugin for UrlAuditPlugin {
    fn run(&self, config: &Config) -> Result<PluginOutcome> {
        let malformed: Vec<&str> = config
            .e2e_urls
            .iter()
            .filter(|u| !u.starts_with("http://") && !u.starts_with("https://"))
            .map(|u| u.as_str())
            .collect();

        if malformed.is_empty() {
            Ok(PluginOutcome::pass("url_audit"))
        } else {
            Ok(PluginOutcome::fail(
                "url_audit",
                format!("URLs without http(s) scheme: {}", malformed.join(", ")),
            ))
        }
    }
}
