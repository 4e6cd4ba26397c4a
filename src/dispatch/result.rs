//! Normalized run outcome types shared by the dispatcher, store, and
//! report writers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The fixed test categories. Configuration may define further categories
/// by mapping a plugin under another name; those travel as plain strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Unit,
    E2e,
    Sample,
    Custom,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Unit => "unit",
            Category::E2e => "e2e",
            Category::Sample => "sample",
            Category::Custom => "custom",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown test category: {0}")]
pub struct UnknownCategory(pub String);

impl std::str::FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unit" => Ok(Category::Unit),
            "e2e" => Ok(Category::E2e),
            "sample" => Ok(Category::Sample),
            "custom" => Ok(Category::Custom),
            other => Err(UnknownCategory(other.to_string())),
        }
    }
}

/// Final status of a concluded run. There is no partial or pending state;
/// a run is only recorded once it has concluded, and error termination
/// maps to Fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pass,
    Fail,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pass => "pass",
            RunStatus::Fail => "fail",
        }
    }

    pub fn from_exit_success(success: bool) -> Self {
        if success {
            RunStatus::Pass
        } else {
            RunStatus::Fail
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown run status: {0}")]
pub struct UnknownStatus(String);

impl std::str::FromStr for RunStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pass" => Ok(RunStatus::Pass),
            "fail" => Ok(RunStatus::Fail),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// The normalized outcome of one unit of work, before persistence.
///
/// One uniform shape for every category; only which optional fields are
/// populated varies. `output` carries captured runner text into report
/// artifacts but is not persisted in the result row.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub category: String,
    pub name: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl RunResult {
    pub fn pass(category: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
            status: RunStatus::Pass,
            error_message: None,
            duration: 0.0,
            report_path: None,
            output: None,
        }
    }

    pub fn fail(
        category: impl Into<String>,
        name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
            status: RunStatus::Fail,
            error_message: Some(error.into()),
            duration: 0.0,
            report_path: None,
            output: None,
        }
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = seconds;
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }
}
