//! HTML artifact writer backed by an askama template.

use std::path::{Path, PathBuf};

use askama::Template;

use super::sanitize::sanitize_filename;
use super::{ReportData, ReportError, ReportWriter};
use crate::dispatch::result::RunStatus;

#[derive(Template)]
#[template(path = "report.html")]
struct ReportTemplate {
    name: String,
    category: String,
    status: String,
    status_class: String,
    timestamp: String,
    duration: String,
    has_error: bool,
    error_message: String,
    has_parameters: bool,
    parameters: Vec<Pair>,
    has_output: bool,
    output: String,
}

struct Pair {
    key: String,
    value: String,
}

impl ReportTemplate {
    fn from_data(data: &ReportData) -> Self {
        let status_class = match data.status {
            RunStatus::Pass => "pass",
            RunStatus::Fail => "fail",
        };
        Self {
            name: data.name.clone(),
            category: data.category.clone(),
            status: data.status.to_string(),
            status_class: status_class.to_string(),
            timestamp: data.timestamp.to_rfc3339(),
            duration: format!("{:.2}", data.duration),
            has_error: data.status == RunStatus::Fail && data.error_message.is_some(),
            error_message: data.error_message.clone().unwrap_or_default(),
            has_parameters: !data.parameters.is_empty(),
            parameters: data
                .parameters
                .iter()
                .map(|(k, v)| Pair {
                    key: k.clone(),
                    value: v.clone(),
                })
                .collect(),
            has_output: data.output.is_some(),
            output: data.output.clone().unwrap_or_default(),
        }
    }
}

/// Renders one run into a standalone human-readable document. Optional
/// sections (error details, parameters, captured output) are omitted
/// entirely when absent.
pub struct HtmlReporter {
    output_dir: PathBuf,
}

impl HtmlReporter {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }
}

impl ReportWriter for HtmlReporter {
    fn kind(&self) -> &'static str {
        "html"
    }

    fn save(&self, data: &ReportData) -> Result<PathBuf, ReportError> {
        std::fs::create_dir_all(&self.output_dir)?;

        let filename = format!(
            "{}_{}_{}.html",
            sanitize_filename(&data.category),
            sanitize_filename(&data.name),
            data.timestamp.format("%Y%m%d_%H%M%S%.3f"),
        );
        let path = self.output_dir.join(filename);

        let rendered = ReportTemplate::from_data(data).render()?;
        std::fs::write(&path, rendered)?;

        Ok(path)
    }

    fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}
