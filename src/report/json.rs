//! JSON artifact writer.

use std::path::{Path, PathBuf};

use super::sanitize::sanitize_filename;
use super::{ReportData, ReportError, ReportWriter};

/// Serializes the full run record (including captured output) to a uniquely
/// named JSON file. The millisecond timestamp keeps rapid successive runs
/// of the same test from colliding.
pub struct JsonReporter {
    output_dir: PathBuf,
}

impl JsonReporter {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }
}

impl ReportWriter for JsonReporter {
    fn kind(&self) -> &'static str {
        "json"
    }

    fn save(&self, data: &ReportData) -> Result<PathBuf, ReportError> {
        std::fs::create_dir_all(&self.output_dir)?;

        let filename = format!(
            "{}_{}_{}.json",
            sanitize_filename(&data.category),
            sanitize_filename(&data.name),
            data.timestamp.format("%Y%m%d_%H%M%S%.3f"),
        );
        let path = self.output_dir.join(filename);

        let content = serde_json::to_string_pretty(data)?;
        std::fs::write(&path, content)?;

        Ok(path)
    }

    fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}
