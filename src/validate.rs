use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::catalog::{DatasetDescriptor, StructuralChecks};
use crate::database::{self, DatabaseMetrics};
use crate::domain::{SizeCheck, ValidationKind};
use crate::progress::format_bytes;
use crate::tabular::{self, TabularMetrics};

pub const MISSING_FILE: &str = "File does not exist";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Metrics {
    CompressedTabular(TabularMetrics),
    RelationalDatabase(DatabaseMetrics),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub path: PathBuf,
    pub dataset: Option<String>,
    pub kind: Option<ValidationKind>,
    pub is_valid: bool,
    pub size_bytes: u64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub metrics: Option<Metrics>,
}

impl ValidationReport {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            dataset: None,
            kind: None,
            is_valid: false,
            size_bytes: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            metrics: None,
        }
    }

    pub fn missing(path: &Path) -> Self {
        let mut report = Self::new(path);
        report.error(MISSING_FILE);
        report.finalize()
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn is_missing(&self) -> bool {
        self.size_bytes == 0 && self.errors.len() == 1 && self.errors[0] == MISSING_FILE
    }

    pub fn finalize(mut self) -> Self {
        self.is_valid = self.errors.is_empty();
        self
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Validator;

impl Validator {
    pub fn validate(&self, path: &Path, descriptor: &DatasetDescriptor) -> ValidationReport {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(_) => {
                let mut report = ValidationReport::missing(path);
                report.dataset = Some(descriptor.id.to_string());
                report.kind = Some(descriptor.kind());
                return report;
            }
        };

        let mut report = ValidationReport::new(path);
        report.dataset = Some(descriptor.id.to_string());
        report.kind = Some(descriptor.kind());
        if !metadata.is_file() {
            report.error("Path is not a regular file");
            return report.finalize();
        }
        report.size_bytes = metadata.len();

        let range = descriptor.expected_size;
        match range.check(report.size_bytes) {
            SizeCheck::Below => report.error(format!(
                "File too small: {} bytes ({}) is below the expected minimum of {} bytes ({})",
                report.size_bytes,
                format_bytes(report.size_bytes),
                range.min,
                format_bytes(range.min)
            )),
            SizeCheck::Above => report.warn(format!(
                "File larger than expected: {} bytes ({}) exceeds the expected maximum of {} bytes ({})",
                report.size_bytes,
                format_bytes(report.size_bytes),
                range.max,
                format_bytes(range.max)
            )),
            SizeCheck::Within => {}
        }

        match &descriptor.checks {
            StructuralChecks::CompressedTabular(checks) => {
                let metrics = tabular::inspect(path, report.size_bytes, checks, &mut report);
                report.metrics = metrics.map(Metrics::CompressedTabular);
            }
            StructuralChecks::RelationalDatabase(checks) => {
                let metrics = database::inspect(path, checks, &mut report);
                report.metrics = metrics.map(Metrics::RelationalDatabase);
            }
        }

        let report = report.finalize();
        if report.is_valid {
            info!(dataset = %descriptor.id, path = %path.display(), "validation passed");
        } else {
            debug!(dataset = %descriptor.id, errors = ?report.errors, "validation failed");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_report_shape() {
        let report = ValidationReport::missing(Path::new("/nope/chr1.vcf.gz"));
        assert!(!report.is_valid);
        assert_eq!(report.size_bytes, 0);
        assert_eq!(report.errors, vec![MISSING_FILE.to_string()]);
        assert!(report.is_missing());
    }

    #[test]
    fn warnings_do_not_flip_validity() {
        let mut report = ValidationReport::new(Path::new("x"));
        report.warn("big");
        let report = report.finalize();
        assert!(report.is_valid);
    }
}
