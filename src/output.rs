use std::io::{self, Write};
use std::sync::Mutex;

use crossterm::style::Stylize;
use serde::Serialize;

use crate::app::{AcquireAction, AcquireResult, AcquisitionStatus};
use crate::catalog::Catalog;
use crate::progress::{ProgressEvent, ProgressSink, format_bytes};
use crate::validate::{Metrics, ValidationReport};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Console,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_acquire(result: &AcquireResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_status(status: &AcquisitionStatus) -> io::Result<()> {
        Self::print_json(status)
    }

    pub fn print_validation(reports: &[ValidationReport]) -> io::Result<()> {
        Self::print_json(&reports)
    }

    pub fn print_catalog(catalog: &Catalog) -> io::Result<()> {
        Self::print_json(&catalog.list_all())
    }

    fn print_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

#[derive(Default)]
pub struct ConsoleSink {
    lock: Mutex<()>,
}

impl ProgressSink for ConsoleSink {
    fn event(&self, event: ProgressEvent) {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let stamp = chrono::Local::now().format("%H:%M:%S");
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "{} {}", stamp.to_string().dark_grey(), event.message);
    }
}

pub struct ConsoleOutput;

impl ConsoleOutput {
    pub fn print_acquire(result: &AcquireResult) {
        println!("{}", "KIRA-RD acquisition summary".cyan().bold());
        for outcome in result.datasets.values() {
            let line = format!("{:<8} {}", outcome.id.to_string(), outcome.target.display());
            match outcome.action {
                AcquireAction::Skipped => println!("{} {line}", "= present ".green()),
                AcquireAction::Downloaded => println!("{} {line}", "+ fetched ".cyan()),
                AcquireAction::Failed => {
                    println!("{} {line}", "x failed  ".red());
                    for error in &outcome.errors {
                        println!("           {}", error.as_str().red());
                    }
                }
            }
            if let Some(fetch) = &outcome.fetch {
                for warning in &fetch.warnings {
                    println!("           {}", warning.as_str().yellow());
                }
            }
        }
        println!(
            "{} {}",
            format!("succeeded: {}", result.succeeded).green(),
            format!("failed: {}", result.failed).red()
        );
    }

    pub fn print_status(status: &AcquisitionStatus) {
        println!("{}", "KIRA-RD dataset status".cyan().bold());
        for (id, valid) in &status.datasets {
            let state = if *valid {
                "valid    ".green()
            } else if status.missing_files.contains(id) {
                "missing  ".yellow()
            } else {
                "corrupted".red()
            };
            println!("{state} {id}");
        }
        println!(
            "{}/{} valid, {} missing, {} corrupted",
            status.valid_files,
            status.total_files,
            status.missing_files.len(),
            status.corrupted_files.len()
        );
    }

    pub fn print_validation(reports: &[ValidationReport]) {
        for report in reports {
            let verdict = if report.is_valid {
                "VALID  ".green().bold()
            } else {
                "INVALID".red().bold()
            };
            println!(
                "{verdict} {} ({})",
                report.path.display(),
                format_bytes(report.size_bytes)
            );
            for error in &report.errors {
                println!("  error: {}", error.as_str().red());
            }
            for warning in &report.warnings {
                println!("  warning: {}", warning.as_str().yellow());
            }
            match &report.metrics {
                Some(Metrics::CompressedTabular(metrics)) => {
                    let approx = if metrics.record_count_estimated { "~" } else { "" };
                    println!(
                        "  samples: {}, records: {approx}{}",
                        metrics
                            .sample_count
                            .map(|count| count.to_string())
                            .unwrap_or_else(|| "?".to_string()),
                        metrics.record_count
                    );
                }
                Some(Metrics::RelationalDatabase(metrics)) => {
                    println!(
                        "  tables: {}, compounds: {}, activities: {}",
                        metrics.table_count,
                        metrics.compound_count.unwrap_or(0),
                        metrics.activity_count.unwrap_or(0)
                    );
                }
                None => {}
            }
        }
    }

    pub fn print_catalog(catalog: &Catalog) {
        for descriptor in catalog.list_all() {
            println!(
                "{:<8} {:<20} {} .. {}  {}",
                descriptor.id.to_string(),
                descriptor.kind().to_string(),
                format_bytes(descriptor.expected_size.min),
                format_bytes(descriptor.expected_size.max),
                descriptor.target.display()
            );
        }
    }
}
