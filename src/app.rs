use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, mpsc};
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::{Catalog, DatasetDescriptor};
use crate::domain::DatasetId;
use crate::error::KiraError;
use crate::extract::{self, ExtractSummary};
use crate::fetch::{FetchResult, Fetcher, RetryPolicy};
use crate::http::Transport;
use crate::progress::{DEFAULT_REPORT_INTERVAL, ProgressEvent, ProgressSink};
use crate::space::{DiskSpaceGuard, FreeSpace};
use crate::store;
use crate::validate::{ValidationReport, Validator};

#[derive(Debug, Clone, Copy)]
pub struct AcquireOptions {
    pub force: bool,
    pub workers: usize,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            force: false,
            workers: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AcquireAction {
    Skipped,
    Downloaded,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetOutcome {
    pub id: DatasetId,
    pub action: AcquireAction,
    pub target: PathBuf,
    pub fetch: Option<FetchResult>,
    pub extract: Option<ExtractSummary>,
    pub validation: Option<ValidationReport>,
    pub errors: Vec<String>,
}

impl DatasetOutcome {
    fn new(descriptor: &DatasetDescriptor) -> Self {
        Self {
            id: descriptor.id,
            action: AcquireAction::Failed,
            target: descriptor.target.clone(),
            fetch: None,
            extract: None,
            validation: None,
            errors: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.action != AcquireAction::Failed
    }

    fn fail(mut self, error: impl Into<String>) -> Self {
        self.action = AcquireAction::Failed;
        self.errors.push(error.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AcquireResult {
    pub datasets: BTreeMap<DatasetId, DatasetOutcome>,
    pub succeeded: usize,
    pub failed: usize,
}

impl AcquireResult {
    fn from_outcomes(outcomes: Vec<DatasetOutcome>) -> Self {
        let succeeded = outcomes.iter().filter(|outcome| outcome.succeeded()).count();
        let failed = outcomes.len() - succeeded;
        Self {
            datasets: outcomes
                .into_iter()
                .map(|outcome| (outcome.id, outcome))
                .collect(),
            succeeded,
            failed,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AcquisitionStatus {
    pub datasets: BTreeMap<DatasetId, bool>,
    pub total_files: usize,
    pub valid_files: usize,
    pub missing_files: Vec<DatasetId>,
    pub corrupted_files: Vec<DatasetId>,
    pub checked_at: String,
}

impl AcquisitionStatus {
    pub fn is_complete(&self) -> bool {
        self.valid_files == self.total_files
    }
}

pub struct App<T: Transport, F: FreeSpace> {
    catalog: Catalog,
    transport: T,
    free_space: F,
    retry: RetryPolicy,
    progress_interval: Duration,
    validator: Validator,
}

impl<T: Transport, F: FreeSpace> App<T, F> {
    pub fn new(catalog: Catalog, transport: T, free_space: F) -> Self {
        Self {
            catalog,
            transport,
            free_space,
            retry: RetryPolicy::default(),
            progress_interval: DEFAULT_REPORT_INTERVAL,
            validator: Validator,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn acquire(
        &self,
        ids: &[String],
        options: AcquireOptions,
        sink: &dyn ProgressSink,
    ) -> Result<AcquireResult, KiraError> {
        let descriptors = self.resolve_targets(ids)?;
        sink.event(ProgressEvent::message(format!(
            "phase=Resolve; {} dataset(s) requested",
            descriptors.len()
        )));

        let outcomes = if options.workers > 1 && descriptors.len() > 1 {
            self.run_pool(descriptors, options, sink)
        } else {
            descriptors
                .into_iter()
                .map(|descriptor| self.acquire_one(descriptor, options.force, sink))
                .collect()
        };

        let result = AcquireResult::from_outcomes(outcomes);
        info!(
            succeeded = result.succeeded,
            failed = result.failed,
            "acquisition finished"
        );
        Ok(result)
    }

    pub fn status(&self) -> AcquisitionStatus {
        let mut datasets = BTreeMap::new();
        let mut missing_files = Vec::new();
        let mut corrupted_files = Vec::new();
        let mut valid_files = 0usize;

        for descriptor in self.catalog.list_all() {
            let valid = if !descriptor.target.exists() {
                missing_files.push(descriptor.id);
                false
            } else if self.validator.validate(&descriptor.target, descriptor).is_valid {
                valid_files += 1;
                true
            } else {
                corrupted_files.push(descriptor.id);
                false
            };
            datasets.insert(descriptor.id, valid);
        }

        AcquisitionStatus {
            total_files: datasets.len(),
            datasets,
            valid_files,
            missing_files,
            corrupted_files,
            checked_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn validate(&self, path: &Path) -> ValidationReport {
        let descriptor = self.catalog.best_match(path);
        if !path.exists() {
            let mut report = ValidationReport::missing(path);
            if let Some(descriptor) = descriptor {
                report.dataset = Some(descriptor.id.to_string());
                report.kind = Some(descriptor.kind());
            }
            return report;
        }
        match descriptor {
            Some(descriptor) => self.validator.validate(path, descriptor),
            None => {
                let mut report = ValidationReport::new(path);
                report.size_bytes = store::file_size(path).unwrap_or(0);
                report.error(format!(
                    "No dataset descriptor matches {}",
                    path.display()
                ));
                report.finalize()
            }
        }
    }

    pub fn validate_many(&self, paths: &[PathBuf]) -> Vec<ValidationReport> {
        paths.iter().map(|path| self.validate(path)).collect()
    }

    fn resolve_targets(&self, ids: &[String]) -> Result<Vec<&DatasetDescriptor>, KiraError> {
        if ids.is_empty() {
            return Ok(self.catalog.list_all().iter().collect());
        }
        let mut seen = BTreeSet::new();
        let mut descriptors = Vec::new();
        for name in ids {
            let descriptor = self.catalog.resolve(name)?;
            if seen.insert(descriptor.id) {
                descriptors.push(descriptor);
            }
        }
        Ok(descriptors)
    }

    fn run_pool(
        &self,
        descriptors: Vec<&DatasetDescriptor>,
        options: AcquireOptions,
        sink: &dyn ProgressSink,
    ) -> Vec<DatasetOutcome> {
        let workers = options.workers.min(descriptors.len());
        let queue = Mutex::new(VecDeque::from(descriptors));
        let (tx, rx) = mpsc::channel();

        thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let queue = &queue;
                scope.spawn(move || {
                    loop {
                        let next = match queue.lock() {
                            Ok(mut pending) => pending.pop_front(),
                            Err(_) => None,
                        };
                        let Some(descriptor) = next else {
                            break;
                        };
                        let outcome = self.acquire_one(descriptor, options.force, sink);
                        if tx.send(outcome).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);
            rx.iter().collect()
        })
    }

    fn acquire_one(
        &self,
        descriptor: &DatasetDescriptor,
        force: bool,
        sink: &dyn ProgressSink,
    ) -> DatasetOutcome {
        let id = descriptor.id;
        let mut outcome = DatasetOutcome::new(descriptor);

        if descriptor.target.exists() {
            let existing = self.validator.validate(&descriptor.target, descriptor);
            if existing.is_valid && !force {
                info!(dataset = %id, "valid file present, skipping download");
                sink.event(ProgressEvent::message(format!(
                    "phase=Verify; {id}: already present and valid"
                )));
                outcome.action = AcquireAction::Skipped;
                outcome.validation = Some(existing);
                return outcome;
            }
            if !existing.is_valid {
                warn!(dataset = %id, errors = ?existing.errors, "existing file is invalid, re-fetching");
                sink.event(ProgressEvent::message(format!(
                    "phase=Verify; {id}: existing file invalid ({}), re-fetching",
                    existing.errors.join("; ")
                )));
                if let Err(err) = store::remove_if_exists(&descriptor.target) {
                    return outcome.fail(err.to_string());
                }
            }
        }

        sink.event(ProgressEvent::message(format!(
            "phase=Prepare; {id}: checking disk space"
        )));
        let guard = DiskSpaceGuard::new(&self.free_space);
        let download_path = descriptor.download_path();
        let required = descriptor.required_space();
        let margin = descriptor.space_margin();
        if !guard.check_available(download_path, required, margin, sink) {
            let err = KiraError::InsufficientSpace {
                required: required.saturating_add(margin),
                available: guard.available(download_path).unwrap_or(0),
            };
            warn!(dataset = %id, error = %err, "skipping dataset");
            return outcome.fail(err.to_string());
        }

        sink.event(ProgressEvent::message(format!("phase=Download; {id}")));
        let fetch = Fetcher::new(&self.transport, self.retry)
            .with_report_interval(self.progress_interval)
            .fetch(descriptor, sink);
        let fetched = fetch.success;
        if !fetched {
            outcome.errors.extend(fetch.errors.iter().cloned());
        }
        outcome.fetch = Some(fetch);
        if !fetched {
            return outcome;
        }

        if let Some(archive) = &descriptor.archive {
            sink.event(ProgressEvent::message(format!(
                "phase=Extract; {id}: unpacking {}",
                archive.path.display()
            )));
            match extract::extract(&archive.path, &archive.extract_to, sink) {
                Ok(summary) => {
                    outcome.extract = Some(summary);
                    if let Err(err) = store::remove_if_exists(&archive.path) {
                        warn!(dataset = %id, error = %err, "could not remove container after extraction");
                    }
                }
                Err(err) => return outcome.fail(err.to_string()),
            }
        }

        sink.event(ProgressEvent::message(format!(
            "phase=Verify; {id}: validating {}",
            descriptor.target.display()
        )));
        let report = self.validator.validate(&descriptor.target, descriptor);
        if !report.is_valid {
            outcome.errors.extend(report.errors.iter().cloned());
            if let Err(err) = store::remove_if_exists(&descriptor.target) {
                outcome.errors.push(err.to_string());
            }
            outcome.validation = Some(report);
            outcome.action = AcquireAction::Failed;
            return outcome;
        }

        sink.event(ProgressEvent::message(format!("phase=Store; {id}: ready")));
        outcome.validation = Some(report);
        outcome.action = AcquireAction::Downloaded;
        outcome
    }
}
