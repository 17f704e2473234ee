use std::path::Path;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::DatasetDescriptor;
use crate::domain::{SizeCheck, SizeRange};
use crate::error::KiraError;
use crate::http::Transport;
use crate::progress::{
    DEFAULT_REPORT_INTERVAL, ProgressEvent, ProgressSink, ProgressTracker, ProgressUnit,
    format_bytes,
};
use crate::store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// `min(base * 2^(attempt-1), max)`; the first attempt never waits.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Attempting { source: usize, attempt: u32 },
    Backoff { source: usize, attempt: u32, delay: Duration },
    Exhausted,
    Succeeded { source: usize, attempt: u32 },
}

#[derive(Debug, Clone)]
pub struct RetryMachine {
    policy: RetryPolicy,
    sources: usize,
    state: RetryState,
}

impl RetryMachine {
    pub fn new(policy: RetryPolicy, sources: usize) -> Self {
        let state = if sources == 0 || policy.max_retries == 0 {
            RetryState::Exhausted
        } else {
            RetryState::Attempting {
                source: 0,
                attempt: 0,
            }
        };
        Self {
            policy,
            sources,
            state,
        }
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    pub fn on_success(&mut self) {
        if let RetryState::Attempting { source, attempt } = self.state {
            self.state = RetryState::Succeeded { source, attempt };
        }
    }

    pub fn on_failure(&mut self, retryable: bool) {
        let RetryState::Attempting { source, attempt } = self.state else {
            return;
        };
        let next = attempt + 1;
        self.state = if retryable && next < self.policy.max_retries {
            RetryState::Backoff {
                source,
                attempt: next,
                delay: self.policy.delay_for(next),
            }
        } else if source + 1 < self.sources {
            RetryState::Attempting {
                source: source + 1,
                attempt: 0,
            }
        } else {
            RetryState::Exhausted
        };
    }

    pub fn after_backoff(&mut self) {
        if let RetryState::Backoff {
            source, attempt, ..
        } = self.state
        {
            self.state = RetryState::Attempting { source, attempt };
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchResult {
    pub success: bool,
    pub bytes_written: u64,
    pub source: Option<String>,
    pub attempts: u32,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

pub struct Fetcher<'a, T: Transport> {
    transport: &'a T,
    policy: RetryPolicy,
    report_interval: Duration,
}

impl<'a, T: Transport> Fetcher<'a, T> {
    pub fn new(transport: &'a T, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            report_interval: DEFAULT_REPORT_INTERVAL,
        }
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    pub fn fetch(&self, descriptor: &DatasetDescriptor, sink: &dyn ProgressSink) -> FetchResult {
        let label = descriptor.id.to_string();
        let destination = descriptor.download_path();
        let part = store::part_path(destination);
        let sources = descriptor.sources();
        let range = descriptor.download_size();

        let mut machine = RetryMachine::new(self.policy, sources.len());
        let mut result = FetchResult::default();

        loop {
            match machine.state() {
                RetryState::Attempting { source, attempt } => {
                    let url = sources[source];
                    result.attempts += 1;
                    sink.event(ProgressEvent::message(format!(
                        "{label}: downloading {url} (attempt {}/{})",
                        attempt + 1,
                        self.policy.max_retries
                    )));
                    match self.attempt(&label, url, &part, range, sink) {
                        Ok((bytes, warning)) => match store::promote(&part, destination) {
                            Ok(()) => {
                                result.bytes_written = bytes;
                                result.source = Some(url.to_string());
                                result.warnings.extend(warning);
                                machine.on_success();
                            }
                            Err(err) => {
                                result.errors.push(format!("{url}: {err}"));
                                machine.on_failure(false);
                            }
                        },
                        Err(err) => {
                            warn!(dataset = %label, url, attempt = attempt + 1, error = %err, "download attempt failed");
                            result.errors.push(format!(
                                "{url} (attempt {}/{}): {err}",
                                attempt + 1,
                                self.policy.max_retries
                            ));
                            machine.on_failure(err.is_transient());
                        }
                    }
                }
                RetryState::Backoff { delay, attempt, .. } => {
                    if let Err(err) = store::remove_if_exists(&part) {
                        warn!(dataset = %label, error = %err, "could not remove partial download");
                    }
                    info!(dataset = %label, attempt = attempt + 1, delay_secs = delay.as_secs(), "backing off before retry");
                    sink.event(ProgressEvent::message(format!(
                        "{label}: retrying in {}s",
                        delay.as_secs()
                    )));
                    thread::sleep(delay);
                    machine.after_backoff();
                }
                RetryState::Exhausted => {
                    if let Err(err) = store::remove_if_exists(&part) {
                        result.errors.push(err.to_string());
                    }
                    if result.errors.is_empty() {
                        result.errors.push("no download source configured".to_string());
                    }
                    return result;
                }
                RetryState::Succeeded { .. } => {
                    result.success = true;
                    result.errors.clear();
                    info!(dataset = %label, bytes = result.bytes_written, "download complete");
                    return result;
                }
            }
        }
    }

    fn attempt(
        &self,
        label: &str,
        url: &str,
        part: &Path,
        range: SizeRange,
        sink: &dyn ProgressSink,
    ) -> Result<(u64, Option<String>), KiraError> {
        let mut tracker = ProgressTracker::new(label, ProgressUnit::Bytes, sink)
            .with_interval(self.report_interval);
        self.transport
            .download(url, part, &mut |done, total| tracker.update(done, total))?;
        tracker.finish();

        let size = store::file_size(part).unwrap_or(0);
        if size == 0 {
            return Err(KiraError::EmptyDownload(part.to_path_buf()));
        }
        match range.check(size) {
            SizeCheck::Below => Err(KiraError::DownloadTooSmall {
                actual: size,
                min: range.min,
            }),
            SizeCheck::Above => Ok((
                size,
                Some(format!(
                    "download larger than expected: {} > {}",
                    format_bytes(size),
                    format_bytes(range.max)
                )),
            )),
            SizeCheck::Within => Ok((size, None)),
        }
    }
}
