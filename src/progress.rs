use std::time::{Duration, Instant};

use tracing::debug;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            elapsed: None,
        }
    }
}

pub trait ProgressSink: Send + Sync {
    fn event(&self, event: ProgressEvent);
}

pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn event(&self, _event: ProgressEvent) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressUnit {
    Bytes,
    Items,
}

impl ProgressUnit {
    fn amount(self, value: u64) -> String {
        match self {
            ProgressUnit::Bytes => format_bytes(value),
            ProgressUnit::Items => format!("{value} items"),
        }
    }

    fn rate(self, per_second: f64) -> String {
        match self {
            ProgressUnit::Bytes => format!("{}/s", format_bytes(per_second as u64)),
            ProgressUnit::Items => format!("{per_second:.1} items/s"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProgressSnapshot {
    pub total: u64,
    pub transferred: u64,
    pub started: Instant,
}

impl ProgressSnapshot {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            transferred: 0,
            started: Instant::now(),
        }
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.transferred as f64 / self.total as f64 * 100.0).min(100.0)
    }

    pub fn throughput(&self) -> f64 {
        self.throughput_over(self.started.elapsed())
    }

    pub fn throughput_over(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.transferred as f64 / secs
    }

    pub fn eta(&self) -> Option<Duration> {
        self.eta_over(self.started.elapsed())
    }

    pub fn eta_over(&self, elapsed: Duration) -> Option<Duration> {
        if self.percent() >= 100.0 {
            return Some(Duration::ZERO);
        }
        let throughput = self.throughput_over(elapsed);
        if self.total == 0 || throughput <= 0.0 {
            return None;
        }
        let remaining = self.total.saturating_sub(self.transferred) as f64;
        Some(Duration::from_secs_f64(remaining / throughput))
    }
}

pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(1);

pub struct ProgressTracker<'a> {
    label: String,
    unit: ProgressUnit,
    snapshot: ProgressSnapshot,
    interval: Duration,
    last_report: Instant,
    reports: usize,
    sink: &'a dyn ProgressSink,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(label: impl Into<String>, unit: ProgressUnit, sink: &'a dyn ProgressSink) -> Self {
        let snapshot = ProgressSnapshot::new(0);
        Self {
            label: label.into(),
            unit,
            last_report: snapshot.started,
            snapshot,
            interval: DEFAULT_REPORT_INTERVAL,
            reports: 0,
            sink,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn snapshot(&self) -> &ProgressSnapshot {
        &self.snapshot
    }

    pub fn reports(&self) -> usize {
        self.reports
    }

    pub fn update(&mut self, transferred: u64, total: u64) {
        self.update_at(transferred, total, Instant::now());
    }

    pub fn update_at(&mut self, transferred: u64, total: u64, now: Instant) {
        self.snapshot.transferred = transferred;
        self.snapshot.total = total;
        if now.saturating_duration_since(self.last_report) < self.interval {
            return;
        }
        self.last_report = now;
        self.reports += 1;
        let elapsed = now.saturating_duration_since(self.snapshot.started);
        self.sink.event(ProgressEvent {
            message: render_line(&self.label, self.unit, &self.snapshot, elapsed),
            elapsed: Some(elapsed),
        });
    }

    pub fn finish(self) -> ProgressSnapshot {
        let elapsed = self.snapshot.started.elapsed();
        let line = format!(
            "{} done: {} in {} (avg {})",
            self.label,
            self.unit.amount(self.snapshot.transferred),
            format_duration(elapsed),
            self.unit.rate(self.snapshot.throughput_over(elapsed))
        );
        debug!(label = %self.label, transferred = self.snapshot.transferred, "transfer finished");
        self.sink.event(ProgressEvent {
            message: line,
            elapsed: Some(elapsed),
        });
        self.snapshot
    }
}

pub fn render_line(
    label: &str,
    unit: ProgressUnit,
    snapshot: &ProgressSnapshot,
    elapsed: Duration,
) -> String {
    let rate = unit.rate(snapshot.throughput_over(elapsed));
    if snapshot.total == 0 {
        return format!("{label} {} {rate}", unit.amount(snapshot.transferred));
    }
    let percent = snapshot.percent();
    let eta = match snapshot.eta_over(elapsed) {
        Some(eta) => format_duration(eta),
        None => "--".to_string(),
    };
    format!(
        "{label} {} {percent:>5.1}% {}/{} {rate} ETA {eta}",
        progress_bar(percent),
        unit.amount(snapshot.transferred),
        unit.amount(snapshot.total),
    )
}

fn progress_bar(percent: f64) -> String {
    let width = 20usize;
    let filled = ((percent / 100.0) * width as f64).round() as usize;
    let filled = filled.min(width);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0usize;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        lines: Mutex<Vec<String>>,
    }

    impl ProgressSink for Recorder {
        fn event(&self, event: ProgressEvent) {
            self.lines.lock().unwrap().push(event.message);
        }
    }

    #[test]
    fn percent_bounds() {
        let mut snapshot = ProgressSnapshot::new(0);
        snapshot.transferred = 500;
        assert_eq!(snapshot.percent(), 0.0);

        snapshot.total = 1000;
        assert_eq!(snapshot.percent(), 50.0);

        snapshot.transferred = 5000;
        assert_eq!(snapshot.percent(), 100.0);
    }

    #[test]
    fn eta_states() {
        let mut snapshot = ProgressSnapshot::new(1000);
        assert_eq!(snapshot.eta_over(Duration::from_secs(1)), None);

        snapshot.transferred = 250;
        let eta = snapshot.eta_over(Duration::from_secs(1)).unwrap();
        assert_eq!(eta, Duration::from_secs(3));

        snapshot.transferred = 1000;
        assert_eq!(snapshot.eta_over(Duration::ZERO), Some(Duration::ZERO));
    }

    #[test]
    fn reporter_is_time_gated() {
        let sink = Recorder::default();
        let mut tracker = ProgressTracker::new("chr22", ProgressUnit::Bytes, &sink)
            .with_interval(Duration::from_secs(1));
        let start = tracker.snapshot().started;
        for step in 0..100u64 {
            tracker.update_at(step * 10, 1000, start + Duration::from_millis(step * 5));
        }
        assert_eq!(tracker.reports(), 0);

        tracker.update_at(1000, 1000, start + Duration::from_millis(1001));
        tracker.update_at(1000, 1000, start + Duration::from_millis(1500));
        assert_eq!(tracker.reports(), 1);

        tracker.update_at(1000, 1000, start + Duration::from_millis(2002));
        assert_eq!(tracker.reports(), 2);
        assert_eq!(sink.lines.lock().unwrap().len(), 2);
    }

    #[test]
    fn render_unknown_total_has_no_percentage() {
        let mut snapshot = ProgressSnapshot::new(0);
        snapshot.transferred = 2048;
        let line = render_line("chr1", ProgressUnit::Bytes, &snapshot, Duration::from_secs(2));
        assert!(!line.contains('%'));
        assert!(line.contains("2.0 KiB"));
    }

    #[test]
    fn render_known_total() {
        let mut snapshot = ProgressSnapshot::new(4096);
        snapshot.transferred = 8192;
        let line = render_line("chr1", ProgressUnit::Bytes, &snapshot, Duration::from_secs(1));
        assert!(line.contains("100.0%"));
        assert!(line.contains("[####################]"));
        assert!(line.contains("ETA 0s"));
    }

    #[test]
    fn finish_emits_summary() {
        let sink = Recorder::default();
        let mut tracker = ProgressTracker::new("chembl", ProgressUnit::Items, &sink);
        tracker.update(3, 0);
        let snapshot = tracker.finish();
        assert_eq!(snapshot.transferred, 3);
        let lines = sink.lines.lock().unwrap();
        assert!(lines.last().unwrap().starts_with("chembl done: 3 items"));
    }

    #[test]
    fn human_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GiB");
    }
}
