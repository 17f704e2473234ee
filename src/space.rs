use std::io;
use std::path::Path;

use tracing::{info, warn};

use crate::progress::{ProgressEvent, ProgressSink, format_bytes};

pub trait FreeSpace: Send + Sync {
    fn available(&self, path: &Path) -> io::Result<u64>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Fs2FreeSpace;

impl FreeSpace for Fs2FreeSpace {
    fn available(&self, path: &Path) -> io::Result<u64> {
        fs2::available_space(path)
    }
}

pub struct DiskSpaceGuard<'a, F: FreeSpace> {
    probe: &'a F,
}

impl<'a, F: FreeSpace> DiskSpaceGuard<'a, F> {
    pub fn new(probe: &'a F) -> Self {
        Self { probe }
    }

    /// False when free space is below `required + margin`. A failed probe
    /// counts as enough space.
    pub fn check_available(
        &self,
        path: &Path,
        required: u64,
        margin: u64,
        sink: &dyn ProgressSink,
    ) -> bool {
        let probe_path = nearest_existing(path);
        let free = match self.probe.available(probe_path) {
            Ok(free) => free,
            Err(err) => {
                warn!(
                    path = %probe_path.display(),
                    error = %err,
                    "could not determine free disk space, assuming enough"
                );
                sink.event(ProgressEvent::message(format!(
                    "disk space unknown at {} ({err}); continuing",
                    probe_path.display()
                )));
                return true;
            }
        };

        let needed = required.saturating_add(margin);
        info!(
            path = %probe_path.display(),
            free,
            needed,
            "disk space preflight"
        );
        sink.event(ProgressEvent::message(format!(
            "free space at {}: {} (need {} incl. {} margin)",
            probe_path.display(),
            format_bytes(free),
            format_bytes(needed),
            format_bytes(margin)
        )));
        free >= needed
    }

    pub fn available(&self, path: &Path) -> Option<u64> {
        self.probe.available(nearest_existing(path)).ok()
    }
}

fn nearest_existing(path: &Path) -> &Path {
    let mut current = path;
    loop {
        if current.exists() {
            return current;
        }
        match current.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => current = parent,
            _ => return Path::new("."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GIB;
    use crate::progress::NoopSink;

    struct Fixed(u64);

    impl FreeSpace for Fixed {
        fn available(&self, _path: &Path) -> io::Result<u64> {
            Ok(self.0)
        }
    }

    struct Broken;

    impl FreeSpace for Broken {
        fn available(&self, _path: &Path) -> io::Result<u64> {
            Err(io::Error::new(io::ErrorKind::Unsupported, "no statvfs"))
        }
    }

    #[test]
    fn margin_is_added_to_requirement() {
        let probe = Fixed(3 * GIB);
        let guard = DiskSpaceGuard::new(&probe);
        assert!(guard.check_available(Path::new("."), 2 * GIB, GIB, &NoopSink));
        assert!(!guard.check_available(Path::new("."), 2 * GIB + 1, GIB, &NoopSink));
    }

    #[test]
    fn probe_failure_assumes_enough_space() {
        let guard = DiskSpaceGuard::new(&Broken);
        assert!(guard.check_available(Path::new("."), u64::MAX, GIB, &NoopSink));
    }

    #[test]
    fn probes_nearest_existing_ancestor() {
        let temp = tempfile::tempdir().unwrap();
        let missing = temp.path().join("a").join("b").join("file.vcf.gz");
        assert_eq!(nearest_existing(&missing), temp.path());
    }

    #[test]
    fn real_probe_reports_space_for_temp_dir() {
        let temp = tempfile::tempdir().unwrap();
        let guard = DiskSpaceGuard::new(&Fs2FreeSpace);
        assert!(guard.available(temp.path()).is_some());
    }
}
