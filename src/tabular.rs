use std::cell::Cell;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::rc::Rc;

use flate2::read::MultiGzDecoder;
use regex::Regex;
use serde::Serialize;

use crate::catalog::TabularChecks;
use crate::domain::{KIB, MIB};
use crate::validate::ValidationReport;

const FIXED_VCF_COLUMNS: usize = 9;
const MAX_LINE_BYTES: u64 = 4 * MIB;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TabularMetrics {
    pub format_version: Option<String>,
    pub sample_count: Option<usize>,
    pub records_sampled: u64,
    pub record_count: u64,
    pub record_count_estimated: bool,
}

pub fn inspect(
    path: &Path,
    file_size: u64,
    checks: &TabularChecks,
    report: &mut ValidationReport,
) -> Option<TabularMetrics> {
    if let Err(err) = probe_gzip(path) {
        report.error(format!("invalid compressed-archive format: {err}"));
        return None;
    }

    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            report.error(format!("cannot open file: {err}"));
            return None;
        }
    };
    let consumed = Rc::new(Cell::new(0u64));
    let counting = CountingReader {
        inner: file,
        count: Rc::clone(&consumed),
    };
    let mut reader = BufReader::new(MultiGzDecoder::new(counting));

    let version_re = Regex::new(r"^##fileformat=(VCFv[0-9.]+)").ok();
    let mut format_version = None;
    let mut sample_count = None;
    let mut seen_format = false;
    let mut seen_header = false;
    let mut records = 0u64;
    let mut line_no = 0usize;
    let mut in_header = true;
    let mut line = Vec::new();

    loop {
        line.clear();
        match (&mut reader).take(MAX_LINE_BYTES).read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(n) if n as u64 == MAX_LINE_BYTES && line.last() != Some(&b'\n') => {
                report.error(format!(
                    "line {} exceeds {MAX_LINE_BYTES} bytes",
                    line_no + 1
                ));
                break;
            }
            Ok(_) => {}
            Err(err) => {
                report.error(format!(
                    "decompression failed after {line_no} lines: {err}"
                ));
                break;
            }
        }
        line_no += 1;
        let text = String::from_utf8_lossy(&line);
        let text = text.trim_end_matches(['\n', '\r']);

        if text.starts_with('#') {
            // Format marker must lead the file; the column header closes the
            // header block, however long it is.
            if line_no <= checks.header_scan_lines && text.starts_with(&checks.format_marker) {
                seen_format = true;
                format_version = version_re
                    .as_ref()
                    .and_then(|re| re.captures(text))
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().to_string());
            }
            if in_header && text.starts_with(&checks.header_marker) {
                seen_header = true;
                let columns = text.split('\t').count();
                sample_count = Some(columns.saturating_sub(FIXED_VCF_COLUMNS));
            }
            continue;
        }

        in_header = false;
        if text.trim().is_empty() {
            continue;
        }
        records += 1;
        if records >= checks.sample_cap as u64 {
            break;
        }
    }

    if !seen_format {
        report.error(format!(
            "missing required format marker '{}' in the first {} lines",
            checks.format_marker, checks.header_scan_lines
        ));
    }
    if !seen_header {
        report.error(format!(
            "missing required column header '{}'",
            checks.header_marker
        ));
    }
    if records == 0 {
        report.error("no data records found");
    }

    let capped = records >= checks.sample_cap as u64;
    let record_count = if capped {
        estimate_records(records, file_size, consumed.get())
    } else {
        records
    };

    Some(TabularMetrics {
        format_version,
        sample_count,
        records_sampled: records,
        record_count,
        record_count_estimated: capped,
    })
}

fn probe_gzip(path: &Path) -> io::Result<usize> {
    let file = File::open(path)?;
    let mut decoder = MultiGzDecoder::new(file);
    let mut buffer = [0u8; KIB as usize];
    let mut filled = 0usize;
    while filled < buffer.len() {
        match decoder.read(&mut buffer[filled..])? {
            0 => break,
            read => filled += read,
        }
    }
    Ok(filled)
}

pub fn estimate_records(sampled: u64, file_size: u64, consumed: u64) -> u64 {
    if consumed == 0 || file_size <= consumed {
        return sampled;
    }
    ((sampled as u128 * file_size as u128) / consumed as u128) as u64
}

struct CountingReader<R> {
    inner: R,
    count: Rc<Cell<u64>>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.count.set(self.count.get() + read as u64);
        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_extrapolates_by_size() {
        assert_eq!(estimate_records(1000, 10_000, 1_000), 10_000);
        assert_eq!(estimate_records(1000, 500, 1_000), 1000);
        assert_eq!(estimate_records(1000, 10_000, 0), 1000);
    }

    #[test]
    fn probe_rejects_plain_text() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("plain.vcf.gz");
        std::fs::write(&path, b"##fileformat=VCFv4.1\n").unwrap();
        assert!(probe_gzip(&path).is_err());
    }
}
