use std::fs;
use std::io::{self, BufReader};
use std::path::Path;
use std::time::Duration;

use flate2::read::GzDecoder;
use serde::Serialize;
use tracing::info;
use zip::ZipArchive;

use crate::error::KiraError;
use crate::progress::{ProgressSink, ProgressTracker, ProgressUnit};

const REPORT_EVERY_MEMBERS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    Zip,
}

impl ArchiveFormat {
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else if name.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractSummary {
    pub members: u64,
    pub bytes: u64,
}

pub fn extract(
    archive_path: &Path,
    dest_dir: &Path,
    sink: &dyn ProgressSink,
) -> Result<ExtractSummary, KiraError> {
    let format = ArchiveFormat::detect(archive_path).ok_or_else(|| {
        KiraError::Archive(format!(
            "unsupported archive format: {}",
            archive_path.display()
        ))
    })?;
    fs::create_dir_all(dest_dir).map_err(|err| KiraError::Filesystem(err.to_string()))?;
    let label = archive_path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "archive".to_string());
    let mut tracker =
        ProgressTracker::new(label, ProgressUnit::Items, sink).with_interval(Duration::ZERO);

    let summary = match format {
        ArchiveFormat::TarGz => extract_tar_gz(archive_path, dest_dir, &mut tracker)?,
        ArchiveFormat::Zip => extract_zip(archive_path, dest_dir, &mut tracker)?,
    };
    tracker.finish();
    info!(
        archive = %archive_path.display(),
        members = summary.members,
        bytes = summary.bytes,
        "archive extracted"
    );
    Ok(summary)
}

fn extract_tar_gz(
    archive_path: &Path,
    dest_dir: &Path,
    tracker: &mut ProgressTracker<'_>,
) -> Result<ExtractSummary, KiraError> {
    let file = fs::File::open(archive_path).map_err(|err| {
        KiraError::Archive(format!("open {}: {err}", archive_path.display()))
    })?;
    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    let entries = archive
        .entries()
        .map_err(|err| KiraError::Archive(err.to_string()))?;

    let mut summary = ExtractSummary::default();
    let mut reported = 0u64;
    for entry in entries {
        let mut entry = entry.map_err(|err| KiraError::Archive(err.to_string()))?;
        let name = entry
            .path()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|_| "<unreadable name>".to_string());
        let size = entry.header().size().unwrap_or(0);
        let unpacked = entry
            .unpack_in(dest_dir)
            .map_err(|err| KiraError::Archive(format!("{name}: {err}")))?;
        if !unpacked {
            return Err(KiraError::Archive(format!(
                "{name}: member path escapes the destination"
            )));
        }
        summary.members += 1;
        summary.bytes += size;
        if summary.members % REPORT_EVERY_MEMBERS == 0 {
            tracker.update(summary.members, 0);
            reported = summary.members;
        }
    }
    if reported != summary.members {
        tracker.update(summary.members, summary.members);
    }
    Ok(summary)
}

fn extract_zip(
    archive_path: &Path,
    dest_dir: &Path,
    tracker: &mut ProgressTracker<'_>,
) -> Result<ExtractSummary, KiraError> {
    let file = fs::File::open(archive_path).map_err(|err| {
        KiraError::Archive(format!("open {}: {err}", archive_path.display()))
    })?;
    let mut archive = ZipArchive::new(file).map_err(|err| KiraError::Archive(err.to_string()))?;
    let total = archive.len() as u64;

    let mut summary = ExtractSummary::default();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| KiraError::Archive(err.to_string()))?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => dest_dir.join(path),
            None => {
                return Err(KiraError::Archive(format!(
                    "{}: member path escapes the destination",
                    entry.name()
                )));
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)
                .map_err(|err| KiraError::Archive(err.to_string()))?;
        } else {
            if let Some(parent) = entry_path.parent() {
                fs::create_dir_all(parent).map_err(|err| KiraError::Archive(err.to_string()))?;
            }
            let mut outfile = fs::File::create(&entry_path)
                .map_err(|err| KiraError::Archive(format!("{}: {err}", entry_path.display())))?;
            summary.bytes += io::copy(&mut entry, &mut outfile)
                .map_err(|err| KiraError::Archive(format!("{}: {err}", entry_path.display())))?;
        }

        summary.members += 1;
        if summary.members % REPORT_EVERY_MEMBERS == 0 || summary.members == total {
            tracker.update(summary.members, total);
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_formats() {
        assert_eq!(
            ArchiveFormat::detect(Path::new("chembl_33_sqlite.tar.gz")),
            Some(ArchiveFormat::TarGz)
        );
        assert_eq!(
            ArchiveFormat::detect(Path::new("x.TGZ")),
            Some(ArchiveFormat::TarGz)
        );
        assert_eq!(
            ArchiveFormat::detect(Path::new("bundle.zip")),
            Some(ArchiveFormat::Zip)
        );
        assert_eq!(ArchiveFormat::detect(Path::new("chr1.vcf.gz")), None);
    }
}
