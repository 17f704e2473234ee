use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;

use crate::domain::Chromosome;
use crate::error::KiraError;

#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

impl Store {
    pub fn new() -> Result<Self, KiraError> {
        let root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("kira-refdata"))
                    .ok()
            })
            .ok_or_else(|| KiraError::Filesystem("unable to resolve data directory".to_string()))?;
        Ok(Self { root })
    }

    pub fn new_with_root(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn from_path(root: &Path) -> Result<Self, KiraError> {
        let root = Utf8PathBuf::from_path_buf(root.to_path_buf())
            .map_err(|_| KiraError::Filesystem("non-utf8 data root".to_string()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn genomes_dir(&self) -> Utf8PathBuf {
        self.root.join("genomes")
    }

    pub fn genome_path(&self, chromosome: Chromosome) -> Utf8PathBuf {
        self.genomes_dir().join(format!("{chromosome}.vcf.gz"))
    }

    pub fn chembl_archive_path(&self, release: u32) -> Utf8PathBuf {
        self.root.join(format!("chembl_{release}_sqlite.tar.gz"))
    }

    pub fn chembl_db_path(&self, release: u32) -> Utf8PathBuf {
        self.root
            .join(format!("chembl_{release}"))
            .join(format!("chembl_{release}_sqlite"))
            .join(format!("chembl_{release}.db"))
    }

    pub fn ensure_root(&self) -> Result<(), KiraError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))
    }
}

pub fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

pub fn ensure_parent(path: &Path) -> Result<(), KiraError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| KiraError::Filesystem(err.to_string()))?;
    }
    Ok(())
}

pub fn remove_if_exists(path: &Path) -> Result<(), KiraError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(KiraError::Filesystem(format!(
            "remove {}: {err}",
            path.display()
        ))),
    }
}

pub fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path)
        .ok()
        .filter(|meta| meta.is_file())
        .map(|meta| meta.len())
}

pub fn promote(from: &Path, to: &Path) -> Result<(), KiraError> {
    ensure_parent(to)?;
    fs::rename(from, to).map_err(|err| {
        KiraError::Filesystem(format!(
            "rename {} -> {}: {err}",
            from.display(),
            to.display()
        ))
    })
}
