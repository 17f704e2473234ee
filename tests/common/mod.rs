#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use flate2::Compression;
use flate2::write::GzEncoder;
use rusqlite::Connection;

use kira_refdata::catalog::{
    ArchiveSpec, DatabaseChecks, DatasetDescriptor, StructuralChecks, TableRequirement,
    TabularChecks,
};
use kira_refdata::domain::{Chromosome, DatasetId, SizeRange};
use kira_refdata::error::KiraError;
use kira_refdata::fetch::RetryPolicy;
use kira_refdata::http::Transport;
use kira_refdata::progress::{ProgressEvent, ProgressSink};
use kira_refdata::space::FreeSpace;

pub const SAMPLES: [&str; 3] = ["HG00096", "HG00097", "HG00099"];

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        base_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
    }
}

pub fn vcf_text(records: usize) -> String {
    let mut text = String::from("##fileformat=VCFv4.1\n##source=test\n");
    text.push_str("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT");
    for sample in SAMPLES {
        text.push('\t');
        text.push_str(sample);
    }
    text.push('\n');
    for i in 0..records {
        text.push_str(&format!(
            "22\t{}\trs{i}\tA\tG\t100\tPASS\tAC=1\tGT\t0|0\t0|1\t1|1\n",
            16_050_000 + i
        ));
    }
    text
}

pub fn gzip(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

pub fn vcf_gz(records: usize) -> Vec<u8> {
    gzip(&vcf_text(records))
}

pub fn write_file(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, bytes).unwrap();
}

pub fn genome_descriptor(chromosome: Chromosome, target: PathBuf, size: SizeRange) -> DatasetDescriptor {
    DatasetDescriptor {
        id: DatasetId::Chromosome(chromosome),
        url: format!("https://primary.test/{chromosome}.vcf.gz"),
        mirrors: vec![format!("https://mirror.test/{chromosome}.vcf.gz")],
        target,
        expected_size: size,
        checks: StructuralChecks::CompressedTabular(TabularChecks::default()),
        archive: None,
    }
}

pub fn small_database_checks() -> DatabaseChecks {
    DatabaseChecks {
        min_tables: 2,
        tables: vec![
            TableRequirement::new("molecule_dictionary", 2),
            TableRequirement::new("activities", 3),
        ],
        smoke_query: "SELECT md.chembl_id, act.standard_value FROM activities act \
                      JOIN molecule_dictionary md ON md.molregno = act.molregno LIMIT 5"
            .to_string(),
    }
}

pub fn database_descriptor(root: &Path, archive: Option<ArchiveSpec>) -> DatasetDescriptor {
    DatasetDescriptor {
        id: DatasetId::Chembl,
        url: "https://primary.test/chembl_sqlite.tar.gz".to_string(),
        mirrors: Vec::new(),
        target: root.join("chembl_t/chembl_t_sqlite/chembl_t.db"),
        expected_size: SizeRange::new(1, 64 * 1024 * 1024),
        checks: StructuralChecks::RelationalDatabase(small_database_checks()),
        archive,
    }
}

/// Builds a tiny ChEMBL-shaped database with the given number of activities.
pub fn build_database(path: &Path, activities: usize) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE molecule_dictionary (molregno INTEGER PRIMARY KEY, chembl_id TEXT);
         CREATE TABLE activities (activity_id INTEGER PRIMARY KEY, molregno INTEGER, standard_value REAL);
         INSERT INTO molecule_dictionary VALUES (1, 'CHEMBL25'), (2, 'CHEMBL1201');",
    )
    .unwrap();
    for i in 0..activities {
        conn.execute(
            "INSERT INTO activities (molregno, standard_value) VALUES (?1, ?2)",
            rusqlite::params![(i % 2 + 1) as i64, i as f64],
        )
        .unwrap();
    }
}

/// Packs `files` (archive name, source path) into a gzip tarball.
pub fn build_tar_gz(archive: &Path, files: &[(&str, &Path)]) {
    let file = fs::File::create(archive).unwrap();
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, source) in files {
        builder.append_path_with_name(source, name).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

pub enum Reply {
    Body(Vec<u8>),
    Status(u16),
    Broken,
}

/// Serves scripted replies per URL; the last reply repeats once the script runs out.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, Vec<Reply>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn reply(self, url: &str, reply: Reply) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push(reply);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn download(
        &self,
        url: &str,
        destination: &Path,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<u64, KiraError> {
        self.calls.lock().unwrap().push(url.to_string());
        let mut replies = self.replies.lock().unwrap();
        let script = replies
            .get_mut(url)
            .ok_or_else(|| KiraError::HttpStatus {
                url: url.to_string(),
                status: 404,
            })?;
        let reply = if script.len() > 1 {
            script.remove(0)
        } else {
            match &script[0] {
                Reply::Body(bytes) => Reply::Body(bytes.clone()),
                Reply::Status(status) => Reply::Status(*status),
                Reply::Broken => Reply::Broken,
            }
        };
        match reply {
            Reply::Body(bytes) => {
                if let Some(parent) = destination.parent() {
                    fs::create_dir_all(parent).unwrap();
                }
                fs::write(destination, &bytes).unwrap();
                progress(bytes.len() as u64, bytes.len() as u64);
                Ok(bytes.len() as u64)
            }
            Reply::Status(status) => Err(KiraError::HttpStatus {
                url: url.to_string(),
                status,
            }),
            Reply::Broken => Err(KiraError::Http("connection reset by peer".to_string())),
        }
    }
}

pub struct FixedSpace(pub u64);

impl FreeSpace for FixedSpace {
    fn available(&self, _path: &Path) -> io::Result<u64> {
        Ok(self.0)
    }
}

#[derive(Default)]
pub struct Recorder {
    pub messages: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl ProgressSink for Recorder {
    fn event(&self, event: ProgressEvent) {
        self.messages.lock().unwrap().push(event.message);
    }
}
