use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::domain::{Chromosome, DatasetId, GIB, MIB, SizeRange, ValidationKind};
use crate::error::KiraError;
use crate::store::Store;

const THOUSAND_GENOMES_PRIMARY: &str =
    "https://ftp.1000genomes.ebi.ac.uk/vol1/ftp/release/20130502";
const THOUSAND_GENOMES_MIRRORS: &[&str] =
    &["https://ftp-trace.ncbi.nih.gov/1000genomes/ftp/release/20130502"];

const CHEMBL_PRIMARY: &str = "https://ftp.ebi.ac.uk/pub/databases/chembl/ChEMBLdb/releases";
const CHEMBL_MIRRORS: &[&str] = &["http://ftp.ebi.ac.uk/pub/databases/chembl/ChEMBLdb/releases"];

pub const DEFAULT_CHEMBL_RELEASE: u32 = 33;

#[derive(Debug, Clone, Serialize)]
pub struct TabularChecks {
    pub format_marker: String,
    pub header_marker: String,
    pub header_scan_lines: usize,
    pub sample_cap: usize,
}

impl Default for TabularChecks {
    fn default() -> Self {
        Self {
            format_marker: "##fileformat=VCF".to_string(),
            header_marker: "#CHROM".to_string(),
            header_scan_lines: 100,
            sample_cap: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TableRequirement {
    pub name: String,
    pub min_rows: u64,
}

impl TableRequirement {
    pub fn new(name: &str, min_rows: u64) -> Self {
        Self {
            name: name.to_string(),
            min_rows,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseChecks {
    pub min_tables: usize,
    pub tables: Vec<TableRequirement>,
    pub smoke_query: String,
}

impl DatabaseChecks {
    pub fn chembl() -> Self {
        Self {
            min_tables: 70,
            tables: vec![
                TableRequirement::new("molecule_dictionary", 2_000_000),
                TableRequirement::new("compound_structures", 2_000_000),
                TableRequirement::new("activities", 15_000_000),
                TableRequirement::new("assays", 1_000_000),
                TableRequirement::new("target_dictionary", 10_000),
            ],
            smoke_query: "SELECT md.chembl_id, act.standard_type, act.standard_value \
                          FROM activities act \
                          JOIN molecule_dictionary md ON md.molregno = act.molregno \
                          LIMIT 5"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StructuralChecks {
    CompressedTabular(TabularChecks),
    RelationalDatabase(DatabaseChecks),
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveSpec {
    pub path: PathBuf,
    pub expected_size: SizeRange,
    pub extract_to: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetDescriptor {
    pub id: DatasetId,
    pub url: String,
    pub mirrors: Vec<String>,
    pub target: PathBuf,
    pub expected_size: SizeRange,
    pub checks: StructuralChecks,
    pub archive: Option<ArchiveSpec>,
}

impl DatasetDescriptor {
    pub fn kind(&self) -> ValidationKind {
        match self.checks {
            StructuralChecks::CompressedTabular(_) => ValidationKind::CompressedTabular,
            StructuralChecks::RelationalDatabase(_) => ValidationKind::RelationalDatabase,
        }
    }

    pub fn sources(&self) -> Vec<&str> {
        std::iter::once(self.url.as_str())
            .chain(self.mirrors.iter().map(String::as_str))
            .collect()
    }

    pub fn download_path(&self) -> &Path {
        match &self.archive {
            Some(archive) => &archive.path,
            None => &self.target,
        }
    }

    pub fn download_size(&self) -> SizeRange {
        match &self.archive {
            Some(archive) => archive.expected_size,
            None => self.expected_size,
        }
    }

    pub fn space_margin(&self) -> u64 {
        match self.kind() {
            ValidationKind::CompressedTabular => GIB,
            ValidationKind::RelationalDatabase => GIB / 2,
        }
    }

    pub fn required_space(&self) -> u64 {
        match &self.archive {
            Some(archive) => archive.expected_size.max + self.expected_size.min,
            None => self.expected_size.max,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Catalog {
    descriptors: Vec<DatasetDescriptor>,
}

impl Catalog {
    pub fn new(descriptors: Vec<DatasetDescriptor>) -> Self {
        Self { descriptors }
    }

    pub fn builtin(store: &Store, chromosomes: &[Chromosome], chembl_release: Option<u32>) -> Self {
        let mut descriptors = chromosomes
            .iter()
            .map(|chr| genome_descriptor(store, *chr))
            .collect::<Vec<_>>();
        if let Some(release) = chembl_release {
            descriptors.push(chembl_descriptor(store, release));
        }
        Self { descriptors }
    }

    pub fn describe(&self, id: &DatasetId) -> Result<&DatasetDescriptor, KiraError> {
        self.descriptors
            .iter()
            .find(|descriptor| &descriptor.id == id)
            .ok_or_else(|| KiraError::UnknownDataset {
                id: id.to_string(),
                known: self.known_ids(),
            })
    }

    pub fn resolve(&self, name: &str) -> Result<&DatasetDescriptor, KiraError> {
        match name.parse::<DatasetId>() {
            Ok(id) => self.describe(&id),
            Err(_) => Err(KiraError::UnknownDataset {
                id: name.to_string(),
                known: self.known_ids(),
            }),
        }
    }

    pub fn list_all(&self) -> &[DatasetDescriptor] {
        &self.descriptors
    }

    // Longest identifier wins, so `chr22` beats `chr2`.
    pub fn best_match(&self, path: &Path) -> Option<&DatasetDescriptor> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        self.longest_match(&file_name)
            .or_else(|| self.longest_match(&path.to_string_lossy().to_lowercase()))
    }

    fn longest_match(&self, haystack: &str) -> Option<&DatasetDescriptor> {
        let mut best: Option<(usize, &DatasetDescriptor)> = None;
        for descriptor in &self.descriptors {
            let needle = descriptor.id.to_string().to_lowercase();
            if !haystack.contains(&needle) {
                continue;
            }
            if best.map(|(len, _)| needle.len() > len).unwrap_or(true) {
                best = Some((needle.len(), descriptor));
            }
        }
        best.map(|(_, descriptor)| descriptor)
    }

    fn known_ids(&self) -> String {
        self.descriptors
            .iter()
            .map(|descriptor| descriptor.id.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn genome_descriptor(store: &Store, chromosome: Chromosome) -> DatasetDescriptor {
    let file_name = thousand_genomes_file(chromosome);
    DatasetDescriptor {
        id: DatasetId::Chromosome(chromosome),
        url: format!("{THOUSAND_GENOMES_PRIMARY}/{file_name}"),
        mirrors: THOUSAND_GENOMES_MIRRORS
            .iter()
            .map(|base| format!("{base}/{file_name}"))
            .collect(),
        target: store.genome_path(chromosome).into_std_path_buf(),
        expected_size: SizeRange::around(typical_genome_size(chromosome)),
        checks: StructuralChecks::CompressedTabular(TabularChecks::default()),
        archive: None,
    }
}

fn chembl_descriptor(store: &Store, release: u32) -> DatasetDescriptor {
    let file_name = format!("chembl_{release}/chembl_{release}_sqlite.tar.gz");
    DatasetDescriptor {
        id: DatasetId::Chembl,
        url: format!("{CHEMBL_PRIMARY}/{file_name}"),
        mirrors: CHEMBL_MIRRORS
            .iter()
            .map(|base| format!("{base}/{file_name}"))
            .collect(),
        target: store.chembl_db_path(release).into_std_path_buf(),
        expected_size: SizeRange::new(15 * GIB, 40 * GIB),
        checks: StructuralChecks::RelationalDatabase(DatabaseChecks::chembl()),
        archive: Some(ArchiveSpec {
            path: store.chembl_archive_path(release).into_std_path_buf(),
            expected_size: SizeRange::new(3 * GIB, 8 * GIB),
            extract_to: store.root().as_std_path().to_path_buf(),
        }),
    }
}

fn thousand_genomes_file(chromosome: Chromosome) -> String {
    match chromosome {
        Chromosome::Autosome(n) => format!(
            "ALL.chr{n}.phase3_shapeit2_mvncall_integrated_v5b.20130502.genotypes.vcf.gz"
        ),
        Chromosome::X => {
            "ALL.chrX.phase3_shapeit2_mvncall_integrated_v1c.20130502.genotypes.vcf.gz"
                .to_string()
        }
    }
}

// Published phase 3 archive sizes, rounded.
fn typical_genome_size(chromosome: Chromosome) -> u64 {
    let mib = match chromosome {
        Chromosome::Autosome(1) => 1180,
        Chromosome::Autosome(2) => 1270,
        Chromosome::Autosome(3) => 1060,
        Chromosome::Autosome(4) => 1050,
        Chromosome::Autosome(5) => 960,
        Chromosome::Autosome(6) => 920,
        Chromosome::Autosome(7) => 880,
        Chromosome::Autosome(8) => 840,
        Chromosome::Autosome(9) => 640,
        Chromosome::Autosome(10) => 730,
        Chromosome::Autosome(11) => 720,
        Chromosome::Autosome(12) => 700,
        Chromosome::Autosome(13) => 520,
        Chromosome::Autosome(14) => 480,
        Chromosome::Autosome(15) => 440,
        Chromosome::Autosome(16) => 490,
        Chromosome::Autosome(17) => 420,
        Chromosome::Autosome(18) => 410,
        Chromosome::Autosome(19) => 330,
        Chromosome::Autosome(20) => 320,
        Chromosome::Autosome(21) => 200,
        Chromosome::Autosome(_) => 200,
        Chromosome::X => 860,
    };
    mib * MIB
}
