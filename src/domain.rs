use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::KiraError;

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Chromosome {
    Autosome(u8),
    X,
}

impl fmt::Display for Chromosome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chromosome::Autosome(n) => write!(f, "chr{n}"),
            Chromosome::X => write!(f, "chrX"),
        }
    }
}

impl FromStr for Chromosome {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let bare = trimmed
            .strip_prefix("chr")
            .or_else(|| trimmed.strip_prefix("CHR"))
            .or_else(|| trimmed.strip_prefix("Chr"))
            .unwrap_or(trimmed);
        if bare.eq_ignore_ascii_case("x") {
            return Ok(Chromosome::X);
        }
        if bare.is_empty() || bare.starts_with('0') || !bare.bytes().all(|b| b.is_ascii_digit()) {
            return Err(KiraError::InvalidDatasetId(value.to_string()));
        }
        match bare.parse::<u8>() {
            Ok(n) if (1..=22).contains(&n) => Ok(Chromosome::Autosome(n)),
            _ => Err(KiraError::InvalidDatasetId(value.to_string())),
        }
    }
}

impl Chromosome {
    pub fn all() -> Vec<Chromosome> {
        let mut items = (1..=22).map(Chromosome::Autosome).collect::<Vec<_>>();
        items.push(Chromosome::X);
        items
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DatasetId {
    Chromosome(Chromosome),
    Chembl,
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetId::Chromosome(chr) => write!(f, "{chr}"),
            DatasetId::Chembl => write!(f, "chembl"),
        }
    }
}

impl FromStr for DatasetId {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().eq_ignore_ascii_case("chembl") {
            return Ok(DatasetId::Chembl);
        }
        value.parse::<Chromosome>().map(DatasetId::Chromosome)
    }
}

impl Serialize for DatasetId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DatasetId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationKind {
    CompressedTabular,
    RelationalDatabase,
}

impl fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationKind::CompressedTabular => write!(f, "compressed-tabular"),
            ValidationKind::RelationalDatabase => write!(f, "relational-database"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeRange {
    pub min: u64,
    pub max: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeCheck {
    Below,
    Within,
    Above,
}

impl SizeRange {
    pub const fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    pub const fn around(typical: u64) -> Self {
        Self {
            min: typical / 2,
            max: typical * 2,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        self.min > 0 && self.max > self.min
    }

    pub fn check(&self, size: u64) -> SizeCheck {
        if size < self.min {
            SizeCheck::Below
        } else if size > self.max {
            SizeCheck::Above
        } else {
            SizeCheck::Within
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_chromosome_forms() {
        assert_eq!("chr22".parse::<Chromosome>().unwrap(), Chromosome::Autosome(22));
        assert_eq!("7".parse::<Chromosome>().unwrap(), Chromosome::Autosome(7));
        assert_eq!("chrx".parse::<Chromosome>().unwrap(), Chromosome::X);
        assert_eq!("X".parse::<Chromosome>().unwrap(), Chromosome::X);
    }

    #[test]
    fn parse_chromosome_invalid() {
        assert_matches!("chr23".parse::<Chromosome>(), Err(KiraError::InvalidDatasetId(_)));
        assert_matches!("chr0".parse::<Chromosome>(), Err(KiraError::InvalidDatasetId(_)));
        assert_matches!("chr01".parse::<Chromosome>(), Err(KiraError::InvalidDatasetId(_)));
        assert_matches!("chrY".parse::<Chromosome>(), Err(KiraError::InvalidDatasetId(_)));
        assert_matches!("+5".parse::<Chromosome>(), Err(KiraError::InvalidDatasetId(_)));
        assert_matches!("chr+5".parse::<Chromosome>(), Err(KiraError::InvalidDatasetId(_)));
        assert_matches!("chr".parse::<Chromosome>(), Err(KiraError::InvalidDatasetId(_)));
    }

    #[test]
    fn dataset_id_round_trips_display() {
        let id: DatasetId = "CHEMBL".parse().unwrap();
        assert_eq!(id, DatasetId::Chembl);
        assert_eq!(id.to_string(), "chembl");
        let id: DatasetId = "2".parse().unwrap();
        assert_eq!(id.to_string(), "chr2");
    }

    #[test]
    fn dataset_ids_order_chromosomes_before_database() {
        let mut ids = vec![
            DatasetId::Chembl,
            DatasetId::Chromosome(Chromosome::X),
            DatasetId::Chromosome(Chromosome::Autosome(10)),
            DatasetId::Chromosome(Chromosome::Autosome(2)),
        ];
        ids.sort();
        let names = ids.iter().map(|id| id.to_string()).collect::<Vec<_>>();
        assert_eq!(names, vec!["chr2", "chr10", "chrX", "chembl"]);
    }

    #[test]
    fn size_range_check() {
        let range = SizeRange::new(10, 20);
        assert_eq!(range.check(5), SizeCheck::Below);
        assert_eq!(range.check(10), SizeCheck::Within);
        assert_eq!(range.check(21), SizeCheck::Above);
        assert!(range.is_well_formed());
        assert!(!SizeRange::new(0, 5).is_well_formed());
        assert!(!SizeRange::new(5, 5).is_well_formed());
    }
}
