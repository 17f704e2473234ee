use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::DEFAULT_CHEMBL_RELEASE;
use crate::domain::Chromosome;
use crate::error::KiraError;
use crate::fetch::RetryPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "kira-rd.json";
pub const DATA_ROOT_ENV: &str = "KIRA_RD_DATA_ROOT";
pub const DEFAULT_WORKERS: usize = 3;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub data_root: Option<PathBuf>,
    #[serde(default)]
    pub chromosomes: Option<Vec<String>>,
    #[serde(default)]
    pub chembl: Option<ChemblEntry>,
    #[serde(default)]
    pub retry: Option<RetryEntry>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub progress_interval_ms: Option<u64>,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ChemblEntry {
    Enabled(bool),
    Release(u32),
    Detailed(ChemblEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ChemblEntryObject {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub release: Option<u32>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RetryEntry {
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub base_delay_secs: Option<u64>,
    #[serde(default)]
    pub max_delay_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub data_root: Option<PathBuf>,
    pub chromosomes: Vec<Chromosome>,
    pub chembl_release: Option<u32>,
    pub retry: RetryPolicy,
    pub workers: usize,
    pub progress_interval: Duration,
    pub connect_timeout: Duration,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            data_root: None,
            chromosomes: Chromosome::all(),
            chembl_release: Some(DEFAULT_CHEMBL_RELEASE),
            retry: RetryPolicy::default(),
            workers: DEFAULT_WORKERS,
            progress_interval: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, KiraError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config = if path.is_none() && !config_path.exists() {
            Config::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| KiraError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content).map_err(|err| KiraError::ConfigParse(err.to_string()))?
        };

        let mut resolved = Self::resolve_config(config)?;
        if let Ok(root) = std::env::var(DATA_ROOT_ENV) {
            if !root.trim().is_empty() {
                resolved.data_root = Some(PathBuf::from(root.trim()));
            }
        }
        Ok(resolved)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, KiraError> {
        let defaults = ResolvedConfig::default();

        let chromosomes = match config.chromosomes {
            Some(values) => {
                let mut parsed = values
                    .iter()
                    .map(|value| value.parse::<Chromosome>())
                    .collect::<Result<Vec<_>, KiraError>>()?;
                parsed.sort();
                parsed.dedup();
                parsed
            }
            None => defaults.chromosomes,
        };

        let chembl_release = match config.chembl {
            None => defaults.chembl_release,
            Some(ChemblEntry::Enabled(false)) => None,
            Some(ChemblEntry::Enabled(true)) => Some(DEFAULT_CHEMBL_RELEASE),
            Some(ChemblEntry::Release(release)) => Some(release),
            Some(ChemblEntry::Detailed(obj)) => {
                if obj.enabled.unwrap_or(true) {
                    Some(obj.release.unwrap_or(DEFAULT_CHEMBL_RELEASE))
                } else {
                    None
                }
            }
        };

        let retry_entry = config.retry.unwrap_or_default();
        let retry = RetryPolicy {
            max_retries: retry_entry
                .max_retries
                .unwrap_or(defaults.retry.max_retries)
                .max(1),
            base_delay: retry_entry
                .base_delay_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry.base_delay),
            max_delay: retry_entry
                .max_delay_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry.max_delay),
        };

        Ok(ResolvedConfig {
            data_root: config.data_root,
            chromosomes,
            chembl_release,
            retry,
            workers: config.workers.unwrap_or(defaults.workers).max(1),
            progress_interval: config
                .progress_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.progress_interval),
            connect_timeout: config
                .connect_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
        })
    }
}
