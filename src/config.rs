// ⚙️ Pipeline configuration - where the store, filings and reference files live
//
// Every field has a default matching the usual project layout, so a YAML
// file only needs the paths that differ. CLI flags override both.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub db_path: PathBuf,
    /// Root of the filing tree: <raw_dir>/<regulatory id>/**/*.txt
    pub raw_dir: PathBuf,
    pub funds_seed: PathBuf,
    /// `company_tickers.json` style registry
    pub ticker_registry: PathBuf,
    /// Index membership CSV
    pub index_members: PathBuf,
    /// Ticker → sector/industry/country/description JSON
    pub metadata: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            db_path: PathBuf::from("data/institutional_radar.db"),
            raw_dir: PathBuf::from("data/raw"),
            funds_seed: PathBuf::from("config/funds.yaml"),
            ticker_registry: PathBuf::from("data/company_tickers.json"),
            index_members: PathBuf::from("data/sp500.csv"),
            metadata: PathBuf::from("data/metadata.json"),
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse pipeline config YAML")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// File config when given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
