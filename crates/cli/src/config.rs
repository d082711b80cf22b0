use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tally_import::{InstitutionProfile, Institutions};
use tally_pipeline::{Pipeline, PipelineConfig};

pub const DEFAULT_CONFIG: &str = "tally.toml";

/// Top-level keys; the flattened pipeline sections cannot deny unknown
/// fields through serde.
const KNOWN_KEYS: &[&str] = &["database", "institutions", "nullifier", "categories", "tags"];

/// Everything read from the configuration file, built once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_database")]
    pub database: PathBuf,
    #[serde(default)]
    pub institutions: Vec<InstitutionProfile>,
    #[serde(flatten)]
    pub pipeline: PipelineConfig,
}

fn default_database() -> PathBuf {
    PathBuf::from("tally.db")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: default_database(),
            institutions: Vec::new(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self> {
        let table: toml::Table = content.parse()?;
        if let Some(key) = table.keys().find(|k| !KNOWN_KEYS.contains(&k.as_str())) {
            bail!(
                "Unknown configuration key '{key}', expected one of: {}",
                KNOWN_KEYS.join(", ")
            );
        }
        let config: Config = toml::from_str(content)?;
        // Fail at startup rather than mid-batch on a bad rule.
        config.pipeline.build()?;
        Ok(config)
    }

    /// Loads `path`, or `tally.toml` when none is given. A missing default
    /// file yields the default configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG), false),
        };
        if !explicit && !path.exists() {
            tracing::info!("No {} found, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Reading config file: {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("Parsing config file: {}", path.display()))
    }

    pub fn institutions(&self) -> Institutions {
        Institutions::builtin().with_profiles(self.institutions.iter().cloned())
    }

    pub fn pipeline(&self) -> Result<Pipeline> {
        Ok(self.pipeline.build()?)
    }
}
