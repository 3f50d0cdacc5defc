//! Configuration types and parsing for taxflow.yml

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Pipeline configuration from taxflow.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// A single CSV extract or a directory of `*.csv` extracts
    pub input_path: String,

    /// Root of all output layers
    pub output_dir: String,

    /// Logical source name used to partition layer outputs
    #[serde(default = "default_source_name")]
    pub source_name: String,

    /// Per-layer directory overrides
    #[serde(default)]
    pub layers: LayerConfig,

    /// Where processed extracts are moved after a successful run.
    /// Extracts stay in place when unset.
    #[serde(default)]
    pub archive_dir: Option<String>,

    /// Column rename map: target column name -> source header
    #[serde(default)]
    pub columns: BTreeMap<String, String>,

    /// Columns the extract is expected to carry
    #[serde(default)]
    pub required_columns: Vec<String>,

    /// Quality rule settings
    #[serde(default, alias = "quality_tolerance")]
    pub quality: QualityConfig,

    /// Incremental load settings
    #[serde(default)]
    pub incremental: IncrementalConfig,
}

/// Directory overrides for each output layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerConfig {
    #[serde(default)]
    pub landing_dir: Option<String>,
    #[serde(default)]
    pub raw_dir: Option<String>,
    #[serde(default)]
    pub staging_dir: Option<String>,
    #[serde(default)]
    pub curated_dir: Option<String>,
    #[serde(default)]
    pub datamart_dir: Option<String>,
}

/// Quality rule settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QualityConfig {
    /// Allowed absolute gap between `annual_income - total_reliefs` and
    /// `chargeable_income`
    #[serde(default = "default_income_tolerance", alias = "income_diff")]
    pub income_tolerance: f64,

    /// Sample rows kept per failing rule in quarantine reports
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            income_tolerance: default_income_tolerance(),
            sample_size: default_sample_size(),
        }
    }
}

/// Incremental load settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IncrementalConfig {
    /// Enable the watermark and the file ledger
    #[serde(default)]
    pub enabled: bool,

    /// Column holding the monotonic watermark value
    #[serde(default = "default_watermark_key")]
    pub key: String,

    /// Location of the ledger state file (default: `<output_dir>/metadata/state.json`)
    #[serde(default)]
    pub state_path: Option<String>,

    /// Keep rows older than the stored watermark
    #[serde(default)]
    pub allow_backfill: bool,

    /// Skip extracts whose fingerprint is already in the ledger
    #[serde(default)]
    pub track_files: bool,
}

impl Default for IncrementalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            key: default_watermark_key(),
            state_path: None,
            allow_backfill: false,
            track_files: false,
        }
    }
}

fn default_source_name() -> String {
    "unknown_source".to_string()
}

fn default_income_tolerance() -> f64 {
    0.01
}

fn default_sample_size() -> usize {
    3
}

fn default_watermark_key() -> String {
    "assessment_year".to_string()
}

/// Output layers of the warehouse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Landing,
    Raw,
    Staging,
    Curated,
    Datamart,
}

impl Layer {
    fn default_dir(self) -> &'static str {
        match self {
            Layer::Landing => "landing",
            Layer::Raw => "raw",
            Layer::Staging => "staging",
            Layer::Curated => "curated",
            Layer::Datamart => "datamart",
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.default_dir())
    }
}

impl PipelineConfig {
    /// Load configuration from a file path
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::io_at(path, e))?;
        Self::from_yaml(&content)
    }

    /// Load configuration from a project directory
    /// Looks for taxflow.yml or taxflow.yaml
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        let yml_path = dir.join("taxflow.yml");
        let yaml_path = dir.join("taxflow.yaml");

        if yml_path.exists() {
            Self::load(&yml_path)
        } else if yaml_path.exists() {
            Self::load(&yaml_path)
        } else {
            Err(CoreError::ConfigNotFound {
                path: yml_path.display().to_string(),
            })
        }
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml(content: &str) -> CoreResult<Self> {
        let config: PipelineConfig =
            serde_yaml::from_str(content).map_err(|e| CoreError::ConfigParseError {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> CoreResult<()> {
        if self.input_path.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "input_path cannot be empty".to_string(),
            });
        }
        if self.output_dir.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "output_dir cannot be empty".to_string(),
            });
        }
        if !self.quality.income_tolerance.is_finite() || self.quality.income_tolerance < 0.0 {
            return Err(CoreError::ConfigInvalid {
                message: format!(
                    "quality.income_tolerance must be a non-negative number, got {}",
                    self.quality.income_tolerance
                ),
            });
        }
        if self.incremental.enabled && self.incremental.key.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "incremental.key cannot be empty when incremental is enabled"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Resolve every relative path in the config against `root`
    pub fn resolve_paths(&mut self, root: &Path) {
        let resolve = |p: &mut String| {
            let path = Path::new(p.as_str());
            if path.is_relative() {
                *p = root.join(path).display().to_string();
            }
        };
        resolve(&mut self.input_path);
        resolve(&mut self.output_dir);
        for dir in [
            &mut self.layers.landing_dir,
            &mut self.layers.raw_dir,
            &mut self.layers.staging_dir,
            &mut self.layers.curated_dir,
            &mut self.layers.datamart_dir,
            &mut self.archive_dir,
            &mut self.incremental.state_path,
        ]
        .into_iter()
        .flatten()
        {
            resolve(dir);
        }
    }

    /// Directory for an output layer
    pub fn layer_dir(&self, layer: Layer) -> PathBuf {
        let configured = match layer {
            Layer::Landing => &self.layers.landing_dir,
            Layer::Raw => &self.layers.raw_dir,
            Layer::Staging => &self.layers.staging_dir,
            Layer::Curated => &self.layers.curated_dir,
            Layer::Datamart => &self.layers.datamart_dir,
        };
        match configured {
            Some(dir) => PathBuf::from(dir),
            None => Path::new(&self.output_dir).join(layer.default_dir()),
        }
    }

    /// Quarantine partitions live under the staging layer
    pub fn quarantine_dir(&self) -> PathBuf {
        self.layer_dir(Layer::Staging).join("quarantine")
    }

    /// Directory for ledger listings and the default state file
    pub fn metadata_dir(&self) -> PathBuf {
        Path::new(&self.output_dir).join("metadata")
    }

    /// Location of the watermark ledger state file
    pub fn state_path(&self) -> PathBuf {
        match &self.incremental.state_path {
            Some(path) => PathBuf::from(path),
            None => self.metadata_dir().join("state.json"),
        }
    }

    /// Source-to-target rename pairs with normalised source headers
    pub fn rename_map(&self) -> BTreeMap<String, String> {
        self.columns
            .iter()
            .filter(|(_, source)| !source.trim().is_empty())
            .map(|(target, source)| (crate::ingest::normalize_column(source), target.clone()))
            .collect()
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
