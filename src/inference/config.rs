//! Prediction service configuration
//!
//! Plain serde struct, stored as TOML. The CLI builds one from flags, an
//! optional config file, or both (flags win).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::labels::PLACEHOLDER_PREFIX;
use crate::model::StrainClassifierConfig;
use crate::utils::error::{ClassifierError, Result};

/// Default checkpoint file name inside a model directory
pub const DEFAULT_MODEL_FILE: &str = "model.pt";
/// Default class names file name inside a model directory
pub const DEFAULT_CLASS_NAMES_FILE: &str = "class_names.txt";
/// Number of ranked alternatives returned with each prediction
pub const DEFAULT_TOP_K: usize = 5;
/// Largest `top_k` accepted; the result field is `top_5`
pub const MAX_TOP_K: usize = 5;

fn default_model_path() -> PathBuf {
    PathBuf::from(DEFAULT_MODEL_FILE)
}

fn default_class_names_path() -> PathBuf {
    PathBuf::from(DEFAULT_CLASS_NAMES_FILE)
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_prefix() -> String {
    PLACEHOLDER_PREFIX.to_string()
}

/// Everything the prediction service needs to set itself up
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorConfig {
    /// Checkpoint file (`.pt`, `.pth` or `.mpk`)
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Optional sidecar with one class name per line
    #[serde(default = "default_class_names_path")]
    pub class_names_path: PathBuf,

    /// Length of the ranked list in each result
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Prefix for synthesized names when no sidecar exists
    #[serde(default = "default_prefix")]
    pub fallback_label_prefix: String,

    /// Network layout the checkpoint was trained with
    #[serde(default = "StrainClassifierConfig::new")]
    pub architecture: StrainClassifierConfig,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            class_names_path: default_class_names_path(),
            top_k: DEFAULT_TOP_K,
            fallback_label_prefix: default_prefix(),
            architecture: StrainClassifierConfig::new(),
        }
    }
}

impl PredictorConfig {
    /// `<dir>/model.pt` and `<dir>/class_names.txt`
    pub fn from_model_dir(dir: &Path) -> Self {
        Self {
            model_path: dir.join(DEFAULT_MODEL_FILE),
            class_names_path: dir.join(DEFAULT_CLASS_NAMES_FILE),
            ..Self::default()
        }
    }

    /// Read a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as TOML
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_TOP_K).contains(&self.top_k) {
            return Err(ClassifierError::Configuration(format!(
                "top_k must be between 1 and {}, got {}",
                MAX_TOP_K, self.top_k
            )));
        }
        Ok(())
    }
}
