//! Configuration parsing and validation.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NirnetError, Result};

/// Main configuration for a regression run.
///
/// Loaded from a YAML file; every section except `input` has sensible
/// defaults matching the reference corn dataset setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NirnetConfig {
    /// Input table configuration.
    pub input: InputConfig,

    /// Signal preprocessing options.
    #[serde(default)]
    pub preprocess: PreprocessConfig,

    /// Train/test split options.
    #[serde(default)]
    pub split: SplitConfig,

    /// Training hyperparameters.
    #[serde(default)]
    pub training: TrainingConfig,

    /// Output directory for checkpoints and exports.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Random seed for splitting, batch shuffling and the importance probe.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_output_dir() -> String {
    "./outputs".into()
}

fn default_seed() -> u64 {
    2
}

/// Input table configuration (see the table module for the column contract).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Path to the CSV table of spectra and targets.
    pub path: String,

    /// Number of leading non-spectral metadata columns to ignore.
    #[serde(default = "default_metadata_columns")]
    pub metadata_columns: usize,

    /// Names of the target composition columns, in reporting order.
    #[serde(default = "default_target_columns")]
    pub target_columns: Vec<String>,
}

fn default_metadata_columns() -> usize {
    4
}

fn default_target_columns() -> Vec<String> {
    vec![
        "Moisture".into(),
        "Oil".into(),
        "Protein".into(),
        "Starch".into(),
    ]
}

/// Signal preprocessing options, applied in fixed order:
/// smoothing, then scatter correction, then standardization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Apply Savitzky-Golay smoothing.
    #[serde(default = "default_true")]
    pub smoothing: bool,

    /// Smoothing window length (odd, greater than `polyorder`).
    #[serde(default = "default_window")]
    pub window: usize,

    /// Smoothing polynomial order.
    #[serde(default = "default_polyorder")]
    pub polyorder: usize,

    /// Apply standard normal variate scatter correction.
    #[serde(default = "default_true")]
    pub snv: bool,
}

fn default_true() -> bool {
    true
}

fn default_window() -> usize {
    7
}

fn default_polyorder() -> usize {
    3
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            smoothing: true,
            window: default_window(),
            polyorder: default_polyorder(),
            snv: true,
        }
    }
}

/// Train/test split options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of samples held out for testing.
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
}

fn default_test_fraction() -> f64 {
    0.3
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: default_test_fraction(),
        }
    }
}

/// Training hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Maximum number of epochs.
    #[serde(default = "default_epochs")]
    pub epochs: usize,

    /// Mini-batch size.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Initial learning rate.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    /// Weight decay.
    #[serde(default = "default_weight_decay")]
    pub weight_decay: f64,

    /// Epochs without improvement before the scheduler reduces the
    /// learning rate.
    #[serde(default = "default_scheduler_patience")]
    pub scheduler_patience: usize,

    /// Multiplier applied to the learning rate on a plateau.
    #[serde(default = "default_scheduler_factor")]
    pub scheduler_factor: f64,

    /// Epochs without improvement before training halts early.
    #[serde(default = "default_early_stop_patience")]
    pub early_stop_patience: usize,
}

fn default_epochs() -> usize {
    200
}
fn default_batch_size() -> usize {
    8
}
fn default_learning_rate() -> f64 {
    5e-4
}
fn default_weight_decay() -> f64 {
    1e-5
}
fn default_scheduler_patience() -> usize {
    10
}
fn default_scheduler_factor() -> f64 {
    0.5
}
fn default_early_stop_patience() -> usize {
    20
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            learning_rate: default_learning_rate(),
            weight_decay: default_weight_decay(),
            scheduler_patience: default_scheduler_patience(),
            scheduler_factor: default_scheduler_factor(),
            early_stop_patience: default_early_stop_patience(),
        }
    }
}

impl NirnetConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Write configuration to a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// A runnable default configuration pointing at the given input table.
    #[must_use]
    pub fn with_input(path: &str) -> Self {
        Self {
            input: InputConfig {
                path: path.to_string(),
                metadata_columns: default_metadata_columns(),
                target_columns: default_target_columns(),
            },
            preprocess: PreprocessConfig::default(),
            split: SplitConfig::default(),
            training: TrainingConfig::default(),
            output_dir: default_output_dir(),
            seed: default_seed(),
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.input.path.is_empty() {
            return Err(NirnetError::Config("input path cannot be empty".into()));
        }
        if self.input.target_columns.is_empty() {
            return Err(NirnetError::Config(
                "at least one target column is required".into(),
            ));
        }
        if self.preprocess.smoothing {
            if self.preprocess.window % 2 == 0 {
                return Err(NirnetError::Config(format!(
                    "smoothing window must be odd, got {}",
                    self.preprocess.window
                )));
            }
            if self.preprocess.window <= self.preprocess.polyorder {
                return Err(NirnetError::Config(format!(
                    "smoothing window ({}) must exceed polynomial order ({})",
                    self.preprocess.window, self.preprocess.polyorder
                )));
            }
        }
        if !(self.split.test_fraction > 0.0 && self.split.test_fraction < 1.0) {
            return Err(NirnetError::Config(format!(
                "test fraction must be in (0, 1), got {}",
                self.split.test_fraction
            )));
        }
        let t = &self.training;
        if t.epochs == 0 {
            return Err(NirnetError::Config("epochs must be positive".into()));
        }
        if t.batch_size == 0 {
            return Err(NirnetError::Config("batch size must be positive".into()));
        }
        if !(t.learning_rate > 0.0) {
            return Err(NirnetError::Config(format!(
                "learning rate must be positive, got {}",
                t.learning_rate
            )));
        }
        if t.weight_decay < 0.0 {
            return Err(NirnetError::Config(format!(
                "weight decay must be non-negative, got {}",
                t.weight_decay
            )));
        }
        if !(t.scheduler_factor > 0.0 && t.scheduler_factor < 1.0) {
            return Err(NirnetError::Config(format!(
                "scheduler factor must be in (0, 1), got {}",
                t.scheduler_factor
            )));
        }
        if t.scheduler_patience == 0 || t.early_stop_patience == 0 {
            return Err(NirnetError::Config(
                "scheduler and early-stop patience must be positive".into(),
            ));
        }
        if self.output_dir.is_empty() {
            return Err(NirnetError::Config("output dir cannot be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_training_config() {
        let config = TrainingConfig::default();
        assert_eq!(config.epochs, 200);
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.learning_rate, 5e-4);
        assert_eq!(config.weight_decay, 1e-5);
        assert_eq!(config.scheduler_patience, 10);
        assert_eq!(config.scheduler_factor, 0.5);
        assert_eq!(config.early_stop_patience, 20);
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = NirnetConfig::with_input("corn.csv");
        assert!(config.validate().is_ok());
        assert_eq!(config.input.metadata_columns, 4);
        assert_eq!(config.input.target_columns.len(), 4);
        assert_eq!(config.split.test_fraction, 0.3);
    }

    #[test]
    fn test_yaml_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");

        let config = NirnetConfig::with_input("corn.csv");
        config.to_file(&path).unwrap();

        let loaded = NirnetConfig::from_file(&path).unwrap();
        assert_eq!(loaded.input.path, "corn.csv");
        assert_eq!(loaded.training.epochs, config.training.epochs);
        assert_eq!(loaded.seed, config.seed);
    }

    #[test]
    fn test_partial_yaml_applies_defaults() {
        let yaml = "input:\n  path: corn.csv\n";
        let config: NirnetConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.preprocess.smoothing);
        assert_eq!(config.preprocess.window, 7);
        assert_eq!(config.training.batch_size, 8);
        assert_eq!(config.output_dir, "./outputs");
    }

    #[test]
    fn test_validate_rejects_even_window() {
        let mut config = NirnetConfig::with_input("corn.csv");
        config.preprocess.window = 6;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_test_fraction() {
        let mut config = NirnetConfig::with_input("corn.csv");
        config.split.test_fraction = 1.0;
        assert!(config.validate().is_err());
        config.split.test_fraction = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_learning_rate() {
        let mut config = NirnetConfig::with_input("corn.csv");
        config.training.learning_rate = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_input_path() {
        let config = NirnetConfig::with_input("");
        assert!(config.validate().is_err());
    }
}
