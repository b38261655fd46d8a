//! # nirnet-rs
//!
//! Near-infrared spectroscopy composition regression: predicts moisture,
//! oil, protein and starch content of grain samples from absorbance
//! spectra with a 1-D convolutional network.
//!
//! ## Pipeline
//!
//! - **Preprocessing** - Savitzky-Golay smoothing, SNV scatter correction,
//!   z-score standardization fit on the training partition.
//! - **Training** - shuffled mini-batches, AdamW, plateau learning-rate
//!   scheduling, early stopping with best-checkpoint restore.
//! - **Evaluation** - inference-mode prediction, inverse transform to
//!   physical units, per-component MSE/R²/MAE.
//! - **Importance** - perturbation sensitivity probe over the wavelength
//!   channels.
//!
//! ## Quick start
//!
//! ```no_run
//! use candle_core::Device;
//! use nirnet_rs::{pipeline, NirnetConfig};
//!
//! # fn main() -> nirnet_rs::Result<()> {
//! let config = NirnetConfig::from_file("config.yaml")?;
//! let artifacts = pipeline::run(&config, &Device::Cpu)?;
//! println!("trained for {} epochs", artifacts.history.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod dataset;
pub mod error;
pub mod evaluate;
pub mod importance;
pub mod model;
pub mod optimizer;
pub mod pipeline;
pub mod preprocess;
pub mod report;
pub mod scheduler;
pub mod table;
pub mod trainer;

pub use config::{NirnetConfig, TrainingConfig};
pub use error::{NirnetError, Result};
pub use model::SpectralCnn;
pub use trainer::{Trainer, TrainerStatus};
