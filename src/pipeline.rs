//! End-to-end run orchestration: table in, trained model and CSV exports
//! out.
//!
//! The stages run strictly sequentially; each one's output is the next
//! one's input. Per-spectrum corrections (smoothing, SNV) are applied
//! before splitting since they see one sample at a time, while the scalers
//! are fit on the training partition only.

use std::path::Path;

use candle_core::Device;

use crate::config::NirnetConfig;
use crate::dataset::SpectraDataset;
use crate::error::Result;
use crate::evaluate::{Evaluation, Evaluator};
use crate::importance::{FeatureImportance, ImportanceAnalyzer};
use crate::model::SpectralCnn;
use crate::preprocess::{apply_signal_corrections, StandardScaler};
use crate::report;
use crate::table::SpectralTable;
use crate::trainer::{EpochRecord, Trainer, TrainerStatus};

/// File name of the final trained-model artifact.
pub const FINAL_MODEL: &str = "model.safetensors";

/// Everything a run produces, returned by value for the caller to inspect.
#[derive(Debug)]
pub struct RunArtifacts {
    /// Per-epoch training losses.
    pub history: Vec<EpochRecord>,
    /// How the epoch loop ended.
    pub status: TrainerStatus,
    /// Test-set evaluation in physical units.
    pub evaluation: Evaluation,
    /// Wavelength importances from the perturbation probe.
    pub importance: FeatureImportance,
}

/// Execute a full run from a validated configuration.
///
/// # Errors
///
/// Returns the first error from any stage: input parsing, preprocessing,
/// training, checkpointing, evaluation, analysis or export.
pub fn run(config: &NirnetConfig, device: &Device) -> Result<RunArtifacts> {
    config.validate()?;

    let table = SpectralTable::from_csv(&config.input)?;

    let spectra = apply_signal_corrections(&table.spectra, &config.preprocess)?;
    let dataset = SpectraDataset::new(spectra, table.targets.clone())?;
    let split = dataset.split(config.split.test_fraction, config.seed)?;
    tracing::info!(
        "split: {} training samples, {} test samples",
        split.train.len(),
        split.test.len()
    );

    // Scalers see training data only; test statistics never leak into the
    // fit.
    let spectrum_scaler = StandardScaler::fit(split.train.spectra())?;
    let target_scaler = StandardScaler::fit(split.train.targets())?;

    let train = SpectraDataset::new(
        spectrum_scaler.transform(split.train.spectra())?,
        target_scaler.transform(split.train.targets())?,
    )?;
    let test = SpectraDataset::new(
        spectrum_scaler.transform(split.test.spectra())?,
        target_scaler.transform(split.test.targets())?,
    )?;

    let mut model = SpectralCnn::new(train.input_width(), train.output_width(), device)?;
    let mut trainer = Trainer::new(
        config.training.clone(),
        &config.output_dir,
        config.seed,
        device.clone(),
    );
    let history = trainer.fit(&mut model, &train)?;

    let final_path = Path::new(&config.output_dir).join(FINAL_MODEL);
    model.save_weights(&final_path)?;
    tracing::info!("saved final model to {}", final_path.display());

    let evaluator = Evaluator::new(config.training.batch_size, device.clone());
    let evaluation = evaluator.evaluate(&model, &test, &target_scaler, &table.component_names)?;
    for m in &evaluation.metrics {
        tracing::info!(
            "{}: MSE {:.4}, R2 {:.4}, MAE {:.4}",
            m.component,
            m.mse,
            m.r2,
            m.mae
        );
    }

    let analyzer = ImportanceAnalyzer::new(config.seed, device.clone());
    let importance = analyzer.analyze(&model, &table.wavelengths)?;

    let out = Path::new(&config.output_dir);
    report::write_predictions_csv(
        out.join("predictions.csv"),
        &evaluation,
        &table.component_names,
    )?;
    report::write_metrics_csv(out.join("metrics.csv"), &evaluation.metrics)?;
    report::write_importance_csv(
        out.join("feature_importance.csv"),
        &table.wavelengths,
        &importance,
    )?;
    report::write_top_wavelengths_csv(out.join("top_wavelengths.csv"), &importance)?;

    Ok(RunArtifacts {
        history,
        status: trainer.status(),
        evaluation,
        importance,
    })
}
