//! Evaluation over the held-out partition: inference-mode prediction,
//! inverse transformation to physical units and per-component metrics.

use candle_core::Device;

use crate::dataset::SpectraDataset;
use crate::error::{NirnetError, Result};
use crate::model::SpectralCnn;
use crate::preprocess::StandardScaler;

/// Aggregate error metrics for one target component.
#[derive(Debug, Clone)]
pub struct ComponentMetrics {
    /// Component name (e.g. "Moisture").
    pub component: String,
    /// Mean squared error in physical units.
    pub mse: f64,
    /// Coefficient of determination.
    pub r2: f64,
    /// Mean absolute error in physical units.
    pub mae: f64,
}

/// Evaluation result: predictions and truth in physical units plus metrics.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Predicted composition vectors, one row per test sample.
    pub predictions: Vec<Vec<f32>>,
    /// Ground-truth composition vectors, same order.
    pub targets: Vec<Vec<f32>>,
    /// Mean MSE over test batches, on standardized targets.
    pub test_loss: f64,
    /// Per-component aggregate metrics.
    pub metrics: Vec<ComponentMetrics>,
}

/// Runs a fitted model over held-out data.
pub struct Evaluator {
    batch_size: usize,
    device: Device,
}

impl Evaluator {
    /// Create an evaluator with the given batch size.
    #[must_use]
    pub fn new(batch_size: usize, device: Device) -> Self {
        Self { batch_size, device }
    }

    /// Evaluate the model on the test partition.
    ///
    /// Batches are visited in fixed order with the model in inference mode.
    /// Predictions and targets are mapped back to physical units with the
    /// target scaler before metrics are computed.
    ///
    /// # Errors
    ///
    /// Returns an error if a forward pass fails or the component-name count
    /// does not match the target width.
    pub fn evaluate(
        &self,
        model: &SpectralCnn,
        test: &SpectraDataset,
        target_scaler: &StandardScaler,
        component_names: &[String],
    ) -> Result<Evaluation> {
        if component_names.len() != test.output_width() {
            return Err(NirnetError::Training(format!(
                "{} component names for target width {}",
                component_names.len(),
                test.output_width()
            )));
        }

        let indices: Vec<usize> = (0..test.len()).collect();
        let mut scaled_preds: Vec<Vec<f32>> = Vec::with_capacity(test.len());
        let mut scaled_targets: Vec<Vec<f32>> = Vec::with_capacity(test.len());
        let mut total_loss = 0.0f64;
        let mut batches = 0usize;

        for chunk in indices.chunks(self.batch_size) {
            let (xs, ys) = test.batch(chunk, &self.device)?;
            let preds = model.forward_t(&xs, false)?;
            let loss = candle_nn::loss::mse(&preds, &ys)?;
            total_loss += f64::from(loss.to_vec0::<f32>()?);
            batches += 1;

            scaled_preds.extend(preds.to_vec2::<f32>()?);
            scaled_targets.extend(ys.to_vec2::<f32>()?);
        }

        #[allow(clippy::cast_precision_loss)]
        let test_loss = total_loss / batches as f64;
        tracing::info!("test loss (standardized): {test_loss:.6}");

        let predictions = target_scaler.inverse_transform(&scaled_preds)?;
        let targets = target_scaler.inverse_transform(&scaled_targets)?;

        let metrics = component_names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let truth: Vec<f64> = targets.iter().map(|r| f64::from(r[i])).collect();
                let pred: Vec<f64> = predictions.iter().map(|r| f64::from(r[i])).collect();
                ComponentMetrics {
                    component: name.clone(),
                    mse: mean_squared_error(&truth, &pred),
                    r2: r2_score(&truth, &pred),
                    mae: mean_absolute_error(&truth, &pred),
                }
            })
            .collect();

        Ok(Evaluation {
            predictions,
            targets,
            test_loss,
            metrics,
        })
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean_squared_error(truth: &[f64], pred: &[f64]) -> f64 {
    let n = truth.len() as f64;
    truth
        .iter()
        .zip(pred)
        .map(|(t, p)| (t - p) * (t - p))
        .sum::<f64>()
        / n
}

#[allow(clippy::cast_precision_loss)]
fn mean_absolute_error(truth: &[f64], pred: &[f64]) -> f64 {
    let n = truth.len() as f64;
    truth.iter().zip(pred).map(|(t, p)| (t - p).abs()).sum::<f64>() / n
}

/// Coefficient of determination; zero-variance truth yields 0.0 rather
/// than a division by zero.
#[allow(clippy::cast_precision_loss)]
fn r2_score(truth: &[f64], pred: &[f64]) -> f64 {
    let n = truth.len() as f64;
    let mean = truth.iter().sum::<f64>() / n;
    let ss_tot: f64 = truth.iter().map(|t| (t - mean) * (t - mean)).sum();
    if ss_tot <= f64::EPSILON {
        return 0.0;
    }
    let ss_res: f64 = truth
        .iter()
        .zip(pred)
        .map(|(t, p)| (t - p) * (t - p))
        .sum();
    1.0 - ss_res / ss_tot
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mse_and_mae_known_values() {
        let truth = [1.0, 2.0, 3.0];
        let pred = [1.0, 3.0, 5.0];
        assert!((mean_squared_error(&truth, &pred) - 5.0 / 3.0).abs() < 1e-12);
        assert!((mean_absolute_error(&truth, &pred) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_r2_perfect_prediction() {
        let truth = [1.0, 2.0, 3.0, 4.0];
        assert!((r2_score(&truth, &truth) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_r2_mean_prediction_is_zero() {
        let truth = [1.0, 2.0, 3.0, 4.0];
        let pred = [2.5, 2.5, 2.5, 2.5];
        assert!(r2_score(&truth, &pred).abs() < 1e-12);
    }

    #[test]
    fn test_r2_zero_variance_guard() {
        let truth = [2.0, 2.0, 2.0];
        let pred = [1.0, 2.0, 3.0];
        assert_eq!(r2_score(&truth, &pred), 0.0);
    }

    #[test]
    fn test_evaluate_returns_physical_units() {
        use candle_core::Device;

        let device = Device::Cpu;
        // Targets in a far-from-standardized range so the inverse transform
        // is observable.
        let spectra: Vec<Vec<f32>> = (0..12)
            .map(|i| (0..8).map(|j| ((i + j) as f32 * 0.2).cos()).collect())
            .collect();
        let targets: Vec<Vec<f32>> = (0..12).map(|i| vec![100.0 + i as f32, 50.0]).collect();

        let scaler = StandardScaler::fit(&targets).unwrap();
        let standardized = SpectraDataset::new(
            spectra,
            scaler.transform(&targets).unwrap(),
        )
        .unwrap();

        let model = SpectralCnn::new(8, 2, &device).unwrap();
        let evaluator = Evaluator::new(4, device);
        let names = vec!["Moisture".to_string(), "Oil".to_string()];
        let eval = evaluator
            .evaluate(&model, &standardized, &scaler, &names)
            .unwrap();

        assert_eq!(eval.predictions.len(), 12);
        assert_eq!(eval.metrics.len(), 2);
        assert!(eval.test_loss.is_finite());
        // Ground truth must round-trip exactly through the scaler.
        for (i, row) in eval.targets.iter().enumerate() {
            assert!((row[0] - (100.0 + i as f32)).abs() < 1e-4);
            assert!((row[1] - 50.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_evaluate_rejects_name_mismatch() {
        use candle_core::Device;

        let device = Device::Cpu;
        let dataset = SpectraDataset::new(
            vec![vec![0.0f32; 8]; 4],
            vec![vec![0.0f32, 1.0]; 4],
        )
        .unwrap();
        let scaler = StandardScaler::fit(dataset.targets()).unwrap();
        let model = SpectralCnn::new(8, 2, &device).unwrap();
        let evaluator = Evaluator::new(4, device);

        let names = vec!["Moisture".to_string()];
        assert!(evaluator
            .evaluate(&model, &dataset, &scaler, &names)
            .is_err());
    }
}
