//! Perturbation-based feature-importance probe.
//!
//! An O(N) independent-perturbation sensitivity sweep, not a gradient
//! saliency method: it only needs forward evaluation. Each wavelength
//! channel of a fixed probe spectrum is nudged in isolation and the
//! Euclidean norm of the output shift is that channel's raw importance.

use candle_core::{Device, Tensor};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::error::{NirnetError, Result};
use crate::model::SpectralCnn;

const PERTURBATION: f32 = 0.1;
const TOP_K: usize = 10;

/// Normalized channel importances plus the strongest wavelengths.
#[derive(Debug, Clone)]
pub struct FeatureImportance {
    /// Importance per channel, aligned to the wavelength labels and scaled
    /// so the most sensitive channel is exactly 1.0.
    pub importances: Vec<f32>,
    /// The strongest (wavelength, importance) pairs, descending.
    pub top: Vec<(f64, f32)>,
}

/// Importance analyzer over a fitted model in inference mode.
pub struct ImportanceAnalyzer {
    seed: u64,
    device: Device,
}

impl ImportanceAnalyzer {
    /// Create an analyzer; `seed` fixes the probe spectrum.
    #[must_use]
    pub fn new(seed: u64, device: Device) -> Self {
        Self { seed, device }
    }

    /// Probe the model around a standard-normal spectrum.
    ///
    /// # Errors
    ///
    /// Returns an `Importance` error if the wavelength count does not match
    /// the model input width or every perturbation leaves the output
    /// unchanged (normalization would be undefined).
    pub fn analyze(&self, model: &SpectralCnn, wavelengths: &[f64]) -> Result<FeatureImportance> {
        let n = wavelengths.len();
        if n != model.input_width() {
            return Err(NirnetError::Importance(format!(
                "{n} wavelength labels for model input width {}",
                model.input_width()
            )));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let probe: Vec<f32> = (0..n).map(|_| StandardNormal.sample(&mut rng)).collect();

        let baseline_input = Tensor::from_vec(probe.clone(), (1, n), &self.device)?;
        let baseline = model.forward_t(&baseline_input, false)?;

        let mut raw = vec![0.0f32; n];
        for (i, slot) in raw.iter_mut().enumerate() {
            let mut perturbed = probe.clone();
            perturbed[i] += PERTURBATION;
            let input = Tensor::from_vec(perturbed, (1, n), &self.device)?;
            let output = model.forward_t(&input, false)?;
            let delta = (output - &baseline)?;
            *slot = delta.sqr()?.sum_all()?.sqrt()?.to_vec0::<f32>()?;
        }

        let max = raw.iter().copied().fold(0.0f32, f32::max);
        if max <= 0.0 {
            return Err(NirnetError::Importance(
                "all channel perturbations left the output unchanged".into(),
            ));
        }
        let importances: Vec<f32> = raw.iter().map(|v| v / max).collect();

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            importances[b]
                .partial_cmp(&importances[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let top: Vec<(f64, f32)> = order
            .iter()
            .take(TOP_K)
            .map(|&i| (wavelengths[i], importances[i]))
            .collect();

        for (wavelength, importance) in &top {
            tracing::info!("wavelength {wavelength:.1} nm: importance {importance:.4}");
        }

        Ok(FeatureImportance { importances, top })
    }
}
