//! Paired spectrum/target samples, seeded splitting and batch assembly.

use candle_core::{Device, Tensor};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{NirnetError, Result};

/// An ordered collection of paired (spectrum, target) samples.
///
/// Invariants checked at construction: equal sample counts, all spectra the
/// same length, all targets the same length.
#[derive(Debug, Clone)]
pub struct SpectraDataset {
    spectra: Vec<Vec<f32>>,
    targets: Vec<Vec<f32>>,
}

/// Result of a seeded train/test partition.
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    /// Training partition.
    pub train: SpectraDataset,
    /// Held-out test partition.
    pub test: SpectraDataset,
}

impl SpectraDataset {
    /// Build a dataset from parallel spectrum and target rows.
    ///
    /// # Errors
    ///
    /// Returns a `Preprocess` error if the collections are empty, have
    /// mismatched lengths, or contain ragged rows.
    pub fn new(spectra: Vec<Vec<f32>>, targets: Vec<Vec<f32>>) -> Result<Self> {
        if spectra.is_empty() {
            return Err(NirnetError::Preprocess("dataset has no samples".into()));
        }
        if spectra.len() != targets.len() {
            return Err(NirnetError::Preprocess(format!(
                "{} spectra but {} targets",
                spectra.len(),
                targets.len()
            )));
        }
        let input_width = spectra[0].len();
        if spectra.iter().any(|s| s.len() != input_width) {
            return Err(NirnetError::Preprocess(
                "spectra have inconsistent lengths".into(),
            ));
        }
        let output_width = targets[0].len();
        if targets.iter().any(|t| t.len() != output_width) {
            return Err(NirnetError::Preprocess(
                "targets have inconsistent lengths".into(),
            ));
        }
        Ok(Self { spectra, targets })
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    /// Whether the dataset holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }

    /// Spectral channel count.
    #[must_use]
    pub fn input_width(&self) -> usize {
        self.spectra[0].len()
    }

    /// Target component count.
    #[must_use]
    pub fn output_width(&self) -> usize {
        self.targets[0].len()
    }

    /// Spectrum rows.
    #[must_use]
    pub fn spectra(&self) -> &[Vec<f32>] {
        &self.spectra
    }

    /// Target rows.
    #[must_use]
    pub fn targets(&self) -> &[Vec<f32>] {
        &self.targets
    }

    /// Partition into train and test sets.
    ///
    /// Indices are shuffled with a `ChaCha8Rng` seeded from `seed`, so the
    /// assignment is reproducible for a given (size, seed) pair. The test
    /// partition receives `floor(len * test_fraction)` samples; the
    /// remainder always lands in train.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if the fraction leaves either partition
    /// empty.
    pub fn split(&self, test_fraction: f64, seed: u64) -> Result<TrainTestSplit> {
        #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
        #[allow(clippy::cast_possible_truncation)]
        let test_len = (self.len() as f64 * test_fraction).floor() as usize;
        let train_len = self.len() - test_len;
        if test_len == 0 || train_len == 0 {
            return Err(NirnetError::Config(format!(
                "test fraction {test_fraction} leaves an empty partition for {} samples",
                self.len()
            )));
        }

        let mut indices: Vec<usize> = (0..self.len()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        indices.shuffle(&mut rng);

        let gather = |idx: &[usize]| -> Self {
            Self {
                spectra: idx.iter().map(|&i| self.spectra[i].clone()).collect(),
                targets: idx.iter().map(|&i| self.targets[i].clone()).collect(),
            }
        };

        Ok(TrainTestSplit {
            train: gather(&indices[..train_len]),
            test: gather(&indices[train_len..]),
        })
    }

    /// Assemble the samples at `indices` into a pair of batch tensors of
    /// shapes `(B, input_width)` and `(B, output_width)`.
    ///
    /// # Errors
    ///
    /// Returns an error if an index is out of range or tensor construction
    /// fails.
    pub fn batch(&self, indices: &[usize], device: &Device) -> Result<(Tensor, Tensor)> {
        let mut xs = Vec::with_capacity(indices.len() * self.input_width());
        let mut ys = Vec::with_capacity(indices.len() * self.output_width());
        for &i in indices {
            let spectrum = self.spectra.get(i).ok_or_else(|| {
                NirnetError::Training(format!("batch index {i} out of range"))
            })?;
            xs.extend_from_slice(spectrum);
            ys.extend_from_slice(&self.targets[i]);
        }
        let xs = Tensor::from_vec(xs, (indices.len(), self.input_width()), device)?;
        let ys = Tensor::from_vec(ys, (indices.len(), self.output_width()), device)?;
        Ok((xs, ys))
    }
}
