//! 1-D convolutional regression model mapping a spectrum to a composition
//! vector.
//!
//! Three convolutional feature-extraction blocks (channel widths 32/64/128,
//! shrinking receptive fields 11/7/5, same-length padding) feed a
//! fully-connected regression head (256 and 128 wide) ending in a raw
//! linear output. Batch normalization and dropout are mode-dependent, so
//! every forward pass takes an explicit `train` flag; callers must pick the
//! mode.

use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::{
    batch_norm, conv1d, linear, ops, BatchNorm, BatchNormConfig, Conv1d, Conv1dConfig, Dropout,
    Linear, Module, ModuleT, VarBuilder, VarMap,
};

use crate::error::{NirnetError, Result};

const LEAKY_SLOPE: f64 = 0.1;
const CONV_DROPOUT: f32 = 0.2;
const HEAD_DROPOUT: f32 = 0.5;

/// Convolutional spectrum regressor.
///
/// Owns its parameters through a [`VarMap`]; the trainer mutates them via
/// the optimizer and snapshots them with [`SpectralCnn::save_weights`].
pub struct SpectralCnn {
    conv1: Conv1d,
    bn1: BatchNorm,
    drop1: Dropout,
    conv2: Conv1d,
    bn2: BatchNorm,
    drop2: Dropout,
    conv3: Conv1d,
    bn3: BatchNorm,
    fc1: Linear,
    bn4: BatchNorm,
    drop4: Dropout,
    fc2: Linear,
    bn5: BatchNorm,
    drop5: Dropout,
    fc3: Linear,
    varmap: VarMap,
    input_width: usize,
    output_width: usize,
}

impl SpectralCnn {
    /// Create a model with randomly initialized parameters.
    ///
    /// # Errors
    ///
    /// Returns a `Model` error for an unusable input width, or a candle
    /// error if layer construction fails.
    pub fn new(input_width: usize, output_width: usize, device: &Device) -> Result<Self> {
        if input_width < 2 {
            return Err(NirnetError::Model(format!(
                "input width must be at least 2 (max pooling halves it), got {input_width}"
            )));
        }
        if output_width == 0 {
            return Err(NirnetError::Model("output width must be positive".into()));
        }

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);

        let conv_cfg = |padding| Conv1dConfig {
            padding,
            ..Conv1dConfig::default()
        };
        let conv1 = conv1d(1, 32, 11, conv_cfg(5), vb.pp("conv1"))?;
        let bn1 = batch_norm(32, BatchNormConfig::default(), vb.pp("bn1"))?;
        let conv2 = conv1d(32, 64, 7, conv_cfg(3), vb.pp("conv2"))?;
        let bn2 = batch_norm(64, BatchNormConfig::default(), vb.pp("bn2"))?;
        let conv3 = conv1d(64, 128, 5, conv_cfg(2), vb.pp("conv3"))?;
        let bn3 = batch_norm(128, BatchNormConfig::default(), vb.pp("bn3"))?;

        // Max pooling with window 2 halves the sequence, rounding down.
        let fc_input = 128 * (input_width / 2);
        let fc1 = linear(fc_input, 256, vb.pp("fc1"))?;
        let bn4 = batch_norm(256, BatchNormConfig::default(), vb.pp("bn4"))?;
        let fc2 = linear(256, 128, vb.pp("fc2"))?;
        let bn5 = batch_norm(128, BatchNormConfig::default(), vb.pp("bn5"))?;
        let fc3 = linear(128, output_width, vb.pp("fc3"))?;

        Ok(Self {
            conv1,
            bn1,
            drop1: Dropout::new(CONV_DROPOUT),
            conv2,
            bn2,
            drop2: Dropout::new(CONV_DROPOUT),
            conv3,
            bn3,
            fc1,
            bn4,
            drop4: Dropout::new(HEAD_DROPOUT),
            fc2,
            bn5,
            drop5: Dropout::new(HEAD_DROPOUT),
            fc3,
            varmap,
            input_width,
            output_width,
        })
    }

    /// Forward pass over a `(batch, input_width)` batch of spectra,
    /// returning `(batch, output_width)` predictions.
    ///
    /// `train` selects batch statistics + active dropout (training) versus
    /// running statistics + no dropout (inference).
    ///
    /// # Errors
    ///
    /// Returns a `Model` error on a shape mismatch, or a candle error from
    /// the underlying operations.
    pub fn forward_t(&self, spectra: &Tensor, train: bool) -> Result<Tensor> {
        let dims = spectra.dims();
        if dims.len() != 2 || dims[1] != self.input_width {
            return Err(NirnetError::Model(format!(
                "expected input shape (batch, {}), got {dims:?}",
                self.input_width
            )));
        }

        // (B, N) -> (B, 1, N)
        let xs = spectra.unsqueeze(1)?;

        let xs = self.conv1.forward(&xs)?;
        let xs = self.bn1.forward_t(&xs, train)?;
        let xs = ops::leaky_relu(&xs, LEAKY_SLOPE)?;
        let xs = self.drop1.forward(&xs, train)?;

        let xs = self.conv2.forward(&xs)?;
        let xs = self.bn2.forward_t(&xs, train)?;
        let xs = ops::leaky_relu(&xs, LEAKY_SLOPE)?;
        let xs = self.drop2.forward(&xs, train)?;

        let xs = self.conv3.forward(&xs)?;
        let xs = self.bn3.forward_t(&xs, train)?;
        let xs = ops::leaky_relu(&xs, LEAKY_SLOPE)?;
        // Non-overlapping max pooling over the sequence axis, window 2.
        let xs = xs.unsqueeze(2)?.max_pool2d((1, 2))?.squeeze(2)?;

        let xs = xs.flatten_from(1)?;

        let xs = self.fc1.forward(&xs)?;
        let xs = self.bn4.forward_t(&xs, train)?;
        let xs = ops::leaky_relu(&xs, LEAKY_SLOPE)?;
        let xs = self.drop4.forward(&xs, train)?;

        let xs = self.fc2.forward(&xs)?;
        let xs = self.bn5.forward_t(&xs, train)?;
        let xs = ops::leaky_relu(&xs, LEAKY_SLOPE)?;
        let xs = self.drop5.forward(&xs, train)?;

        Ok(self.fc3.forward(&xs)?)
    }

    /// Spectral channel count the model was built for.
    #[must_use]
    pub fn input_width(&self) -> usize {
        self.input_width
    }

    /// Target component count.
    #[must_use]
    pub fn output_width(&self) -> usize {
        self.output_width
    }

    /// Parameter map, for optimizer construction.
    #[must_use]
    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Snapshot all parameters to a safetensors file.
    ///
    /// # Errors
    ///
    /// Returns a candle error if the write fails.
    pub fn save_weights<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.varmap.save(path)?;
        Ok(())
    }

    /// Restore parameters from a safetensors snapshot written by
    /// [`SpectralCnn::save_weights`]; the round trip is exact.
    ///
    /// # Errors
    ///
    /// Returns a `Checkpoint` error if the snapshot is missing or does not
    /// match the model's parameter names and shapes.
    pub fn load_weights<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.varmap
            .load(path.as_ref())
            .map_err(|e| NirnetError::Checkpoint(format!("failed to load weights: {e}")))
    }
}
