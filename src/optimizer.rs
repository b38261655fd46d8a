//! Optimizer wrapper over candle's AdamW.

use candle_core::Tensor;
use candle_nn::{Optimizer, ParamsAdamW, VarMap};

use crate::error::{NirnetError, Result};

/// Optimizer configuration.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Learning rate
    pub learning_rate: f64,
    /// Beta1 for Adam
    pub beta1: f64,
    /// Beta2 for Adam
    pub beta2: f64,
    /// Weight decay
    pub weight_decay: f64,
    /// Epsilon for numerical stability
    pub eps: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 5e-4,
            beta1: 0.9,
            beta2: 0.999,
            weight_decay: 1e-5,
            eps: 1e-8,
        }
    }
}

impl OptimizerConfig {
    /// Create an AdamW optimizer over all variables in the map.
    ///
    /// # Errors
    ///
    /// Returns an error if the optimizer cannot be created.
    pub fn build_adamw(&self, varmap: &VarMap) -> Result<AdamWOptimizer> {
        let vars = varmap.all_vars();
        let params = ParamsAdamW {
            lr: self.learning_rate,
            beta1: self.beta1,
            beta2: self.beta2,
            eps: self.eps,
            weight_decay: self.weight_decay,
        };

        let opt = candle_nn::AdamW::new(vars, params)
            .map_err(|e| NirnetError::Training(format!("failed to create AdamW: {e}")))?;

        Ok(AdamWOptimizer { inner: opt })
    }
}

/// AdamW optimizer wrapper.
pub struct AdamWOptimizer {
    inner: candle_nn::AdamW,
}

impl AdamWOptimizer {
    /// Backward pass plus a single in-place parameter update.
    ///
    /// # Errors
    ///
    /// Returns an error if the step fails.
    pub fn step(&mut self, loss: &Tensor) -> Result<()> {
        self.inner
            .backward_step(loss)
            .map_err(|e| NirnetError::Training(format!("optimizer step failed: {e}")))
    }

    /// Get current learning rate.
    #[must_use]
    pub fn learning_rate(&self) -> f64 {
        self.inner.learning_rate()
    }

    /// Set learning rate (used by the scheduler).
    pub fn set_learning_rate(&mut self, lr: f64) {
        self.inner.set_learning_rate(lr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimizer_config_default() {
        let config = OptimizerConfig::default();
        assert_eq!(config.learning_rate, 5e-4);
        assert_eq!(config.beta1, 0.9);
        assert_eq!(config.beta2, 0.999);
        assert_eq!(config.weight_decay, 1e-5);
    }

    #[test]
    fn test_build_adamw() -> Result<()> {
        let config = OptimizerConfig::default();
        let varmap = VarMap::new();

        let optimizer = config.build_adamw(&varmap)?;
        assert_eq!(optimizer.learning_rate(), 5e-4);

        Ok(())
    }

    #[test]
    fn test_set_learning_rate() -> Result<()> {
        let varmap = VarMap::new();
        let mut optimizer = OptimizerConfig::default().build_adamw(&varmap)?;

        optimizer.set_learning_rate(1e-3);
        assert_eq!(optimizer.learning_rate(), 1e-3);

        Ok(())
    }
}
