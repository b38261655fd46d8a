//! Plateau-sensitive learning rate scheduling.

use crate::optimizer::AdamWOptimizer;

/// Reduces the learning rate when the monitored metric stops improving.
///
/// Fed the mean training loss once per epoch; after `patience` consecutive
/// epochs without a new best value, the optimizer's learning rate is
/// multiplied by `factor` and the stall counter restarts.
#[derive(Debug, Clone)]
pub struct ReduceOnPlateau {
    patience: usize,
    factor: f64,
    best: f64,
    stalled: usize,
}

impl ReduceOnPlateau {
    /// Create a new scheduler.
    #[must_use]
    pub fn new(patience: usize, factor: f64) -> Self {
        Self {
            patience,
            factor,
            best: f64::INFINITY,
            stalled: 0,
        }
    }

    /// Observe an epoch metric and update the optimizer if a plateau is
    /// reached. A NaN metric never counts as an improvement.
    pub fn step(&mut self, metric: f64, optimizer: &mut AdamWOptimizer) {
        if metric < self.best {
            self.best = metric;
            self.stalled = 0;
            return;
        }

        self.stalled += 1;
        if self.stalled >= self.patience {
            let lr = optimizer.learning_rate() * self.factor;
            optimizer.set_learning_rate(lr);
            self.stalled = 0;
            tracing::info!("plateau after {} stalled epochs, learning rate -> {lr:.2e}", self.patience);
        }
    }

    /// Best metric value seen so far.
    #[must_use]
    pub fn best(&self) -> f64 {
        self.best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::OptimizerConfig;
    use candle_nn::VarMap;

    fn optimizer(lr: f64) -> AdamWOptimizer {
        let varmap = VarMap::new();
        let config = OptimizerConfig {
            learning_rate: lr,
            ..OptimizerConfig::default()
        };
        config.build_adamw(&varmap).unwrap()
    }

    #[test]
    fn test_no_reduction_while_improving() {
        let mut opt = optimizer(1e-3);
        let mut scheduler = ReduceOnPlateau::new(3, 0.5);

        for epoch in 0..20 {
            scheduler.step(1.0 / (epoch as f64 + 1.0), &mut opt);
        }
        assert_eq!(opt.learning_rate(), 1e-3);
    }

    #[test]
    fn test_reduction_after_patience_stalled_epochs() {
        let mut opt = optimizer(1e-3);
        let mut scheduler = ReduceOnPlateau::new(10, 0.5);

        scheduler.step(1.0, &mut opt);
        for _ in 0..9 {
            scheduler.step(1.0, &mut opt);
            assert_eq!(opt.learning_rate(), 1e-3);
        }
        // Tenth stalled epoch triggers the halving.
        scheduler.step(1.0, &mut opt);
        assert!((opt.learning_rate() - 5e-4).abs() < 1e-12);
    }

    #[test]
    fn test_improvement_resets_stall_counter() {
        let mut opt = optimizer(1e-3);
        let mut scheduler = ReduceOnPlateau::new(3, 0.5);

        scheduler.step(1.0, &mut opt);
        scheduler.step(1.0, &mut opt);
        scheduler.step(1.0, &mut opt);
        // Improvement one epoch before the plateau would trigger.
        scheduler.step(0.5, &mut opt);
        scheduler.step(0.5, &mut opt);
        scheduler.step(0.5, &mut opt);
        assert_eq!(opt.learning_rate(), 1e-3);

        scheduler.step(0.5, &mut opt);
        assert!((opt.learning_rate() - 5e-4).abs() < 1e-12);
    }

    #[test]
    fn test_repeated_reductions() {
        let mut opt = optimizer(1e-3);
        let mut scheduler = ReduceOnPlateau::new(2, 0.5);

        for _ in 0..9 {
            scheduler.step(1.0, &mut opt);
        }
        // First observation sets the best; four plateaus of two epochs each.
        assert!((opt.learning_rate() - 1e-3 * 0.0625).abs() < 1e-15);
    }

    #[test]
    fn test_nan_metric_is_never_an_improvement() {
        let mut opt = optimizer(1e-3);
        let mut scheduler = ReduceOnPlateau::new(2, 0.5);

        scheduler.step(f64::NAN, &mut opt);
        scheduler.step(f64::NAN, &mut opt);
        assert!((opt.learning_rate() - 5e-4).abs() < 1e-12);
        assert_eq!(scheduler.best(), f64::INFINITY);
    }
}
