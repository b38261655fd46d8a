//! Deterministic signal preprocessing: Savitzky-Golay smoothing, standard
//! normal variate (SNV) scatter correction, and z-score standardization.
//!
//! The transforms are applied in a fixed order (smoothing, SNV,
//! standardization); smoothing and SNV operate on each spectrum
//! independently, standardization is fit on the training partition only.

use crate::config::PreprocessConfig;
use crate::error::{NirnetError, Result};

/// Apply the per-spectrum signal corrections (smoothing and SNV) enabled in
/// the configuration. Standardization is separate: it needs a fitted
/// [`StandardScaler`] and must only see training statistics.
///
/// # Errors
///
/// Returns a `Preprocess` error if the smoothing window is invalid for the
/// spectrum length.
pub fn apply_signal_corrections(
    spectra: &[Vec<f32>],
    config: &PreprocessConfig,
) -> Result<Vec<Vec<f32>>> {
    let mut rows: Vec<Vec<f32>> = spectra.to_vec();

    if config.smoothing {
        for row in &mut rows {
            *row = savgol_smooth(row, config.window, config.polyorder)?;
        }
    }

    if config.snv {
        for (idx, row) in rows.iter_mut().enumerate() {
            match snv(row) {
                Some(corrected) => *row = corrected,
                // Zero-variance spectrum: normalization is undefined, so the
                // row passes through unchanged rather than dividing by zero.
                None => tracing::warn!(
                    "sample {idx}: zero-variance spectrum, skipping SNV correction"
                ),
            }
        }
    }

    Ok(rows)
}

/// Savitzky-Golay smoothing: each output sample is a degree-`polyorder`
/// polynomial least-squares fit to the `window` nearest samples, evaluated
/// at the center. Edges use mirror extension.
///
/// # Errors
///
/// Returns a `Preprocess` error if the window is even, not larger than the
/// polynomial order, or longer than the spectrum.
pub fn savgol_smooth(spectrum: &[f32], window: usize, polyorder: usize) -> Result<Vec<f32>> {
    if window % 2 == 0 {
        return Err(NirnetError::Preprocess(format!(
            "smoothing window must be odd, got {window}"
        )));
    }
    if window <= polyorder {
        return Err(NirnetError::Preprocess(format!(
            "smoothing window ({window}) must exceed polynomial order ({polyorder})"
        )));
    }
    let n = spectrum.len();
    if n < window {
        return Err(NirnetError::Preprocess(format!(
            "spectrum length ({n}) is shorter than the smoothing window ({window})"
        )));
    }

    let coeffs = savgol_coefficients(window, polyorder)?;
    let half = window / 2;

    let mut smoothed = Vec::with_capacity(n);
    for i in 0..n {
        let mut acc = 0.0f64;
        for (k, c) in coeffs.iter().enumerate() {
            let offset = i as isize + k as isize - half as isize;
            acc += c * f64::from(spectrum[mirror_index(offset, n)]);
        }
        #[allow(clippy::cast_possible_truncation)]
        smoothed.push(acc as f32);
    }
    Ok(smoothed)
}

/// Reflect an out-of-range index back into `0..len` (mirror about the edge
/// samples, edge value not repeated).
fn mirror_index(idx: isize, len: usize) -> usize {
    let last = (len - 1) as isize;
    let mut i = idx;
    if i < 0 {
        i = -i;
    }
    if i > last {
        i = 2 * last - i;
    }
    #[allow(clippy::cast_sign_loss)]
    {
        i as usize
    }
}

/// Convolution coefficients for the central point of a Savitzky-Golay fit.
///
/// With window positions x in -m..=m and Vandermonde matrix V[i][j] = x_i^j,
/// the smoothed center value is a^T y where a = V z and (V^T V) z = e0. The
/// normal-equation system is (polyorder + 1) square, solved by Gaussian
/// elimination with partial pivoting.
fn savgol_coefficients(window: usize, polyorder: usize) -> Result<Vec<f64>> {
    let half = (window / 2) as isize;
    let order = polyorder + 1;

    // M[j][k] = sum over x of x^(j+k)
    let mut m = vec![vec![0.0f64; order]; order];
    for x in -half..=half {
        let x = x as f64;
        for (j, row) in m.iter_mut().enumerate() {
            for (k, cell) in row.iter_mut().enumerate() {
                *cell += x.powi((j + k) as i32);
            }
        }
    }

    let z = solve_linear_system(&mut m, order)?;

    let mut coeffs = Vec::with_capacity(window);
    for x in -half..=half {
        let x = x as f64;
        let mut value = 0.0;
        for (j, zj) in z.iter().enumerate() {
            value += zj * x.powi(j as i32);
        }
        coeffs.push(value);
    }
    Ok(coeffs)
}

/// Solve M z = e0 in place by Gaussian elimination with partial pivoting.
fn solve_linear_system(m: &mut [Vec<f64>], order: usize) -> Result<Vec<f64>> {
    let mut rhs = vec![0.0f64; order];
    rhs[0] = 1.0;

    for col in 0..order {
        let pivot = (col..order)
            .max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))
            .unwrap_or(col);
        if m[pivot][col].abs() < 1e-12 {
            return Err(NirnetError::Preprocess(
                "singular system while computing smoothing coefficients".into(),
            ));
        }
        m.swap(col, pivot);
        rhs.swap(col, pivot);

        for row in (col + 1)..order {
            let factor = m[row][col] / m[col][col];
            for k in col..order {
                m[row][k] -= factor * m[col][k];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut z = vec![0.0f64; order];
    for col in (0..order).rev() {
        let mut acc = rhs[col];
        for k in (col + 1)..order {
            acc -= m[col][k] * z[k];
        }
        z[col] = acc / m[col][col];
    }
    Ok(z)
}

/// Standard normal variate correction: subtract the spectrum's own mean and
/// divide by its own (population) standard deviation.
///
/// Returns `None` for the degenerate zero-variance case; the caller decides
/// the fallback policy.
#[must_use]
pub fn snv(spectrum: &[f32]) -> Option<Vec<f32>> {
    if spectrum.is_empty() {
        return None;
    }
    let n = spectrum.len() as f64;
    let mean = spectrum.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let var = spectrum
        .iter()
        .map(|&v| {
            let d = f64::from(v) - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    let std = var.sqrt();
    if std <= f64::from(f32::EPSILON) {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    Some(
        spectrum
            .iter()
            .map(|&v| ((f64::from(v) - mean) / std) as f32)
            .collect(),
    )
}

/// Per-feature z-score scaler, fit once on a reference set.
///
/// A scaler only exists in the fitted state: [`StandardScaler::fit`] is the
/// sole constructor, so use-before-fit is unrepresentable. Zero-variance
/// features have their divisor clamped to epsilon, keeping both `transform`
/// and the `inverse_transform(transform(x)) == x` round trip finite and
/// exact.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    mean: Vec<f32>,
    std: Vec<f32>,
}

impl StandardScaler {
    /// Fit per-feature mean and standard deviation on the given rows.
    ///
    /// # Errors
    ///
    /// Returns a `Preprocess` error on an empty set or ragged rows.
    pub fn fit(rows: &[Vec<f32>]) -> Result<Self> {
        let first = rows
            .first()
            .ok_or_else(|| NirnetError::Preprocess("cannot fit scaler on empty data".into()))?;
        let width = first.len();
        if width == 0 {
            return Err(NirnetError::Preprocess(
                "cannot fit scaler on zero-width rows".into(),
            ));
        }
        if rows.iter().any(|r| r.len() != width) {
            return Err(NirnetError::Preprocess(
                "cannot fit scaler on ragged rows".into(),
            ));
        }

        let n = rows.len() as f64;
        let mut mean = vec![0.0f64; width];
        for row in rows {
            for (m, &v) in mean.iter_mut().zip(row) {
                *m += f64::from(v);
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let mut var = vec![0.0f64; width];
        for row in rows {
            for ((s, &v), m) in var.iter_mut().zip(row).zip(&mean) {
                let d = f64::from(v) - m;
                *s += d * d;
            }
        }

        #[allow(clippy::cast_possible_truncation)]
        let std = var
            .iter()
            .map(|&s| ((s / n).sqrt() as f32).max(f32::EPSILON))
            .collect();
        #[allow(clippy::cast_possible_truncation)]
        let mean = mean.iter().map(|&m| m as f32).collect();

        Ok(Self { mean, std })
    }

    /// Number of features the scaler was fit on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    /// Z-score the given rows with the fitted statistics.
    ///
    /// # Errors
    ///
    /// Returns a `Preprocess` error if a row width does not match the fit.
    pub fn transform(&self, rows: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
        rows.iter()
            .map(|row| {
                self.check_width(row)?;
                Ok(row
                    .iter()
                    .zip(&self.mean)
                    .zip(&self.std)
                    .map(|((&v, &m), &s)| (v - m) / s)
                    .collect())
            })
            .collect()
    }

    /// Map standardized rows back to physical units.
    ///
    /// # Errors
    ///
    /// Returns a `Preprocess` error if a row width does not match the fit.
    pub fn inverse_transform(&self, rows: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
        rows.iter()
            .map(|row| {
                self.check_width(row)?;
                Ok(row
                    .iter()
                    .zip(&self.mean)
                    .zip(&self.std)
                    .map(|((&v, &m), &s)| v * s + m)
                    .collect())
            })
            .collect()
    }

    fn check_width(&self, row: &[f32]) -> Result<()> {
        if row.len() == self.mean.len() {
            Ok(())
        } else {
            Err(NirnetError::Preprocess(format!(
                "row width {} does not match fitted width {}",
                row.len(),
                self.mean.len()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_savgol_coefficients_window7_order3() {
        // Classic closed-form coefficients for the cubic, window-7 case.
        let coeffs = savgol_coefficients(7, 3).unwrap();
        let expected: Vec<f64> = [-2.0, 3.0, 6.0, 7.0, 6.0, 3.0, -2.0]
            .iter()
            .map(|v| v / 21.0)
            .collect();
        for (c, e) in coeffs.iter().zip(&expected) {
            assert!((c - e).abs() < 1e-9, "got {c}, expected {e}");
        }
    }

    #[test]
    fn test_savgol_preserves_cubic_in_interior() {
        // A degree-3 fit reproduces degree-3 data exactly away from edges.
        let spectrum: Vec<f32> = (0..20)
            .map(|i| {
                let x = i as f32;
                0.5 * x * x * x - 2.0 * x * x + x + 3.0
            })
            .collect();
        let smoothed = savgol_smooth(&spectrum, 7, 3).unwrap();
        for i in 3..17 {
            assert!(
                (smoothed[i] - spectrum[i]).abs() < 1e-2 * spectrum[i].abs().max(1.0),
                "channel {i}: {} vs {}",
                smoothed[i],
                spectrum[i]
            );
        }
    }

    #[test]
    fn test_savgol_preserves_constant_signal() {
        let spectrum = vec![4.2f32; 16];
        let smoothed = savgol_smooth(&spectrum, 7, 3).unwrap();
        for v in smoothed {
            assert!((v - 4.2).abs() < 1e-5);
        }
    }

    #[test]
    fn test_savgol_rejects_short_spectrum() {
        let spectrum = vec![1.0f32; 5];
        assert!(savgol_smooth(&spectrum, 7, 3).is_err());
    }

    #[test]
    fn test_savgol_rejects_even_window() {
        let spectrum = vec![1.0f32; 16];
        assert!(savgol_smooth(&spectrum, 6, 3).is_err());
    }

    #[test]
    fn test_snv_known_values() {
        let corrected = snv(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();

        let mean: f32 = corrected.iter().sum::<f32>() / 5.0;
        let var: f32 = corrected.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / 5.0;
        assert!(mean.abs() < 1e-6, "mean {mean}");
        assert!((var.sqrt() - 1.0).abs() < 1e-5, "std {}", var.sqrt());

        // sqrt(2) is the population std of 1..=5
        let expected_first = (1.0f32 - 3.0) / 2.0f32.sqrt();
        assert!((corrected[0] - expected_first).abs() < 1e-6);
    }

    #[test]
    fn test_snv_zero_variance_is_degenerate() {
        assert!(snv(&[2.0, 2.0, 2.0, 2.0]).is_none());
        assert!(snv(&[]).is_none());
    }

    #[test]
    fn test_signal_corrections_keep_degenerate_rows() {
        let config = PreprocessConfig {
            smoothing: false,
            snv: true,
            ..PreprocessConfig::default()
        };
        let rows = vec![vec![1.0, 2.0, 3.0], vec![5.0, 5.0, 5.0]];
        let corrected = apply_signal_corrections(&rows, &config).unwrap();
        // Degenerate row passes through unchanged.
        assert_eq!(corrected[1], vec![5.0, 5.0, 5.0]);
        // Normal row is corrected.
        assert!(corrected[0].iter().sum::<f32>().abs() < 1e-5);
    }

    #[test]
    fn test_scaler_round_trip() {
        let rows = vec![
            vec![1.0, 10.0, -3.0],
            vec![2.0, 20.0, -1.0],
            vec![3.0, 35.0, 0.5],
            vec![4.0, 41.0, 2.0],
        ];
        let scaler = StandardScaler::fit(&rows).unwrap();
        let transformed = scaler.transform(&rows).unwrap();
        let restored = scaler.inverse_transform(&transformed).unwrap();

        for (orig, back) in rows.iter().zip(&restored) {
            for (a, b) in orig.iter().zip(back) {
                assert!((a - b).abs() < 1e-6, "{a} vs {b}");
            }
        }
    }

    #[test]
    fn test_scaler_standardizes_features() {
        let rows = vec![vec![1.0, 100.0], vec![2.0, 200.0], vec![3.0, 300.0]];
        let scaler = StandardScaler::fit(&rows).unwrap();
        let transformed = scaler.transform(&rows).unwrap();

        for feature in 0..2 {
            let column: Vec<f32> = transformed.iter().map(|r| r[feature]).collect();
            let mean: f32 = column.iter().sum::<f32>() / column.len() as f32;
            let var: f32 =
                column.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / column.len() as f32;
            assert!(mean.abs() < 1e-6);
            assert!((var - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_scaler_zero_variance_round_trip() {
        let rows = vec![vec![7.0, 1.0], vec![7.0, 2.0], vec![7.0, 3.0]];
        let scaler = StandardScaler::fit(&rows).unwrap();
        let transformed = scaler.transform(&rows).unwrap();
        let restored = scaler.inverse_transform(&transformed).unwrap();
        for (orig, back) in rows.iter().zip(&restored) {
            for (a, b) in orig.iter().zip(back) {
                assert!((a - b).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_scaler_rejects_empty_and_ragged() {
        assert!(StandardScaler::fit(&[]).is_err());
        assert!(StandardScaler::fit(&[vec![1.0, 2.0], vec![1.0]]).is_err());

        let scaler = StandardScaler::fit(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert!(scaler.transform(&[vec![1.0]]).is_err());
    }
}
