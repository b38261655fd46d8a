//! CSV exports for the reporting collaborator: per-sample predictions,
//! aggregate metrics and wavelength-aligned feature importances.

use std::path::Path;

use crate::error::Result;
use crate::evaluate::{ComponentMetrics, Evaluation};
use crate::importance::FeatureImportance;

/// Write per-sample true/predicted/signed-error columns for every
/// component.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_predictions_csv<P: AsRef<Path>>(
    path: P,
    evaluation: &Evaluation,
    component_names: &[String],
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = Vec::with_capacity(component_names.len() * 3);
    for name in component_names {
        header.push(format!("{name}_true"));
        header.push(format!("{name}_pred"));
        header.push(format!("{name}_error"));
    }
    writer.write_record(&header)?;

    for (truth, pred) in evaluation.targets.iter().zip(&evaluation.predictions) {
        let mut record = Vec::with_capacity(header.len());
        for (t, p) in truth.iter().zip(pred) {
            record.push(t.to_string());
            record.push(p.to_string());
            record.push((p - t).to_string());
        }
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

/// Write one row of aggregate metrics (MSE, R², MAE) per component.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_metrics_csv<P: AsRef<Path>>(path: P, metrics: &[ComponentMetrics]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["component", "mse", "r2", "mae"])?;
    for m in metrics {
        writer.write_record([
            m.component.clone(),
            format!("{:.6}", m.mse),
            format!("{:.6}", m.r2),
            format!("{:.6}", m.mae),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the full normalized importance vector aligned to its wavelength
/// labels.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_importance_csv<P: AsRef<Path>>(
    path: P,
    wavelengths: &[f64],
    importance: &FeatureImportance,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["wavelength", "importance"])?;
    for (wavelength, value) in wavelengths.iter().zip(&importance.importances) {
        writer.write_record([wavelength.to_string(), value.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the strongest (wavelength, importance) pairs, best first.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_top_wavelengths_csv<P: AsRef<Path>>(
    path: P,
    importance: &FeatureImportance,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["rank", "wavelength", "importance"])?;
    for (rank, (wavelength, value)) in importance.top.iter().enumerate() {
        writer.write_record([
            (rank + 1).to_string(),
            wavelength.to_string(),
            value.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::ComponentMetrics;

    fn sample_evaluation() -> Evaluation {
        Evaluation {
            predictions: vec![vec![1.5, 3.0], vec![2.5, 4.0]],
            targets: vec![vec![1.0, 3.5], vec![3.0, 4.0]],
            test_loss: 0.1,
            metrics: vec![
                ComponentMetrics {
                    component: "Moisture".into(),
                    mse: 0.25,
                    r2: 0.9,
                    mae: 0.5,
                },
                ComponentMetrics {
                    component: "Oil".into(),
                    mse: 0.125,
                    r2: 0.8,
                    mae: 0.25,
                },
            ],
        }
    }

    #[test]
    fn test_predictions_csv_layout() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("predictions.csv");
        let names = vec!["Moisture".to_string(), "Oil".to_string()];

        write_predictions_csv(&path, &sample_evaluation(), &names).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Moisture_true,Moisture_pred,Moisture_error,Oil_true,Oil_pred,Oil_error"
        );
        assert_eq!(lines.next().unwrap(), "1,1.5,0.5,3.5,3,-0.5");
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn test_metrics_csv_layout() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("metrics.csv");

        write_metrics_csv(&path, &sample_evaluation().metrics).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("component,mse,r2,mae\n"));
        assert!(content.contains("Moisture,0.250000,0.900000,0.500000"));
        assert!(content.contains("Oil,0.125000,0.800000,0.250000"));
    }

    #[test]
    fn test_importance_csv_layout() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("importance.csv");

        let importance = FeatureImportance {
            importances: vec![0.5, 1.0],
            top: vec![(1102.0, 1.0), (1100.0, 0.5)],
        };
        write_importance_csv(&path, &[1100.0, 1102.0], &importance).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "wavelength,importance\n1100,0.5\n1102,1\n");
    }

    #[test]
    fn test_top_wavelengths_csv_layout() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("top.csv");

        let importance = FeatureImportance {
            importances: vec![0.5, 1.0],
            top: vec![(1102.0, 1.0), (1100.0, 0.5)],
        };
        write_top_wavelengths_csv(&path, &importance).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "rank,wavelength,importance\n1,1102,1\n2,1100,0.5\n"
        );
    }
}
