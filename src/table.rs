//! Input table loading and column-contract validation.
//!
//! The table is a row-oriented CSV: a fixed number of leading metadata
//! columns (ignored), spectral channels labeled by numeric wavelength, and
//! one named column per target component. A missing target column or a
//! non-numeric cell is a fatal input error, surfaced before any training.

use std::path::Path;

use crate::config::InputConfig;
use crate::error::{NirnetError, Result};

/// Parsed spectral table: wavelength-labeled spectra plus target vectors.
#[derive(Debug, Clone)]
pub struct SpectralTable {
    /// Wavelength labels, one per spectral channel, in column order.
    pub wavelengths: Vec<f64>,
    /// Absorbance spectra, one row per sample.
    pub spectra: Vec<Vec<f32>>,
    /// Target composition vectors, one row per sample, component order
    /// matching `component_names`.
    pub targets: Vec<Vec<f32>>,
    /// Target component names, in reporting order.
    pub component_names: Vec<String>,
}

impl SpectralTable {
    /// Load and validate a table from a CSV file.
    ///
    /// # Errors
    ///
    /// Returns an `Input` error if the file is missing, a target column is
    /// absent, no spectral channel columns are found, or a cell fails to
    /// parse as a number.
    pub fn from_csv(config: &InputConfig) -> Result<Self> {
        let path = Path::new(&config.path);
        if !path.exists() {
            return Err(NirnetError::Input(format!(
                "input table not found: {}",
                config.path
            )));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(std::string::ToString::to_string)
            .collect();

        let layout = TableLayout::resolve(&headers, config)?;

        let mut spectra = Vec::new();
        let mut targets = Vec::new();
        for (row_idx, record) in reader.records().enumerate() {
            let record = record?;
            spectra.push(parse_row(&record, &layout.spectral_indices, row_idx)?);
            targets.push(parse_row(&record, &layout.target_indices, row_idx)?);
        }

        if spectra.is_empty() {
            return Err(NirnetError::Input(format!(
                "input table has no data rows: {}",
                config.path
            )));
        }

        tracing::info!(
            "loaded {} samples with {} spectral channels from {}",
            spectra.len(),
            layout.wavelengths.len(),
            config.path
        );

        Ok(Self {
            wavelengths: layout.wavelengths,
            spectra,
            targets,
            component_names: config.target_columns.clone(),
        })
    }
}

/// Column layout resolved from the header row.
struct TableLayout {
    wavelengths: Vec<f64>,
    spectral_indices: Vec<usize>,
    target_indices: Vec<usize>,
}

impl TableLayout {
    fn resolve(headers: &[String], config: &InputConfig) -> Result<Self> {
        let mut target_indices = Vec::with_capacity(config.target_columns.len());
        for name in &config.target_columns {
            let idx = headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| NirnetError::Input(format!("missing target column: {name}")))?;
            target_indices.push(idx);
        }

        // Spectral channels: every column past the metadata block whose
        // header is a numeric wavelength and which is not a target.
        let mut wavelengths = Vec::new();
        let mut spectral_indices = Vec::new();
        for (idx, header) in headers.iter().enumerate().skip(config.metadata_columns) {
            if target_indices.contains(&idx) {
                continue;
            }
            if let Ok(wavelength) = header.parse::<f64>() {
                wavelengths.push(wavelength);
                spectral_indices.push(idx);
            }
        }

        if spectral_indices.is_empty() {
            return Err(NirnetError::Input(
                "no spectral channel columns found (numeric wavelength headers expected)".into(),
            ));
        }

        Ok(Self {
            wavelengths,
            spectral_indices,
            target_indices,
        })
    }
}

fn parse_row(record: &csv::StringRecord, indices: &[usize], row_idx: usize) -> Result<Vec<f32>> {
    let mut values = Vec::with_capacity(indices.len());
    for &idx in indices {
        let cell = record
            .get(idx)
            .ok_or_else(|| NirnetError::Input(format!("row {row_idx}: missing column {idx}")))?;
        let value = cell.parse::<f32>().map_err(|_| {
            NirnetError::Input(format!(
                "row {row_idx}, column {idx}: cannot parse {cell:?} as a number"
            ))
        })?;
        values.push(value);
    }
    Ok(values)
}
