//! Per-realization index pipeline: read, normalize, mask, compute, tabulate.

pub mod eli;
pub mod nino34;

pub use eli::eli;
pub use nino34::nino34;

use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::config::{Config, ModelProfile};
use crate::data_io::{
    read_gridded_field, read_land_mask, Accumulator, GridError, GriddedField, InsertOutcome,
    ReaderError, SeriesTable, WriteError,
};
use crate::math::regrid::regrid_mask;
use crate::naming::{realization_id, Realization};
use crate::normalize::{normalize, NormalizeError};
use crate::time_utils::TimeError;

/// Name of the surface temperature variable in CMIP6 Amon files
pub const MODEL_VARIABLE: &str = "ts";

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Read error: {0}")]
    Reader(#[from] ReaderError),

    #[error("Normalize error: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("Grid error: {0}")]
    Grid(#[from] GridError),

    #[error("Time error: {0}")]
    Time(#[from] TimeError),

    #[error("Write error: {0}")]
    Write(#[from] WriteError),
}

/// Index values with one label per value
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlySeries {
    pub name: String,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

impl MonthlySeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Eli,
    Nino34,
}

impl IndexKind {
    pub fn name(self) -> &'static str {
        match self {
            IndexKind::Eli => "ELI",
            IndexKind::Nino34 => "Nino-3.4",
        }
    }

    /// Compute this index from a normalized, masked field
    pub fn compute(self, field: &GriddedField, config: &Config) -> Result<MonthlySeries, IndexError> {
        match self {
            IndexKind::Eli => Ok(eli(field)?),
            IndexKind::Nino34 => nino34(field, config.climatology_window, config.backfill_edge),
        }
    }
}

impl FromStr for IndexKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "eli" => Ok(IndexKind::Eli),
            "nino34" | "nino-3.4" => Ok(IndexKind::Nino34),
            other => Err(format!("Invalid index: {} (expected eli or nino34)", other)),
        }
    }
}

/// Result of one realization run
#[derive(Debug)]
pub struct IndexRun {
    /// Column the series was stored under
    pub column: String,
    pub series: MonthlySeries,
    pub outcome: InsertOutcome,
}

/// Column header for a realization file: its `Display` form when the file
/// name parses, otherwise the file name itself
pub fn column_name(data_file: &Path) -> String {
    let file_name = data_file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    match Realization::parse(file_name) {
        Ok(realization) => realization.to_string(),
        Err(e) => {
            log::warn!("Using raw file name as column: {}", e);
            file_name.to_string()
        }
    }
}

/// Sanity lines printed before an index run
pub fn banner(model: &str, data_file: &Path, mask_file: &Path) -> Vec<String> {
    let file_name = data_file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    vec![
        format!("Model: {}", model),
        format!("Data file: {}", data_file.display()),
        format!("Mask file: {}", mask_file.display()),
        format!(
            "Run: {}",
            realization_id(file_name).unwrap_or_else(|| file_name.to_string())
        ),
        format!("Realization: {}", column_name(data_file)),
    ]
}

/// Read and normalize one realization, masking land unless `skip_mask` is set
pub fn load_realization(
    config: &Config,
    model: &str,
    data_file: &Path,
    mask_file: &Path,
) -> Result<GriddedField, IndexError> {
    let profile = ModelProfile::for_model(model);
    let field = read_gridded_field(data_file, MODEL_VARIABLE, profile.naming)?;
    let mut field = normalize(field, model, &profile)?;

    if config.skip_mask {
        log::info!("Skipping land mask for {}", model);
        return Ok(field);
    }
    if !mask_file.exists() {
        return Err(ReaderError::MissingLandMask {
            model: model.to_string(),
            dir: mask_file.display().to_string(),
        }
        .into());
    }

    let mut mask = read_land_mask(mask_file, profile.naming)?;
    if !field.same_grid(&mask.lon, &mask.lat) {
        log::debug!("Regridding land mask of {} onto the model grid", model);
        mask = regrid_mask(&mask, &field.lon, &field.lat, config.interpolation);
    }
    mask.apply_to_field(&mut field, config.mask_convention)?;
    Ok(field)
}

/// Compute `kind` for one realization and store it as a column of the table
/// at `table_path`
pub fn run_index(
    config: &Config,
    kind: IndexKind,
    model: &str,
    data_file: &Path,
    mask_file: &Path,
    table_path: &Path,
) -> Result<IndexRun, IndexError> {
    let field = load_realization(config, model, data_file, mask_file)?;
    let mut series = kind.compute(&field, config)?;
    let column = column_name(data_file);
    series.name = column.clone();

    let mut table = SeriesTable::open_or_create(table_path, config.duplicate_policy)?;
    let outcome = table.insert_series(&column, &series.labels, &series.values)?;
    table.save()?;

    log::info!(
        "{} for {}: {} values written to {} ({:?})",
        kind.name(),
        column,
        series.len(),
        table_path.display(),
        outcome
    );
    Ok(IndexRun {
        column,
        series,
        outcome,
    })
}
