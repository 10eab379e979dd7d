//! Ensemble composites: one `<model>-ts` variable per model, accumulated
//! across a sequential loop over the ensemble.

pub mod variants;

pub use variants::VariantContext;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::{Config, CoordinateNaming, ModelProfile, MODEL_LIST};
use crate::data_io::common::{land_mask_file, realization_files};
use crate::data_io::{
    read_gridded_field, read_land_mask, Accumulator, CompositeDataset, CompositeVariable,
    GridError, GriddedField, InsertOutcome, LandMask, ReaderError, WriteError,
    ENSEMBLE_MEAN_VARIABLE,
};
use crate::math::regrid::regrid_mask;
use crate::normalize::{normalize, NormalizeError};
use crate::time_utils::TimeError;

/// Observational variable name
pub const OBS_VARIABLE: &str = "sst";

#[derive(Error, Debug)]
pub enum CompositeError {
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

    #[error("Invalid time option '{0}': use \"year\" to keep the whole year or \"DJF\" for December-February")]
    InvalidTimeOption(String),

    #[error("Model index {index} outside the ensemble of {count} models")]
    UnknownModelIndex { index: usize, count: usize },

    #[error("Model {0} is not part of the ensemble")]
    UnknownModel(String),

    #[error("No timesteps for {model} in {window}")]
    EmptyWindow { model: String, window: String },
}

/// Months kept by the zonal variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOption {
    Year,
    Djf,
}

impl FromStr for TimeOption {
    type Err = CompositeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "year" => Ok(TimeOption::Year),
            "djf" | "DJF" => Ok(TimeOption::Djf),
            other => Err(CompositeError::InvalidTimeOption(other.to_string())),
        }
    }
}

impl fmt::Display for TimeOption {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TimeOption::Year => write!(f, "year"),
            TimeOption::Djf => write!(f, "DJF"),
        }
    }
}

/// Box and season of a zonal profile
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZonalOptions {
    pub time_option: TimeOption,
    pub lon_bounds: (f64, f64),
    pub lat_bounds: (f64, f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompositeVariant {
    Bias,
    Change,
    ZonalAverage(ZonalOptions),
    ZonalDifference(ZonalOptions),
}

impl CompositeVariant {
    pub fn name(&self) -> &'static str {
        match self {
            CompositeVariant::Bias => "bias",
            CompositeVariant::Change => "change",
            CompositeVariant::ZonalAverage(_) => "zonal average",
            CompositeVariant::ZonalDifference(_) => "zonal difference",
        }
    }

    /// Output files, in the order [`CompositeVariant::compute`] returns variables
    pub fn output_files(&self) -> &'static [&'static str] {
        match self {
            CompositeVariant::Bias => &["composite_bias.nc"],
            CompositeVariant::Change => &["composite_change.nc"],
            CompositeVariant::ZonalAverage(_) => &["djf_zonal_averages.nc"],
            CompositeVariant::ZonalDifference(_) => {
                &["hist_zonal_averages.nc", "future_zonal_averages.nc"]
            }
        }
    }

    /// One variable per output file
    pub fn compute(
        &self,
        model_mean: &GriddedField,
        ctx: &VariantContext,
    ) -> Result<Vec<CompositeVariable>, CompositeError> {
        Ok(match self {
            CompositeVariant::Bias => vec![variants::bias(model_mean, ctx)?],
            CompositeVariant::Change => vec![variants::change(model_mean, ctx)?],
            CompositeVariant::ZonalAverage(options) => {
                vec![variants::zonal_average(model_mean, ctx, options)?]
            }
            CompositeVariant::ZonalDifference(options) => {
                let (historical, future) = variants::zonal_difference(model_mean, ctx, options)?;
                vec![historical, future]
            }
        })
    }
}

/// Model at `index` in the ensemble list
pub fn model_name(index: usize) -> Result<&'static str, CompositeError> {
    MODEL_LIST
        .get(index)
        .copied()
        .ok_or(CompositeError::UnknownModelIndex {
            index,
            count: MODEL_LIST.len(),
        })
}

/// Check requested model names against the ensemble; all models when none given
pub fn resolve_models(requested: Option<&[String]>) -> Result<Vec<String>, CompositeError> {
    match requested {
        None => Ok(MODEL_LIST.iter().map(|m| m.to_string()).collect()),
        Some(names) => names
            .iter()
            .map(|name| {
                if MODEL_LIST.contains(&name.as_str()) {
                    Ok(name.clone())
                } else {
                    Err(CompositeError::UnknownModel(name.clone()))
                }
            })
            .collect(),
    }
}

/// Realizations averaged on the timestamps they all share.
///
/// Every realization must be on the same grid.
pub fn mean_of_realizations(
    realizations: Vec<GriddedField>,
) -> Result<GriddedField, CompositeError> {
    let mut iter = realizations.into_iter();
    let Some(first) = iter.next() else {
        return Err(GridError::EmptySelection("no realizations to average".to_string()).into());
    };
    let rest: Vec<GriddedField> = iter.collect();

    let stamps = |field: &GriddedField| {
        field
            .time
            .iter()
            .map(|t| t.to_datetime())
            .collect::<Result<Vec<_>, _>>()
    };
    let mut shared: BTreeSet<_> = stamps(&first)?.into_iter().collect();
    for other in &rest {
        if !other.same_grid(&first.lon, &first.lat) {
            return Err(GridError::GridMismatch(format!(
                "realizations of {} are on different grids",
                first.name
            ))
            .into());
        }
        let times: BTreeSet<_> = stamps(other)?.into_iter().collect();
        shared = shared.intersection(&times).copied().collect();
    }

    // One timestep per shared stamp, in time order; repeated stamps keep
    // their first occurrence
    let aligned = |field: &GriddedField| -> Result<GriddedField, CompositeError> {
        let mut first_index = BTreeMap::new();
        for (i, t) in stamps(field)?.into_iter().enumerate() {
            if shared.contains(&t) {
                first_index.entry(t).or_insert(i);
            }
        }
        let keep: Vec<usize> = first_index.into_values().collect();
        Ok(field.select_time(&keep))
    };

    let mut mean = aligned(&first)?;
    for other in &rest {
        let other = aligned(other)?;
        mean.data += &other.data;
        mean.aux_coords.extend(other.aux_coords);
    }
    let count = (rest.len() + 1) as f64;
    mean.data.mapv_inplace(|v| v / count);
    Ok(mean)
}

/// Load, normalize and average every realization of `model`
pub fn load_model_mean(config: &Config, model: &str) -> Result<GriddedField, CompositeError> {
    let model_dir = config.model_dir(model);
    let files = realization_files(&model_dir, model)?;
    let profile = ModelProfile::for_model(model);
    log::info!("Averaging {} realizations of {}", files.len(), model);

    let realizations = files
        .iter()
        .map(|file| -> Result<GriddedField, CompositeError> {
            log::debug!("Reading {}", file.display());
            let field = read_gridded_field(file, "ts", profile.naming)?;
            Ok(normalize(field, model, &profile)?)
        })
        .collect::<Result<Vec<_>, _>>()?;
    mean_of_realizations(realizations)
}

/// The model's land mask interpolated onto the observational grid
pub fn load_model_mask(
    config: &Config,
    model: &str,
    obs: &GriddedField,
) -> Result<LandMask, CompositeError> {
    let path = land_mask_file(&config.model_dir(model), model)?;
    let profile = ModelProfile::for_model(model);
    let mask = read_land_mask(&path, profile.naming)?;
    Ok(regrid_mask(&mask, &obs.lon, &obs.lat, config.interpolation))
}

/// Observational SST reference from `config.obs_file`
pub fn load_observations(config: &Config) -> Result<GriddedField, CompositeError> {
    let obs = read_gridded_field(&config.obs_file, OBS_VARIABLE, CoordinateNaming::Short)?;
    log::info!(
        "Observations: {} timesteps on a {}x{} grid",
        obs.n_time(),
        obs.lat.len(),
        obs.lon.len()
    );
    Ok(obs)
}

/// Open the accumulators a variant writes to, inside `config.output_dir`
pub fn open_accumulators(
    config: &Config,
    variant: &CompositeVariant,
) -> Result<Vec<CompositeDataset>, CompositeError> {
    variant
        .output_files()
        .iter()
        .map(|file| {
            CompositeDataset::open_or_create(config.output_path(file), config.duplicate_policy)
                .map_err(CompositeError::from)
        })
        .collect()
}

/// Compute one model's variables and add them to `accumulators`, one per
/// output file. Nothing is saved here.
pub fn run_model(
    config: &Config,
    variant: &CompositeVariant,
    model: &str,
    obs: &GriddedField,
    accumulators: &mut [CompositeDataset],
) -> Result<Vec<InsertOutcome>, CompositeError> {
    let model_mean = load_model_mean(config, model)?;
    let mask = load_model_mask(config, model, obs)?;
    let ctx = VariantContext {
        model,
        obs,
        mask: &mask,
        convention: config.mask_convention,
        interpolation: config.interpolation,
    };

    let variables = variant.compute(&model_mean, &ctx)?;
    insert_all(model, variables, accumulators)
}

/// Insert one variable per accumulator, or none of them if any insert would fail
pub fn insert_all(
    model: &str,
    variables: Vec<CompositeVariable>,
    accumulators: &mut [CompositeDataset],
) -> Result<Vec<InsertOutcome>, CompositeError> {
    for (variable, dataset) in variables.iter().zip(accumulators.iter()) {
        dataset.check_insert(model, variable)?;
    }
    variables
        .into_iter()
        .zip(accumulators.iter_mut())
        .map(|(variable, dataset)| dataset.insert(model, variable).map_err(CompositeError::from))
        .collect()
}

/// Outcome of an ensemble loop
#[derive(Debug, Default)]
pub struct EnsembleReport {
    pub completed: Vec<String>,
    /// Model and error message of every skipped model
    pub failed: Vec<(String, String)>,
}

/// Run `variant` for each model in order, saving after every model.
///
/// A failing model stops the loop unless `config.keep_going` is set.
pub fn run_ensemble(
    config: &Config,
    variant: &CompositeVariant,
    models: &[String],
) -> Result<EnsembleReport, CompositeError> {
    let obs = load_observations(config)?;
    let mut accumulators = open_accumulators(config, variant)?;
    let mut report = EnsembleReport::default();

    for model in models {
        log::info!("Computing {} composite for {}", variant.name(), model);
        let result = run_model(config, variant, model, &obs, &mut accumulators).and_then(|outcomes| {
            for dataset in &accumulators {
                dataset.save()?;
            }
            Ok(outcomes)
        });

        match result {
            Ok(outcomes) => {
                log::info!("Sent updated data with {} included ({:?})", model, outcomes);
                report.completed.push(model.clone());
            }
            Err(e) if config.keep_going => {
                log::error!("Skipping {}: {}", model, e);
                report.failed.push((model.clone(), e.to_string()));
            }
            Err(e) => return Err(e),
        }
    }

    for dataset in &accumulators {
        if !dataset.is_empty() {
            log::info!(
                "{} holds {} models and their {}",
                dataset.path().display(),
                dataset.len(),
                ENSEMBLE_MEAN_VARIABLE
            );
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_utils::TimeValue;
    use chrono::NaiveDate;
    use ndarray::Array3;

    fn field(days: &[u32], value: f64) -> GriddedField {
        let time = days
            .iter()
            .map(|&d| {
                TimeValue::Datetime(NaiveDate::from_ymd_opt(2000, 1, d).unwrap().and_hms_opt(0, 0, 0).unwrap())
            })
            .collect::<Vec<_>>();
        let data = Array3::from_elem((days.len(), 1, 2), value);
        GriddedField::new("ts", "K", vec![0.0, 1.0], vec![0.0], time, data).unwrap()
    }

    #[test]
    fn test_time_option_parse() {
        assert_eq!("year".parse::<TimeOption>().unwrap(), TimeOption::Year);
        assert_eq!("DJF".parse::<TimeOption>().unwrap(), TimeOption::Djf);
        assert_eq!("djf".parse::<TimeOption>().unwrap(), TimeOption::Djf);
        let message = "JJA".parse::<TimeOption>().unwrap_err().to_string();
        assert!(message.contains("year"));
        assert!(message.contains("DJF"));
    }

    #[test]
    fn test_model_name() {
        assert_eq!(model_name(0).unwrap(), "ACCESS-CM2");
        assert_eq!(model_name(32).unwrap(), "TaiESM1");
        assert!(matches!(
            model_name(33),
            Err(CompositeError::UnknownModelIndex { index: 33, count: 33 })
        ));
    }

    #[test]
    fn test_resolve_models() {
        assert_eq!(resolve_models(None).unwrap().len(), 33);
        let picked = vec!["CESM2".to_string(), "NESM3".to_string()];
        assert_eq!(resolve_models(Some(&picked)).unwrap(), picked);
        let unknown = vec!["ACME".to_string()];
        assert!(matches!(
            resolve_models(Some(&unknown)),
            Err(CompositeError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_output_files() {
        let options = ZonalOptions {
            time_option: TimeOption::Djf,
            lon_bounds: (120.0, 280.0),
            lat_bounds: (-5.0, 5.0),
        };
        assert_eq!(CompositeVariant::Bias.output_files(), &["composite_bias.nc"]);
        assert_eq!(
            CompositeVariant::ZonalDifference(options).output_files(),
            &["hist_zonal_averages.nc", "future_zonal_averages.nc"]
        );
    }

    #[test]
    fn test_mean_of_realizations_inner_join() {
        let a = field(&[1, 2, 3], 1.0);
        let b = field(&[2, 3, 4], 3.0);
        let mean = mean_of_realizations(vec![a, b]).unwrap();
        assert_eq!(mean.n_time(), 2);
        assert_eq!(mean.time[0].label(), "2000-01-02");
        assert!(mean.data.iter().all(|&v| v == 2.0));
    }

    #[test]
    fn test_mean_of_realizations_repeated_stamp() {
        let a = field(&[1, 2, 2, 3], 1.0);
        let b = field(&[3, 1, 2], 3.0);
        let mean = mean_of_realizations(vec![a, b]).unwrap();
        assert_eq!(mean.n_time(), 3);
        let labels: Vec<String> = mean.time.iter().map(|t| t.label()).collect();
        assert_eq!(labels, vec!["2000-01-01", "2000-01-02", "2000-01-03"]);
        assert!(mean.data.iter().all(|&v| v == 2.0));
    }

    #[test]
    fn test_insert_all_is_all_or_nothing() {
        use crate::data_io::{CompositeField, DuplicatePolicy};
        use ndarray::Array1;

        let profile = |value: f64| {
            CompositeVariable::new(
                CompositeField::Zonal {
                    lon: vec![150.0, 160.0],
                    values: Array1::from_elem(2, value),
                },
                "degC",
                "zonal mean",
            )
        };
        let dir = tempfile::tempdir().unwrap();
        let mut accumulators = vec![
            CompositeDataset::open_or_create(dir.path().join("hist.nc"), DuplicatePolicy::Error).unwrap(),
            CompositeDataset::open_or_create(dir.path().join("future.nc"), DuplicatePolicy::Error).unwrap(),
        ];
        accumulators[1].insert("CESM2", profile(1.0)).unwrap();

        let result = insert_all("CESM2", vec![profile(2.0), profile(3.0)], &mut accumulators);
        assert!(matches!(
            result,
            Err(CompositeError::Write(WriteError::DuplicateVariable(_)))
        ));
        assert!(accumulators[0].is_empty());

        let outcomes = insert_all("NESM3", vec![profile(2.0), profile(3.0)], &mut accumulators).unwrap();
        assert_eq!(outcomes, vec![InsertOutcome::Added, InsertOutcome::Added]);
    }

    #[test]
    fn test_mean_of_realizations_grid_mismatch() {
        let a = field(&[1], 1.0);
        let mut b = field(&[1], 1.0);
        b.lon = vec![0.0, 2.0];
        assert!(matches!(
            mean_of_realizations(vec![a, b]),
            Err(CompositeError::Grid(GridError::GridMismatch(_)))
        ));
    }
}
