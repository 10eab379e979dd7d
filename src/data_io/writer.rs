use chrono::Utc;
use ndarray::{Array1, Array2};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::output_trait::{resolve_duplicate, staging_path, Accumulator, DuplicatePolicy, InsertOutcome, WriteError};
use super::reader::string_attribute;
use super::coords_match;
use crate::math::stats::nanmean;

/// Suffix of every per-model variable in a composite file
pub const MODEL_VARIABLE_SUFFIX: &str = "-ts";

/// Variable holding the NaN-aware mean of every model variable
pub const ENSEMBLE_MEAN_VARIABLE: &str = "ensemble-mean";

/// Composite statistic of one model on the observational grid
#[derive(Debug, Clone, PartialEq)]
pub enum CompositeField {
    /// Bias and change maps, layout [lat, lon]
    LatLon {
        lat: Vec<f64>,
        lon: Vec<f64>,
        values: Array2<f64>,
    },
    /// Longitude profiles of the zonal variants
    Zonal { lon: Vec<f64>, values: Array1<f64> },
}

impl CompositeField {
    pub fn lon(&self) -> &[f64] {
        match self {
            CompositeField::LatLon { lon, .. } | CompositeField::Zonal { lon, .. } => lon,
        }
    }

    pub fn lat(&self) -> Option<&[f64]> {
        match self {
            CompositeField::LatLon { lat, .. } => Some(lat),
            CompositeField::Zonal { .. } => None,
        }
    }

    fn dimension_names(&self) -> &'static [&'static str] {
        match self {
            CompositeField::LatLon { .. } => &["lat", "lon"],
            CompositeField::Zonal { .. } => &["lon"],
        }
    }

    fn flat_values(&self) -> Vec<f64> {
        match self {
            CompositeField::LatLon { values, .. } => values.iter().copied().collect(),
            CompositeField::Zonal { values, .. } => values.to_vec(),
        }
    }

    /// Same layout and coordinates
    pub fn same_grid(&self, other: &CompositeField) -> bool {
        let lat_ok = match (self.lat(), other.lat()) {
            (Some(a), Some(b)) => coords_match(a, b),
            (None, None) => true,
            _ => false,
        };
        lat_ok && coords_match(self.lon(), other.lon())
    }
}

/// One model's entry in a composite file
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeVariable {
    pub field: CompositeField,
    pub units: String,
    pub long_name: String,
    pub aux_coords: BTreeSet<String>,
}

impl CompositeVariable {
    pub fn new(field: CompositeField, units: impl Into<String>, long_name: impl Into<String>) -> Self {
        Self {
            field,
            units: units.into(),
            long_name: long_name.into(),
            aux_coords: BTreeSet::new(),
        }
    }

    pub fn with_aux_coords(mut self, coords: &BTreeSet<String>) -> Self {
        self.aux_coords.extend(coords.iter().cloned());
        self
    }

    /// Remove an auxiliary coordinate, tolerating its absence
    pub fn drop_aux_coord(&mut self, name: &str) -> bool {
        self.aux_coords.remove(name)
    }
}

/// Multi-model accumulator saved as one NetCDF file with a `<model>-ts`
/// variable per model
#[derive(Debug)]
pub struct CompositeDataset {
    path: PathBuf,
    variables: Vec<(String, CompositeVariable)>,
    policy: DuplicatePolicy,
}

impl CompositeDataset {
    /// Load the variables already in `path`, or start empty if it does not exist
    pub fn open_or_create(path: impl AsRef<Path>, policy: DuplicatePolicy) -> Result<Self, WriteError> {
        let path = path.as_ref().to_path_buf();
        let variables = if path.exists() {
            let variables = read_composite_variables(&path)?;
            log::info!(
                "Opened {} with {} existing model variables",
                path.display(),
                variables.len()
            );
            variables
        } else {
            log::info!("Starting new composite file {}", path.display());
            Vec::new()
        };
        Ok(Self {
            path,
            variables,
            policy,
        })
    }

    pub fn variable_name(model: &str) -> String {
        format!("{}{}", model, MODEL_VARIABLE_SUFFIX)
    }

    pub fn get(&self, model: &str) -> Option<&CompositeVariable> {
        let name = Self::variable_name(model);
        self.variables
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }

    /// What `insert` would do with `variable`, without changing anything
    pub fn check_insert(&self, model: &str, variable: &CompositeVariable) -> Result<InsertOutcome, WriteError> {
        let name = Self::variable_name(model);

        if let Some((other, existing)) = self.variables.iter().find(|(n, _)| *n != name) {
            if !existing.field.same_grid(&variable.field) {
                return Err(WriteError::GridMismatch(format!(
                    "{} does not share the grid of {} in {}",
                    name,
                    other,
                    self.path.display()
                )));
            }
        }

        let exists = self.variables.iter().any(|(n, _)| *n == name);
        resolve_duplicate(&name, exists, self.policy)
    }

    /// Add a model's variable under `<model>-ts`, applying the duplicate policy
    pub fn insert(&mut self, model: &str, variable: CompositeVariable) -> Result<InsertOutcome, WriteError> {
        let outcome = self.check_insert(model, &variable)?;
        let name = Self::variable_name(model);
        let position = self.variables.iter().position(|(n, _)| *n == name);
        match (outcome, position) {
            (InsertOutcome::Replaced, Some(i)) => self.variables[i].1 = variable,
            (InsertOutcome::Added, _) => self.variables.push((name, variable)),
            _ => {}
        }
        Ok(outcome)
    }

    /// NaN-aware mean of every model's field
    pub fn ensemble_mean(&self) -> Option<CompositeField> {
        let (_, first) = self.variables.first()?;
        let members: Vec<Vec<f64>> = self
            .variables
            .iter()
            .map(|(_, v)| v.field.flat_values())
            .collect();
        let n = members[0].len();
        let mean: Vec<f64> = (0..n)
            .map(|i| nanmean(members.iter().map(|m| m[i])))
            .collect();

        match &first.field {
            CompositeField::LatLon { lat, lon, .. } => {
                let values = Array2::from_shape_vec((lat.len(), lon.len()), mean).ok()?;
                Some(CompositeField::LatLon {
                    lat: lat.clone(),
                    lon: lon.clone(),
                    values,
                })
            }
            CompositeField::Zonal { lon, .. } => Some(CompositeField::Zonal {
                lon: lon.clone(),
                values: Array1::from(mean),
            }),
        }
    }
}

impl Accumulator for CompositeDataset {
    fn path(&self) -> &Path {
        &self.path
    }

    fn names(&self) -> Vec<String> {
        self.variables.iter().map(|(n, _)| n.clone()).collect()
    }

    /// Write every variable to a staging file, then rename it over the target
    fn save(&self) -> Result<(), WriteError> {
        let Some((_, first)) = self.variables.first() else {
            log::debug!("Nothing to write to {}", self.path.display());
            return Ok(());
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let staging = staging_path(&self.path);
        {
            let mut file = netcdf::create(&staging)?;

            file.add_attribute("title", "CMIP6 ensemble composite")?;
            file.add_attribute("Conventions", "CF-1.6")?;
            file.add_attribute(
                "history",
                format!("Written on {}", Utc::now().format("%Y-%m-%dT%H:%M:%SZ")),
            )?;

            if let Some(lat) = first.field.lat() {
                file.add_dimension("lat", lat.len())?;
                let mut lat_var = file.add_variable::<f64>("lat", &["lat"])?;
                lat_var.put_attribute("units", "degrees_north")?;
                lat_var.put_values(lat, ..)?;
            }
            let lon = first.field.lon();
            file.add_dimension("lon", lon.len())?;
            {
                let mut lon_var = file.add_variable::<f64>("lon", &["lon"])?;
                lon_var.put_attribute("units", "degrees_east")?;
                lon_var.put_values(lon, ..)?;
            }

            for (name, variable) in &self.variables {
                write_variable(&mut file, name, variable)?;
            }

            if let Some(field) = self.ensemble_mean() {
                let mean = CompositeVariable::new(
                    field,
                    first.units.as_str(),
                    format!("Ensemble mean of {} models", self.variables.len()),
                );
                write_variable(&mut file, ENSEMBLE_MEAN_VARIABLE, &mean)?;
            }
        }
        fs::rename(&staging, &self.path)?;

        log::info!(
            "Saved {} model variables and their ensemble mean to {}",
            self.variables.len(),
            self.path.display()
        );
        Ok(())
    }
}

fn write_variable(file: &mut netcdf::FileMut, name: &str, variable: &CompositeVariable) -> Result<(), WriteError> {
    let dims = variable.field.dimension_names();
    let mut var = file.add_variable::<f64>(name, dims)?;
    var.put_attribute("_FillValue", f64::NAN)?;
    var.put_attribute("units", variable.units.as_str())?;
    var.put_attribute("long_name", variable.long_name.as_str())?;
    if !variable.aux_coords.is_empty() {
        let coords: Vec<&str> = variable.aux_coords.iter().map(String::as_str).collect();
        var.put_attribute("coordinates", coords.join(" "))?;
    }
    let values = variable.field.flat_values();
    match variable.field {
        CompositeField::LatLon { .. } => var.put_values(&values, (.., ..))?,
        CompositeField::Zonal { .. } => var.put_values(&values, ..)?,
    }
    Ok(())
}

fn read_composite_variables(path: &Path) -> Result<Vec<(String, CompositeVariable)>, WriteError> {
    let malformed = |reason: String| WriteError::Format {
        path: path.display().to_string(),
        reason,
    };
    let file = netcdf::open(path)?;

    let read_axis = |name: &str| -> Result<Option<Vec<f64>>, WriteError> {
        match file.variable(name) {
            Some(var) => Ok(Some(var.get_values::<f64, _>(..)?)),
            None => Ok(None),
        }
    };
    let lat = read_axis("lat")?;
    let lon = read_axis("lon")?;

    let mut variables = Vec::new();
    for var in file.variables() {
        let name = var.name();
        if !name.ends_with(MODEL_VARIABLE_SUFFIX) {
            continue;
        }
        let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
        let values: Vec<f64> = var.get_values(..)?;

        let field = match (dims.as_slice(), &lat, &lon) {
            ([y, x], Some(lat), Some(lon)) if y == "lat" && x == "lon" => {
                let values = Array2::from_shape_vec((lat.len(), lon.len()), values)
                    .map_err(|e| malformed(format!("{}: {}", name, e)))?;
                CompositeField::LatLon {
                    lat: lat.clone(),
                    lon: lon.clone(),
                    values,
                }
            }
            ([x], _, Some(lon)) if x == "lon" => CompositeField::Zonal {
                lon: lon.clone(),
                values: Array1::from(values),
            },
            _ => return Err(malformed(format!("{} has unexpected dimensions {:?}", name, dims))),
        };

        let mut variable = CompositeVariable::new(
            field,
            string_attribute(&var, "units").unwrap_or_default(),
            string_attribute(&var, "long_name").unwrap_or_default(),
        );
        if let Some(coords) = string_attribute(&var, "coordinates") {
            variable
                .aux_coords
                .extend(coords.split_whitespace().map(str::to_string));
        }
        variables.push((name, variable));
    }
    Ok(variables)
}
