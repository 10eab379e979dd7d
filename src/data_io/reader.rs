use ndarray::{Array2, ArrayD, IxDyn};
use netcdf::AttributeValue;
use std::path::Path;
use thiserror::Error;

use super::common::open_netcdf_file;
use super::{GridError, GriddedField, LandMask};
use crate::config::CoordinateNaming;
use crate::time_utils::{decode_time_axis, Calendar, TimeError};

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("NetCDF error: {0}")]
    Netcdf(#[from] netcdf::Error),

    #[error("Variable not found: {0}")]
    MissingVariable(String),

    #[error("Dimension not found on {variable}: {dimension}")]
    MissingDimension { variable: String, dimension: String },

    #[error("Data conversion error: {0}")]
    ConversionError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid time axis: {0}")]
    DateTimeError(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("No land mask found for {model} in {dir}")]
    MissingLandMask { model: String, dir: String },

    #[error("No realization files found for {model} in {dir}")]
    NoRealizations { model: String, dir: String },

    #[error("Time decoding error: {0}")]
    Time(#[from] TimeError),

    #[error("Grid error: {0}")]
    Grid(#[from] GridError),
}

/// Numeric value of an attribute, if it has one
pub fn attr_as_f64(value: &AttributeValue) -> Option<f64> {
    match value {
        AttributeValue::Double(v) => Some(*v),
        AttributeValue::Float(v) => Some(*v as f64),
        AttributeValue::Int(v) => Some(*v as f64),
        AttributeValue::Short(v) => Some(*v as f64),
        AttributeValue::Longlong(v) => Some(*v as f64),
        AttributeValue::Schar(v) => Some(*v as f64),
        AttributeValue::Uchar(v) => Some(*v as f64),
        AttributeValue::Doubles(v) => v.first().copied(),
        AttributeValue::Floats(v) => v.first().map(|x| *x as f64),
        AttributeValue::Ints(v) => v.first().map(|x| *x as f64),
        AttributeValue::Shorts(v) => v.first().map(|x| *x as f64),
        _ => None,
    }
}

pub(crate) fn numeric_attribute(var: &netcdf::Variable, name: &str) -> Option<f64> {
    var.attribute_value(name)
        .and_then(|res| res.ok())
        .as_ref()
        .and_then(attr_as_f64)
}

pub(crate) fn string_attribute(var: &netcdf::Variable, name: &str) -> Option<String> {
    var.attribute_value(name)
        .and_then(|res| res.ok())
        .and_then(|value| match value {
            AttributeValue::Str(s) => Some(s),
            _ => None,
        })
}

/// Decode raw values with CF packing and missing-value attributes
fn unpack_values(var: &netcdf::Variable, raw: Vec<f64>) -> Vec<f64> {
    let fill = numeric_attribute(var, "_FillValue");
    let missing = numeric_attribute(var, "missing_value");
    let scale = numeric_attribute(var, "scale_factor").unwrap_or(1.0);
    let offset = numeric_attribute(var, "add_offset").unwrap_or(0.0);

    raw.into_iter()
        .map(|v| {
            if Some(v) == fill || Some(v) == missing {
                f64::NAN
            } else {
                v * scale + offset
            }
        })
        .collect()
}

/// Name of the coordinate present in the file, preferring the profile's naming
fn resolve_coordinate(
    file: &netcdf::File,
    naming: CoordinateNaming,
    pick: fn(CoordinateNaming) -> &'static str,
) -> Result<&'static str, ReaderError> {
    let preferred = pick(naming);
    if file.variable(preferred).is_some() {
        return Ok(preferred);
    }
    let fallback = pick(naming.alternate());
    if file.variable(fallback).is_some() {
        log::warn!(
            "Coordinate '{}' not found, using '{}' instead",
            preferred,
            fallback
        );
        return Ok(fallback);
    }
    Err(ReaderError::MissingVariable(preferred.to_string()))
}

fn read_coordinate(file: &netcdf::File, name: &str) -> Result<Vec<f64>, ReaderError> {
    let var = file
        .variable(name)
        .ok_or_else(|| ReaderError::MissingVariable(name.to_string()))?;
    let values: Vec<f64> = var.get_values(..)?;
    Ok(values)
}

/// Read a variable as an array reordered to the requested dimension names
fn read_ordered(
    var: &netcdf::Variable,
    order: &[&str],
) -> Result<ArrayD<f64>, ReaderError> {
    let dims = var.dimensions();
    let names: Vec<String> = dims.iter().map(|d| d.name()).collect();
    let shape: Vec<usize> = dims.iter().map(|d| d.len()).collect();

    if names.len() != order.len() {
        return Err(ReaderError::ConversionError(format!(
            "{} has dimensions {:?}, expected {:?}",
            var.name(),
            names,
            order
        )));
    }

    let axes = order
        .iter()
        .map(|wanted| {
            names
                .iter()
                .position(|n| n == wanted)
                .ok_or_else(|| ReaderError::MissingDimension {
                    variable: var.name(),
                    dimension: wanted.to_string(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let raw: Vec<f64> = var.get_values(..)?;
    let values = unpack_values(var, raw);
    let array = ArrayD::from_shape_vec(IxDyn(&shape), values)
        .map_err(|e| ReaderError::ConversionError(e.to_string()))?;

    Ok(array.permuted_axes(IxDyn(&axes)).as_standard_layout().to_owned())
}

/// Read a `[time, lat, lon]` variable with its decoded time axis
pub fn read_gridded_field(
    path: impl AsRef<Path>,
    variable: &str,
    naming: CoordinateNaming,
) -> Result<GriddedField, ReaderError> {
    let path = path.as_ref();
    let file = open_netcdf_file(path)?;

    let lon_name = resolve_coordinate(&file, naming, CoordinateNaming::lon_name)?;
    let lat_name = resolve_coordinate(&file, naming, CoordinateNaming::lat_name)?;
    let lon = read_coordinate(&file, lon_name)?;
    let lat = read_coordinate(&file, lat_name)?;

    let time_var = file
        .variable("time")
        .ok_or_else(|| ReaderError::MissingVariable("time".to_string()))?;
    let offsets: Vec<f64> = time_var.get_values(..)?;
    let units = string_attribute(&time_var, "units").ok_or_else(|| {
        ReaderError::DateTimeError(format!("time variable in {} has no units", path.display()))
    })?;
    let calendar = match string_attribute(&time_var, "calendar") {
        Some(name) => Calendar::from_cf(&name)?,
        None => Calendar::Standard,
    };
    let time = decode_time_axis(&offsets, &units, calendar)?;

    let var = file
        .variable(variable)
        .ok_or_else(|| ReaderError::MissingVariable(variable.to_string()))?;
    let data = read_ordered(&var, &["time", lat_name, lon_name])?
        .into_dimensionality::<ndarray::Ix3>()
        .map_err(|e| ReaderError::ConversionError(e.to_string()))?;

    let aux_coords: Vec<String> = string_attribute(&var, "coordinates")
        .map(|c| c.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    let units = string_attribute(&var, "units").unwrap_or_default();

    log::debug!(
        "Read {} from {}: {} times, {} lat, {} lon ({} calendar)",
        variable,
        path.display(),
        time.len(),
        lat.len(),
        lon.len(),
        calendar
    );

    Ok(GriddedField::new(variable, units, lon, lat, time, data)?.with_aux_coords(aux_coords))
}

/// Read the `sftlf` land fraction from a fixed-field file
pub fn read_land_mask(
    path: impl AsRef<Path>,
    naming: CoordinateNaming,
) -> Result<LandMask, ReaderError> {
    let path = path.as_ref();
    let file = open_netcdf_file(path)?;

    let lon_name = resolve_coordinate(&file, naming, CoordinateNaming::lon_name)?;
    let lat_name = resolve_coordinate(&file, naming, CoordinateNaming::lat_name)?;
    let lon = read_coordinate(&file, lon_name)?;
    let lat = read_coordinate(&file, lat_name)?;

    let var = file
        .variable("sftlf")
        .ok_or_else(|| ReaderError::MissingVariable("sftlf".to_string()))?;
    let values: Array2<f64> = read_ordered(&var, &[lat_name, lon_name])?
        .into_dimensionality::<ndarray::Ix2>()
        .map_err(|e| ReaderError::ConversionError(e.to_string()))?;

    let mut mask = LandMask::new(lon, lat, values)?;
    if let Some(coords) = string_attribute(&var, "coordinates") {
        mask.aux_coords
            .extend(coords.split_whitespace().map(str::to_string));
    }
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_as_f64() {
        assert_eq!(attr_as_f64(&AttributeValue::Double(1.5)), Some(1.5));
        assert_eq!(attr_as_f64(&AttributeValue::Float(2.0)), Some(2.0));
        assert_eq!(attr_as_f64(&AttributeValue::Short(-3)), Some(-3.0));
        assert_eq!(
            attr_as_f64(&AttributeValue::Doubles(vec![1e20, 0.0])),
            Some(1e20)
        );
        assert_eq!(attr_as_f64(&AttributeValue::Str("K".to_string())), None);
    }

    #[test]
    fn test_missing_file_is_file_not_found() {
        let result = read_gridded_field(
            "definitely_missing_file.nc",
            "ts",
            CoordinateNaming::Short,
        );
        assert!(matches!(result, Err(ReaderError::FileNotFound(_))));
    }
}
