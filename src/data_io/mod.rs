pub mod common;
pub mod csv_table;
pub mod output_trait;
pub mod reader;
pub mod writer;

pub use csv_table::SeriesTable;
pub use output_trait::*;
pub use reader::*;
pub use writer::*;

use ndarray::{Array2, Array3, Axis};
use std::collections::BTreeSet;
use std::str::FromStr;
use thiserror::Error;

use crate::math::stats::nanmean;
use crate::time_utils::TimeValue;

/// Tolerance when comparing coordinate values of two grids
const COORD_TOLERANCE: f64 = 1e-6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("Shape mismatch for {name}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("Grid mismatch: {0}")]
    GridMismatch(String),

    #[error("Empty selection: {0}")]
    EmptySelection(String),
}

/// True when two coordinate axes hold the same values
pub fn coords_match(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(x, y)| (x - y).abs() <= COORD_TOLERANCE)
}

/// A scalar field on a regular lon/lat grid over time
#[derive(Debug, Clone)]
pub struct GriddedField {
    /// Variable name (e.g. "ts", "sst")
    pub name: String,
    pub units: String,
    /// Longitudes, degrees east
    pub lon: Vec<f64>,
    /// Latitudes, degrees north
    pub lat: Vec<f64>,
    pub time: Vec<TimeValue>,
    /// Layout [time, lat, lon]; missing values are NaN
    pub data: Array3<f64>,
    /// Non-dimension coordinates carried by the variable (e.g. `type`)
    pub aux_coords: BTreeSet<String>,
}

impl GriddedField {
    pub fn new(
        name: impl Into<String>,
        units: impl Into<String>,
        lon: Vec<f64>,
        lat: Vec<f64>,
        time: Vec<TimeValue>,
        data: Array3<f64>,
    ) -> Result<Self, GridError> {
        let name = name.into();
        let expected = vec![time.len(), lat.len(), lon.len()];
        if data.shape() != expected.as_slice() {
            return Err(GridError::ShapeMismatch {
                name,
                expected,
                found: data.shape().to_vec(),
            });
        }
        Ok(Self {
            name,
            units: units.into(),
            lon,
            lat,
            time,
            data,
            aux_coords: BTreeSet::new(),
        })
    }

    pub fn with_aux_coords<I, S>(mut self, coords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aux_coords.extend(coords.into_iter().map(Into::into));
        self
    }

    pub fn n_time(&self) -> usize {
        self.time.len()
    }

    pub fn same_grid(&self, lon: &[f64], lat: &[f64]) -> bool {
        coords_match(&self.lon, lon) && coords_match(&self.lat, lat)
    }

    /// Remove an auxiliary coordinate, returning whether it was present
    pub fn drop_aux_coord(&mut self, name: &str) -> bool {
        self.aux_coords.remove(name)
    }

    /// Copy with every value shifted by `delta`
    pub fn offset(&self, delta: f64) -> GriddedField {
        GriddedField {
            data: self.data.mapv(|v| v + delta),
            ..self.clone()
        }
    }

    /// Keep only the given timesteps, in order
    pub fn select_time(&self, indices: &[usize]) -> GriddedField {
        GriddedField {
            time: indices.iter().map(|&i| self.time[i]).collect(),
            data: self.data.select(Axis(0), indices),
            ..self.clone()
        }
    }

    /// NaN-aware mean over time, layout [lat, lon]
    pub fn time_mean(&self) -> Array2<f64> {
        let (_, nlat, nlon) = self.data.dim();
        Array2::from_shape_fn((nlat, nlon), |(j, i)| {
            nanmean(self.data.slice(ndarray::s![.., j, i]).iter().copied())
        })
    }

    /// NaN-aware mean over latitude, layout [time, lon]
    pub fn lat_mean(&self) -> Array2<f64> {
        let (nt, _, nlon) = self.data.dim();
        Array2::from_shape_fn((nt, nlon), |(t, i)| {
            nanmean(self.data.slice(ndarray::s![t, .., i]).iter().copied())
        })
    }

    /// NaN-aware mean over the whole grid, one value per timestep
    pub fn spatial_mean_series(&self) -> Vec<f64> {
        self.data
            .outer_iter()
            .map(|plane| nanmean(plane.iter().copied()))
            .collect()
    }
}

/// How land-fraction values decide which cells survive masking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskConvention {
    /// `LowFraction` when the mask maximum is 10, otherwise `NotMaximum`
    Detect,
    /// Keep cells with `sftlf <= 10`
    LowFraction,
    /// Keep cells whose value differs from the mask maximum
    NotMaximum,
    /// Keep cells with `sftlf != 100`
    NotFullLand,
}

impl MaskConvention {
    /// Resolve `Detect` against the observed mask maximum
    pub fn resolve(self, max_value: Option<f64>) -> MaskConvention {
        match self {
            MaskConvention::Detect => {
                if max_value == Some(10.0) {
                    MaskConvention::LowFraction
                } else {
                    MaskConvention::NotMaximum
                }
            }
            other => other,
        }
    }

    fn retains(self, value: f64, max_value: Option<f64>) -> bool {
        match self {
            MaskConvention::LowFraction => value <= 10.0,
            MaskConvention::NotMaximum => max_value.map_or(true, |max| value != max),
            MaskConvention::NotFullLand => value != 100.0,
            MaskConvention::Detect => self.resolve(max_value).retains(value, max_value),
        }
    }
}

impl FromStr for MaskConvention {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "detect" => Ok(MaskConvention::Detect),
            "low-fraction" => Ok(MaskConvention::LowFraction),
            "not-maximum" => Ok(MaskConvention::NotMaximum),
            "not-full-land" => Ok(MaskConvention::NotFullLand),
            other => Err(format!(
                "Invalid mask convention: {} (expected detect, low-fraction, not-maximum or not-full-land)",
                other
            )),
        }
    }
}

/// Land fraction on a lon/lat grid
#[derive(Debug, Clone)]
pub struct LandMask {
    pub lon: Vec<f64>,
    pub lat: Vec<f64>,
    /// Layout [lat, lon]
    pub values: Array2<f64>,
    pub aux_coords: BTreeSet<String>,
}

impl LandMask {
    pub fn new(lon: Vec<f64>, lat: Vec<f64>, values: Array2<f64>) -> Result<Self, GridError> {
        let expected = vec![lat.len(), lon.len()];
        if values.shape() != expected.as_slice() {
            return Err(GridError::ShapeMismatch {
                name: "sftlf".to_string(),
                expected,
                found: values.shape().to_vec(),
            });
        }
        Ok(Self {
            lon,
            lat,
            values,
            aux_coords: BTreeSet::new(),
        })
    }

    /// Largest non-NaN value
    pub fn max_value(&self) -> Option<f64> {
        self.values
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, v| Some(acc.map_or(v, |m: f64| m.max(v))))
    }

    /// Cells kept under `convention`, layout [lat, lon]
    pub fn retained(&self, convention: MaskConvention) -> Array2<bool> {
        let max_value = self.max_value();
        let resolved = convention.resolve(max_value);
        log::debug!(
            "Applying land mask as {:?} (max value {:?})",
            resolved,
            max_value
        );
        self.values.mapv(|v| resolved.retains(v, max_value))
    }

    fn check_grid(&self, lon: &[f64], lat: &[f64]) -> Result<(), GridError> {
        if coords_match(&self.lon, lon) && coords_match(&self.lat, lat) {
            Ok(())
        } else {
            Err(GridError::GridMismatch(format!(
                "mask grid {}x{} does not match field grid {}x{}",
                self.lat.len(),
                self.lon.len(),
                lat.len(),
                lon.len()
            )))
        }
    }

    /// Set masked-out cells of every timestep to NaN
    pub fn apply_to_field(
        &self,
        field: &mut GriddedField,
        convention: MaskConvention,
    ) -> Result<(), GridError> {
        self.check_grid(&field.lon, &field.lat)?;
        let keep = self.retained(convention);
        for mut plane in field.data.outer_iter_mut() {
            ndarray::Zip::from(&mut plane).and(&keep).for_each(|v, &k| {
                if !k {
                    *v = f64::NAN;
                }
            });
        }
        Ok(())
    }

    /// Set masked-out cells of a [lat, lon] plane to NaN
    pub fn apply_to_plane(
        &self,
        lon: &[f64],
        lat: &[f64],
        plane: &mut Array2<f64>,
        convention: MaskConvention,
    ) -> Result<(), GridError> {
        self.check_grid(lon, lat)?;
        let keep = self.retained(convention);
        ndarray::Zip::from(plane).and(&keep).for_each(|v, &k| {
            if !k {
                *v = f64::NAN;
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ndarray::{arr2, Array3};

    fn months(n: usize) -> Vec<TimeValue> {
        (0..n)
            .map(|m| {
                TimeValue::Datetime(
                    NaiveDate::from_ymd_opt(2000, m as u32 + 1, 16)
                        .unwrap()
                        .and_hms_opt(12, 0, 0)
                        .unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn test_field_shape_validation() {
        let data = Array3::<f64>::zeros((2, 3, 4));
        let ok = GriddedField::new("ts", "K", vec![0.0; 4], vec![0.0; 3], months(2), data.clone());
        assert!(ok.is_ok());

        let err = GriddedField::new("ts", "K", vec![0.0; 3], vec![0.0; 3], months(2), data);
        assert!(matches!(err, Err(GridError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_means_ignore_nan() {
        let mut data = Array3::<f64>::from_elem((2, 1, 2), 1.0);
        data[[0, 0, 1]] = f64::NAN;
        data[[1, 0, 0]] = 3.0;
        let field =
            GriddedField::new("ts", "K", vec![10.0, 20.0], vec![0.0], months(2), data).unwrap();

        let series = field.spatial_mean_series();
        assert_eq!(series, vec![1.0, 2.0]);

        let mean = field.time_mean();
        assert_eq!(mean[[0, 0]], 2.0);
        assert_eq!(mean[[0, 1]], 1.0);
    }

    #[test]
    fn test_detect_low_fraction_convention() {
        let mask = LandMask::new(
            vec![0.0, 1.0, 2.0],
            vec![0.0],
            arr2(&[[0.0, 10.0, 5.0]]),
        )
        .unwrap();
        assert_eq!(
            MaskConvention::Detect.resolve(mask.max_value()),
            MaskConvention::LowFraction
        );
        let keep = mask.retained(MaskConvention::Detect);
        assert_eq!(keep, arr2(&[[true, true, true]]));
    }

    #[test]
    fn test_detect_not_maximum_convention() {
        let mask = LandMask::new(
            vec![0.0, 1.0, 2.0],
            vec![0.0],
            arr2(&[[0.0, 100.0, 40.0]]),
        )
        .unwrap();
        let keep = mask.retained(MaskConvention::Detect);
        assert_eq!(keep, arr2(&[[true, false, true]]));
    }

    #[test]
    fn test_nan_mask_cells() {
        let mask = LandMask::new(vec![0.0, 1.0], vec![0.0], arr2(&[[f64::NAN, 0.0]])).unwrap();
        assert_eq!(
            mask.retained(MaskConvention::LowFraction),
            arr2(&[[false, true]])
        );
        assert_eq!(
            mask.retained(MaskConvention::NotFullLand),
            arr2(&[[true, true]])
        );
    }

    #[test]
    fn test_apply_rejects_mismatched_grid() {
        let mask = LandMask::new(vec![0.0, 1.0], vec![0.0], arr2(&[[0.0, 100.0]])).unwrap();
        let mut field = GriddedField::new(
            "ts",
            "K",
            vec![0.0, 2.0],
            vec![0.0],
            months(1),
            Array3::zeros((1, 1, 2)),
        )
        .unwrap();
        assert!(matches!(
            mask.apply_to_field(&mut field, MaskConvention::NotFullLand),
            Err(GridError::GridMismatch(_))
        ));
    }

    #[test]
    fn test_apply_masks_every_timestep() {
        let mask = LandMask::new(vec![0.0, 1.0], vec![0.0], arr2(&[[0.0, 100.0]])).unwrap();
        let mut field = GriddedField::new(
            "ts",
            "K",
            vec![0.0, 1.0],
            vec![0.0],
            months(3),
            Array3::from_elem((3, 1, 2), 300.0),
        )
        .unwrap();
        mask.apply_to_field(&mut field, MaskConvention::NotFullLand)
            .unwrap();
        for t in 0..3 {
            assert_eq!(field.data[[t, 0, 0]], 300.0);
            assert!(field.data[[t, 0, 1]].is_nan());
        }
    }

    #[test]
    fn test_mask_convention_parse() {
        assert_eq!(
            "not-full-land".parse::<MaskConvention>().unwrap(),
            MaskConvention::NotFullLand
        );
        assert!("sometimes".parse::<MaskConvention>().is_err());
    }
}
