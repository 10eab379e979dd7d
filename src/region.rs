//! Named lon/lat boxes and time selections.
//!
//! Bounds are closed and select by coordinate value, so ascending and
//! descending axes both yield the cells inside the box. Longitudes are
//! 0-360; boxes crossing the prime meridian are not supported.

use chrono::NaiveDateTime;

use crate::data_io::{GridError, GriddedField};
use crate::time_utils::TimeError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub name: &'static str,
    /// Longitude bounds in degrees east, `None` for every longitude
    pub lon: Option<(f64, f64)>,
    /// Latitude bounds in degrees north
    pub lat: (f64, f64),
}

/// Tropical band, threshold of the ELI
pub const TROPICAL_BAND: Region = Region::new("tropical band", None, (-5.0, 5.0));

/// Equatorial Pacific box scanned by the ELI
pub const EQUATORIAL_PACIFIC: Region =
    Region::new("equatorial Pacific", Some((115.0, 290.0)), (-5.0, 5.0));

pub const NINO34: Region = Region::new("Nino-3.4", Some((120.0, 170.0)), (-5.0, 5.0));

impl Region {
    pub const fn new(name: &'static str, lon: Option<(f64, f64)>, lat: (f64, f64)) -> Self {
        Self { name, lon, lat }
    }

    /// Cells of `field` inside the box, same time axis and attributes
    pub fn subset(&self, field: &GriddedField) -> Result<GriddedField, GridError> {
        subset_box(field, self.lon, self.lat).map_err(|e| match e {
            GridError::EmptySelection(what) => {
                GridError::EmptySelection(format!("{} ({})", self.name, what))
            }
            other => other,
        })
    }
}

/// Positions of coordinates inside the closed interval, bounds in either order
pub fn indices_within(coords: &[f64], bounds: (f64, f64)) -> Vec<usize> {
    let (lo, hi) = if bounds.0 <= bounds.1 {
        bounds
    } else {
        (bounds.1, bounds.0)
    };
    coords
        .iter()
        .enumerate()
        .filter(|(_, &c)| c >= lo && c <= hi)
        .map(|(i, _)| i)
        .collect()
}

pub fn subset_box(
    field: &GriddedField,
    lon: Option<(f64, f64)>,
    lat: (f64, f64),
) -> Result<GriddedField, GridError> {
    let lat_idx = indices_within(&field.lat, lat);
    let lon_idx = match lon {
        Some(bounds) => indices_within(&field.lon, bounds),
        None => (0..field.lon.len()).collect(),
    };
    if lat_idx.is_empty() || lon_idx.is_empty() {
        return Err(GridError::EmptySelection(format!(
            "no cells within lon {:?}, lat {:?}",
            lon, lat
        )));
    }

    let data = field
        .data
        .select(ndarray::Axis(1), &lat_idx)
        .select(ndarray::Axis(2), &lon_idx);
    Ok(GriddedField {
        lon: lon_idx.iter().map(|&i| field.lon[i]).collect(),
        lat: lat_idx.iter().map(|&i| field.lat[i]).collect(),
        data,
        ..field.clone()
    })
}

/// Timesteps inside the closed datetime interval; may be empty
pub fn select_time_range(
    field: &GriddedField,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<GriddedField, TimeError> {
    let mut keep = Vec::new();
    for (i, t) in field.time.iter().enumerate() {
        let dt = t.to_datetime()?;
        if dt >= start && dt <= end {
            keep.push(i);
        }
    }
    Ok(field.select_time(&keep))
}

/// Timesteps whose calendar month is one of `months`; may be empty
pub fn select_months(field: &GriddedField, months: &[u32]) -> Result<GriddedField, TimeError> {
    let mut keep = Vec::new();
    for (i, t) in field.time.iter().enumerate() {
        if months.contains(&t.month()?) {
            keep.push(i);
        }
    }
    Ok(field.select_time(&keep))
}
