//! Regridding of fields and masks onto a reference grid.

use chrono::NaiveDateTime;
use ndarray::{Array2, Array3, Axis};

use super::interpolate::{blend, find_bracket, nearest_index, regrid_plane, Interpolation};
use crate::data_io::{GriddedField, LandMask};
use crate::time_utils::{TimeError, TimeValue};

/// Interpolate every timestep of `field` onto `dst_lon` x `dst_lat`
pub fn regrid_field(
    field: &GriddedField,
    dst_lon: &[f64],
    dst_lat: &[f64],
    method: Interpolation,
) -> GriddedField {
    let mut data = Array3::<f64>::zeros((field.n_time(), dst_lat.len(), dst_lon.len()));
    for (mut out, plane) in data.outer_iter_mut().zip(field.data.outer_iter()) {
        out.assign(&regrid_plane(&field.lon, &field.lat, plane, dst_lon, dst_lat, method));
    }
    GriddedField {
        lon: dst_lon.to_vec(),
        lat: dst_lat.to_vec(),
        data,
        ..field.clone()
    }
}

/// Interpolate a land mask onto `dst_lon` x `dst_lat`
pub fn regrid_mask(
    mask: &LandMask,
    dst_lon: &[f64],
    dst_lat: &[f64],
    method: Interpolation,
) -> LandMask {
    LandMask {
        lon: dst_lon.to_vec(),
        lat: dst_lat.to_vec(),
        values: regrid_plane(&mask.lon, &mask.lat, mask.values.view(), dst_lon, dst_lat, method),
        aux_coords: mask.aux_coords.clone(),
    }
}

/// Interpolate `field` in time onto `targets`; NaN outside the source axis
pub fn interp_time(
    field: &GriddedField,
    targets: &[NaiveDateTime],
    method: Interpolation,
) -> Result<GriddedField, TimeError> {
    let source = field
        .time
        .iter()
        .map(TimeValue::to_datetime)
        .collect::<Result<Vec<_>, _>>()?;
    let Some(origin) = source.first().copied() else {
        let (_, nlat, nlon) = field.data.dim();
        return Ok(GriddedField {
            time: targets.iter().map(|&t| TimeValue::Datetime(t)).collect(),
            data: Array3::from_elem((targets.len(), nlat, nlon), f64::NAN),
            ..field.clone()
        });
    };
    let seconds = |t: &NaiveDateTime| (*t - origin).num_seconds() as f64;
    let source_secs: Vec<f64> = source.iter().map(seconds).collect();

    let (_, nlat, nlon) = field.data.dim();
    let mut data = Array3::<f64>::from_elem((targets.len(), nlat, nlon), f64::NAN);
    for (k, target) in targets.iter().enumerate() {
        let Some(bracket) = find_bracket(&source_secs, seconds(target)) else {
            continue;
        };
        let plane: Array2<f64> = match method {
            Interpolation::Nearest => field.data.index_axis(Axis(0), nearest_index(bracket)).to_owned(),
            Interpolation::Linear => {
                let (t0, t1, w) = bracket;
                let p0 = field.data.index_axis(Axis(0), t0);
                let p1 = field.data.index_axis(Axis(0), t1);
                ndarray::Zip::from(&p0).and(&p1).map_collect(|&a, &b| blend(a, b, w))
            }
        };
        data.index_axis_mut(Axis(0), k).assign(&plane);
    }

    Ok(GriddedField {
        time: targets.iter().map(|&t| TimeValue::Datetime(t)).collect(),
        data,
        ..field.clone()
    })
}

/// Interpolate `field` onto the full coordinates of `reference`: lon, lat and time
pub fn regrid_like(
    field: &GriddedField,
    reference: &GriddedField,
    method: Interpolation,
) -> Result<GriddedField, TimeError> {
    let spatial = regrid_field(field, &reference.lon, &reference.lat, method);
    let targets = reference
        .time
        .iter()
        .map(TimeValue::to_datetime)
        .collect::<Result<Vec<_>, _>>()?;
    interp_time(&spatial, &targets, method)
}
