//! Harmonizes a freshly read field: standard-calendar time axis and the
//! per-model clip from [`ModelProfile`].
//!
//! Coordinate naming is resolved while reading, so every field reaching this
//! point already uses `lon`/`lat` internally.

use thiserror::Error;

use crate::config::ModelProfile;
use crate::data_io::{GridError, GriddedField};
use crate::region::{select_time_range, subset_box};
use crate::time_utils::{TimeError, TimeValue};

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("Calendar conversion failed for {model}: {source}")]
    CalendarConversion { model: String, source: TimeError },

    #[error("Invalid clip bound for {model}: {source}")]
    InvalidClip { model: String, source: TimeError },

    #[error("Grid error: {0}")]
    Grid(#[from] GridError),
}

/// Convert every timestamp to a standard datetime.
///
/// A date absent from the Gregorian calendar fails the whole field.
pub fn to_standard_calendar(field: GriddedField, model: &str) -> Result<GriddedField, NormalizeError> {
    if field.time.iter().all(TimeValue::is_native) {
        return Ok(field);
    }

    let time = field
        .time
        .iter()
        .map(|t| t.to_datetime().map(TimeValue::Datetime))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| NormalizeError::CalendarConversion {
            model: model.to_string(),
            source,
        })?;
    log::info!(
        "Converted {} timesteps of {} to the standard calendar",
        time.len(),
        model
    );
    Ok(GriddedField { time, ..field })
}

/// Standard calendar first, then the profile's time and latitude clip
pub fn normalize(
    field: GriddedField,
    model: &str,
    profile: &ModelProfile,
) -> Result<GriddedField, NormalizeError> {
    let field = to_standard_calendar(field, model)?;

    let Some(clip) = profile.clip else {
        return Ok(field);
    };
    let (start, end) = clip.window.bounds().map_err(|source| NormalizeError::InvalidClip {
        model: model.to_string(),
        source,
    })?;
    let clipped = select_time_range(&field, start, end).map_err(|source| {
        NormalizeError::CalendarConversion {
            model: model.to_string(),
            source,
        }
    })?;
    let clipped = subset_box(&clipped, None, (clip.lat_min, clip.lat_max))?;
    log::debug!(
        "Clipped {} to {} timesteps and {} latitudes",
        model,
        clipped.n_time(),
        clipped.lat.len()
    );
    Ok(clipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_utils::{Calendar, CalendarDate};
    use ndarray::Array3;

    fn calendar_field(dates: &[CalendarDate], calendar: Calendar, lat: Vec<f64>) -> GriddedField {
        let time: Vec<TimeValue> = dates.iter().map(|d| TimeValue::Calendar(*d, calendar)).collect();
        let data = Array3::zeros((time.len(), lat.len(), 1));
        GriddedField::new("ts", "K", vec![180.0], lat, time, data).unwrap()
    }

    #[test]
    fn test_noleap_converts() {
        let f = calendar_field(
            &[CalendarDate::new(1850, 1, 16).with_time(12, 0, 0), CalendarDate::new(1850, 2, 15)],
            Calendar::NoLeap,
            vec![0.0],
        );
        let out = normalize(f, "CanESM5", &ModelProfile::STANDARD).unwrap();
        assert!(out.time.iter().all(TimeValue::is_native));
        assert_eq!(out.time[1].label(), "1850-02-15");
    }

    #[test]
    fn test_360_day_feb_30_is_fatal() {
        let f = calendar_field(
            &[CalendarDate::new(1850, 2, 30)],
            Calendar::Day360,
            vec![0.0],
        );
        let err = normalize(f, "HadGEM3-GC31-LL", &ModelProfile::STANDARD).unwrap_err();
        assert!(matches!(err, NormalizeError::CalendarConversion { .. }));
    }

    #[test]
    fn test_ec_earth_clip() {
        let f = calendar_field(
            &[
                CalendarDate::new(1850, 1, 1),
                CalendarDate::new(1850, 1, 16).with_time(12, 0, 0),
                CalendarDate::new(2100, 12, 16).with_time(12, 0, 0),
                CalendarDate::new(2101, 1, 16),
            ],
            Calendar::ProlepticGregorian,
            vec![-30.0, -20.0, 0.0, 20.0, 30.0],
        );
        let profile = ModelProfile::for_model("EC-Earth3");
        let out = normalize(f, "EC-Earth3", &profile).unwrap();
        assert_eq!(out.n_time(), 2);
        assert_eq!(out.lat, vec![-20.0, 0.0, 20.0]);
    }
}
