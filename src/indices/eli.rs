//! ENSO Longitude Index.
//!
//! At each timestep the mean SST of the tropical band is the convection
//! threshold; the ELI is the mean longitude of the equatorial-Pacific cells
//! warmer than it.

use ndarray::Axis;

use super::MonthlySeries;
use crate::data_io::{GridError, GriddedField};
use crate::math::stats::nanmean;
use crate::region::{EQUATORIAL_PACIFIC, TROPICAL_BAND};

/// ELI per timestep, degrees east; NaN when no cell exceeds the threshold
pub fn eli(field: &GriddedField) -> Result<MonthlySeries, GridError> {
    let band = TROPICAL_BAND.subset(field)?;
    let pacific = EQUATORIAL_PACIFIC.subset(field)?;
    let thresholds = band.spatial_mean_series();

    let values = pacific
        .data
        .axis_iter(Axis(0))
        .zip(&thresholds)
        .map(|(plane, &threshold)| {
            let warm = plane
                .indexed_iter()
                .filter(|(_, &v)| v > threshold)
                .map(|((_, i), _)| pacific.lon[i]);
            nanmean(warm)
        })
        .collect();

    Ok(MonthlySeries {
        name: "ELI".to_string(),
        labels: field.time.iter().map(|t| t.label()).collect(),
        values,
    })
}
