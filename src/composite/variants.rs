//! The four composite statistics, computed from a model's multi-realization
//! mean on the observational grid.

use ndarray::{Array1, Array2, Axis, Zip};

use super::{CompositeError, TimeOption, ZonalOptions};
use crate::config::{
    TimeWindow, CHANGE_FUTURE, CHANGE_HISTORICAL, DJF_MONTHS, KELVIN_OFFSET, ZONAL_FUTURE,
    ZONAL_HISTORICAL,
};
use crate::data_io::{CompositeField, CompositeVariable, GriddedField, LandMask, MaskConvention};
use crate::math::interpolate::Interpolation;
use crate::math::regrid::{regrid_field, regrid_like};
use crate::math::stats::nanmean;
use crate::region::{select_months, select_time_range, subset_box};

/// Auxiliary coordinate some models attach to `ts`
const TYPE_COORD: &str = "type";

/// Inputs shared by every variant for one model
#[derive(Debug, Clone, Copy)]
pub struct VariantContext<'a> {
    pub model: &'a str,
    /// Observational `sst`, Celsius
    pub obs: &'a GriddedField,
    /// Land mask already on the observational grid
    pub mask: &'a LandMask,
    pub convention: MaskConvention,
    pub interpolation: Interpolation,
}

impl VariantContext<'_> {
    fn djf(&self, field: &GriddedField) -> Result<GriddedField, CompositeError> {
        let djf = select_months(field, &DJF_MONTHS)?;
        self.non_empty(djf, "DJF")
    }

    fn window(&self, field: &GriddedField, window: TimeWindow) -> Result<GriddedField, CompositeError> {
        let (start, end) = window.bounds()?;
        let selected = select_time_range(field, start, end)?;
        self.non_empty(selected, &format!("{} .. {}", window.start, window.end))
    }

    fn non_empty(&self, field: GriddedField, window: &str) -> Result<GriddedField, CompositeError> {
        if field.n_time() == 0 {
            return Err(CompositeError::EmptyWindow {
                model: self.model.to_string(),
                window: window.to_string(),
            });
        }
        Ok(field)
    }

    fn spatial_regrid(&self, field: &GriddedField) -> GriddedField {
        regrid_field(field, &self.obs.lon, &self.obs.lat, self.interpolation)
    }

    /// Masked `[lat, lon]` map on the observational grid
    fn lat_lon_variable(
        &self,
        mut values: Array2<f64>,
        source: &GriddedField,
        units: &str,
        long_name: &str,
    ) -> Result<CompositeVariable, CompositeError> {
        self.mask
            .apply_to_plane(&self.obs.lon, &self.obs.lat, &mut values, self.convention)?;
        let field = CompositeField::LatLon {
            lat: self.obs.lat.clone(),
            lon: self.obs.lon.clone(),
            values,
        };
        Ok(self.finish(CompositeVariable::new(field, units, long_name), source))
    }

    fn finish(&self, variable: CompositeVariable, source: &GriddedField) -> CompositeVariable {
        let mut variable = variable.with_aux_coords(&source.aux_coords);
        if variable.drop_aux_coord(TYPE_COORD) {
            log::debug!("Dropped '{}' coordinate from {}", TYPE_COORD, self.model);
        }
        variable
    }

    /// Celsius field masked on the observational grid, cut to the zonal box
    fn zonal_box(&self, field: &GriddedField, options: &ZonalOptions) -> Result<GriddedField, CompositeError> {
        let mut celsius = field.offset(-KELVIN_OFFSET);
        self.mask.apply_to_field(&mut celsius, self.convention)?;
        Ok(subset_box(&celsius, Some(options.lon_bounds), options.lat_bounds)?)
    }

    fn zonal_variable(&self, field: &GriddedField, long_name: &str) -> CompositeVariable {
        let zonal = CompositeField::Zonal {
            lon: field.lon.clone(),
            values: zonal_profile(field),
        };
        self.finish(CompositeVariable::new(zonal, "degC", long_name), field)
    }
}

/// Mean over latitude at each timestep, then over time: one value per longitude
pub fn zonal_profile(field: &GriddedField) -> Array1<f64> {
    let by_time = field.lat_mean();
    by_time
        .axis_iter(Axis(1))
        .map(|column| nanmean(column.iter().copied()))
        .collect()
}

/// DJF mean of model minus observations, Kelvin
pub fn bias(model_mean: &GriddedField, ctx: &VariantContext) -> Result<CompositeVariable, CompositeError> {
    let comb = regrid_like(model_mean, ctx.obs, ctx.interpolation)?;

    let mut difference = comb.clone();
    Zip::from(&mut difference.data)
        .and(&ctx.obs.data)
        .for_each(|model, &obs| *model -= obs + KELVIN_OFFSET);

    let djf = ctx.djf(&difference)?;
    log::debug!("Bias for {}: {} DJF timesteps", ctx.model, djf.n_time());
    ctx.lat_lon_variable(djf.time_mean(), &comb, "K", "DJF SST bias against observations")
}

/// Future minus historical DJF mean, Kelvin
pub fn change(model_mean: &GriddedField, ctx: &VariantContext) -> Result<CompositeVariable, CompositeError> {
    let comb = ctx.spatial_regrid(model_mean);
    let djf = ctx.djf(&comb)?;

    let future = ctx.window(&djf, CHANGE_FUTURE)?;
    let historical = ctx.window(&djf, CHANGE_HISTORICAL)?;
    log::debug!(
        "Change for {}: {} future and {} historical DJF timesteps",
        ctx.model,
        future.n_time(),
        historical.n_time()
    );

    let values = future.time_mean() - historical.time_mean();
    ctx.lat_lon_variable(values, &comb, "K", "DJF SST change, future minus historical")
}

/// Longitude profile of the box mean over the whole record
pub fn zonal_average(
    model_mean: &GriddedField,
    ctx: &VariantContext,
    options: &ZonalOptions,
) -> Result<CompositeVariable, CompositeError> {
    let seasonal = match options.time_option {
        TimeOption::Year => model_mean.clone(),
        TimeOption::Djf => ctx.djf(model_mean)?,
    };
    let comb = regrid_like(&seasonal, ctx.obs, ctx.interpolation)?;
    let comb = ctx.non_empty(comb, "observational record")?;
    let boxed = ctx.zonal_box(&comb, options)?;
    Ok(ctx.zonal_variable(&boxed, "Zonal mean SST"))
}

/// Longitude profiles of the historical and future windows, in that order
pub fn zonal_difference(
    model_mean: &GriddedField,
    ctx: &VariantContext,
    options: &ZonalOptions,
) -> Result<(CompositeVariable, CompositeVariable), CompositeError> {
    let seasonal = match options.time_option {
        TimeOption::Year => model_mean.clone(),
        TimeOption::Djf => ctx.djf(model_mean)?,
    };
    let historical = ctx.window(&seasonal, ZONAL_HISTORICAL)?;
    let future = ctx.window(&seasonal, ZONAL_FUTURE)?;

    let historical = ctx.zonal_box(&ctx.spatial_regrid(&historical), options)?;
    let future = ctx.zonal_box(&ctx.spatial_regrid(&future), options)?;
    Ok((
        ctx.zonal_variable(&historical, "Zonal mean SST, 1851-1900"),
        ctx.zonal_variable(&future, "Zonal mean SST, 2051-2100"),
    ))
}
