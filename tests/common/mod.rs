#![allow(dead_code)]

use std::path::Path;

/// Cumulative day of the first of each month in a 365-day year
const MONTH_START: [f64; 12] = [
    0.0, 31.0, 59.0, 90.0, 120.0, 151.0, 181.0, 212.0, 243.0, 273.0, 304.0, 334.0,
];

/// Mid-month offsets in `days since <start_year>-01-01` on a noleap calendar
pub fn noleap_mid_month_days(years: usize) -> Vec<f64> {
    (0..years * 12)
        .map(|i| (i / 12) as f64 * 365.0 + MONTH_START[i % 12] + 15.0)
        .collect()
}

pub struct GridSpec<'a> {
    pub lon_name: &'a str,
    pub lat_name: &'a str,
    pub lon: &'a [f64],
    pub lat: &'a [f64],
}

fn write_axes(file: &mut netcdf::FileMut, grid: &GridSpec) {
    {
        let mut lat_var = file.add_variable::<f64>(grid.lat_name, &[grid.lat_name]).unwrap();
        lat_var.put_attribute("units", "degrees_north").unwrap();
        lat_var.put_values(grid.lat, ..).unwrap();
    }
    let mut lon_var = file.add_variable::<f64>(grid.lon_name, &[grid.lon_name]).unwrap();
    lon_var.put_attribute("units", "degrees_east").unwrap();
    lon_var.put_values(grid.lon, ..).unwrap();
}

/// Write a `[time, lat, lon]` variable with its coordinates
pub fn write_gridded(
    path: &Path,
    variable: &str,
    grid: &GridSpec,
    time: &[f64],
    time_units: &str,
    calendar: &str,
    value: impl Fn(usize, usize, usize) -> f64,
) {
    let mut file = netcdf::create(path).unwrap();
    file.add_dimension("time", time.len()).unwrap();
    file.add_dimension(grid.lat_name, grid.lat.len()).unwrap();
    file.add_dimension(grid.lon_name, grid.lon.len()).unwrap();

    {
        let mut time_var = file.add_variable::<f64>("time", &["time"]).unwrap();
        time_var.put_attribute("units", time_units).unwrap();
        time_var.put_attribute("calendar", calendar).unwrap();
        time_var.put_values(time, ..).unwrap();
    }
    write_axes(&mut file, grid);

    let mut values = Vec::with_capacity(time.len() * grid.lat.len() * grid.lon.len());
    for t in 0..time.len() {
        for j in 0..grid.lat.len() {
            for i in 0..grid.lon.len() {
                values.push(value(t, j, i));
            }
        }
    }
    let mut var = file
        .add_variable::<f64>(variable, &["time", grid.lat_name, grid.lon_name])
        .unwrap();
    var.put_attribute("units", "K").unwrap();
    var.put_values(&values, (.., .., ..)).unwrap();
}

/// Write an `sftlf` land fraction on the given grid
pub fn write_mask(path: &Path, grid: &GridSpec, value: impl Fn(usize, usize) -> f64) {
    let mut file = netcdf::create(path).unwrap();
    file.add_dimension(grid.lat_name, grid.lat.len()).unwrap();
    file.add_dimension(grid.lon_name, grid.lon.len()).unwrap();

    write_axes(&mut file, grid);

    let mut values = Vec::with_capacity(grid.lat.len() * grid.lon.len());
    for j in 0..grid.lat.len() {
        for i in 0..grid.lon.len() {
            values.push(value(j, i));
        }
    }
    let mut var = file
        .add_variable::<f64>("sftlf", &[grid.lat_name, grid.lon_name])
        .unwrap();
    var.put_attribute("units", "%").unwrap();
    var.put_values(&values, (.., ..)).unwrap();
}
