use ndarray::arr2;
use enso_cmip6::math::*;

#[test]
fn test_lin_interp() {
    assert_eq!(lin_interp(1.0, 3.0, 0.5), 2.0);
    assert_eq!(lin_interp(5.0, 15.0, 0.0), 5.0);
    assert_eq!(lin_interp(5.0, 15.0, 1.0), 15.0);
}

#[test]
fn test_regrid_plane_onto_descending_latitudes() {
    // source ascending, destination descending as in the observational grid
    let plane = arr2(&[[0.0, 10.0], [20.0, 30.0]]);
    let out = regrid_plane(
        &[0.0, 2.0],
        &[-1.0, 1.0],
        plane.view(),
        &[1.0],
        &[1.0, 0.0, -1.0],
        Interpolation::Linear,
    );
    assert_eq!(out.dim(), (3, 1));
    assert!((out[[0, 0]] - 25.0).abs() < 1e-12);
    assert!((out[[1, 0]] - 15.0).abs() < 1e-12);
    assert!((out[[2, 0]] - 5.0).abs() < 1e-12);
}

#[test]
fn test_regrid_plane_outside_source_is_nan() {
    let plane = arr2(&[[1.0, 2.0]]);
    let out = regrid_plane(&[0.0, 1.0], &[0.0], plane.view(), &[2.0], &[0.0], Interpolation::Nearest);
    assert!(out[[0, 0]].is_nan());
}

#[test]
fn test_nearest_applies_to_masks() {
    let plane = arr2(&[[0.0, 100.0]]);
    let out = regrid_plane(
        &[0.0, 1.0],
        &[0.0],
        plane.view(),
        &[0.2, 0.8],
        &[0.0],
        Interpolation::Nearest,
    );
    assert_eq!(out, arr2(&[[0.0, 100.0]]));
}

#[test]
fn test_climatology_helpers() {
    let values: Vec<f64> = (0..40).map(|v| v as f64).collect();
    let rolled = rolling_centered_mean(&values, 5);
    assert!(rolled[1].is_nan());
    assert_eq!(rolled[2], 2.0);

    let filled = backfill_edges(&rolled, 15);
    assert_eq!(filled[0], 15.0);
    assert_eq!(filled[39], 24.0);
    assert_eq!(nanmean(filled.iter().copied().take(2)), 15.0);
}
