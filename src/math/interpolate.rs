use ndarray::{Array2, ArrayView2};
use num_traits::Float;
use std::str::FromStr;

/// Generic linear interpolation between two values
pub fn lin_interp<T: Float>(v0: T, v1: T, fac: T) -> T {
    v0 + (v1 - v0) * fac
}

/// Linear blend that ignores the endpoint carrying zero weight.
///
/// A NaN endpoint only propagates when it contributes to the result.
pub fn blend<T: Float>(v0: T, v1: T, fac: T) -> T {
    if fac == T::zero() {
        v0
    } else if fac == T::one() {
        v1
    } else {
        lin_interp(v0, v1, fac)
    }
}

/// Interpolation method used when regridding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    #[default]
    Linear,
    Nearest,
}

impl FromStr for Interpolation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(Interpolation::Linear),
            "nearest" => Ok(Interpolation::Nearest),
            other => Err(format!(
                "Invalid interpolation method: {} (expected linear or nearest)",
                other
            )),
        }
    }
}

/// Bracketing indices and weight of `target` on a monotonic axis.
///
/// The axis may be ascending or descending. Returns `None` when the target
/// lies outside the axis, so callers produce NaN instead of extrapolating.
pub fn find_bracket(coords: &[f64], target: f64) -> Option<(usize, usize, f64)> {
    let n = coords.len();
    if n == 0 || target.is_nan() {
        return None;
    }
    if n == 1 {
        return ((coords[0] - target).abs() < 1e-9).then_some((0, 0, 0.0));
    }

    let ascending = coords[n - 1] >= coords[0];
    let (lo, hi) = if ascending {
        (coords[0], coords[n - 1])
    } else {
        (coords[n - 1], coords[0])
    };
    if target < lo || target > hi {
        return None;
    }

    // Binary search for insertion point
    let mut left = 0;
    let mut right = n - 1;
    while right - left > 1 {
        let mid = (left + right) / 2;
        let before = if ascending {
            coords[mid] <= target
        } else {
            coords[mid] >= target
        };
        if before {
            left = mid;
        } else {
            right = mid;
        }
    }

    let span = coords[right] - coords[left];
    let weight = if span.abs() < f64::EPSILON {
        0.0
    } else {
        (target - coords[left]) / span
    };
    Some((left, right, weight))
}

/// Index of the grid point a bracket resolves to under nearest-neighbour
pub fn nearest_index(bracket: (usize, usize, f64)) -> usize {
    let (left, right, weight) = bracket;
    if weight <= 0.5 {
        left
    } else {
        right
    }
}

/// Interpolate a `[lat, lon]` plane onto another grid; NaN outside the source
pub fn regrid_plane(
    src_lon: &[f64],
    src_lat: &[f64],
    plane: ArrayView2<f64>,
    dst_lon: &[f64],
    dst_lat: &[f64],
    method: Interpolation,
) -> Array2<f64> {
    let lon_brackets: Vec<_> = dst_lon.iter().map(|&x| find_bracket(src_lon, x)).collect();
    let lat_brackets: Vec<_> = dst_lat.iter().map(|&y| find_bracket(src_lat, y)).collect();

    Array2::from_shape_fn((dst_lat.len(), dst_lon.len()), |(j, i)| {
        let (Some(by), Some(bx)) = (lat_brackets[j], lon_brackets[i]) else {
            return f64::NAN;
        };
        match method {
            Interpolation::Nearest => plane[[nearest_index(by), nearest_index(bx)]],
            Interpolation::Linear => {
                let (j0, j1, wy) = by;
                let (i0, i1, wx) = bx;
                let f_y0 = blend(plane[[j0, i0]], plane[[j0, i1]], wx);
                let f_y1 = blend(plane[[j1, i0]], plane[[j1, i1]], wx);
                blend(f_y0, f_y1, wy)
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_lin_interp() {
        assert_eq!(lin_interp(1.0, 3.0, 0.5), 2.0);
    }

    #[test]
    fn test_blend_ignores_unweighted_nan() {
        assert_eq!(blend(2.0, f64::NAN, 0.0), 2.0);
        assert_eq!(blend(f64::NAN, 4.0, 1.0), 4.0);
        assert!(blend(2.0, f64::NAN, 0.5).is_nan());
    }

    #[test]
    fn test_find_bracket_ascending() {
        let coords = [0.0, 10.0, 20.0];
        assert_eq!(find_bracket(&coords, 15.0), Some((1, 2, 0.5)));
        assert_eq!(find_bracket(&coords, 20.0), Some((1, 2, 1.0)));
        assert_eq!(find_bracket(&coords, 0.0), Some((0, 1, 0.0)));
        assert_eq!(find_bracket(&coords, 25.0), None);
        assert_eq!(find_bracket(&coords, -1.0), None);
    }

    #[test]
    fn test_find_bracket_descending() {
        let coords = [10.0, 0.0, -10.0];
        let (left, right, weight) = find_bracket(&coords, 5.0).unwrap();
        assert_eq!((left, right), (0, 1));
        assert!((weight - 0.5).abs() < 1e-12);
        assert_eq!(find_bracket(&coords, 11.0), None);
    }

    #[test]
    fn test_regrid_plane_linear_and_nearest() {
        let plane = arr2(&[[0.0, 10.0], [20.0, 30.0]]);
        let lon = [0.0, 10.0];
        let lat = [0.0, 10.0];

        let linear = regrid_plane(&lon, &lat, plane.view(), &[5.0], &[5.0], Interpolation::Linear);
        assert_eq!(linear[[0, 0]], 15.0);

        let nearest = regrid_plane(&lon, &lat, plane.view(), &[8.0], &[1.0], Interpolation::Nearest);
        assert_eq!(nearest[[0, 0]], 10.0);

        let outside = regrid_plane(&lon, &lat, plane.view(), &[15.0], &[5.0], Interpolation::Linear);
        assert!(outside[[0, 0]].is_nan());
    }

    #[test]
    fn test_interpolation_parse() {
        assert_eq!("nearest".parse::<Interpolation>().unwrap(), Interpolation::Nearest);
        assert!("cubic".parse::<Interpolation>().is_err());
    }
}
