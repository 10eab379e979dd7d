/// Mean of the non-NaN values, NaN when there are none
pub fn nanmean<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    let (sum, count) = values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Centered rolling mean over `window` entries.
///
/// An entry is NaN when its window runs past either end of the series or
/// contains a NaN. For an even window the extra entry sits on the left.
pub fn rolling_centered_mean(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let half = window / 2;
    (0..n)
        .map(|i| {
            if window == 0 || i < half || i - half + window > n {
                return f64::NAN;
            }
            let slice = &values[i - half..i - half + window];
            if slice.iter().any(|v| v.is_nan()) {
                f64::NAN
            } else {
                slice.iter().sum::<f64>() / window as f64
            }
        })
        .collect()
}

fn nearest_valid(values: &[f64], index: usize) -> Option<f64> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .min_by_key(|(i, _)| i.abs_diff(index))
        .map(|(_, v)| *v)
}

/// Fill NaNs in the first and last `edge` entries with a flat value.
///
/// The leading edge takes the first valid value at index `>= edge`; the
/// trailing edge takes the last valid value at index `< n - edge`. When no
/// such value exists the nearest valid value anywhere is used. Interior
/// entries are untouched.
pub fn backfill_edges(values: &[f64], edge: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = values.to_vec();
    let lead_end = edge.min(n);
    let trail_start = n.saturating_sub(edge);

    let lead_fill = values.iter().skip(edge).copied().find(|v| !v.is_nan());
    let trail_fill = values[..trail_start]
        .iter()
        .rev()
        .copied()
        .find(|v| !v.is_nan());

    for i in 0..lead_end {
        if out[i].is_nan() {
            if let Some(v) = lead_fill.or_else(|| nearest_valid(values, i)) {
                out[i] = v;
            }
        }
    }
    for i in trail_start..n {
        if out[i].is_nan() {
            if let Some(v) = trail_fill.or_else(|| nearest_valid(values, i)) {
                out[i] = v;
            }
        }
    }
    out
}
