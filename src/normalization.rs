use crate::preprocessing::{nan_max, nan_mean};
use log::{debug, trace, warn};
use ndarray::{Array1, Array2, Axis};

/// Points closer than this on the cycle-percent axis count as duplicates.
const DUPLICATE_TOLERANCE: f64 = 1e-10;

/// Rescale an envelope to percent of its peak.
///
/// The peak is taken over `[first HS, last HS)` when at least two heel strikes
/// are known, otherwise over the whole envelope. A non-finite or non-positive
/// peak cannot normalize anything and yields all NaN.
pub fn percent_peak(envelope: &[f64], hs_idx: Option<&[usize]>) -> Vec<f64> {
    let reference = match hs_idx {
        Some(hs) if hs.len() >= 2 => {
            let start = hs[0].min(envelope.len());
            let end = hs[hs.len() - 1].min(envelope.len());
            nan_max(&envelope[start..end.max(start)])
        }
        _ => nan_max(envelope),
    };

    if !reference.is_finite() || reference <= 0.0 {
        warn!(
            "Percent-of-peak reference {} is unusable, envelope left as NaN",
            reference
        );
        return vec![f64::NAN; envelope.len()];
    }
    trace!("Percent-of-peak reference {:.5}", reference);
    envelope.iter().map(|v| v / reference * 100.0).collect()
}

/// `n` evenly spaced points from 0 to 100 inclusive.
pub fn percent_grid(n_points: usize) -> Vec<f64> {
    match n_points {
        0 => Vec::new(),
        1 => vec![0.0],
        n => (0..n)
            .map(|i| {
                if i == n - 1 {
                    100.0
                } else {
                    100.0 * i as f64 / (n - 1) as f64
                }
            })
            .collect(),
    }
}

/// Piecewise-linear interpolation of `(xp, fp)` at `x`, holding the end values
/// outside `xp`. `xp` must be strictly increasing and non-empty.
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let last = xp.len() - 1;
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[last] {
        return fp[last];
    }
    // First index with xp > x; x lies in [xp[j-1], xp[j])
    let j = xp.partition_point(|&v| v <= x);
    let (x0, x1) = (xp[j - 1], xp[j]);
    let (y0, y1) = (fp[j - 1], fp[j]);
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}

/// Warp one inter-HS segment onto the percent grid, or `None` when the
/// segment is degenerate.
fn warp_segment(seg_t: &[f64], seg_y: &[f64], grid: &[f64]) -> Option<Vec<f64>> {
    if seg_t.len() < 2 {
        return None;
    }
    let duration = seg_t[seg_t.len() - 1] - seg_t[0];
    if !duration.is_finite() || duration <= 0.0 {
        return None;
    }

    let mut points: Vec<(f64, f64)> = seg_t
        .iter()
        .zip(seg_y)
        .map(|(&t, &y)| ((t - seg_t[0]) / duration * 100.0, y))
        .collect();
    points.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut xp: Vec<f64> = Vec::with_capacity(points.len());
    let mut fp: Vec<f64> = Vec::with_capacity(points.len());
    // Each point is compared with its sorted predecessor, kept or not
    let mut prev: Option<f64> = None;
    for (x, y) in points {
        if prev.map_or(true, |p| x - p > DUPLICATE_TOLERANCE) {
            xp.push(x);
            fp.push(y);
        }
        prev = Some(x);
    }
    if xp.len() < 2 {
        return None;
    }

    Some(grid.iter().map(|&g| interp(g, &xp, &fp)).collect())
}

/// Time-normalize the signal between consecutive heel strikes.
///
/// Returns the percent grid and a matrix with one row per valid cycle and
/// `n_points` columns. Degenerate segments are skipped; when none survive the
/// matrix has zero rows.
pub fn normalize_cycles(
    y: &[f64],
    hs_idx: &[usize],
    t: &[f64],
    n_points: usize,
) -> (Vec<f64>, Array2<f64>) {
    let grid = percent_grid(n_points);
    let limit = y.len().min(t.len());
    let mut rows: Vec<f64> = Vec::new();
    let mut n_cycles = 0;

    for (i, pair) in hs_idx.windows(2).enumerate() {
        let (s, e) = (pair[0], pair[1].min(limit));
        if e <= s + 1 {
            trace!("Cycle {}: segment [{}, {}) too short, skipped", i, s, e);
            continue;
        }
        match warp_segment(&t[s..e], &y[s..e], &grid) {
            Some(row) => {
                rows.extend(row);
                n_cycles += 1;
            }
            None => trace!("Cycle {}: degenerate time axis, skipped", i),
        }
    }

    debug!(
        "{} of {} cycles normalized onto {} points",
        n_cycles,
        hs_idx.len().saturating_sub(1),
        n_points
    );
    let cycles = Array2::from_shape_vec((n_cycles, grid.len()), rows)
        .unwrap_or_else(|_| Array2::zeros((0, grid.len())));
    (grid, cycles)
}

/// NaN-ignoring mean of each row.
pub fn row_means(cycles: &Array2<f64>) -> Vec<f64> {
    cycles
        .axis_iter(Axis(0))
        .map(|row| nan_mean(&row.to_vec()))
        .collect()
}

/// NaN-ignoring mean and population standard deviation of each grid column.
pub fn column_mean_sd(cycles: &Array2<f64>) -> (Array1<f64>, Array1<f64>) {
    let n_cols = cycles.ncols();
    let mut mean = Array1::from_elem(n_cols, f64::NAN);
    let mut sd = Array1::from_elem(n_cols, f64::NAN);

    for (j, column) in cycles.axis_iter(Axis(1)).enumerate() {
        let values: Vec<f64> = column.iter().copied().filter(|v| !v.is_nan()).collect();
        if values.is_empty() {
            continue;
        }
        let m = values.iter().sum::<f64>() / values.len() as f64;
        let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
        mean[j] = m;
        sd[j] = var.sqrt();
    }
    (mean, sd)
}
