use crate::error::{EmgError, Result};
use log::{debug, trace};
use sci_rs::signal::filter::design::{
    butter_dyn, DigitalFilter, FilterBandType, FilterOutputType, Sos, SosFormatFilter,
};
use sci_rs::signal::filter::sosfiltfilt_dyn;
use std::cmp::Ordering;

/// Envelope extraction settings, all in physical units.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeConfig {
    pub highpass_hz: f64,
    pub lowpass_hz: f64,
    pub rms_ms: f64,
    pub order: usize,
}

/// Design a Butterworth band-pass in second-order sections.
fn design_bandpass(fs: f64, lowcut: f64, highcut: f64, order: usize) -> Result<Vec<Sos<f64>>> {
    let nyquist = fs / 2.0;
    if !(lowcut > 0.0 && lowcut < highcut && highcut < nyquist) {
        return Err(EmgError::Configuration(format!(
            "band-pass [{}, {}] Hz is not inside (0, {}) Hz",
            lowcut, highcut, nyquist
        )));
    }

    let filter = butter_dyn(
        order,
        vec![lowcut, highcut],
        Some(FilterBandType::Bandpass),
        Some(false),
        Some(FilterOutputType::Sos),
        Some(fs),
    );
    match filter {
        DigitalFilter::Sos(SosFormatFilter { sos }) => Ok(sos),
        _ => Err(EmgError::Filter(
            "Butterworth design did not return second-order sections".to_string(),
        )),
    }
}

/// Zero-phase (forward-backward) band-pass filter.
pub fn bandpass_filter(
    x: &[f64],
    fs: f64,
    lowcut: f64,
    highcut: f64,
    order: usize,
) -> Result<Vec<f64>> {
    let sos = design_bandpass(fs, lowcut, highcut, order)?;

    // sosfiltfilt pads both ends by 3 * ntaps samples
    let padlen = 3 * (2 * sos.len() + 1);
    if x.len() <= padlen {
        return Err(EmgError::Configuration(format!(
            "signal has {} samples, zero-phase filtering of order {} needs more than {}",
            x.len(),
            order,
            padlen
        )));
    }

    debug!(
        "Band-pass {}-{} Hz, order {} ({} sections) over {} samples",
        lowcut,
        highcut,
        order,
        sos.len(),
        x.len()
    );
    Ok(sosfiltfilt_dyn(x.iter(), &sos))
}

/// Centered moving RMS with `np.convolve(.., mode="same")` alignment.
///
/// The window for output `i` covers `[i - win/2, i + (win-1)/2]`; samples
/// outside the signal count as zero and the sum is always divided by `win`.
pub fn moving_rms(x: &[f64], win: usize) -> Vec<f64> {
    if win <= 1 {
        return x.iter().map(|v| v.abs()).collect();
    }

    let n = x.len();
    let left = win / 2;
    let right = win - left - 1;
    // cumulative[k] is the sum of the first k squares
    let mut cumulative = Vec::with_capacity(n + 1);
    cumulative.push(0.0);
    let mut acc = 0.0;
    for v in x {
        acc += v * v;
        cumulative.push(acc);
    }

    (0..n)
        .map(|i| {
            let start = i.saturating_sub(left);
            let end = (i + right + 1).min(n);
            let sum = (cumulative[end] - cumulative[start]).max(0.0);
            (sum / win as f64).sqrt()
        })
        .collect()
}

/// Band-limit, rectify and smooth a raw EMG trace into its activation envelope.
pub fn make_envelope(x: &[f64], fs: f64, config: &EnvelopeConfig) -> Result<Vec<f64>> {
    let mean = nan_mean(x);
    let centered: Vec<f64> = x.iter().map(|v| v - mean).collect();

    let filtered = bandpass_filter(
        &centered,
        fs,
        config.highpass_hz,
        config.lowpass_hz,
        config.order,
    )?;
    let rectified: Vec<f64> = filtered.iter().map(|v| v.abs()).collect();

    let win = (fs * config.rms_ms / 1000.0).round_ties_even().max(0.0) as usize;
    trace!("RMS window: {} samples", win);
    Ok(moving_rms(&rectified, win))
}

/// Mean over the finite values, NaN when there are none.
pub fn nan_mean(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Median ignoring NaN, averaging the two middle values for even counts.
pub fn nan_median(values: &[f64]) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Median absolute deviation from the median.
pub fn mad(values: &[f64]) -> f64 {
    let med = nan_median(values);
    let deviations: Vec<f64> = values.iter().map(|v| (v - med).abs()).collect();
    nan_median(&deviations)
}

pub fn nan_max(values: &[f64]) -> f64 {
    values
        .iter()
        .filter(|v| !v.is_nan())
        .fold(f64::NAN, |acc, &v| if acc.is_nan() || v > acc { v } else { acc })
}
