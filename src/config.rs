use crate::error::{EmgError, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Estimate heel strikes from EMG and build gait-cycle normalized %peak profiles
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// First EMG channel CSV (e.g. left leg)
    #[arg(help = "First EMG channel CSV (e.g. left leg)")]
    pub first: PathBuf,

    /// Optional second EMG channel CSV (e.g. right leg)
    #[arg(help = "Optional second EMG channel CSV (e.g. right leg)")]
    pub second: Option<PathBuf>,

    /// Sampling frequency in Hz, used when the file does not declare one
    #[arg(long, default_value = "1000.0")]
    pub fs: f64,

    /// Band-pass lower cutoff (Hz)
    #[arg(long, default_value = "50.0")]
    pub highpass: f64,

    /// Band-pass upper cutoff (Hz)
    #[arg(long, default_value = "450.0")]
    pub lowpass: f64,

    /// Butterworth filter order
    #[arg(long, default_value = "4")]
    pub filter_order: usize,

    /// RMS envelope window (ms)
    #[arg(long, default_value = "50.0")]
    pub rms_ms: f64,

    /// Minimum burst duration (ms)
    #[arg(long, default_value = "30.0")]
    pub min_burst_ms: f64,

    /// Minimum interval between heel strikes (ms), suppresses double detections
    #[arg(long, default_value = "300.0")]
    pub min_gap_ms: f64,

    /// Offset from burst onset to heel strike (ms, may be negative)
    #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
    pub hs_offset_ms: f64,

    /// Total steps seen on video for both legs (0 = unknown). Split between the two channels.
    #[arg(long, default_value = "0")]
    pub total_steps: usize,

    /// Number of points on the normalized gait cycle grid
    #[arg(long, default_value = "501")]
    pub n_points: usize,

    /// Output file prefix (e.g. /path/to/output/prefix)
    #[arg(long)]
    pub output: Option<String>,
}

/// Ascending set of threshold scale multipliers, `start..=stop` in `step` increments,
/// each rounded to two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdGrid {
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

impl Default for ThresholdGrid {
    fn default() -> Self {
        Self {
            start: 1.2,
            stop: 4.0,
            step: 0.1,
        }
    }
}

impl ThresholdGrid {
    pub fn candidates(&self) -> Vec<f64> {
        if !(self.step > 0.0) || self.stop < self.start {
            return Vec::new();
        }
        let n = ((self.stop - self.start) / self.step + 1e-9).floor() as usize + 1;
        (0..n)
            .map(|i| ((self.start + i as f64 * self.step) * 100.0).round() / 100.0)
            .collect()
    }
}

/// Everything the pipeline needs besides the signal itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisParams {
    pub highpass_hz: f64,
    pub lowpass_hz: f64,
    pub filter_order: usize,
    pub rms_ms: f64,
    pub min_burst_ms: f64,
    pub min_gap_ms: f64,
    /// Signed shift applied to every burst onset.
    pub hs_offset_ms: f64,
    pub expected_hs: Option<usize>,
    pub k_grid: ThresholdGrid,
    /// Step durations (s) outside this band count as bad intervals.
    pub plausible_step_s: (f64, f64),
    /// Moderate walking step duration the score pulls towards.
    pub target_step_s: f64,
    pub n_points: usize,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            highpass_hz: 50.0,
            lowpass_hz: 450.0,
            filter_order: 4,
            rms_ms: 50.0,
            min_burst_ms: 30.0,
            min_gap_ms: 300.0,
            hs_offset_ms: 0.0,
            expected_hs: None,
            k_grid: ThresholdGrid::default(),
            plausible_step_s: (0.35, 1.6),
            target_step_s: 0.7,
            n_points: 501,
        }
    }
}

impl From<&Args> for AnalysisParams {
    fn from(args: &Args) -> Self {
        Self {
            highpass_hz: args.highpass,
            lowpass_hz: args.lowpass,
            filter_order: args.filter_order,
            rms_ms: args.rms_ms,
            min_burst_ms: args.min_burst_ms,
            min_gap_ms: args.min_gap_ms,
            hs_offset_ms: args.hs_offset_ms,
            n_points: args.n_points,
            ..Self::default()
        }
    }
}

impl AnalysisParams {
    pub fn with_expected_hs(mut self, expected_hs: Option<usize>) -> Self {
        self.expected_hs = expected_hs;
        self
    }

    /// Check every parameter against the sampling rate it will be used with.
    pub fn validate(&self, fs: f64) -> Result<()> {
        let fail = |msg: String| Err(EmgError::Configuration(msg));

        if !fs.is_finite() || fs <= 0.0 {
            return fail(format!("sampling rate must be positive, got {}", fs));
        }
        let nyquist = fs / 2.0;
        if !(self.highpass_hz > 0.0
            && self.highpass_hz < self.lowpass_hz
            && self.lowpass_hz < nyquist)
        {
            return fail(format!(
                "cutoffs must satisfy 0 < highpass ({}) < lowpass ({}) < fs/2 ({})",
                self.highpass_hz, self.lowpass_hz, nyquist
            ));
        }
        if self.filter_order == 0 {
            return fail("filter order must be at least 1".to_string());
        }
        if !(self.rms_ms.is_finite() && self.rms_ms > 0.0) {
            return fail(format!("RMS window must be > 0 ms, got {}", self.rms_ms));
        }
        if !(self.min_burst_ms.is_finite() && self.min_burst_ms >= 0.0) {
            return fail(format!(
                "minimum burst duration must be >= 0 ms, got {}",
                self.min_burst_ms
            ));
        }
        if !(self.min_gap_ms.is_finite() && self.min_gap_ms > 0.0) {
            return fail(format!(
                "minimum HS gap must be > 0 ms, got {}",
                self.min_gap_ms
            ));
        }
        if !self.hs_offset_ms.is_finite() {
            return fail(format!("HS offset must be finite, got {}", self.hs_offset_ms));
        }
        let (lo, hi) = self.plausible_step_s;
        if !(lo >= 0.0 && lo < hi) {
            return fail(format!("plausible step band ({}, {}) is empty", lo, hi));
        }
        if !(self.target_step_s.is_finite() && self.target_step_s > 0.0) {
            return fail(format!(
                "target step duration must be a positive number of seconds, got {}",
                self.target_step_s
            ));
        }
        if self.k_grid.candidates().is_empty() {
            return fail(format!("threshold grid {:?} has no candidates", self.k_grid));
        }
        if self.n_points < 2 {
            return fail(format!(
                "cycle grid needs at least 2 points, got {}",
                self.n_points
            ));
        }
        Ok(())
    }
}

/// Milliseconds to samples, rounding half to even.
pub fn ms_to_samples(fs: f64, ms: f64) -> i64 {
    (fs * ms / 1000.0).round_ties_even() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_grid_matches_documented_range() {
        let ks = ThresholdGrid::default().candidates();
        assert_eq!(ks.len(), 29);
        assert_eq!(ks[0], 1.2);
        assert_eq!(ks[1], 1.3);
        assert_eq!(*ks.last().unwrap(), 4.0);
        assert!(ks.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_defaults_validate() {
        assert!(AnalysisParams::default().validate(1000.0).is_ok());
    }

    #[test]
    fn test_lowpass_at_nyquist_rejected() {
        let params = AnalysisParams::default();
        // 450 Hz is not below Nyquist for 900 Hz sampling
        let err = params.validate(900.0).unwrap_err();
        assert!(matches!(err, EmgError::Configuration(_)));
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let cases: Vec<Box<dyn Fn(&mut AnalysisParams)>> = vec![
            Box::new(|p: &mut AnalysisParams| p.highpass_hz = 0.0),
            Box::new(|p: &mut AnalysisParams| p.highpass_hz = 500.0),
            Box::new(|p: &mut AnalysisParams| p.rms_ms = 0.0),
            Box::new(|p: &mut AnalysisParams| p.min_burst_ms = -1.0),
            Box::new(|p: &mut AnalysisParams| p.min_gap_ms = 0.0),
            Box::new(|p: &mut AnalysisParams| p.n_points = 1),
            Box::new(|p: &mut AnalysisParams| p.filter_order = 0),
            Box::new(|p: &mut AnalysisParams| p.k_grid.step = 0.0),
            Box::new(|p: &mut AnalysisParams| p.target_step_s = f64::NAN),
            Box::new(|p: &mut AnalysisParams| p.target_step_s = f64::INFINITY),
            Box::new(|p: &mut AnalysisParams| p.target_step_s = 0.0),
        ];
        for mutate in cases {
            let mut params = AnalysisParams::default();
            mutate(&mut params);
            assert!(params.validate(1000.0).is_err(), "{:?}", params);
        }
    }

    #[test]
    fn test_negative_offset_is_allowed() {
        let params = AnalysisParams {
            hs_offset_ms: -40.0,
            ..AnalysisParams::default()
        };
        assert!(params.validate(1000.0).is_ok());
    }

    #[test]
    fn test_ms_to_samples_rounds_half_to_even() {
        assert_eq!(ms_to_samples(1000.0, 30.0), 30);
        assert_eq!(ms_to_samples(100.0, 25.0), 2);
        assert_eq!(ms_to_samples(100.0, 35.0), 4);
        assert_eq!(ms_to_samples(1000.0, -20.0), -20);
    }

    #[test]
    fn test_args_map_onto_params() {
        let args = Args::parse_from([
            "emg-gait",
            "left.csv",
            "right.csv",
            "--rms-ms",
            "25",
            "--hs-offset-ms",
            "-15",
        ]);
        let params = AnalysisParams::from(&args);
        assert_eq!(params.rms_ms, 25.0);
        assert_eq!(params.hs_offset_ms, -15.0);
        assert_eq!(params.n_points, 501);
        assert!(params.expected_hs.is_none());
    }
}
