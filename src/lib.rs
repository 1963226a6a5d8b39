pub mod analysis;
pub mod config;
pub mod data_loading;
pub mod error;
pub mod hs_detection;
pub mod normalization;
pub mod output;
pub mod preprocessing;

#[cfg(test)]
mod integration_tests;

use error::{EmgError, Result};
use hs_detection::DetectionStats;
use ndarray::{Array1, Array2};
use serde::Serialize;
use std::collections::BTreeMap;

/// One fully buffered EMG channel.
#[derive(Debug, Clone)]
pub struct Signal {
    name: String,
    fs: f64,
    t: Vec<f64>,
    x: Vec<f64>,
    meta: BTreeMap<String, String>,
}

impl Signal {
    pub fn new(
        name: impl Into<String>,
        fs: f64,
        t: Vec<f64>,
        x: Vec<f64>,
        meta: BTreeMap<String, String>,
    ) -> Result<Self> {
        if !fs.is_finite() || fs <= 0.0 {
            return Err(EmgError::Configuration(format!(
                "sampling rate must be positive, got {}",
                fs
            )));
        }
        if t.len() != x.len() {
            return Err(EmgError::Configuration(format!(
                "time vector has {} samples but signal has {}",
                t.len(),
                x.len()
            )));
        }
        if x.is_empty() {
            return Err(EmgError::Configuration("signal is empty".to_string()));
        }
        Ok(Self {
            name: name.into(),
            fs,
            t,
            x,
            meta,
        })
    }

    /// Signal whose time axis is `i / fs`.
    pub fn from_samples(name: impl Into<String>, fs: f64, x: Vec<f64>) -> Result<Self> {
        let t = (0..x.len()).map(|i| i as f64 / fs).collect();
        Self::new(name, fs, t, x, BTreeMap::new())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fs(&self) -> f64 {
        self.fs
    }

    pub fn t(&self) -> &[f64] {
        &self.t
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn meta(&self) -> &BTreeMap<String, String> {
        &self.meta
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct AnalysisStats {
    #[serde(flatten)]
    pub detection: DetectionStats,
    pub n_cycles: usize,
    /// Mean over cycles of each cycle's mean %peak; NaN without cycles.
    pub mean_of_mean_pct: f64,
}

/// Everything one channel analysis produces.
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub name: String,
    pub fs: f64,
    pub k_mad: f64,
    pub threshold: f64,
    pub envelope: Vec<f64>,
    pub envelope_pct: Vec<f64>,
    pub hs_idx: Vec<usize>,
    pub grid: Vec<f64>,
    /// One row per normalized gait cycle, one column per grid point.
    pub cycles: Array2<f64>,
    pub stats: AnalysisStats,
    pub meta: BTreeMap<String, String>,
}

impl AnalysisResult {
    /// Heel strikes as `(sample index, time)` pairs on the given time axis.
    pub fn hs_times(&self, t: &[f64]) -> Vec<(usize, f64)> {
        self.hs_idx
            .iter()
            .filter_map(|&i| t.get(i).map(|&time| (i, time)))
            .collect()
    }

    /// Mean cycle profile and its standard deviation per grid point.
    pub fn mean_profile(&self) -> (Array1<f64>, Array1<f64>) {
        normalization::column_mean_sd(&self.cycles)
    }

    /// Threshold as a percentage of the global envelope maximum, NaN when the
    /// envelope has no positive peak.
    pub fn threshold_pct_of_max(&self) -> f64 {
        let peak = preprocessing::nan_max(&self.envelope);
        if peak > 0.0 {
            self.threshold / peak * 100.0
        } else {
            f64::NAN
        }
    }
}
