use crate::config::{ms_to_samples, ThresholdGrid};
use crate::error::{EmgError, Result};
use crate::preprocessing::{mad, nan_median};
use log::{debug, info};
use serde::Serialize;

/// Knobs of the burst-onset heel-strike search.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub min_burst_ms: f64,
    pub min_gap_ms: f64,
    pub offset_ms: f64,
    pub expected_count: Option<usize>,
    pub k_grid: ThresholdGrid,
    pub plausible_step_s: (f64, f64),
    pub target_step_s: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_burst_ms: 30.0,
            min_gap_ms: 300.0,
            offset_ms: 0.0,
            expected_count: None,
            k_grid: ThresholdGrid::default(),
            plausible_step_s: (0.35, 1.6),
            target_step_s: 0.7,
        }
    }
}

/// Interval statistics of a heel-strike sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectionStats {
    pub n_hs: usize,
    pub median_step_s: f64,
    pub cv_step: f64,
    pub bad_interval_ratio: f64,
}

/// Implausibility score of one candidate, split into its terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateScore {
    pub k: f64,
    pub threshold: f64,
    pub stats: DetectionStats,
    /// Score without the expected-count term.
    pub cadence_penalty: f64,
    /// `0.8 * |n - expected|`, zero when no count is expected.
    pub count_penalty: f64,
}

impl CandidateScore {
    pub fn total(&self) -> f64 {
        self.cadence_penalty + self.count_penalty
    }
}

#[derive(Debug, Clone)]
pub struct Detection {
    pub k: f64,
    pub threshold: f64,
    pub hs_idx: Vec<usize>,
    pub stats: DetectionStats,
    /// Every candidate that produced at least two events, in scan order.
    pub candidates: Vec<CandidateScore>,
}

/// Maximal runs of `true` as half-open `[start, end)` intervals.
pub fn true_runs(mask: &[bool]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut start = None;
    for (i, &above) in mask.iter().enumerate() {
        match (above, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                runs.push((s, i));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push((s, mask.len()));
    }
    runs
}

/// Greedy left-to-right merge over ascending onsets: an onset survives only if
/// it lies at least `min_gap` samples after the last surviving onset.
pub fn merge_onsets(onsets: &[usize], min_gap: usize) -> Vec<usize> {
    let mut merged: Vec<usize> = Vec::with_capacity(onsets.len());
    for &idx in onsets {
        match merged.last() {
            Some(&last) if idx.saturating_sub(last) < min_gap => {}
            _ => merged.push(idx),
        }
    }
    merged
}

/// Candidate heel strikes for a fixed threshold, before scoring.
fn onsets_above(
    envelope: &[f64],
    threshold: f64,
    min_burst: usize,
    min_gap: usize,
    offset: i64,
) -> Vec<usize> {
    let mask: Vec<bool> = envelope.iter().map(|&v| v > threshold).collect();
    let mut onsets: Vec<usize> = true_runs(&mask)
        .into_iter()
        .filter(|(s, e)| e - s >= min_burst)
        .map(|(s, _)| s)
        .collect();
    onsets.sort_unstable();

    let len = envelope.len() as i64;
    merge_onsets(&onsets, min_gap)
        .into_iter()
        .map(|idx| idx as i64 + offset)
        .filter(|&idx| idx >= 0 && idx < len)
        .map(|idx| idx as usize)
        .collect()
}

/// Step-interval statistics for a heel-strike sequence (needs at least 2 events).
pub fn interval_stats(hs_idx: &[usize], fs: f64, plausible_step_s: (f64, f64)) -> DetectionStats {
    let intervals: Vec<f64> = hs_idx
        .windows(2)
        .map(|w| (w[1] - w[0]) as f64 / fs)
        .collect();
    let n = intervals.len() as f64;

    let mean = intervals.iter().sum::<f64>() / n;
    let variance = intervals.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let (lo, hi) = plausible_step_s;
    let bad = intervals.iter().filter(|&&v| v < lo || v > hi).count() as f64 / n;

    DetectionStats {
        n_hs: hs_idx.len(),
        median_step_s: nan_median(&intervals),
        cv_step: variance.sqrt() / (mean + 1e-12),
        bad_interval_ratio: bad,
    }
}

/// Score a heel-strike sequence; lower is more plausible walking.
pub fn score_stats(
    stats: &DetectionStats,
    target_step_s: f64,
    expected_count: Option<usize>,
) -> (f64, f64) {
    let cadence = 5.0 * stats.bad_interval_ratio
        + 2.0 * stats.cv_step
        + 0.5 * (stats.median_step_s - target_step_s).abs();
    let count = expected_count
        .map(|expected| 0.8 * (stats.n_hs as f64 - expected as f64).abs())
        .unwrap_or(0.0);
    (cadence, count)
}

/// Search the threshold scale `k` for the most plausible burst-onset heel strikes.
///
/// The threshold is `median + k * MAD` of the envelope. Candidates are scanned in
/// ascending order and only a strictly lower score replaces the current best.
pub fn detect_hs_from_bursts(envelope: &[f64], fs: f64, config: &DetectorConfig) -> Result<Detection> {
    if !fs.is_finite() || fs <= 0.0 {
        return Err(EmgError::Configuration(format!(
            "sampling rate must be positive, got {}",
            fs
        )));
    }

    let ks = config.k_grid.candidates();
    let med = nan_median(envelope);
    let m = mad(envelope);
    let min_burst = ms_to_samples(fs, config.min_burst_ms).max(0) as usize;
    let min_gap = ms_to_samples(fs, config.min_gap_ms).max(0) as usize;
    let offset = ms_to_samples(fs, config.offset_ms);

    debug!(
        "Envelope median {:.5}, MAD {:.5}; min_burst {} / min_gap {} / offset {} samples",
        med, m, min_burst, min_gap, offset
    );

    let mut candidates = Vec::new();
    let mut best: Option<(CandidateScore, Vec<usize>)> = None;

    for &k in &ks {
        let threshold = med + k * m;
        let hs = onsets_above(envelope, threshold, min_burst, min_gap, offset);
        if hs.len() < 2 {
            debug!("k={:.2}: {} events, skipped", k, hs.len());
            continue;
        }

        let stats = interval_stats(&hs, fs, config.plausible_step_s);
        let (cadence_penalty, count_penalty) =
            score_stats(&stats, config.target_step_s, config.expected_count);
        let candidate = CandidateScore {
            k,
            threshold,
            stats,
            cadence_penalty,
            count_penalty,
        };
        debug!(
            "k={:.2}: {} events, median step {:.3}s, cv {:.3}, bad {:.2}, score {:.4}",
            k,
            stats.n_hs,
            stats.median_step_s,
            stats.cv_step,
            stats.bad_interval_ratio,
            candidate.total()
        );
        candidates.push(candidate);

        let better = match &best {
            Some((current, _)) => candidate.total() < current.total(),
            None => true,
        };
        if better {
            best = Some((candidate, hs));
        }
    }

    let Some((chosen, hs_idx)) = best else {
        return Err(EmgError::DetectionFailure {
            k_min: ks.first().copied().unwrap_or(f64::NAN),
            k_max: ks.last().copied().unwrap_or(f64::NAN),
            n_candidates: ks.len(),
            median: med,
            mad: m,
            min_burst,
            min_gap,
            offset,
        });
    };

    info!(
        "Chose k={:.2} (threshold {:.5}): {} heel strikes, score {:.4}",
        chosen.k,
        chosen.threshold,
        hs_idx.len(),
        chosen.total()
    );

    Ok(Detection {
        k: chosen.k,
        threshold: chosen.threshold,
        hs_idx,
        stats: chosen.stats,
        candidates,
    })
}
