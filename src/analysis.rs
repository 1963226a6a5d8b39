use crate::config::AnalysisParams;
use crate::error::Result;
use crate::hs_detection::{detect_hs_from_bursts, DetectorConfig};
use crate::normalization::{normalize_cycles, percent_peak, row_means};
use crate::preprocessing::{make_envelope, nan_mean, EnvelopeConfig};
use crate::{AnalysisResult, AnalysisStats, Signal};
use log::info;

/// Split a step count observed for both legs between two channels.
pub fn split_expected_steps(total: usize) -> (Option<usize>, Option<usize>) {
    if total == 0 {
        return (None, None);
    }
    let first = total / 2;
    (Some(first), Some(total - first))
}

/// Run envelope extraction, heel-strike detection, %peak scaling and cycle
/// normalization on one channel.
pub fn analyze_signal(signal: &Signal, params: &AnalysisParams) -> Result<AnalysisResult> {
    params.validate(signal.fs())?;

    let envelope = make_envelope(
        signal.x(),
        signal.fs(),
        &EnvelopeConfig {
            highpass_hz: params.highpass_hz,
            lowpass_hz: params.lowpass_hz,
            rms_ms: params.rms_ms,
            order: params.filter_order,
        },
    )?;

    let detection = detect_hs_from_bursts(
        &envelope,
        signal.fs(),
        &DetectorConfig {
            min_burst_ms: params.min_burst_ms,
            min_gap_ms: params.min_gap_ms,
            offset_ms: params.hs_offset_ms,
            expected_count: params.expected_hs,
            k_grid: params.k_grid,
            plausible_step_s: params.plausible_step_s,
            target_step_s: params.target_step_s,
        },
    )?;

    let envelope_pct = percent_peak(&envelope, Some(detection.hs_idx.as_slice()));
    let (grid, cycles) =
        normalize_cycles(&envelope_pct, &detection.hs_idx, signal.t(), params.n_points);

    let mean_of_mean_pct = if cycles.nrows() > 0 {
        nan_mean(&row_means(&cycles))
    } else {
        f64::NAN
    };
    let stats = AnalysisStats {
        detection: detection.stats,
        n_cycles: detection.hs_idx.len().saturating_sub(1),
        mean_of_mean_pct,
    };

    info!(
        "{}: {} heel strikes, {} normalized cycles, k={:.2}",
        signal.name(),
        detection.hs_idx.len(),
        cycles.nrows(),
        detection.k
    );

    Ok(AnalysisResult {
        name: signal.name().to_string(),
        fs: signal.fs(),
        k_mad: detection.k,
        threshold: detection.threshold,
        envelope,
        envelope_pct,
        hs_idx: detection.hs_idx,
        grid,
        cycles,
        stats,
        meta: signal.meta().clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmgError;

    #[test]
    fn test_split_expected_steps() {
        assert_eq!(split_expected_steps(0), (None, None));
        assert_eq!(split_expected_steps(25), (Some(12), Some(13)));
        assert_eq!(split_expected_steps(24), (Some(12), Some(12)));
        assert_eq!(split_expected_steps(1), (Some(0), Some(1)));
    }

    #[test]
    fn test_invalid_params_fail_before_processing() {
        let signal = Signal::from_samples("ch", 800.0, vec![0.0; 4000]).unwrap();
        // 450 Hz lowpass is above Nyquist at 800 Hz
        let err = analyze_signal(&signal, &AnalysisParams::default()).unwrap_err();
        assert!(matches!(err, EmgError::Configuration(_)));
    }

    #[test]
    fn test_flat_signal_is_detection_failure() {
        let signal = Signal::from_samples("flat", 1000.0, vec![0.0; 5000]).unwrap();
        let err = analyze_signal(&signal, &AnalysisParams::default()).unwrap_err();
        assert!(matches!(err, EmgError::DetectionFailure { .. }));
    }

    #[test]
    fn test_signal_shape_validated() {
        assert!(Signal::new("a", 1000.0, vec![0.0; 3], vec![0.0; 4], Default::default()).is_err());
        assert!(Signal::from_samples("a", 0.0, vec![0.0; 4]).is_err());
        assert!(Signal::from_samples("a", 1000.0, Vec::new()).is_err());
        let ok = Signal::from_samples("a", 500.0, vec![0.0; 4]).unwrap();
        assert_eq!(ok.t(), &[0.0, 0.002, 0.004, 0.006]);
    }
}
