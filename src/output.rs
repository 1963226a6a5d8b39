use crate::config::AnalysisParams;
use crate::{AnalysisResult, AnalysisStats};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Per-channel record of the summary JSON.
#[derive(Debug, Serialize)]
pub struct ChannelSummary {
    pub name: String,
    pub fs: f64,
    pub k_mad: f64,
    pub threshold: f64,
    pub threshold_pct_of_max: f64,
    pub stats: AnalysisStats,
    pub params: AnalysisParams,
    pub signal_meta: BTreeMap<String, String>,
    pub analyzed_at: DateTime<Utc>,
}

impl ChannelSummary {
    pub fn new(result: &AnalysisResult, params: &AnalysisParams) -> Self {
        Self {
            name: result.name.clone(),
            fs: result.fs,
            k_mad: result.k_mad,
            threshold: result.threshold,
            threshold_pct_of_max: result.threshold_pct_of_max(),
            stats: result.stats,
            params: params.clone(),
            signal_meta: result.meta.clone(),
            analyzed_at: Utc::now(),
        }
    }
}

/// Resolve `{stem}_{suffix}.{ext}` next to `base_path`, creating the directory.
fn output_path(base_path: &str, suffix: &str, default_ext: &str) -> Result<PathBuf> {
    let path = Path::new(base_path);
    let dir = path.parent().unwrap_or(Path::new("."));
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("results");
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or(default_ext);

    Ok(dir.join(format!("{}_{}.{}", stem, suffix, ext)))
}

/// Channel names come from file metadata; keep them filesystem friendly.
fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn fmt_value(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else {
        v.to_string()
    }
}

/// Heel strikes as `hs_index, No, time_s` (both counters 1-based).
pub fn write_hs_csv(base_path: &str, result: &AnalysisResult, t: &[f64]) -> Result<PathBuf> {
    let full_path = output_path(base_path, &format!("{}_hs", file_safe(&result.name)), "csv")?;
    info!("Writing heel strikes to {}", full_path.display());

    let mut writer = csv::Writer::from_path(&full_path)?;
    writer.write_record(["hs_index", "No", "time_s"])?;
    for (n, (idx, time)) in result.hs_times(t).into_iter().enumerate() {
        writer.write_record(&[
            (n + 1).to_string(),
            (idx + 1).to_string(),
            fmt_value(time),
        ])?;
    }
    writer.flush()?;
    Ok(full_path)
}

/// Cycle table: one row per grid point, one column per cycle, then mean and SD.
pub fn write_cycles_csv(base_path: &str, result: &AnalysisResult) -> Result<PathBuf> {
    let full_path = output_path(
        base_path,
        &format!("{}_cycles", file_safe(&result.name)),
        "csv",
    )?;
    info!("Writing normalized cycles to {}", full_path.display());

    let (mean, sd) = result.mean_profile();
    let n_cycles = result.cycles.nrows();

    let mut writer = csv::Writer::from_path(&full_path)?;
    let mut header = vec!["cycle_pct".to_string()];
    header.extend((1..=n_cycles).map(|c| format!("cycle_{}", c)));
    header.push("mean".to_string());
    header.push("sd".to_string());
    writer.write_record(&header)?;

    for (j, pct) in result.grid.iter().enumerate() {
        let mut record = vec![fmt_value(*pct)];
        record.extend(result.cycles.column(j).iter().map(|v| fmt_value(*v)));
        record.push(fmt_value(mean[j]));
        record.push(fmt_value(sd[j]));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(full_path)
}

pub fn write_summary_json(base_path: &str, channels: &[ChannelSummary]) -> Result<PathBuf> {
    let full_path = output_path(base_path, "summary", "json")?;
    let full_path = full_path.with_extension("json");
    info!("Writing summary to {}", full_path.display());

    let file = std::fs::File::create(&full_path)
        .with_context(|| format!("Failed to create {}", full_path.display()))?;
    serde_json::to_writer_pretty(file, channels)?;
    Ok(full_path)
}
