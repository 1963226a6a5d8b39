use anyhow::Context;
use clap::Parser;
use emg_gait::analysis::{analyze_signal, split_expected_steps};
use emg_gait::config::{AnalysisParams, Args};
use emg_gait::data_loading::load_signal;
use emg_gait::output::{write_cycles_csv, write_hs_csv, write_summary_json, ChannelSummary};
use emg_gait::{AnalysisResult, Signal};
use log::{debug, warn};
use std::path::Path;

fn process_channel(
    path: &Path,
    args: &Args,
    expected_hs: Option<usize>,
) -> anyhow::Result<(Signal, AnalysisResult, AnalysisParams)> {
    let signal = load_signal(path, args.fs)?;
    let params = AnalysisParams::from(args).with_expected_hs(expected_hs);
    debug!("{}: {:?}", signal.name(), params);
    let result = analyze_signal(&signal, &params)
        .with_context(|| format!("Analysis of {} failed", path.display()))?;
    Ok((signal, result, params))
}

fn print_summary(results: &[(Signal, AnalysisResult, AnalysisParams)]) {
    println!("\nSummary:");
    println!(
        "{:<20} {:>6} {:>6} {:>8} {:>8} {:>8} {:>8} {:>10}",
        "signal", "n_hs", "cycles", "k_mad", "med_s", "cv", "bad", "mean_pct"
    );
    for (_, result, _) in results {
        let stats = &result.stats;
        println!(
            "{:<20} {:>6} {:>6} {:>8.2} {:>8.3} {:>8.3} {:>8.2} {:>10.1}",
            result.name,
            stats.detection.n_hs,
            stats.n_cycles,
            result.k_mad,
            stats.detection.median_step_s,
            stats.detection.cv_step,
            stats.detection.bad_interval_ratio,
            stats.mean_of_mean_pct
        );
    }

    for (signal, result, _) in results {
        println!("\nEstimated heel strikes for {}:", result.name);
        println!("{:>8} {:>10} {:>10}", "hs_index", "No", "time_s");
        for (n, (idx, time)) in result.hs_times(signal.t()).into_iter().enumerate() {
            println!("{:>8} {:>10} {:>10.3}", n + 1, idx + 1, time);
        }
        if result.cycles.nrows() == 0 {
            warn!("{}: no valid gait cycles could be normalized", result.name);
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init();

    let args = Args::parse();

    let results = match &args.second {
        Some(second) => {
            let (first_expected, second_expected) = split_expected_steps(args.total_steps);
            // Channels share nothing, so run them side by side
            let (first, second) = rayon::join(
                || process_channel(&args.first, &args, first_expected),
                || process_channel(second, &args, second_expected),
            );
            vec![first?, second?]
        }
        None => {
            let expected = (args.total_steps > 0).then_some(args.total_steps);
            vec![process_channel(&args.first, &args, expected)?]
        }
    };

    print_summary(&results);

    if let Some(prefix) = &args.output {
        let mut summaries = Vec::new();
        for (signal, result, params) in &results {
            let hs_path = write_hs_csv(prefix, result, signal.t())?;
            let cycles_path = write_cycles_csv(prefix, result)?;
            println!("Saved: {} / {}", hs_path.display(), cycles_path.display());
            summaries.push(ChannelSummary::new(result, params));
        }
        let summary_path = write_summary_json(prefix, &summaries)?;
        println!("Saved: {}", summary_path.display());
    }

    println!(
        "\nNote: heel strikes are taken from muscle burst onsets and can lag or lead the \
         true contact depending on muscle, gait and electrode placement. Use --hs-offset-ms to correct."
    );

    Ok(())
}
