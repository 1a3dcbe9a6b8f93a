//! End-of-run metrics export.
//!
//! One summary CSV per run: output stats (min/max/avg for voltage, current,
//! duty), loop jitter, and deadline-miss counts. The per-tick trace is
//! written live by `TelemetryRecorder`; this file is the aggregate view.

use std::fs::{create_dir_all, write};
use std::path::Path;

use log::{error, info};

use crate::utils::telemetry::{SharedMetrics, calculate_stats, calculate_stats_u64};

/// Writes the run summary under `out_dir`. Best effort: failures are logged,
/// never propagated into shutdown.
pub fn run_exports(metrics: SharedMetrics, out_dir: &Path) {
    if let Err(e) = create_dir_all(out_dir) {
        error!("failed to create export directory {:?}: {}", out_dir, e);
        return;
    }

    let m = match metrics.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    let mut csv_content = String::from("metric,value,description\n");

    csv_content.push_str(&format!(
        "total_ticks,{},Control ticks executed\n",
        m.total_ticks
    ));
    csv_content.push_str(&format!(
        "deadline_misses,{},Total deadline miss events\n",
        m.deadline_miss
    ));
    csv_content.push_str(&format!(
        "sampler_misses,{},Sampling loop scheduling misses\n",
        m.miss_sampler
    ));
    csv_content.push_str(&format!(
        "poller_misses,{},Relay poller scheduling misses\n",
        m.miss_poller
    ));
    csv_content.push_str(&format!(
        "cc_transitions,{},CC/CV mode changes\n",
        m.cc_transitions
    ));

    if let Some(jitter) = calculate_stats_u64(&m.jitter_us) {
        csv_content.push_str(&format!("jitter_min_us,{:.2},Minimum period jitter\n", jitter.min));
        csv_content.push_str(&format!("jitter_max_us,{:.2},Maximum period jitter\n", jitter.max));
        csv_content.push_str(&format!("jitter_avg_us,{:.2},Average period jitter\n", jitter.mean));
    }

    if let Some(voltage) = calculate_stats(&m.voltage_mv) {
        csv_content.push_str(&format!("voltage_min_mv,{:.1},Minimum output voltage\n", voltage.min));
        csv_content.push_str(&format!("voltage_max_mv,{:.1},Maximum output voltage\n", voltage.max));
        csv_content.push_str(&format!("voltage_avg_mv,{:.1},Average output voltage\n", voltage.mean));
    }

    if let Some(current) = calculate_stats(&m.current_ma) {
        csv_content.push_str(&format!("current_min_ma,{:.1},Minimum output current\n", current.min));
        csv_content.push_str(&format!("current_max_ma,{:.1},Maximum output current\n", current.max));
        csv_content.push_str(&format!("current_avg_ma,{:.1},Average output current\n", current.mean));
    }

    if let Some(duty) = calculate_stats(&m.duty) {
        csv_content.push_str(&format!("duty_min,{:.1},Minimum PWM duty\n", duty.min));
        csv_content.push_str(&format!("duty_max,{:.1},Maximum PWM duty\n", duty.max));
        csv_content.push_str(&format!("duty_avg,{:.1},Average PWM duty\n", duty.mean));
    }

    let summary_path = out_dir.join("run_summary.csv");
    match write(&summary_path, csv_content) {
        Ok(_) => info!("summary exported to {:?}", summary_path),
        Err(e) => error!("failed to export summary: {}", e),
    }
}
