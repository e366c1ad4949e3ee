//! CSV export of per-task metrics: one summary row per task.

use serde::Serialize;
use std::path::Path;

use crate::utils::metrics::{self, SharedMetrics};

#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    task: &'a str,
    cycles: u64,
    publishes: u64,
    idle: u64,
    timeouts: u64,
    dt_rejections: u64,
    numeric_rejections: u64,
    mean_dt_ms: f64,
    max_dt_ms: f64,
}

/// Writes the current counters of every task to `path`, replacing it.
pub fn export_summary_csv(metrics: &SharedMetrics, path: &Path) -> Result<usize, csv::Error> {
    let m = metrics::lock(metrics);
    let mut writer = csv::Writer::from_path(path)?;

    for (task, c) in m.tasks.iter() {
        writer.serialize(SummaryRow {
            task,
            cycles: c.cycles,
            publishes: c.publishes,
            idle: c.idle,
            timeouts: c.timeouts,
            dt_rejections: c.dt_rejections,
            numeric_rejections: c.numeric_rejections,
            mean_dt_ms: c.mean_dt().unwrap_or(0.0) * 1e3,
            max_dt_ms: c.max_dt().unwrap_or(0.0) * 1e3,
        })?;
    }
    writer.flush()?;
    Ok(m.tasks.len())
}
