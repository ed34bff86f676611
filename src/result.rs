//! Append-only CSV results sink.
//!
//! One row per evaluated (config, benchmark) pair, accumulated across runs
//! into one file per evaluation campaign. The header is fixed and written
//! exactly once, when the file is first created; fields absent from a given
//! record render as 0, never as a blank.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use eyre::{Context, Result};

use crate::metrics::{EvaluationResult, TechnologyMetrics, WorkloadMetrics};
use crate::model;
use crate::settings::{AppsSettings, SystemSettings};

pub const HEADER: &[&str] = &[
    "Config Name",
    "Profiler",
    "Cache Level",
    "Design Target",
    "Capacity (KB)",
    "Word Width (bits)",
    "Optimization Target",
    "Total Reads",
    "Total Writes",
    "Total Hits",
    "Total Misses",
    "Total Hit Latency (ms)",
    "Total Miss Latency (ms)",
    "Total Write Latency (ms)",
    "Total Latency (ms)",
    "Total Hit Energy (mJ)",
    "Total Miss Energy (mJ)",
    "Total Write Energy (mJ)",
    "Total Energy (mJ)",
    "Total Hit Power (mW)",
    "Total Miss Power (mW)",
    "Total Write Power (mW)",
    "Total Power (mW)",
    "Cache Hit Latency (ns)",
    "Cache Miss Latency (ns)",
    "Cache Write Latency (ns)",
    "Cache Hit Energy (nJ)",
    "Cache Miss Energy (nJ)",
    "Cache Write Energy (nJ)",
    "Leakage Power (mW)",
    "Total Area (mm^2)",
];

/// Flattened join of configuration identity, workload counts, model output
/// and technology totals. Created once per evaluated benchmark and never
/// updated in place.
#[derive(Debug, Clone)]
pub struct ResultRow {
    pub config_name: String,
    pub profiler: String,
    pub cache_level: String,
    pub design_target: String,
    pub capacity: f64,
    pub word_width: u32,
    pub optimization_target: String,
    pub total_reads: f64,
    pub total_writes: f64,
    pub total_hits: f64,
    pub total_misses: f64,
    pub model: EvaluationResult,
    pub cache_hit_latency_ns: f64,
    pub cache_miss_latency_ns: f64,
    pub cache_write_latency_ns: f64,
    pub cache_hit_energy_nj: f64,
    pub cache_miss_energy_nj: f64,
    pub cache_write_energy_nj: f64,
    pub leakage_power_mw: f64,
    pub total_area_mm2: f64,
}

impl ResultRow {
    pub fn new(
        config_name: &str,
        system: &SystemSettings,
        apps: &AppsSettings,
        workload: &WorkloadMetrics,
        tech: &TechnologyMetrics,
        model_result: &EvaluationResult,
    ) -> Self {
        ResultRow {
            config_name: config_name.to_string(),
            profiler: apps.profiler.name().to_string(),
            cache_level: apps.level.clone().unwrap_or_else(|| "N/A".into()),
            design_target: system.design_target.clone(),
            capacity: system.capacity.value,
            word_width: system.word_width,
            optimization_target: system
                .optimization_target
                .clone()
                .unwrap_or_else(|| "N/A".into()),
            total_reads: workload.total_reads,
            total_writes: workload.total_writes,
            total_hits: model::resolved_hits(workload),
            total_misses: model::resolved_misses(workload),
            model: model_result.clone(),
            cache_hit_latency_ns: tech.cache_hit_latency_ns.unwrap_or(0.0),
            cache_miss_latency_ns: tech.cache_miss_latency_ns.unwrap_or(0.0),
            cache_write_latency_ns: tech.cache_write_latency_ns.unwrap_or(0.0),
            cache_hit_energy_nj: tech.cache_hit_energy_nj.unwrap_or(0.0),
            cache_miss_energy_nj: tech.cache_miss_energy_nj.unwrap_or(0.0),
            cache_write_energy_nj: tech.cache_write_energy_nj.unwrap_or(0.0),
            leakage_power_mw: tech.leakage_power_mw.unwrap_or(0.0),
            total_area_mm2: tech.total_area_mm2.unwrap_or(0.0),
        }
    }

    fn fields(&self) -> Vec<String> {
        vec![
            escape_csv(&self.config_name),
            escape_csv(&self.profiler),
            escape_csv(&self.cache_level),
            escape_csv(&self.design_target),
            self.capacity.to_string(),
            self.word_width.to_string(),
            escape_csv(&self.optimization_target),
            self.total_reads.to_string(),
            self.total_writes.to_string(),
            self.total_hits.to_string(),
            self.total_misses.to_string(),
            self.model.total_hit_latency_ms.to_string(),
            self.model.total_miss_latency_ms.to_string(),
            self.model.total_write_latency_ms.to_string(),
            self.model.total_latency_ms.to_string(),
            self.model.total_hit_energy_mj.to_string(),
            self.model.total_miss_energy_mj.to_string(),
            self.model.total_write_energy_mj.to_string(),
            self.model.total_energy_mj.to_string(),
            self.model.total_hit_power_mw.to_string(),
            self.model.total_miss_power_mw.to_string(),
            self.model.total_write_power_mw.to_string(),
            self.model.total_power_mw.to_string(),
            self.cache_hit_latency_ns.to_string(),
            self.cache_miss_latency_ns.to_string(),
            self.cache_write_latency_ns.to_string(),
            self.cache_hit_energy_nj.to_string(),
            self.cache_miss_energy_nj.to_string(),
            self.cache_write_energy_nj.to_string(),
            self.leakage_power_mw.to_string(),
            self.total_area_mm2.to_string(),
        ]
    }
}

/// Append one row to the campaign's result table, writing the header first
/// when the file does not exist yet.
pub fn append_row(path: &Path, row: &ResultRow) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let exists = path.exists();
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .wrap_err_with(|| format!("cannot open result table {}", path.display()))?;
    if !exists {
        writeln!(file, "{}", HEADER.join(","))?;
    }
    writeln!(file, "{}", row.fields().join(","))?;
    Ok(())
}

/// Wrap a value in quotes when it would break the comma-delimited layout.
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
