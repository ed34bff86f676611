//! Canonical metric schema shared by every adapter and the analytical model.
//!
//! Profiler backends and the array-characterization engine each have their own
//! raw output shapes; the adapters normalize all of them into the records
//! defined here. Absent workload keys deserialize to zero, never to an error.

use serde::{Deserialize, Serialize};

/// Backend-independent workload record extracted from a profiler run.
///
/// `total_hits`/`total_misses` stay optional because some backends only
/// report per-access-kind subtotals; the model sums those when the explicit
/// totals are absent.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct WorkloadMetrics {
    pub total_reads: f64,
    pub total_writes: f64,
    pub total_hits: Option<f64>,
    pub total_misses: Option<f64>,
    pub load_hits: f64,
    pub store_hits: f64,
    pub load_misses: f64,
    pub store_misses: f64,
    /// Elapsed execution time in seconds.
    pub time_elapsed: f64,
    /// Working-set size in bytes.
    pub workingset_size: f64,
    pub total_memory_refs: f64,
}

/// Payload of a canonical pattern file: either one workload record or one
/// record per thread/core (the cycle-accurate backend emits the latter).
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(untagged)]
pub enum PatternData {
    Many(Vec<WorkloadMetrics>),
    One(WorkloadMetrics),
}

impl PatternData {
    pub fn into_records(self) -> Vec<WorkloadMetrics> {
        match self {
            PatternData::Many(v) => v,
            PatternData::One(m) => vec![m],
        }
    }
}

/// Canonical technology record from one array-characterization run.
///
/// Two raw shapes exist upstream: a cache-specific shape with hit/miss/write
/// breakdowns, and a generic array shape with read/write only. Both normalize
/// here, with the cache-only keys left `None` for the generic shape. All
/// energies are in nJ after ingestion (sub-array and generic-shape energies
/// arrive in pJ and are converted by the adapter).
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct TechnologyMetrics {
    pub cache_hit_latency_ns: Option<f64>,
    pub cache_miss_latency_ns: Option<f64>,
    pub cache_write_latency_ns: Option<f64>,
    pub cache_hit_energy_nj: Option<f64>,
    pub cache_miss_energy_nj: Option<f64>,
    pub cache_write_energy_nj: Option<f64>,
    pub leakage_power_mw: Option<f64>,
    pub read_latency_ns: Option<f64>,
    pub read_energy_nj: Option<f64>,
    pub write_latency_ns: Option<f64>,
    pub write_energy_nj: Option<f64>,
    pub total_area_mm2: Option<f64>,
    pub data_array: Option<SubArrayMetrics>,
    pub tag_array: Option<SubArrayMetrics>,
}

/// Per-sub-array (data/tag) breakdown present only in the cache shape.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct SubArrayMetrics {
    pub read_latency_ns: f64,
    pub read_energy_nj: f64,
    pub write_energy_nj: Option<f64>,
    pub leakage_power_mw: f64,
}

/// Cost breakdown for one (benchmark, design point) pair. Derived by the
/// analytical model, never mutated after creation.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct EvaluationResult {
    pub total_hit_latency_ms: f64,
    pub total_miss_latency_ms: f64,
    pub total_write_latency_ms: f64,
    pub total_latency_ms: f64,
    pub total_hit_energy_mj: f64,
    pub total_miss_energy_mj: f64,
    pub total_write_energy_mj: f64,
    pub total_energy_mj: f64,
    pub total_hit_power_mw: f64,
    pub total_miss_power_mw: f64,
    pub total_write_power_mw: f64,
    pub total_power_mw: f64,
}
