//! Analytical cost model: canonical metrics in, cost breakdown out.
//!
//! Pure function with no side effects. Only the `cache` design target is
//! evaluated; every other target yields no result.

use crate::metrics::{EvaluationResult, TechnologyMetrics, WorkloadMetrics};

/// Per-access latency scale: access count x latency (ns) -> ms.
const LATENCY_SCALE_MS: f64 = 10.0e-6;
/// Per-access energy scale: access count x energy (nJ) -> mJ.
const ENERGY_SCALE_MJ: f64 = 10.0e-6;

/// Total hits: the explicit field when the backend reported one, otherwise
/// the sum of the per-access-kind subtotals.
pub fn resolved_hits(workload: &WorkloadMetrics) -> f64 {
    workload
        .total_hits
        .unwrap_or(workload.load_hits + workload.store_hits)
}

pub fn resolved_misses(workload: &WorkloadMetrics) -> f64 {
    workload
        .total_misses
        .unwrap_or(workload.load_misses + workload.store_misses)
}

pub fn evaluate(
    design_target: &str,
    workload: &WorkloadMetrics,
    tech: &TechnologyMetrics,
) -> Option<EvaluationResult> {
    if design_target != "cache" {
        return None;
    }

    let hits = resolved_hits(workload);
    let misses = resolved_misses(workload);
    let writes = workload.total_writes;
    let time = workload.time_elapsed;

    let hit_latency = tech.cache_hit_latency_ns.unwrap_or(0.0);
    let miss_latency = tech.cache_miss_latency_ns.unwrap_or(0.0);
    let write_latency = tech.cache_write_latency_ns.unwrap_or(0.0);
    let hit_energy = tech.cache_hit_energy_nj.unwrap_or(0.0);
    let miss_energy = tech.cache_miss_energy_nj.unwrap_or(0.0);
    let write_energy = tech.cache_write_energy_nj.unwrap_or(0.0);
    let leakage_power = tech.leakage_power_mw.unwrap_or(0.0);

    let total_hit_latency_ms = hits * hit_latency * LATENCY_SCALE_MS;
    let total_miss_latency_ms = misses * miss_latency * LATENCY_SCALE_MS;
    let total_write_latency_ms = writes * write_latency * LATENCY_SCALE_MS;

    let total_hit_energy_mj = hits * hit_energy * ENERGY_SCALE_MJ;
    let total_miss_energy_mj = misses * miss_energy * ENERGY_SCALE_MJ;
    let total_write_energy_mj = writes * write_energy * ENERGY_SCALE_MJ;

    // average power over the run; zero elapsed time contributes nothing
    // instead of faulting
    let over_time = |energy_mj: f64| if time != 0.0 { energy_mj / time } else { 0.0 };
    let total_hit_power_mw = over_time(total_hit_energy_mj);
    let total_miss_power_mw = over_time(total_miss_energy_mj);
    let total_write_power_mw = over_time(total_write_energy_mj);

    Some(EvaluationResult {
        total_hit_latency_ms,
        total_miss_latency_ms,
        total_write_latency_ms,
        total_latency_ms: total_hit_latency_ms + total_miss_latency_ms + total_write_latency_ms,
        total_hit_energy_mj,
        total_miss_energy_mj,
        total_write_energy_mj,
        total_energy_mj: total_hit_energy_mj + total_miss_energy_mj + total_write_energy_mj,
        total_hit_power_mw,
        total_miss_power_mw,
        total_write_power_mw,
        total_power_mw: leakage_power
            + total_hit_power_mw
            + total_miss_power_mw
            + total_write_power_mw,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn tech() -> TechnologyMetrics {
        TechnologyMetrics {
            cache_hit_latency_ns: Some(1.0),
            cache_miss_latency_ns: Some(10.0),
            cache_write_latency_ns: Some(2.0),
            cache_hit_energy_nj: Some(0.5),
            cache_miss_energy_nj: Some(5.0),
            cache_write_energy_nj: Some(1.0),
            leakage_power_mw: Some(3.0),
            ..Default::default()
        }
    }

    fn workload() -> WorkloadMetrics {
        WorkloadMetrics {
            total_hits: Some(100.0),
            total_misses: Some(20.0),
            total_writes: 10.0,
            time_elapsed: 5.0,
            ..Default::default()
        }
    }

    fn close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-12, "{a} != {b}");
    }

    #[test]
    fn cache_cost_breakdown() {
        let result = evaluate("cache", &workload(), &tech()).unwrap();
        close(
            result.total_latency_ms,
            (100.0 * 1.0 + 20.0 * 10.0 + 10.0 * 2.0) * 10.0e-6,
        );
        close(
            result.total_energy_mj,
            (100.0 * 0.5 + 20.0 * 5.0 + 10.0 * 1.0) * 10.0e-6,
        );
        close(
            result.total_power_mw,
            3.0 + result.total_hit_energy_mj / 5.0
                + result.total_miss_energy_mj / 5.0
                + result.total_write_energy_mj / 5.0,
        );
    }

    #[test]
    fn evaluate_is_pure() {
        let a = evaluate("cache", &workload(), &tech()).unwrap();
        let b = evaluate("cache", &workload(), &tech()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn zero_workload_leaves_leakage_only() {
        let result = evaluate("cache", &WorkloadMetrics::default(), &tech()).unwrap();
        assert_eq!(result.total_latency_ms, 0.0);
        assert_eq!(result.total_energy_mj, 0.0);
        assert_eq!(result.total_power_mw, 3.0);
    }

    #[test]
    fn subtotals_substitute_for_missing_totals() {
        let workload = WorkloadMetrics {
            load_hits: 60.0,
            store_hits: 40.0,
            load_misses: 15.0,
            store_misses: 5.0,
            ..Default::default()
        };
        assert_eq!(resolved_hits(&workload), 100.0);
        assert_eq!(resolved_misses(&workload), 20.0);
        // an explicit total wins over the subtotals
        let explicit = WorkloadMetrics {
            total_hits: Some(7.0),
            ..workload
        };
        assert_eq!(resolved_hits(&explicit), 7.0);
    }

    #[test]
    fn zero_time_yields_zero_dynamic_power() {
        let mut w = workload();
        w.time_elapsed = 0.0;
        let result = evaluate("cache", &w, &tech()).unwrap();
        assert_eq!(result.total_hit_power_mw, 0.0);
        assert_eq!(result.total_power_mw, 3.0);
    }

    #[test]
    fn unsupported_targets_yield_no_result() {
        assert!(evaluate("scratchpad", &workload(), &tech()).is_none());
    }
}
