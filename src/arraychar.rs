//! Adapter around the array-characterization engine.
//!
//! The engine is a separate native simulator invoked with one YAML config.
//! It names its result file internally and announces the path on stdout, so
//! the adapter scans the captured stream for a fixed marker instead of being
//! told the path up front. The result file comes in two mutually exclusive
//! shapes (whole-cache vs generic array); both normalize to
//! [`TechnologyMetrics`]. Whole-cache energies arrive in nJ, sub-array and
//! generic-shape energies in pJ; everything is nJ after ingestion.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use eyre::{Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::error::PipelineError;
use crate::metrics::{SubArrayMetrics, TechnologyMetrics};
use crate::settings::ArrayCharConfig;

/// Directory holding the characterization engine sources and binary.
pub const ENGINE_DIR: &str = "tech/ArrayCharacterization";
/// Sample engine config substituted when the `cache` target names none.
pub const SAMPLE_CACHE_CONFIG: &str =
    "tech/ArrayCharacterization/sample_configs/sample_FeFET_32nm.yaml";
const ENGINE_BIN: &str = "nvsim";
const RESULT_MARKER: &str = "Results written to ";

fn pj_to_nj(pj: f64) -> f64 {
    pj * 1e-3
}

/// Run the engine on the merged config and return one canonical record per
/// optimization point. `tech_output` must be absolute: the engine runs with
/// its own directory as working directory.
pub fn characterize(
    cfg: &ArrayCharConfig,
    engine_dir: &Path,
    tech_output: &Path,
) -> Result<Vec<TechnologyMetrics>> {
    ensure_engine(engine_dir)?;

    let config_path = tech_output.join("arraychar_config.yaml");
    let yaml = serde_yaml::to_string(cfg).wrap_err("cannot serialize engine config")?;
    fs::write(&config_path, yaml)
        .wrap_err_with(|| format!("cannot write {}", config_path.display()))?;

    info!("running array characterization interface");
    let output = Command::new(format!("./{ENGINE_BIN}"))
        .arg(&config_path)
        .current_dir(engine_dir)
        .output()
        .wrap_err_with(|| format!("cannot spawn {ENGINE_BIN}"))?;
    if !output.status.success() {
        return Err(PipelineError::BackendExecution {
            backend: ENGINE_BIN.into(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
        .into());
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let result_path = engine_dir.join(scan_result_path(&stdout)?);
    info!(
        "parsing array characterization results from {}",
        result_path.display()
    );
    parse_result_file(&result_path)
}

fn ensure_engine(engine_dir: &Path) -> Result<()> {
    let bin = engine_dir.join(ENGINE_BIN);
    if !bin.exists() {
        info!(
            "{ENGINE_BIN} binary not found, running make in {}",
            engine_dir.display()
        );
        let status = Command::new("make")
            .current_dir(engine_dir)
            .status()
            .wrap_err("cannot run make")?;
        if !status.success() || !bin.exists() {
            return Err(PipelineError::BackendUnavailable(ENGINE_BIN.into()).into());
        }
    }
    Ok(())
}

/// Pull the result-file path out of the engine's stdout.
fn scan_result_path(stdout: &str) -> Result<PathBuf, PipelineError> {
    let missing = || PipelineError::OutputFormat {
        origin: ENGINE_BIN.into(),
        marker: RESULT_MARKER.trim_end().into(),
    };
    let idx = stdout.find(RESULT_MARKER).ok_or_else(missing)?;
    let token = stdout[idx + RESULT_MARKER.len()..]
        .split_whitespace()
        .next()
        .ok_or_else(missing)?;
    if !token.ends_with(".yaml") {
        return Err(missing());
    }
    Ok(PathBuf::from(token))
}

/// Parse a result file produced by the engine (or a precomputed one given
/// in reuse mode).
pub fn parse_result_file(path: &Path) -> Result<Vec<TechnologyMetrics>> {
    if !path.exists() {
        return Err(PipelineError::ResourceNotFound(path.to_path_buf()).into());
    }
    let text =
        fs::read_to_string(path).wrap_err_with(|| format!("cannot read {}", path.display()))?;
    parse_result_str(&text)
}

/// Parse the (possibly multi-document) result YAML, one record per
/// optimization point.
pub fn parse_result_str(text: &str) -> Result<Vec<TechnologyMetrics>> {
    let mut records = Vec::new();
    for doc in serde_yaml::Deserializer::from_str(text) {
        let raw = RawResult::deserialize(doc).map_err(|e| PipelineError::OutputFormat {
            origin: "characterization result".into(),
            marker: e.to_string(),
        })?;
        records.push(normalize(raw)?);
    }
    if records.is_empty() {
        return Err(PipelineError::OutputFormat {
            origin: "characterization result".into(),
            marker: "CacheDesign or Results".into(),
        }
        .into());
    }
    Ok(records)
}

fn normalize(raw: RawResult) -> Result<TechnologyMetrics, PipelineError> {
    let mut m = TechnologyMetrics::default();
    if let Some(cache) = raw.cache_design {
        m.total_area_mm2 = Some(cache.area.total_mm2);
        m.cache_hit_latency_ns = Some(cache.timing.hit_latency_ns);
        m.cache_miss_latency_ns = Some(cache.timing.miss_latency_ns);
        m.cache_write_latency_ns = Some(cache.timing.write_latency_ns);
        m.cache_hit_energy_nj = Some(cache.power.hit_energy_nj);
        m.cache_miss_energy_nj = Some(cache.power.miss_energy_nj);
        m.cache_write_energy_nj = Some(cache.power.write_energy_nj);
        m.leakage_power_mw = Some(cache.power.leakage_power_mw);
        if let Some(results) = raw.data_array.and_then(|a| a.results) {
            m.data_array = Some(sub_array_metrics("DataArray", results)?);
        }
        if let Some(results) = raw.tag_array.and_then(|a| a.results) {
            m.tag_array = Some(sub_array_metrics("TagArray", results)?);
        }
        // the read path of a cache design is its data array
        if let Some(data) = &m.data_array {
            m.read_latency_ns = Some(data.read_latency_ns);
            m.read_energy_nj = Some(data.read_energy_nj);
            m.write_energy_nj = data.write_energy_nj;
        }
    } else if let Some(results) = raw.results {
        let missing = |marker: &str| PipelineError::OutputFormat {
            origin: "Results".into(),
            marker: marker.into(),
        };
        let area = results.area.ok_or_else(|| missing("Area"))?;
        m.total_area_mm2 = Some(area.total.area_mm2);
        let read_timing = results.timing.read.ok_or_else(|| missing("Timing.Read"))?;
        let read_power = results.power.read.ok_or_else(|| missing("Power.Read"))?;
        m.read_latency_ns = Some(read_timing.latency_ns);
        m.read_energy_nj = Some(pj_to_nj(read_power.dynamic_energy_pj));
        m.leakage_power_mw = Some(
            results
                .power
                .leakage_mw
                .ok_or_else(|| missing("Power.Leakage_mW"))?,
        );
        // write-class timing shows up as `Write` or `Set` depending on the
        // cell technology
        let write_timing = results.timing.write.or(results.timing.set);
        let write_power = results.power.write.or(results.power.set);
        m.write_latency_ns = write_timing.map(|t| t.latency_ns);
        m.write_energy_nj = write_power.map(|p| pj_to_nj(p.dynamic_energy_pj));
    } else {
        return Err(PipelineError::OutputFormat {
            origin: "characterization result".into(),
            marker: "CacheDesign or Results".into(),
        });
    }
    Ok(m)
}

fn sub_array_metrics(
    origin: &str,
    results: RawArrayResults,
) -> Result<SubArrayMetrics, PipelineError> {
    let missing = |marker: &str| PipelineError::OutputFormat {
        origin: origin.into(),
        marker: marker.into(),
    };
    let read_timing = results.timing.read.ok_or_else(|| missing("Timing.Read"))?;
    let read_power = results.power.read.ok_or_else(|| missing("Power.Read"))?;
    let write_power = results.power.write.or(results.power.set);
    Ok(SubArrayMetrics {
        read_latency_ns: read_timing.latency_ns,
        read_energy_nj: pj_to_nj(read_power.dynamic_energy_pj),
        write_energy_nj: write_power.map(|p| pj_to_nj(p.dynamic_energy_pj)),
        leakage_power_mw: results
            .power
            .leakage_mw
            .ok_or_else(|| missing("Power.Leakage_mW"))?,
    })
}

#[derive(Deserialize, Debug)]
struct RawResult {
    #[serde(rename = "CacheDesign")]
    cache_design: Option<RawCacheDesign>,
    #[serde(rename = "DataArray")]
    data_array: Option<RawSubArray>,
    #[serde(rename = "TagArray")]
    tag_array: Option<RawSubArray>,
    #[serde(rename = "Results")]
    results: Option<RawArrayResults>,
}

#[derive(Deserialize, Debug)]
struct RawCacheDesign {
    #[serde(rename = "Area")]
    area: RawCacheArea,
    #[serde(rename = "Timing")]
    timing: RawCacheTiming,
    #[serde(rename = "Power")]
    power: RawCachePower,
}

#[derive(Deserialize, Debug)]
struct RawCacheArea {
    #[serde(rename = "Total_mm2")]
    total_mm2: f64,
}

#[derive(Deserialize, Debug)]
struct RawCacheTiming {
    #[serde(rename = "CacheHitLatency_ns")]
    hit_latency_ns: f64,
    #[serde(rename = "CacheMissLatency_ns")]
    miss_latency_ns: f64,
    #[serde(rename = "CacheWriteLatency_ns")]
    write_latency_ns: f64,
}

#[derive(Deserialize, Debug)]
struct RawCachePower {
    #[serde(rename = "CacheHitDynamicEnergy_nJ")]
    hit_energy_nj: f64,
    #[serde(rename = "CacheMissDynamicEnergy_nJ")]
    miss_energy_nj: f64,
    #[serde(rename = "CacheWriteDynamicEnergy_nJ")]
    write_energy_nj: f64,
    #[serde(rename = "CacheTotalLeakagePower_mW")]
    leakage_power_mw: f64,
}

#[derive(Deserialize, Debug)]
struct RawSubArray {
    #[serde(rename = "Results")]
    results: Option<RawArrayResults>,
}

#[derive(Deserialize, Debug)]
struct RawArrayResults {
    #[serde(rename = "Area")]
    area: Option<RawArrayArea>,
    #[serde(rename = "Timing")]
    timing: RawTimingTable,
    #[serde(rename = "Power")]
    power: RawPowerTable,
}

#[derive(Deserialize, Debug)]
struct RawArrayArea {
    #[serde(rename = "Total")]
    total: RawAreaTotal,
}

#[derive(Deserialize, Debug)]
struct RawAreaTotal {
    #[serde(rename = "Area_mm2")]
    area_mm2: f64,
}

#[derive(Deserialize, Debug, Default)]
struct RawTimingTable {
    #[serde(rename = "Read")]
    read: Option<RawTiming>,
    #[serde(rename = "Write")]
    write: Option<RawTiming>,
    #[serde(rename = "Set")]
    set: Option<RawTiming>,
}

#[derive(Deserialize, Debug)]
struct RawTiming {
    #[serde(rename = "Latency_ns")]
    latency_ns: f64,
}

#[derive(Deserialize, Debug, Default)]
struct RawPowerTable {
    #[serde(rename = "Read")]
    read: Option<RawEnergy>,
    #[serde(rename = "Write")]
    write: Option<RawEnergy>,
    #[serde(rename = "Set")]
    set: Option<RawEnergy>,
    #[serde(rename = "Leakage_mW")]
    leakage_mw: Option<f64>,
}

#[derive(Deserialize, Debug)]
struct RawEnergy {
    #[serde(rename = "DynamicEnergy_pJ")]
    dynamic_energy_pj: f64,
}
