//! Hardware-counter sampling backend.
//!
//! The wrapper prints per-level access and miss counters plus elapsed time
//! with fixed labels. Hit counts are not sampled directly; they are derived
//! from accesses minus misses.

use std::process::Command;

use eyre::Result;

use super::{
    ensure_built, extract_field, persist_artifacts, report_name, run_capture, ProfileContext,
    Profiler,
};
use crate::error::PipelineError;
use crate::metrics::WorkloadMetrics;

const LOADS: &str = "total loads: ";
const STORES: &str = "total stores: ";
const LOAD_MISSES: &str = "load misses: ";
const STORE_MISSES: &str = "store misses: ";
const TIME_ELAPSED: &str = "time elapsed (s): ";

pub struct PerfProfiler;

impl Profiler for PerfProfiler {
    fn name(&self) -> &'static str {
        "perf"
    }

    fn profile(&self, cx: &ProfileContext) -> Result<()> {
        ensure_built(&cx.apps_dir, self.name())?;
        let executable = cx.apps.executable.as_ref().ok_or_else(|| {
            PipelineError::Config("perf profiling requires an executable".into())
        })?;
        let level = cx.apps.level.as_ref().ok_or_else(|| {
            PipelineError::Config("perf profiling requires a cache level".into())
        })?;

        let mut cmd = Command::new("python3");
        cmd.arg(cx.apps_dir.join("main.py"))
            .args(["--profiler", "perf", "--action", "both", "--level", level]);
        if let Some(arch) = &cx.apps.arch {
            cmd.args(["--arch", arch]);
        }
        cmd.arg("--executable")
            .arg(executable)
            .current_dir(&cx.output_dir);
        let stdout = run_capture(self.name(), &mut cmd)?;

        let metrics = parse_report(&stdout)?;
        persist_artifacts(cx, "perf", &report_name(executable), &stdout, &metrics)?;
        Ok(())
    }
}

fn parse_report(stdout: &str) -> Result<WorkloadMetrics, PipelineError> {
    let loads = extract_field("perf", stdout, LOADS)?;
    let stores = extract_field("perf", stdout, STORES)?;
    let load_misses = extract_field("perf", stdout, LOAD_MISSES)?;
    let store_misses = extract_field("perf", stdout, STORE_MISSES)?;
    Ok(WorkloadMetrics {
        total_reads: loads,
        total_writes: stores,
        load_hits: (loads - load_misses).max(0.0),
        store_hits: (stores - store_misses).max(0.0),
        load_misses,
        store_misses,
        time_elapsed: extract_field("perf", stdout, TIME_ELAPSED)?,
        ..Default::default()
    })
}
