//! Cycle-accurate multicore simulation backend.
//!
//! Unlike the other backends this one emits a structured pattern file of its
//! own, one workload record per simulated core, directly into the results
//! directory it is pointed at. The adapter keeps the raw log and leaves
//! locating the pattern artifact to the shared pipeline stage.

use std::fs;
use std::process::Command;

use eyre::{Context, Result};

use super::{ensure_built, report_name, run_capture, ProfileContext, Profiler};
use crate::error::PipelineError;

pub struct SniperProfiler;

impl Profiler for SniperProfiler {
    fn name(&self) -> &'static str {
        "sniper"
    }

    fn profile(&self, cx: &ProfileContext) -> Result<()> {
        ensure_built(&cx.apps_dir, self.name())?;
        let executable = cx.apps.executable.as_ref().ok_or_else(|| {
            PipelineError::Config("sniper profiling requires an executable".into())
        })?;
        let config = cx.apps.config.as_ref().ok_or_else(|| {
            PipelineError::Config("sniper profiling requires a simulator config".into())
        })?;
        let level = cx.apps.level.as_ref().ok_or_else(|| {
            PipelineError::Config("sniper profiling requires a cache level".into())
        })?;

        let mut cmd = Command::new("python3");
        cmd.arg(cx.apps_dir.join("main.py"))
            .args(["-p", "sniper", "-a", "both", "--config"])
            .arg(config)
            .args(["--level", level, "--results_dir", "."])
            .arg("--executable")
            .arg(executable)
            .current_dir(&cx.output_dir);
        let stdout = run_capture(self.name(), &mut cmd)?;

        let report = cx
            .output_dir
            .join(format!("{}.sniper-rep", report_name(executable)));
        fs::write(&report, stdout)
            .wrap_err_with(|| format!("cannot write {}", report.display()))?;
        Ok(())
    }
}
