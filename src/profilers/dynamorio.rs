//! Instrumentation-based memory-access counting backend.
//!
//! The wrapped client prints its counters to stdout with fixed labels; the
//! adapter turns them into a canonical workload record. No execution time is
//! reported by this backend, so the model's power terms reduce to leakage.

use std::process::Command;

use eyre::Result;

use super::{
    ensure_built, extract_field, persist_artifacts, report_name, run_capture, ProfileContext,
    Profiler,
};
use crate::error::PipelineError;
use crate::metrics::WorkloadMetrics;

const MEMORY_REFS: &str = "saw ";
const READS: &str = "number of reads: ";
const WRITES: &str = "number of writes: ";
const WORKING_SET: &str = "working set size: ";

pub struct DynamorioProfiler;

impl Profiler for DynamorioProfiler {
    fn name(&self) -> &'static str {
        "dynamorio"
    }

    fn profile(&self, cx: &ProfileContext) -> Result<()> {
        ensure_built(&cx.apps_dir, self.name())?;
        let executable = cx.apps.executable.as_ref().ok_or_else(|| {
            PipelineError::Config("dynamorio profiling requires an executable".into())
        })?;

        let mut cmd = Command::new("python3");
        cmd.arg(cx.apps_dir.join("main.py"))
            .args(["--profiler", "dynamorio", "--action", "both", "--config"])
            .arg(cx.apps_dir.join("config/memcount_config.txt"))
            .arg("--executable")
            .arg(executable)
            .current_dir(&cx.output_dir);
        let stdout = run_capture(self.name(), &mut cmd)?;

        let metrics = parse_report(&stdout)?;
        persist_artifacts(cx, "drio", &report_name(executable), &stdout, &metrics)?;
        Ok(())
    }
}

fn parse_report(stdout: &str) -> Result<WorkloadMetrics, PipelineError> {
    Ok(WorkloadMetrics {
        total_memory_refs: extract_field("dynamorio", stdout, MEMORY_REFS)?,
        total_reads: extract_field("dynamorio", stdout, READS)?,
        total_writes: extract_field("dynamorio", stdout, WRITES)?,
        workingset_size: extract_field("dynamorio", stdout, WORKING_SET)?,
        ..Default::default()
    })
}

#[cfg(test)]
mod test {
    use super::*;

    const REPORT: &str = "\
instrumentation results:
  saw 150000 memory references
  number of reads: 100000
  number of writes: 50000
  working set size: 4096
";

    #[test]
    fn report_grammar_extracts_all_counters() {
        let metrics = parse_report(REPORT).unwrap();
        assert_eq!(metrics.total_memory_refs, 150000.0);
        assert_eq!(metrics.total_reads, 100000.0);
        assert_eq!(metrics.total_writes, 50000.0);
        assert_eq!(metrics.workingset_size, 4096.0);
        assert_eq!(metrics.total_hits, None);
    }

    #[test]
    fn drifted_report_is_rejected() {
        let err = parse_report("saw 10 memory references\n").unwrap_err();
        assert!(matches!(err, PipelineError::OutputFormat { .. }));
    }
}
