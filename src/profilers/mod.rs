//! Profiler adapters: one per supported backend, behind one contract.
//!
//! Each adapter builds its backend's invocation, makes sure the backend's
//! build artifacts exist (triggering the setup step exactly once when they
//! do not), runs it synchronously, and leaves a canonical pattern artifact
//! in the run's profiling output directory. The orchestrator depends only
//! on the [`Profiler`] trait.

pub mod dynamorio;
pub mod perf;
pub mod sniper;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use eyre::{Context, Result};
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::metrics::WorkloadMetrics;
use crate::settings::{AppsSettings, ProfilerKind};

/// Everything an adapter needs to launch its backend. Paths are absolute:
/// backend commands run inside the output directory.
pub struct ProfileContext {
    pub apps: AppsSettings,
    /// Root of the profiler toolchain checkout.
    pub apps_dir: PathBuf,
    /// The run's `apps_output` directory.
    pub output_dir: PathBuf,
}

pub trait Profiler {
    fn name(&self) -> &'static str;

    /// Run the backend and persist the canonical pattern artifact (plus the
    /// raw captured report) into the profiling output directory.
    fn profile(&self, cx: &ProfileContext) -> Result<()>;
}

pub fn for_kind(kind: ProfilerKind) -> Box<dyn Profiler> {
    match kind {
        ProfilerKind::Dynamorio => Box::new(dynamorio::DynamorioProfiler),
        ProfilerKind::Sniper => Box::new(sniper::SniperProfiler),
        ProfilerKind::Perf => Box::new(perf::PerfProfiler),
    }
}

/// Build-status record maintained by the profiler toolchain's makefiles.
const BUILD_STATUS_FILE: &str = "built_profilers.json";

fn read_build_status(apps_dir: &Path) -> Option<BTreeMap<String, bool>> {
    let file = fs::File::open(apps_dir.join(BUILD_STATUS_FILE)).ok()?;
    serde_json::from_reader(file).ok()
}

fn is_built(apps_dir: &Path, backend: &str) -> bool {
    read_build_status(apps_dir)
        .map_or(false, |s| s.get(backend).copied().unwrap_or(false))
}

/// Make sure the backend's artifacts exist, running its setup step at most
/// once. Still unavailable afterwards is fatal, there is no retry.
pub(crate) fn ensure_built(apps_dir: &Path, backend: &'static str) -> Result<()> {
    if !is_built(apps_dir, backend) {
        info!("{backend} profiler not built, running setup now");
        let status = Command::new("make")
            .arg(backend)
            .current_dir(apps_dir)
            .status()
            .wrap_err_with(|| format!("cannot run make {backend}"))?;
        if !status.success() || !is_built(apps_dir, backend) {
            return Err(PipelineError::BackendUnavailable(backend.into()).into());
        }
    }
    Ok(())
}

/// Run a backend command synchronously, returning its captured stdout. A
/// nonzero exit surfaces the diagnostic stream verbatim.
pub(crate) fn run_capture(backend: &str, cmd: &mut Command) -> Result<String> {
    debug!("executing {cmd:?}");
    let output = cmd
        .output()
        .wrap_err_with(|| format!("cannot spawn {backend}"))?;
    if !output.status.success() {
        return Err(PipelineError::BackendExecution {
            backend: backend.into(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
        .into());
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Extract the numeric field following a fixed literal marker. A missing
/// marker means the backend's output format has drifted, which is fatal.
pub(crate) fn extract_field(origin: &str, text: &str, marker: &str) -> Result<f64, PipelineError> {
    let missing = || PipelineError::OutputFormat {
        origin: origin.into(),
        marker: marker.into(),
    };
    let idx = text.find(marker).ok_or_else(missing)?;
    text[idx + marker.len()..]
        .split_whitespace()
        .next()
        .and_then(|token| token.parse().ok())
        .ok_or_else(missing)
}

/// Persist the raw captured report and the canonical pattern record.
pub(crate) fn persist_artifacts(
    cx: &ProfileContext,
    backend: &str,
    report: &str,
    raw: &str,
    metrics: &WorkloadMetrics,
) -> Result<PathBuf> {
    fs::write(cx.output_dir.join(format!("{report}.{backend}-rep")), raw)?;
    let pattern = cx.output_dir.join(format!("{report}_pattern.json"));
    let file = fs::File::create(&pattern)?;
    serde_json::to_writer_pretty(file, metrics)?;
    Ok(pattern)
}

pub(crate) fn report_name(executable: &Path) -> String {
    executable
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "profiled".into())
}
