use std::path::PathBuf;

use thiserror::Error;

/// Error taxonomy of the evaluation pipeline. Every variant is fatal: the
/// orchestrator aborts the run on the first error and never retries a stage.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Missing or contradictory configuration, unsupported design target,
    /// or an invalid cross-section combination. Raised before any external
    /// process is started.
    #[error("configuration error: {0}")]
    Config(String),

    /// A section of the run configuration lacks required fields for the
    /// selected run mode / backend.
    #[error("provide required {section} inputs: {fields:?}")]
    MissingFields {
        section: &'static str,
        fields: Vec<&'static str>,
    },

    /// The backend binary is still missing after the one on-demand
    /// build/setup attempt.
    #[error("backend `{0}` unavailable after setup attempt")]
    BackendUnavailable(String),

    /// An external process exited with nonzero status. The captured
    /// diagnostic stream is surfaced verbatim.
    #[error("backend `{backend}` failed ({status}):\n{stderr}")]
    BackendExecution {
        backend: String,
        status: String,
        stderr: String,
    },

    /// An expected marker or field is absent from a backend's output,
    /// meaning its output format has drifted from what the adapter expects.
    #[error("unexpected output from `{origin}`: missing `{marker}`")]
    OutputFormat { origin: String, marker: String },

    /// An expected pattern/result artifact is missing on disk.
    #[error("resource not found: {0}")]
    ResourceNotFound(PathBuf),
}
