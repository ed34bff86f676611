//! Orchestration of one evaluation run.
//!
//! Stage order: validate, allocate the run-output directory, profile (or
//! reuse a prior pattern file), locate the canonical pattern artifact,
//! characterize (or reuse a prior result), evaluate, persist. Every stage
//! error aborts the run; nothing is retried and no partial result row is
//! ever written.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use clap::{Command, IntoApp};
use clap_complete::Generator;
use eyre::{eyre, Context, Result};
use itertools::Itertools;
use tracing::info;

use crate::args::Args;
use crate::arraychar;
use crate::error::PipelineError;
use crate::init_logger;
use crate::metrics::{PatternData, WorkloadMetrics};
use crate::model;
use crate::profilers::{self, ProfileContext};
use crate::result::{self, ResultRow};
use crate::settings::{ProfilerKind, RunMode, Settings};

pub const RESULTS_ROOT: &str = "results";

fn print_completions<G: Generator>(gen: G, cmd: &mut Command) {
    clap_complete::generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
}

pub fn main(args: Args) -> Result<()> {
    init_logger();
    let start_time = std::time::Instant::now();
    if let Some(generator) = args.generator {
        let mut cmd = Args::command();
        eprintln!("Generating completion file for {:?}...", generator);
        print_completions(generator, &mut cmd);
        return Ok(());
    }
    info!("start evaluation with {:?}", args);

    let settings = Settings::new(&args.config).wrap_err("invalid run configuration")?;
    run(&args.config, settings, Path::new(RESULTS_ROOT))?;

    info!(
        "running time: {:?}'s",
        std::time::Instant::now()
            .duration_since(start_time)
            .as_secs_f64()
    );
    Ok(())
}

/// Drive one validated configuration end to end. Returns the allocated
/// run-output directory.
pub fn run(config_path: &Path, mut settings: Settings, results_root: &Path) -> Result<PathBuf> {
    let config_name = config_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| eyre!("invalid config file name {:?}", config_path))?;
    let results_dir = allocate_run_dir(results_root, &config_name)?;
    info!("run outputs will be saved to {}", results_dir.display());

    let original_dir = std::env::current_dir()?;

    // profiling, or reuse of a prior pattern file
    let pattern_path = match settings.apps.run {
        RunMode::New => {
            // backend commands run inside apps_output; their input paths
            // must survive the directory change
            if let Some(exe) = settings.apps.executable.take() {
                settings.apps.executable = Some(absolutize(&original_dir, exe));
            }
            if let Some(cfg) = settings.apps.config.take() {
                settings.apps.config = Some(absolutize(&original_dir, cfg));
            }
            let apps_output = absolutize(&original_dir, results_dir.join("apps_output"));
            fs::create_dir(&apps_output)?;

            info!("running apps profiling interface");
            let cx = ProfileContext {
                apps: settings.apps.clone(),
                apps_dir: original_dir.join("apps"),
                output_dir: apps_output.clone(),
            };
            profilers::for_kind(settings.apps.profiler).profile(&cx)?;
            locate_pattern_file(&apps_output)?
        }
        RunMode::Reuse => {
            let path = settings
                .apps
                .patternconfig_path
                .clone()
                .ok_or_else(|| eyre!("validated apps section lacks a pattern file path"))?;
            if !path.exists() {
                return Err(PipelineError::ResourceNotFound(path).into());
            }
            path
        }
    };
    info!("apps pattern file: {}", pattern_path.display());
    let pattern: PatternData = serde_json::from_reader(File::open(&pattern_path)?)
        .wrap_err_with(|| format!("cannot parse pattern file {}", pattern_path.display()))?;
    let records = pattern.into_records();
    if records.is_empty() {
        return Err(PipelineError::OutputFormat {
            origin: pattern_path.display().to_string(),
            marker: "benchmark records".into(),
        }
        .into());
    }

    // characterization, or reuse of a prior result
    let tech_records = match settings.tech.run {
        RunMode::New => {
            let tech_output = absolutize(&original_dir, results_dir.join("tech_output"));
            fs::create_dir(&tech_output)?;
            let mut cfg = settings
                .tech
                .char_config
                .clone()
                .ok_or_else(|| eyre!("validated tech section lacks a characterization config"))?;
            // system fields override whatever the engine config carries
            cfg.design_target = Some(settings.system.design_target.clone());
            cfg.capacity = Some(settings.system.capacity.clone());
            cfg.word_width = Some(settings.system.word_width);
            if settings.system.optimization_target.is_some() {
                cfg.optimization_target = settings.system.optimization_target.clone();
            }
            cfg.output_directory = Some(format!("{}/", tech_output.display()));
            arraychar::characterize(
                &cfg,
                &original_dir.join(arraychar::ENGINE_DIR),
                &tech_output,
            )?
        }
        RunMode::Reuse => {
            let path = settings
                .tech
                .array_characterization_result_path
                .clone()
                .ok_or_else(|| eyre!("validated tech section lacks a result path"))?;
            arraychar::parse_result_file(&path)?
        }
    };
    // characterization may explore several operating points; the model
    // evaluates against the first
    let tech = tech_records
        .first()
        .ok_or_else(|| eyre!("characterization produced no records"))?;

    // analytical model and result table
    let model_output = results_dir.join("model_output");
    fs::create_dir(&model_output)?;
    let csv_path = model_output.join(format!("{config_name}_results.csv"));

    let multithread = settings.apps.profiler == ProfilerKind::Sniper && settings.apps.multithread;
    let selected: Vec<&WorkloadMetrics> = if multithread {
        info!("evaluating {} benchmarks from sniper output", records.len());
        records.iter().collect()
    } else {
        vec![&records[0]]
    };
    for (i, workload) in selected.iter().enumerate() {
        let model_result = model::evaluate(&settings.system.design_target, workload, tech)
            .ok_or_else(|| {
                PipelineError::Config(format!(
                    "design target `{}` is not supported by the analytical model",
                    settings.system.design_target
                ))
            })?;
        info!("model results for benchmark {i}: {model_result:?}");
        let row = ResultRow::new(
            &config_name,
            &settings.system,
            &settings.apps,
            workload,
            tech,
            &model_result,
        );
        result::append_row(&csv_path, &row)?;
    }
    info!("model results saved to {}", csv_path.display());
    Ok(results_dir)
}

/// Allocate a fresh run-output directory `<root>/<base>_<i>`, bumping the
/// numeric suffix until an unused name is found. A prior run's output is
/// never overwritten.
pub fn allocate_run_dir(root: &Path, base: &str) -> Result<PathBuf> {
    fs::create_dir_all(root)?;
    let mut i = 1;
    loop {
        let dir = root.join(format!("{base}_{i}"));
        if !dir.exists() {
            fs::create_dir(&dir)?;
            return Ok(dir);
        }
        i += 1;
    }
}

/// Locate exactly one canonical pattern artifact by filename convention.
/// Several candidates are resolved deterministically: lexicographically
/// smallest name wins.
pub fn locate_pattern_file(dir: &Path) -> Result<PathBuf, PipelineError> {
    let entries =
        fs::read_dir(dir).map_err(|_| PipelineError::ResourceNotFound(dir.to_path_buf()))?;
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map_or(false, |name| {
                    let name = name.to_lowercase();
                    name.ends_with(".json") && name.contains("pattern")
                })
        })
        .sorted()
        .next()
        .ok_or_else(|| PipelineError::ResourceNotFound(dir.join("*pattern*.json")))
}

fn absolutize(base: &Path, path: impl Into<PathBuf>) -> PathBuf {
    let path = path.into();
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn run_dirs_get_increasing_suffixes() -> Result<()> {
        let root = tempfile::tempdir()?;
        let first = allocate_run_dir(root.path(), "campaign")?;
        let second = allocate_run_dir(root.path(), "campaign")?;
        assert_eq!(first.file_name().unwrap(), "campaign_1");
        assert_eq!(second.file_name().unwrap(), "campaign_2");
        assert!(first.is_dir() && second.is_dir());
        Ok(())
    }

    #[test]
    fn missing_pattern_artifact_is_resource_not_found() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let err = locate_pattern_file(dir.path()).unwrap_err();
        assert!(matches!(err, PipelineError::ResourceNotFound(_)));
        Ok(())
    }

    #[test]
    fn pattern_candidates_resolve_lexicographically() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("b_pattern.json"), "{}")?;
        fs::write(dir.path().join("a_PATTERN.json"), "{}")?;
        fs::write(dir.path().join("a_report.txt"), "")?;
        let found = locate_pattern_file(dir.path())?;
        assert_eq!(found.file_name().unwrap(), "a_PATTERN.json");
        Ok(())
    }
}
