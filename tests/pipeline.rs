use std::fs;
use std::path::Path;

use eyre::Result;
use memdse::error::PipelineError;
use memdse::run_main;
use memdse::settings::Settings;

const CACHE_RESULT: &str = r#"
CacheDesign:
  Area:
    Total_mm2: 1.25
  Timing:
    CacheHitLatency_ns: 1.0
    CacheMissLatency_ns: 10.0
    CacheWriteLatency_ns: 2.0
  Power:
    CacheHitDynamicEnergy_nJ: 0.5
    CacheMissDynamicEnergy_nJ: 5.0
    CacheWriteDynamicEnergy_nJ: 1.0
    CacheTotalLeakagePower_mW: 3.0
"#;

const SNIPER_PATTERN: &str = r#"[
  {"load_hits": 60, "store_hits": 40, "load_misses": 15, "store_misses": 5,
   "total_reads": 90, "total_writes": 10, "time_elapsed": 5},
  {"load_hits": 30, "store_hits": 20, "load_misses": 8, "store_misses": 2,
   "total_reads": 45, "total_writes": 5, "time_elapsed": 5}
]"#;

fn write_config(
    dir: &Path,
    name: &str,
    pattern: &Path,
    tech_result: &Path,
    multithread: bool,
) -> Result<std::path::PathBuf> {
    let config = dir.join(name);
    fs::write(
        &config,
        format!(
            "system:\n\
             \x20 design_target: cache\n\
             \x20 capacity: {{value: 64, unit: KB}}\n\
             \x20 word_width: 64\n\
             apps:\n\
             \x20 run: reuse\n\
             \x20 profiler: sniper\n\
             \x20 level: \"3\"\n\
             \x20 multithread: {multithread}\n\
             \x20 patternconfig_path: {}\n\
             tech:\n\
             \x20 run: reuse\n\
             \x20 array_characterization_result_path: {}\n",
            pattern.display(),
            tech_result.display(),
        ),
    )?;
    Ok(config)
}

#[test]
fn reuse_mode_campaign_end_to_end() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let pattern = dir.path().join("stream_pattern.json");
    fs::write(&pattern, SNIPER_PATTERN)?;
    let tech_result = dir.path().join("char_result.yaml");
    fs::write(&tech_result, CACHE_RESULT)?;
    let results_root = dir.path().join("results");

    let config = write_config(dir.path(), "campaign.yaml", &pattern, &tech_result, true)?;
    let settings = Settings::new(&config)?;
    let run_dir = run_main::run(&config, settings, &results_root)?;
    assert_eq!(run_dir.file_name().unwrap(), "campaign_1");

    let csv = run_dir.join("model_output/campaign_results.csv");
    let content = fs::read_to_string(&csv)?;
    let lines: Vec<&str> = content.lines().collect();
    // one header plus one row per sniper core in multithread mode
    assert_eq!(lines.len(), 3);
    let columns = lines[0].split(',').count();
    for line in &lines {
        assert_eq!(line.split(',').count(), columns);
    }

    let first: Vec<&str> = lines[1].split(',').collect();
    assert_eq!(first[0], "campaign");
    assert_eq!(first[1], "sniper");
    // hits resolved from the per-access-kind subtotals
    assert_eq!(first[9].parse::<f64>()?, 100.0);
    let total_latency_ms: f64 = first[14].parse()?;
    assert!((total_latency_ms - 0.0032).abs() < 1e-12);
    let total_power_mw: f64 = first[22].parse()?;
    assert!((total_power_mw - 3.00032).abs() < 1e-9);
    Ok(())
}

#[test]
fn singlethread_run_evaluates_only_the_first_record() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let pattern = dir.path().join("stream_pattern.json");
    fs::write(&pattern, SNIPER_PATTERN)?;
    let tech_result = dir.path().join("char_result.yaml");
    fs::write(&tech_result, CACHE_RESULT)?;
    let results_root = dir.path().join("results");

    let config = write_config(dir.path(), "single.yaml", &pattern, &tech_result, false)?;
    let settings = Settings::new(&config)?;
    let run_dir = run_main::run(&config, settings, &results_root)?;
    let content = fs::read_to_string(run_dir.join("model_output/single_results.csv"))?;
    assert_eq!(content.lines().count(), 2);
    Ok(())
}

#[test]
fn rerunning_a_campaign_allocates_a_new_suffix() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let pattern = dir.path().join("stream_pattern.json");
    fs::write(&pattern, SNIPER_PATTERN)?;
    let tech_result = dir.path().join("char_result.yaml");
    fs::write(&tech_result, CACHE_RESULT)?;
    let results_root = dir.path().join("results");

    let config = write_config(dir.path(), "repeat.yaml", &pattern, &tech_result, true)?;
    let first = run_main::run(&config, Settings::new(&config)?, &results_root)?;
    let second = run_main::run(&config, Settings::new(&config)?, &results_root)?;
    assert_eq!(first.file_name().unwrap(), "repeat_1");
    assert_eq!(second.file_name().unwrap(), "repeat_2");
    // the first campaign's table is untouched by the second run
    assert!(first.join("model_output/repeat_results.csv").exists());
    assert!(second.join("model_output/repeat_results.csv").exists());
    Ok(())
}

#[test]
fn missing_pattern_file_aborts_before_characterization() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let pattern = dir.path().join("gone_pattern.json");
    let tech_result = dir.path().join("also_gone.yaml");
    let results_root = dir.path().join("results");

    let config = write_config(dir.path(), "broken.yaml", &pattern, &tech_result, false)?;
    let settings = Settings::new(&config)?;
    let err = run_main::run(&config, settings, &results_root).unwrap_err();
    match err.downcast_ref::<PipelineError>() {
        Some(PipelineError::ResourceNotFound(path)) => {
            // the pattern stage fails first; the tech result is never touched
            assert_eq!(path, &pattern);
        }
        other => panic!("expected ResourceNotFound, got {other:?}"),
    }
    Ok(())
}

#[test]
fn instrumentation_profiler_is_rejected_for_cache_targets() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = dir.path().join("drio.yaml");
    fs::write(
        &config,
        "system:\n\
         \x20 design_target: cache\n\
         \x20 capacity: {value: 64}\n\
         \x20 word_width: 64\n\
         apps:\n\
         \x20 run: new\n\
         \x20 profiler: dynamorio\n\
         \x20 executable: a.out\n\
         tech:\n\
         \x20 run: reuse\n\
         \x20 array_characterization_result_path: r.yaml\n",
    )?;
    match Settings::new(&config) {
        Err(PipelineError::Config(msg)) => assert!(msg.contains("cache modeling")),
        other => panic!("expected Config error, got {other:?}"),
    }
    Ok(())
}
