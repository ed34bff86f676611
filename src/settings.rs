//! Run-configuration parsing and validation.
//!
//! The configuration file has three sections, `system`, `apps` and `tech`,
//! each validated on its own before any external tool is invoked. Which
//! fields a section requires depends on its run mode and selected backend;
//! the rules live in small decision tables so they stay auditable.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use config::Config;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::info;

use crate::arraychar::SAMPLE_CACHE_CONFIG;
use crate::error::PipelineError;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Execute the external tool for this run.
    New,
    /// Reuse an artifact produced by a prior run.
    #[serde(alias = "existing")]
    Reuse,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProfilerKind {
    /// Instrumentation-based memory-access counting.
    Dynamorio,
    /// Cycle-accurate multicore simulation.
    Sniper,
    /// Hardware-counter sampling.
    Perf,
}

impl ProfilerKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProfilerKind::Dynamorio => "dynamorio",
            ProfilerKind::Sniper => "sniper",
            ProfilerKind::Perf => "perf",
        }
    }
}

/// Capacity of the modeled array. Serializes with the key names the
/// characterization engine expects.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Capacity {
    #[serde(rename = "Value", alias = "value")]
    pub value: f64,
    #[serde(rename = "Unit", alias = "unit", skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// The design target being modeled. Immutable for the run.
#[derive(Deserialize, Debug, Clone)]
pub struct SystemSettings {
    pub design_target: String,
    pub capacity: Capacity,
    pub word_width: u32,
    #[serde(default)]
    pub optimization_target: Option<String>,
}

/// Workload profiling section. Most fields are conditionally required, see
/// [`required_apps_fields`].
#[derive(Deserialize, Debug, Clone)]
pub struct AppsSettings {
    pub run: RunMode,
    pub profiler: ProfilerKind,
    #[serde(default)]
    pub executable: Option<PathBuf>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub config: Option<PathBuf>,
    #[serde(default)]
    pub arch: Option<String>,
    #[serde(default)]
    pub multithread: bool,
    #[serde(default)]
    pub patternconfig_path: Option<PathBuf>,
}

/// Device-technology section. For a new characterization run the referenced
/// engine config is loaded and merged at validation time so that a broken
/// setup is caught before any process starts.
#[derive(Deserialize, Debug, Clone)]
pub struct TechSettings {
    pub run: RunMode,
    #[serde(default)]
    pub array_characterization_config: Option<PathBuf>,
    #[serde(default)]
    pub array_characterization_result_path: Option<PathBuf>,
    #[serde(default)]
    pub associativity: Option<u32>,
    #[serde(default)]
    pub memory_cell_input_file: Option<PathBuf>,
    /// Engine config merged from the referenced file and the overrides
    /// above. Populated by validation for new-run mode.
    #[serde(skip)]
    pub char_config: Option<ArrayCharConfig>,
}

/// Configuration handed to the characterization engine. Field names follow
/// the engine's own convention; everything the loaded sample file carries
/// beyond the known fields is passed through untouched.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct ArrayCharConfig {
    #[serde(rename = "DesignTarget", skip_serializing_if = "Option::is_none")]
    pub design_target: Option<String>,
    #[serde(rename = "Capacity", skip_serializing_if = "Option::is_none")]
    pub capacity: Option<Capacity>,
    #[serde(rename = "WordWidth", skip_serializing_if = "Option::is_none")]
    pub word_width: Option<u32>,
    #[serde(rename = "OptimizationTarget", skip_serializing_if = "Option::is_none")]
    pub optimization_target: Option<String>,
    #[serde(rename = "Associativity", skip_serializing_if = "Option::is_none")]
    pub associativity: Option<u32>,
    #[serde(
        rename = "MemoryCellInputFile",
        skip_serializing_if = "Option::is_none"
    )]
    pub memory_cell_input_file: Option<PathBuf>,
    #[serde(rename = "OutputDirectory", skip_serializing_if = "Option::is_none")]
    pub output_directory: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Decision table: (run mode, profiler backend) -> required `apps` fields.
pub fn required_apps_fields(run: RunMode, profiler: ProfilerKind) -> &'static [&'static str] {
    match (run, profiler) {
        (RunMode::New, ProfilerKind::Dynamorio) => &["executable"],
        (RunMode::New, ProfilerKind::Sniper) => &["level", "executable", "config"],
        (RunMode::New, ProfilerKind::Perf) => &["level", "executable"],
        (RunMode::Reuse, _) => &["patternconfig_path"],
    }
}

/// Decision table: run mode -> required `tech` fields. A missing
/// characterization config in new-run mode is not fatal by itself, a
/// design-target-specific sample is substituted instead.
pub fn required_tech_fields(run: RunMode) -> &'static [&'static str] {
    match run {
        RunMode::New => &["array_characterization_config"],
        RunMode::Reuse => &["array_characterization_result_path"],
    }
}

pub const REQUIRED_SYSTEM_FIELDS: &[&str] = &["design_target", "capacity", "word_width"];

#[derive(Debug, Clone)]
pub struct Settings {
    pub system: SystemSettings,
    pub apps: AppsSettings,
    pub tech: TechSettings,
}

impl Settings {
    pub fn new(config: &Path) -> Result<Self, PipelineError> {
        let name = config
            .to_str()
            .ok_or_else(|| PipelineError::Config("invalid config path".into()))?;
        let raw = Config::builder()
            .add_source(config::File::with_name(name))
            .build()
            .map_err(|e| PipelineError::Config(format!("cannot load {name}: {e}")))?;
        let raw: Value = raw
            .try_deserialize()
            .map_err(|e| PipelineError::Config(format!("cannot parse {name}: {e}")))?;
        Self::from_value(&raw)
    }

    pub fn from_value(raw: &Value) -> Result<Self, PipelineError> {
        for section in ["system", "apps", "tech"] {
            match raw.get(section) {
                Some(v) if v.as_mapping().map_or(false, |m| !m.is_empty()) => {}
                Some(_) => {
                    return Err(PipelineError::Config(format!("{section} config is empty")))
                }
                None => {
                    return Err(PipelineError::Config(format!(
                        "provide required top-level config sections [system, apps, tech]: missing {section}"
                    )))
                }
            }
        }
        let system = validate_system(&raw["system"])?;
        let apps = validate_apps(&raw["apps"])?;
        let tech = validate_tech(&raw["tech"], &system.design_target)?;

        // The instrumentation backend only counts raw accesses; it cannot
        // supply the hit/miss breakdown the cache model consumes. This is
        // the only cross-section exclusion.
        if apps.profiler == ProfilerKind::Dynamorio && system.design_target == "cache" {
            return Err(PipelineError::Config(
                "choose sniper or perf as a profiler for cache modeling".into(),
            ));
        }

        Ok(Settings { system, apps, tech })
    }
}

fn missing_fields(section: &Value, required: &[&'static str]) -> Vec<&'static str> {
    required
        .iter()
        .copied()
        .filter(|k| section.get(*k).is_none())
        .collect()
}

/// Validate the `system` section, following a `sys_config_path` indirection
/// when one is given. The loaded file must satisfy the same required set.
pub fn validate_system(raw: &Value) -> Result<SystemSettings, PipelineError> {
    let loaded;
    let raw = if let Some(path) = raw.get("sys_config_path") {
        let path: PathBuf = serde_yaml::from_value(path.clone())
            .map_err(|e| PipelineError::Config(format!("invalid sys_config_path: {e}")))?;
        if !path.exists() {
            return Err(PipelineError::Config(format!(
                "system config path {} is not real",
                path.display()
            )));
        }
        let text = fs::read_to_string(&path)
            .map_err(|e| PipelineError::Config(format!("cannot read {}: {e}", path.display())))?;
        loaded = serde_yaml::from_str::<Value>(&text)
            .map_err(|e| PipelineError::Config(format!("cannot parse {}: {e}", path.display())))?;
        info!("loaded system config from {}", path.display());
        &loaded
    } else {
        raw
    };

    let missing = missing_fields(raw, REQUIRED_SYSTEM_FIELDS);
    if !missing.is_empty() {
        return Err(PipelineError::MissingFields {
            section: "system",
            fields: missing,
        });
    }
    serde_yaml::from_value(raw.clone())
        .map_err(|e| PipelineError::Config(format!("invalid system section: {e}")))
}

/// Validate the `apps` section against the (run mode, backend) decision
/// table.
pub fn validate_apps(raw: &Value) -> Result<AppsSettings, PipelineError> {
    let missing = missing_fields(raw, &["run", "profiler"]);
    if !missing.is_empty() {
        return Err(PipelineError::MissingFields {
            section: "apps",
            fields: missing,
        });
    }
    let apps: AppsSettings = serde_yaml::from_value(raw.clone())
        .map_err(|e| PipelineError::Config(format!("invalid apps section: {e}")))?;
    let missing = missing_fields(raw, required_apps_fields(apps.run, apps.profiler));
    if !missing.is_empty() {
        return Err(PipelineError::MissingFields {
            section: "apps",
            fields: missing,
        });
    }
    Ok(apps)
}

/// Validate the `tech` section. In new-run mode the characterization config
/// (explicit or defaulted) is loaded, merged under the caller-supplied
/// fields, and checked for the engine's own required set.
pub fn validate_tech(raw: &Value, design_target: &str) -> Result<TechSettings, PipelineError> {
    let missing = missing_fields(raw, &["run"]);
    if !missing.is_empty() {
        return Err(PipelineError::MissingFields {
            section: "tech",
            fields: missing,
        });
    }
    let mut tech: TechSettings = serde_yaml::from_value(raw.clone())
        .map_err(|e| PipelineError::Config(format!("invalid tech section: {e}")))?;

    match tech.run {
        RunMode::New => {
            if tech.array_characterization_config.is_none() {
                let default = default_char_config(design_target)?;
                info!("choosing default tech config: {}", default.display());
                tech.array_characterization_config = Some(default);
            }
        }
        RunMode::Reuse => {
            if tech.array_characterization_result_path.is_none() {
                return Err(PipelineError::MissingFields {
                    section: "tech",
                    fields: vec!["array_characterization_result_path"],
                });
            }
        }
    }

    if let Some(path) = tech.array_characterization_config.clone() {
        if !path.exists() {
            return Err(PipelineError::Config(format!(
                "tech config path {} is not real",
                path.display()
            )));
        }
        let text = fs::read_to_string(&path)
            .map_err(|e| PipelineError::Config(format!("cannot read {}: {e}", path.display())))?;
        let mut chars: ArrayCharConfig = serde_yaml::from_str(&text)
            .map_err(|e| PipelineError::Config(format!("cannot parse {}: {e}", path.display())))?;
        info!("loaded tech config from {}", path.display());

        // caller-supplied fields take precedence over the loaded file
        if tech.associativity.is_some() {
            chars.associativity = tech.associativity;
        }
        if tech.memory_cell_input_file.is_some() {
            chars.memory_cell_input_file = tech.memory_cell_input_file.clone();
        }

        let mut missing = Vec::new();
        if chars.associativity.is_none() {
            missing.push("associativity");
        }
        if chars.memory_cell_input_file.is_none() {
            missing.push("memory_cell_input_file");
        }
        if !missing.is_empty() {
            return Err(PipelineError::MissingFields {
                section: "tech",
                fields: missing,
            });
        }
        tech.char_config = Some(chars);
    }
    Ok(tech)
}

fn default_char_config(design_target: &str) -> Result<PathBuf, PipelineError> {
    if design_target == "cache" {
        Ok(SAMPLE_CACHE_CONFIG.into())
    } else {
        Err(PipelineError::Config(format!(
            "unsupported design target `{design_target}`: only `cache` has a default characterization config"
        )))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    fn section(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn apps_decision_table_accepts_minimal_sets() {
        let cases = [
            "run: new\nprofiler: dynamorio\nexecutable: a.out\n",
            "run: new\nprofiler: sniper\nlevel: \"3\"\nexecutable: a.out\nconfig: s.cfg\n",
            "run: new\nprofiler: perf\nlevel: l1\nexecutable: a.out\n",
            "run: reuse\nprofiler: sniper\npatternconfig_path: p.json\n",
        ];
        for yaml in cases {
            validate_apps(&section(yaml)).unwrap();
        }
    }

    #[test]
    fn apps_decision_table_rejects_proper_subsets() {
        // dropping any single required field must name it in the report
        let minimal: &[(&str, &[&str])] = &[
            ("run: new\nprofiler: dynamorio\n", &["executable"]),
            (
                "run: new\nprofiler: sniper\n",
                &["level", "executable", "config"],
            ),
            ("run: new\nprofiler: perf\n", &["level", "executable"]),
            ("run: reuse\nprofiler: perf\n", &["patternconfig_path"]),
        ];
        for (base, required) in minimal {
            for dropped in required.iter() {
                let mut yaml = base.to_string();
                for field in required.iter().filter(|f| f != &dropped) {
                    yaml.push_str(&format!("{field}: x\n"));
                }
                match validate_apps(&section(&yaml)) {
                    Err(PipelineError::MissingFields { section, fields }) => {
                        assert_eq!(section, "apps");
                        assert!(fields.contains(dropped));
                    }
                    other => panic!("expected MissingFields, got {other:?}"),
                }
            }
        }
    }

    #[test]
    fn apps_requires_run_and_profiler() {
        match validate_apps(&section("executable: a.out\n")) {
            Err(PipelineError::MissingFields { fields, .. }) => {
                assert_eq!(fields, vec!["run", "profiler"]);
            }
            other => panic!("expected MissingFields, got {other:?}"),
        }
    }

    #[test]
    fn system_requires_core_fields() {
        match validate_system(&section("design_target: cache\n")) {
            Err(PipelineError::MissingFields { section, fields }) => {
                assert_eq!(section, "system");
                assert_eq!(fields, vec!["capacity", "word_width"]);
            }
            other => panic!("expected MissingFields, got {other:?}"),
        }
        let sys = validate_system(&section(
            "design_target: cache\ncapacity:\n  value: 64\n  unit: KB\nword_width: 64\n",
        ))
        .unwrap();
        assert_eq!(sys.design_target, "cache");
        assert_eq!(sys.capacity.value, 64.0);
    }

    #[test]
    fn tech_reuse_requires_result_path() {
        match validate_tech(&section("run: reuse\n"), "cache") {
            Err(PipelineError::MissingFields { section, fields }) => {
                assert_eq!(section, "tech");
                assert_eq!(fields, vec!["array_characterization_result_path"]);
            }
            other => panic!("expected MissingFields, got {other:?}"),
        }
        validate_tech(
            &section("run: reuse\narray_characterization_result_path: r.yaml\n"),
            "cache",
        )
        .unwrap();
    }

    #[test]
    fn tech_new_merges_caller_fields_over_file() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("char.yaml");
        let mut f = std::fs::File::create(&path)?;
        writeln!(f, "Associativity: 8")?;
        writeln!(f, "MemoryCellInputFile: cells/FeFET.cell")?;
        writeln!(f, "Temperature: 350")?;

        let yaml = format!(
            "run: new\narray_characterization_config: {}\nassociativity: 4\n",
            path.display()
        );
        let tech = validate_tech(&section(&yaml), "cache")?;
        let chars = tech.char_config.unwrap();
        assert_eq!(chars.associativity, Some(4));
        assert_eq!(
            chars.memory_cell_input_file.as_deref(),
            Some(std::path::Path::new("cells/FeFET.cell"))
        );
        // unknown engine fields pass through
        assert!(chars.extra.contains_key("Temperature"));
        Ok(())
    }

    #[test]
    fn tech_new_rejects_incomplete_merged_config() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("char.yaml");
        std::fs::write(&path, "Associativity: 8\n")?;
        let yaml = format!(
            "run: new\narray_characterization_config: {}\n",
            path.display()
        );
        match validate_tech(&section(&yaml), "cache") {
            Err(PipelineError::MissingFields { section, fields }) => {
                assert_eq!(section, "tech");
                assert_eq!(fields, vec!["memory_cell_input_file"]);
            }
            other => panic!("expected MissingFields, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn tech_default_rejects_unsupported_target() {
        match validate_tech(&section("run: new\n"), "scratchpad") {
            Err(PipelineError::Config(msg)) => assert!(msg.contains("scratchpad")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn dynamorio_with_cache_target_is_rejected() {
        let raw = section(
            "system:\n  design_target: cache\n  capacity: {value: 64}\n  word_width: 64\n\
             apps:\n  run: new\n  profiler: dynamorio\n  executable: a.out\n\
             tech:\n  run: reuse\n  array_characterization_result_path: r.yaml\n",
        );
        match Settings::from_value(&raw) {
            Err(PipelineError::Config(msg)) => assert!(msg.contains("cache modeling")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn missing_top_level_section_is_fatal() {
        let raw = section("system:\n  design_target: cache\n");
        match Settings::from_value(&raw) {
            Err(PipelineError::Config(msg)) => assert!(msg.contains("apps")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }
}
