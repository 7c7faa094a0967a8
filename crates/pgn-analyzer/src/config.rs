//! Analysis configuration from a JSON file plus command-line overrides.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::analyzer::AnalysisSettings;
use crate::engine::{SearchBudget, DEFAULT_HANDSHAKE_TIMEOUT};
use crate::error::AnalysisError;

pub const DEFAULT_CONFIG_PATH: &str = "config/lc0_config.json";

const DEFAULT_MAX_CANDIDATES: u64 = 10;

/// Engine options the extractor depends on, with the value sent when the
/// config does not set them.
const VERBOSE_MOVE_STATS: &str = "VerboseMoveStats";
const SHOW_WDL: &str = "UCI_ShowWDL";
const MULTI_PV: &str = "MultiPV";

/// The config file as written on disk.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    lc0_path: PathBuf,
    weights: PathBuf,
    #[serde(default)]
    options: Map<String, Value>,
    #[serde(default)]
    search: SearchSection,
    max_candidates: Option<u64>,
    multipv: Option<u64>,
    #[serde(default)]
    extra_args: Vec<String>,
    handshake_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SearchSection {
    #[serde(rename = "type", default = "default_search_type")]
    kind: String,
    #[serde(default = "default_search_value")]
    value: u64,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            kind: default_search_type(),
            value: default_search_value(),
        }
    }
}

fn default_search_type() -> String {
    "nodes".to_string()
}

fn default_search_value() -> u64 {
    100
}

/// Command-line adjustments applied on top of the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Replaces `extra_args`; `KEY=VALUE` becomes `--KEY=VALUE`, `KEY` becomes `--KEY`.
    pub lc0_args: Option<Vec<String>>,
    /// Appended to `extra_args` as `--KEY=VALUE`.
    pub lc0: Vec<String>,
    /// Dotted `a.b=VALUE` assignments.
    pub set: Vec<String>,
    /// `(kind, value)` for the `search` section.
    pub search: Option<(String, u64)>,
}

#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub lc0_path: PathBuf,
    pub weights: PathBuf,
    /// `setoption` pairs in send order, values already stringified.
    pub options: Vec<(String, String)>,
    pub budget: SearchBudget,
    pub max_candidates: usize,
    pub multipv: u32,
    pub extra_args: Vec<String>,
    pub handshake_timeout: Duration,
}

impl AnalysisConfig {
    /// Read `path`, resolve engine paths against its directory and apply
    /// `overrides`.
    pub fn load(path: &Path, overrides: &ConfigOverrides) -> Result<Self, AnalysisError> {
        let text = fs::read_to_string(path).map_err(|e| {
            AnalysisError::Config(format!("Cannot read config {}: {e}", path.display()))
        })?;
        let raw: Value = serde_json::from_str(&text)
            .map_err(|e| AnalysisError::Config(format!("Invalid config {}: {e}", path.display())))?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        let config = Self::from_value(raw, base, overrides)?;

        info!(
            config = %path.display(),
            lc0 = %config.lc0_path.display(),
            weights = %config.weights.display(),
            budget = %config.budget,
            "Config loaded"
        );
        Ok(config)
    }

    pub fn from_value(
        mut raw: Value,
        base: &Path,
        overrides: &ConfigOverrides,
    ) -> Result<Self, AnalysisError> {
        let root = raw
            .as_object_mut()
            .ok_or_else(|| AnalysisError::Config("Config must be a JSON object".into()))?;
        resolve_paths(root, base);
        apply_overrides(root, overrides)?;

        let file: ConfigFile =
            serde_json::from_value(raw).map_err(|e| AnalysisError::Config(e.to_string()))?;
        Self::from_file(file)
    }

    fn from_file(file: ConfigFile) -> Result<Self, AnalysisError> {
        let option_multipv = match file.options.get(MULTI_PV) {
            Some(value) => Some(option_as_u64(value).ok_or_else(|| {
                AnalysisError::Config(format!("options.{MULTI_PV} must be a number, got {value}"))
            })?),
            None => None,
        };

        let max_candidates = file
            .max_candidates
            .or(option_multipv)
            .or(file.multipv)
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_MAX_CANDIDATES);
        let multipv = option_multipv.or(file.multipv).unwrap_or(max_candidates);
        let multipv = u32::try_from(multipv)
            .map_err(|_| AnalysisError::Config(format!("MultiPV {multipv} is out of range")))?;

        let mut options: Vec<(String, String)> = file
            .options
            .iter()
            .map(|(name, value)| (name.clone(), option_value(value)))
            .collect();
        for (name, default) in [
            (VERBOSE_MOVE_STATS, "true".to_string()),
            (SHOW_WDL, "true".to_string()),
            (MULTI_PV, multipv.to_string()),
        ] {
            if !file.options.contains_key(name) {
                options.push((name.to_string(), default));
            }
        }

        let budget = SearchBudget::from_kind(&file.search.kind, file.search.value).ok_or_else(
            || {
                AnalysisError::Config(format!(
                    "Unknown search type '{}' (expected nodes, movetime, depth or infinite)",
                    file.search.kind
                ))
            },
        )?;
        if budget == SearchBudget::Infinite {
            warn!("Search type 'infinite' never finishes unless the engine stops on its own");
        }

        Ok(Self {
            lc0_path: file.lc0_path,
            weights: file.weights,
            options,
            budget,
            max_candidates: max_candidates as usize,
            multipv,
            extra_args: file.extra_args,
            handshake_timeout: file
                .handshake_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_HANDSHAKE_TIMEOUT),
        })
    }

    /// Command-line arguments for the engine process.
    pub fn engine_args(&self) -> Vec<String> {
        let mut args = vec![format!("--weights={}", self.weights.display())];
        args.extend(self.extra_args.iter().cloned());
        args
    }

    pub fn settings(&self) -> AnalysisSettings {
        AnalysisSettings {
            budget: self.budget,
            max_candidates: self.max_candidates,
            multipv: self.multipv,
        }
    }
}

fn resolve_paths(root: &mut Map<String, Value>, base: &Path) {
    for key in ["lc0_path", "weights"] {
        if let Some(Value::String(target)) = root.get_mut(key) {
            if Path::new(target.as_str()).is_relative() {
                let resolved = base.join(target.as_str());
                *target = resolved.to_string_lossy().into_owned();
            }
        }
    }
}

fn apply_overrides(
    root: &mut Map<String, Value>,
    overrides: &ConfigOverrides,
) -> Result<(), AnalysisError> {
    if let Some(args) = &overrides.lc0_args {
        let args = args.iter().map(|arg| Value::String(engine_flag(arg))).collect();
        root.insert("extra_args".to_string(), Value::Array(args));
    }

    if !overrides.lc0.is_empty() {
        let extra = root
            .entry("extra_args")
            .or_insert_with(|| Value::Array(Vec::new()));
        let Value::Array(extra) = extra else {
            return Err(AnalysisError::Config("extra_args must be a list".into()));
        };
        for pair in &overrides.lc0 {
            let (key, value) = split_assignment(pair)?;
            extra.push(Value::String(format!("--{key}={value}")));
        }
    }

    for assignment in &overrides.set {
        let (key, value) = split_assignment(assignment)?;
        set_dotted(root, key, typed_value(value))?;
    }

    if let Some((kind, value)) = &overrides.search {
        set_dotted(root, "search.type", Value::String(kind.clone()))?;
        set_dotted(root, "search.value", Value::from(*value))?;
    }

    Ok(())
}

fn engine_flag(arg: &str) -> String {
    match arg.split_once('=') {
        Some((key, value)) => format!("--{key}={value}"),
        None => format!("--{arg}"),
    }
}

fn split_assignment(assignment: &str) -> Result<(&str, &str), AnalysisError> {
    assignment.split_once('=').ok_or_else(|| {
        AnalysisError::Config(format!("Invalid override '{assignment}', expected KEY=VALUE"))
    })
}

/// Set `a.b.c` inside `root`, creating intermediate objects.
fn set_dotted(root: &mut Map<String, Value>, key: &str, value: Value) -> Result<(), AnalysisError> {
    let mut parts: Vec<&str> = key.split('.').collect();
    let last = parts.pop().unwrap_or(key);

    let mut current = root;
    for part in parts {
        let next = current
            .entry(part)
            .or_insert_with(|| Value::Object(Map::new()));
        current = next
            .as_object_mut()
            .ok_or_else(|| AnalysisError::Config(format!("Cannot set '{key}': '{part}' is not an object")))?;
    }
    current.insert(last.to_string(), value);
    Ok(())
}

/// Integer, then float, then boolean, then plain string.
fn typed_value(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    if let Some(n) = raw
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
    {
        return Value::Number(n);
    }
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Value::Bool(true),
        "false" | "no" | "0" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

/// UCI text for an option value.
fn option_value(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn option_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
