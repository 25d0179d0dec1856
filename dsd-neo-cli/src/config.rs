//! TOML config-file loading with an `include` chain, deep-merged onto
//! `dsd_neo_core::config::DecoderOptionsLayer` before CLI flags and the
//! environment are folded in at `main`.

use color_eyre::eyre::{Context, Result};
use dsd_neo_core::config::DecoderOptionsLayer;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};

/// Deep merge JSON values: objects merge key-by-key recursively, anything
/// else (arrays, scalars) is replaced wholesale by the override.
fn merge_json_values(base: &mut JsonValue, override_val: JsonValue) {
    match (base, override_val) {
        (JsonValue::Object(base_map), JsonValue::Object(override_map)) => {
            for (key, value) in override_map {
                if let Some(base_value) = base_map.get_mut(&key) {
                    merge_json_values(base_value, value);
                } else {
                    base_map.insert(key, value);
                }
            }
        }
        (base_val, override_val) => {
            *base_val = override_val;
        }
    }
}

/// Accepts either a single string or an array of strings for `include`.
fn deserialize_include_optional<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrVec {
        String(String),
        Vec(Vec<String>),
    }

    let opt: Option<StringOrVec> = Option::deserialize(deserializer)?;
    match opt {
        None => Ok(Vec::new()),
        Some(StringOrVec::String(s)) => Ok(vec![s]),
        Some(StringOrVec::Vec(v)) => Ok(v),
    }
}

/// A config file's contents: an optional chain of other files to include
/// before this one's own fields are applied, plus a `DecoderOptionsLayer`
/// fragment and CLI-local logging knobs not part of the core's options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_include_optional")]
    pub include: Vec<String>,

    #[serde(flatten)]
    pub options: DecoderOptionsLayer,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging knobs that apply to the CLI's structured-event sink rather than
/// to the decoder core itself, so they live outside `DecoderOptionsLayer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_target")]
    pub target: LogTarget,
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default = "default_log_level")]
    pub level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            target: default_log_target(),
            file_path: None,
            format: default_log_format(),
            level: default_log_level(),
        }
    }
}

fn default_log_target() -> LogTarget {
    LogTarget::Stdout
}

fn default_log_format() -> LogFormat {
    LogFormat::Json
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    Stdout,
    Stderr,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Logfmt,
    Pretty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LoggingConfig {
    /// Bridges into the core's own `EventLoggerConfig`, which drives
    /// `StructuredEventLogger` directly rather than duplicating it here.
    pub fn to_core_event_logger_config(&self) -> dsd_neo_core::logging::EventLoggerConfig {
        use dsd_neo_core::logging::{EventLoggerConfig, LogFormat as CoreFormat, LogLevel as CoreLevel, LogTarget as CoreTarget};

        dsd_neo_core::logging::EventLoggerConfig {
            target: match self.target {
                LogTarget::Stdout => CoreTarget::Stdout,
                LogTarget::Stderr => CoreTarget::Stderr,
                LogTarget::File => CoreTarget::File,
            },
            file_path: self.file_path.clone(),
            format: match self.format {
                LogFormat::Json => CoreFormat::Json,
                LogFormat::Logfmt => CoreFormat::Logfmt,
                LogFormat::Pretty => CoreFormat::Pretty,
            },
            level: match self.level {
                LogLevel::Debug => CoreLevel::Debug,
                LogLevel::Info => CoreLevel::Info,
                LogLevel::Warn => CoreLevel::Warn,
                LogLevel::Error => CoreLevel::Error,
            },
        }
    }
}

impl FileConfig {
    /// Loads a TOML config file, recursively resolving `include` paths
    /// (relative to the including file's directory) before deep-merging
    /// this file's own fields on top with highest priority.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config file: {}", path.display()))?;

        let toml_value: toml::Value =
            toml::from_str(&content).wrap_err("failed to parse TOML configuration")?;
        let mut config_json =
            serde_json::to_value(&toml_value).wrap_err("failed to convert TOML to JSON")?;

        let includes: Vec<String> = match config_json.get("include") {
            Some(JsonValue::String(s)) => vec![s.clone()],
            Some(JsonValue::Array(arr)) => arr.iter().filter_map(|v| v.as_str().map(String::from)).collect(),
            _ => Vec::new(),
        };
        if let JsonValue::Object(ref mut map) = config_json {
            map.remove("include");
        }

        let mut base_json = serde_json::json!({});
        for include_path in &includes {
            let include_full_path = if Path::new(include_path).is_absolute() {
                PathBuf::from(include_path)
            } else {
                path.parent().unwrap_or_else(|| Path::new(".")).join(include_path)
            };
            let included = Self::from_file(&include_full_path)
                .wrap_err_with(|| format!("failed to load included config: {}", include_full_path.display()))?;
            let included_json =
                serde_json::to_value(&included).wrap_err("failed to convert included config to JSON")?;
            merge_json_values(&mut base_json, included_json);
        }
        merge_json_values(&mut base_json, config_json);

        serde_json::from_value(base_json).wrap_err("failed to parse final configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicU32, Ordering};

    static TEST_DIR_COUNTER: AtomicU32 = AtomicU32::new(0);

    fn scratch_dir() -> PathBuf {
        let id = TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("dsd-neo-cli-config-test-{}-{id}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn include_chain_merges_lowest_to_highest_priority() {
        let dir = scratch_dir();

        let base_path = dir.join("base.toml");
        std::fs::File::create(&base_path)
            .unwrap()
            .write_all(b"tg_hold = 100\nhangtime_s = 2.0\n")
            .unwrap();

        let top_path = dir.join("top.toml");
        std::fs::File::create(&top_path)
            .unwrap()
            .write_all(b"include = \"base.toml\"\ntg_hold = 200\n")
            .unwrap();

        let config = FileConfig::from_file(&top_path).unwrap();
        assert_eq!(config.options.tg_hold, Some(200));
        assert_eq!(config.options.hangtime_s, Some(2.0));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn include_accepts_array_of_paths() {
        let dir = scratch_dir();

        std::fs::File::create(dir.join("a.toml"))
            .unwrap()
            .write_all(b"tg_hold = 1\n")
            .unwrap();
        std::fs::File::create(dir.join("b.toml"))
            .unwrap()
            .write_all(b"hangtime_s = 3.0\n")
            .unwrap();

        let top_path = dir.join("top.toml");
        std::fs::File::create(&top_path)
            .unwrap()
            .write_all(b"include = [\"a.toml\", \"b.toml\"]\n")
            .unwrap();

        let config = FileConfig::from_file(&top_path).unwrap();
        assert_eq!(config.options.tg_hold, Some(1));
        assert_eq!(config.options.hangtime_s, Some(3.0));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_include_is_unset_not_error() {
        let dir = scratch_dir();
        let top_path = dir.join("top.toml");
        std::fs::File::create(&top_path).unwrap().write_all(b"tg_hold = 5\n").unwrap();

        let config = FileConfig::from_file(&top_path).unwrap();
        assert!(config.include.is_empty());
        assert_eq!(config.options.tg_hold, Some(5));

        std::fs::remove_dir_all(&dir).ok();
    }
}
