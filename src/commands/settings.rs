use crate::error::{EngineError, Result};
use crate::models::cache::TtlClass;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SETTINGS_SCHEMA_VERSION: i64 = 1;

/// Typed view of the settings file used to construct a `DashboardEngine`.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub cache_capacity: usize,
    pub raw_record_ttl: Duration,
    pub aggregate_ttl: Duration,
    pub search_index_ttl: Duration,
    pub slow_query_threshold: Duration,
    pub slow_query_log_size: usize,
    pub default_page_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_settings(&default_settings())
    }
}

impl EngineConfig {
    pub fn from_settings(settings: &Value) -> Self {
        let read = |key: &str, default: u64| {
            settings.get(key).and_then(Value::as_u64).unwrap_or(default)
        };
        Self {
            cache_capacity: read("cacheCapacity", 100) as usize,
            raw_record_ttl: Duration::from_secs(read("rawRecordTtlSecs", 60)),
            aggregate_ttl: Duration::from_secs(read("aggregateTtlSecs", 300)),
            search_index_ttl: Duration::from_secs(read("searchIndexTtlSecs", 600)),
            slow_query_threshold: Duration::from_millis(read("slowQueryThresholdMs", 100)),
            slow_query_log_size: read("slowQueryLogSize", 10) as usize,
            default_page_size: read("defaultPageSize", 20) as usize,
        }
    }

    pub fn ttl_for(&self, class: TtlClass) -> Duration {
        match class {
            TtlClass::RawRecords => self.raw_record_ttl,
            TtlClass::Aggregate => self.aggregate_ttl,
            TtlClass::SearchIndex => self.search_index_ttl,
        }
    }
}

/// Effective engine configuration for a data directory, creating the settings
/// file with defaults on first use.
pub fn load_engine_config(data_dir: &str) -> Result<EngineConfig> {
    let settings = load_settings(data_dir).map_err(EngineError::Configuration)?;
    Ok(EngineConfig::from_settings(&settings))
}

/// Stored settings with defaults filled in and values clamped. The file is
/// rewritten only when normalization changed it. A file that is not valid JSON
/// is reported and left untouched.
pub fn load_settings(data_dir: &str) -> std::result::Result<Value, String> {
    let file = SettingsFile::in_dir(data_dir);
    let stored = file.read()?;
    let settings = normalize(stored.clone().unwrap_or_else(|| json!({})));
    if stored.as_ref() != Some(&settings) {
        file.write(&settings)?;
    }
    Ok(settings)
}

/// Applies a partial update (top-level keys replace stored ones) and persists it.
pub fn save_settings(data_dir: &str, update: &Value) -> std::result::Result<Value, String> {
    let Some(update) = update.as_object() else {
        return Err("Settings update must be a JSON object".to_string());
    };

    let file = SettingsFile::in_dir(data_dir);
    let mut settings = match normalize(file.read()?.unwrap_or_else(|| json!({}))) {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    for (key, value) in update {
        settings.insert(key.clone(), value.clone());
    }

    let settings = normalize(Value::Object(settings));
    file.write(&settings)?;
    Ok(settings)
}

/// `.coopdash/settings.json` under a data directory.
struct SettingsFile {
    path: PathBuf,
}

impl SettingsFile {
    fn in_dir(data_dir: &str) -> Self {
        Self {
            path: Path::new(data_dir).join(".coopdash").join("settings.json"),
        }
    }

    /// `None` when the file does not exist yet.
    fn read(&self) -> std::result::Result<Option<Value>, String> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .map_err(|e| format!("Failed to read {}: {e}", self.path.display()))?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| format!("{} is not valid JSON: {e}", self.path.display()))
    }

    fn write(&self, settings: &Value) -> std::result::Result<(), String> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| format!("Failed to create {}: {e}", dir.display()))?;
        }
        let raw = serde_json::to_string_pretty(settings)
            .map_err(|e| format!("Failed to serialize settings: {e}"))?;
        fs::write(&self.path, raw)
            .map_err(|e| format!("Failed to write {}: {e}", self.path.display()))?;
        log::debug!("settings written to {}", self.path.display());
        Ok(())
    }
}

/// Key, inclusive bounds and default for every numeric setting.
const LIMITS: [(&str, u64, u64, u64); 7] = [
    ("cacheCapacity", 1, 10_000, 100),
    ("rawRecordTtlSecs", 1, 3_600, 60),
    ("aggregateTtlSecs", 1, 86_400, 300),
    ("searchIndexTtlSecs", 1, 86_400, 600),
    ("slowQueryThresholdMs", 1, 60_000, 100),
    ("slowQueryLogSize", 1, 1_000, 10),
    ("defaultPageSize", 1, 100, 20),
];

/// Non-objects become empty objects. Missing or non-numeric values take their
/// default, numbers are clamped, unknown keys are kept.
fn normalize(input: Value) -> Value {
    let mut map = match input {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    for (key, min, max, default) in LIMITS {
        let raw = map.get(key).and_then(Value::as_u64).unwrap_or(default);
        map.insert(key.to_string(), json!(raw.clamp(min, max)));
    }
    map.insert("schema_version".to_string(), json!(SETTINGS_SCHEMA_VERSION));
    Value::Object(map)
}

fn default_settings() -> Value {
    normalize(json!({}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_defaults_and_clamps_out_of_range_values() {
        let migrated = normalize(json!({
            "cacheCapacity": 0,
            "defaultPageSize": 500,
            "aggregateTtlSecs": "soon"
        }));

        assert_eq!(migrated["cacheCapacity"], json!(1));
        assert_eq!(migrated["defaultPageSize"], json!(100));
        assert_eq!(migrated["aggregateTtlSecs"], json!(300));
        assert_eq!(migrated["searchIndexTtlSecs"], json!(600));
        assert_eq!(migrated["schema_version"], json!(SETTINGS_SCHEMA_VERSION));
    }

    #[test]
    fn non_object_settings_are_replaced_by_defaults() {
        let migrated = normalize(json!([1, 2, 3]));
        assert_eq!(EngineConfig::from_settings(&migrated), EngineConfig::default());
    }

    #[test]
    fn partial_update_keeps_other_values_and_unknown_keys() {
        let dir = tempfile::tempdir().expect("temp dir");
        let data_dir = dir.path().to_string_lossy().to_string();

        save_settings(&data_dir, &json!({ "theme": "dark" })).expect("first save");
        let saved = save_settings(&data_dir, &json!({ "cacheCapacity": 8 })).expect("second save");

        assert_eq!(saved["cacheCapacity"], json!(8));
        assert_eq!(saved["rawRecordTtlSecs"], json!(60));
        assert_eq!(saved["theme"], json!("dark"));
    }

    #[test]
    fn rejects_non_object_updates() {
        let dir = tempfile::tempdir().expect("temp dir");
        let data_dir = dir.path().to_string_lossy().to_string();

        assert!(save_settings(&data_dir, &json!([1, 2])).is_err());
        assert!(!SettingsFile::in_dir(&data_dir).path.exists());
    }

    #[test]
    fn invalid_settings_file_is_reported_and_left_untouched() {
        let dir = tempfile::tempdir().expect("temp dir");
        let data_dir = dir.path().to_string_lossy().to_string();
        let path = SettingsFile::in_dir(&data_dir).path;
        fs::create_dir_all(path.parent().expect("settings dir")).expect("create dir");
        fs::write(&path, "{ \"cacheCapacity\": 8,").expect("write broken settings");

        let err = load_engine_config(&data_dir).expect_err("broken file must not load");
        match err {
            EngineError::Configuration(message) => assert!(message.contains("not valid JSON")),
            other => panic!("expected configuration error, got {other:?}"),
        }
        assert!(save_settings(&data_dir, &json!({ "cacheCapacity": 4 })).is_err());
        assert_eq!(
            fs::read_to_string(&path).expect("read settings"),
            "{ \"cacheCapacity\": 8,"
        );
    }

    #[test]
    fn default_config_matches_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.cache_capacity, 100);
        assert_eq!(config.ttl_for(TtlClass::RawRecords), Duration::from_secs(60));
        assert_eq!(config.ttl_for(TtlClass::Aggregate), Duration::from_secs(300));
        assert_eq!(config.ttl_for(TtlClass::SearchIndex), Duration::from_secs(600));
        assert_eq!(config.slow_query_threshold, Duration::from_millis(100));
        assert_eq!(config.slow_query_log_size, 10);
    }

    #[test]
    fn persists_settings_under_data_dir() {
        let dir = tempfile::tempdir().expect("temp dir");
        let data_dir = dir.path().to_string_lossy().to_string();

        let saved = save_settings(&data_dir, &json!({ "slowQueryThresholdMs": 250 }))
            .expect("save settings");
        assert_eq!(saved["slowQueryThresholdMs"], json!(250));
        assert!(SettingsFile::in_dir(&data_dir).path.exists());

        let config = load_engine_config(&data_dir).expect("load config");
        assert_eq!(config.slow_query_threshold, Duration::from_millis(250));
        assert_eq!(config.cache_capacity, 100);
    }
}
