use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use webwindow_core::geometry::ParseSizeError;
use webwindow_core::{Size, ViewSettings};

pub const ENV_CONFIG: &str = "WEBWINDOW_CONFIG";
pub const ENV_LOG: &str = "WEBWINDOW_LOG";
pub const ENV_DEVTOOLS: &str = "WEBWINDOW_DEVTOOLS";
pub const ENV_DEFAULT_SIZE: &str = "WEBWINDOW_DEFAULT_SIZE";
pub const DEFAULT_LOG_FILTER: &str = "warn";

static GLOBAL: OnceLock<HostConfig> = OnceLock::new();

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{key}: {source}")]
    Size {
        key: &'static str,
        #[source]
        source: ParseSizeError,
    },
    #[error("{key}: expected 1/0 or true/false, got {value:?}")]
    Flag { key: &'static str, value: String },
}

/// Process-wide host settings. Later sources win: defaults, then the JSON file named by
/// `WEBWINDOW_CONFIG`, then the individual environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    pub devtools: bool,
    pub default_size: Option<Size>,
    pub log_filter: Option<String>,
}

impl HostConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match non_empty(lookup(ENV_CONFIG)) {
            Some(path) => Self::load(Path::new(&path))?,
            None => Self::default(),
        };

        if let Some(value) = non_empty(lookup(ENV_DEVTOOLS)) {
            config.devtools = parse_flag(ENV_DEVTOOLS, &value)?;
        }
        if let Some(value) = non_empty(lookup(ENV_DEFAULT_SIZE)) {
            let size = value.parse().map_err(|source| ConfigError::Size {
                key: ENV_DEFAULT_SIZE,
                source,
            })?;
            config.default_size = Some(size);
        }
        if let Some(value) = non_empty(lookup(ENV_LOG)) {
            config.log_filter = Some(value);
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    pub fn view_settings(&self) -> ViewSettings {
        ViewSettings {
            devtools: self.devtools,
            ..ViewSettings::default()
        }
    }
}

/// Loads the configuration once and starts logging with it. A broken configuration is
/// reported and replaced by the defaults.
pub fn global() -> &'static HostConfig {
    GLOBAL.get_or_init(|| {
        let (config, failure) = match HostConfig::from_env() {
            Ok(config) => (config, None),
            Err(error) => (HostConfig::default(), Some(error)),
        };
        init_logging(&config);
        if let Some(error) = failure {
            warn!("ignoring host configuration: {error}");
        }
        debug!("host configuration: {config:?}");
        config
    })
}

pub fn init_logging(config: &HostConfig) {
    let _ = env_logger::Builder::new()
        .parse_filters(config.log_filter())
        .try_init();
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    let trimmed = value.trim();
    if trimmed == "1" || trimmed.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if trimmed == "0" || trimmed.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(ConfigError::Flag {
            key,
            value: value.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        move |key| values.get(key).cloned()
    }

    fn scratch_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "webwindow-config-{}-{name}.json",
            std::process::id()
        ));
        fs::write(&path, contents).expect("scratch config should be writable");
        path
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = HostConfig::from_lookup(lookup(&[])).expect("defaults should load");

        assert_eq!(config, HostConfig::default());
        assert_eq!(config.log_filter(), DEFAULT_LOG_FILTER);
        assert!(!config.view_settings().devtools);
        assert!(config.view_settings().script_enabled);
    }

    #[test]
    fn environment_overrides_are_applied() {
        let config = HostConfig::from_lookup(lookup(&[
            (ENV_DEVTOOLS, "true"),
            (ENV_DEFAULT_SIZE, "1024x768"),
            (ENV_LOG, "webwindow_core=trace"),
        ]))
        .expect("overrides should parse");

        assert!(config.devtools);
        assert_eq!(config.default_size, Some(Size::new(1024, 768)));
        assert_eq!(config.log_filter(), "webwindow_core=trace");
    }

    #[test]
    fn blank_values_are_ignored() {
        let config = HostConfig::from_lookup(lookup(&[(ENV_DEVTOOLS, "  "), (ENV_LOG, "")]))
            .expect("blank values should be skipped");

        assert_eq!(config, HostConfig::default());
    }

    #[test]
    fn bad_values_are_reported() {
        let flag = HostConfig::from_lookup(lookup(&[(ENV_DEVTOOLS, "sometimes")]))
            .expect_err("unknown flag should fail");
        assert!(matches!(flag, ConfigError::Flag { key: ENV_DEVTOOLS, .. }));

        let size = HostConfig::from_lookup(lookup(&[(ENV_DEFAULT_SIZE, "wide")]))
            .expect_err("bad size should fail");
        assert!(matches!(size, ConfigError::Size { key: ENV_DEFAULT_SIZE, .. }));
    }

    #[test]
    fn file_values_sit_under_environment_values() {
        let path = scratch_file(
            "layered",
            r#"{ "devtools": true, "default_size": { "width": 640, "height": 480 } }"#,
        );
        let path_text = path.to_string_lossy().into_owned();

        let config = HostConfig::from_lookup(lookup(&[
            (ENV_CONFIG, path_text.as_str()),
            (ENV_DEVTOOLS, "0"),
        ]))
        .expect("layered config should load");
        let _ = fs::remove_file(&path);

        assert!(!config.devtools);
        assert_eq!(config.default_size, Some(Size::new(640, 480)));
        assert_eq!(config.log_filter, None);
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        let path = scratch_file("unknown", r#"{ "devtool": true }"#);

        let error = HostConfig::load(&path).expect_err("typo should be rejected");
        let _ = fs::remove_file(&path);

        assert!(matches!(error, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let path = std::env::temp_dir().join("webwindow-config-does-not-exist.json");

        let error = HostConfig::load(&path).expect_err("missing file should fail");

        assert!(matches!(error, ConfigError::Read { .. }));
    }
}
