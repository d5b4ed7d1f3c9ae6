//! TOML configuration. Every field has a default, so an empty or missing
//! file yields a working setup against a server on localhost.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionConfig;
use crate::error::ConfigError;
use crate::series::PlotStyle;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_history_base_url")]
    pub history_base_url: String,
    #[serde(default)]
    pub plot: PlotStyle,
}

fn default_endpoint() -> String {
    String::from("ws://localhost:8001")
}
fn default_idle_timeout_secs() -> u64 {
    5
}
fn default_history_base_url() -> String {
    String::from("http://localhost:8000/")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            idle_timeout_secs: default_idle_timeout_secs(),
            history_base_url: default_history_base_url(),
            plot: PlotStyle::default(),
        }
    }
}

impl Config {
    /// Load from `path`. `None` or a nonexistent file gives the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            idle_timeout: Duration::from_secs(self.idle_timeout_secs.max(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::SplitKind;
    use std::io::Write;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.connection().idle_timeout, Duration::from_secs(5));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = Config::parse(
            r#"
            endpoint = "ws://meter.local:8001"

            [plot]
            style = "total"
            "#,
        )
        .unwrap();
        assert_eq!(config.endpoint, "ws://meter.local:8001");
        assert_eq!(config.idle_timeout_secs, 5);
        assert_eq!(config.plot.split, SplitKind::Total);
        assert!(!config.plot.include_zero);
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "idle_timeout_secs = 9\n[plot]\ninclude_zero = true").unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.idle_timeout_secs, 9);
        assert!(config.plot.include_zero);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "idle_timeout_secs = \"soon\"").unwrap();
        assert!(matches!(
            Config::load(Some(file.path())),
            Err(ConfigError::Parse { .. })
        ));
    }
}
