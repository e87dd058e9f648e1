use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::compose::CompositionOptions;
use crate::logging::formatter::{DEFAULT_IGNORE, DEFAULT_MESSAGE_FORMAT, DEFAULT_TRANSLATE_TIME};
use crate::logging::{ConsoleSink, FormatterConfig, LogSink, TracingSink};

pub const CONFIG_ENV: &str = "GATEWAY_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/gateway.toml";
pub const DEFAULT_MANIFEST: &str = "manifest.toml";
pub const DEFAULT_LOG_FILTER: &str = "gateway_core=info";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    Console,
    Tracing,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub filter: String,
    pub sink: SinkKind,
    pub colorize: bool,
    pub message_format: String,
    pub translate_time: String,
    pub ignore: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            sink: SinkKind::Console,
            colorize: true,
            message_format: DEFAULT_MESSAGE_FORMAT.to_string(),
            translate_time: DEFAULT_TRANSLATE_TIME.to_string(),
            ignore: DEFAULT_IGNORE.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl LoggingConfig {
    pub fn formatter(&self) -> FormatterConfig {
        let mut formatter = FormatterConfig::default()
            .with_template(&self.message_format)
            .with_ignore(self.ignore.iter().cloned());
        formatter.colorize = self.colorize;
        formatter.translate_time = self.translate_time.clone();
        formatter
    }

    pub fn sink(&self) -> Arc<dyn LogSink> {
        match self.sink {
            SinkKind::Console => Arc::new(ConsoleSink),
            SinkKind::Tracing => Arc::new(TracingSink),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Manifest path, relative to the config file's directory.
    pub manifest: PathBuf,
    pub logging: LoggingConfig,
    /// Directory of the loaded config file.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            manifest: PathBuf::from(DEFAULT_MANIFEST),
            logging: LoggingConfig::default(),
            base_dir: PathBuf::from("."),
        }
    }
}

impl GatewayConfig {
    /// Loads from `$GATEWAY_CONFIG`, or `config/gateway.toml`.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    /// A missing file yields defaults rooted at the file's directory.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let base_dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Config {} not found, using defaults", path.display());
                return Ok(Self {
                    base_dir,
                    ..Self::default()
                });
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let mut cfg: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.base_dir = base_dir;
        Ok(cfg)
    }

    pub fn manifest_path(&self) -> PathBuf {
        if self.manifest.is_absolute() {
            self.manifest.clone()
        } else {
            self.base_dir.join(&self.manifest)
        }
    }

    pub fn composition_options(&self) -> CompositionOptions {
        CompositionOptions::new(&self.base_dir)
            .with_log_formatting(self.logging.formatter())
            .with_log_sink(self.logging.sink())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = GatewayConfig::load_from(&dir.path().join("gateway.toml")).unwrap();
        assert_eq!(cfg.logging, LoggingConfig::default());
        assert_eq!(cfg.manifest_path(), dir.path().join("manifest.toml"));
    }

    #[test]
    fn parses_logging_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        std::fs::write(
            &path,
            r#"
                manifest = "modules.toml"

                [logging]
                sink = "tracing"
                colorize = false
                message_format = "{tags} {data}"
                ignore = ["pid", "hostname", "req"]
            "#,
        )
        .unwrap();

        let cfg = GatewayConfig::load_from(&path).unwrap();
        assert_eq!(cfg.logging.sink, SinkKind::Tracing);
        assert!(!cfg.logging.colorize);
        assert_eq!(cfg.logging.translate_time, DEFAULT_TRANSLATE_TIME);
        assert_eq!(cfg.manifest_path(), dir.path().join("modules.toml"));

        let formatter = cfg.logging.formatter();
        assert!(!formatter.colorize);
        assert!(formatter.ignore.contains("req"));
        assert_eq!(formatter.template.fields().collect::<Vec<_>>(), vec!["tags", "data"]);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        std::fs::write(&path, "[logging]\nsink = \"syslog\"\n").unwrap();

        let err = GatewayConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn composition_options_are_rooted_at_config_dir() {
        let cfg = GatewayConfig {
            base_dir: PathBuf::from("/etc/gateway"),
            ..GatewayConfig::default()
        };
        let options = cfg.composition_options();
        assert_eq!(options.relative_to, PathBuf::from("/etc/gateway"));
        assert!(options.log_formatting.colorize);
    }
}
