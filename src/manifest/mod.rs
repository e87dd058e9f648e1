//! Declarative module manifest.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 9070
//!
//! [[modules]]
//! name = "health"
//! [modules.options]
//! path = "/health"
//! ```
//!
//! The manifest is owned by the caller and only read during composition.
//! Module order is preserved.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9070;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("failed to read manifest '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid manifest: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Listener settings for the composed service.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ServerOptions {
    pub host: String,
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerOptions {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// One module entry: a registered module name plus its free-form options.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ModuleDescriptor {
    pub name: String,
    #[serde(default)]
    pub options: toml::value::Table,
}

impl ModuleDescriptor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            options: toml::value::Table::new(),
        }
    }

    pub fn with_option(mut self, key: &str, value: impl Into<toml::Value>) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }

    /// Deserializes the options table into a module-specific settings type.
    pub fn options<T: DeserializeOwned>(&self) -> Result<T, toml::de::Error> {
        toml::Value::Table(self.options.clone()).try_into()
    }
}

/// Ordered list of modules composing the service.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    #[serde(default)]
    pub server: ServerOptions,
    #[serde(default)]
    pub modules: Vec<ModuleDescriptor>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse()
    }

    pub fn with_module(mut self, descriptor: ModuleDescriptor) -> Self {
        self.modules.push(descriptor);
        self
    }

    pub fn with_server(mut self, server: ServerOptions) -> Self {
        self.server = server;
        self
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name.as_str()).collect()
    }
}

impl FromStr for Manifest {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn parses_server_and_ordered_modules() {
        let manifest: Manifest = r#"
            [server]
            host = "127.0.0.1"
            port = 8080

            [[modules]]
            name = "health"
            [modules.options]
            path = "/healthz"

            [[modules]]
            name = "static"
            [modules.options]
            root = "public"
            mount = "/assets"
        "#
        .parse()
        .unwrap();

        assert_eq!(manifest.server.address(), "127.0.0.1:8080");
        assert_eq!(manifest.module_names(), vec!["health", "static"]);
        assert_eq!(
            manifest.modules[1].options.get("mount").and_then(|v| v.as_str()),
            Some("/assets")
        );
    }

    #[test]
    fn empty_manifest_uses_defaults() {
        let manifest: Manifest = "".parse().unwrap();
        assert_eq!(manifest.server, ServerOptions::default());
        assert!(manifest.modules.is_empty());
    }

    #[test]
    fn typed_options() {
        #[derive(Deserialize)]
        struct HealthOptions {
            path: String,
        }

        let descriptor = ModuleDescriptor::new("health").with_option("path", "/ping");
        let options: HealthOptions = descriptor.options().unwrap();
        assert_eq!(options.path, "/ping");
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Manifest::load(Path::new("./does-not-exist/manifest.toml")).unwrap_err();
        assert!(matches!(err, ManifestError::Read { .. }));
    }
}
