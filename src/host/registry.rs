use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use serde::de::DeserializeOwned;

use crate::logging::Logger;
use crate::manifest::ModuleDescriptor;

/// A pluggable unit of the gateway service.
#[async_trait]
pub trait GatewayModule: Send + Sync {
    /// Routes contributed to the service router.
    fn routes(&self) -> Router {
        Router::new()
    }

    /// Runs once after the listener accepts connections.
    async fn start_module(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// What a module factory gets to build its module from.
pub struct ModuleContext<'a> {
    pub descriptor: &'a ModuleDescriptor,
    pub relative_to: &'a Path,
    pub logger: Logger,
}

impl ModuleContext<'_> {
    /// Resolves `path` against the composition base path unless it is
    /// already absolute.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.relative_to.join(path)
        }
    }

    pub fn options<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        Ok(self.descriptor.options()?)
    }
}

pub type ModuleFactory =
    Arc<dyn Fn(&ModuleContext<'_>) -> anyhow::Result<Arc<dyn GatewayModule>> + Send + Sync>;

/// Module name → factory.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    factories: HashMap<String, ModuleFactory>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `health` and `static` modules.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("health", super::builtin::health_module);
        registry.register("static", super::builtin::static_module);
        registry
    }

    /// Registers `factory` under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn(&ModuleContext<'_>) -> anyhow::Result<Arc<dyn GatewayModule>>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(name.to_string(), Arc::new(factory));
        self
    }

    pub fn get(&self, name: &str) -> Option<&ModuleFactory> {
        self.factories.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{FormatterConfig, MemorySink};

    struct Noop;
    impl GatewayModule for Noop {}

    #[test]
    fn builtins_are_registered() {
        let registry = ModuleRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["health", "static"]);
        assert!(!registry.contains("telemetry"));
    }

    #[test]
    fn register_replaces_existing_factory() {
        let mut registry = ModuleRegistry::new();
        registry.register("noop", |_| Ok(Arc::new(Noop) as Arc<dyn GatewayModule>));
        registry.register("noop", |_| anyhow::bail!("replaced"));

        let descriptor = ModuleDescriptor::new("noop");
        let ctx = ModuleContext {
            descriptor: &descriptor,
            relative_to: Path::new("/srv/gateway"),
            logger: Logger::new(FormatterConfig::plain(), Arc::new(MemorySink::new())),
        };
        let factory = registry.get("noop").unwrap();
        assert!(factory(&ctx).is_err());
    }

    #[test]
    fn context_resolves_relative_paths() {
        let descriptor = ModuleDescriptor::new("static");
        let ctx = ModuleContext {
            descriptor: &descriptor,
            relative_to: Path::new("/srv/gateway"),
            logger: Logger::new(FormatterConfig::plain(), Arc::new(MemorySink::new())),
        };
        assert_eq!(ctx.resolve("public"), PathBuf::from("/srv/gateway/public"));
        assert_eq!(ctx.resolve("/var/www"), PathBuf::from("/var/www"));
    }
}
