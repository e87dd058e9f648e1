//! Composition contracts between the lifecycle coordinator and the module
//! host.
//!
//! The coordinator never builds a service itself. It asks a [`Composer`] to
//! turn a [`Manifest`] into a running [`ServiceInstance`] and then drives that
//! instance through start, module initialization and stop.

mod error;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::logging::{ConsoleSink, FormatterConfig, LogSink, Logger};
use crate::manifest::Manifest;

pub use error::{CompositionError, InstanceError, ModuleError};

/// Options handed to the composer alongside the manifest.
#[derive(Clone)]
pub struct CompositionOptions {
    /// Base path module descriptors resolve against.
    pub relative_to: PathBuf,
    pub log_formatting: FormatterConfig,
    pub log_sink: Arc<dyn LogSink>,
}

impl CompositionOptions {
    pub fn new(relative_to: impl Into<PathBuf>) -> Self {
        Self {
            relative_to: relative_to.into(),
            log_formatting: FormatterConfig::default(),
            log_sink: Arc::new(ConsoleSink),
        }
    }

    pub fn with_log_formatting(mut self, formatting: FormatterConfig) -> Self {
        self.log_formatting = formatting;
        self
    }

    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = sink;
        self
    }

    pub fn logger(&self) -> Logger {
        Logger::new(self.log_formatting.clone(), self.log_sink.clone())
    }
}

impl std::fmt::Debug for CompositionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositionOptions")
            .field("relative_to", &self.relative_to)
            .field("log_formatting", &self.log_formatting)
            .finish_non_exhaustive()
    }
}

/// Bound given to [`ServiceInstance::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopOptions {
    pub timeout: Duration,
}

impl StopOptions {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

/// How a stop request finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// In-flight work drained within the bound.
    Graceful,
    /// The bound was reached and remaining work was aborted.
    TimedOut,
}

/// Static facts about a composed service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub uri: String,
    pub version: String,
}

/// Post-start initialization capability exposed by the module system.
#[async_trait]
pub trait ModuleSystem: Send + Sync {
    async fn start_module(&self) -> Result<(), ModuleError>;
}

/// The live service produced by composition.
#[async_trait]
pub trait ServiceInstance: Send + Sync {
    fn info(&self) -> ServiceInfo;

    /// Names of the registered modules, in registration order.
    fn registrations(&self) -> Vec<String>;

    fn log(&self, tags: &[&str], message: &str);

    fn module_system(&self) -> Option<Arc<dyn ModuleSystem>>;

    /// Begins accepting connections.
    async fn start(&self) -> Result<(), InstanceError>;

    /// Stops accepting new work and finishes or aborts in-flight work within
    /// `options.timeout`.
    async fn stop(&self, options: StopOptions) -> StopOutcome;
}

/// Builds a [`ServiceInstance`] from a manifest.
#[async_trait]
pub trait Composer: Send + Sync {
    async fn compose(
        &self,
        manifest: &Manifest,
        options: &CompositionOptions,
    ) -> Result<Arc<dyn ServiceInstance>, CompositionError>;
}
