//! Default composer: builds an axum service out of registered modules.

pub mod builtin;
pub mod registry;
pub mod request_log;

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::{middleware, Router};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::compose::{
    Composer, CompositionError, CompositionOptions, InstanceError, ModuleError, ModuleSystem,
    ServiceInfo, ServiceInstance, StopOptions, StopOutcome,
};
use crate::logging::Logger;
use crate::manifest::{Manifest, ServerOptions};

pub use registry::{GatewayModule, ModuleContext, ModuleFactory, ModuleRegistry};

/// Resolves manifest entries against a [`ModuleRegistry`].
#[derive(Debug, Clone)]
pub struct HostComposer {
    registry: ModuleRegistry,
}

impl HostComposer {
    pub fn new(registry: ModuleRegistry) -> Self {
        Self { registry }
    }

    pub fn with_builtins() -> Self {
        Self::new(ModuleRegistry::with_builtins())
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }
}

#[async_trait]
impl Composer for HostComposer {
    async fn compose(
        &self,
        manifest: &Manifest,
        options: &CompositionOptions,
    ) -> Result<Arc<dyn ServiceInstance>, CompositionError> {
        let logger = options.logger();
        let mut seen = HashSet::new();
        let mut modules = Vec::with_capacity(manifest.modules.len());

        for descriptor in &manifest.modules {
            let name = descriptor.name.clone();
            if !seen.insert(name.clone()) {
                return Err(CompositionError::DuplicateModule { module: name });
            }

            let factory = self
                .registry
                .get(&name)
                .ok_or_else(|| CompositionError::ModuleNotFound {
                    module: name.clone(),
                })?;

            let ctx = ModuleContext {
                descriptor,
                relative_to: &options.relative_to,
                logger: logger.clone(),
            };
            let module = factory(&ctx).map_err(|source| CompositionError::ModuleFailed {
                module: name.clone(),
                source,
            })?;

            tracing::debug!(module = %name, "module composed");
            modules.push((name, module));
        }

        Ok(Arc::new(HostedService::new(
            manifest.server.clone(),
            ModuleChain { modules },
            logger,
        )))
    }
}

/// Runs `start_module` on every module in manifest order, stopping at the
/// first failure.
pub struct ModuleChain {
    modules: Vec<(String, Arc<dyn GatewayModule>)>,
}

impl ModuleChain {
    fn names(&self) -> Vec<String> {
        self.modules.iter().map(|(name, _)| name.clone()).collect()
    }

    fn router(&self) -> Router {
        self.modules
            .iter()
            .fold(Router::new(), |router, (_, module)| router.merge(module.routes()))
    }
}

#[async_trait]
impl ModuleSystem for ModuleChain {
    async fn start_module(&self) -> Result<(), ModuleError> {
        for (name, module) in &self.modules {
            tracing::debug!(module = %name, "initializing module");
            module
                .start_module()
                .await
                .map_err(|source| ModuleError::Failed {
                    module: name.clone(),
                    source,
                })?;
        }
        Ok(())
    }
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// A composed axum service. Bound on [`start`](ServiceInstance::start),
/// drained on [`stop`](ServiceInstance::stop).
pub struct HostedService {
    server: ServerOptions,
    modules: Arc<ModuleChain>,
    logger: Logger,
    router: Mutex<Option<Router>>,
    local_addr: OnceLock<SocketAddr>,
    shutdown: CancellationToken,
    serving: Mutex<Option<JoinHandle<std::io::Result<()>>>>,
}

impl HostedService {
    fn new(server: ServerOptions, modules: ModuleChain, logger: Logger) -> Self {
        let router = modules
            .router()
            .fallback(not_found)
            .layer(middleware::from_fn_with_state(
                logger.clone(),
                request_log::log_requests,
            ));

        Self {
            server,
            modules: Arc::new(modules),
            logger,
            router: Mutex::new(Some(router)),
            local_addr: OnceLock::new(),
            shutdown: CancellationToken::new(),
            serving: Mutex::new(None),
        }
    }

    /// Address actually bound, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }
}

#[async_trait]
impl ServiceInstance for HostedService {
    fn info(&self) -> ServiceInfo {
        let authority = match self.local_addr() {
            Some(addr) => addr.to_string(),
            None => self.server.address(),
        };
        ServiceInfo {
            uri: format!("http://{authority}"),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    fn registrations(&self) -> Vec<String> {
        self.modules.names()
    }

    fn log(&self, tags: &[&str], message: &str) {
        self.logger.log(tags, message);
    }

    fn module_system(&self) -> Option<Arc<dyn ModuleSystem>> {
        let system: Arc<dyn ModuleSystem> = self.modules.clone();
        Some(system)
    }

    async fn start(&self) -> Result<(), InstanceError> {
        let mut slot = self.router.lock().await;
        let router = slot.take().ok_or(InstanceError::AlreadyStarted)?;

        let address = self.server.address();
        let bound = match TcpListener::bind(&address).await {
            Ok(listener) => listener.local_addr().map(|addr| (listener, addr)),
            Err(e) => Err(e),
        };
        let (listener, addr) = match bound {
            Ok(bound) => bound,
            Err(source) => {
                // 바인드 실패 시 다시 시도할 수 있도록 라우터 복원
                *slot = Some(router);
                return Err(InstanceError::Bind { address, source });
            }
        };
        // 라우터 슬롯이 한 번만 비워지므로 주소도 한 번만 기록됨
        if let Err(previous) = self.local_addr.set(addr) {
            tracing::debug!("Bound address already recorded as {}", previous);
        }

        let token = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
        });
        *self.serving.lock().await = Some(handle);

        tracing::info!("Listening on {}", addr);
        Ok(())
    }

    async fn stop(&self, options: StopOptions) -> StopOutcome {
        self.shutdown.cancel();

        let Some(mut handle) = self.serving.lock().await.take() else {
            return StopOutcome::Graceful;
        };

        match tokio::time::timeout(options.timeout, &mut handle).await {
            Ok(Ok(Ok(()))) => StopOutcome::Graceful,
            Ok(Ok(Err(e))) => {
                tracing::warn!("Listener exited with error: {}", e);
                StopOutcome::Graceful
            }
            Ok(Err(e)) => {
                tracing::warn!("Listener task failed: {}", e);
                StopOutcome::Graceful
            }
            Err(_) => {
                handle.abort();
                StopOutcome::TimedOut
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{FormatterConfig, MemorySink};
    use crate::manifest::ModuleDescriptor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn options() -> CompositionOptions {
        CompositionOptions::new(".")
            .with_log_formatting(FormatterConfig::plain())
            .with_log_sink(Arc::new(MemorySink::new()))
    }

    fn loopback() -> ServerOptions {
        ServerOptions {
            host: "127.0.0.1".to_string(),
            port: 0,
        }
    }

    #[tokio::test]
    async fn unknown_module_is_named() {
        let manifest = Manifest::default().with_module(ModuleDescriptor::new("telemetry"));
        let err = HostComposer::with_builtins()
            .compose(&manifest, &options())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CompositionError::ModuleNotFound { .. }));
        assert_eq!(err.module(), "telemetry");
    }

    #[tokio::test]
    async fn duplicate_module_is_rejected() {
        let manifest = Manifest::default()
            .with_module(ModuleDescriptor::new("health"))
            .with_module(ModuleDescriptor::new("health"));
        let err = HostComposer::with_builtins()
            .compose(&manifest, &options())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CompositionError::DuplicateModule { .. }));
    }

    #[tokio::test]
    async fn factory_failure_is_wrapped() {
        let manifest = Manifest::default().with_module(ModuleDescriptor::new("static"));
        let err = HostComposer::with_builtins()
            .compose(&manifest, &options())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CompositionError::ModuleFailed { .. }));
        assert_eq!(err.module(), "static");
    }

    #[tokio::test]
    async fn modules_initialize_in_manifest_order() {
        struct Counting {
            order: Arc<AtomicUsize>,
            seen_at: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl GatewayModule for Counting {
            async fn start_module(&self) -> anyhow::Result<()> {
                let at = self.order.fetch_add(1, Ordering::SeqCst);
                self.seen_at.store(at, Ordering::SeqCst);
                Ok(())
            }
        }

        let order = Arc::new(AtomicUsize::new(0));
        let first = Arc::new(AtomicUsize::new(usize::MAX));
        let second = Arc::new(AtomicUsize::new(usize::MAX));

        let mut registry = ModuleRegistry::new();
        for (name, seen_at) in [("first", first.clone()), ("second", second.clone())] {
            let order = order.clone();
            registry.register(name, move |_| {
                Ok(Arc::new(Counting {
                    order: order.clone(),
                    seen_at: seen_at.clone(),
                }) as Arc<dyn GatewayModule>)
            });
        }

        let manifest = Manifest::default()
            .with_module(ModuleDescriptor::new("second"))
            .with_module(ModuleDescriptor::new("first"));
        let instance = HostComposer::new(registry)
            .compose(&manifest, &options())
            .await
            .unwrap();

        assert_eq!(instance.registrations(), vec!["second", "first"]);
        instance.module_system().unwrap().start_module().await.unwrap();
        assert_eq!(second.load(Ordering::SeqCst), 0);
        assert_eq!(first.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn start_twice_is_rejected_and_stop_is_graceful() {
        let manifest = Manifest::default()
            .with_server(loopback())
            .with_module(ModuleDescriptor::new("health"));
        let instance = HostComposer::with_builtins()
            .compose(&manifest, &options())
            .await
            .unwrap();

        instance.start().await.unwrap();
        let uri = instance.info().uri;
        assert!(uri.starts_with("http://127.0.0.1:"));
        assert!(!uri.ends_with(":0"));
        assert!(matches!(
            instance.start().await,
            Err(InstanceError::AlreadyStarted)
        ));
        // 두 번째 start가 기록된 주소를 바꾸지 않음
        assert_eq!(instance.info().uri, uri);

        let outcome = instance
            .stop(StopOptions::new(Duration::from_secs(5)))
            .await;
        assert_eq!(outcome, StopOutcome::Graceful);
    }

    #[tokio::test]
    async fn stop_before_start_is_graceful() {
        let instance = HostComposer::with_builtins()
            .compose(&Manifest::default(), &options())
            .await
            .unwrap();
        let outcome = instance
            .stop(StopOptions::new(Duration::from_millis(10)))
            .await;
        assert_eq!(outcome, StopOutcome::Graceful);
    }
}
