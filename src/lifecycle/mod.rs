//! Process lifecycle: compose → start → module init → serve → stop → exit.
//!
//! The [`Coordinator`] owns the composed [`ServiceInstance`] for the life of
//! the process. Termination signal handlers are registered once, right after
//! composition succeeds, and all of them funnel into
//! [`Coordinator::stop_service`], which runs the stop sequence at most once.

mod error;
pub mod exit;
pub mod shutdown;
pub mod signals;
pub mod state_machine;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::compose::{
    Composer, CompositionOptions, ModuleError, ServiceInstance, StopOptions, StopOutcome,
};
use crate::logging::Logger;
use crate::machine::{self, MachineFacts, SysinfoFacts};
use crate::manifest::Manifest;

pub use error::LifecycleError;
pub use exit::{ProcessExit, SystemExit, CLEAN_EXIT_CODE, STARTUP_FAILURE_EXIT_CODE};
pub use shutdown::{ShutdownFlag, ShutdownState};
pub use signals::{OsSignals, SignalSource, SignalStream, TerminationSignal};
pub use state_machine::{LifecycleState, StateMachine, TransitionError};

/// Fixed bound handed to [`ServiceInstance::stop`].
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(10_000);

pub const STARTUP_TAGS: [&str; 2] = ["startup", "info"];
pub const STARTUP_ERROR_TAGS: [&str; 2] = ["startup", "error"];
pub const SHUTDOWN_TAGS: [&str; 2] = ["shutdown", "info"];
pub const SHUTDOWN_WARN_TAGS: [&str; 2] = ["shutdown", "warn"];

/// External capabilities the coordinator drives.
#[derive(Clone)]
pub struct Collaborators {
    pub composer: Arc<dyn Composer>,
    pub signals: Arc<dyn SignalSource>,
    pub machine: Arc<dyn MachineFacts>,
    pub exit: Arc<dyn ProcessExit>,
}

impl Collaborators {
    /// OS signals, `sysinfo` machine facts and a real process exit.
    pub fn production(composer: Arc<dyn Composer>) -> Self {
        Self {
            composer,
            signals: Arc::new(OsSignals),
            machine: Arc::new(SysinfoFacts),
            exit: Arc::new(SystemExit),
        }
    }
}

pub struct Coordinator {
    manifest: Manifest,
    options: CompositionOptions,
    collaborators: Collaborators,
    logger: Logger,
    state: StateMachine,
    shutdown: ShutdownFlag,
    instance: Mutex<Option<Arc<dyn ServiceInstance>>>,
}

impl Coordinator {
    pub fn new(
        manifest: Manifest,
        options: CompositionOptions,
        collaborators: Collaborators,
    ) -> Arc<Self> {
        let logger = options.logger();
        Arc::new(Self {
            manifest,
            options,
            collaborators,
            logger,
            state: StateMachine::new(),
            shutdown: ShutdownFlag::new(),
            instance: Mutex::new(None),
        })
    }

    pub fn state(&self) -> LifecycleState {
        self.state.state()
    }

    pub fn shutdown_state(&self) -> ShutdownState {
        self.shutdown.state()
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Resolves once the lifecycle reaches [`LifecycleState::Stopped`].
    pub async fn wait_stopped(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| *state == LifecycleState::Stopped).await;
    }

    /// Runs the startup sequence.
    ///
    /// Startup failures are reported here: one fatal event is logged, the
    /// lifecycle moves to [`LifecycleState::FailedStartup`] and, when
    /// [`LifecycleError::aborts_process`] holds, the process exits with
    /// [`STARTUP_FAILURE_EXIT_CODE`]. The returned error only covers a
    /// coordinator that was already started.
    pub async fn start(self: &Arc<Self>) -> Result<(), LifecycleError> {
        self.state.transition(LifecycleState::Starting)?;

        if let Err(err) = self.run_startup().await {
            if self.shutdown.state() >= ShutdownState::Stopping {
                // 시작 도중 종료 시그널 수신: 종료 시퀀스가 우선
                tracing::debug!("Startup interrupted by shutdown: {}", err);
                return Ok(());
            }
            self.fail_startup(err).await;
        }
        Ok(())
    }

    async fn run_startup(self: &Arc<Self>) -> Result<(), LifecycleError> {
        let instance = self
            .collaborators
            .composer
            .compose(&self.manifest, &self.options)
            .await?;
        *self.instance.lock().await = Some(instance.clone());

        self.install_signal_handlers()?;

        instance.log(&STARTUP_TAGS, "🚀 Starting gateway service instance...");
        instance.start().await?;
        if self.shutdown_requested() {
            return Ok(());
        }
        self.report_started(instance.as_ref()).await;

        instance.log(&STARTUP_TAGS, "📷 Starting module initialization");
        let system = instance.module_system().ok_or(ModuleError::NotRegistered)?;
        system.start_module().await?;
        if self.shutdown_requested() {
            return Ok(());
        }
        instance.log(&STARTUP_TAGS, "📸 Finished module initialization");

        self.state.transition(LifecycleState::Running)?;
        Ok(())
    }

    /// A stop that ran while startup was suspended owns the rest of the
    /// event stream.
    fn shutdown_requested(&self) -> bool {
        let requested = self.shutdown.state() >= ShutdownState::Stopping;
        if requested {
            tracing::debug!("Startup interrupted by shutdown");
        }
        requested
    }

    fn install_signal_handlers(self: &Arc<Self>) -> Result<(), LifecycleError> {
        let mut streams = Vec::with_capacity(TerminationSignal::ALL.len());
        for which in TerminationSignal::ALL {
            let stream = self
                .collaborators
                .signals
                .listen(which)
                .map_err(|source| LifecycleError::Signal {
                    signal: which.name(),
                    source,
                })?;
            streams.push((which, stream));
        }

        self.shutdown.arm();
        for (which, mut stream) in streams {
            let coordinator = Arc::clone(self);
            tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    tracing::info!("Received {}", which.name());
                    coordinator.stop_service().await;
                }
            });
            tracing::debug!("Registered {} handler", which.name());
        }
        Ok(())
    }

    async fn report_started(&self, instance: &dyn ServiceInstance) {
        let info = instance.info();
        let snapshot = machine::snapshot_async(self.collaborators.machine.clone()).await;

        instance.log(&STARTUP_TAGS, "✅ Core server started");
        instance.log(&STARTUP_TAGS, &format!("🌎 {}", info.uri));
        instance.log(
            &STARTUP_TAGS,
            &format!(" > Gateway version: {}", info.version),
        );
        instance.log(
            &STARTUP_TAGS,
            &format!(" > Modules: [{}]", instance.registrations().join(", ")),
        );
        instance.log(
            &STARTUP_TAGS,
            &format!(" > Machine: {}", snapshot.summary()),
        );
    }

    async fn fail_startup(&self, err: LifecycleError) {
        let message = format!("👹 Error starting server: {err}");
        match self.instance.lock().await.clone() {
            Some(instance) => instance.log(&STARTUP_ERROR_TAGS, &message),
            None => self.logger.log(&STARTUP_ERROR_TAGS, &message),
        }
        tracing::error!("Startup failed: {:?}", err);

        if let Err(e) = self.state.transition(LifecycleState::FailedStartup) {
            tracing::warn!("{}", e);
        }
        if err.aborts_process() {
            self.collaborators.exit.exit(STARTUP_FAILURE_EXIT_CODE);
        }
    }

    /// Stops the service and exits with [`CLEAN_EXIT_CODE`]. Only the first
    /// call after signal handlers were registered does anything.
    pub async fn stop_service(&self) {
        if !self.shutdown.begin() {
            tracing::debug!(
                "Ignoring stop request in shutdown state {:?}",
                self.shutdown.state()
            );
            return;
        }
        if let Err(e) = self.state.transition(LifecycleState::Stopping) {
            tracing::warn!("{}", e);
        }

        let instance = self.instance.lock().await.take();
        if let Some(instance) = instance {
            instance.log(&SHUTDOWN_TAGS, "☮︎ Stopping gateway service");
            let outcome = instance.stop(StopOptions::new(SHUTDOWN_TIMEOUT)).await;
            if outcome == StopOutcome::TimedOut {
                instance.log(
                    &SHUTDOWN_WARN_TAGS,
                    &format!(
                        "Stop bound of {}ms reached, in-flight work was aborted",
                        SHUTDOWN_TIMEOUT.as_millis()
                    ),
                );
            }
            instance.log(&SHUTDOWN_TAGS, "⏏︎ Server stopped");
        }

        self.shutdown.finish();
        if let Err(e) = self.state.transition(LifecycleState::Stopped) {
            tracing::warn!("{}", e);
        }
        self.collaborators.exit.exit(CLEAN_EXIT_CODE);
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("state", &self.state())
            .field("shutdown", &self.shutdown_state())
            .field("modules", &self.manifest.module_names())
            .finish_non_exhaustive()
    }
}
