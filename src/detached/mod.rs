//! Fire-and-forget task launching with a mandatory failure observer.
//!
//! [`run_detached`] starts a future on the Tokio runtime and returns
//! immediately. Whatever the future ends with (an error, a panic, or
//! cancellation) is handed to a [`FailureObserver`] instead of vanishing
//! with the task or taking the process down.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::logging::Logger;

/// Why a detached task did not complete successfully.
#[derive(Debug)]
pub enum TaskFailure {
    /// The task returned an error.
    Error(anyhow::Error),
    /// The task panicked. Carries the panic payload when it was a string.
    Panicked(String),
    /// The task was cancelled before completing.
    Cancelled,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFailure::Error(error) => write!(f, "{:#}", error),
            TaskFailure::Panicked(message) => write!(f, "panicked: {}", message),
            TaskFailure::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Process-wide sink for failures of detached tasks.
pub trait FailureObserver: Send + Sync {
    fn observe(&self, task: &str, failure: TaskFailure);
}

/// Reports failures as `[<task>,error]` events.
#[derive(Debug, Clone)]
pub struct LoggingObserver {
    logger: Logger,
}

impl LoggingObserver {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

impl FailureObserver for LoggingObserver {
    fn observe(&self, task: &str, failure: TaskFailure) {
        tracing::error!(task, failure = %failure, "detached task failed");
        self.logger.log(
            &[task, "error"],
            format!("👹 Unobserved failure in detached task: {}", failure),
        );
    }
}

/// Spawns `proc` and returns without waiting for it.
///
/// The returned handle resolves once the outcome has been observed; callers
/// are free to drop it. Must be called from within a Tokio runtime.
pub fn run_detached<F, E>(
    task: &'static str,
    proc: F,
    observer: Arc<dyn FailureObserver>,
) -> JoinHandle<()>
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<anyhow::Error> + Send + 'static,
{
    let inner = tokio::spawn(proc);

    tokio::spawn(async move {
        match inner.await {
            Ok(Ok(())) => {
                tracing::debug!(task, "detached task completed");
            }
            Ok(Err(error)) => observer.observe(task, TaskFailure::Error(error.into())),
            Err(join_error) if join_error.is_panic() => {
                let message = panic_message(join_error.into_panic());
                observer.observe(task, TaskFailure::Panicked(message));
            }
            Err(_) => observer.observe(task, TaskFailure::Cancelled),
        }
    })
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{FormatterConfig, MemorySink};
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    #[derive(Default)]
    struct RecordingObserver {
        seen: Mutex<Vec<String>>,
    }

    impl FailureObserver for RecordingObserver {
        fn observe(&self, task: &str, failure: TaskFailure) {
            self.seen.lock().unwrap().push(format!("{}: {}", task, failure));
        }
    }

    #[tokio::test]
    async fn returns_before_the_procedure_completes() {
        let observer = Arc::new(RecordingObserver::default());
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let (done_tx, done_rx) = oneshot::channel::<()>();

        let handle = run_detached(
            "startup",
            async move {
                let _ = release_rx.await;
                let _ = done_tx.send(());
                Ok::<(), anyhow::Error>(())
            },
            observer.clone(),
        );

        // still parked on the release channel
        assert!(!handle.is_finished());
        release_tx.send(()).unwrap();
        done_rx.await.unwrap();
        handle.await.unwrap();
        assert!(observer.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn errors_reach_the_observer() {
        let observer = Arc::new(RecordingObserver::default());
        run_detached(
            "startup",
            async { Err::<(), _>(anyhow::anyhow!("listener refused")) },
            observer.clone(),
        )
        .await
        .unwrap();

        let seen = observer.seen.lock().unwrap();
        assert_eq!(seen.as_slice(), ["startup: listener refused"]);
    }

    #[tokio::test]
    async fn panics_are_captured_not_propagated() {
        let observer = Arc::new(RecordingObserver::default());
        run_detached(
            "startup",
            async {
                if true {
                    panic!("module table corrupted");
                }
                Ok::<(), anyhow::Error>(())
            },
            observer.clone(),
        )
        .await
        .unwrap();

        let seen = observer.seen.lock().unwrap();
        assert_eq!(seen.as_slice(), ["startup: panicked: module table corrupted"]);
    }

    #[tokio::test]
    async fn logging_observer_emits_error_event() {
        let sink = MemorySink::new();
        let logger = Logger::new(FormatterConfig::plain(), Arc::new(sink.clone()));
        let observer = Arc::new(LoggingObserver::new(logger));

        run_detached("startup", async { Err::<(), _>(anyhow::anyhow!("boom")) }, observer)
            .await
            .unwrap();

        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("ERROR: [startup,error]"));
        assert!(lines[0].ends_with("Unobserved failure in detached task: boom"));
    }
}
