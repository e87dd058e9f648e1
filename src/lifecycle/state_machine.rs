use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    NotStarted,
    Starting,
    Running,
    /// Startup failed; the process may still be serving.
    FailedStartup,
    Stopping,
    Stopped,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid transition: {0:?} -> {1:?}")]
    InvalidTransition(LifecycleState, LifecycleState),
}

pub fn can_transition(from: LifecycleState, to: LifecycleState) -> bool {
    use LifecycleState::*;
    matches!(
        (from, to),
        (NotStarted, Starting)
            | (Starting, Running)
            | (Starting, FailedStartup)
            | (Starting, Stopping)
            | (Running, Stopping)
            | (FailedStartup, Stopping)
            | (Stopping, Stopped)
    )
}

/// Lifecycle state published over a watch channel so callers can await a
/// particular state.
pub struct StateMachine {
    tx: watch::Sender<LifecycleState>,
}

impl Default for StateMachine {
    fn default() -> Self {
        let (tx, _) = watch::channel(LifecycleState::NotStarted);
        Self { tx }
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LifecycleState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.tx.subscribe()
    }

    /// Check-and-set under the channel's write lock.
    pub fn transition(&self, to: LifecycleState) -> Result<(), TransitionError> {
        let mut result = Ok(());
        self.tx.send_if_modified(|state| {
            if can_transition(*state, to) {
                tracing::info!("State transition: {:?} -> {:?}", state, to);
                *state = to;
                true
            } else {
                result = Err(TransitionError::InvalidTransition(*state, to));
                false
            }
        });
        result
    }
}
