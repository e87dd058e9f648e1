use thiserror::Error;

use super::state_machine::TransitionError;
use crate::compose::{CompositionError, InstanceError, ModuleError};

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("composition failed: {0}")]
    Composition(#[from] CompositionError),

    #[error("failed to install {signal} handler: {source}")]
    Signal {
        signal: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("listener failed to start: {0}")]
    Listener(#[from] InstanceError),

    #[error("module initialization failed: {0}")]
    ModuleInit(#[from] ModuleError),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl LifecycleError {
    /// Whether the process exits instead of continuing without a fully
    /// started service.
    pub fn aborts_process(&self) -> bool {
        matches!(
            self,
            Self::Composition(_) | Self::Signal { .. } | Self::Listener(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_module_init_keeps_process_alive() {
        let composition: LifecycleError = CompositionError::ModuleNotFound {
            module: "metrics".to_string(),
        }
        .into();
        assert!(composition.aborts_process());
        assert_eq!(
            composition.to_string(),
            "composition failed: module 'metrics' is not registered"
        );

        let listener: LifecycleError = InstanceError::AlreadyStarted.into();
        assert!(listener.aborts_process());

        let module: LifecycleError = ModuleError::NotRegistered.into();
        assert!(!module.aborts_process());
    }
}
