//! Composition, instance and module-system errors.

/// A module failed to resolve, load or configure during composition.
/// Always names the offending module.
#[derive(thiserror::Error, Debug)]
pub enum CompositionError {
    #[error("module '{module}' is not registered")]
    ModuleNotFound { module: String },

    #[error("module '{module}' is listed more than once in the manifest")]
    DuplicateModule { module: String },

    #[error("module '{module}' failed to load: {source:#}")]
    ModuleFailed {
        module: String,
        #[source]
        source: anyhow::Error,
    },
}

impl CompositionError {
    pub fn module(&self) -> &str {
        match self {
            Self::ModuleNotFound { module }
            | Self::DuplicateModule { module }
            | Self::ModuleFailed { module, .. } => module,
        }
    }
}

/// The composed instance could not begin accepting connections.
#[derive(thiserror::Error, Debug)]
pub enum InstanceError {
    #[error("failed to bind listener on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("service has already been started")]
    AlreadyStarted,
}

/// Post-start module initialization failed.
#[derive(thiserror::Error, Debug)]
pub enum ModuleError {
    #[error("no module system is registered on the service instance")]
    NotRegistered,

    #[error("module '{module}' failed to initialize: {source:#}")]
    Failed {
        module: String,
        #[source]
        source: anyhow::Error,
    },
}
