pub mod compose;
pub mod config;
pub mod detached;
pub mod host;
pub mod lifecycle;
pub mod logging;
pub mod machine;
pub mod manifest;

pub use compose::{Composer, CompositionOptions, ServiceInstance};
pub use lifecycle::{Collaborators, Coordinator, LifecycleState};
pub use logging::{LogEvent, Logger};
pub use manifest::Manifest;
