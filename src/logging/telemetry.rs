//! Diagnostic tracing setup.
//!
//! Lifecycle events go through [`super::Logger`]; this subscriber carries the
//! internal diagnostics (state transitions, signal registration, module
//! progress). It writes to stderr so stdout stays the event stream.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber. `RUST_LOG` wins over `default_filter`.
///
/// Returns `false` when a subscriber was already installed.
pub fn init(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .is_ok()
}
