use std::sync::Arc;

use gateway_core::config::{GatewayConfig, DEFAULT_LOG_FILTER};
use gateway_core::detached::{run_detached, LoggingObserver};
use gateway_core::host::HostComposer;
use gateway_core::lifecycle::{Collaborators, Coordinator, STARTUP_ERROR_TAGS, STARTUP_FAILURE_EXIT_CODE};
use gateway_core::logging::telemetry;
use gateway_core::manifest::Manifest;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = GatewayConfig::load();
    let filter = cfg
        .as_ref()
        .map(|c| c.logging.filter.clone())
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());
    telemetry::init(&filter);
    let cfg = cfg?;

    tracing::info!("Gateway starting (config dir: {})", cfg.base_dir.display());

    let options = cfg.composition_options();
    let logger = options.logger();

    let manifest = match Manifest::load(&cfg.manifest_path()) {
        Ok(manifest) => manifest,
        Err(e) => {
            logger.log(&STARTUP_ERROR_TAGS, format!("👹 Error starting server: {e}"));
            std::process::exit(STARTUP_FAILURE_EXIT_CODE);
        }
    };

    let composer = Arc::new(HostComposer::with_builtins());
    let coordinator = Coordinator::new(manifest, options, Collaborators::production(composer));

    // 시작 시퀀스는 분리된 태스크에서, 실패는 observer가 기록
    let starter = coordinator.clone();
    run_detached(
        "startup",
        async move { starter.start().await },
        Arc::new(LoggingObserver::new(logger)),
    );

    coordinator.wait_stopped().await;
    Ok(())
}
