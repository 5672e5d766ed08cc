//! Endpoint agent entrypoint: builds the object catalog from configuration,
//! starts the configured services and runs until Ctrl+C.

use edr_agent::{app::Application, config::AgentConfig, logging::StructuredLogger, object::clear_catalog};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info};

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config_path = std::env::var("EDR_CONFIG_PATH")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::path::PathBuf::from("config.json"));
    let config = AgentConfig::load(&config_path);

    StructuredLogger::init(config.log.json, &config.log.level);

    info!(config = %config_path.display(), objects = config.objects.len(), "EDR agent starting");

    let mut app = Application::new(config);
    if let Err(e) = app.start() {
        error!(code = e.code(), error = %e, "start-up failed");
        clear_catalog();
        return Err(e.into());
    }

    info!("running (Ctrl+C to stop)");
    static STOP: AtomicBool = AtomicBool::new(false);
    let _ = ctrlc::set_handler(|| {
        STOP.store(true, Ordering::Relaxed);
    });
    while !STOP.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(200));
    }

    info!("EDR agent stopping");
    app.shutdown();
    clear_catalog();
    Ok(())
}
