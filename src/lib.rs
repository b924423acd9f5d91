pub mod commands;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

use tracing::{error, info};

use crate::commands::AppState;
use crate::services::settings_service::SettingsService;

pub fn run() {
    if let Err(error) = try_run() {
        eprintln!("failed to launch pool-scenes: {error}");
        std::process::exit(1);
    }
}

fn try_run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = SettingsService::from_env()?;
    crate::utils::logger::init_logging(settings.log_dir.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("pool-scenes")
        .build()?;

    runtime.block_on(async move {
        info!(
            target: "app::config",
            base_url = %settings.base_url,
            timezone = ?settings.timezone,
            "starting scene scheduler"
        );

        let state = AppState::new(settings)?;
        let scheduler = state.scheduler();
        let handle = scheduler.start()?;

        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(target: "app::scheduler", error = %err, "failed to listen for shutdown signal");
        }

        info!(target: "app::scheduler", "shutdown requested");
        handle.shutdown().await;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
