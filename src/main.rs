mod broker;
mod config;
mod domain;
mod monitor;
mod notification;
mod storage;

use std::env;
use std::sync::Arc;

use config::Config;
use monitor::Monitor;
use tracing::{Level, error, info};
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";

fn parse_config_path() -> String {
    for arg in env::args().skip(1) {
        if let Some(path) = arg.strip_prefix("--config=") {
            return path.to_string();
        }
    }
    DEFAULT_CONFIG_PATH.to_string()
}

fn init_tracing(log_level: Option<&str>) {
    let level = match log_level {
        Some("debug") => Level::DEBUG,
        Some("info") => Level::INFO,
        Some("warn") | Some("warning") => Level::WARN,
        Some("error") => Level::ERROR,
        Some("trace") => Level::TRACE,
        _ => Level::INFO,
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config_path = parse_config_path();

    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            return;
        }
    };

    init_tracing(config.app.log_level.as_deref());

    let monitor = match Monitor::from_config(config).await {
        Ok(monitor) => Arc::new(monitor),
        Err(e) => {
            eprintln!("Failed to create monitor: {}", e);
            return;
        }
    };

    info!(config = %config_path, "Monitor initialized");

    let runner = {
        let monitor = Arc::clone(&monitor);
        tokio::spawn(async move {
            if let Err(e) = monitor.start().await {
                error!(error = %e, "Monitor error");
            }
        })
    };

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }

    if let Err(e) = monitor.stop().await {
        error!(error = %e, "Error during shutdown");
    }

    let _ = runner.await;
}
