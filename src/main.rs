//! echobench: a concurrent TCP load generator for echo-style services
//!
//! Opens a fixed pool of connections partitioned across workers, drives
//! each through connect/send/recv/close cycles under deadlines, and writes
//! one tab-separated measurement line per operation to a stat file.
//!
//! Features:
//! - Barrier-synchronized worker startup for a consistent test-start instant
//! - Per-connection send quota with forced close/reconnect
//! - Status taxonomy covering timeouts, refusals, lookup failures, and EOF
//! - Optional echo validation (fixed-text or random payloads)
//! - Configuration via CLI arguments or TOML file

mod config;
mod engine;
mod report;

use config::{format_duration, Config};
use report::Sink;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging; --verbose lowers the default floor to debug
    let default_level = if config.verbose {
        "debug"
    } else {
        config.log_level.as_str()
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        addr = %config.addr,
        workers = config.workers,
        connections = config.connections,
        send_per_conn = config.send_per_conn,
        duration = %format_duration(config.duration),
        stat_file = %config.stat_file.display(),
        "Starting echobench"
    );

    // Sink creation is fatal before any worker spawns
    let sink = Sink::create(&config).await?;

    engine::run(config, sink).await?;

    info!("Shutdown");
    Ok(())
}
