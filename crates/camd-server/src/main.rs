// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! camd camera server
//!
//! Serves the device, media, PTZ and imaging SOAP services over HTTP and
//! answers WS-Discovery probes on 239.255.255.250:3702.
//!
//! # Usage
//!
//! ```bash
//! # Start on the default port (8080) with auto-detected address
//! camd-server
//!
//! # Custom port, fixed advertised address, device identity from a file
//! camd-server --port 80 --advertise 192.168.1.20 --device-config device.json
//!
//! # Full configuration file
//! camd-server --config server.json
//! ```

use clap::Parser;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod config;
mod server;

pub use config::ServerConfig;
pub use server::CameraServer;

/// camd - network camera control services
#[derive(Parser, Debug)]
#[command(name = "camd-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// HTTP port of the SOAP services
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Bind address (0.0.0.0 for all interfaces)
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Configuration file (JSON format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address advertised to clients (auto-detected by default)
    #[arg(long)]
    advertise: Option<Ipv4Addr>,

    /// Device configuration file (JSON object of sections)
    #[arg(long)]
    device_config: Option<PathBuf>,

    /// Disable WS-Discovery
    #[arg(long, default_value = "false")]
    no_discovery: bool,

    /// Require HTTP Basic authentication with this username
    #[arg(long, requires = "password")]
    username: Option<String>,

    /// Password for --username
    #[arg(long, requires = "username")]
    password: Option<String>,

    /// Write the effective configuration to this file and exit
    #[arg(long)]
    dump_config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // try_init also forwards `log` records from the library.
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|e| e as Box<dyn std::error::Error>)?;

    let config = if let Some(config_path) = args.config {
        info!("Loading config from {:?}", config_path);
        ServerConfig::from_file(&config_path)?
    } else {
        ServerConfig {
            bind_address: args.bind,
            port: args.port,
            advertise_address: args.advertise,
            discovery_enabled: !args.no_discovery,
            device_config_path: args.device_config,
            username: args.username,
            password: args.password,
            ..Default::default()
        }
    };

    if let Some(path) = args.dump_config {
        config.to_file(&path)?;
        info!("Configuration written to {:?}", path);
        return Ok(());
    }

    let server = CameraServer::new(config.clone())?;
    let env = server.context().env();

    info!("+----------------------------------------------------+");
    info!(
        "|       camd camera server v{}                    |",
        env!("CARGO_PKG_VERSION")
    );
    info!("+----------------------------------------------------+");
    info!("|  Bind:      {:38} |", format!("{}:{}", config.bind_address, config.port));
    info!("|  Advertise: {:38} |", env.host_ip);
    info!(
        "|  Discovery: {:38} |",
        if config.discovery_enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    info!(
        "|  Auth:      {:38} |",
        config.username.as_deref().map_or("none", |_| "basic")
    );
    info!("+----------------------------------------------------+");

    let server_handle = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received, stopping server...");
        server_handle.shutdown();
    });

    server.run().await?;

    info!("Camera server stopped");
    Ok(())
}
