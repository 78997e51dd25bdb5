// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! LoRaWAN Broker CLI
//!
//! # Usage
//!
//! ```bash
//! # Run with defaults (port 1882, 300 ms deduplication window)
//! lora-broker
//!
//! # Using configuration file
//! lora-broker --config broker.toml
//!
//! # Override the window
//! lora-broker --config broker.toml --dedup-window-ms 500
//! ```

use clap::{Parser, Subcommand};
use lora_broker::{
    ApplicationConfig, Broker, BrokerConfig, BrokerServer, BrokerStatsSnapshot, Collaborators,
    DeviceConfig, LorawanMic, StaticApplications, StaticNetworkServer,
};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// LoRaWAN broker
#[derive(Parser, Debug)]
#[command(name = "lora-broker")]
#[command(about = "LoRaWAN broker - uplink deduplication and router/handler routing")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// TCP port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind to
    #[arg(short, long)]
    bind: Option<IpAddr>,

    /// Uplink deduplication window (milliseconds)
    #[arg(long)]
    dedup_window_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "broker.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(cmd) = args.command {
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(output),
            Commands::Validate { config } => cmd_validate(config),
        };
    }

    let config = build_config(&args)?;

    let filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let collaborators = Collaborators {
        network_server: Arc::new(StaticNetworkServer::new(config.devices.clone())),
        applications: Arc::new(StaticApplications::new(&config.applications)),
        verifier: Arc::new(LorawanMic),
    };
    let broker = Arc::new(Broker::from_config(&config, collaborators));
    let server = BrokerServer::new(broker.clone(), config.max_message_size);

    info!(
        "{} v{}: {} devices, {} applications, {} ms deduplication window",
        config.name,
        env!("CARGO_PKG_VERSION"),
        config.devices.len(),
        config.applications.len(),
        config.uplink_dedup_window_ms
    );

    if config.stats_interval_secs > 0 {
        let stats_broker = broker.clone();
        let stats_interval = config.stats_interval_secs;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(stats_interval));
            interval.tick().await;
            loop {
                interval.tick().await;
                log_stats(
                    &stats_broker.stats(),
                    stats_broker.routers().connection_count(),
                    stats_broker.handlers().connection_count(),
                );
            }
        });
    }

    let addr = SocketAddr::new(config.bind_address, config.port);
    let server_task = {
        let server = server.clone();
        tokio::spawn(async move { server.run(addr).await })
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Shutting down...");
            server.shutdown();
        }
        result = server_task => {
            if let Err(e) = result? {
                error!("Server error: {}", e);
                return Err(e.into());
            }
        }
    }

    log_stats(
        &broker.stats(),
        broker.routers().connection_count(),
        broker.handlers().connection_count(),
    );
    Ok(())
}

fn build_config(args: &Args) -> Result<BrokerConfig, Box<dyn std::error::Error>> {
    let mut config = match args.config {
        Some(ref path) => BrokerConfig::from_file(path)?,
        None => BrokerConfig::default(),
    };

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(window) = args.dedup_window_ms {
        config.uplink_dedup_window_ms = window;
    }
    if let Some(ref level) = args.log_level {
        config.log_level = level.clone();
    }

    config.validate()?;
    Ok(config)
}

fn cmd_gen_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = BrokerConfig {
        name: "example-broker".into(),
        devices: vec![DeviceConfig {
            dev_addr: "26011A2B".parse()?,
            app_eui: "70B3D57ED0000001".parse()?,
            dev_eui: "0004A30B001C0530".parse()?,
            nwk_s_key: "2B7E151628AED2A6ABF7158809CF4F3C".parse()?,
            f_cnt: 0,
            uses_32bit_f_cnt: true,
            disable_f_cnt_check: false,
        }],
        applications: vec![ApplicationConfig {
            app_eui: "70B3D57ED0000001".parse()?,
            handler_id: "handler-1".into(),
        }],
        ..Default::default()
    };

    let content = format!(
        r#"# LoRaWAN Broker Configuration
# Generated by lora-broker gen-config

{}
"#,
        config.to_toml()?
    );

    std::fs::write(&output, content)?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    match BrokerConfig::from_file(&config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!("Broker: {}", config.name);
            println!("Listen: {}:{}", config.bind_address, config.port);
            println!("Deduplication window: {} ms", config.uplink_dedup_window_ms);
            println!("Devices: {}", config.devices.len());
            for device in &config.devices {
                println!(
                    "  {} -> {} (app {})",
                    device.dev_addr, device.dev_eui, device.app_eui
                );
            }
            println!("Applications: {}", config.applications.len());
            for app in &config.applications {
                println!("  {} -> {}", app.app_eui, app.handler_id);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}

fn log_stats(stats: &BrokerStatsSnapshot, routers: usize, handlers: usize) {
    info!(
        "routers={} handlers={} uplinks: {} received, {} duplicates ({:.2}x), {} forwarded, {} failed; downlinks: {} dispatched, {} failed",
        routers,
        handlers,
        stats.uplinks_received,
        stats.duplicates_absorbed,
        stats.duplication_factor(),
        stats.uplinks_forwarded,
        stats.uplinks_failed,
        stats.downlinks_dispatched,
        stats.downlinks_failed
    );
}
