//! sensormcp - serve an environmental CO2 sensor over MCP.
//!
//! Commands:
//! - (default) `serve` - run the server on stdin/stdout
//! - `ports` - list serial ports the sensor could be attached to
//! - `show-config` - print the effective configuration as TOML

#![forbid(unsafe_code)]

mod config;
mod logger;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sensormcp_core::logging::{error, info, targets, warn};
use sensormcp_device::{
    HardwareLink, HardwareTransport, PortDescriptor, SensorEngine, SerialHardware,
};
use sensormcp_server::{LoggingConfig, Server, ServerConfig};

use crate::config::ConfigArgs;
use crate::logger::StderrLoggerBuilder;

const SERVER_NAME: &str = "sensormcp";

const INSTRUCTIONS: &str = "Environmental sensor. Read device://sensor/data or call \
get_sensor_data for the current CO2 level in ppm; the status field tells whether the \
value came from the hardware or was simulated.";

/// sensormcp - serve an environmental CO2 sensor over MCP on stdio.
#[derive(Parser)]
#[command(name = "sensormcp")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP server on stdin/stdout (the default).
    Serve,

    /// List serial ports.
    Ports,

    /// Print the effective configuration as TOML.
    ShowConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    StderrLoggerBuilder::from_config(&LoggingConfig::from_env()).try_init();

    let result = match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => cmd_serve(&cli.config),
        Commands::Ports => cmd_ports(&cli.config),
        Commands::ShowConfig => cmd_show_config(&cli.config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(target: targets::SENSORMCP, "{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn resolve_config(args: &ConfigArgs) -> ServerConfig {
    let (config, failure) = args.resolve();
    if let Some(e) = failure {
        error!(target: targets::SENSORMCP, "{}; continuing with defaults", e);
    }
    config
}

/// Opens the configured hardware, or `None` to run simulated.
fn open_hardware(config: &ServerConfig) -> Option<HardwareLink> {
    if !config.wants_hardware() {
        return None;
    }
    let hardware = SerialHardware::new(config.baud_rate);
    let opened = match &config.serial_port {
        Some(path) => hardware.open(&PortDescriptor {
            path: path.clone(),
            description: "configured".to_string(),
        }),
        None => hardware.open_first(),
    };
    match opened {
        Ok(link) => Some(link),
        Err(e) => {
            warn!(
                target: targets::SENSOR,
                "Hardware unavailable ({}); serving simulated readings",
                e
            );
            None
        }
    }
}

fn cmd_serve(args: &ConfigArgs) -> anyhow::Result<()> {
    let config = resolve_config(args);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;

    let reason = runtime.block_on(async {
        let engine = SensorEngine::new(open_hardware(&config))
            .with_timeout(config.sensor_timeout())
            .with_read_command(config.read_command.as_bytes())
            .with_activity_log(config.activity_log());
        Server::new(SERVER_NAME, env!("CARGO_PKG_VERSION"))
            .config(&config)
            .engine(Arc::new(engine))
            .device_catalog()
            .instructions(INSTRUCTIONS)
            .build()
            .run_stdio()
            .await
    });
    // A blocking stdin read may still be parked; do not wait for it.
    runtime.shutdown_background();

    info!(target: targets::SENSORMCP, "Exiting ({})", reason);
    Ok(())
}

fn cmd_ports(args: &ConfigArgs) -> anyhow::Result<()> {
    let config = resolve_config(args);
    let ports = SerialHardware::new(config.baud_rate)
        .list()
        .context("failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found.");
    }
    for port in ports {
        println!("{}\t{}", port.path, port.description);
    }
    Ok(())
}

fn cmd_show_config(args: &ConfigArgs) -> anyhow::Result<()> {
    let config = resolve_config(args);
    print!("{}", config::render(&config)?);
    Ok(())
}
