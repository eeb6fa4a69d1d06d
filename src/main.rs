//! # bfv-link
//!
//! Command line host for the BlueFlyVario.
//!
//! ```bash
//! bfv-link list
//! bfv-link send liftThreshold 0.25
//! bfv-link monitor --send getSettings
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use bfv_link::config::{Config, LoggingConfig};
use bfv_link::protocol::registry::Registry;
use bfv_link::serial::VarioSerial;
use bfv_link::telemetry::decoder::{Decoded, TelemetryDecoder};
use bfv_link::telemetry::locus::LocusDecoder;

/// Prefix of the GPS module sentences
const PMTK_LINE_PREFIX: &str = "$PMTK";

#[derive(Debug, Parser)]
#[command(name = "bfv-link", version, about = "BlueFlyVario command and telemetry link")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial device, overrides the configuration
    #[arg(short, long)]
    port: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Decode telemetry until Ctrl+C
    Monitor {
        /// Commands to send once the port is open, e.g. getSettings
        #[arg(long)]
        send: Vec<String>,
    },
    /// Send one command or parameter value
    Send {
        /// Command or parameter name, e.g. liftThreshold
        name: String,
        /// Parameter value in user units, or command arguments
        value: Option<String>,
    },
    /// List known commands and parameters
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(port) = cli.port {
        config.serial.port = port;
    }

    let _guard = init_logging(&config.logging)?;
    debug!("bfv-link v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::List { json } => list(json),
        Commands::Send { name, value } => {
            let mut registry = Registry::new();
            let frame = build_frame(&mut registry, &name, value.as_deref())?;

            let mut serial = VarioSerial::open(&config.serial)?;
            serial.send_frame(&frame).await?;
            info!("Sent {} to {}", frame.trim_end(), serial.device_path());
            Ok(())
        }
        Commands::Monitor { send } => monitor(&config, &send).await,
    }
}

/// Set up stdout logging, plus a daily log file when configured
///
/// `RUST_LOG` wins over the configured level.
fn init_logging(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&logging.level))?;

    let (file_layer, guard) = match &logging.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "bfv-link.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Serialize a command or parameter write
///
/// A value for a parameter is parsed in user units and range checked; a value
/// for a command replaces its default arguments.
fn build_frame(registry: &mut Registry, name: &str, value: Option<&str>) -> Result<String> {
    if let Some(parameter) = registry.parameter_mut(name) {
        if let Some(value) = value {
            if !parameter.set_value_str(value)? {
                let spec = parameter.spec();
                bail!(
                    "{} out of range for {} (stored {}..={} with factor {})",
                    value,
                    name,
                    spec.min_value,
                    spec.max_value,
                    spec.factor
                );
            }
        }
        return Ok(parameter.serialize()?);
    }

    if let Some(command) = registry.command_mut(name) {
        return match value {
            Some(arguments) if command.spec().accepts_arguments() => {
                Ok(command.serialize_with_arguments(arguments)?)
            }
            Some(_) => bail!("{} takes no arguments", name),
            None => Ok(command.serialize()?),
        };
    }

    bail!("Unknown command or parameter: {}", name)
}

fn list(json: bool) -> Result<()> {
    let registry = Registry::new();

    if json {
        println!("{}", serde_json::to_string_pretty(&registry.listing())?);
        return Ok(());
    }

    println!("Commands:");
    for command in registry.commands() {
        let spec = command.spec();
        println!("  {:<26} {:<10} {}", command.name(), spec.code, spec.description);
    }

    println!("\nParameters:");
    for parameter in registry.parameters() {
        let spec = parameter.spec();
        println!(
            "  {:<26} {:<4} default {:<8} {}",
            parameter.name(),
            spec.command.code,
            parameter.default_value_as_string().unwrap_or_default(),
            spec.command.description
        );
    }

    Ok(())
}

async fn monitor(config: &Config, requests: &[String]) -> Result<()> {
    let mut serial = VarioSerial::open(&config.serial)?;

    let locus = LocusDecoder::with_output_dir(&config.locus.output_dir);
    let mut decoder = TelemetryDecoder::new(locus);
    decoder.set_qnh(config.decoder.qnh_pa);

    for name in requests {
        let frame = build_frame(decoder.registry_mut(), name, None)?;
        serial.send_frame(&frame).await?;
    }

    info!("Monitoring {}, press Ctrl+C to exit", serial.device_path());

    loop {
        tokio::select! {
            line = serial.read_line() => {
                let Some(line) = line? else {
                    debug!("No data within {} ms", config.serial.timeout_ms);
                    continue;
                };

                if !config.locus.enabled && line.starts_with(PMTK_LINE_PREFIX) {
                    continue;
                }

                match decoder.decode_line(&line) {
                    Ok(Decoded::Locus(event)) => info!("GPS log: {:?}", event),
                    Ok(_) => report_changes(&mut decoder),
                    Err(e) => warn!("Failed to decode {:?}: {}", line, e),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    decoder.locus_mut().close_session()?;
    Ok(())
}

fn report_changes(decoder: &mut TelemetryDecoder) {
    if decoder.is_altitude_changed() {
        debug!("Altitude {:.1} m", decoder.altitude());
    }
    if decoder.is_temperature_changed() {
        info!("Temperature {:.1} °C", decoder.temperature());
    }
    if decoder.is_battery_changed() {
        info!("Battery {:.3} V", decoder.battery());
    }
    if decoder.is_hardware_version_changed() {
        info!("Hardware version {}", decoder.hardware_version());
    }
    if decoder.take_parameters_changed() {
        for parameter in decoder.registry().parameters() {
            if let Some(value) = parameter.value_as_string() {
                info!("{} = {}", parameter.name(), value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_send() {
        let args = ["bfv-link", "--port", "/dev/rfcomm0", "send", "liftThreshold", "0.25"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.port.as_deref(), Some("/dev/rfcomm0"));
        match cli.command {
            Commands::Send { name, value } => {
                assert_eq!(name, "liftThreshold");
                assert_eq!(value.as_deref(), Some("0.25"));
            }
            other => panic!("Expected Send, got: {:?}", other),
        }
    }

    #[test]
    fn test_parse_monitor_requests() {
        let args = ["bfv-link", "monitor", "--send", "getSettings", "--send", "queryLocusData"];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Monitor { send } => assert_eq!(send, vec!["getSettings", "queryLocusData"]),
            other => panic!("Expected Monitor, got: {:?}", other),
        }
    }

    #[test]
    fn test_build_parameter_frame() {
        let mut registry = Registry::new();
        assert_eq!(build_frame(&mut registry, "liftThreshold", Some("0.25")).unwrap(), "$BFL 25*");
        assert_eq!(build_frame(&mut registry, "outputQNH", Some("101325")).unwrap(), "$BQH 21325*");
    }

    #[test]
    fn test_build_parameter_frame_out_of_range() {
        let mut registry = Registry::new();
        let err = build_frame(&mut registry, "outputMode", Some("8")).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_build_parameter_frame_not_a_number() {
        let mut registry = Registry::new();
        assert!(build_frame(&mut registry, "volume", Some("loud")).is_err());
    }

    #[test]
    fn test_build_command_frames() {
        let mut registry = Registry::new();
        assert_eq!(build_frame(&mut registry, "getSettings", None).unwrap(), "$BST*");
        assert_eq!(build_frame(&mut registry, "playSound", None).unwrap(), "$BSD 800 500 400 500*");
        assert_eq!(
            build_frame(&mut registry, "playSound", Some("440 100")).unwrap(),
            "$BSD 440 100*"
        );
        assert_eq!(
            build_frame(&mut registry, "queryLocusData", None).unwrap(),
            "$PMTK622,0*28\r\n"
        );
    }

    #[test]
    fn test_build_command_rejects_arguments() {
        let mut registry = Registry::new();
        let err = build_frame(&mut registry, "getSettings", Some("1")).unwrap_err();
        assert!(err.to_string().contains("takes no arguments"));
    }

    #[test]
    fn test_build_unknown_name() {
        let mut registry = Registry::new();
        let err = build_frame(&mut registry, "selfDestruct", None).unwrap_err();
        assert!(err.to_string().contains("selfDestruct"));
    }
}
