//! fmtuner-daemon: drives an FM receiver pipeline and scans the band.
//!
//! Thin glue around `fmtuner-core`: parses arguments and the TOML config
//! file, wires up logging, builds a pipeline, and exposes the tuner's
//! start/scan/stop lifecycle as a process.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};
use tokio::sync::broadcast;

use fmtuner_core::{AudioSinkKind, ScanConfig, ScanEvent, SimulatedPipeline, Tuner, TunerConfig};

mod logging;

/// fmtuner-daemon - FM band tuner control daemon
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Frequency to tune at startup (MHz)
    #[arg(short = 'F', long)]
    frequency: Option<f64>,

    /// Configuration file path
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Run a band scan at startup and print discovered stations
    #[arg(long)]
    scan_on_start: bool,

    /// Run a band scan, print discovered stations, then exit
    #[arg(long)]
    scan_only: bool,

    /// Audio sink: alsa, pulse, or null
    #[arg(long)]
    sink: Option<String>,

    /// Directory where log files are stored
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Number of days to keep log files
    #[arg(long, default_value = "7")]
    log_retention_days: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Configuration file format.
#[derive(Debug, serde::Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    tuner: TunerSection,
    #[serde(default)]
    scan: ScanConfig,
    #[serde(default)]
    logging: LoggingSection,
    #[serde(default)]
    simulation: SimulationSection,
}

#[derive(Debug, serde::Deserialize, Default)]
struct TunerSection {
    frequency_mhz: Option<f64>,
    sink: Option<String>,
}

#[derive(Debug, serde::Deserialize, Default)]
struct LoggingSection {
    log_dir: Option<String>,
    retention_days: Option<u64>,
    level: Option<String>,
}

/// Synthetic carriers for the simulated pipeline (no hardware attached).
#[derive(Debug, serde::Deserialize, Default)]
struct SimulationSection {
    #[serde(default)]
    stations: Vec<SimStation>,
}

#[derive(Debug, serde::Deserialize)]
struct SimStation {
    frequency_mhz: f64,
    power: f64,
}

fn load_config(path: &PathBuf) -> Result<ConfigFile, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: ConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

fn parse_sink(name: &str) -> Option<AudioSinkKind> {
    match name.to_ascii_lowercase().as_str() {
        "alsa" => Some(AudioSinkKind::Alsa),
        "pulse" => Some(AudioSinkKind::Pulse),
        "null" => Some(AudioSinkKind::Null),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load config file: explicit path > auto-detect > default
    let config_path = args.config.clone().or_else(|| {
        let default_path = PathBuf::from("fmtuner.toml");
        if default_path.exists() {
            Some(default_path)
        } else {
            None
        }
    });
    let file_config = if let Some(config_path) = &config_path {
        match load_config(config_path) {
            Ok(c) => {
                eprintln!("Loaded config from: {}", config_path.display());
                c
            }
            Err(e) => {
                eprintln!("Failed to load config file: {}", e);
                return Err(e);
            }
        }
    } else {
        ConfigFile::default()
    };

    // Merge logging configs (command line takes precedence)
    let log_dir = if args.log_dir.to_string_lossy() != "logs" {
        args.log_dir.clone()
    } else {
        PathBuf::from(file_config.logging.log_dir.as_deref().unwrap_or("logs"))
    };
    let log_retention_days = if args.log_retention_days != 7 {
        args.log_retention_days
    } else {
        file_config.logging.retention_days.unwrap_or(7)
    };
    logging::init_logging(
        &log_dir,
        log_retention_days,
        args.verbose,
        file_config.logging.level.as_deref(),
    )
    .expect("Failed to initialize logging");

    // Merge tuner settings (command line takes precedence)
    let defaults = TunerConfig::default();
    let initial_frequency_mhz = args
        .frequency
        .or(file_config.tuner.frequency_mhz)
        .unwrap_or(defaults.initial_frequency_mhz);
    let sink = args
        .sink
        .as_deref()
        .or(file_config.tuner.sink.as_deref())
        .map(|name| {
            parse_sink(name).unwrap_or_else(|| {
                warn!("Unknown audio sink '{}', falling back to null", name);
                AudioSinkKind::Null
            })
        })
        .unwrap_or(defaults.sink);
    let scan_config = file_config.scan;

    info!(
        "fmtuner-daemon starting: {:.1} MHz, sink {:?}, band {:.1}-{:.1} MHz",
        initial_frequency_mhz, sink, scan_config.band_start_mhz, scan_config.band_stop_mhz
    );

    // No hardware path in this build: construct the simulated pipeline with
    // any carriers the config defines. Audio is discarded regardless of the
    // configured sink.
    let mut pipeline = SimulatedPipeline::new(initial_frequency_mhz);
    for station in &file_config.simulation.stations {
        pipeline = pipeline.with_station(station.frequency_mhz, station.power);
    }
    let tuner = Tuner::new(Arc::new(pipeline), scan_config);

    tuner.set_frequency_mhz(initial_frequency_mhz)?;

    // The pipeline run loop blocks forever, so it gets its own task.
    let runner = {
        let tuner = Arc::clone(&tuner);
        tokio::spawn(async move {
            if let Err(e) = tuner.run().await {
                error!("Pipeline run failed: {}", e);
            }
        })
    };

    if args.scan_on_start || args.scan_only {
        // Mirror scan progress to stdout while the sweep runs.
        let mut events = tuner.subscribe_scan_events();
        let progress = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ScanEvent::StationFound {
                        frequency_mhz,
                        power,
                    }) => {
                        println!("  found {:.1} MHz (power {:.6})", frequency_mhz, power);
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let mut scan = {
            let tuner = Arc::clone(&tuner);
            tokio::spawn(async move { tuner.scan_stations().await })
        };

        tokio::select! {
            result = &mut scan => {
                match result? {
                    Ok(stations) => {
                        println!("Discovered {} station(s):", stations.len());
                        for frequency in &stations {
                            println!("  {:.1} MHz", frequency);
                        }
                    }
                    Err(e) => error!("Band scan failed: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, cancelling scan");
                tuner.cancel_scan();
                let _ = scan.await;
            }
        }
        progress.abort();

        if args.scan_only {
            tuner.stop();
            let _ = runner.await;
            return Ok(());
        }
    }

    info!("Tuned to {:.1} MHz, press Ctrl-C to stop", tuner.frequency_mhz());
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    tuner.cancel_scan();
    tuner.stop();
    let _ = runner.await;
    Ok(())
}
