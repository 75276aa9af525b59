//! CLI Entry Point for wlm-daq
//!
//! One-shot queries and commands against a HighFinesse wavelength meter.
//!
//! # Usage
//!
//! Read the wavelength from the simulated instrument:
//! ```bash
//! wlm-daq --mock wavelength
//! ```
//!
//! List the error codes declared by an installed header:
//! ```bash
//! wlm-daq --header /opt/HighFinesse/wlmData.h constants --errors
//! ```
//!
//! Dump the analysis spectrum as CSV:
//! ```bash
//! wlm-daq spectrum --output spectrum.csv
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use wlm_daq::catalog::Channel;
use wlm_daq::config::{WlmConfig, DEFAULT_CONFIG_PATH};
use wlm_daq::constants::load_header;
use wlm_daq::driver::{MockDriver, WlmDriver};
use wlm_daq::logging::{self, OutputFormat};
use wlm_daq::InstrumentSession;

#[derive(Parser)]
#[command(name = "wlm-daq")]
#[command(about = "Query and control a HighFinesse wavelength meter", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the wlmData.h location
    #[arg(long)]
    header: Option<PathBuf>,

    /// Use the simulated instrument instead of libwlmData
    #[arg(long)]
    mock: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Report instrument status while running
    #[arg(short, long)]
    verbose: bool,

    /// Log line layout, overriding `application.log_format`
    #[arg(long, value_enum)]
    log_format: Option<OutputFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the constants resolved from the header
    Constants {
        /// Only print the read-error and set-error catalog
        #[arg(long)]
        errors: bool,
    },
    /// Operating temperature in degrees C
    Temperature,
    /// Vacuum wavelength in nm
    Wavelength,
    /// Frequency in THz
    Frequency,
    /// Instrument type and firmware version
    Version,
    /// Current wavelength range
    Range,
    /// Interferometer amplitudes per channel
    Amplitude,
    /// Linewidth analysis results
    Linewidth,
    /// Measurement interval in ms
    Interval,
    /// Start measuring
    Start,
    /// Stop measuring
    Stop,
    /// Whether a measurement is running
    State,
    /// Analysis spectrum
    Spectrum {
        /// Write the spectrum as CSV instead of printing it
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct CatalogEntry<'a> {
    name: &'a str,
    value: i64,
    channel: Channel,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = WlmConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(header) = &cli.header {
        config.paths.header = header.clone();
    }
    if cli.verbose {
        config.application.verbose = true;
    }
    if let Some(format) = cli.log_format {
        config.application.log_format = format;
    }
    config.validate()?;
    logging::init_from_config(&config)?;

    if let Commands::Constants { errors } = cli.command {
        return print_constants(&config, errors, cli.json);
    }
    run(&cli, &config)
}

fn run(cli: &Cli, config: &WlmConfig) -> Result<()> {
    let driver = open_driver(config, cli.mock)?;
    let session = InstrumentSession::open(driver, config)
        .with_context(|| format!("connecting to wavelength meter ({})", describe(config, cli.mock)))?;

    match &cli.command {
        Commands::Constants { errors } => print_constants(config, *errors, cli.json),
        Commands::Temperature => emit(cli.json, &session.temperature()?, |t| format!("{t:.2} C")),
        Commands::Wavelength => emit(cli.json, &session.wavelength()?, |wl| format!("{wl:.6} nm")),
        Commands::Frequency => emit(cli.json, &session.frequency()?, |f| format!("{f:.6} THz")),
        Commands::Version => emit(cli.json, &session.version()?, ToString::to_string),
        Commands::Range => emit(cli.json, &session.range()?, ToString::to_string),
        Commands::Amplitude => emit(cli.json, &session.amplitude()?, |amplitudes| {
            amplitudes
                .iter()
                .map(|(ch, a)| format!("channel {ch}: min {} max {} avg {}", a.min, a.max, a.avg))
                .collect::<Vec<_>>()
                .join("\n")
        }),
        Commands::Linewidth => emit(cli.json, &session.linewidth()?, |lw| {
            format!(
                "vacuum {:.6} nm\nair {:.6} nm\nfrequency {:.6} THz\nwavenumber {:.4} 1/cm\nphoton energy {:.6} eV",
                lw.vacuum_wavelength_nm, lw.air_wavelength_nm, lw.frequency_thz, lw.wavenumber, lw.photon_energy_ev
            )
        }),
        Commands::Interval => emit(cli.json, &session.interval()?, |ms| format!("{ms} ms")),
        Commands::Start => {
            session.set_active(true)?;
            emit(cli.json, &true, |_| "measurement started".to_string())
        }
        Commands::Stop => {
            session.set_active(false)?;
            emit(cli.json, &false, |_| "measurement stopped".to_string())
        }
        Commands::State => emit(cli.json, &session.is_active()?, |active| {
            let state = if *active { "measuring" } else { "stopped" };
            state.to_string()
        }),
        Commands::Spectrum { output } => {
            let spectrum = session.spectrum()?;
            match output {
                Some(path) => write_spectrum(&spectrum, path),
                None => emit(cli.json, &spectrum, |s| {
                    s.points
                        .iter()
                        .map(|p| format!("{:.6}\t{}", p.wavelength_nm, p.intensity))
                        .collect::<Vec<_>>()
                        .join("\n")
                }),
            }
        }
    }
}

fn emit<T: Serialize>(json: bool, value: &T, human: impl FnOnce(&T) -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", human(value));
    }
    Ok(())
}

fn print_constants(config: &WlmConfig, errors_only: bool, json: bool) -> Result<()> {
    let report = load_header(&config.paths.header, config.session.resolve_policy)?;
    for skipped in &report.skipped {
        eprintln!("skipped line {}: {} ({})", skipped.line, skipped.text, skipped.reason);
    }

    if errors_only {
        let entries: Vec<CatalogEntry<'_>> = [Channel::Read, Channel::Set]
            .into_iter()
            .flat_map(|channel| {
                report
                    .catalog
                    .partition(channel)
                    .iter()
                    .map(move |code| CatalogEntry {
                        name: &code.name,
                        value: code.value,
                        channel,
                    })
            })
            .collect();
        return emit(json, &entries, |entries| {
            entries
                .iter()
                .map(|e| format!("{:?}\t{}\t{}", e.channel, e.name, e.value))
                .collect::<Vec<_>>()
                .join("\n")
        });
    }

    let constants: Vec<(&str, i64)> = report.namespace.iter().collect();
    emit(json, &constants, |constants| {
        constants
            .iter()
            .map(|(name, value)| format!("{name} = {value}"))
            .collect::<Vec<_>>()
            .join("\n")
    })
}

fn open_driver(config: &WlmConfig, mock: bool) -> Result<Box<dyn WlmDriver>> {
    if mock {
        return Ok(Box::new(MockDriver::new()));
    }
    native_driver(config)
}

#[cfg(all(feature = "wlm-sdk", unix))]
fn native_driver(config: &WlmConfig) -> Result<Box<dyn WlmDriver>> {
    let driver = wlm_daq::driver::NativeDriver::open(&config.paths.library)?;
    Ok(Box::new(driver))
}

#[cfg(not(all(feature = "wlm-sdk", unix)))]
fn native_driver(_config: &WlmConfig) -> Result<Box<dyn WlmDriver>> {
    Err(wlm_daq::WlmError::FeatureNotEnabled(
        "wlm-sdk (rebuild with --features wlm-sdk, or pass --mock)".to_string(),
    )
    .into())
}

fn describe(config: &WlmConfig, mock: bool) -> String {
    if mock {
        "simulated".to_string()
    } else {
        config.paths.library.display().to_string()
    }
}

#[cfg(feature = "storage_csv")]
fn write_spectrum(spectrum: &wlm_daq::Spectrum, path: &std::path::Path) -> Result<()> {
    let file = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    spectrum.write_csv(file)?;
    println!("wrote {} points to {}", spectrum.len(), path.display());
    Ok(())
}

#[cfg(not(feature = "storage_csv"))]
fn write_spectrum(_spectrum: &wlm_daq::Spectrum, _path: &std::path::Path) -> Result<()> {
    Err(wlm_daq::WlmError::FeatureNotEnabled("storage_csv".to_string()).into())
}
