//! This module governs the high-level implementation of the simulation
mod calculations;
mod configuration;
mod error;
mod styles;
mod telemetry;
mod tracker;

pub(crate) use configuration::Configuration;
pub(crate) use error::EntrainError;
pub(crate) use styles::Styles;
pub(crate) use tracker::{Tracker, TrackerBuilder};

use clap::{ArgEnum, Parser};
use nalgebra::RealField;
use num_traits::ToPrimitive;
use serde::de::DeserializeOwned;
use std::path::PathBuf;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct App {
    file_path: Option<PathBuf>,
    #[clap(arg_enum, short, long)]
    log_level: LogLevel,
    #[clap(arg_enum, short, long)]
    calculation: Calculation,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ArgEnum)]
enum LogLevel {
    Trace,
    Info,
    Debug,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Whether the two species are solved independently or coupled through the
/// phonon-drag injection term
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ArgEnum)]
pub(crate) enum Calculation {
    Dragless,
    Dragful,
}

/// Entry point for the binary crate
///
/// Parses the command line, initialises tracing, assembles the carrier
/// systems from the run configuration and hands off to the temperature and
/// magnetic field sweep drivers.
pub fn run<T>() -> color_eyre::Result<()>
where
    T: Copy + DeserializeOwned + RealField + ToPrimitive + Send + Sync,
{
    color_eyre::install()?;
    let cli = App::parse();

    let config: Configuration<T> = Configuration::build(cli.file_path.as_deref())?;

    let (subscriber, _guard) =
        telemetry::get_subscriber(cli.log_level, std::path::Path::new(&config.archive.directory));
    telemetry::init_subscriber(subscriber);

    let term = console::Term::stdout();
    let mut styles = Styles::default();
    if supports_color::on(supports_color::Stream::Stdout).is_some() {
        styles.colorize();
    }

    calculations::temperature_sweep(&config, cli.calculation, &term, &styles)?;
    if !config.sweep.magnetic_field_strengths.is_empty() {
        calculations::hall_sweep(&config, &term, &styles)?;
    }

    Ok(())
}
