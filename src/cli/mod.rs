//! Command line interface.

pub mod command;

use std::{path::PathBuf, time::Duration};

use anticipy::dates::{parse_date, Dekad};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::ProgressBar;

#[derive(Parser)]
#[command(version, about, long_about = None)]
/// Downloads and processes one data source for a country
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Administrative boundaries from HDX
    Codab {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// FEWS NET food insecurity phases
    Fewsnet {
        #[command(flatten)]
        common: CommonArgs,
        /// Publication year
        #[arg(long)]
        year: i32,
        /// Publication month
        #[arg(long)]
        month: u32,
    },
    /// CHIRPS precipitation
    Chirps {
        #[command(flatten)]
        common: CommonArgs,
        #[arg(long, value_enum, default_value_t = Frequency::Monthly)]
        frequency: Frequency,
        /// Grid resolution in degrees, 0.05 or 0.25
        #[arg(long, default_value_t = 0.05)]
        resolution: f64,
        #[command(flatten)]
        dates: DateArgs,
    },
    /// IRI seasonal precipitation forecast, needs IRI_AUTH
    Iri {
        #[command(flatten)]
        common: CommonArgs,
        #[arg(long, value_enum, default_value_t = ForecastType::Prob)]
        forecast_type: ForecastType,
    },
    /// GloFAS river discharge at the configured reporting points
    Glofas {
        #[command(flatten)]
        common: CommonArgs,
        #[arg(long, value_enum, default_value_t = GlofasKind::Reanalysis)]
        product: GlofasKind,
        /// Last leadtime in days, ignored for the reanalysis
        #[arg(long, default_value_t = 15)]
        leadtime_max: u32,
        #[command(flatten)]
        dates: DateArgs,
    },
    /// USGS NDVI zonal statistics per administrative area
    UsgsNdvi {
        #[command(flatten)]
        common: CommonArgs,
        #[arg(long, value_enum, default_value_t = NdviKind::Smoothed)]
        product: NdviKind,
        /// First dekad as YYYY-DD
        #[arg(long, value_parser = parse_dekad)]
        start: Option<Dekad>,
        /// Last dekad as YYYY-DD
        #[arg(long, value_parser = parse_dekad)]
        end: Option<Dekad>,
        /// Administrative level of the zones
        #[arg(long, default_value_t = 1)]
        admin_level: u8,
        /// Boundary attribute naming each zone, e.g. ADM1_PCODE
        #[arg(long)]
        feature_col: String,
        /// Statistics to compute
        #[arg(long, value_delimiter = ',', default_value = "mean,median,min,max")]
        stats: Vec<String>,
        /// Percentiles to compute, e.g. 10,90
        #[arg(long, value_delimiter = ',')]
        percentiles: Vec<u8>,
    },
}

#[derive(Args)]
pub struct CommonArgs {
    /// ISO 3166-1 alpha-3 country code
    #[arg(long)]
    pub iso3: String,
    /// Data directory, defaults to $OAP_DATA_DIR
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    /// Overwrite existing files
    #[arg(long)]
    pub clobber: bool,
}

#[derive(Args)]
pub struct DateArgs {
    /// First date as YYYY-MM-DD
    #[arg(long, value_parser = parse_cli_date)]
    pub start_date: Option<NaiveDate>,
    /// Last date as YYYY-MM-DD
    #[arg(long, value_parser = parse_cli_date)]
    pub end_date: Option<NaiveDate>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Frequency {
    Daily,
    Monthly,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ForecastType {
    Prob,
    Dominant,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum GlofasKind {
    Reanalysis,
    Forecast,
    Reforecast,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum NdviKind {
    Smoothed,
    PercentMedian,
    MedianAnomaly,
    Difference,
}

fn parse_cli_date(input: &str) -> Result<NaiveDate, String> {
    parse_date(input).map_err(|e| e.to_string())
}

fn parse_dekad(input: &str) -> Result<Dekad, String> {
    let (year, dekad) = input
        .split_once('-')
        .ok_or_else(|| format!("`{input}`: dekads must be given as YYYY-DD"))?;
    let year = year.parse().map_err(|_| format!("`{year}` is not a year"))?;
    let dekad = dekad.parse().map_err(|_| format!("`{dekad}` is not a dekad"))?;

    Dekad::new(year, dekad).map_err(|e| e.to_string())
}

/// Creates a spinner.
pub fn create_spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner().with_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));

    bar
}

// -- Tests -------------------------------------------------------------------
