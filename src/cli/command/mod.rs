//! One function per data source, each running download then process.

pub mod chirps;
pub mod codab;
pub mod fewsnet;
pub mod glofas;
pub mod iri;
pub mod usgs_ndvi;

use std::path::PathBuf;

use anticipy::{
    config::{CountryConfig, PathConfig},
    datasource::{CodAb, CodAbLayer, DataSource},
    geobox::GeoBoundingBox,
    vector::FeatureCollection,
};
use anyhow::{Context, Result};
use tracing::info;

use super::{create_spinner, CommonArgs, Commands};

pub async fn run(command: Commands) -> Result<PathBuf> {
    match command {
        Commands::Codab { common } => codab::codab(&common).await,
        Commands::Fewsnet {
            common,
            year,
            month,
        } => fewsnet::fewsnet(&common, year, month).await,
        Commands::Chirps {
            common,
            frequency,
            resolution,
            dates,
        } => chirps::chirps(&common, frequency, resolution, &dates).await,
        Commands::Iri {
            common,
            forecast_type,
        } => iri::iri(&common, forecast_type).await,
        Commands::Glofas {
            common,
            product,
            leadtime_max,
            dates,
        } => glofas::glofas(&common, product, leadtime_max, &dates).await,
        Commands::UsgsNdvi {
            common,
            product,
            start,
            end,
            admin_level,
            feature_col,
            stats,
            percentiles,
        } => {
            let zones = usgs_ndvi::ZoneArgs {
                admin_level,
                feature_col,
                stats,
                percentiles,
            };
            usgs_ndvi::usgs_ndvi(&common, product, start, end, zones).await
        }
    }
}

/// Built-in country configuration and the data directory.
fn setup(common: &CommonArgs) -> Result<(CountryConfig, PathConfig)> {
    let country = CountryConfig::built_in(&common.iso3)?;
    let paths = match &common.data_dir {
        Some(dir) => PathConfig::new(dir),
        None => PathConfig::from_env().context("Pass --data-dir or set OAP_DATA_DIR")?,
    };

    Ok((country, paths))
}

/// Downloads then processes `source`.
async fn fetch<S: DataSource>(source: &S, args: S::ProcessArgs, clobber: bool) -> Result<PathBuf> {
    let raw = source.download(clobber).await?;
    info!("Raw data in {}", raw.display());

    let bar = create_spinner("Processing...".to_string());
    let processed = source.process(args, clobber);
    bar.finish_and_clear();

    Ok(processed?)
}

/// Boundaries of one admin level, downloading them first if needed.
async fn boundaries(
    country: &CountryConfig,
    paths: &PathConfig,
    admin_level: u8,
) -> Result<FeatureCollection> {
    let codab = CodAb::new(country, paths)?;
    codab.download(false).await?;

    Ok(codab.load(CodAbLayer::AdminLevel(admin_level))?)
}

/// Envelope of the country outline.
async fn country_bounds(country: &CountryConfig, paths: &PathConfig) -> Result<GeoBoundingBox> {
    let outline = boundaries(country, paths, 0).await?;

    Ok(GeoBoundingBox::from_shape(&outline)?)
}

// -- Tests -------------------------------------------------------------------
