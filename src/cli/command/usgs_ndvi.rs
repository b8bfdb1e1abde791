use std::path::PathBuf;

use anticipy::{
    datasource::{NdviProduct, NdviZones, UsgsNdvi},
    dates::Dekad,
    raster::{stats::Stat, StatsOptions},
};
use anyhow::Result;

use super::{boundaries, fetch, setup};
use crate::cli::{CommonArgs, NdviKind};

/// How to aggregate the rasters.
pub struct ZoneArgs {
    pub admin_level: u8,
    pub feature_col: String,
    pub stats: Vec<String>,
    pub percentiles: Vec<u8>,
}

pub async fn usgs_ndvi(
    common: &CommonArgs,
    product: NdviKind,
    start: Option<Dekad>,
    end: Option<Dekad>,
    zones: ZoneArgs,
) -> Result<PathBuf> {
    let (country, paths) = setup(common)?;
    let product = match product {
        NdviKind::Smoothed => NdviProduct::Smoothed,
        NdviKind::PercentMedian => NdviProduct::PercentMedian,
        NdviKind::MedianAnomaly => NdviProduct::MedianAnomaly,
        NdviKind::Difference => NdviProduct::Difference,
    };
    let ndvi = UsgsNdvi::new(&country, &paths, product, start, end)?;

    let options = StatsOptions {
        stats: zones
            .stats
            .iter()
            .map(|name| Stat::parse(name))
            .collect::<anticipy::error::Result<Vec<_>>>()?,
        percentiles: zones.percentiles,
        all_touched: false,
    };
    let boundaries = boundaries(&country, &paths, zones.admin_level).await?;
    let zones = NdviZones::new(boundaries, zones.feature_col, options)?;

    fetch(&ndvi, zones, common.clobber).await
}
