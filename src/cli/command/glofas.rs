use std::path::PathBuf;

use anticipy::{
    datasource::{Glofas, GlofasProduct},
    dates::DateRange,
};
use anyhow::Result;

use super::{country_bounds, fetch, setup};
use crate::cli::{CommonArgs, DateArgs, GlofasKind};

pub async fn glofas(
    common: &CommonArgs,
    product: GlofasKind,
    leadtime_max: u32,
    dates: &DateArgs,
) -> Result<PathBuf> {
    let (country, paths) = setup(common)?;
    let geobb = country_bounds(&country, &paths).await?;
    let product = match product {
        GlofasKind::Reanalysis => GlofasProduct::Reanalysis,
        GlofasKind::Forecast => GlofasProduct::Forecast { leadtime_max },
        GlofasKind::Reforecast => GlofasProduct::Reforecast { leadtime_max },
    };
    let glofas = Glofas::new(
        &country,
        &paths,
        &geobb,
        product,
        DateRange::new(dates.start_date, dates.end_date),
    )?;

    fetch(&glofas, (), common.clobber).await
}
