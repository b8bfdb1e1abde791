use std::path::PathBuf;

use anticipy::{
    datasource::{Chirps, ChirpsFrequency},
    dates::DateRange,
};
use anyhow::Result;

use super::{country_bounds, fetch, setup};
use crate::cli::{CommonArgs, DateArgs, Frequency};

pub async fn chirps(
    common: &CommonArgs,
    frequency: Frequency,
    resolution: f64,
    dates: &DateArgs,
) -> Result<PathBuf> {
    let (country, paths) = setup(common)?;
    let geobb = country_bounds(&country, &paths).await?;
    let frequency = match frequency {
        Frequency::Daily => ChirpsFrequency::Daily,
        Frequency::Monthly => ChirpsFrequency::Monthly,
    };
    let chirps = Chirps::new(
        &country,
        &paths,
        &geobb,
        frequency,
        resolution,
        DateRange::new(dates.start_date, dates.end_date),
    )
    .await?;

    fetch(&chirps, (), common.clobber).await
}
