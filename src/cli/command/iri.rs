use std::path::PathBuf;

use anticipy::datasource::{Iri, IriForecastType};
use anyhow::Result;

use super::{country_bounds, fetch, setup};
use crate::cli::{CommonArgs, ForecastType};

pub async fn iri(common: &CommonArgs, forecast_type: ForecastType) -> Result<PathBuf> {
    let (country, paths) = setup(common)?;
    let geobb = country_bounds(&country, &paths).await?;
    let forecast_type = match forecast_type {
        ForecastType::Prob => IriForecastType::Prob,
        ForecastType::Dominant => IriForecastType::Dominant,
    };
    let iri = Iri::new(&country, &paths, &geobb, forecast_type)?;

    fetch(&iri, (), common.clobber).await
}
