use std::path::PathBuf;

use anticipy::datasource::CodAb;
use anyhow::Result;

use super::{fetch, setup};
use crate::cli::CommonArgs;

pub async fn codab(common: &CommonArgs) -> Result<PathBuf> {
    let (country, paths) = setup(common)?;
    let codab = CodAb::new(&country, &paths)?;

    fetch(&codab, (), common.clobber).await
}
