use std::path::PathBuf;

use anticipy::datasource::FewsNet;
use anyhow::Result;

use super::{fetch, setup};
use crate::cli::CommonArgs;

pub async fn fewsnet(common: &CommonArgs, year: i32, month: u32) -> Result<PathBuf> {
    let (country, paths) = setup(common)?;
    let fewsnet = FewsNet::new(&country, &paths, year, month)?;

    fetch(&fewsnet, (), common.clobber).await
}
