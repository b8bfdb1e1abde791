//! The download / process / load lifecycle shared by every data source.
//!
//! Raw files land in `<base>/<access>/raw/<iso3|glb>/<source>`, processed files
//! in the matching `processed` tree, one file per logical time unit so that
//! coverage can be extended without touching what is already there.

pub mod chirps;
pub mod codab;
pub mod fewsnet;
pub mod glofas;
pub mod iri;
pub mod usgs_ndvi;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::{
    download::check_file_existence,
    error::{Error, Result},
};

pub use chirps::{Chirps, ChirpsFrequency};
pub use codab::{CodAb, CodAbLayer};
pub use fewsnet::{FewsNet, ProjectionPeriod};
pub use glofas::{Glofas, GlofasProduct};
pub use iri::{Iri, IriForecastType};
pub use usgs_ndvi::{NdviProduct, NdviZones, UsgsNdvi};

/// A source of raw data with a local processed representation.
///
/// `download` talks to the outside world, `process` and `load` are purely
/// local. Every phase only touches the files of its own instance scope.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Extra input `process` needs besides the instance scope.
    type ProcessArgs: Send;
    /// Selector passed to `load`.
    type LoadArgs: Send;
    /// In-memory result of `load`.
    type Output;

    /// Fetches raw files for the instance scope, skipping existing ones
    /// unless `clobber` is set. Returns the raw directory or file.
    async fn download(&self, clobber: bool) -> Result<PathBuf>;

    /// Turns each available raw unit into a processed file. A failing unit
    /// does not stop the others; all failures are reported together.
    fn process(&self, args: Self::ProcessArgs, clobber: bool) -> Result<PathBuf>;

    /// Reads and merges the processed files of the instance scope.
    fn load(&self, args: Self::LoadArgs) -> Result<Self::Output>;
}

/// Raw input and processed output of one time unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub raw: PathBuf,
    pub processed: PathBuf,
}

/// Runs `process_one` for every unit whose raw file exists. Existing outputs
/// are kept unless `clobber` is set.
pub fn process_units<F>(units: &[Unit], clobber: bool, process_one: F) -> Result<()>
where
    F: Fn(&Unit) -> Result<()>,
{
    let mut failed = Vec::new();
    for unit in units {
        if !unit.raw.exists() {
            debug!("No raw file {}, skipping.", unit.raw.display());
            continue;
        }
        if check_file_existence(&unit.processed, clobber) {
            continue;
        }
        if let Err(err) = process_one(unit) {
            error!("Failed to process {}: {}", unit.raw.display(), err);
            failed.push((unit.raw.clone(), err.to_string()));
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(Error::ProcessFailed { failed })
    }
}

/// Loads every existing file of `paths`, warning about the missing ones.
/// Fails if none exists.
pub fn load_existing<T, F>(paths: &[PathBuf], load_one: F) -> Result<Vec<T>>
where
    F: Fn(&Path) -> Result<T>,
{
    let (existing, missing): (Vec<&PathBuf>, Vec<&PathBuf>) =
        paths.iter().partition(|path| path.is_file());
    if existing.is_empty() {
        return Err(Error::MissingData(
            "Cannot find any processed file for the requested scope. Make sure \
             that you have already called the `download` and `process` methods."
                .to_string(),
        ));
    }
    for path in missing {
        warn!("Processed file {} not found, leaving it out.", path.display());
    }

    existing.into_iter().map(|path| load_one(path)).collect()
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn unit(dir: &Path, name: &str) -> Unit {
        Unit {
            raw: dir.join(format!("{name}.nc")),
            processed: dir.join(format!("{name}.parquet")),
        }
    }

    #[test]
    fn should_process_siblings_of_failing_unit() {
        let dir = TempDir::new().unwrap();
        let units = vec![unit(dir.path(), "a"), unit(dir.path(), "bad"), unit(dir.path(), "c")];
        for u in &units {
            fs::write(&u.raw, b"raw").unwrap();
        }

        let result = process_units(&units, false, |u| {
            if u.raw.ends_with("bad.nc") {
                return Err(Error::Format("corrupt".to_string()));
            }
            fs::write(&u.processed, b"done").map_err(Error::from)
        });

        match result {
            Err(Error::ProcessFailed { failed }) => {
                assert_eq!(failed.len(), 1);
                assert!(failed[0].0.ends_with("bad.nc"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(units[0].processed.exists());
        assert!(units[2].processed.exists());
    }

    #[test]
    fn should_keep_processed_files_without_clobber() {
        let dir = TempDir::new().unwrap();
        let units = vec![unit(dir.path(), "a")];
        fs::write(&units[0].raw, b"raw").unwrap();
        fs::write(&units[0].processed, b"old").unwrap();

        process_units(&units, false, |u| fs::write(&u.processed, b"new").map_err(Error::from)).unwrap();
        assert_eq!(fs::read(&units[0].processed).unwrap(), b"old");

        process_units(&units, true, |u| fs::write(&u.processed, b"new").map_err(Error::from)).unwrap();
        assert_eq!(fs::read(&units[0].processed).unwrap(), b"new");
    }

    #[test]
    fn should_fail_loading_without_processed_files() {
        let dir = TempDir::new().unwrap();
        let paths = vec![dir.path().join("missing.parquet")];

        let result = load_existing(&paths, |path| Ok(path.to_path_buf()));

        assert!(matches!(result, Err(Error::MissingData(_))));
    }

    #[test]
    fn should_load_only_existing_files() {
        let dir = TempDir::new().unwrap();
        let present = dir.path().join("present.parquet");
        fs::write(&present, b"x").unwrap();
        let paths = vec![present.clone(), dir.path().join("missing.parquet")];

        let loaded = load_existing(&paths, |path| Ok(path.to_path_buf())).unwrap();

        assert_eq!(loaded, vec![present]);
    }
}
