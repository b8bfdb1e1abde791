//! On-disk layout of raw and processed data.

use std::{
    env,
    path::{Path, PathBuf},
};

use crate::error::{Error, Result};

/// Environment variable holding the root of all data directories.
pub const BASE_DIR_ENV: &str = "OAP_DATA_DIR";

const PUBLIC_DIR: &str = "public";
const PRIVATE_DIR: &str = "private";
const RAW_DIR: &str = "raw";
const PROCESSED_DIR: &str = "processed";
const GLOBAL_DIR: &str = "glb";

/// Whether a dataset is freely redistributable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Private,
}

/// Whether files are stored per country or in the shared `glb` folder,
/// used for products with regional coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    Country,
    Global,
}

/// Root directory for all data sources.
#[derive(Debug, Clone)]
pub struct PathConfig {
    base_path: PathBuf,
}

impl PathConfig {
    /// Reads the base directory from `OAP_DATA_DIR`.
    pub fn from_env() -> Result<Self> {
        let base = env::var_os(BASE_DIR_ENV).ok_or(Error::MissingEnv(BASE_DIR_ENV))?;
        Ok(Self::new(base))
    }

    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        PathConfig {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

/// Raw and processed directories of a single data source instance.
#[derive(Debug, Clone)]
pub struct SourceDirs {
    pub raw: PathBuf,
    pub processed: PathBuf,
}

impl SourceDirs {
    /// Builds `<base>/<access>/<raw|processed>/<iso3|glb>/<source>`.
    pub fn new(
        paths: &PathConfig,
        iso3: &str,
        source: &str,
        access: Access,
        raw: Coverage,
        processed: Coverage,
    ) -> Self {
        SourceDirs {
            raw: source_dir(paths, iso3, source, access, RAW_DIR, raw),
            processed: source_dir(paths, iso3, source, access, PROCESSED_DIR, processed),
        }
    }
}

fn source_dir(
    paths: &PathConfig,
    iso3: &str,
    source: &str,
    access: Access,
    state: &str,
    coverage: Coverage,
) -> PathBuf {
    let access_dir = match access {
        Access::Public => PUBLIC_DIR,
        Access::Private => PRIVATE_DIR,
    };
    let region_dir = match coverage {
        Coverage::Country => iso3,
        Coverage::Global => GLOBAL_DIR,
    };

    paths
        .base_path
        .join(access_dir)
        .join(state)
        .join(region_dir)
        .join(source)
}

// -- Tests -------------------------------------------------------------------
