//! Download, process and load data used to anticipate humanitarian crises.
//!
//! Every source follows the same [`DataSource`] lifecycle: `download` raw
//! files into `$OAP_DATA_DIR`, `process` them into Parquet, and `load` the
//! processed data for a country and period.

pub mod config;
pub mod dates;
pub mod datasource;
pub mod download;
pub mod error;
pub mod geobox;
pub mod parquet;
pub mod raster;
pub mod reading;
pub mod vector;

pub use config::{CountryConfig, PathConfig};
pub use datasource::DataSource;
pub use error::{Error, Result};
pub use geobox::GeoBoundingBox;
pub use raster::Raster;
pub use vector::FeatureCollection;
