//! Error types shared by every data source.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while downloading, processing or loading data.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or incomplete configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A data source was requested whose section is absent (or null) in the
    /// country configuration.
    #[error("`{section}` needs to be added to the country configuration file")]
    MissingSection { section: &'static str },

    /// A required environment variable is not set.
    #[error("Environment variable {0} is not set")]
    MissingEnv(&'static str),

    /// Bounding box violating its latitude/longitude invariants.
    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    /// Invalid date or date range.
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// Transport level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status.
    #[error("Request to {url} failed with status {status}")]
    RequestFailed { url: String, status: u16 },

    /// Credentials were rejected or the server returned something other than
    /// the requested data.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A remote compute request failed.
    #[error("Remote request {request_id} failed: {reason}")]
    RemoteTask { request_id: String, reason: String },

    /// Nothing on disk for the requested scope.
    #[error("Data not found: {0}")]
    MissingData(String),

    /// A raster lacks a dimension an operation needs, or dimensions disagree.
    #[error("Dimension error: {0}")]
    Dimension(String),

    /// Malformed input file.
    #[error("Format error: {0}")]
    Format(String),

    /// One or more time units could not be processed. Every other unit was.
    #[error("Processing failed for {} file(s): {}", failed.len(), summarise(failed))]
    ProcessFailed { failed: Vec<(PathBuf, String)> },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Shapefile error: {0}")]
    Shapefile(#[from] shapefile::Error),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("GRIB error: {0}")]
    Grib(#[from] grib::GribError),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

fn summarise(failed: &[(PathBuf, String)]) -> String {
    failed
        .iter()
        .map(|(path, reason)| format!("{} ({})", path.display(), reason))
        .collect::<Vec<_>>()
        .join(", ")
}
