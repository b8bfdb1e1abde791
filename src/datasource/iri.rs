//! IRI seasonal precipitation tercile forecasts.
//!
//! Access needs an IRI data library account; the session key is read from
//! `IRI_AUTH` and sent as the `__dlauth_id` cookie.

use std::{env, fmt, path::PathBuf};

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, COOKIE};
use tracing::info;

use super::DataSource;
use crate::{
    config::{Access, CountryConfig, Coverage, PathConfig, SourceDirs},
    download::{check_file_existence, ensure_success, http_client, save_response},
    error::{Error, Result},
    geobox::GeoBoundingBox,
    parquet::{load_raster, save_raster},
    raster::Raster,
    reading::read_variable,
};

const SOURCE_DIR: &str = "iri";
const IRI_AUTH: &str = "IRI_AUTH";
const AUTH_COOKIE: &str = "__dlauth_id";
const NETCDF_CONTENT_TYPE: &str = "application/x-netcdf";
const BASE_URL: &str =
    "https://iridl.ldeo.columbia.edu/SOURCES/.IRI/.FD/.NMME_Seasonal_Forecast/.Precipitation_ELR/";
const TIME_DIM: &str = "F";

/// Probability per tercile, or only the probability of the dominant one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IriForecastType {
    Prob,
    Dominant,
}

impl fmt::Display for IriForecastType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IriForecastType::Prob => "prob",
            IriForecastType::Dominant => "dominant",
        })
    }
}

/// All seasons and leadtimes of the forecast over a bounding box, stored as a
/// single file.
#[derive(Debug, Clone)]
pub struct Iri {
    iso3: String,
    forecast_type: IriForecastType,
    geobb: GeoBoundingBox,
    dirs: SourceDirs,
}

impl Iri {
    /// The bounding box is rounded outward to the 1 degree forecast grid.
    pub fn new(
        country: &CountryConfig,
        paths: &PathConfig,
        geobb: &GeoBoundingBox,
        forecast_type: IriForecastType,
    ) -> Result<Self> {
        Ok(Iri {
            iso3: country.iso3().to_string(),
            forecast_type,
            geobb: geobb.round_coords(0.0, 1.0)?,
            dirs: SourceDirs::new(
                paths,
                country.iso3(),
                SOURCE_DIR,
                Access::Private,
                Coverage::Country,
                Coverage::Country,
            ),
        })
    }

    fn file_stem(&self) -> String {
        format!(
            "{}_iri_forecast_seasonal_precipitation_tercile_{}_{}",
            self.iso3,
            self.forecast_type,
            self.geobb.get_filename_repr(0)
        )
    }

    pub fn raw_path(&self) -> PathBuf {
        self.dirs.raw.join(format!("{}.nc", self.file_stem()))
    }

    pub fn processed_path(&self) -> PathBuf {
        self.dirs.processed.join(format!("{}.parquet", self.file_stem()))
    }

    fn url(&self) -> String {
        format!(
            "{BASE_URL}.{}/X/%28{}%29%28{}%29RANGEEDGES/Y/%28{}%29%28{}%29RANGEEDGES/data.nc",
            self.forecast_type,
            self.geobb.lon_min(),
            self.geobb.lon_max(),
            self.geobb.lat_max(),
            self.geobb.lat_min()
        )
    }
}

/// The data library answers an expired key with an HTML login page instead
/// of an error status.
fn check_content_type(content_type: Option<&str>) -> Result<()> {
    if content_type == Some(NETCDF_CONTENT_TYPE) {
        return Ok(());
    }
    Err(Error::Authentication(format!(
        "The request returned headers indicating that the expected file type was not \
         returned. In some cases this may be due to an issue with the authentication. \
         Please check the validity of the authentication key found in your {IRI_AUTH} \
         environment variable and try again."
    )))
}

#[async_trait]
impl DataSource for Iri {
    type ProcessArgs = ();
    type LoadArgs = ();
    type Output = Raster;

    async fn download(&self, clobber: bool) -> Result<PathBuf> {
        let raw_path = self.raw_path();
        if check_file_existence(&raw_path, clobber) {
            return Ok(raw_path);
        }
        let iri_auth = env::var(IRI_AUTH).map_err(|_| Error::MissingEnv(IRI_AUTH))?;

        info!("Downloading IRI NetCDF file.");
        let response = http_client()?
            .get(self.url())
            .header(COOKIE, format!("{AUTH_COOKIE}={iri_auth}"))
            .send()
            .await?;
        let response = ensure_success(response)?;
        check_content_type(
            response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok()),
        )?;

        save_response(response, &raw_path).await
    }

    fn process(&self, _args: (), clobber: bool) -> Result<PathBuf> {
        let raw_path = self.raw_path();
        let processed_path = self.processed_path();
        if !raw_path.is_file() {
            return Err(Error::MissingData(format!(
                "Cannot open the NetCDF file {}. Make sure that you have already called \
                 the `download` method and that the file exists.",
                raw_path.display()
            )));
        }
        if check_file_existence(&processed_path, clobber) {
            return Ok(processed_path);
        }

        let raster = read_variable(&raw_path, &self.forecast_type.to_string())?
            .set_time_dim(TIME_DIM)?;
        save_raster(&raster, &processed_path)?;

        Ok(processed_path)
    }

    fn load(&self, _args: ()) -> Result<Raster> {
        let processed_path = self.processed_path();
        if !processed_path.is_file() {
            return Err(Error::MissingData(format!(
                "Cannot open the file {}. Make sure that you have already called the \
                 `process` method and that the file exists.",
                processed_path.display()
            )));
        }

        load_raster(&processed_path)
    }
}

// -- Tests -------------------------------------------------------------------
