//! COD AB administrative boundaries from the Humanitarian Data Exchange.

use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use super::DataSource;
use crate::{
    config::{Access, CodAbConfig, CountryConfig, Coverage, PathConfig, SourceDirs},
    download::{check_file_existence, download_url, ensure_success, http_client},
    error::{Error, Result},
    vector::{read_zipped_layer, FeatureCollection},
};

const SOURCE_DIR: &str = "cod_ab";
const HDX_URL: &str = "https://data.humdata.org";

/// Which layer of the boundaries archive to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodAbLayer {
    /// Administrative level, 0 being the country outline.
    AdminLevel(u8),
    /// Index into the configured custom layer names.
    Custom(usize),
}

#[derive(Debug, Deserialize)]
struct PackageShow {
    success: bool,
    result: Option<Package>,
}

#[derive(Debug, Deserialize)]
struct Package {
    resources: Vec<Resource>,
}

#[derive(Debug, Deserialize)]
struct Resource {
    name: String,
    url: String,
}

/// Administrative boundaries of one country.
#[derive(Debug, Clone)]
pub struct CodAb {
    iso3: String,
    config: CodAbConfig,
    raw_filepath: PathBuf,
    hdx_url: String,
}

impl CodAb {
    /// Fails with [`Error::MissingSection`] if the country has no `codab`
    /// section.
    pub fn new(country: &CountryConfig, paths: &PathConfig) -> Result<Self> {
        let config = country.codab()?;
        let dirs = SourceDirs::new(
            paths,
            country.iso3(),
            SOURCE_DIR,
            Access::Public,
            Coverage::Country,
            Coverage::Country,
        );
        let raw_filepath = dirs
            .raw
            .join(format!("{}_{SOURCE_DIR}.shp.zip", country.iso3()));

        Ok(CodAb {
            iso3: country.iso3().to_string(),
            config,
            raw_filepath,
            hdx_url: HDX_URL.to_string(),
        })
    }

    /// Points the HDX lookups at another CKAN instance.
    pub fn with_hdx_url(mut self, hdx_url: impl Into<String>) -> Self {
        self.hdx_url = hdx_url.into();
        self
    }

    pub fn raw_filepath(&self) -> &PathBuf {
        &self.raw_filepath
    }

    fn layer_name(&self, layer: CodAbLayer) -> Result<&str> {
        match layer {
            CodAbLayer::AdminLevel(level) => {
                if level > self.config.admin_level_max {
                    return Err(Error::Config(format!(
                        "Admin level {level} requested, but maximum set to {} in {} config file",
                        self.config.admin_level_max,
                        self.iso3.to_uppercase()
                    )));
                }
                self.config
                    .admin_level_names
                    .get(level as usize)
                    .map(String::as_str)
                    .ok_or_else(|| Error::Config(format!("No layer name for admin level {level}")))
            }
            CodAbLayer::Custom(index) => self
                .config
                .custom_layer_names
                .get(index)
                .map(String::as_str)
                .ok_or_else(|| {
                    Error::Config(format!(
                        "{index}th custom layer requested but not available in {} config file",
                        self.iso3.to_uppercase()
                    ))
                }),
        }
    }

    async fn find_resource_url(&self, client: &Client) -> Result<String> {
        let hdx_address = format!("cod-ab-{}", self.iso3);
        info!("Querying HDX API for dataset {}", hdx_address);
        let url = format!("{}/api/3/action/package_show", self.hdx_url);
        let response = ensure_success(
            client
                .get(&url)
                .query(&[("id", hdx_address.as_str())])
                .send()
                .await?,
        )?;
        let package: PackageShow = response.json().await?;

        package
            .result
            .filter(|_| package.success)
            .and_then(|package| {
                package
                    .resources
                    .into_iter()
                    .find(|resource| resource.name == self.config.hdx_dataset_name)
            })
            .map(|resource| resource.url)
            .ok_or_else(|| {
                Error::MissingData(format!(
                    "Dataset with name \"{}\" not found at HDX address \"{}\".",
                    self.config.hdx_dataset_name, hdx_address
                ))
            })
    }
}

#[async_trait]
impl DataSource for CodAb {
    type ProcessArgs = ();
    type LoadArgs = CodAbLayer;
    type Output = FeatureCollection;

    async fn download(&self, clobber: bool) -> Result<PathBuf> {
        if check_file_existence(&self.raw_filepath, clobber) {
            return Ok(self.raw_filepath.clone());
        }
        let client = http_client()?;
        let url = self.find_resource_url(&client).await?;
        info!("Downloading dataset {}", self.config.hdx_dataset_name);
        download_url(&client, &url, &self.raw_filepath).await?;
        info!("Saved to {}", self.raw_filepath.display());

        Ok(self.raw_filepath.clone())
    }

    fn process(&self, _args: (), _clobber: bool) -> Result<PathBuf> {
        info!("`process()` method not implemented for CodAB.");
        Ok(self.raw_filepath.clone())
    }

    fn load(&self, layer: CodAbLayer) -> Result<FeatureCollection> {
        let layer_name = self.layer_name(layer)?;
        if !self.raw_filepath.is_file() {
            return Err(Error::MissingData(format!(
                "Could not read boundary shapefile. Make sure that you have already \
                 called the `download` method and that the file {} exists.",
                self.raw_filepath.display()
            )));
        }

        read_zipped_layer(&self.raw_filepath, layer_name)
    }
}

// -- Tests -------------------------------------------------------------------
