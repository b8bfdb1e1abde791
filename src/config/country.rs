//! Per-country settings loaded from YAML.
//!
//! Every data source section is optional. A section is only checked when the
//! matching data source asks for it, so a configuration without e.g. a
//! `glofas` section is perfectly usable for COD AB.

use std::{fs, path::Path};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Highest administrative level a COD AB section may declare.
pub const MAX_ADMIN_LEVEL: u8 = 4;

const ADMIN_LEVEL_PLACEHOLDER: &str = "{admin_level}";

const FEWSNET_REGIONS: [(&str, &str); 5] = [
    ("caribbean-central-america", "LAC"),
    ("central-asia", "CA"),
    ("east-africa", "EA"),
    ("southern-africa", "SA"),
    ("west-africa", "WA"),
];

const NDVI_AREAS: [(&str, &str, &str); 8] = [
    ("north-africa", "africa/north", "na"),
    ("east-africa", "africa/east", "ea"),
    ("southern-africa", "africa/southern", "sa"),
    ("west-africa", "africa/west", "wa"),
    ("central-asia", "asia/centralasia", "cta"),
    ("yemen", "asia/middleeast/yemen", "yem"),
    ("central-america", "lac/camcar/centralamerica", "ca"),
    ("hispaniola", "lac/camcar/caribbean/hispaniola", "hi"),
];

const BUILT_IN: [(&str, &str); 8] = [
    ("bfa", include_str!("countries/bfa.yaml")),
    ("bgd", include_str!("countries/bgd.yaml")),
    ("eth", include_str!("countries/eth.yaml")),
    ("mwi", include_str!("countries/mwi.yaml")),
    ("ner", include_str!("countries/ner.yaml")),
    ("npl", include_str!("countries/npl.yaml")),
    ("som", include_str!("countries/som.yaml")),
    ("tcd", include_str!("countries/tcd.yaml")),
];

/// Settings for one country. Immutable once created.
#[derive(Debug, Clone)]
pub struct CountryConfig {
    iso3: String,
    codab: Option<RawCodAb>,
    fewsnet: Option<RawFewsNet>,
    glofas: Option<GlofasConfig>,
    usgs_ndvi: Option<RawUsgsNdvi>,
}

#[derive(Debug, Deserialize)]
struct RawCountryConfig {
    iso3: String,
    #[serde(default)]
    codab: Option<RawCodAb>,
    #[serde(default)]
    fewsnet: Option<RawFewsNet>,
    #[serde(default)]
    glofas: Option<GlofasConfig>,
    #[serde(default)]
    usgs_ndvi: Option<RawUsgsNdvi>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawCodAb {
    hdx_dataset_name: String,
    layer_base_name: String,
    admin_level_max: i64,
    admin0_name: Option<String>,
    admin1_name: Option<String>,
    admin2_name: Option<String>,
    admin3_name: Option<String>,
    admin4_name: Option<String>,
    #[serde(default)]
    custom_layer_names: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawFewsNet {
    region_name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawUsgsNdvi {
    area_name: String,
}

/// Validated COD AB section.
#[derive(Debug, Clone, PartialEq)]
pub struct CodAbConfig {
    pub hdx_dataset_name: String,
    pub layer_base_name: String,
    pub admin_level_max: u8,
    /// Layer name per admin level, `0..=admin_level_max`.
    pub admin_level_names: Vec<String>,
    pub custom_layer_names: Vec<String>,
}

/// Validated FEWS NET section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FewsNetConfig {
    pub region_name: String,
    pub region_code: String,
}

/// A named coordinate where river discharge is extracted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReportingPoint {
    pub name: String,
    pub lon: f64,
    pub lat: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GlofasConfig {
    pub reporting_points: Vec<ReportingPoint>,
}

/// Validated USGS NDVI section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsgsNdviConfig {
    pub area_name: String,
    pub area_url: String,
    pub area_prefix: String,
}

impl CountryConfig {
    /// Returns the built-in configuration for `iso3`.
    pub fn built_in(iso3: &str) -> Result<Self> {
        let iso3 = validate_iso3(iso3)?;
        let document = BUILT_IN
            .iter()
            .find(|(code, _)| *code == iso3)
            .map(|(_, document)| *document)
            .ok_or_else(|| {
                Error::Config(format!(
                    "A configuration file for {} is not yet available. \
                     Try using a custom configuration file instead.",
                    iso3.to_uppercase()
                ))
            })?;

        Self::from_yaml(document)
    }

    /// Loads and validates a user supplied configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let document = fs::read_to_string(path)?;
        Self::from_yaml(&document)
    }

    pub fn from_yaml(document: &str) -> Result<Self> {
        let raw: RawCountryConfig = serde_yaml::from_str(document)?;

        Ok(CountryConfig {
            iso3: validate_iso3(&raw.iso3)?,
            codab: raw.codab,
            fewsnet: raw.fewsnet,
            glofas: raw.glofas,
            usgs_ndvi: raw.usgs_ndvi,
        })
    }

    /// Lower-case three-letter country code.
    pub fn iso3(&self) -> &str {
        &self.iso3
    }

    pub fn codab(&self) -> Result<CodAbConfig> {
        let raw = self
            .codab
            .as_ref()
            .ok_or(Error::MissingSection { section: "codab" })?;

        if !raw.layer_base_name.contains(ADMIN_LEVEL_PLACEHOLDER) {
            return Err(Error::Config(
                "In the COD AB section of the country configuration file, \
                 layer_base_name must contain an {admin_level} placeholder."
                    .to_string(),
            ));
        }
        if !(0..=MAX_ADMIN_LEVEL as i64).contains(&raw.admin_level_max) {
            return Err(Error::Config(format!(
                "In the COD AB section of the country configuration file, \
                 admin_level_max must be between 0 and {MAX_ADMIN_LEVEL}."
            )));
        }
        let admin_level_max = raw.admin_level_max as u8;

        let overrides = [
            &raw.admin0_name,
            &raw.admin1_name,
            &raw.admin2_name,
            &raw.admin3_name,
            &raw.admin4_name,
        ];
        let admin_level_names = (0..=admin_level_max)
            .map(|level| {
                overrides[level as usize].clone().unwrap_or_else(|| {
                    raw.layer_base_name
                        .replace(ADMIN_LEVEL_PLACEHOLDER, &level.to_string())
                })
            })
            .collect();

        Ok(CodAbConfig {
            hdx_dataset_name: raw.hdx_dataset_name.clone(),
            layer_base_name: raw.layer_base_name.clone(),
            admin_level_max,
            admin_level_names,
            custom_layer_names: raw.custom_layer_names.clone().unwrap_or_default(),
        })
    }

    pub fn fewsnet(&self) -> Result<FewsNetConfig> {
        let raw = self
            .fewsnet
            .as_ref()
            .ok_or(Error::MissingSection { section: "fewsnet" })?;

        let (_, code) = FEWSNET_REGIONS
            .iter()
            .find(|(name, _)| *name == raw.region_name)
            .ok_or_else(|| {
                Error::Config(format!(
                    "Invalid region name: {}. Should be one of {}",
                    raw.region_name,
                    FEWSNET_REGIONS
                        .iter()
                        .map(|(name, _)| *name)
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })?;

        Ok(FewsNetConfig {
            region_name: raw.region_name.clone(),
            region_code: code.to_string(),
        })
    }

    pub fn glofas(&self) -> Result<GlofasConfig> {
        self.glofas
            .clone()
            .ok_or(Error::MissingSection { section: "glofas" })
    }

    pub fn usgs_ndvi(&self) -> Result<UsgsNdviConfig> {
        let raw = self
            .usgs_ndvi
            .as_ref()
            .ok_or(Error::MissingSection {
                section: "usgs_ndvi",
            })?;

        let (_, url, prefix) = NDVI_AREAS
            .iter()
            .find(|(name, _, _)| *name == raw.area_name)
            .ok_or_else(|| {
                Error::Config(format!(
                    "Invalid area name: {}. Should be one of {}",
                    raw.area_name,
                    NDVI_AREAS
                        .iter()
                        .map(|(name, _, _)| *name)
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })?;

        Ok(UsgsNdviConfig {
            area_name: raw.area_name.clone(),
            area_url: url.to_string(),
            area_prefix: prefix.to_string(),
        })
    }
}

/// Ensures the code is three alphabetic characters and lower-cases it.
pub fn validate_iso3(iso3: &str) -> Result<String> {
    if iso3.chars().count() != 3 || !iso3.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(Error::Config(
            "ISO3 must be a three letter string.".to_string(),
        ));
    }
    Ok(iso3.to_lowercase())
}

// -- Tests -------------------------------------------------------------------
