//! FEWS NET food insecurity classifications.
//!
//! Depending on the date, FEWS NET publishes per country or per region. The
//! country package is preferred and the regional one used as a fallback.

use std::{fmt, path::PathBuf};

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::DataSource;
use crate::{
    config::{Access, CountryConfig, Coverage, FewsNetConfig, PathConfig, SourceDirs},
    download::{check_file_existence, download_url, http_client},
    error::{Error, Result},
    vector::{extract_zip, read_shapefile, FeatureCollection},
};

const SOURCE_DIR: &str = "fewsnet";
const FIRST_PUBLICATION: (i32, u32) = (2009, 1);
const PACKAGE_URL: &str = "https://fdw.fews.net/api/ipcpackage/";
const REGION_URL: &str = "https://fews.net/data_portal_download/download?data_file_path=\
                          http://shapefiles.fews.net.s3.amazonaws.com/HFIC";

/// Countries FEWS NET reports on, plus the built-in configurations.
const ISO3_TO_ISO2: [(&str, &str); 40] = [
    ("afg", "AF"),
    ("ago", "AO"),
    ("bdi", "BI"),
    ("bfa", "BF"),
    ("bgd", "BD"),
    ("caf", "CF"),
    ("cmr", "CM"),
    ("cod", "CD"),
    ("dji", "DJ"),
    ("eth", "ET"),
    ("gin", "GN"),
    ("gtm", "GT"),
    ("hnd", "HN"),
    ("hti", "HT"),
    ("ken", "KE"),
    ("lbr", "LR"),
    ("lso", "LS"),
    ("mdg", "MG"),
    ("mli", "ML"),
    ("moz", "MZ"),
    ("mrt", "MR"),
    ("mwi", "MW"),
    ("ner", "NE"),
    ("nga", "NG"),
    ("nic", "NI"),
    ("npl", "NP"),
    ("rwa", "RW"),
    ("sdn", "SD"),
    ("sen", "SN"),
    ("sle", "SL"),
    ("slv", "SV"),
    ("som", "SO"),
    ("ssd", "SS"),
    ("tcd", "TD"),
    ("tjk", "TJ"),
    ("tza", "TZ"),
    ("uga", "UG"),
    ("yem", "YE"),
    ("zmb", "ZM"),
    ("zwe", "ZW"),
];

/// Current situation or one of the two projection periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionPeriod {
    /// Current situation.
    CS,
    /// Near term projection.
    ML1,
    /// Medium term projection.
    ML2,
}

impl fmt::Display for ProjectionPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProjectionPeriod::CS => "CS",
            ProjectionPeriod::ML1 => "ML1",
            ProjectionPeriod::ML2 => "ML2",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for ProjectionPeriod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "CS" => Ok(ProjectionPeriod::CS),
            "ML1" => Ok(ProjectionPeriod::ML1),
            "ML2" => Ok(ProjectionPeriod::ML2),
            other => Err(Error::Config(format!(
                "{other} is not a valid projection period. It must be one of CS, ML1, ML2"
            ))),
        }
    }
}

/// FEWS NET data published in one year-month.
#[derive(Debug, Clone)]
pub struct FewsNet {
    iso3: String,
    iso2: String,
    config: FewsNetConfig,
    dirs: SourceDirs,
    pub_year: i32,
    pub_month: u32,
    package_base: String,
    region_base: String,
}

impl FewsNet {
    pub fn new(
        country: &CountryConfig,
        paths: &PathConfig,
        pub_year: i32,
        pub_month: u32,
    ) -> Result<Self> {
        let config = country.fewsnet()?;
        let iso2 = iso2_from_iso3(country.iso3())?;
        check_date_validity(pub_year, pub_month, Local::now().date_naive())?;
        let dirs = SourceDirs::new(
            paths,
            country.iso3(),
            SOURCE_DIR,
            Access::Public,
            Coverage::Global,
            Coverage::Country,
        );

        Ok(FewsNet {
            iso3: country.iso3().to_string(),
            iso2: iso2.to_string(),
            config,
            dirs,
            pub_year,
            pub_month,
            package_base: PACKAGE_URL.to_string(),
            region_base: REGION_URL.to_string(),
        })
    }

    /// Fetches country packages from `package_url` and regional archives
    /// from under `region_url`.
    pub fn with_urls(mut self, package_url: impl Into<String>, region_url: impl Into<String>) -> Self {
        self.package_base = package_url.into();
        self.region_base = region_url.into();
        self
    }

    fn pub_date_str(&self) -> String {
        format!("{}{:02}", self.pub_year, self.pub_month)
    }

    /// Directory holding the unzipped data of `area`, an ISO2 code or a
    /// region code.
    fn raw_dir(&self, area: &str) -> PathBuf {
        self.dirs.raw.join(format!("{area}_{}", self.pub_date_str()))
    }

    fn country_url(&self) -> String {
        format!(
            "{}?country_code={}&collection_date={}-{:02}-01",
            self.package_base, self.iso2, self.pub_year, self.pub_month
        )
    }

    fn region_url(&self) -> String {
        format!(
            "{}/{}/{}{}.zip",
            self.region_base,
            self.config.region_code,
            self.config.region_name,
            self.pub_date_str()
        )
    }

    async fn download_zip(&self, url: &str, area: &str, clobber: bool) -> Result<PathBuf> {
        let output_dir = self.raw_dir(area);
        if check_file_existence(&output_dir, clobber) {
            return Ok(output_dir);
        }

        let temp_dir = TempDir::new()?;
        let zip_path = temp_dir
            .path()
            .join(format!("{area}{}.zip", self.pub_date_str()));
        download_url(&http_client()?, url, &zip_path).await?;
        info!("Downloaded {} to {}", url, zip_path.display());

        extract_zip(&zip_path, &output_dir).map_err(|err| {
            // leave no half extracted directory behind for the fallback check
            let _ = std::fs::remove_dir_all(&output_dir);
            err
        })?;
        debug!("Unzipped to {}", output_dir.display());

        Ok(output_dir)
    }

    /// The country directory if present, else the regional one.
    fn find_raw_dir(&self) -> Result<PathBuf> {
        [self.raw_dir(&self.iso2), self.raw_dir(&self.config.region_code)]
            .into_iter()
            .find(|dir| dir.is_dir())
            .ok_or_else(|| {
                Error::MissingData(format!(
                    "No data found for {}-{:02} covering {} or {}. Please make sure \
                     the data exists and is downloaded",
                    self.pub_year, self.pub_month, self.iso3, self.config.region_name
                ))
            })
    }
}

/// Data is published since 2009 and never for the future.
fn check_date_validity(pub_year: i32, pub_month: u32, today: NaiveDate) -> Result<NaiveDate> {
    let pub_date = NaiveDate::from_ymd_opt(pub_year, pub_month, 1).ok_or_else(|| {
        Error::InvalidDate(format!(
            "The combination of pub_year-pub_month, {pub_year}-{pub_month}, is not a valid date."
        ))
    })?;
    if (pub_year, pub_month) < FIRST_PUBLICATION {
        return Err(Error::InvalidDate(format!(
            "FEWS NET publishes data since 2009, so adjust your pub_year to be >=2009, \
             currently {pub_year}"
        )));
    }
    if pub_date > today {
        return Err(Error::InvalidDate(
            "There is no data published in the future. The date should refer to the \
             start month-year of the Current situation period."
                .to_string(),
        ));
    }
    Ok(pub_date)
}

fn iso2_from_iso3(iso3: &str) -> Result<&'static str> {
    ISO3_TO_ISO2
        .iter()
        .find(|(code, _)| *code == iso3)
        .map(|(_, iso2)| *iso2)
        .ok_or_else(|| {
            Error::Config(format!(
                "No ISO2 found for the given ISO3. Check your ISO3, currently: {iso3}."
            ))
        })
}

#[async_trait]
impl DataSource for FewsNet {
    type ProcessArgs = ();
    type LoadArgs = ProjectionPeriod;
    type Output = FeatureCollection;

    async fn download(&self, clobber: bool) -> Result<PathBuf> {
        let country = self.download_zip(&self.country_url(), &self.iso2, clobber).await;
        match country {
            Err(Error::Zip(_)) | Err(Error::RequestFailed { .. }) => {
                info!(
                    "No country data for {} in {}, trying region {}",
                    self.iso2,
                    self.pub_date_str(),
                    self.config.region_code
                );
                self.download_zip(&self.region_url(), &self.config.region_code, clobber)
                    .await
                    .map_err(|err| match err {
                        Error::Zip(_) | Error::RequestFailed { .. } => Error::MissingData(format!(
                            "No country or regional data found for {}-{:02}. Check on the \
                             FEWS NET website that data for your given date and \
                             country/region exists.",
                            self.pub_year, self.pub_month
                        )),
                        other => other,
                    })
            }
            other => other,
        }
    }

    fn process(&self, _args: (), _clobber: bool) -> Result<PathBuf> {
        info!("`process()` method not yet implemented for FEWS NET.");
        Ok(self.dirs.processed.clone())
    }

    fn load(&self, projection_period: ProjectionPeriod) -> Result<FeatureCollection> {
        warn!("load() returns the raw data.");
        let dir = self.find_raw_dir()?;
        let dir_name = dir
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let file_path = dir.join(format!("{dir_name}_{projection_period}.shp"));
        if !file_path.is_file() {
            return Err(Error::MissingData(format!(
                "File {} not found. Make sure the projection period {} exists for {}.",
                file_path.display(),
                projection_period,
                dir_name
            )));
        }

        read_shapefile(&file_path)
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        download::tests::{serve, Route},
        vector::tests::{write_layer, zip_dir},
    };
    use std::fs;

    fn eth_fewsnet(base: &std::path::Path) -> FewsNet {
        let country = CountryConfig::built_in("eth").unwrap();
        FewsNet::new(&country, &PathConfig::new(base), 2021, 6).unwrap()
    }

    #[test]
    fn should_validate_publication_date() {
        let today = NaiveDate::from_ymd_opt(2022, 5, 10).unwrap();

        assert!(check_date_validity(2021, 6, today).is_ok());
        assert!(check_date_validity(2008, 12, today).is_err());
        assert!(check_date_validity(2022, 6, today).is_err());
        assert!(check_date_validity(2021, 13, today).is_err());
    }

    #[test]
    fn should_store_raw_data_in_global_dir() {
        let fewsnet = eth_fewsnet(std::path::Path::new("/data"));

        assert_eq!(
            fewsnet.raw_dir("ET"),
            PathBuf::from("/data/public/raw/glb/fewsnet/ET_202106")
        );
        assert!(fewsnet.country_url().contains("country_code=ET&collection_date=2021-06-01"));
        assert!(fewsnet.region_url().ends_with("/HFIC/EA/east-africa202106.zip"));
    }

    #[test]
    fn should_fall_back_to_region_dir_on_load() {
        let base = tempfile::TempDir::new().unwrap();
        let fewsnet = eth_fewsnet(base.path());
        let region_dir = fewsnet.raw_dir("EA");
        fs::create_dir_all(&region_dir).unwrap();
        write_layer(
            &region_dir,
            "EA_202106_ML1",
            "ML1",
            &[("3", [38.0, 8.0, 40.0, 10.0])],
        );

        let ml1 = fewsnet.load(ProjectionPeriod::ML1).unwrap();

        assert_eq!(ml1.len(), 1);
        assert!(matches!(
            fewsnet.load(ProjectionPeriod::ML2),
            Err(Error::MissingData(_))
        ));
    }

    #[test]
    fn should_fail_loading_without_download() {
        let base = tempfile::TempDir::new().unwrap();

        assert!(matches!(
            eth_fewsnet(base.path()).load(ProjectionPeriod::CS),
            Err(Error::MissingData(_))
        ));
    }

    #[test]
    fn should_parse_projection_period() {
        assert_eq!("ML2".parse::<ProjectionPeriod>().unwrap(), ProjectionPeriod::ML2);
        assert!("ML3".parse::<ProjectionPeriod>().is_err());
    }

    fn zipped_region_layer() -> Vec<u8> {
        let layers = tempfile::TempDir::new().unwrap();
        write_layer(
            layers.path(),
            "EA_202106_CS",
            "CS",
            &[("2", [38.0, 8.0, 40.0, 10.0])],
        );
        let out = tempfile::TempDir::new().unwrap();
        let archive = out.path().join("EA_202106.zip");
        zip_dir(layers.path(), &archive, "");

        fs::read(&archive).unwrap()
    }

    #[tokio::test]
    async fn should_download_regional_archive_when_country_is_missing() {
        let base = tempfile::TempDir::new().unwrap();
        let server = serve(vec![Route::new(
            "/HFIC/EA/east-africa202106.zip",
            200,
            zipped_region_layer(),
        )])
        .await;
        let fewsnet =
            eth_fewsnet(base.path()).with_urls(format!("{server}/ipcpackage/"), format!("{server}/HFIC"));

        let raw_dir = fewsnet.download(false).await.unwrap();

        assert_eq!(raw_dir, fewsnet.raw_dir("EA"));
        assert!(!fewsnet.raw_dir("ET").exists());
        assert_eq!(fewsnet.load(ProjectionPeriod::CS).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn should_fail_when_neither_country_nor_region_exists() {
        let base = tempfile::TempDir::new().unwrap();
        let server = serve(vec![]).await;
        let fewsnet =
            eth_fewsnet(base.path()).with_urls(format!("{server}/ipcpackage/"), format!("{server}/HFIC"));

        assert!(matches!(
            fewsnet.download(false).await,
            Err(Error::MissingData(_))
        ));
        assert!(!fewsnet.raw_dir("ET").exists());
        assert!(!fewsnet.raw_dir("EA").exists());
    }
}
