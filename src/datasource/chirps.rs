//! CHIRPS observed precipitation, served by the IRI data library.

use std::{fmt, path::PathBuf};

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use tracing::info;

use super::{load_existing, process_units, DataSource, Unit};
use crate::{
    config::{Access, CountryConfig, Coverage, PathConfig, SourceDirs},
    dates::{days, last_of_month, months, DateRange},
    download::{check_file_existence, download_url, ensure_success, http_client},
    error::{Error, Result},
    geobox::GeoBoundingBox,
    parquet::{load_raster, save_raster},
    raster::Raster,
    reading::read_variable,
};

const SOURCE_DIR: &str = "chirps";
const BASE_URL: &str = "https://iridl.ldeo.columbia.edu/SOURCES/.UCSB/.CHIRPS/.v2p0/";
const VALID_RESOLUTIONS: [f64; 2] = [0.05, 0.25];
const MONTHLY_RESOLUTION: f64 = 0.05;
const RAW_VARIABLES: [&str; 2] = ["prcp", "precipitation"];
const VARIABLE: &str = "precipitation";

const MONTH_ABBR: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

fn first_available_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1981, 1, 1).unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChirpsFrequency {
    Daily,
    Monthly,
}

impl fmt::Display for ChirpsFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChirpsFrequency::Daily => "daily",
            ChirpsFrequency::Monthly => "monthly",
        })
    }
}

/// CHIRPS precipitation over a bounding box and date range, one file per
/// day or month.
#[derive(Debug, Clone)]
pub struct Chirps {
    iso3: String,
    frequency: ChirpsFrequency,
    resolution: f64,
    geobb: GeoBoundingBox,
    start_date: NaiveDate,
    end_date: NaiveDate,
    dirs: SourceDirs,
}

impl Chirps {
    /// Asks the IRI data library for the most recent available date, then
    /// builds the source. An open end of `dates` means up to that date.
    pub async fn new(
        country: &CountryConfig,
        paths: &PathConfig,
        geobb: &GeoBoundingBox,
        frequency: ChirpsFrequency,
        resolution: f64,
        dates: DateRange,
    ) -> Result<Self> {
        check_resolution(frequency, resolution)?;
        let last_available = fetch_last_available_date(frequency, resolution).await?;
        Self::with_last_available(country, paths, geobb, frequency, resolution, dates, last_available)
    }

    /// Same as [`Chirps::new`] with a known last available date.
    pub fn with_last_available(
        country: &CountryConfig,
        paths: &PathConfig,
        geobb: &GeoBoundingBox,
        frequency: ChirpsFrequency,
        resolution: f64,
        dates: DateRange,
        last_available: NaiveDate,
    ) -> Result<Self> {
        check_resolution(frequency, resolution)?;
        let start_date = dates.start.unwrap_or_else(first_available_date);
        let end_date = dates.end.unwrap_or(last_available);
        if !(first_available_date() <= start_date
            && start_date <= end_date
            && end_date <= last_available)
        {
            return Err(Error::InvalidDate(format!(
                "Make sure that the input dates are ordered in the following way: \
                 {} <= {start_date} <= {end_date} <= {last_available}. The two outer \
                 dates indicate the range for which CHIRPS data are currently available.",
                first_available_date()
            )));
        }

        Ok(Chirps {
            iso3: country.iso3().to_string(),
            frequency,
            resolution,
            geobb: geobb.round(resolution)?,
            start_date,
            end_date,
            dirs: SourceDirs::new(
                paths,
                country.iso3(),
                SOURCE_DIR,
                Access::Public,
                Coverage::Country,
                Coverage::Country,
            ),
        })
    }

    fn unit_dates(&self) -> Vec<NaiveDate> {
        match self.frequency {
            ChirpsFrequency::Daily => days(self.start_date, self.end_date),
            ChirpsFrequency::Monthly => months(self.start_date, self.end_date),
        }
    }

    /// File stem shared by the raw and processed file of `date`.
    fn file_stem(&self, date: NaiveDate) -> String {
        let day = match self.frequency {
            ChirpsFrequency::Daily => format!("{:02}_", date.day()),
            ChirpsFrequency::Monthly => String::new(),
        };
        format!(
            "{}_chirps_{}_{}_{:02}_{day}r{}_{}",
            self.iso3,
            self.frequency,
            date.year(),
            date.month(),
            self.resolution,
            self.geobb.get_filename_repr(0)
        )
    }

    fn unit(&self, date: NaiveDate) -> Unit {
        let stem = self.file_stem(date);
        Unit {
            raw: self.dirs.raw.join(format!("{stem}.nc")),
            processed: self.dirs.processed.join(format!("{stem}.parquet")),
        }
    }

    fn location_url(&self) -> String {
        format!(
            "X/%28{}%29%28{}%29RANGEEDGES/Y/%28{}%29%28{}%29RANGEEDGES/",
            self.geobb.lon_min(),
            self.geobb.lon_max(),
            self.geobb.lat_max(),
            self.geobb.lat_min()
        )
    }

    fn url(&self, date: NaiveDate) -> String {
        let month = MONTH_ABBR[date.month0() as usize];
        let year = date.year();
        match self.frequency {
            ChirpsFrequency::Monthly => format!(
                "{BASE_URL}.monthly/.global/.precipitation/{}\
                 T/%28{month}%20{year}%29%28{month}%20{year}%29RANGEEDGES/data.nc",
                self.location_url()
            ),
            ChirpsFrequency::Daily => {
                let day = format!("{:02}", date.day());
                format!(
                    "{BASE_URL}.daily-improved/.global/.{}/.prcp/{}\
                     T/%28{day}%20{month}%20{year}%29%28{day}%20{month}%20{year}%29RANGEEDGES/data.nc",
                    resolution_code(self.resolution),
                    self.location_url()
                )
            }
        }
    }
}

fn check_resolution(frequency: ChirpsFrequency, resolution: f64) -> Result<()> {
    if !VALID_RESOLUTIONS.contains(&resolution) {
        return Err(Error::Config(format!(
            "The given resolution is {resolution}, which is not available. Has to be 0.05 or 0.25."
        )));
    }
    if frequency == ChirpsFrequency::Monthly && resolution != MONTHLY_RESOLUTION {
        return Err(Error::Config(format!(
            "Monthly CHIRPS data is only available at a resolution of {MONTHLY_RESOLUTION}"
        )));
    }
    Ok(())
}

/// `0.05` -> `0p05`, as used in the data library paths.
fn resolution_code(resolution: f64) -> String {
    resolution.to_string().replace('.', "p")
}

fn last_available_url(frequency: ChirpsFrequency, resolution: f64) -> String {
    let dataset = match frequency {
        ChirpsFrequency::Monthly => ".monthly/.global/".to_string(),
        ChirpsFrequency::Daily => format!(".daily-improved/.global/.{}/", resolution_code(resolution)),
    };
    format!("{BASE_URL}{dataset}.T/last/subgrid/0./add/T/table%3A/1/%3Atable/.csv")
}

async fn fetch_last_available_date(frequency: ChirpsFrequency, resolution: f64) -> Result<NaiveDate> {
    let url = last_available_url(frequency, resolution);
    let response = ensure_success(http_client()?.get(&url).send().await?)?;
    parse_last_available(&response.text().await?, frequency)
}

/// Reads the single-row CSV table of the data library. Monthly dates are
/// given as `Mon YYYY` and resolved to the last day of that month.
fn parse_last_available(csv: &str, frequency: ChirpsFrequency) -> Result<NaiveDate> {
    let value = csv
        .lines()
        .skip(1)
        .map(|line| line.split(',').next().unwrap_or("").trim().trim_matches('"'))
        .find(|value| !value.is_empty())
        .ok_or_else(|| Error::Format("Empty last available date table".to_string()))?;

    let parsed = match frequency {
        ChirpsFrequency::Monthly => {
            NaiveDate::parse_from_str(&format!("01 {value}"), "%d %b %Y").map(last_of_month)
        }
        ChirpsFrequency::Daily => NaiveDate::parse_from_str(value, "%d %b %Y"),
    };
    parsed.map_err(|_| Error::Format(format!("Cannot parse last available date `{value}`")))
}

#[async_trait]
impl DataSource for Chirps {
    type ProcessArgs = ();
    type LoadArgs = ();
    type Output = Raster;

    async fn download(&self, clobber: bool) -> Result<PathBuf> {
        let dates = self.unit_dates();
        if let (Some(first), Some(last)) = (dates.first(), dates.last()) {
            info!(
                "{} data will be downloaded, starting from {} to {}.",
                self.frequency, first, last
            );
        }

        let client = http_client()?;
        for date in dates {
            let raw = self.unit(date).raw;
            if check_file_existence(&raw, clobber) {
                continue;
            }
            info!("Downloading CHIRPS NetCDF file.");
            download_url(&client, &self.url(date), &raw).await?;
        }

        Ok(self.dirs.raw.clone())
    }

    fn process(&self, _args: (), clobber: bool) -> Result<PathBuf> {
        let units: Vec<Unit> = self.unit_dates().into_iter().map(|d| self.unit(d)).collect();
        process_units(&units, clobber, |unit| {
            let raster = RAW_VARIABLES
                .iter()
                .find_map(|name| read_variable(&unit.raw, name).ok())
                .ok_or_else(|| {
                    Error::Format(format!(
                        "The dataset {} is not a valid CHIRPS NetCDF file: something probably \
                         went wrong during the download. Try downloading the file again.",
                        unit.raw.display()
                    ))
                })?;
            save_raster(&raster.rename(VARIABLE), &unit.processed)
        })?;

        Ok(self.dirs.processed.clone())
    }

    fn load(&self, _args: ()) -> Result<Raster> {
        let paths: Vec<PathBuf> = self
            .unit_dates()
            .into_iter()
            .map(|date| self.unit(date).processed)
            .collect();
        let rasters = load_existing(&paths, load_raster)?;

        Raster::concat_time(rasters)
    }
}

// -- Tests -------------------------------------------------------------------
