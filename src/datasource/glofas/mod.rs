//! GloFAS river discharge from the Copernicus Climate Data Store, extracted
//! at the reporting points of the country configuration.
//!
//! Requests are split per year, month or day depending on the product, as
//! the CDS limits the size of a single query.

pub mod cds;

use std::{collections::HashMap, fmt, path::PathBuf, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{Datelike, Local, NaiveDate};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::{load_existing, process_units, DataSource, Unit};
use crate::{
    config::{Access, CountryConfig, Coverage, PathConfig, ReportingPoint, SourceDirs},
    dates::{days, months, DateRange},
    download::check_file_existence,
    error::{Error, Result},
    geobox::GeoBoundingBox,
    parquet::{load_table, save_table, ColumnData, Table},
    reading::{read_grib, GribField},
};

pub use cds::{CdsClient, HttpCdsClient, RequestState};

const SOURCE_DIR: &str = "glofas";
const HYDROLOGICAL_MODEL: &str = "lisflood";
const VARIABLE: &str = "river_discharge_in_the_last_24_hours";
const PENDING_FILE: &str = "pending_requests.json";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// How the queries, and thus the files, of a product are split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frequency {
    Yearly,
    Monthly,
    Daily,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlofasProduct {
    /// Consolidated historical discharge since 1979, one file per year.
    Reanalysis,
    /// Operational ensemble forecast since 2021-05-26, one file per day.
    Forecast { leadtime_max: u32 },
    /// Ensemble reforecast 1999-2018, one file per month.
    Reforecast { leadtime_max: u32 },
}

impl GlofasProduct {
    pub fn cds_name(&self) -> &'static str {
        match self {
            GlofasProduct::Reanalysis => "cems-glofas-historical",
            GlofasProduct::Forecast { .. } => "cems-glofas-forecast",
            GlofasProduct::Reforecast { .. } => "cems-glofas-reforecast",
        }
    }

    fn system_version(&self) -> &'static str {
        match self {
            GlofasProduct::Forecast { .. } => "operational",
            _ => "version_3_1",
        }
    }

    fn product_type(&self) -> Value {
        match self {
            GlofasProduct::Reanalysis => json!("consolidated"),
            GlofasProduct::Forecast { .. } => {
                json!(["control_forecast", "ensemble_perturbed_forecasts"])
            }
            GlofasProduct::Reforecast { .. } => {
                json!(["control_reforecast", "ensemble_perturbed_reforecasts"])
            }
        }
    }

    fn date_prefix(&self) -> &'static str {
        match self {
            GlofasProduct::Forecast { .. } => "",
            _ => "h",
        }
    }

    fn frequency(&self) -> Frequency {
        match self {
            GlofasProduct::Reanalysis => Frequency::Yearly,
            GlofasProduct::Forecast { .. } => Frequency::Daily,
            GlofasProduct::Reforecast { .. } => Frequency::Monthly,
        }
    }

    fn leadtime_max(&self) -> Option<u32> {
        match self {
            GlofasProduct::Reanalysis => None,
            GlofasProduct::Forecast { leadtime_max } | GlofasProduct::Reforecast { leadtime_max } => {
                Some(*leadtime_max)
            }
        }
    }

    /// Earliest and latest date the CDS serves, `today` when open ended.
    fn date_limits(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap_or(today);
        match self {
            GlofasProduct::Reanalysis => (date(1979, 1, 1), today),
            GlofasProduct::Forecast { .. } => (date(2021, 5, 26), today),
            GlofasProduct::Reforecast { .. } => (date(1999, 1, 1), date(2018, 12, 31)),
        }
    }
}

impl fmt::Display for GlofasProduct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GlofasProduct::Reanalysis => "reanalysis",
            GlofasProduct::Forecast { .. } => "forecast",
            GlofasProduct::Reforecast { .. } => "reforecast",
        })
    }
}

/// Fills open ends with the product limits and clamps to them. Only an
/// inverted range is an error.
fn set_dates(
    start_date_min: NaiveDate,
    end_date_max: NaiveDate,
    dates: DateRange,
) -> Result<(NaiveDate, NaiveDate)> {
    let mut start_date = dates.start.unwrap_or(start_date_min);
    let mut end_date = dates.end.unwrap_or(end_date_max);
    if start_date > end_date {
        return Err(Error::InvalidDate(
            "Please ensure that the start date is <= the end date".to_string(),
        ));
    }
    if start_date < start_date_min {
        warn!(
            "Start date {} is too far in the past, setting to {}",
            start_date, start_date_min
        );
        start_date = start_date_min;
    }
    if end_date > end_date_max {
        warn!(
            "End date {} is too far in the future, setting to {}",
            end_date, end_date_max
        );
        end_date = end_date_max;
    }
    Ok((start_date, end_date))
}

/// GloFAS discharge of one product over a bounding box and date range.
#[derive(Clone)]
pub struct Glofas {
    iso3: String,
    product: GlofasProduct,
    geobb: GeoBoundingBox,
    start_date: NaiveDate,
    end_date: NaiveDate,
    reporting_points: Option<Vec<ReportingPoint>>,
    dirs: SourceDirs,
    client: Option<Arc<dyn CdsClient>>,
    poll_interval: Duration,
}

impl fmt::Debug for Glofas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Glofas")
            .field("iso3", &self.iso3)
            .field("product", &self.product)
            .field("geobb", &self.geobb)
            .field("start_date", &self.start_date)
            .field("end_date", &self.end_date)
            .finish_non_exhaustive()
    }
}

impl Glofas {
    /// The bounding box is snapped to the `x.x5` grid the CDS expects.
    pub fn new(
        country: &CountryConfig,
        paths: &PathConfig,
        geobb: &GeoBoundingBox,
        product: GlofasProduct,
        dates: DateRange,
    ) -> Result<Self> {
        Self::with_today(country, paths, geobb, product, dates, Local::now().date_naive())
    }

    fn with_today(
        country: &CountryConfig,
        paths: &PathConfig,
        geobb: &GeoBoundingBox,
        product: GlofasProduct,
        dates: DateRange,
        today: NaiveDate,
    ) -> Result<Self> {
        let (start_date_min, end_date_max) = product.date_limits(today);
        let (start_date, end_date) = set_dates(start_date_min, end_date_max, dates)?;

        Ok(Glofas {
            iso3: country.iso3().to_string(),
            product,
            geobb: geobb.round_coords(0.05, 0.1)?,
            start_date,
            end_date,
            reporting_points: country.glofas().ok().map(|config| config.reporting_points),
            dirs: SourceDirs::new(
                paths,
                country.iso3(),
                SOURCE_DIR,
                Access::Public,
                Coverage::Country,
                Coverage::Country,
            ),
            client: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Uses `client` instead of a CDS client built from the environment.
    pub fn with_client(mut self, client: Arc<dyn CdsClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    fn raw_dir(&self) -> PathBuf {
        self.dirs.raw.join(self.product.cds_name())
    }

    fn unit_dates(&self) -> Vec<NaiveDate> {
        match self.product.frequency() {
            Frequency::Yearly => (self.start_date.year()..=self.end_date.year())
                .filter_map(|year| NaiveDate::from_ymd_opt(year, 1, 1))
                .collect(),
            Frequency::Monthly => months(self.start_date, self.end_date),
            Frequency::Daily => days(self.start_date, self.end_date),
        }
    }

    fn file_stem(&self, date: NaiveDate) -> String {
        let mut stem = format!("{}_{}_{}", self.iso3, self.product.cds_name(), date.year());
        if self.product.frequency() != Frequency::Yearly {
            stem.push_str(&format!("-{:02}", date.month()));
        }
        if self.product.frequency() == Frequency::Daily {
            stem.push_str(&format!("-{:02}", date.day()));
        }
        if let Some(leadtime_max) = self.product.leadtime_max() {
            stem.push_str(&format!("_ltmax{leadtime_max:02}d"));
        }
        stem.push_str(&format!("_{}", self.geobb.get_filename_repr(2)));
        stem
    }

    fn unit(&self, date: NaiveDate) -> Unit {
        let stem = self.file_stem(date);
        Unit {
            raw: self.raw_dir().join(format!("{stem}.grib")),
            processed: self.dirs.processed.join(format!("{stem}_processed.parquet")),
        }
    }

    fn query(&self, date: NaiveDate) -> Value {
        let prefix = self.product.date_prefix();
        let frequency = self.product.frequency();
        let all = |n: u32| Value::from((1..=n).map(|i| format!("{i:02}")).collect::<Vec<_>>());

        let mut query = Map::new();
        query.insert("variable".to_string(), json!(VARIABLE));
        query.insert("format".to_string(), json!("grib"));
        query.insert("product_type".to_string(), self.product.product_type());
        query.insert("system_version".to_string(), json!(self.product.system_version()));
        query.insert("hydrological_model".to_string(), json!(HYDROLOGICAL_MODEL));
        query.insert(format!("{prefix}year"), json!(date.year().to_string()));
        query.insert(
            format!("{prefix}month"),
            if frequency == Frequency::Yearly {
                all(12)
            } else {
                json!(format!("{:02}", date.month()))
            },
        );
        query.insert(
            format!("{prefix}day"),
            if frequency == Frequency::Daily {
                json!(format!("{:02}", date.day()))
            } else {
                all(31)
            },
        );
        query.insert(
            "area".to_string(),
            json!([
                self.geobb.lat_max(),
                self.geobb.lon_min(),
                self.geobb.lat_min(),
                self.geobb.lon_max()
            ]),
        );
        if let Some(leadtime_max) = self.product.leadtime_max() {
            let leadtimes: Vec<String> = (1..=leadtime_max).map(|day| (day * 24).to_string()).collect();
            query.insert("leadtime_hour".to_string(), json!(leadtimes));
        }

        Value::Object(query)
    }

    fn client(&self) -> Result<Arc<dyn CdsClient>> {
        match &self.client {
            Some(client) => Ok(client.clone()),
            None => Ok(Arc::new(HttpCdsClient::from_env()?)),
        }
    }
}

/// Discharge at every reporting point, one row per date, ensemble member
/// and lead time. Ensemble members are numbered in the order their fields
/// appear for the same date and lead time, the control member first.
fn reporting_point_table(
    fields: &[GribField],
    points: &[ReportingPoint],
    with_ensemble: bool,
) -> Result<Table> {
    let first = fields
        .first()
        .ok_or_else(|| Error::Format("No GRIB fields to process".to_string()))?;
    check_points_in_grid(first, points)?;

    let mut member_counts: HashMap<(NaiveDate, u32), i64> = HashMap::new();
    let mut rows: Vec<(NaiveDate, i64, u32, &GribField)> = fields
        .iter()
        .map(|field| {
            let count = member_counts.entry((field.ref_date, field.step_hours)).or_insert(0);
            let number = *count;
            *count += 1;
            (field.ref_date, number, field.step_hours, field)
        })
        .collect();
    rows.sort_by_key(|(date, number, step, _)| (*date, *number, *step));

    let mut columns = vec![(
        "time".to_string(),
        ColumnData::Date(rows.iter().map(|row| row.0).collect()),
    )];
    if with_ensemble {
        columns.push((
            "number".to_string(),
            ColumnData::Int(rows.iter().map(|row| row.1).collect()),
        ));
        columns.push((
            "step".to_string(),
            ColumnData::Int(rows.iter().map(|row| i64::from(row.2)).collect()),
        ));
    }
    for point in points {
        let values = rows
            .iter()
            .map(|(_, _, _, field)| {
                field
                    .nearest(point.lat, point.lon)
                    .map_or(f64::NAN, f64::from)
            })
            .collect();
        columns.push((point.name.clone(), ColumnData::Float(values)));
    }

    Table::new(columns)
}

fn extent(values: impl Iterator<Item = f32>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(f64::from(v)), hi.max(f64::from(v)))
    })
}

/// Every point must lie strictly inside the grid extent.
fn check_points_in_grid(field: &GribField, points: &[ReportingPoint]) -> Result<()> {
    let (lat_min, lat_max) = extent(field.latlons.iter().map(|latlon| latlon.0));
    let (lon_min, lon_max) = extent(field.latlons.iter().map(|latlon| latlon.1));

    for point in points {
        if !(lon_min < point.lon && point.lon < lon_max) {
            return Err(Error::Dimension(format!(
                "Reporting point {} has out-of-bounds lon value of {} (data lon ranges from {} to {})",
                point.name, point.lon, lon_min, lon_max
            )));
        }
        if !(lat_min < point.lat && point.lat < lat_max) {
            return Err(Error::Dimension(format!(
                "Reporting point {} has out-of-bounds lat value of {} (data lat ranges from {} to {})",
                point.name, point.lat, lat_min, lat_max
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl DataSource for Glofas {
    type ProcessArgs = ();
    type LoadArgs = ();
    type Output = Table;

    async fn download(&self, clobber: bool) -> Result<PathBuf> {
        let mut message = format!(
            "Downloading GloFAS {} for {} - {}",
            self.product, self.start_date, self.end_date
        );
        if let Some(leadtime_max) = self.product.leadtime_max() {
            message.push_str(&format!(" and up to {leadtime_max} day lead time"));
        }
        info!("{}", message);

        let retrievals: Vec<cds::Retrieval> = self
            .unit_dates()
            .into_iter()
            .filter_map(|date| {
                let raw = self.unit(date).raw;
                if check_file_existence(&raw, clobber) {
                    return None;
                }
                Some(cds::Retrieval {
                    filepath: raw,
                    query: self.query(date),
                })
            })
            .collect();
        if retrievals.is_empty() {
            info!("All GloFAS files already downloaded to {}", self.raw_dir().display());
            return Ok(self.raw_dir());
        }

        let client = self.client()?;
        let downloaded = cds::retrieve_all(
            client.as_ref(),
            self.product.cds_name(),
            retrievals,
            &self.raw_dir().join(PENDING_FILE),
            self.poll_interval,
            clobber,
        )
        .await?;
        info!("Downloaded {} files to {}", downloaded.len(), self.raw_dir().display());
        debug!("Files downloaded: {:?}", downloaded);

        Ok(self.raw_dir())
    }

    fn process(&self, _args: (), clobber: bool) -> Result<PathBuf> {
        let points = self.reporting_points.as_ref().ok_or(Error::MissingSection { section: "glofas" })?;
        info!(
            "Processing GloFAS {} for {} - {}",
            self.product, self.start_date, self.end_date
        );
        let with_ensemble = self.product.leadtime_max().is_some();
        let units: Vec<Unit> = self.unit_dates().into_iter().map(|d| self.unit(d)).collect();

        process_units(&units, clobber, |unit| {
            debug!("Processing {}", unit.raw.display());
            let fields = read_grib(&unit.raw)?;
            let table = reporting_point_table(&fields, points, with_ensemble)?;
            save_table(&table, &unit.processed)?;
            debug!("Wrote file to {}", unit.processed.display());
            Ok(())
        })?;

        Ok(self.dirs.processed.clone())
    }

    fn load(&self, _args: ()) -> Result<Table> {
        let paths: Vec<PathBuf> = self
            .unit_dates()
            .into_iter()
            .map(|date| self.unit(date).processed)
            .collect();
        let tables = load_existing(&paths, load_table)?;

        Table::concat(&tables)
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use cds::tests::MockCds;
    use std::fs;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn npl_geobb() -> GeoBoundingBox {
        GeoBoundingBox::new(30.42, 26.37, 88.17, 80.06).unwrap()
    }

    fn npl_glofas(base: &std::path::Path, product: GlofasProduct, dates: DateRange) -> Glofas {
        let country = CountryConfig::built_in("npl").unwrap();
        Glofas::with_today(
            &country,
            &PathConfig::new(base),
            &npl_geobb(),
            product,
            dates,
            date(2022, 10, 19),
        )
        .unwrap()
    }

    /// A 0.1 degree grid around Chatara with one field per member and step.
    fn fields(ref_date: NaiveDate, members: usize, steps: &[u32]) -> Vec<GribField> {
        let latlons: Vec<(f32, f32)> = [26.95, 26.85, 26.75]
            .iter()
            .flat_map(|&lat| [87.05, 87.15, 87.25].map(|lon| (lat, lon)))
            .collect();
        let mut fields = Vec::new();
        for member in 0..members {
            for &step in steps {
                let values = (0..latlons.len())
                    .map(|i| (member * 1000 + step as usize + i) as f32)
                    .collect();
                fields.push(GribField {
                    ref_date,
                    step_hours: step,
                    latlons: latlons.clone(),
                    values,
                });
            }
        }
        fields
    }

    fn chatara() -> ReportingPoint {
        ReportingPoint {
            name: "Chatara".to_string(),
            lon: 87.1625,
            lat: 26.8625,
        }
    }

    #[test]
    fn should_clamp_dates_to_product_limits() {
        let glofas = npl_glofas(
            std::path::Path::new("/data"),
            GlofasProduct::Reforecast { leadtime_max: 3 },
            DateRange::new(Some(date(1990, 1, 1)), Some(date(2020, 1, 1))),
        );

        assert_eq!(glofas.start_date(), date(1999, 1, 1));
        assert_eq!(glofas.end_date(), date(2018, 12, 31));
        assert!(set_dates(
            date(1979, 1, 1),
            date(2022, 1, 1),
            DateRange::new(Some(date(2021, 1, 2)), Some(date(2021, 1, 1)))
        )
        .is_err());
    }

    #[test]
    fn should_build_filenames_per_product() {
        let base = std::path::Path::new("/data");
        let reanalysis = npl_glofas(
            base,
            GlofasProduct::Reanalysis,
            DateRange::new(Some(date(2021, 1, 1)), Some(date(2022, 12, 31))),
        );
        let forecast = npl_glofas(
            base,
            GlofasProduct::Forecast { leadtime_max: 7 },
            DateRange::new(Some(date(2022, 10, 1)), None),
        );

        let unit = reanalysis.unit(date(2021, 1, 1));
        assert_eq!(
            unit.raw,
            PathBuf::from(
                "/data/public/raw/npl/glofas/cems-glofas-historical/\
                 npl_cems-glofas-historical_2021_Np30d55Sp26d25Ep88d25Wp79d95.grib"
            )
        );
        assert_eq!(reanalysis.unit_dates().len(), 2);
        assert_eq!(reanalysis.end_date(), date(2022, 10, 19));
        assert_eq!(
            forecast.unit(date(2022, 10, 3)).processed.file_name().unwrap(),
            "npl_cems-glofas-forecast_2022-10-03_ltmax07d_Np30d55Sp26d25Ep88d25Wp79d95_processed.parquet"
        );
        assert_eq!(forecast.unit_dates().len(), 19);
    }

    #[test]
    fn should_build_cds_queries() {
        let base = std::path::Path::new("/data");
        let reanalysis = npl_glofas(
            base,
            GlofasProduct::Reanalysis,
            DateRange::new(Some(date(2021, 1, 1)), Some(date(2021, 12, 31))),
        );
        let reforecast = npl_glofas(
            base,
            GlofasProduct::Reforecast { leadtime_max: 2 },
            DateRange::new(Some(date(2018, 3, 1)), Some(date(2018, 3, 31))),
        );

        let query = reanalysis.query(date(2021, 1, 1));
        assert_eq!(query["hyear"], "2021");
        assert_eq!(query["hmonth"].as_array().unwrap().len(), 12);
        assert_eq!(query["hday"].as_array().unwrap().len(), 31);
        assert_eq!(query["product_type"], "consolidated");
        assert_eq!(query["area"], json!([30.55, 79.95, 26.25, 88.25]));
        assert!(query.get("leadtime_hour").is_none());

        let query = reforecast.query(date(2018, 3, 1));
        assert_eq!(query["hmonth"], "03");
        assert_eq!(query["leadtime_hour"], json!(["24", "48"]));
        assert_eq!(query["system_version"], "version_3_1");
    }

    #[test]
    fn should_extract_nearest_values_per_member() {
        let table = reporting_point_table(&fields(date(2022, 10, 1), 2, &[24, 48]), &[chatara()], true)
            .unwrap();

        assert_eq!(table.num_rows(), 4);
        assert_eq!(table.ints("number").unwrap(), &[0, 0, 1, 1]);
        assert_eq!(table.ints("step").unwrap(), &[24, 48, 24, 48]);
        // (26.85, 87.15) is grid point 4
        assert_eq!(table.floats("Chatara").unwrap(), &[28.0, 52.0, 1028.0, 1052.0]);
    }

    #[test]
    fn should_reject_points_outside_grid() {
        let outside = ReportingPoint {
            name: "Far".to_string(),
            lon: 87.25,
            lat: 26.85,
        };

        assert!(matches!(
            reporting_point_table(&fields(date(2022, 10, 1), 1, &[24]), &[outside], true),
            Err(Error::Dimension(_))
        ));
    }

    #[tokio::test]
    async fn should_download_through_cds_and_skip_existing() {
        let base = TempDir::new().unwrap();
        let cds = Arc::new(MockCds {
            polls_until_done: 1,
            payload: b"GRIB".to_vec(),
            ..Default::default()
        });
        let glofas = npl_glofas(
            base.path(),
            GlofasProduct::Reanalysis,
            DateRange::new(Some(date(2020, 1, 1)), Some(date(2021, 12, 31))),
        )
        .with_client(cds.clone())
        .with_poll_interval(Duration::ZERO);
        fs::create_dir_all(glofas.raw_dir()).unwrap();
        fs::write(glofas.unit(date(2020, 1, 1)).raw, b"old").unwrap();

        let raw_dir = glofas.download(false).await.unwrap();

        assert_eq!(raw_dir, glofas.raw_dir());
        assert_eq!(cds.submitted.lock().unwrap().len(), 1);
        assert_eq!(cds.submitted.lock().unwrap()[0]["hyear"], "2021");
        assert_eq!(fs::read(glofas.unit(date(2020, 1, 1)).raw).unwrap(), b"old");
        assert_eq!(fs::read(glofas.unit(date(2021, 1, 1)).raw).unwrap(), b"GRIB");
        assert!(!glofas.raw_dir().join(PENDING_FILE).exists());
    }

    #[tokio::test]
    async fn should_redownload_and_drop_stored_requests_when_clobbering() {
        let base = TempDir::new().unwrap();
        let cds = Arc::new(MockCds {
            payload: b"GRIB".to_vec(),
            ..Default::default()
        });
        let glofas = npl_glofas(
            base.path(),
            GlofasProduct::Reanalysis,
            DateRange::new(Some(date(2020, 1, 1)), Some(date(2020, 12, 31))),
        )
        .with_client(cds.clone())
        .with_poll_interval(Duration::ZERO);
        let raw = glofas.unit(date(2020, 1, 1)).raw;
        fs::create_dir_all(glofas.raw_dir()).unwrap();
        fs::write(&raw, b"old").unwrap();
        let pending = glofas.raw_dir().join(PENDING_FILE);
        let stored = json!({
            raw.to_string_lossy(): {
                "request_id": "job-9",
                "query": glofas.query(date(2020, 1, 1)),
            }
        });
        fs::write(&pending, stored.to_string()).unwrap();

        glofas.download(true).await.unwrap();

        assert_eq!(cds.submitted.lock().unwrap().len(), 1);
        assert!(!cds.status_calls.lock().unwrap().contains_key("job-9"));
        assert_eq!(fs::read(&raw).unwrap(), b"GRIB");
        assert!(!pending.exists());
    }

    #[test]
    fn should_load_saved_reporting_point_tables() {
        let base = TempDir::new().unwrap();
        let glofas = npl_glofas(
            base.path(),
            GlofasProduct::Forecast { leadtime_max: 2 },
            DateRange::new(Some(date(2022, 10, 1)), Some(date(2022, 10, 2))),
        );
        for day in [1, 2] {
            let table =
                reporting_point_table(&fields(date(2022, 10, day), 1, &[24, 48]), &[chatara()], true)
                    .unwrap();
            save_table(&table, &glofas.unit(date(2022, 10, day)).processed).unwrap();
        }

        let loaded = glofas.load(()).unwrap();

        assert_eq!(loaded.num_rows(), 4);
        assert_eq!(
            loaded.dates("time").unwrap(),
            &[date(2022, 10, 1), date(2022, 10, 1), date(2022, 10, 2), date(2022, 10, 2)]
        );
    }

    #[test]
    fn should_require_reporting_points_to_process() {
        let country = CountryConfig::from_yaml("iso3: abc\n").unwrap();
        let glofas = Glofas::with_today(
            &country,
            &PathConfig::new("/data"),
            &npl_geobb(),
            GlofasProduct::Reanalysis,
            DateRange::default(),
            date(2022, 10, 19),
        )
        .unwrap();

        assert!(matches!(
            glofas.process((), false),
            Err(Error::MissingSection { section: "glofas" })
        ));
    }
}
