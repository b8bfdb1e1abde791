//! USGS eMODIS NDVI C6 dekadal composites.
//!
//! Rasters cover a whole FEWS NET area, so raw files are shared between
//! countries and only the zonal statistics are stored per country. Each
//! statistic lives in its own table that grows as new dekads are processed.

use std::{
    collections::{HashMap, HashSet},
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use reqwest::{header::LAST_MODIFIED, Client};
use tempfile::{NamedTempFile, TempDir};
use tracing::{error, info, warn};
use zip::ZipArchive;

use super::DataSource;
use crate::{
    config::{Access, CountryConfig, Coverage, PathConfig, SourceDirs, UsgsNdviConfig},
    dates::Dekad,
    download::{http_client, save_response},
    error::{Error, Result},
    parquet::{load_table, save_table, ColumnData, Table},
    raster::{compute_raster_stats, stats::Stat, Raster, StatsOptions},
    reading::read_geotiff,
    vector::FeatureCollection,
};

const SOURCE_DIR: &str = "usgs_ndvi";
const BASE_URL: &str = "https://edcintl.cr.usgs.gov/downloads/sciweb1/shared/fews/web";
const EARLIEST_DEKAD: (i32, u32) = (2002, 19);
/// Later composites suffer from sensor degradation.
const DEGRADATION_DEKAD: (i32, u32) = (2022, 13);
const KEY_COLUMNS: [&str; 3] = ["date", "year", "dekad"];
const MODIFIED_COLUMN: &str = "modified";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NdviProduct {
    /// Temporally smoothed NDVI.
    Smoothed,
    /// Percent of the 2003-2017 median.
    PercentMedian,
    /// Difference from the 2003-2017 median.
    MedianAnomaly,
    /// Difference from the same dekad of the previous year.
    Difference,
}

impl NdviProduct {
    /// Name used in processed file names and as raster name.
    pub fn variable(&self) -> &'static str {
        match self {
            NdviProduct::Smoothed => "smoothed",
            NdviProduct::PercentMedian => "percent_median",
            NdviProduct::MedianAnomaly => "median_anomaly",
            NdviProduct::Difference => "difference",
        }
    }

    fn file_suffix(&self) -> &'static str {
        match self {
            NdviProduct::Smoothed => "",
            NdviProduct::PercentMedian => "pct",
            NdviProduct::MedianAnomaly => "stmdn",
            NdviProduct::Difference => "dif",
        }
    }

    fn url_path(&self) -> &'static str {
        match self {
            NdviProduct::Smoothed => "temporallysmoothedndvi",
            NdviProduct::PercentMedian => "percentofmedian",
            NdviProduct::MedianAnomaly => "mediananomaly",
            NdviProduct::Difference => "differencepreviousyear",
        }
    }
}

/// Zones to aggregate over and the statistics to compute per zone.
#[derive(Debug, Clone)]
pub struct NdviZones {
    pub boundaries: FeatureCollection,
    pub feature_col: String,
    pub options: StatsOptions,
}

impl NdviZones {
    pub fn new(
        boundaries: FeatureCollection,
        feature_col: impl Into<String>,
        options: StatsOptions,
    ) -> Result<Self> {
        if options.stats.is_empty() && options.percentiles.is_empty() {
            return Err(Error::Config(
                "At least one statistic or percentile must be requested".to_string(),
            ));
        }
        Ok(NdviZones {
            boundaries,
            feature_col: feature_col.into(),
            options,
        })
    }

    /// One single-column option set per output table.
    fn columns(&self) -> Vec<(String, StatsOptions)> {
        let stats = self.options.stats.iter().map(|stat| {
            (
                stat.name().to_string(),
                StatsOptions {
                    stats: vec![*stat],
                    percentiles: Vec::new(),
                    all_touched: self.options.all_touched,
                },
            )
        });
        let percentiles = self.options.percentiles.iter().map(|percentile| {
            (
                format!("{percentile}quant"),
                StatsOptions {
                    stats: Vec::new(),
                    percentiles: vec![*percentile],
                    all_touched: self.options.all_touched,
                },
            )
        });
        stats.chain(percentiles).collect()
    }
}

fn is_stat_column(name: &str) -> bool {
    Stat::parse(name).is_ok()
        || name
            .strip_suffix("quant")
            .is_some_and(|percentile| percentile.parse::<u8>().is_ok())
}

/// One NDVI product over a dekad range for a configured FEWS NET area.
#[derive(Debug, Clone)]
pub struct UsgsNdvi {
    iso3: String,
    product: NdviProduct,
    area: UsgsNdviConfig,
    start: Dekad,
    end: Dekad,
    dirs: SourceDirs,
    base_url: String,
}

impl UsgsNdvi {
    /// `start` defaults to the first published dekad and `end` to the
    /// current one.
    pub fn new(
        country: &CountryConfig,
        paths: &PathConfig,
        product: NdviProduct,
        start: Option<Dekad>,
        end: Option<Dekad>,
    ) -> Result<Self> {
        let area = country.usgs_ndvi()?;
        let earliest = Dekad::new(EARLIEST_DEKAD.0, EARLIEST_DEKAD.1)?;

        let start = match start {
            Some(start) if start < earliest => {
                warn!(
                    "Start date is before the earliest date data is available. \
                     Data will be downloaded from {}, dekad {}.",
                    earliest.year(),
                    earliest.dekad()
                );
                earliest
            }
            Some(start) => start,
            None => earliest,
        };
        let end = end.unwrap_or_else(|| Dekad::from_date(Local::now().date_naive()));
        if start > end {
            return Err(Error::InvalidDate(format!(
                "Start dekad {start} is after end dekad {end}"
            )));
        }
        if end > Dekad::new(DEGRADATION_DEKAD.0, DEGRADATION_DEKAD.1)? {
            warn!(
                "NDVI data after {}, dekad {} is affected by degradation of the \
                 MODIS sensors and should be used with caution.",
                DEGRADATION_DEKAD.0, DEGRADATION_DEKAD.1
            );
        }

        Ok(UsgsNdvi {
            iso3: country.iso3().to_string(),
            product,
            area,
            start,
            end,
            dirs: SourceDirs::new(
                paths,
                country.iso3(),
                SOURCE_DIR,
                Access::Public,
                Coverage::Global,
                Coverage::Country,
            ),
            base_url: BASE_URL.to_string(),
        })
    }

    /// Points downloads at a mirror of the FEWS NET data portal.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn start(&self) -> Dekad {
        self.start
    }

    pub fn end(&self) -> Dekad {
        self.end
    }

    fn dekads(&self) -> Vec<Dekad> {
        Dekad::range(self.start, self.end)
    }

    pub fn raw_path(&self, dekad: Dekad) -> PathBuf {
        self.dirs.raw.join(format!(
            "{}{}_{:02}{}.tif",
            self.area.area_prefix,
            dekad.year(),
            dekad.dekad(),
            self.product.file_suffix()
        ))
    }

    /// Remote names use two digit years, e.g. `ea2205pct`.
    fn remote_stem(&self, dekad: Dekad) -> String {
        format!(
            "{}{:02}{:02}{}",
            self.area.area_prefix,
            dekad.year().rem_euclid(100),
            dekad.dekad(),
            self.product.file_suffix()
        )
    }

    fn url(&self, dekad: Dekad) -> String {
        format!(
            "{}/{}/dekadal/emodis/ndvi_c6/{}/downloads/dekadal/{}.zip",
            self.base_url,
            self.area.area_url,
            self.product.url_path(),
            self.remote_stem(dekad)
        )
    }

    pub fn processed_path(&self, feature_col: &str, stat: &str) -> PathBuf {
        self.dirs.processed.join(format!(
            "{}_usgs_ndvi_{}_{}_{}.parquet",
            self.iso3,
            self.product.variable(),
            feature_col,
            stat
        ))
    }

    /// The raw raster of a single dekad.
    pub fn load_raster(&self, dekad: Dekad) -> Result<Raster> {
        let raw_path = self.raw_path(dekad);
        if !raw_path.is_file() {
            let reason = if dekad < self.start || dekad > self.end {
                format!(
                    "Dekad {dekad} is outside the range {} to {} of this instance.",
                    self.start, self.end
                )
            } else {
                "Make sure that you have already called the `download` method.".to_string()
            };
            return Err(Error::MissingData(format!(
                "Cannot open the raster {}. {reason}",
                raw_path.display()
            )));
        }

        read_geotiff(&raw_path, self.product.variable())
    }

    async fn download_dekad(&self, client: &Client, dekad: Dekad, clobber: bool) -> Result<()> {
        let response = client.get(self.url(dekad)).send().await?;
        if !response.status().is_success() {
            error!(
                "No NDVI data available for dekad {} of {}, skipping.",
                dekad.dekad(),
                dekad.year()
            );
            return Ok(());
        }

        let raw_path = self.raw_path(dekad);
        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| DateTime::parse_from_rfc2822(value).ok())
            .map(|modified| modified.timestamp());
        if !needs_download(&raw_path, last_modified, clobber)? {
            info!(
                "File {} is up to date with the server, skipping.",
                raw_path.display()
            );
            return Ok(());
        }

        info!(
            "Downloading NDVI data for {}, dekad {} into {}.",
            dekad.year(),
            dekad.dekad(),
            raw_path.display()
        );
        let temp_dir = TempDir::new()?;
        let zip_path = temp_dir.path().join(format!("{}.zip", self.remote_stem(dekad)));
        save_response(response, &zip_path).await?;

        extract_tif(&zip_path, &raw_path)
    }

    /// Updates the table of one statistic, returning the failed dekads.
    fn process_stat(
        &self,
        zones: &NdviZones,
        stat: &str,
        options: &StatsOptions,
        clobber: bool,
    ) -> Result<Vec<(PathBuf, String)>> {
        let processed_path = self.processed_path(&zones.feature_col, stat);
        let existing = if processed_path.is_file() {
            Some(load_table(&processed_path)?)
        } else {
            None
        };
        let done = match &existing {
            Some(table) => processed_dekads(table)?,
            None => HashMap::new(),
        };

        let mut pending = Vec::new();
        for dekad in self.dekads() {
            let raw_path = self.raw_path(dekad);
            if !raw_path.is_file() {
                continue;
            }
            let modified = modified_secs(&raw_path)?;
            match done.get(&dekad) {
                Some(&processed_at) if !clobber && processed_at >= modified => {}
                _ => pending.push((dekad, raw_path, modified)),
            }
        }
        if pending.is_empty() {
            info!("No new {stat} data to calculate, skipping.");
            return Ok(Vec::new());
        }
        info!("Calculating {stat} for {} dekads.", pending.len());

        let mut rows = StatRows::default();
        let mut failed = Vec::new();
        for (dekad, raw_path, modified) in &pending {
            let result = self.load_raster(*dekad).and_then(|raster| {
                compute_raster_stats(&raster, &zones.boundaries, &zones.feature_col, options)
            });
            match result {
                Ok(stats) => {
                    for row in stats.rows {
                        rows.push(row.feature, *dekad, *modified, row.values[0]);
                    }
                }
                Err(err) => {
                    error!("Failed to process {}: {}", raw_path.display(), err);
                    failed.push((raw_path.clone(), err.to_string()));
                }
            }
        }

        let new_rows = rows.into_table(&zones.feature_col, stat)?;
        let merged = match existing {
            Some(table) => {
                let redone: HashSet<(i64, i64)> = pending
                    .iter()
                    .map(|(dekad, _, _)| (i64::from(dekad.year()), i64::from(dekad.dekad())))
                    .collect();
                let years = table.ints("year")?;
                let dekads = table.ints("dekad")?;
                let kept = table.filter(|row| !redone.contains(&(years[row], dekads[row])));
                Table::concat(&[kept, new_rows])?
            }
            None => new_rows,
        };

        let dates = merged.dates("date")?;
        let mut order: Vec<usize> = (0..merged.num_rows()).collect();
        order.sort_by_key(|&row| dates[row]);
        save_table(&merged.select_rows(&order), &processed_path)?;

        Ok(failed)
    }

    /// Processed statistic tables of `feature_col`, sorted by file name.
    fn stat_files(&self, feature_col: &str) -> Result<Vec<PathBuf>> {
        let prefix = format!(
            "{}_usgs_ndvi_{}_{}_",
            self.iso3,
            self.product.variable(),
            feature_col
        );
        let entries = match fs::read_dir(&self.dirs.processed) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_stat_file = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_prefix(&prefix))
                .and_then(|rest| rest.strip_suffix(".parquet"))
                .is_some_and(is_stat_column);
            if is_stat_file {
                paths.push(path);
            }
        }
        paths.sort();

        Ok(paths)
    }
}

/// Column buffers of a statistic table.
#[derive(Default)]
struct StatRows {
    features: Vec<String>,
    dates: Vec<chrono::NaiveDate>,
    years: Vec<i64>,
    dekads: Vec<i64>,
    modified: Vec<i64>,
    values: Vec<f64>,
}

impl StatRows {
    fn push(&mut self, feature: String, dekad: Dekad, modified: i64, value: f64) {
        self.features.push(feature);
        self.dates.push(dekad.start_date());
        self.years.push(i64::from(dekad.year()));
        self.dekads.push(i64::from(dekad.dekad()));
        self.modified.push(modified);
        self.values.push(value);
    }

    fn into_table(self, feature_col: &str, stat: &str) -> Result<Table> {
        Table::new(vec![
            (feature_col.to_string(), ColumnData::Text(self.features)),
            ("date".to_string(), ColumnData::Date(self.dates)),
            ("year".to_string(), ColumnData::Int(self.years)),
            ("dekad".to_string(), ColumnData::Int(self.dekads)),
            (MODIFIED_COLUMN.to_string(), ColumnData::Int(self.modified)),
            (stat.to_string(), ColumnData::Float(self.values)),
        ])
    }
}

/// Raw modification time recorded for each dekad of a statistic table.
fn processed_dekads(table: &Table) -> Result<HashMap<Dekad, i64>> {
    let years = table.ints("year")?;
    let dekads = table.ints("dekad")?;
    let modified = table.ints(MODIFIED_COLUMN)?;

    let mut done = HashMap::new();
    for row in 0..table.num_rows() {
        let dekad = Dekad::new(years[row] as i32, dekads[row] as u32)?;
        done.insert(dekad, modified[row]);
    }
    Ok(done)
}

fn modified_secs(path: &Path) -> Result<i64> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(DateTime::<Utc>::from(modified).timestamp())
}

/// An existing file is only replaced when clobbering or when the server
/// copy is newer. Without a usable Last-Modified header it is kept.
fn needs_download(raw_path: &Path, last_modified: Option<i64>, clobber: bool) -> Result<bool> {
    if !raw_path.exists() || clobber {
        return Ok(true);
    }
    match last_modified {
        Some(remote) => Ok(remote > modified_secs(raw_path)?),
        None => Ok(false),
    }
}

/// Copies the single GeoTIFF of a USGS archive to `target`.
fn extract_tif(zip_path: &Path, target: &Path) -> Result<()> {
    let mut archive = ZipArchive::new(File::open(zip_path)?)?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if !entry.name().to_lowercase().ends_with(".tif") {
            continue;
        }

        let parent = target.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        let mut file = NamedTempFile::new_in(parent)?;
        io::copy(&mut entry, &mut file)?;
        file.persist(target).map_err(|e| e.error)?;
        return Ok(());
    }

    Err(Error::MissingData(format!(
        "No GeoTIFF found in {}",
        zip_path.display()
    )))
}

#[async_trait]
impl DataSource for UsgsNdvi {
    type ProcessArgs = NdviZones;
    /// Column of the boundaries the statistics were computed for.
    type LoadArgs = String;
    type Output = Table;

    async fn download(&self, clobber: bool) -> Result<PathBuf> {
        fs::create_dir_all(&self.dirs.raw)?;
        let client = http_client()?;
        for dekad in self.dekads() {
            self.download_dekad(&client, dekad, clobber).await?;
        }

        Ok(self.dirs.raw.clone())
    }

    fn process(&self, zones: NdviZones, clobber: bool) -> Result<PathBuf> {
        fs::create_dir_all(&self.dirs.processed)?;

        let mut failed = Vec::new();
        for (stat, options) in zones.columns() {
            failed.extend(self.process_stat(&zones, &stat, &options, clobber)?);
        }

        if failed.is_empty() {
            Ok(self.dirs.processed.clone())
        } else {
            Err(Error::ProcessFailed { failed })
        }
    }

    /// Joins every statistic table of `feature_col`, restricted to the
    /// dekads of this instance.
    fn load(&self, feature_col: String) -> Result<Table> {
        let paths = self.stat_files(&feature_col)?;
        if paths.is_empty() {
            return Err(Error::MissingData(format!(
                "Cannot find any processed {} file for {}. Make sure that you have \
                 already called the `process` method.",
                self.product.variable(),
                feature_col
            )));
        }

        let mut keys = vec![feature_col.as_str()];
        keys.extend(KEY_COLUMNS);
        let mut merged: Option<Table> = None;
        for path in &paths {
            let table = load_table(path)?.without(MODIFIED_COLUMN);
            merged = Some(match merged {
                Some(merged) => merged.join(&table, &keys)?,
                None => table,
            });
        }
        let merged = merged.unwrap_or_default();

        let (first, last) = (self.start.start_date(), self.end.start_date());
        let dates = merged.dates("date")?;
        let selected = merged.filter(|row| (first..=last).contains(&dates[row]));
        if selected.num_rows() == 0 {
            return Err(Error::MissingData(format!(
                "No processed data between {} and {}.",
                self.start, self.end
            )));
        }

        Ok(selected)
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::tests::{serve, Route};
    use crate::reading::geotiff::tests::write_geotiff;
    use crate::vector::{AttributeValue, Feature};
    use approx::assert_relative_eq;
    use geo::{polygon, MultiPolygon};
    use std::time::{Duration, SystemTime};
    use std::{collections::HashMap, io::Write};
    use tempfile::TempDir;

    fn dekad(year: i32, dekad: u32) -> Dekad {
        Dekad::new(year, dekad).unwrap()
    }

    fn eth_ndvi(base: &Path, start: Dekad, end: Dekad) -> UsgsNdvi {
        let country = CountryConfig::built_in("eth").unwrap();
        UsgsNdvi::new(
            &country,
            &PathConfig::new(base),
            NdviProduct::Smoothed,
            Some(start),
            Some(end),
        )
        .unwrap()
    }

    /// `area_a` covers the two left columns, `area_b` the right one.
    fn zones() -> NdviZones {
        let feature = |name: &str, poly| Feature {
            properties: HashMap::from([(
                "name".to_string(),
                AttributeValue::Text(name.to_string()),
            )]),
            geometry: MultiPolygon(vec![poly]),
        };
        let boundaries = FeatureCollection::new(vec![
            feature(
                "area_a",
                polygon![(x: 38.0, y: 7.0), (x: 38.0, y: 9.0), (x: 40.0, y: 9.0), (x: 40.0, y: 7.0)],
            ),
            feature(
                "area_b",
                polygon![(x: 40.0, y: 7.0), (x: 40.0, y: 9.0), (x: 41.0, y: 9.0), (x: 41.0, y: 7.0)],
            ),
        ]);
        let options = StatsOptions {
            stats: vec![Stat::Mean, Stat::Max],
            percentiles: Vec::new(),
            all_touched: false,
        };
        NdviZones::new(boundaries, "name", options).unwrap()
    }

    fn write_dekad(ndvi: &UsgsNdvi, dekad: Dekad, offset: u8) {
        let path = ndvi.raw_path(dekad);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let values: Vec<u8> = [10, 20, 30, 40, 50, 60].iter().map(|v| v + offset).collect();
        write_geotiff(&path, 3, 2, (38.0, 9.0), 1.0, None, &values);
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    #[test]
    fn should_build_shared_raw_paths_and_urls() {
        let country = CountryConfig::built_in("eth").unwrap();
        let ndvi = UsgsNdvi::new(
            &country,
            &PathConfig::new("/data"),
            NdviProduct::PercentMedian,
            Some(dekad(2022, 1)),
            Some(dekad(2022, 10)),
        )
        .unwrap();

        assert_eq!(
            ndvi.raw_path(dekad(2022, 5)),
            PathBuf::from("/data/public/raw/glb/usgs_ndvi/ea2022_05pct.tif")
        );
        assert_eq!(
            ndvi.url(dekad(2022, 5)),
            "https://edcintl.cr.usgs.gov/downloads/sciweb1/shared/fews/web/africa/east/\
             dekadal/emodis/ndvi_c6/percentofmedian/downloads/dekadal/ea2205pct.zip"
        );
        assert_eq!(
            ndvi.processed_path("ADM1_EN", "mean"),
            PathBuf::from(
                "/data/public/processed/eth/usgs_ndvi/eth_usgs_ndvi_percent_median_ADM1_EN_mean.parquet"
            )
        );
    }

    #[test]
    fn should_clamp_start_to_first_published_dekad() {
        let ndvi = eth_ndvi(Path::new("/data"), dekad(2000, 1), dekad(2003, 1));

        assert_eq!(ndvi.start(), dekad(2002, 19));
        assert_eq!(ndvi.end(), dekad(2003, 1));
    }

    #[test]
    fn should_reject_start_after_end() {
        let country = CountryConfig::built_in("eth").unwrap();
        let result = UsgsNdvi::new(
            &country,
            &PathConfig::new("/data"),
            NdviProduct::Smoothed,
            Some(dekad(2021, 5)),
            Some(dekad(2021, 4)),
        );

        assert!(matches!(result, Err(Error::InvalidDate(_))));
    }

    #[test]
    fn should_fail_without_area_config() {
        let country = CountryConfig::built_in("npl").unwrap();
        let result = UsgsNdvi::new(
            &country,
            &PathConfig::new("/data"),
            NdviProduct::Smoothed,
            None,
            None,
        );

        assert!(matches!(
            result,
            Err(Error::MissingSection {
                section: "usgs_ndvi"
            })
        ));
    }

    #[test]
    fn should_require_at_least_one_statistic() {
        let options = StatsOptions {
            stats: Vec::new(),
            percentiles: Vec::new(),
            all_touched: false,
        };

        assert!(matches!(
            NdviZones::new(FeatureCollection::new(Vec::new()), "name", options),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn should_redownload_only_newer_server_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ea2020_01.tif");
        assert!(needs_download(&path, None, false).unwrap());

        fs::write(&path, b"tif").unwrap();
        set_mtime(&path, SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000));

        assert!(!needs_download(&path, Some(999_999), false).unwrap());
        assert!(!needs_download(&path, Some(1_000_000), false).unwrap());
        assert!(needs_download(&path, Some(1_000_001), false).unwrap());
        assert!(!needs_download(&path, None, false).unwrap());
        assert!(needs_download(&path, Some(0), true).unwrap());
    }

    fn write_tif_archive(zip_path: &Path, tif_name: &str, data: &[u8]) {
        use zip::{write::FileOptions, ZipWriter};

        let mut writer = ZipWriter::new(File::create(zip_path).unwrap());
        writer.start_file("readme.txt", FileOptions::default()).unwrap();
        writer.write_all(b"metadata").unwrap();
        writer.start_file(tif_name, FileOptions::default()).unwrap();
        writer.write_all(data).unwrap();
        writer.finish().unwrap();
    }

    #[tokio::test]
    async fn should_skip_dekads_the_server_does_not_have() {
        let base = TempDir::new().unwrap();
        let archives = TempDir::new().unwrap();
        let zip_path = archives.path().join("ea2205.zip");
        write_tif_archive(&zip_path, "ea2205.tif", b"raster");
        let ndvi = eth_ndvi(base.path(), dekad(2022, 4), dekad(2022, 5));
        let route = ndvi.url(dekad(2022, 5)).replace(BASE_URL, "");
        let server = serve(vec![Route::new(&route, 200, fs::read(&zip_path).unwrap())
            .header("Last-Modified", "Tue, 10 May 2022 08:00:00 GMT")])
        .await;
        let ndvi = ndvi.with_base_url(server);

        let raw_dir = ndvi.download(false).await.unwrap();

        assert!(raw_dir.is_dir());
        assert!(!ndvi.raw_path(dekad(2022, 4)).exists());
        assert_eq!(fs::read(ndvi.raw_path(dekad(2022, 5))).unwrap(), b"raster");
    }

    #[test]
    fn should_extract_tif_from_archive() {
        let dir = TempDir::new().unwrap();
        let zip_path = dir.path().join("ea2205.zip");
        write_tif_archive(&zip_path, "ea2205.tif", b"raster");

        let target = dir.path().join("raw").join("ea2022_05.tif");
        extract_tif(&zip_path, &target).unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"raster");
    }

    #[test]
    fn should_compute_one_table_per_statistic() {
        let base = TempDir::new().unwrap();
        let ndvi = eth_ndvi(base.path(), dekad(2020, 1), dekad(2020, 3));
        write_dekad(&ndvi, dekad(2020, 1), 0);
        write_dekad(&ndvi, dekad(2020, 2), 1);

        ndvi.process(zones(), false).unwrap();

        assert!(ndvi.processed_path("name", "mean").is_file());
        assert!(ndvi.processed_path("name", "max").is_file());
        let table = ndvi.load("name".to_string()).unwrap();
        assert_eq!(table.num_rows(), 4);
        assert_eq!(
            table.column_names(),
            vec!["name", "date", "year", "dekad", "max", "mean"]
        );
        assert_eq!(table.text("name").unwrap(), &["area_a", "area_b", "area_a", "area_b"]);
        assert_eq!(table.ints("dekad").unwrap(), &[1, 1, 2, 2]);
        let mean = table.floats("mean").unwrap();
        assert_relative_eq!(mean[0], 30.0);
        assert_relative_eq!(mean[1], 45.0);
        assert_relative_eq!(mean[2], 31.0);
        assert_eq!(table.floats("max").unwrap()[3], 61.0);
    }

    #[test]
    fn should_only_reprocess_new_or_updated_dekads() {
        let base = TempDir::new().unwrap();
        let ndvi = eth_ndvi(base.path(), dekad(2020, 1), dekad(2020, 3));
        write_dekad(&ndvi, dekad(2020, 1), 0);
        write_dekad(&ndvi, dekad(2020, 2), 0);
        ndvi.process(zones(), false).unwrap();

        // older than the processed rows: ignored
        write_dekad(&ndvi, dekad(2020, 1), 5);
        set_mtime(
            &ndvi.raw_path(dekad(2020, 1)),
            SystemTime::UNIX_EPOCH + Duration::from_secs(1_000),
        );
        // newer than the processed rows: recomputed
        write_dekad(&ndvi, dekad(2020, 2), 5);
        set_mtime(
            &ndvi.raw_path(dekad(2020, 2)),
            SystemTime::now() + Duration::from_secs(86_400),
        );
        write_dekad(&ndvi, dekad(2020, 3), 0);
        ndvi.process(zones(), false).unwrap();

        let table = ndvi.load("name".to_string()).unwrap();
        assert_eq!(table.num_rows(), 6);
        assert_eq!(table.floats("mean").unwrap(), &[30.0, 45.0, 35.0, 50.0, 30.0, 45.0]);

        ndvi.process(zones(), true).unwrap();
        let table = ndvi.load("name".to_string()).unwrap();
        assert_eq!(table.floats("mean").unwrap()[0], 35.0);
    }

    #[test]
    fn should_load_only_instance_dekads() {
        let base = TempDir::new().unwrap();
        let wide = eth_ndvi(base.path(), dekad(2020, 1), dekad(2020, 3));
        for d in 1..=3 {
            write_dekad(&wide, dekad(2020, d), d as u8);
        }
        wide.process(zones(), false).unwrap();

        let narrow = eth_ndvi(base.path(), dekad(2020, 2), dekad(2020, 2));
        let table = narrow.load("name".to_string()).unwrap();

        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.ints("dekad").unwrap(), &[2, 2]);

        let later = eth_ndvi(base.path(), dekad(2021, 1), dekad(2021, 2));
        assert!(matches!(later.load("name".to_string()), Err(Error::MissingData(_))));
    }

    #[test]
    fn should_fail_loading_before_processing() {
        let base = TempDir::new().unwrap();
        let ndvi = eth_ndvi(base.path(), dekad(2020, 1), dekad(2020, 3));

        assert!(matches!(ndvi.load("name".to_string()), Err(Error::MissingData(_))));
        match ndvi.load_raster(dekad(2019, 1)) {
            Err(Error::MissingData(message)) => assert!(message.contains("outside the range")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn should_load_raw_raster() {
        let base = TempDir::new().unwrap();
        let ndvi = eth_ndvi(base.path(), dekad(2020, 1), dekad(2020, 3));
        write_dekad(&ndvi, dekad(2020, 2), 0);

        let raster = ndvi.load_raster(dekad(2020, 2)).unwrap();

        assert_eq!(raster.name, "smoothed");
        assert_eq!(raster.get(&[1, 2]), Some(60.0));
    }
}
