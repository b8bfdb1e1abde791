//! Zonal statistics of a raster over polygon features.

use std::collections::HashSet;

use geo::{Contains, Coord, Intersects, MultiPolygon, Point, Rect};
use tracing::warn;

use super::{CoordValue, Raster};
use crate::{
    error::{Error, Result},
    vector::FeatureCollection,
};

/// Statistics computed when none are requested explicitly.
pub const DEFAULT_STATS: [Stat; 6] = [
    Stat::Mean,
    Stat::Std,
    Stat::Min,
    Stat::Max,
    Stat::Sum,
    Stat::Count,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stat {
    Mean,
    Std,
    Min,
    Max,
    Sum,
    Count,
    Median,
}

impl Stat {
    pub fn name(&self) -> &'static str {
        match self {
            Stat::Mean => "mean",
            Stat::Std => "std",
            Stat::Min => "min",
            Stat::Max => "max",
            Stat::Sum => "sum",
            Stat::Count => "count",
            Stat::Median => "median",
        }
    }

    pub fn parse(name: &str) -> Result<Stat> {
        Ok(match name {
            "mean" => Stat::Mean,
            "std" => Stat::Std,
            "min" => Stat::Min,
            "max" => Stat::Max,
            "sum" => Stat::Sum,
            "count" => Stat::Count,
            "median" => Stat::Median,
            other => return Err(Error::Config(format!("Unknown statistic {other}"))),
        })
    }

    /// NaN values are skipped. `sum` of no values is NaN, `count` is 0.
    fn compute(&self, values: &[f64]) -> f64 {
        let n = values.len() as f64;
        if *self == Stat::Count {
            return n;
        }
        if values.is_empty() {
            return f64::NAN;
        }
        match self {
            Stat::Mean => values.iter().sum::<f64>() / n,
            Stat::Std => {
                let mean = values.iter().sum::<f64>() / n;
                (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
            }
            Stat::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Stat::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Stat::Sum => values.iter().sum(),
            Stat::Median => quantile(values, 0.5),
            Stat::Count => n,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatsOptions {
    pub stats: Vec<Stat>,
    /// Percentiles in 0..=100, reported as `<p>quant` columns.
    pub percentiles: Vec<u8>,
    /// Include every cell touching a feature instead of only the cells whose
    /// centre lies inside it.
    pub all_touched: bool,
}

impl Default for StatsOptions {
    fn default() -> Self {
        StatsOptions {
            stats: DEFAULT_STATS.to_vec(),
            percentiles: Vec::new(),
            all_touched: false,
        }
    }
}

/// One feature at one step of the non-spatial dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsRow {
    pub feature: String,
    pub label: Option<CoordValue>,
    pub values: Vec<f64>,
}

/// Result table of [`compute_raster_stats`].
#[derive(Debug, Clone, PartialEq)]
pub struct ZonalStats {
    pub feature_col: String,
    /// Name of the non-spatial dimension, if the raster had one.
    pub label_dim: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<StatsRow>,
}

impl ZonalStats {
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let index = self.columns.iter().position(|column| column == name)?;
        Some(self.rows.iter().map(|row| row.values[index]).collect())
    }
}

/// Computes statistics per unique value of `feature_col`, for every step of
/// the raster's non-spatial dimension.
pub fn compute_raster_stats(
    raster: &Raster,
    boundaries: &FeatureCollection,
    feature_col: &str,
    options: &StatsOptions,
) -> Result<ZonalStats> {
    if raster.crs().is_none() {
        return Err(Error::Config(
            "No CRS found, set CRS before computation.".to_string(),
        ));
    }

    let x = raster.float_coords(raster.x_dim()?)?;
    let y = raster.float_coords(raster.y_dim()?)?;
    let half_x = half_step(x);
    let half_y = half_step(y);
    let slices = raster.spatial_slices()?;
    let label_dim = raster
        .dims()
        .iter()
        .map(|dim| dim.name.as_str())
        .find(|name| Some(*name) != raster.x_dim().ok() && Some(*name) != raster.y_dim().ok())
        .map(str::to_string);

    let mut columns: Vec<String> = options.stats.iter().map(|s| s.name().to_string()).collect();
    columns.extend(options.percentiles.iter().map(|p| format!("{p}quant")));

    let mut rows = Vec::new();
    let mut seen = HashSet::new();
    for feature in &boundaries.features {
        let id = feature
            .property(feature_col)
            .ok_or_else(|| Error::MissingData(format!("Column {feature_col} not found")))?
            .to_string();
        if !seen.insert(id.clone()) {
            continue;
        }
        let geometry = MultiPolygon(
            boundaries
                .features
                .iter()
                .filter(|other| other.property(feature_col).map(|v| v.to_string()).as_deref() == Some(id.as_str()))
                .flat_map(|other| other.geometry.0.iter().cloned())
                .collect(),
        );

        let cells: Vec<(usize, usize)> = (0..y.len())
            .flat_map(|row| (0..x.len()).map(move |col| (row, col)))
            .filter(|&(row, col)| {
                if options.all_touched {
                    let cell = Rect::new(
                        Coord { x: x[col] - half_x, y: y[row] - half_y },
                        Coord { x: x[col] + half_x, y: y[row] + half_y },
                    );
                    geometry.intersects(&cell)
                } else {
                    geometry.contains(&Point::new(x[col], y[row]))
                }
            })
            .collect();
        if cells.is_empty() {
            warn!("No overlapping raster cells for {}, skipping.", id);
            continue;
        }

        for (label, slice) in &slices {
            let values: Vec<f64> = cells
                .iter()
                .map(|&(row, col)| slice[[row, col]] as f64)
                .filter(|value| !value.is_nan())
                .collect();
            let mut row_values: Vec<f64> = options.stats.iter().map(|stat| stat.compute(&values)).collect();
            row_values.extend(options.percentiles.iter().map(|&p| {
                if values.is_empty() {
                    f64::NAN
                } else {
                    quantile(&values, p as f64 / 100.0)
                }
            }));
            rows.push(StatsRow {
                feature: id.clone(),
                label: *label,
                values: row_values,
            });
        }
    }

    Ok(ZonalStats {
        feature_col: feature_col.to_string(),
        label_dim,
        columns,
        rows,
    })
}

/// Linear interpolation between closest ranks.
fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (position - lower as f64)
}

fn half_step(coords: &[f64]) -> f64 {
    match coords {
        [first, second, ..] => (second - first).abs() / 2.0,
        _ => 0.0,
    }
}

// -- Tests -------------------------------------------------------------------
