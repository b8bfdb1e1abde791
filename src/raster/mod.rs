//! Labelled n-dimensional rasters and the operations shared by every
//! gridded data source.

pub mod stats;

use std::fmt;

use chrono::NaiveDate;
use ndarray::{concatenate, ArrayD, ArrayView2, Axis, IxDyn};
use tracing::info;

use crate::error::{Error, Result};

pub use stats::{compute_raster_stats, StatsOptions, StatsRow, ZonalStats};

pub const DEFAULT_CRS: &str = "EPSG:4326";

const SPATIAL_DIM_PAIRS: [(&str, &str); 4] = [
    ("lon", "lat"),
    ("longitude", "latitude"),
    ("X", "Y"),
    ("x", "y"),
];
const TIME_DIMS: [&str; 4] = ["t", "T", "time", "F"];

/// Coordinate labels along one dimension.
#[derive(Debug, Clone, PartialEq)]
pub enum Coords {
    Float(Vec<f64>),
    Date(Vec<NaiveDate>),
}

impl Coords {
    pub fn len(&self) -> usize {
        match self {
            Coords::Float(values) => values.len(),
            Coords::Date(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<CoordValue> {
        match self {
            Coords::Float(values) => values.get(index).copied().map(CoordValue::Float),
            Coords::Date(values) => values.get(index).copied().map(CoordValue::Date),
        }
    }

    pub fn as_floats(&self) -> Option<&[f64]> {
        match self {
            Coords::Float(values) => Some(values),
            Coords::Date(_) => None,
        }
    }

    pub fn as_dates(&self) -> Option<&[NaiveDate]> {
        match self {
            Coords::Date(values) => Some(values),
            Coords::Float(_) => None,
        }
    }

    fn select(&self, indices: &[usize]) -> Coords {
        match self {
            Coords::Float(values) => Coords::Float(indices.iter().map(|&i| values[i]).collect()),
            Coords::Date(values) => Coords::Date(indices.iter().map(|&i| values[i]).collect()),
        }
    }

    fn reversed(&self) -> Coords {
        let indices: Vec<usize> = (0..self.len()).rev().collect();
        self.select(&indices)
    }
}

/// A single coordinate label.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub enum CoordValue {
    Float(f64),
    Date(NaiveDate),
}

impl fmt::Display for CoordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordValue::Float(value) => write!(f, "{value}"),
            CoordValue::Date(date) => write!(f, "{date}"),
        }
    }
}

/// Named dimension of a raster.
#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    pub name: String,
    pub coords: Coords,
}

impl Dimension {
    pub fn new(name: impl Into<String>, coords: Coords) -> Self {
        Dimension {
            name: name.into(),
            coords,
        }
    }
}

/// Whether longitudes run from -180 to 180 or from 0 to 360.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LongitudeRange {
    Deg180,
    Deg360,
}

/// One gridded variable. Missing values are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub name: String,
    data: ArrayD<f32>,
    dims: Vec<Dimension>,
    x_dim: Option<String>,
    y_dim: Option<String>,
    t_dim: Option<String>,
    crs: Option<String>,
}

impl Raster {
    /// Builds a raster, detecting spatial and time dimensions from their
    /// conventional names. The CRS defaults to WGS84.
    pub fn new(name: impl Into<String>, data: ArrayD<f32>, dims: Vec<Dimension>) -> Result<Self> {
        if dims.len() != data.ndim() {
            return Err(Error::Dimension(format!(
                "{} dimensions given for an array of rank {}",
                dims.len(),
                data.ndim()
            )));
        }
        for (dim, len) in dims.iter().zip(data.shape()) {
            if dim.coords.len() != *len {
                return Err(Error::Dimension(format!(
                    "Dimension {} has {} coordinates but length {}",
                    dim.name,
                    dim.coords.len(),
                    len
                )));
            }
        }

        let has = |name: &str| dims.iter().any(|dim| dim.name == name);
        let (x_dim, y_dim) = SPATIAL_DIM_PAIRS
            .iter()
            .find(|(x, y)| has(x) && has(y))
            .map(|(x, y)| (Some(x.to_string()), Some(y.to_string())))
            .unwrap_or((None, None));
        let t_dim = TIME_DIMS
            .iter()
            .find(|name| has(name))
            .map(|name| name.to_string());

        Ok(Raster {
            name: name.into(),
            data,
            dims,
            x_dim,
            y_dim,
            t_dim,
            crs: Some(DEFAULT_CRS.to_string()),
        })
    }

    pub fn data(&self) -> &ArrayD<f32> {
        &self.data
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    pub fn dim(&self, name: &str) -> Result<&Dimension> {
        self.dims
            .iter()
            .find(|dim| dim.name == name)
            .ok_or_else(|| Error::Dimension(format!("Dimension {name} not found in {}", self.name)))
    }

    pub fn axis_of(&self, name: &str) -> Result<usize> {
        self.dims
            .iter()
            .position(|dim| dim.name == name)
            .ok_or_else(|| Error::Dimension(format!("Dimension {name} not found in {}", self.name)))
    }

    pub fn x_dim(&self) -> Result<&str> {
        self.x_dim.as_deref().ok_or_else(|| {
            Error::Dimension(format!(
                "x dimension not found. Set spatial dimensions first. Variable: {}",
                self.name
            ))
        })
    }

    pub fn y_dim(&self) -> Result<&str> {
        self.y_dim.as_deref().ok_or_else(|| {
            Error::Dimension(format!(
                "y dimension not found. Set spatial dimensions first. Variable: {}",
                self.name
            ))
        })
    }

    pub fn t_dim(&self) -> Result<&str> {
        self.t_dim.as_deref().ok_or_else(|| {
            Error::Dimension(format!(
                "Time dimension not found. Set it or rename the dimension to 't'. Variable: {}",
                self.name
            ))
        })
    }

    pub fn crs(&self) -> Option<&str> {
        self.crs.as_deref()
    }

    pub fn with_crs(mut self, crs: Option<String>) -> Self {
        self.crs = crs;
        self
    }

    pub fn set_time_dim(mut self, t_dim: &str) -> Result<Self> {
        self.axis_of(t_dim)?;
        self.t_dim = Some(t_dim.to_string());
        Ok(self)
    }

    pub fn set_spatial_dims(mut self, x_dim: &str, y_dim: &str) -> Result<Self> {
        self.axis_of(x_dim)?;
        self.axis_of(y_dim)?;
        self.x_dim = Some(x_dim.to_string());
        self.y_dim = Some(y_dim.to_string());
        Ok(self)
    }

    pub fn rename(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Value at the given index per dimension.
    pub fn get(&self, index: &[usize]) -> Option<f32> {
        self.data.get(IxDyn(index)).copied()
    }

    /// Value at the given coordinate labels, one per dimension.
    pub fn value_at(&self, labels: &[CoordValue]) -> Option<f32> {
        let index = self
            .dims
            .iter()
            .zip(labels)
            .map(|(dim, label)| {
                (0..dim.coords.len()).find(|&i| dim.coords.get(i).as_ref() == Some(label))
            })
            .collect::<Option<Vec<_>>>()?;
        self.get(&index)
    }

    /// Longitude convention, from the largest x coordinate.
    pub fn longitude_range(&self) -> Result<LongitudeRange> {
        let x = self.float_coords(self.x_dim()?)?;
        let max = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Ok(if max > 180.0 {
            LongitudeRange::Deg360
        } else {
            LongitudeRange::Deg180
        })
    }

    /// Orders longitude ascending and latitude descending, reversing the
    /// data along with its labels so every value keeps its coordinates.
    pub fn invert_coordinates(&self) -> Result<Raster> {
        let x_dim = self.x_dim()?.to_string();
        let y_dim = self.y_dim()?.to_string();
        let (lon_inverted, lat_inverted) = self.check_coords_inverted()?;

        let mut raster = self.clone();
        if lon_inverted {
            info!("Longitude was inverted, reversing coordinates.");
            raster.reverse_axis(&x_dim)?;
        }
        if lat_inverted {
            info!("Latitude was inverted, reversing coordinates.");
            raster.reverse_axis(&y_dim)?;
        }

        Ok(raster)
    }

    fn check_coords_inverted(&self) -> Result<(bool, bool)> {
        let lon = self.float_coords(self.x_dim()?)?;
        let lat = self.float_coords(self.y_dim()?)?;
        let inverted = |values: &[f64], descending: bool| match (values.first(), values.last()) {
            (Some(first), Some(last)) if descending => first < last,
            (Some(first), Some(last)) => first > last,
            _ => false,
        };

        Ok((inverted(lon, false), inverted(lat, true)))
    }

    /// Converts longitudes between -180..180 and 0..360, keeping the axis
    /// sorted ascending.
    pub fn change_longitude_range(&self, to_180: bool) -> Result<Raster> {
        let current = self.longitude_range()?;
        let convert: fn(f64) -> f64 = match (to_180, current) {
            (true, LongitudeRange::Deg360) => {
                info!("Converting longitude from 0 360 to -180 to 180.");
                |lon| (lon + 180.0).rem_euclid(360.0) - 180.0
            }
            (false, LongitudeRange::Deg180) => {
                info!("Converting longitude from -180 to 180 to 0 to 360.");
                |lon| lon.rem_euclid(360.0)
            }
            _ => {
                info!("Coordinates already in required range.");
                return Ok(self.clone());
            }
        };

        let x_dim = self.x_dim()?.to_string();
        let axis = self.axis_of(&x_dim)?;
        let converted: Vec<f64> = self.float_coords(&x_dim)?.iter().map(|&lon| convert(lon)).collect();
        let mut order: Vec<usize> = (0..converted.len()).collect();
        order.sort_by(|&a, &b| converted[a].total_cmp(&converted[b]));

        let mut raster = self.clone();
        raster.data = self.data.select(Axis(axis), &order);
        raster.dims[axis].coords = Coords::Float(order.iter().map(|&i| converted[i]).collect());

        Ok(raster)
    }

    /// Concatenates rasters along their time dimension, sorted ascending.
    /// Every other dimension must match exactly and timestamps must be unique.
    pub fn concat_time(mut rasters: Vec<Raster>) -> Result<Raster> {
        if rasters.is_empty() {
            return Err(Error::MissingData("No rasters to merge".to_string()));
        }
        let t_dim = rasters[0].t_dim()?.to_string();
        let axis = rasters[0].axis_of(&t_dim)?;

        let mut keyed = Vec::with_capacity(rasters.len());
        for raster in rasters.drain(..) {
            if raster.t_dim()? != t_dim || raster.axis_of(&t_dim)? != axis {
                return Err(Error::Dimension(
                    "Rasters do not share the same time dimension".to_string(),
                ));
            }
            let first = raster.dim(&t_dim)?.coords.get(0);
            keyed.push((first, raster));
        }
        keyed.sort_by(|(a, _), (b, _)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let rasters: Vec<Raster> = keyed.into_iter().map(|(_, raster)| raster).collect();
        let template = &rasters[0];

        let mut time = Vec::new();
        for raster in &rasters {
            for (i, dim) in raster.dims.iter().enumerate() {
                if i != axis && *dim != template.dims[i] {
                    return Err(Error::Dimension(format!(
                        "Dimension {} differs between merged rasters",
                        dim.name
                    )));
                }
            }
            let coords = &raster.dims[axis].coords;
            time.extend((0..coords.len()).filter_map(|i| coords.get(i)));
        }
        if time.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(Error::Dimension(
                "Merged time axis is not strictly increasing".to_string(),
            ));
        }

        let views: Vec<_> = rasters.iter().map(|raster| raster.data.view()).collect();
        let data = concatenate(Axis(axis), &views)
            .map_err(|e| Error::Dimension(e.to_string()))?;

        let mut merged = template.clone();
        merged.data = data;
        merged.dims[axis].coords = collect_coords(&time)?;

        Ok(merged)
    }

    /// 2D `(y, x)` slices, one per entry of the single remaining dimension
    /// (or one slice for a purely spatial raster).
    pub(crate) fn spatial_slices(&self) -> Result<Vec<(Option<CoordValue>, ArrayView2<'_, f32>)>> {
        let x_axis = self.axis_of(self.x_dim()?)?;
        let y_axis = self.axis_of(self.y_dim()?)?;
        let others: Vec<usize> = (0..self.data.ndim())
            .filter(|axis| *axis != x_axis && *axis != y_axis)
            .collect();
        if others.len() > 1 {
            return Err(Error::Dimension(format!(
                "At most one non-spatial dimension is supported, {} has {}",
                self.name,
                others.len()
            )));
        }

        let mut order = others.clone();
        order.extend([y_axis, x_axis]);
        let view = self.data.view().permuted_axes(IxDyn(&order));

        match others.first() {
            None => {
                let slice = view
                    .into_dimensionality()
                    .map_err(|e| Error::Dimension(e.to_string()))?;
                Ok(vec![(None, slice)])
            }
            Some(&other) => {
                let coords = &self.dims[other].coords;
                (0..coords.len())
                    .map(|i| {
                        let slice = view
                            .clone()
                            .index_axis_move(Axis(0), i)
                            .into_dimensionality()
                            .map_err(|e| Error::Dimension(e.to_string()))?;
                        Ok((coords.get(i), slice))
                    })
                    .collect()
            }
        }
    }

    pub(crate) fn float_coords(&self, name: &str) -> Result<&[f64]> {
        self.dim(name)?
            .coords
            .as_floats()
            .ok_or_else(|| Error::Dimension(format!("Dimension {name} is not numeric")))
    }

    fn reverse_axis(&mut self, name: &str) -> Result<()> {
        let axis = self.axis_of(name)?;
        self.data.invert_axis(Axis(axis));
        self.dims[axis].coords = self.dims[axis].coords.reversed();
        Ok(())
    }
}

fn collect_coords(values: &[CoordValue]) -> Result<Coords> {
    match values.first() {
        Some(CoordValue::Date(_)) | None => values
            .iter()
            .map(|value| match value {
                CoordValue::Date(date) => Ok(*date),
                CoordValue::Float(_) => Err(Error::Dimension("Mixed coordinate types".to_string())),
            })
            .collect::<Result<Vec<_>>>()
            .map(Coords::Date),
        Some(CoordValue::Float(_)) => values
            .iter()
            .map(|value| match value {
                CoordValue::Float(v) => Ok(*v),
                CoordValue::Date(_) => Err(Error::Dimension("Mixed coordinate types".to_string())),
            })
            .collect::<Result<Vec<_>>>()
            .map(Coords::Float),
    }
}

// -- Tests -------------------------------------------------------------------
