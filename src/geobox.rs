//! Rectangular geographic extents used to scope downloads.

use std::fmt;

use geo::Rect;

use crate::{
    error::{Error, Result},
    vector::FeatureCollection,
};

/// Rounded values are snapped to this many decimals, so repeated rounding
/// at the same resolution is stable despite binary floating point.
const SNAP_DECIMALS: i32 = 9;

/// Bounds of an area in degrees, with north above south and east above west.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBoundingBox {
    lat_max: f64,
    lat_min: f64,
    lon_max: f64,
    lon_min: f64,
}

impl GeoBoundingBox {
    pub fn new(lat_max: f64, lat_min: f64, lon_max: f64, lon_min: f64) -> Result<Self> {
        check_latitude(lat_max)?;
        check_latitude(lat_min)?;
        check_longitude(lon_max)?;
        check_longitude(lon_min)?;
        if lat_min > lat_max {
            return Err(Error::InvalidBoundingBox(
                "The maximum latitude must be greater than or equal to the minimum latitude"
                    .to_string(),
            ));
        }
        if lon_min > lon_max {
            return Err(Error::InvalidBoundingBox(
                "The maximum longitude must be greater than or equal to the minimum longitude"
                    .to_string(),
            ));
        }

        Ok(GeoBoundingBox {
            lat_max,
            lat_min,
            lon_max,
            lon_min,
        })
    }

    /// Envelope of every geometry in the collection.
    pub fn from_shape(shape: &FeatureCollection) -> Result<Self> {
        let bounds = shape.total_bounds().ok_or_else(|| {
            Error::InvalidBoundingBox("Cannot take the bounds of an empty shape".to_string())
        })?;
        Self::from_rect(bounds)
    }

    pub fn from_rect(rect: Rect<f64>) -> Result<Self> {
        Self::new(rect.max().y, rect.min().y, rect.max().x, rect.min().x)
    }

    pub fn lat_max(&self) -> f64 {
        self.lat_max
    }

    pub fn lat_min(&self) -> f64 {
        self.lat_min
    }

    pub fn lon_max(&self) -> f64 {
        self.lon_max
    }

    pub fn lon_min(&self) -> f64 {
        self.lon_min
    }

    /// Rounds outward to a multiple of `round_val` (ceiling for the maxima,
    /// floor for the minima) then pushes every side outward by `offset_val`.
    pub fn round_coords(&self, offset_val: f64, round_val: f64) -> Result<Self> {
        if round_val <= 0.0 {
            return Err(Error::InvalidBoundingBox(format!(
                "Rounding value must be positive, got {round_val}"
            )));
        }
        let up = |coord: f64| snap(snap(coord / round_val).ceil() * round_val + offset_val);
        let down = |coord: f64| snap(snap(coord / round_val).floor() * round_val - offset_val);

        Self::new(
            up(self.lat_max),
            down(self.lat_min),
            up(self.lon_max),
            down(self.lon_min),
        )
    }

    /// Outward rounding to a grid resolution without offset.
    pub fn round(&self, resolution: f64) -> Result<Self> {
        self.round_coords(0.0, resolution)
    }

    /// Compact `N..S..E..W..` form for filenames, e.g. `Np28d50Sp26d00...`.
    pub fn get_filename_repr(&self, precision: usize) -> String {
        let format = |coord: f64| {
            // -0.0 + 0.0 == +0.0
            let coord = coord + 0.0;
            if coord < 0.0 {
                format!("m{:.*}", precision, coord.abs())
            } else {
                format!("p{:.*}", precision, coord)
            }
        };

        format!(
            "N{}S{}E{}W{}",
            format(self.lat_max),
            format(self.lat_min),
            format(self.lon_max),
            format(self.lon_min)
        )
        .replace('.', "d")
    }
}

impl fmt::Display for GeoBoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "N: {} S: {} E: {} W: {}",
            self.lat_max, self.lat_min, self.lon_max, self.lon_min
        )
    }
}

fn snap(value: f64) -> f64 {
    let factor = 10f64.powi(SNAP_DECIMALS);
    (value * factor).round() / factor
}

fn check_latitude(value: f64) -> Result<()> {
    if !(-90.0..=90.0).contains(&value) {
        return Err(Error::InvalidBoundingBox(format!(
            "Latitude must range from -90 to 90 degrees, got {value}"
        )));
    }
    Ok(())
}

fn check_longitude(value: f64) -> Result<()> {
    if !(-180.0..=180.0).contains(&value) {
        return Err(Error::InvalidBoundingBox(format!(
            "Longitude must range from -180 to 180 degrees, got {value}"
        )));
    }
    Ok(())
}

// -- Tests -------------------------------------------------------------------
