//! Reads variables of NetCDF classic files into rasters.

use std::path::Path;

use chrono::NaiveDate;
use ndarray::{ArrayD, IxDyn};
use netcdf3::{Attribute, DataVector, FileReader};
use tracing::debug;

use crate::{
    dates::{from_days_since, from_julian_day, from_months_since},
    error::{Error, Result},
    raster::{Coords, Dimension, Raster},
};

const FILL_VALUE_ATTRS: [&str; 2] = ["_FillValue", "missing_value"];

/// Reads `var_name` with its coordinate variables. Time-like coordinates
/// (CF `<unit> since <date>` or `julian_day`) are decoded to dates and
/// fill values become NaN.
pub fn read_variable(path: &Path, var_name: &str) -> Result<Raster> {
    let mut reader = FileReader::open(path).map_err(|e| netcdf_error(path, e))?;

    let (dim_names, fill_values) = {
        let data_set = reader.data_set();
        let variable = data_set.get_var(var_name).ok_or_else(|| {
            Error::Format(format!(
                "Variable {var_name} not found in {}",
                path.display()
            ))
        })?;
        let fill_values: Vec<f64> = FILL_VALUE_ATTRS
            .iter()
            .filter_map(|attr| data_set.get_var_attr(var_name, attr))
            .filter_map(attr_as_f64)
            .collect();
        (variable.dim_names(), fill_values)
    };

    let mut dims = Vec::with_capacity(dim_names.len());
    let mut shape = Vec::with_capacity(dim_names.len());
    for dim_name in &dim_names {
        let coords = read_coords(&mut reader, path, dim_name)?;
        shape.push(coords.len());
        dims.push(Dimension::new(dim_name.clone(), coords));
    }

    let values = reader
        .read_var(var_name)
        .map_err(|e| netcdf_error(path, e))?;
    let values: Vec<f32> = to_f64(values)
        .into_iter()
        .map(|value| {
            if fill_values.iter().any(|fill| *fill == value) {
                f32::NAN
            } else {
                value as f32
            }
        })
        .collect();
    let data = ArrayD::from_shape_vec(IxDyn(&shape), values)
        .map_err(|e| Error::Format(format!("{var_name} in {}: {e}", path.display())))?;
    debug!("Read {} {:?} from {}", var_name, shape, path.display());

    Raster::new(var_name, data, dims)
}

fn read_coords(reader: &mut FileReader, path: &Path, dim_name: &str) -> Result<Coords> {
    let (has_var, size, units) = {
        let data_set = reader.data_set();
        (
            data_set.get_var(dim_name).is_some(),
            data_set.dim_size(dim_name).unwrap_or(0),
            data_set
                .get_var_attr(dim_name, "units")
                .and_then(|attr| attr.get_as_string()),
        )
    };
    if !has_var {
        return Ok(Coords::Float((0..size).map(|i| i as f64).collect()));
    }

    let values = to_f64(reader.read_var(dim_name).map_err(|e| netcdf_error(path, e))?);
    match units {
        Some(units) if is_time_units(&units) => {
            decode_time(&units, &values).map(Coords::Date).ok_or_else(|| {
                Error::Format(format!(
                    "Cannot decode {dim_name} with units `{units}` in {}",
                    path.display()
                ))
            })
        }
        _ => Ok(Coords::Float(values)),
    }
}

fn is_time_units(units: &str) -> bool {
    units.contains(" since ") || units.trim() == "julian_day"
}

/// Decodes CF time offsets. Monthly offsets snap to the first of the month,
/// which also covers the 360-day calendars some providers use.
pub fn decode_time(units: &str, values: &[f64]) -> Option<Vec<NaiveDate>> {
    if units.trim() == "julian_day" {
        return values.iter().map(|&v| from_julian_day(v)).collect();
    }

    let (unit, origin) = units.split_once(" since ")?;
    let origin = origin.split_whitespace().next()?.split('T').next()?;
    let origin = NaiveDate::parse_from_str(origin, "%Y-%m-%d").ok()?;

    match unit.trim() {
        "months" => values.iter().map(|&v| from_months_since(origin, v)).collect(),
        "days" => values.iter().map(|&v| from_days_since(origin, v)).collect(),
        "hours" => values.iter().map(|&v| from_days_since(origin, v / 24.0)).collect(),
        "seconds" => values
            .iter()
            .map(|&v| from_days_since(origin, v / 86_400.0))
            .collect(),
        _ => None,
    }
}

fn to_f64(values: DataVector) -> Vec<f64> {
    match values {
        DataVector::I8(v) => v.into_iter().map(f64::from).collect(),
        DataVector::U8(v) => v.into_iter().map(f64::from).collect(),
        DataVector::I16(v) => v.into_iter().map(f64::from).collect(),
        DataVector::I32(v) => v.into_iter().map(f64::from).collect(),
        DataVector::F32(v) => v.into_iter().map(f64::from).collect(),
        DataVector::F64(v) => v,
    }
}

fn attr_as_f64(attr: &Attribute) -> Option<f64> {
    attr.get_f32()
        .and_then(|v| v.first().map(|x| f64::from(*x)))
        .or_else(|| attr.get_f64().and_then(|v| v.first().copied()))
        .or_else(|| attr.get_i16().and_then(|v| v.first().map(|x| f64::from(*x))))
        .or_else(|| attr.get_i32().and_then(|v| v.first().map(|x| f64::from(*x))))
        .or_else(|| attr.get_i8().and_then(|v| v.first().map(|x| f64::from(*x))))
        .or_else(|| attr.get_u8().and_then(|v| v.first().map(|x| f64::from(*x))))
}

fn netcdf_error(path: &Path, error: impl std::fmt::Debug) -> Error {
    Error::Format(format!("NetCDF error in {}: {:?}", path.display(), error))
}

// -- Tests -------------------------------------------------------------------
