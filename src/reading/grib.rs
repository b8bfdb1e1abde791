//! GRIB2 fields as delivered by the CDS for GloFAS.

use std::{fs::File, io::BufReader, path::Path};

use chrono::NaiveDate;
use grib::{codetables::grib2::Table4_4, Code, Grib2SubmessageDecoder};
use tracing::debug;

use crate::error::{Error, Result};

/// One decoded submessage.
#[derive(Debug, Clone, PartialEq)]
pub struct GribField {
    pub ref_date: NaiveDate,
    /// Lead time in hours, 0 for analyses.
    pub step_hours: u32,
    /// `(lat, lon)` of every grid point, in the same order as `values`.
    pub latlons: Vec<(f32, f32)>,
    pub values: Vec<f32>,
}

impl GribField {
    /// Value at the grid point closest to `(lat, lon)`.
    pub fn nearest(&self, lat: f64, lon: f64) -> Option<f32> {
        self.latlons
            .iter()
            .zip(&self.values)
            .map(|(&(la, lo), &value)| {
                let distance = (la as f64 - lat).powi(2) + (lo as f64 - lon).powi(2);
                (distance, value)
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, value)| value)
    }
}

/// Decodes every submessage of a GRIB2 file. A file without any GRIB2
/// message is a format error.
pub fn read_grib(path: &Path) -> Result<Vec<GribField>> {
    let reader = BufReader::new(File::open(path)?);
    let grib2 = grib::from_reader(reader)?;

    let mut fields = Vec::new();
    for (_index, submessage) in grib2.iter() {
        let ref_time = submessage.identification().ref_time_unchecked();
        let ref_date = NaiveDate::from_ymd_opt(
            ref_time.year as i32,
            ref_time.month as u32,
            ref_time.day as u32,
        )
        .ok_or_else(|| {
            Error::Format(format!("Invalid reference time in {}", path.display()))
        })?;
        let step_hours = submessage
            .prod_def()
            .forecast_time()
            .map(|forecast| match forecast.unit {
                Code::Name(Table4_4::Minute) => forecast.value / 60,
                Code::Name(Table4_4::Day) => forecast.value * 24,
                _ => forecast.value,
            })
            .unwrap_or(0);
        let latlons: Vec<(f32, f32)> = submessage.latlons()?.collect();
        let values: Vec<f32> = Grib2SubmessageDecoder::from(submessage)?
            .dispatch()?
            .collect();
        if latlons.len() != values.len() {
            return Err(Error::Format(format!(
                "{} has {} grid points but {} values",
                path.display(),
                latlons.len(),
                values.len()
            )));
        }
        fields.push(GribField {
            ref_date,
            step_hours,
            latlons,
            values,
        });
    }
    if fields.is_empty() {
        return Err(Error::Format(format!(
            "{} contains no GRIB2 messages",
            path.display()
        )));
    }
    debug!("Decoded {} GRIB fields from {}", fields.len(), path.display());

    Ok(fields)
}

// -- Tests -------------------------------------------------------------------
