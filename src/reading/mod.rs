//! Readers turning raw provider files into rasters and fields.

pub mod geotiff;
pub mod grib;
pub mod netcdf;

pub use geotiff::read_geotiff;
pub use grib::{read_grib, GribField};
pub use netcdf::{decode_time, read_variable};
