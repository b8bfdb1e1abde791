//! Single band GeoTIFF rasters.

use std::{fs::File, io::BufReader, path::Path};

use ndarray::{ArrayD, IxDyn};
use tiff::{
    decoder::{Decoder, DecodingResult, Limits},
    tags::Tag,
};

use crate::{
    error::{Error, Result},
    raster::{Coords, Dimension, Raster},
};

/// Reads the first band into a `(y, x)` raster with cell centre coordinates
/// taken from the ModelTiepoint and ModelPixelScale tags. Cells equal to
/// the GDAL_NODATA value become NaN.
pub fn read_geotiff(path: &Path, name: &str) -> Result<Raster> {
    let file = BufReader::new(File::open(path)?);
    let mut decoder = Decoder::new(file)?.with_limits(Limits::unlimited());

    let (width, height) = decoder.dimensions()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag)?;
    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag)?;
    if tiepoint.len() < 6 || scale.len() < 2 {
        return Err(Error::Format(format!(
            "{} lacks a usable geotransform",
            path.display()
        )));
    }
    let nodata: Option<f32> = decoder
        .get_tag_ascii_string(Tag::GdalNodata)
        .ok()
        .and_then(|value| value.trim().trim_end_matches('\0').parse().ok());

    let values = match decoder.read_image()? {
        DecodingResult::U8(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::U16(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::U32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I8(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::I16(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::I32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::F32(data) => data,
        DecodingResult::F64(data) => data.into_iter().map(|v| v as f32).collect(),
    };
    let values: Vec<f32> = match nodata {
        Some(nodata) => values
            .into_iter()
            .map(|v| if v == nodata { f32::NAN } else { v })
            .collect(),
        None => values,
    };

    // raster space: (i, j) pixel of the tiepoint maps to (x, y) model space
    let (i, j, x0, y0) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
    let (dx, dy) = (scale[0], scale[1]);
    let x: Vec<f64> = (0..width)
        .map(|col| x0 + (col as f64 - i + 0.5) * dx)
        .collect();
    let y: Vec<f64> = (0..height)
        .map(|row| y0 - (row as f64 - j + 0.5) * dy)
        .collect();

    let data = ArrayD::from_shape_vec(IxDyn(&[height as usize, width as usize]), values)
        .map_err(|e| Error::Format(format!("{}: {e}", path.display())))?;

    Raster::new(
        name,
        data,
        vec![
            Dimension::new("y", Coords::Float(y)),
            Dimension::new("x", Coords::Float(x)),
        ],
    )
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;
    use tiff::encoder::{colortype::Gray8, TiffEncoder};

    /// Writes an 8 bit GeoTIFF whose top left corner sits at `origin`.
    pub(crate) fn write_geotiff(
        path: &Path,
        width: u32,
        height: u32,
        origin: (f64, f64),
        resolution: f64,
        nodata: Option<&str>,
        values: &[u8],
    ) {
        let mut encoder = TiffEncoder::new(File::create(path).unwrap()).unwrap();
        let mut image = encoder.new_image::<Gray8>(width, height).unwrap();
        image
            .encoder()
            .write_tag(Tag::ModelPixelScaleTag, &[resolution, resolution, 0.0][..])
            .unwrap();
        image
            .encoder()
            .write_tag(
                Tag::ModelTiepointTag,
                &[0.0, 0.0, 0.0, origin.0, origin.1, 0.0][..],
            )
            .unwrap();
        if let Some(nodata) = nodata {
            image.encoder().write_tag(Tag::GdalNodata, nodata).unwrap();
        }
        image.write_data(values).unwrap();
    }

    #[test]
    fn should_read_georeferenced_cells() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ea2201.tif");
        write_geotiff(
            &path,
            3,
            2,
            (30.0, 5.0),
            0.5,
            Some("255"),
            &[100, 120, 255, 140, 160, 180],
        );

        let raster = read_geotiff(&path, "ndvi").unwrap();

        assert_eq!(raster.x_dim().unwrap(), "x");
        assert_eq!(raster.dim("x").unwrap().coords, Coords::Float(vec![30.25, 30.75, 31.25]));
        assert_eq!(raster.dim("y").unwrap().coords, Coords::Float(vec![4.75, 4.25]));
        assert_eq!(raster.get(&[1, 2]), Some(180.0));
        assert!(raster.get(&[0, 2]).unwrap().is_nan());
    }
}
