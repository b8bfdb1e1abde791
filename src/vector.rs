//! Vector features read from (zipped) shapefiles.

use std::{
    collections::HashMap,
    fmt,
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

use geo::{BoundingRect, Coord, LineString, MultiPolygon, Polygon, Rect};
use shapefile::{
    dbase::FieldValue,
    record::polygon::GenericPolygon,
    PolygonRing, Shape,
};
use tempfile::TempDir;
use tracing::debug;
use zip::ZipArchive;

use crate::error::{Error, Result};

/// Sidecar files that make up one shapefile layer.
const LAYER_EXTENSIONS: [&str; 5] = ["shp", "shx", "dbf", "prj", "cpg"];

/// Attribute value of a feature.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Null,
}

impl AttributeValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(value) => Some(*value),
            AttributeValue::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Text(text) => write!(f, "{text}"),
            AttributeValue::Number(value) => write!(f, "{value}"),
            AttributeValue::Bool(value) => write!(f, "{value}"),
            AttributeValue::Null => Ok(()),
        }
    }
}

impl From<FieldValue> for AttributeValue {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::Character(Some(text)) => AttributeValue::Text(text.trim().to_string()),
            FieldValue::Numeric(Some(value)) => AttributeValue::Number(value),
            FieldValue::Float(Some(value)) => AttributeValue::Number(value as f64),
            FieldValue::Integer(value) => AttributeValue::Number(value as f64),
            FieldValue::Double(value) => AttributeValue::Number(value),
            FieldValue::Currency(value) => AttributeValue::Number(value),
            FieldValue::Logical(Some(value)) => AttributeValue::Bool(value),
            FieldValue::Memo(text) => AttributeValue::Text(text),
            FieldValue::Character(None)
            | FieldValue::Numeric(None)
            | FieldValue::Float(None)
            | FieldValue::Logical(None)
            | FieldValue::Date(None) => AttributeValue::Null,
            other => AttributeValue::Text(format!("{other:?}")),
        }
    }
}

/// One polygon feature with its attribute row.
#[derive(Debug, Clone)]
pub struct Feature {
    pub properties: HashMap<String, AttributeValue>,
    pub geometry: MultiPolygon<f64>,
}

impl Feature {
    pub fn property(&self, column: &str) -> Option<&AttributeValue> {
        self.properties.get(column)
    }
}

/// A table of features, the equivalent of a vector layer.
#[derive(Debug, Clone, Default)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        FeatureCollection { features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Envelope of all geometries, `None` when there is nothing to bound.
    pub fn total_bounds(&self) -> Option<Rect<f64>> {
        self.features
            .iter()
            .filter_map(|feature| feature.geometry.bounding_rect())
            .reduce(|acc, rect| {
                Rect::new(
                    Coord {
                        x: acc.min().x.min(rect.min().x),
                        y: acc.min().y.min(rect.min().y),
                    },
                    Coord {
                        x: acc.max().x.max(rect.max().x),
                        y: acc.max().y.max(rect.max().y),
                    },
                )
            })
    }

    /// Values of one attribute column, erroring if any feature lacks it.
    pub fn column(&self, name: &str) -> Result<Vec<&AttributeValue>> {
        self.features
            .iter()
            .map(|feature| {
                feature
                    .property(name)
                    .ok_or_else(|| Error::MissingData(format!("Column {name} not found")))
            })
            .collect()
    }
}

/// Reads every polygon of a shapefile. Non polygon shapes are ignored.
pub fn read_shapefile(path: &Path) -> Result<FeatureCollection> {
    let mut reader = shapefile::Reader::from_path(path)?;
    let mut features = Vec::new();

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;
        let geometry = match shape {
            Shape::Polygon(polygon) => to_multipolygon(&polygon),
            Shape::PolygonM(polygon) => to_multipolygon(&polygon),
            Shape::PolygonZ(polygon) => to_multipolygon(&polygon),
            Shape::NullShape => MultiPolygon(vec![]),
            _ => continue,
        };
        let properties = HashMap::<String, FieldValue>::from(record)
            .into_iter()
            .map(|(key, value)| (key, AttributeValue::from(value)))
            .collect();

        features.push(Feature {
            properties,
            geometry,
        });
    }
    debug!("Read {} features from {}", features.len(), path.display());

    Ok(FeatureCollection::new(features))
}

/// Reads one layer of a zipped shapefile. The layer may sit in a
/// subdirectory of the archive.
pub fn read_zipped_layer(zip_path: &Path, layer_name: &str) -> Result<FeatureCollection> {
    let temp_dir = TempDir::new()?;
    let shp_path = extract_layer(zip_path, layer_name, temp_dir.path())?;

    read_shapefile(&shp_path)
}

/// Copies the sidecar files of `layer_name` out of the archive, returning the
/// path to the extracted `.shp`.
pub fn extract_layer(zip_path: &Path, layer_name: &str, target_dir: &Path) -> Result<PathBuf> {
    let stem = layer_name.strip_suffix(".shp").unwrap_or(layer_name);
    let mut archive = ZipArchive::new(File::open(zip_path)?)?;
    let mut shp_path = None;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(file_name) = entry
            .enclosed_name()
            .and_then(|name| name.file_name().map(|n| n.to_string_lossy().to_string()))
        else {
            continue;
        };
        let Some((entry_stem, extension)) = file_name.rsplit_once('.') else {
            continue;
        };
        if entry_stem != stem || !LAYER_EXTENSIONS.contains(&extension.to_lowercase().as_str()) {
            continue;
        }

        let out_path = target_dir.join(&file_name);
        io::copy(&mut entry, &mut File::create(&out_path)?)?;
        if extension.eq_ignore_ascii_case("shp") {
            shp_path = Some(out_path);
        }
    }

    shp_path.ok_or_else(|| {
        Error::MissingData(format!(
            "Layer {layer_name} not found in {}",
            zip_path.display()
        ))
    })
}

/// Extracts every entry of the archive into `target_dir`.
pub fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<()> {
    fs::create_dir_all(target_dir)?;
    let mut archive = ZipArchive::new(File::open(zip_path)?)?;
    archive.extract(target_dir)?;

    Ok(())
}

/// Shapefile polygons list outer rings each followed by their holes.
fn to_multipolygon<P>(polygon: &GenericPolygon<P>) -> MultiPolygon<f64>
where
    P: Copy + HasXY,
{
    let mut polygons: Vec<Polygon<f64>> = Vec::new();

    for ring in polygon.rings() {
        let line: LineString<f64> = ring
            .points()
            .iter()
            .map(|point| Coord {
                x: point.x(),
                y: point.y(),
            })
            .collect();
        match ring {
            PolygonRing::Outer(_) => polygons.push(Polygon::new(line, vec![])),
            PolygonRing::Inner(_) => match polygons.last_mut() {
                Some(last) => last.interiors_push(line),
                None => polygons.push(Polygon::new(line, vec![])),
            },
        }
    }

    MultiPolygon(polygons)
}

/// Planar coordinates of the shapefile point flavours.
trait HasXY {
    fn x(&self) -> f64;
    fn y(&self) -> f64;
}

impl HasXY for shapefile::Point {
    fn x(&self) -> f64 {
        self.x
    }
    fn y(&self) -> f64 {
        self.y
    }
}

impl HasXY for shapefile::PointM {
    fn x(&self) -> f64 {
        self.x
    }
    fn y(&self) -> f64 {
        self.y
    }
}

impl HasXY for shapefile::PointZ {
    fn x(&self) -> f64 {
        self.x
    }
    fn y(&self) -> f64 {
        self.y
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use shapefile::dbase::{Record, TableWriterBuilder};
    use std::io::Write;
    use zip::{write::FileOptions, ZipWriter};

    /// Writes a polygon layer with one character column, one square per row.
    pub(crate) fn write_layer(dir: &Path, stem: &str, column: &str, rows: &[(&str, [f64; 4])]) {
        let table = TableWriterBuilder::new()
            .add_character_field(column.try_into().unwrap(), 50);
        let mut writer =
            shapefile::Writer::from_path(dir.join(format!("{stem}.shp")), table).unwrap();

        for (value, [x_min, y_min, x_max, y_max]) in rows {
            let polygon = shapefile::Polygon::new(PolygonRing::Outer(vec![
                shapefile::Point::new(*x_min, *y_min),
                shapefile::Point::new(*x_min, *y_max),
                shapefile::Point::new(*x_max, *y_max),
                shapefile::Point::new(*x_max, *y_min),
                shapefile::Point::new(*x_min, *y_min),
            ]));
            let mut record = Record::default();
            record.insert(
                column.to_string(),
                FieldValue::Character(Some(value.to_string())),
            );
            writer.write_shape_and_record(&polygon, &record).unwrap();
        }
    }

    /// Zips every file of `dir` into `zip_path`, under `prefix/`.
    pub(crate) fn zip_dir(dir: &Path, zip_path: &Path, prefix: &str) {
        let mut zip = ZipWriter::new(File::create(zip_path).unwrap());
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            let name = format!(
                "{prefix}{}",
                path.file_name().unwrap().to_string_lossy()
            );
            zip.start_file(name, FileOptions::default()).unwrap();
            zip.write_all(&fs::read(&path).unwrap()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn should_read_written_layer() {
        let dir = TempDir::new().unwrap();
        write_layer(
            dir.path(),
            "adm1",
            "ADM1_PCODE",
            &[("NP01", [80.0, 28.0, 82.0, 30.0]), ("NP02", [82.0, 27.0, 85.0, 29.0])],
        );

        let layer = read_shapefile(&dir.path().join("adm1.shp")).unwrap();

        assert_eq!(layer.len(), 2);
        let codes: Vec<String> = layer
            .column("ADM1_PCODE")
            .unwrap()
            .iter()
            .map(|v| v.to_string())
            .collect();
        assert_eq!(codes, vec!["NP01", "NP02"]);

        let bounds = layer.total_bounds().unwrap();
        assert_eq!(bounds.min(), Coord { x: 80.0, y: 27.0 });
        assert_eq!(bounds.max(), Coord { x: 85.0, y: 30.0 });
    }

    #[test]
    fn should_read_layer_nested_in_zip() {
        let layer_dir = TempDir::new().unwrap();
        write_layer(layer_dir.path(), "abc_adm0", "PCODE", &[("AB", [0.0, 0.0, 1.0, 1.0])]);
        let out = TempDir::new().unwrap();
        let zip_path = out.path().join("abc.shp.zip");
        zip_dir(layer_dir.path(), &zip_path, "nested/");

        let layer = read_zipped_layer(&zip_path, "abc_adm0.shp").unwrap();

        assert_eq!(layer.len(), 1);
        assert!(matches!(
            read_zipped_layer(&zip_path, "abc_adm1.shp"),
            Err(Error::MissingData(_))
        ));
    }

    #[test]
    fn should_fail_for_missing_column() {
        let layer = FeatureCollection::new(vec![Feature {
            properties: HashMap::new(),
            geometry: MultiPolygon(vec![]),
        }]);

        assert!(layer.column("PCODE").is_err());
    }
}
