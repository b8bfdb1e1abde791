//! Rasters stored in long form: one column per dimension plus the value.

use std::{collections::HashMap, path::Path, sync::Arc};

use arrow::{
    array::{ArrayRef, Date32Array, Float32Array, Float64Array, RecordBatch},
    datatypes::{DataType, Field, Schema},
};
use ndarray::{ArrayD, IxDyn};
use tracing::debug;

use super::{downcast, meta_key, non_null, read_batches, writer, CHUNK_SIZE};
use crate::{
    dates::{from_date32, to_date32},
    error::{Error, Result},
    raster::{Coords, Dimension, Raster},
};

enum DimBuffer {
    Float(Vec<f64>),
    Date(Vec<i32>),
}

impl DimBuffer {
    fn for_coords(coords: &Coords, capacity: usize) -> Self {
        match coords {
            Coords::Float(_) => DimBuffer::Float(Vec::with_capacity(capacity)),
            Coords::Date(_) => DimBuffer::Date(Vec::with_capacity(capacity)),
        }
    }

    fn push(&mut self, coords: &Coords, index: usize) {
        match (self, coords) {
            (DimBuffer::Float(buffer), Coords::Float(values)) => buffer.push(values[index]),
            (DimBuffer::Date(buffer), Coords::Date(values)) => buffer.push(to_date32(values[index])),
            _ => {}
        }
    }

    fn take(&mut self) -> ArrayRef {
        match self {
            DimBuffer::Float(buffer) => Arc::new(Float64Array::from(std::mem::take(buffer))),
            DimBuffer::Date(buffer) => Arc::new(Date32Array::from(std::mem::take(buffer))),
        }
    }
}

/// Writes `raster` to `file_path`. NaN cells are stored as nulls and the
/// dimension roles and CRS go into the schema metadata.
pub fn save_raster(raster: &Raster, file_path: &Path) -> Result<()> {
    let dims = raster.dims();
    if dims.iter().any(|dim| dim.name == raster.name) {
        return Err(Error::Format(format!(
            "Variable {} shares its name with a dimension",
            raster.name
        )));
    }

    let mut fields: Vec<Field> = dims
        .iter()
        .map(|dim| {
            let data_type = match dim.coords {
                Coords::Float(_) => DataType::Float64,
                Coords::Date(_) => DataType::Date32,
            };
            Field::new(dim.name.as_str(), data_type, false)
        })
        .collect();
    fields.push(Field::new(raster.name.as_str(), DataType::Float32, true));

    let mut metadata = HashMap::from([
        (meta_key("name"), raster.name.clone()),
        (
            meta_key("dims"),
            dims.iter().map(|dim| dim.name.as_str()).collect::<Vec<_>>().join(","),
        ),
        (
            meta_key("shape"),
            raster
                .data()
                .shape()
                .iter()
                .map(|len| len.to_string())
                .collect::<Vec<_>>()
                .join(","),
        ),
    ]);
    if let (Ok(x_dim), Ok(y_dim)) = (raster.x_dim(), raster.y_dim()) {
        metadata.insert(meta_key("x_dim"), x_dim.to_string());
        metadata.insert(meta_key("y_dim"), y_dim.to_string());
    }
    if let Ok(t_dim) = raster.t_dim() {
        metadata.insert(meta_key("t_dim"), t_dim.to_string());
    }
    if let Some(crs) = raster.crs() {
        metadata.insert(meta_key("crs"), crs.to_string());
    }
    let schema = Arc::new(Schema::new_with_metadata(fields, metadata));
    let mut writer = writer(file_path, schema.clone())?;

    let batch_size = CHUNK_SIZE.min(raster.data().len().max(1));
    let mut buffers: Vec<DimBuffer> = dims
        .iter()
        .map(|dim| DimBuffer::for_coords(&dim.coords, batch_size))
        .collect();
    let mut values: Vec<Option<f32>> = Vec::with_capacity(batch_size);

    let mut flush = |buffers: &mut Vec<DimBuffer>, values: &mut Vec<Option<f32>>| -> Result<()> {
        let mut columns: Vec<ArrayRef> = buffers.iter_mut().map(DimBuffer::take).collect();
        columns.push(Arc::new(Float32Array::from(std::mem::take(values))));
        let batch = RecordBatch::try_new(schema.clone(), columns)?;
        writer.write(&batch)?;
        Ok(())
    };

    for (index, value) in raster.data().indexed_iter() {
        for (axis, (buffer, dim)) in buffers.iter_mut().zip(dims).enumerate() {
            buffer.push(&dim.coords, index[axis]);
        }
        values.push(if value.is_nan() { None } else { Some(*value) });
        if values.len() == batch_size {
            flush(&mut buffers, &mut values)?;
        }
    }
    if !values.is_empty() {
        flush(&mut buffers, &mut values)?;
    }
    writer.close()?;
    debug!("Saved {} to {}", raster.name, file_path.display());

    Ok(())
}

/// Reads a raster written by [`save_raster`].
pub fn load_raster(file_path: &Path) -> Result<Raster> {
    let (metadata, batches) = read_batches(file_path)?;
    let meta = |key: &str| metadata.get(&meta_key(key));
    let missing = |key: &str| {
        Error::Format(format!(
            "{} lacks the `{key}` raster metadata",
            file_path.display()
        ))
    };

    let name = meta("name").ok_or_else(|| missing("name"))?.clone();
    let dim_names: Vec<&str> = meta("dims")
        .ok_or_else(|| missing("dims"))?
        .split(',')
        .filter(|dim| !dim.is_empty())
        .collect();
    let shape: Vec<usize> = meta("shape")
        .ok_or_else(|| missing("shape"))?
        .split(',')
        .filter(|len| !len.is_empty())
        .map(|len| len.parse().map_err(|_| missing("shape")))
        .collect::<Result<_>>()?;
    if shape.len() != dim_names.len() {
        return Err(missing("shape"));
    }

    let mut values = Vec::with_capacity(shape.iter().product());
    for batch in &batches {
        let column = downcast::<Float32Array>(batch, &name)?;
        values.extend(column.iter().map(|value| value.unwrap_or(f32::NAN)));
    }
    if values.len() != shape.iter().product::<usize>() {
        return Err(Error::Format(format!(
            "{} holds {} cells, expected {:?}",
            file_path.display(),
            values.len(),
            shape
        )));
    }

    let mut dims = Vec::with_capacity(dim_names.len());
    for (axis, dim_name) in dim_names.iter().enumerate() {
        let stride: usize = shape[axis + 1..].iter().product();
        let rows: Vec<usize> = (0..shape[axis]).map(|i| i * stride).collect();
        dims.push(Dimension::new(
            *dim_name,
            read_dim(&batches, dim_name, &rows)?,
        ));
    }

    let data = ArrayD::from_shape_vec(IxDyn(&shape), values)
        .map_err(|e| Error::Format(format!("{}: {e}", file_path.display())))?;
    let mut raster = Raster::new(name, data, dims)?.with_crs(meta("crs").cloned());
    if let (Some(x_dim), Some(y_dim)) = (meta("x_dim"), meta("y_dim")) {
        raster = raster.set_spatial_dims(x_dim, y_dim)?;
    }
    if let Some(t_dim) = meta("t_dim") {
        raster = raster.set_time_dim(t_dim)?;
    }

    Ok(raster)
}

/// Picks the values at the given global row numbers from one dimension column.
fn read_dim(batches: &[RecordBatch], name: &str, rows: &[usize]) -> Result<Coords> {
    let mut floats = Vec::new();
    let mut dates = Vec::new();
    let mut offset = 0;
    let mut wanted = rows.iter().peekable();

    for batch in batches {
        let column = batch
            .column_by_name(name)
            .ok_or_else(|| Error::Format(format!("Column {name} missing")))?;
        non_null(column.as_ref(), name)?;
        let len = batch.num_rows();
        while let Some(&&row) = wanted.peek() {
            if row >= offset + len {
                break;
            }
            match column.data_type() {
                DataType::Float64 => floats.push(downcast::<Float64Array>(batch, name)?.value(row - offset)),
                DataType::Date32 => {
                    let days = downcast::<Date32Array>(batch, name)?.value(row - offset);
                    dates.push(from_date32(days).ok_or_else(|| {
                        Error::Format(format!("Column {name} holds an invalid date"))
                    })?);
                }
                other => {
                    return Err(Error::Format(format!(
                        "Column {name} has unsupported type {other}"
                    )))
                }
            }
            wanted.next();
        }
        offset += len;
    }

    Ok(if dates.is_empty() && !floats.is_empty() {
        Coords::Float(floats)
    } else if floats.is_empty() && !dates.is_empty() {
        Coords::Date(dates)
    } else if rows.is_empty() {
        Coords::Float(Vec::new())
    } else {
        return Err(Error::Format(format!("Column {name} is incomplete")));
    })
}

// -- Tests -------------------------------------------------------------------
