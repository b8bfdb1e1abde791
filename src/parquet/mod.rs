//! Handles serialising processed data to disk in the _parquet_ file format.

pub mod raster;
pub mod table;

pub use raster::{load_raster, save_raster};
pub use table::{load_table, save_table, ColumnData, Table};

use std::{collections::HashMap, fs::File, path::Path, sync::Arc};

use arrow::{
    array::{Array, RecordBatch},
    datatypes::Schema,
};
use parquet::{
    arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter},
    file::properties::WriterProperties,
};

use crate::error::{Error, Result};

/// Rows written per record batch.
const CHUNK_SIZE: usize = 100_000;

/// Prefix of the schema metadata keys this crate writes.
const META_PREFIX: &str = "anticipy:";

fn writer(path: &Path, schema: Arc<Schema>) -> Result<ArrowWriter<File>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let props = WriterProperties::builder()
        .set_compression(parquet::basic::Compression::SNAPPY)
        .build();

    Ok(ArrowWriter::try_new(file, schema, Some(props))?)
}

/// Reads every record batch of a file together with the schema metadata.
fn read_batches(path: &Path) -> Result<(HashMap<String, String>, Vec<RecordBatch>)> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let metadata = builder.schema().metadata().clone();
    let batches = builder.build()?.collect::<std::result::Result<Vec<_>, _>>()?;

    Ok((metadata, batches))
}

fn meta_key(key: &str) -> String {
    format!("{META_PREFIX}{key}")
}

fn downcast<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| Error::Format(format!("Column {name} missing")))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| Error::Format(format!("Column {name} has an unexpected type")))
}

fn non_null(array: &dyn Array, name: &str) -> Result<()> {
    if array.null_count() > 0 {
        return Err(Error::Format(format!("Column {name} contains nulls")));
    }
    Ok(())
}
