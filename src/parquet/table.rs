//! Small column oriented tables for processed tabular outputs such as
//! reporting point discharge or zonal statistics.

use std::{collections::HashMap, path::Path, sync::Arc};

use arrow::{
    array::{ArrayRef, Date32Array, Float64Array, Int64Array, RecordBatch, StringArray},
    datatypes::{DataType, Field, Schema},
};
use chrono::NaiveDate;
use tracing::debug;

use super::{downcast, non_null, read_batches, writer, CHUNK_SIZE};
use crate::{
    dates::{from_date32, to_date32},
    error::{Error, Result},
};

/// Values of one column. Missing floats are NaN.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Text(Vec<String>),
    Date(Vec<NaiveDate>),
    Int(Vec<i64>),
    Float(Vec<f64>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Text(values) => values.len(),
            ColumnData::Date(values) => values.len(),
            ColumnData::Int(values) => values.len(),
            ColumnData::Float(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn empty_like(&self) -> ColumnData {
        match self {
            ColumnData::Text(_) => ColumnData::Text(Vec::new()),
            ColumnData::Date(_) => ColumnData::Date(Vec::new()),
            ColumnData::Int(_) => ColumnData::Int(Vec::new()),
            ColumnData::Float(_) => ColumnData::Float(Vec::new()),
        }
    }

    fn select(&self, rows: &[usize]) -> ColumnData {
        match self {
            ColumnData::Text(v) => ColumnData::Text(rows.iter().map(|&i| v[i].clone()).collect()),
            ColumnData::Date(v) => ColumnData::Date(rows.iter().map(|&i| v[i]).collect()),
            ColumnData::Int(v) => ColumnData::Int(rows.iter().map(|&i| v[i]).collect()),
            ColumnData::Float(v) => ColumnData::Float(rows.iter().map(|&i| v[i]).collect()),
        }
    }

    fn extend(&mut self, other: &ColumnData) -> Result<()> {
        match (self, other) {
            (ColumnData::Text(a), ColumnData::Text(b)) => a.extend(b.iter().cloned()),
            (ColumnData::Date(a), ColumnData::Date(b)) => a.extend(b),
            (ColumnData::Int(a), ColumnData::Int(b)) => a.extend(b),
            (ColumnData::Float(a), ColumnData::Float(b)) => a.extend(b),
            _ => return Err(Error::Format("Column types differ".to_string())),
        }
        Ok(())
    }

    fn data_type(&self) -> DataType {
        match self {
            ColumnData::Text(_) => DataType::Utf8,
            ColumnData::Date(_) => DataType::Date32,
            ColumnData::Int(_) => DataType::Int64,
            ColumnData::Float(_) => DataType::Float64,
        }
    }

    fn to_array(&self, start: usize, end: usize) -> ArrayRef {
        match self {
            ColumnData::Text(v) => Arc::new(StringArray::from_iter_values(&v[start..end])),
            ColumnData::Date(v) => Arc::new(Date32Array::from_iter_values(
                v[start..end].iter().map(|d| to_date32(*d)),
            )),
            ColumnData::Int(v) => Arc::new(Int64Array::from(v[start..end].to_vec())),
            ColumnData::Float(v) => Arc::new(Float64Array::from_iter(
                v[start..end].iter().map(|x| (!x.is_nan()).then_some(*x)),
            )),
        }
    }
}

/// Named columns of equal length.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<(String, ColumnData)>,
}

impl Table {
    pub fn new(columns: Vec<(String, ColumnData)>) -> Result<Self> {
        if let Some((_, first)) = columns.first() {
            if let Some((name, _)) = columns.iter().find(|(_, data)| data.len() != first.len()) {
                return Err(Error::Format(format!(
                    "Column {name} differs in length from the others"
                )));
            }
        }
        Ok(Table { columns })
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, |(_, data)| data.len())
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Result<&ColumnData> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, data)| data)
            .ok_or_else(|| Error::MissingData(format!("Column {name} not found")))
    }

    pub fn text(&self, name: &str) -> Result<&[String]> {
        match self.column(name)? {
            ColumnData::Text(values) => Ok(values),
            _ => Err(Error::Format(format!("Column {name} is not text"))),
        }
    }

    pub fn dates(&self, name: &str) -> Result<&[NaiveDate]> {
        match self.column(name)? {
            ColumnData::Date(values) => Ok(values),
            _ => Err(Error::Format(format!("Column {name} is not a date"))),
        }
    }

    pub fn ints(&self, name: &str) -> Result<&[i64]> {
        match self.column(name)? {
            ColumnData::Int(values) => Ok(values),
            _ => Err(Error::Format(format!("Column {name} is not an integer"))),
        }
    }

    pub fn floats(&self, name: &str) -> Result<&[f64]> {
        match self.column(name)? {
            ColumnData::Float(values) => Ok(values),
            _ => Err(Error::Format(format!("Column {name} is not a float"))),
        }
    }

    /// Keeps the rows at `rows`, in that order.
    pub fn select_rows(&self, rows: &[usize]) -> Table {
        Table {
            columns: self
                .columns
                .iter()
                .map(|(name, data)| (name.clone(), data.select(rows)))
                .collect(),
        }
    }

    /// Keeps the rows for which `keep` is true.
    pub fn filter(&self, keep: impl Fn(usize) -> bool) -> Table {
        let rows: Vec<usize> = (0..self.num_rows()).filter(|&row| keep(row)).collect();
        self.select_rows(&rows)
    }

    /// Drops a column if present.
    pub fn without(mut self, name: &str) -> Table {
        self.columns.retain(|(column, _)| column != name);
        self
    }

    /// Stacks tables with identical column names and types.
    pub fn concat(tables: &[Table]) -> Result<Table> {
        let Some(first) = tables.first() else {
            return Ok(Table::default());
        };
        let mut columns: Vec<(String, ColumnData)> = first
            .columns
            .iter()
            .map(|(name, data)| (name.clone(), data.empty_like()))
            .collect();
        for table in tables {
            if table.column_names() != first.column_names() {
                return Err(Error::Format("Tables have different columns".to_string()));
            }
            for ((_, merged), (_, data)) in columns.iter_mut().zip(&table.columns) {
                merged.extend(data)?;
            }
        }
        Ok(Table { columns })
    }

    /// Joins `other` on the `keys` columns, keeping rows present in both.
    /// Non-key columns of `other` are appended.
    pub fn join(&self, other: &Table, keys: &[&str]) -> Result<Table> {
        let key_of = |table: &Table, row: usize| -> Result<String> {
            keys.iter()
                .map(|key| {
                    Ok(match table.column(key)? {
                        ColumnData::Text(v) => v[row].clone(),
                        ColumnData::Date(v) => v[row].to_string(),
                        ColumnData::Int(v) => v[row].to_string(),
                        ColumnData::Float(v) => v[row].to_string(),
                    })
                })
                .collect::<Result<Vec<_>>>()
                .map(|parts| parts.join("\u{1f}"))
        };

        let mut index = HashMap::new();
        for row in 0..other.num_rows() {
            index.insert(key_of(other, row)?, row);
        }
        let mut left_rows = Vec::new();
        let mut right_rows = Vec::new();
        for row in 0..self.num_rows() {
            if let Some(&matched) = index.get(&key_of(self, row)?) {
                left_rows.push(row);
                right_rows.push(matched);
            }
        }

        let mut joined = self.select_rows(&left_rows);
        let right = other.select_rows(&right_rows);
        joined.columns.extend(
            right
                .columns
                .into_iter()
                .filter(|(name, _)| !keys.contains(&name.as_str())),
        );
        Ok(joined)
    }
}

/// Writes `table` to `file_path` in chunks. NaN floats are stored as nulls.
pub fn save_table(table: &Table, file_path: &Path) -> Result<()> {
    let schema = Arc::new(Schema::new(
        table
            .columns
            .iter()
            .map(|(name, data)| {
                let nullable = matches!(data, ColumnData::Float(_));
                Field::new(name.as_str(), data.data_type(), nullable)
            })
            .collect::<Vec<_>>(),
    ));
    let mut writer = writer(file_path, schema.clone())?;

    let total_rows = table.num_rows();
    let mut start = 0;
    while start < total_rows {
        let end = total_rows.min(start + CHUNK_SIZE);
        let columns: Vec<ArrayRef> = table
            .columns
            .iter()
            .map(|(_, data)| data.to_array(start, end))
            .collect();
        writer.write(&RecordBatch::try_new(schema.clone(), columns)?)?;
        start = end;
    }
    writer.close()?;
    debug!("Saved {} rows to {}", total_rows, file_path.display());

    Ok(())
}

/// Reads a table written by [`save_table`].
pub fn load_table(file_path: &Path) -> Result<Table> {
    let (_, batches) = read_batches(file_path)?;
    let Some(first) = batches.first() else {
        return Ok(Table::default());
    };
    let schema = first.schema();

    let mut columns = Vec::with_capacity(schema.fields().len());
    for field in schema.fields() {
        let name = field.name().as_str();
        let mut data = match field.data_type() {
            DataType::Utf8 => ColumnData::Text(Vec::new()),
            DataType::Date32 => ColumnData::Date(Vec::new()),
            DataType::Int64 => ColumnData::Int(Vec::new()),
            DataType::Float64 => ColumnData::Float(Vec::new()),
            other => {
                return Err(Error::Format(format!(
                    "Column {name} has unsupported type {other}"
                )))
            }
        };
        for batch in &batches {
            match &mut data {
                ColumnData::Text(values) => {
                    let array = downcast::<StringArray>(batch, name)?;
                    non_null(array, name)?;
                    values.extend(array.iter().map(|v| v.unwrap_or_default().to_string()));
                }
                ColumnData::Date(values) => {
                    let array = downcast::<Date32Array>(batch, name)?;
                    non_null(array, name)?;
                    for days in array.values().iter() {
                        values.push(from_date32(*days).ok_or_else(|| {
                            Error::Format(format!("Column {name} holds an invalid date"))
                        })?);
                    }
                }
                ColumnData::Int(values) => {
                    let array = downcast::<Int64Array>(batch, name)?;
                    non_null(array, name)?;
                    values.extend(array.values().iter());
                }
                ColumnData::Float(values) => {
                    let array = downcast::<Float64Array>(batch, name)?;
                    values.extend(array.iter().map(|v| v.unwrap_or(f64::NAN)));
                }
            }
        }
        columns.push((name.to_string(), data));
    }

    Table::new(columns)
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn date(month: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, month, 1).unwrap()
    }

    fn discharge() -> Table {
        Table::new(vec![
            ("time".to_string(), ColumnData::Date(vec![date(1), date(2)])),
            ("number".to_string(), ColumnData::Int(vec![0, 0])),
            ("Chatara".to_string(), ColumnData::Float(vec![120.5, f64::NAN])),
        ])
        .unwrap()
    }

    #[test]
    fn should_restore_saved_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("glofas.parquet");

        save_table(&discharge(), &path).unwrap();
        let loaded = load_table(&path).unwrap();

        assert_eq!(loaded.column_names(), vec!["time", "number", "Chatara"]);
        assert_eq!(loaded.dates("time").unwrap(), &[date(1), date(2)]);
        assert_eq!(loaded.floats("Chatara").unwrap()[0], 120.5);
        assert!(loaded.floats("Chatara").unwrap()[1].is_nan());
    }

    #[test]
    fn should_reject_ragged_columns() {
        let result = Table::new(vec![
            ("a".to_string(), ColumnData::Int(vec![1, 2])),
            ("b".to_string(), ColumnData::Int(vec![1])),
        ]);

        assert!(result.is_err());
    }

    #[test]
    fn should_concat_and_filter() {
        let merged = Table::concat(&[discharge(), discharge()]).unwrap();
        assert_eq!(merged.num_rows(), 4);

        let january = merged.filter(|row| merged.dates("time").unwrap()[row] == date(1));
        assert_eq!(january.num_rows(), 2);
    }

    #[test]
    fn should_join_on_keys() {
        let left = Table::new(vec![
            ("ADM1".to_string(), ColumnData::Text(vec!["a".into(), "b".into()])),
            ("mean".to_string(), ColumnData::Float(vec![1.0, 2.0])),
        ])
        .unwrap();
        let right = Table::new(vec![
            ("ADM1".to_string(), ColumnData::Text(vec!["b".into(), "a".into()])),
            ("max".to_string(), ColumnData::Float(vec![20.0, 10.0])),
        ])
        .unwrap();

        let joined = left.join(&right, &["ADM1"]).unwrap();

        assert_eq!(joined.column_names(), vec!["ADM1", "mean", "max"]);
        assert_eq!(joined.floats("max").unwrap(), &[10.0, 20.0]);
    }
}
