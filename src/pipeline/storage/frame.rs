//! A small named-column table used to move typed rows into and out of Parquet.

use arrow::array::{
    Array, ArrayRef, Date32Array, Float64Array, Int32Array, Int64Array, StringArray,
    TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Utf8(Vec<Option<String>>),
    Int32(Vec<Option<i32>>),
    Int64(Vec<Option<i64>>),
    Float64(Vec<Option<f64>>),
    Timestamp(Vec<Option<NaiveDateTime>>),
    Date(Vec<Option<NaiveDate>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Utf8(v) => v.len(),
            ColumnData::Int32(v) => v.len(),
            ColumnData::Int64(v) => v.len(),
            ColumnData::Float64(v) => v.len(),
            ColumnData::Timestamp(v) => v.len(),
            ColumnData::Date(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn data_type(&self) -> DataType {
        match self {
            ColumnData::Utf8(_) => DataType::Utf8,
            ColumnData::Int32(_) => DataType::Int32,
            ColumnData::Int64(_) => DataType::Int64,
            ColumnData::Float64(_) => DataType::Float64,
            ColumnData::Timestamp(_) => DataType::Timestamp(TimeUnit::Microsecond, None),
            ColumnData::Date(_) => DataType::Date32,
        }
    }

    fn empty_for(data_type: &DataType) -> Option<Self> {
        Some(match data_type {
            DataType::Utf8 => ColumnData::Utf8(Vec::new()),
            DataType::Int32 => ColumnData::Int32(Vec::new()),
            DataType::Int64 => ColumnData::Int64(Vec::new()),
            DataType::Float64 => ColumnData::Float64(Vec::new()),
            DataType::Timestamp(TimeUnit::Microsecond, None) => ColumnData::Timestamp(Vec::new()),
            DataType::Date32 => ColumnData::Date(Vec::new()),
            _ => return None,
        })
    }

    fn to_array(&self) -> ArrayRef {
        match self {
            ColumnData::Utf8(v) => Arc::new(StringArray::from(
                v.iter().map(|s| s.as_deref()).collect::<Vec<_>>(),
            )),
            ColumnData::Int32(v) => Arc::new(Int32Array::from(v.clone())),
            ColumnData::Int64(v) => Arc::new(Int64Array::from(v.clone())),
            ColumnData::Float64(v) => Arc::new(Float64Array::from(v.clone())),
            ColumnData::Timestamp(v) => Arc::new(TimestampMicrosecondArray::from(
                v.iter()
                    .map(|ts| ts.map(|ts| ts.and_utc().timestamp_micros()))
                    .collect::<Vec<_>>(),
            )),
            ColumnData::Date(v) => Arc::new(Date32Array::from(
                v.iter().map(|d| d.map(days_since_epoch)).collect::<Vec<_>>(),
            )),
        }
    }

    /// Append the values of an Arrow array of the matching type
    fn extend_from(&mut self, array: &dyn Array) -> Option<()> {
        let any = array.as_any();
        match self {
            ColumnData::Utf8(v) => {
                let a = any.downcast_ref::<StringArray>()?;
                v.extend(a.iter().map(|s| s.map(str::to_string)));
            }
            ColumnData::Int32(v) => v.extend(any.downcast_ref::<Int32Array>()?.iter()),
            ColumnData::Int64(v) => v.extend(any.downcast_ref::<Int64Array>()?.iter()),
            ColumnData::Float64(v) => v.extend(any.downcast_ref::<Float64Array>()?.iter()),
            ColumnData::Timestamp(v) => {
                let a = any.downcast_ref::<TimestampMicrosecondArray>()?;
                v.extend(a.iter().map(|m| {
                    m.and_then(DateTime::from_timestamp_micros)
                        .map(|dt| dt.naive_utc())
                }));
            }
            ColumnData::Date(v) => {
                let a = any.downcast_ref::<Date32Array>()?;
                v.extend(a.iter().map(|d| d.and_then(date_from_days)));
            }
        }
        Some(())
    }

    fn take(&self, keep: &[bool]) -> Self {
        fn pick<T: Clone>(v: &[Option<T>], keep: &[bool]) -> Vec<Option<T>> {
            v.iter()
                .zip(keep)
                .filter(|(_, k)| **k)
                .map(|(x, _)| x.clone())
                .collect()
        }
        match self {
            ColumnData::Utf8(v) => ColumnData::Utf8(pick(v, keep)),
            ColumnData::Int32(v) => ColumnData::Int32(pick(v, keep)),
            ColumnData::Int64(v) => ColumnData::Int64(pick(v, keep)),
            ColumnData::Float64(v) => ColumnData::Float64(pick(v, keep)),
            ColumnData::Timestamp(v) => ColumnData::Timestamp(pick(v, keep)),
            ColumnData::Date(v) => ColumnData::Date(pick(v, keep)),
        }
    }

    fn json_value(&self, row: usize) -> Value {
        match self {
            ColumnData::Utf8(v) => v[row].clone().map_or(Value::Null, Value::String),
            ColumnData::Int32(v) => v[row].map_or(Value::Null, Value::from),
            ColumnData::Int64(v) => v[row].map_or(Value::Null, Value::from),
            ColumnData::Float64(v) => v[row].map_or(Value::Null, Value::from),
            ColumnData::Timestamp(v) => v[row].map_or(Value::Null, |ts| {
                Value::String(ts.format("%Y-%m-%d %H:%M:%S").to_string())
            }),
            ColumnData::Date(v) => v[row].map_or(Value::Null, |d| Value::String(d.to_string())),
        }
    }
}

fn unix_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

fn days_since_epoch(date: NaiveDate) -> i32 {
    (date - unix_epoch()).num_days() as i32
}

fn date_from_days(days: i32) -> Option<NaiveDate> {
    unix_epoch().checked_add_signed(chrono::Duration::days(days as i64))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub columns: Vec<Column>,
}

/// Build a [`ColumnData`] by mapping each row through `|r| value`
macro_rules! col {
    ($rows:expr, $variant:ident, |$r:ident| $value:expr) => {
        $crate::pipeline::storage::frame::ColumnData::$variant($rows.iter().map(|$r| $value).collect())
    };
}

pub(crate) use col;

macro_rules! typed_column {
    ($fn_name:ident, $variant:ident, $ty:ty) => {
        pub fn $fn_name(&self, name: &str) -> Result<&[Option<$ty>]> {
            match self.column(name) {
                Some(ColumnData::$variant(v)) => Ok(v),
                Some(other) => Err(PipelineError::Schema {
                    file: String::new(),
                    message: format!(
                        "column '{}' has type {}, expected {}",
                        name,
                        other.data_type(),
                        stringify!($variant)
                    ),
                }),
                None => Err(PipelineError::Schema {
                    file: String::new(),
                    message: format!("column '{}' is missing", name),
                }),
            }
        }
    };
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_column(mut self, name: &str, data: ColumnData) -> Self {
        self.columns.push(Column {
            name: name.to_string(),
            data,
        });
        self
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.data.len())
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.columns.iter().find(|c| c.name == name).map(|c| &c.data)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    typed_column!(utf8, Utf8, String);
    typed_column!(int32, Int32, i32);
    typed_column!(int64, Int64, i64);
    typed_column!(float64, Float64, f64);
    typed_column!(timestamp, Timestamp, NaiveDateTime);
    typed_column!(date, Date, NaiveDate);

    pub fn schema(&self) -> SchemaRef {
        Arc::new(Schema::new(
            self.columns
                .iter()
                .map(|c| Field::new(c.name.as_str(), c.data.data_type(), true))
                .collect::<Vec<_>>(),
        ))
    }

    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let arrays: Vec<ArrayRef> = self.columns.iter().map(|c| c.data.to_array()).collect();
        Ok(RecordBatch::try_new(self.schema(), arrays)?)
    }

    /// Rebuild a frame from an Arrow schema and its batches
    pub fn from_batches(schema: &Schema, batches: &[RecordBatch]) -> Result<Self> {
        let mut columns = Vec::with_capacity(schema.fields().len());
        for field in schema.fields() {
            let data = ColumnData::empty_for(field.data_type()).ok_or_else(|| PipelineError::Schema {
                file: String::new(),
                message: format!(
                    "column '{}' has unsupported type {}",
                    field.name(),
                    field.data_type()
                ),
            })?;
            columns.push(Column {
                name: field.name().clone(),
                data,
            });
        }

        for batch in batches {
            for (column, array) in columns.iter_mut().zip(batch.columns()) {
                column.data.extend_from(array.as_ref()).ok_or_else(|| PipelineError::Schema {
                    file: String::new(),
                    message: format!("column '{}' does not match its declared type", column.name),
                })?;
            }
        }

        Ok(Self { columns })
    }

    /// Keep only the rows whose flag is set
    pub fn filter(&self, keep: &[bool]) -> Self {
        Self {
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    data: c.data.take(keep),
                })
                .collect(),
        }
    }

    /// Rows as JSON objects, columns in frame order
    pub fn to_json_rows(&self) -> Vec<Value> {
        (0..self.num_rows())
            .map(|row| {
                let mut obj = Map::new();
                for c in &self.columns {
                    obj.insert(c.name.clone(), c.data.json_value(row));
                }
                Value::Object(obj)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Frame {
        Frame::new()
            .with_column("name", ColumnData::Utf8(vec![Some("a".into()), None, Some("c".into())]))
            .with_column("n", ColumnData::Int64(vec![Some(1), Some(2), None]))
            .with_column(
                "day",
                ColumnData::Date(vec![NaiveDate::from_ymd_opt(2020, 2, 1), None, NaiveDate::from_ymd_opt(1969, 12, 31)]),
            )
            .with_column(
                "ts",
                ColumnData::Timestamp(vec![
                    NaiveDate::from_ymd_opt(2020, 2, 1).and_then(|d| d.and_hms_opt(5, 6, 7)),
                    None,
                    None,
                ]),
            )
    }

    #[test]
    fn test_record_batch_preserves_values_and_nulls() {
        let frame = sample();
        let batch = frame.to_record_batch().unwrap();
        assert_eq!(batch.num_rows(), 3);

        let back = Frame::from_batches(&frame.schema(), &[batch]).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn test_filter_and_json_rows() {
        let frame = sample().filter(&[true, false, true]);
        assert_eq!(frame.num_rows(), 2);
        let rows = frame.to_json_rows();
        assert_eq!(rows[0]["name"], "a");
        assert_eq!(rows[0]["day"], "2020-02-01");
        assert_eq!(rows[0]["ts"], "2020-02-01 05:06:07");
        assert_eq!(rows[1]["n"], Value::Null);
    }

    #[test]
    fn test_typed_accessors_report_schema_mismatch() {
        let frame = sample();
        assert_eq!(frame.int64("n").unwrap(), &[Some(1), Some(2), None]);
        assert!(matches!(frame.utf8("n"), Err(PipelineError::Schema { .. })));
        assert!(matches!(frame.utf8("missing"), Err(PipelineError::Schema { .. })));
    }

    #[test]
    fn test_col_macro_maps_rows_into_columns() {
        let rows = [(1, "x"), (2, ""), (3, "z")];
        let frame = Frame::new()
            .with_column("id", col!(rows, Int32, |r| Some(r.0)))
            .with_column("label", col!(rows, Utf8, |r| (!r.1.is_empty()).then(|| r.1.to_string())));

        assert_eq!(frame.int32("id").unwrap(), &[Some(1), Some(2), Some(3)]);
        assert_eq!(frame.utf8("label").unwrap(), &[Some("x".to_string()), None, Some("z".to_string())]);
    }
}
