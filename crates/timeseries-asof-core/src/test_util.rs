use std::sync::Arc;

use arrow::array::{
    ArrayRef, AsArray, Float64Array, Int64Array, RecordBatch, StringArray,
    TimestampMillisecondArray,
};
use arrow::datatypes::{DataType, Field, Float64Type, Int64Type, Schema, TimeUnit};
use arrow::error::ArrowError;

pub(crate) type TestResult = Result<(), Box<dyn std::error::Error>>;

/// `symbol: Utf8, ts: Int64, price: Float64`.
pub(crate) fn price_batch(rows: &[(&str, i64, f64)]) -> Result<RecordBatch, ArrowError> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("symbol", DataType::Utf8, false),
        Field::new("ts", DataType::Int64, true),
        Field::new("price", DataType::Float64, true),
    ]));
    let symbol: ArrayRef = Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.0)));
    let ts: ArrayRef = Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.1)));
    let price: ArrayRef = Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.2)));
    RecordBatch::try_new(schema, vec![symbol, ts, price])
}

/// `symbol: Utf8, ts: Int64, quote: Utf8 (nullable)`.
pub(crate) fn quote_batch(rows: &[(&str, i64, Option<&str>)]) -> Result<RecordBatch, ArrowError> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("symbol", DataType::Utf8, false),
        Field::new("ts", DataType::Int64, true),
        Field::new("quote", DataType::Utf8, true),
    ]));
    let symbol: ArrayRef = Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.0)));
    let ts: ArrayRef = Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.1)));
    let quote: ArrayRef = Arc::new(rows.iter().map(|r| r.2).collect::<StringArray>());
    RecordBatch::try_new(schema, vec![symbol, ts, quote])
}

/// `symbol: Utf8, ts: Int64, seq: Int64, price: Float64`.
pub(crate) fn subsequence_batch(
    rows: &[(&str, i64, i64, f64)],
) -> Result<RecordBatch, ArrowError> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("symbol", DataType::Utf8, false),
        Field::new("ts", DataType::Int64, true),
        Field::new("seq", DataType::Int64, true),
        Field::new("price", DataType::Float64, true),
    ]));
    let symbol: ArrayRef = Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.0)));
    let ts: ArrayRef = Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.1)));
    let seq: ArrayRef = Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.2)));
    let price: ArrayRef = Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.3)));
    RecordBatch::try_new(schema, vec![symbol, ts, seq, price])
}

/// `symbol: Utf8, ts: Timestamp(ms, UTC), price: Float64`.
pub(crate) fn tick_batch(rows: &[(&str, i64, f64)]) -> Result<RecordBatch, ArrowError> {
    let ts_type = DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into()));
    let schema = Arc::new(Schema::new(vec![
        Field::new("symbol", DataType::Utf8, false),
        Field::new("ts", ts_type, true),
        Field::new("price", DataType::Float64, true),
    ]));
    let symbol: ArrayRef = Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.0)));
    let ts: ArrayRef = Arc::new(
        TimestampMillisecondArray::from_iter_values(rows.iter().map(|r| r.1)).with_timezone("UTC"),
    );
    let price: ArrayRef = Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.2)));
    RecordBatch::try_new(schema, vec![symbol, ts, price])
}

pub(crate) fn string_values(batch: &RecordBatch, name: &str) -> Vec<Option<String>> {
    let col = batch.column_by_name(name).expect("column present");
    col.as_string::<i32>()
        .iter()
        .map(|v| v.map(str::to_string))
        .collect()
}

pub(crate) fn i64_values(batch: &RecordBatch, name: &str) -> Vec<Option<i64>> {
    let col = batch.column_by_name(name).expect("column present");
    col.as_primitive::<Int64Type>().iter().collect()
}

pub(crate) fn f64_values(batch: &RecordBatch, name: &str) -> Vec<Option<f64>> {
    let col = batch.column_by_name(name).expect("column present");
    col.as_primitive::<Float64Type>().iter().collect()
}
