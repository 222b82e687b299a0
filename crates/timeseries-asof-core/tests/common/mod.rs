//! Shared fixtures for the integration tests.
#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use arrow::array::{
    ArrayRef, AsArray, Float64Array, Int64Array, RecordBatch, StringArray,
    TimestampMillisecondArray,
};
use arrow::datatypes::{DataType, Field, Float64Type, Int64Type, Schema, TimeUnit};
use timeseries_asof_core::Table;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// One series-keyed row: `(symbol, ts, value)`.
pub type Row<'a, T> = (&'a str, i64, T);

/// `symbol`, `ts: Int64`, `price: Float64` keyed by `symbol`.
pub fn prices(rows: &[Row<'_, f64>]) -> Table {
    let schema = Arc::new(Schema::new(vec![
        Field::new("symbol", DataType::Utf8, false),
        Field::new("ts", DataType::Int64, true),
        Field::new("price", DataType::Float64, true),
    ]));
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.0))),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.1))),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.2))),
    ];
    let batch = RecordBatch::try_new(schema, columns).unwrap();
    Table::try_new(batch, "ts", &["symbol"]).unwrap()
}

/// `symbol`, `ts: Int64`, nullable `label: Utf8` keyed by `symbol`.
pub fn labels(rows: &[Row<'_, Option<&str>>]) -> Table {
    let schema = Arc::new(Schema::new(vec![
        Field::new("symbol", DataType::Utf8, false),
        Field::new("ts", DataType::Int64, true),
        Field::new("label", DataType::Utf8, true),
    ]));
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.0))),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.1))),
        Arc::new(rows.iter().map(|r| r.2).collect::<StringArray>()),
    ];
    let batch = RecordBatch::try_new(schema, columns).unwrap();
    Table::try_new(batch, "ts", &["symbol"]).unwrap()
}

/// `symbol`, `event_ts: Timestamp(ms, UTC)`, `bid: Float64` keyed by `symbol`.
pub fn bids(rows: &[Row<'_, f64>]) -> Table {
    let ts_type = DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into()));
    let schema = Arc::new(Schema::new(vec![
        Field::new("symbol", DataType::Utf8, false),
        Field::new("event_ts", ts_type, true),
        Field::new("bid", DataType::Float64, true),
    ]));
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.0))),
        Arc::new(
            TimestampMillisecondArray::from_iter_values(rows.iter().map(|r| r.1))
                .with_timezone("UTC"),
        ),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.2))),
    ];
    let batch = RecordBatch::try_new(schema, columns).unwrap();
    Table::try_new(batch, "event_ts", &["symbol"]).unwrap()
}

pub fn strings(table: &Table, name: &str) -> Vec<Option<String>> {
    table
        .batch()
        .column_by_name(name)
        .unwrap()
        .as_string::<i32>()
        .iter()
        .map(|v| v.map(str::to_string))
        .collect()
}

pub fn ints(table: &Table, name: &str) -> Vec<Option<i64>> {
    table
        .batch()
        .column_by_name(name)
        .unwrap()
        .as_primitive::<Int64Type>()
        .iter()
        .collect()
}

pub fn floats(table: &Table, name: &str) -> Vec<Option<f64>> {
    table
        .batch()
        .column_by_name(name)
        .unwrap()
        .as_primitive::<Float64Type>()
        .iter()
        .collect()
}

pub fn some(values: &[&str]) -> Vec<Option<String>> {
    values.iter().map(|v| Some(v.to_string())).collect()
}
