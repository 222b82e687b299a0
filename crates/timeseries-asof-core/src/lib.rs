//! Point-in-time (as-of) joins over series-partitioned Arrow tables.
//!
//! This crate provides the pieces behind `timeseries-asof`:
//!
//! - A `Table` abstraction: an Arrow `RecordBatch` plus a `SeriesSchema`
//!   naming its series id columns and its `TimeIndex` (`table` and
//!   `schema` modules). Structural columns are protected and renames flow
//!   into the schema.
//! - Time slicing (`table::slice`) and per-series window features such as
//!   moving averages, lookback features and state intervals
//!   (`table::window`).
//! - Overlapping time buckets for skewed data (`partition` module).
//! - The as-of join engine with its broadcast, standard and
//!   skew-partitioned strategies (`asof` module), configured through
//!   serde-friendly option structs (`config` module).
//! - Relational helpers over Arrow batches that everything above is
//!   written against (`frame` module).
//!
//! Every operation returns a new value or a [`TableError`]; inputs are
//! never modified.
#![deny(missing_docs)]
pub mod asof;
pub mod config;
pub mod error;
pub mod frame;
pub mod partition;
pub mod schema;
pub mod table;
pub mod time_index;

#[cfg(test)]
pub(crate) mod test_util;

pub use asof::{AsOfJoinEngine, ColumnPlan, JoinInput, JoinPlan, JoinStrategy};
pub use config::{AsOfJoinOptions, EngineConfig};
pub use error::{TableError, TableResult};
pub use frame::{ArrowMemorySize, SizeEstimator};
pub use partition::TimePartitioner;
pub use schema::SeriesSchema;
pub use table::{StateComparison, Table, TimeBound};
pub use time_index::TimeIndex;
