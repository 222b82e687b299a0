//! # timeseries-asof
//!
//! Point-in-time (as-of) joins for series-partitioned, time-indexed Arrow
//! tables.
//!
//! This crate is the supported public entry point and provides a small, stable surface.
//!
//! ## Example
//!
//! ```rust,ignore
//! use timeseries_asof::prelude::*;
//!
//! let trades = Table::try_new(trades_batch, "event_ts", &["symbol"])?;
//! let quotes = Table::try_new(quotes_batch, "event_ts", &["symbol"])?;
//! let joined = trades.as_of_join(&quotes, &AsOfJoinOptions::default())?;
//! ```

/// Convenience prelude with the stable, supported surface.
pub mod prelude;

/// Time bucketing for the skew-partitioned strategy.
pub mod partition {
    pub use timeseries_asof_core::partition::{IS_ORIGINAL_COL, TS_PARTITION_COL, TimePartitioner};
}

pub use timeseries_asof_core::asof::{
    AsOfJoinEngine, ColumnPlan, JoinInput, JoinPlan, JoinStrategy,
};
pub use timeseries_asof_core::config::{AsOfJoinOptions, EngineConfig};
pub use timeseries_asof_core::frame::{ArrowMemorySize, SizeEstimator};
pub use timeseries_asof_core::schema::SeriesSchema;
pub use timeseries_asof_core::table::window::{DEFAULT_FEATURES_COL, END_TS_COL, START_TS_COL};
pub use timeseries_asof_core::table::{DEFAULT_TS_IDX_COL, StateComparison, Table, TimeBound};
pub use timeseries_asof_core::time_index::{IndexLayout, TimeIndex};
pub use timeseries_asof_core::{TableError, TableResult};
