//! Wrapper prelude.
//!
//! The `timeseries-asof` crate is the supported public entry point.
//! Downstream code should prefer importing from this prelude instead of
//! depending on internal core module paths.

pub use crate::partition;
pub use crate::{
    AsOfJoinEngine, AsOfJoinOptions, EngineConfig, JoinPlan, JoinStrategy, SeriesSchema,
    StateComparison, Table, TableError, TableResult, TimeBound, TimeIndex,
};
