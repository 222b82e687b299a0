//! Point-in-time (as-of) joins.
//!
//! For every left row, an as-of join attaches the right-hand values that
//! were current at the left row's time: those of the most recent right row
//! of the same series whose time is at or before it. A right row with the
//! same time (and sub-sequence) as a left row counts as current.
//!
//! # Strategies
//!
//! * [`JoinStrategy::Standard`] stacks both tables, orders each series by
//!   time and carries right values forward onto left rows.
//! * [`JoinStrategy::Skew`] does the same inside overlapping time buckets
//!   (see [`TimePartitioner`](crate::partition::TimePartitioner)).
//!   Lookback is bounded by the bucket width.
//! * [`JoinStrategy::Broadcast`] binary-searches the right table's sorted
//!   keys. It is only chosen when it gives the same answer as the standard
//!   strategy.
//!
//! The [`AsOfJoinEngine`] validates inputs and picks a strategy up front
//! ([`AsOfJoinEngine::plan`]); any failure during execution is reported as
//! [`TableError::Join`](crate::TableError::Join) naming the strategy and the
//! input ([`JoinInput`]) the failing step worked on.
//!
//! # Output
//!
//! The result keeps the left table's rows in their original order. Its
//! columns are the left table's (series ids, time columns, observational
//! columns) followed by the right table's time and observational columns,
//! after prefixing. Its series schema is the left table's.

mod broadcast;
mod carry;
mod combine;
mod plan;
mod skew;

use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::config::{AsOfJoinOptions, EngineConfig};
use crate::error::{JoinSnafu, TableResult};
use crate::frame::{ArrowMemorySize, SizeEstimator};
use crate::table::Table;

pub use plan::{ColumnPlan, JoinPlan};

/// How an as-of join is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinStrategy {
    /// Binary search against a small right-hand table.
    Broadcast,
    /// Carry-forward over the stacked tables.
    Standard,
    /// Carry-forward inside overlapping time buckets.
    Skew,
}

impl fmt::Display for JoinStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JoinStrategy::Broadcast => "broadcast",
            JoinStrategy::Standard => "standard",
            JoinStrategy::Skew => "skew",
        };
        f.write_str(name)
    }
}

/// Which join input a failing execution step was working on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinInput {
    /// The left table.
    Left,
    /// The right table.
    Right,
    /// Both tables at once (stacked, partitioned or searched together).
    Both,
}

impl fmt::Display for JoinInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JoinInput::Left => "left input",
            JoinInput::Right => "right input",
            JoinInput::Both => "combined inputs",
        };
        f.write_str(name)
    }
}

/// Which input a stacked row came from. Right sorts before left, so a right
/// row is visible to a left row with the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum Origin {
    Right,
    Left,
}

/// Plans and runs as-of joins.
///
/// The estimator sizes both inputs for the broadcast decision; anything
/// implementing [`SizeEstimator`], including a `Fn(&RecordBatch) -> u64`
/// closure, can stand in for the default [`ArrowMemorySize`].
///
/// [`RecordBatch`]: arrow::array::RecordBatch
#[derive(Debug, Clone, Default)]
pub struct AsOfJoinEngine<E = ArrowMemorySize> {
    estimator: E,
    config: EngineConfig,
}

impl AsOfJoinEngine {
    /// Engine with the default estimator and configuration.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<E: SizeEstimator> AsOfJoinEngine<E> {
    /// Engine sizing tables with `estimator`.
    pub fn with_estimator(estimator: E) -> Self {
        AsOfJoinEngine {
            estimator,
            config: EngineConfig::default(),
        }
    }

    /// Replace the engine configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validate `left` and `right` against `options` and decide how they
    /// would be joined, without joining them.
    pub fn plan(
        &self,
        left: &Table,
        right: &Table,
        options: &AsOfJoinOptions,
    ) -> TableResult<JoinPlan> {
        JoinPlan::try_new(left, right, options, &self.config, &self.estimator)
    }

    /// Join `right` onto `left` as of each left row's time.
    pub fn join(
        &self,
        left: &Table,
        right: &Table,
        options: &AsOfJoinOptions,
    ) -> TableResult<Table> {
        let plan = self.plan(left, right, options)?;
        let strategy = plan.strategy();
        let left = plan
            .column_plan()
            .rename_left(left)
            .context(JoinSnafu { strategy, input: JoinInput::Left })?;
        let right = plan
            .column_plan()
            .rename_right(right)
            .context(JoinSnafu { strategy, input: JoinInput::Right })?;
        let joined = execute(&plan, &left, &right).context(JoinSnafu {
            strategy,
            input: JoinInput::Both,
        })?;
        debug!(
            "{strategy} as-of join produced {} rows with {} carried columns",
            joined.num_rows(),
            plan.carried_columns().len()
        );
        Ok(joined)
    }
}

/// Run the planned strategy over already renamed inputs.
fn execute(plan: &JoinPlan, left: &Table, right: &Table) -> TableResult<Table> {
    let columns = plan.carried_columns();
    match (plan.strategy(), plan.partitioner()) {
        (JoinStrategy::Broadcast, _) => broadcast::join(left, right, columns),
        (JoinStrategy::Skew, Some(partitioner)) => skew::join(
            left,
            right,
            columns,
            partitioner,
            plan.report_empty_lookback(),
        ),
        _ => standard(left, right, columns, plan.skip_nulls()),
    }
}

fn standard(left: &Table, right: &Table, columns: &[String], skip_nulls: bool) -> TableResult<Table> {
    let combined = combine::combine(left, right)?;
    let carried = carry::carry_forward(&combined.table, columns, skip_nulls, combined.left_rows)?;
    carry::assemble(left, &combined.table, columns, &carried.sources)
}

impl Table {
    /// As-of join `right` onto this table with a default engine.
    ///
    /// See [`AsOfJoinEngine::join`].
    pub fn as_of_join(&self, right: &Table, options: &AsOfJoinOptions) -> TableResult<Table> {
        AsOfJoinEngine::new().join(self, right, options)
    }
}
