//! Time slicing and per-series windows.
//!
//! Slices compare the primary time field against a bound with Arrow's
//! comparison kernels. Literal bounds are cast to the field's type first
//! (timezone included) and broadcast as a [`Scalar`], so no full-length bound
//! column is materialized. Floating point bounds against an integer field
//! compare in `f64` instead, so `2.5` stays between `2` and `3`. A null time
//! never satisfies a predicate.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Datum, Float64Array, Int64Array, Scalar, StringArray,
};
use arrow::compute::kernels::cmp;
use arrow::datatypes::DataType;
use arrow::error::ArrowError;
use chrono::{DateTime, Utc};
use snafu::prelude::*;

use crate::error::{ArrowSnafu, TableResult};
use crate::frame::{self, temporal};

use super::Table;

/// A value to compare the primary time field against.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeBound {
    /// Integer literal (epoch units for timestamp columns).
    Int(i64),
    /// Floating point literal.
    Float(f64),
    /// String literal, parsed by Arrow's cast when the time field is temporal.
    Text(String),
    /// A point in time.
    Instant(DateTime<Utc>),
    /// Another column of the same table, compared row by row.
    Column(String),
}

impl From<i64> for TimeBound {
    fn from(value: i64) -> Self {
        TimeBound::Int(value)
    }
}

impl From<i32> for TimeBound {
    fn from(value: i32) -> Self {
        TimeBound::Int(value.into())
    }
}

impl From<f64> for TimeBound {
    fn from(value: f64) -> Self {
        TimeBound::Float(value)
    }
}

impl From<&str> for TimeBound {
    fn from(value: &str) -> Self {
        TimeBound::Text(value.to_string())
    }
}

impl From<String> for TimeBound {
    fn from(value: String) -> Self {
        TimeBound::Text(value)
    }
}

impl From<DateTime<Utc>> for TimeBound {
    fn from(value: DateTime<Utc>) -> Self {
        TimeBound::Instant(value)
    }
}

#[derive(Debug, Clone, Copy)]
enum SliceOp {
    Eq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl SliceOp {
    fn apply(self, lhs: &dyn Datum, rhs: &dyn Datum) -> Result<BooleanArray, ArrowError> {
        match self {
            SliceOp::Eq => cmp::eq(lhs, rhs),
            SliceOp::Lt => cmp::lt(lhs, rhs),
            SliceOp::LtEq => cmp::lt_eq(lhs, rhs),
            SliceOp::Gt => cmp::gt(lhs, rhs),
            SliceOp::GtEq => cmp::gt_eq(lhs, rhs),
        }
    }
}

impl Table {
    /// Rows whose time equals `ts`.
    pub fn at(&self, ts: impl Into<TimeBound>) -> TableResult<Table> {
        self.slice(SliceOp::Eq, ts.into())
    }

    /// Rows strictly before `ts`.
    pub fn before(&self, ts: impl Into<TimeBound>) -> TableResult<Table> {
        self.slice(SliceOp::Lt, ts.into())
    }

    /// Rows at or before `ts`.
    pub fn at_or_before(&self, ts: impl Into<TimeBound>) -> TableResult<Table> {
        self.slice(SliceOp::LtEq, ts.into())
    }

    /// Rows strictly after `ts`.
    pub fn after(&self, ts: impl Into<TimeBound>) -> TableResult<Table> {
        self.slice(SliceOp::Gt, ts.into())
    }

    /// Rows at or after `ts`.
    pub fn at_or_after(&self, ts: impl Into<TimeBound>) -> TableResult<Table> {
        self.slice(SliceOp::GtEq, ts.into())
    }

    /// Rows between `start` and `end`, endpoints included when `inclusive`.
    pub fn between(
        &self,
        start: impl Into<TimeBound>,
        end: impl Into<TimeBound>,
        inclusive: bool,
    ) -> TableResult<Table> {
        if inclusive {
            self.at_or_after(start)?.at_or_before(end)
        } else {
            self.after(start)?.before(end)
        }
    }

    /// The first `n` rows of every series in time order.
    pub fn earliest(&self, n: usize) -> TableResult<Table> {
        self.top_rows_per_series(n, false)
    }

    /// The last `n` rows of every series in time order.
    pub fn latest(&self, n: usize) -> TableResult<Table> {
        self.top_rows_per_series(n, true)
    }

    /// The `n` most recent rows per series at or before `ts`.
    pub fn prior_to(&self, ts: impl Into<TimeBound>, n: usize) -> TableResult<Table> {
        self.at_or_before(ts)?.latest(n)
    }

    /// The `n` earliest rows per series at or after `ts`.
    pub fn subsequent_to(&self, ts: impl Into<TimeBound>, n: usize) -> TableResult<Table> {
        self.at_or_after(ts)?.earliest(n)
    }

    fn slice(&self, op: SliceOp, bound: TimeBound) -> TableResult<Table> {
        let index = self.time_index();
        let values = index.primary_values(self.batch())?;
        let target = values.data_type().clone();
        let column = index.primary_field();

        let mask = match bound {
            TimeBound::Column(name) => {
                let other = frame::column(self.batch(), &name)?;
                if target.is_integer() && other.data_type().is_floating() {
                    let widened = temporal::cast_to(&values, &DataType::Float64)?;
                    let other = temporal::cast_to(other, &DataType::Float64)?;
                    op.apply(&widened, &other)
                } else {
                    op.apply(&values, &temporal::cast_to(other, &target)?)
                }
            }
            TimeBound::Instant(instant) => {
                let scalar = Scalar::new(temporal::instant_literal(instant, &target, column)?);
                op.apply(&values, &scalar)
            }
            TimeBound::Int(v) => {
                let scalar = literal(Arc::new(Int64Array::from(vec![v])), &target)?;
                op.apply(&values, &scalar)
            }
            // Integer times widen to f64 so fractional bounds keep their value.
            TimeBound::Float(v) if target.is_integer() => {
                let widened = temporal::cast_to(&values, &DataType::Float64)?;
                let scalar = Scalar::new(Float64Array::from(vec![v]));
                op.apply(&widened, &scalar)
            }
            TimeBound::Float(v) => {
                let scalar = literal(Arc::new(Float64Array::from(vec![v])), &target)?;
                op.apply(&values, &scalar)
            }
            TimeBound::Text(s) => {
                let scalar = literal(Arc::new(StringArray::from(vec![s])), &target)?;
                op.apply(&values, &scalar)
            }
        }
        .context(ArrowSnafu {
            operation: format!("slice on {column}"),
        })?;

        let batch = frame::filter(self.batch(), &mask)?;
        Ok(self.with_transformed_batch(batch))
    }

    /// Keep rows whose 1-based row number inside their series, ordered by
    /// the time index (reversed for `latest`), is at most `n`.
    fn top_rows_per_series(&self, n: usize, reverse: bool) -> TableResult<Table> {
        let order = self.series_window(reverse)?;
        let mask: BooleanArray = order
            .row_numbers()
            .into_iter()
            .map(|row_number| Some(row_number as usize <= n))
            .collect();
        let batch = frame::filter(self.batch(), &mask)?;
        Ok(self.with_transformed_batch(batch))
    }
}

/// A one-row literal cast to `target`, ready to broadcast.
fn literal(raw: ArrayRef, target: &DataType) -> TableResult<Scalar<ArrayRef>> {
    Ok(Scalar::new(temporal::cast_to(&raw, target)?))
}
