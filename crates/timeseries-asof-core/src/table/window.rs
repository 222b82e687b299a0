//! Per-series window features.
//!
//! Each feature walks every series in time index order and writes its
//! results back at the rows' original positions, so the table keeps its row
//! order.

use std::str::FromStr;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Datum, FixedSizeListArray, Float64Array, ListArray,
    RecordBatch, UInt32Array,
};
use arrow::buffer::{OffsetBuffer, ScalarBuffer};
use arrow::compute::kernels::cmp;
use arrow::compute::{SortOptions, take};
use arrow::datatypes::{DataType, Field, Float64Type, Schema};
use arrow::error::ArrowError;
use log::debug;
use snafu::prelude::*;

use crate::error::{
    ArrowSnafu, ColumnCollisionSnafu, InvalidStateDefinitionSnafu, InvalidWindowSizeSnafu,
    NonNumericColumnSnafu, TableError, TableResult, TooManyRowsSnafu,
    UnsupportedCombinationSnafu,
};
use crate::frame::ordering::{WindowOrder, encode_rows};
use crate::frame::{self, temporal};

use super::Table;

/// Interval start column of [`Table::extract_state_intervals`].
pub const START_TS_COL: &str = "start_ts";

/// Interval end column of [`Table::extract_state_intervals`].
pub const END_TS_COL: &str = "end_ts";

/// Conventional name for the column built by [`Table::with_lookback_features`].
pub const DEFAULT_FEATURES_COL: &str = "features";

/// How a metric's current value is compared with its previous value when
/// extracting state intervals. Two rows share a state when the comparison
/// holds for every metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StateComparison {
    /// `=` or `==`: the metric stayed constant.
    #[default]
    Eq,
    /// `!=` or `<>`: the metric changed on every row.
    NotEq,
    /// `<`: strictly decreasing.
    Lt,
    /// `<=`: non-increasing.
    LtEq,
    /// `>`: strictly increasing.
    Gt,
    /// `>=`: non-decreasing.
    GtEq,
    /// `<=>`: equal, where two nulls are equal too.
    NullSafeEq,
}

impl StateComparison {
    fn apply(self, current: &dyn Datum, previous: &dyn Datum) -> Result<BooleanArray, ArrowError> {
        match self {
            StateComparison::Eq => cmp::eq(current, previous),
            StateComparison::NotEq => cmp::neq(current, previous),
            StateComparison::Lt => cmp::lt(current, previous),
            StateComparison::LtEq => cmp::lt_eq(current, previous),
            StateComparison::Gt => cmp::gt(current, previous),
            StateComparison::GtEq => cmp::gt_eq(current, previous),
            StateComparison::NullSafeEq => cmp::not_distinct(current, previous),
        }
    }
}

impl FromStr for StateComparison {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "=" | "==" => Ok(StateComparison::Eq),
            "!=" | "<>" => Ok(StateComparison::NotEq),
            "<" => Ok(StateComparison::Lt),
            "<=" => Ok(StateComparison::LtEq),
            ">" => Ok(StateComparison::Gt),
            ">=" => Ok(StateComparison::GtEq),
            "<=>" => Ok(StateComparison::NullSafeEq),
            other => InvalidStateDefinitionSnafu { definition: other }.fail(),
        }
    }
}

impl Table {
    /// Add `EMA_{column}`, an approximate exponential moving average over
    /// the current row and the `window - 1` rows before it in its series.
    ///
    /// The row `i` steps back weighs `exp_factor * (1 - exp_factor)^i`.
    /// Nulls and rows before the start of the series contribute zero.
    pub fn ema(&self, column: &str, window: usize, exp_factor: f64) -> TableResult<Table> {
        let values = float_column(self, column)?;
        let weights: Vec<f64> =
            std::iter::successors(Some(exp_factor), |w| Some(w * (1.0 - exp_factor)))
                .take(window)
                .collect();

        let order = self.series_window(false)?;
        let mut ema = vec![0.0; self.num_rows()];
        for partition in order.partitions() {
            for (k, &pos) in partition.iter().enumerate() {
                ema[pos as usize] = partition[..=k]
                    .iter()
                    .rev()
                    .zip(&weights)
                    .filter(|(p, _)| values.is_valid(**p as usize))
                    .map(|(p, w)| w * values.value(*p as usize))
                    .sum();
            }
        }

        self.with_column(&format!("EMA_{column}"), Arc::new(Float64Array::from(ema)))
    }

    /// Add `feature_col` holding, for every row, the feature vectors of up
    /// to `lookback` preceding rows of its series, oldest first.
    ///
    /// A feature vector is a fixed-size list of the `feature_cols` values
    /// cast to `Float64`. With `exact_size`, rows with fewer than `lookback`
    /// predecessors are dropped.
    pub fn with_lookback_features(
        &self,
        feature_cols: &[&str],
        lookback: usize,
        exact_size: bool,
        feature_col: &str,
    ) -> TableResult<Table> {
        ensure!(
            lookback >= 1,
            InvalidWindowSizeSnafu {
                operation: "with_lookback_features",
                size: lookback,
            }
        );
        let features = feature_vectors(self, feature_cols)?;

        let order = self.series_window(false)?;
        let none: &[u32] = &[];
        let mut history = vec![none; self.num_rows()];
        for partition in order.partitions() {
            for (k, &pos) in partition.iter().enumerate() {
                history[pos as usize] = &partition[k.saturating_sub(lookback)..k];
            }
        }

        let mut offsets = Vec::with_capacity(history.len() + 1);
        let mut end = 0_i32;
        offsets.push(end);
        for rows in &history {
            end = i32::try_from(rows.len())
                .ok()
                .and_then(|len| end.checked_add(len))
                .context(TooManyRowsSnafu {
                    operation: "with_lookback_features",
                    rows: self.num_rows(),
                })?;
            offsets.push(end);
        }
        let indices = UInt32Array::from_iter_values(history.iter().flat_map(|rows| rows.iter().copied()));
        let values = take(&features, &indices, None).context(ArrowSnafu {
            operation: "gather lookback features",
        })?;
        let item = Arc::new(Field::new("item", features.data_type().clone(), true));
        let lists = ListArray::try_new(item, OffsetBuffer::new(ScalarBuffer::from(offsets)), values, None)
            .context(ArrowSnafu {
                operation: "build lookback feature lists",
            })?;

        let table = self.with_column(feature_col, Arc::new(lists))?;
        if !exact_size {
            return Ok(table);
        }
        let mask: BooleanArray = history
            .iter()
            .map(|rows| Some(rows.len() == lookback))
            .collect();
        let batch = frame::filter(table.batch(), &mask)?;
        Ok(table.with_transformed_batch(batch))
    }

    /// Intervals during which `metric_cols` kept their state under
    /// `comparison`.
    ///
    /// See [`extract_state_intervals_by`](Self::extract_state_intervals_by).
    pub fn extract_state_intervals(
        &self,
        metric_cols: &[&str],
        comparison: StateComparison,
    ) -> TableResult<RecordBatch> {
        self.extract_state_intervals_by(metric_cols, |current, previous| {
            comparison.apply(current, previous)
        })
    }

    /// Intervals during which every metric column kept its state.
    ///
    /// `compare(current, previous)` is evaluated per metric against each
    /// row's predecessor in its series; a row stays in the state of its
    /// predecessor when no metric compares `false`. A null comparison
    /// neither continues nor breaks a state. The first row of every series
    /// only opens intervals.
    ///
    /// Returns the series ids, [`START_TS_COL`] (the time of the row before
    /// the interval's first matching row) and [`END_TS_COL`] (the time of
    /// its last matching row), one row per interval.
    pub fn extract_state_intervals_by<F>(
        &self,
        metric_cols: &[&str],
        compare: F,
    ) -> TableResult<RecordBatch>
    where
        F: Fn(&ArrayRef, &ArrayRef) -> Result<BooleanArray, ArrowError>,
    {
        for name in [START_TS_COL, END_TS_COL] {
            ensure!(
                !self.series_ids().iter().any(|id| id == name),
                ColumnCollisionSnafu { column: name }
            );
        }

        let n = self.num_rows();
        let order = self.series_window(false)?;
        let mut previous: Vec<Option<u32>> = vec![None; n];
        for partition in order.partitions() {
            for pair in partition.windows(2) {
                previous[pair[1] as usize] = Some(pair[0]);
            }
        }

        let times = self.time_index().primary_values(self.batch())?;
        let previous_times = frame::take_optional(&times, &previous)?;

        let mut states = Vec::with_capacity(metric_cols.len());
        for name in metric_cols {
            let current = frame::column(self.batch(), name)?;
            let before = frame::take_optional(current, &previous)?;
            let same = compare(current, &before).context(ArrowSnafu {
                operation: format!("compare states of {name}"),
            })?;
            ensure!(
                same.len() == n,
                UnsupportedCombinationSnafu {
                    details: format!(
                        "state comparison of {name} returned {} values for {n} rows",
                        same.len()
                    ),
                }
            );
            states.push(same);
        }
        // Some(true) when any metric left its state, None when none did but
        // some comparison was null.
        let state_change = |row: usize| -> Option<bool> {
            let mut unknown = false;
            for same in &states {
                if same.is_null(row) {
                    unknown = true;
                } else if !same.value(row) {
                    return Some(true);
                }
            }
            (!unknown).then_some(false)
        };

        let mut keys: Vec<(ArrayRef, SortOptions)> = self
            .series_arrays()?
            .into_iter()
            .map(|values| (values, SortOptions::default()))
            .collect();
        keys.extend(self.time_index().sort_columns(self.batch(), false)?);
        let peers = encode_rows(&keys)?;
        let same_instant =
            |a: u32, b: u32| peers.as_ref().is_none_or(|rows| rows.row(a as usize) == rows.row(b as usize));

        let mut starts = Vec::new();
        let mut ends = Vec::new();
        for partition in order.partitions() {
            let kept: Vec<u32> = partition
                .iter()
                .copied()
                .filter(|&pos| previous_times.is_valid(pos as usize))
                .collect();

            // Running count of state changes; rows at the same instant share it.
            let mut changes: Option<i64> = None;
            let mut open: Option<(Option<i64>, u32, u32)> = None;
            let mut i = 0;
            while i < kept.len() {
                let mut j = i + 1;
                while j < kept.len() && same_instant(kept[i], kept[j]) {
                    j += 1;
                }
                for &pos in &kept[i..j] {
                    if let Some(changed) = state_change(pos as usize) {
                        changes = Some(changes.unwrap_or(0) + i64::from(changed));
                    }
                }
                for &pos in &kept[i..j] {
                    if state_change(pos as usize) != Some(false) {
                        continue;
                    }
                    if let Some((key, _, last)) = &mut open {
                        if *key == changes {
                            *last = pos;
                            continue;
                        }
                    }
                    if let Some((_, first, last)) = open.replace((changes, pos, pos)) {
                        starts.push(first);
                        ends.push(last);
                    }
                }
                i = j;
            }
            if let Some((_, first, last)) = open {
                starts.push(first);
                ends.push(last);
            }
        }

        debug!(
            "extracted {} state intervals over {} metrics from {n} rows",
            starts.len(),
            metric_cols.len()
        );

        let starts = UInt32Array::from(starts);
        let ends = UInt32Array::from(ends);
        let gather = |values: &ArrayRef, indices: &UInt32Array, what: &str| {
            take(values.as_ref(), indices, None).context(ArrowSnafu {
                operation: format!("gather {what}"),
            })
        };

        let mut fields = Vec::with_capacity(self.series_ids().len() + 2);
        let mut columns = Vec::with_capacity(self.series_ids().len() + 2);
        let arrow_schema = self.batch().schema_ref();
        for id in self.series_ids() {
            let values = frame::column(self.batch(), id)?;
            let field = arrow_schema
                .field_with_name(id)
                .cloned()
                .unwrap_or_else(|_| Field::new(id, values.data_type().clone(), true));
            fields.push(field);
            columns.push(gather(values, &starts, id)?);
        }
        fields.push(Field::new(START_TS_COL, times.data_type().clone(), true));
        columns.push(gather(&previous_times, &starts, START_TS_COL)?);
        fields.push(Field::new(END_TS_COL, times.data_type().clone(), true));
        columns.push(gather(&times, &ends, END_TS_COL)?);

        RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).context(ArrowSnafu {
            operation: "assemble state intervals",
        })
    }

    /// Rows grouped by series and ordered by the time index.
    pub(crate) fn series_window(&self, reverse: bool) -> TableResult<WindowOrder> {
        WindowOrder::try_new(
            self.num_rows(),
            &self.series_arrays()?,
            &self.time_index().sort_columns(self.batch(), reverse)?,
        )
    }
}

/// A numeric column of `table` as `Float64`.
fn float_column(table: &Table, name: &str) -> TableResult<Float64Array> {
    let values = frame::column(table.batch(), name)?;
    let not_numeric = NonNumericColumnSnafu {
        column: name,
        datatype: values.data_type().clone(),
    };
    ensure!(values.data_type().is_numeric(), not_numeric.clone());
    temporal::cast_to(values, &DataType::Float64)?
        .as_primitive_opt::<Float64Type>()
        .cloned()
        .context(not_numeric)
}

/// One fixed-size `Float64` list per row holding the `columns` values.
fn feature_vectors(table: &Table, columns: &[&str]) -> TableResult<FixedSizeListArray> {
    ensure!(
        !columns.is_empty(),
        UnsupportedCombinationSnafu {
            details: "lookback features need at least one feature column",
        }
    );
    let features = columns
        .iter()
        .map(|name| float_column(table, name))
        .collect::<TableResult<Vec<_>>>()?;
    let width = i32::try_from(features.len())
        .ok()
        .context(UnsupportedCombinationSnafu {
            details: "too many feature columns",
        })?;

    let interleaved: Float64Array = (0..table.num_rows())
        .flat_map(|row| {
            features
                .iter()
                .map(move |values| values.is_valid(row).then(|| values.value(row)))
        })
        .collect();
    let item = Arc::new(Field::new("item", DataType::Float64, true));
    FixedSizeListArray::try_new(item, width, Arc::new(interleaved), None).context(ArrowSnafu {
        operation: "build feature vectors",
    })
}
