//! Overlapping time brackets for the skew-partitioned join.
//!
//! Each row is assigned to the bucket `width * floor(t / width)` of its
//! numeric time `t` (seconds since the epoch for temporal columns). Rows in
//! the trailing `overlap_fraction` of their bucket are also copied into the
//! next bucket, marked `is_original = false`, so a row just after a bucket
//! boundary can still look back across it.
//!
//! The output keeps every original row, in input order, ahead of the copies.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, RecordBatch, UInt32Array};
use arrow::compute::{take, take_record_batch};
use arrow::datatypes::Float64Type;
use snafu::prelude::*;

use crate::config::validate_partitioning;
use crate::error::{ArrowSnafu, ColumnCollisionSnafu, TableResult, TooManyRowsSnafu};
use crate::frame;
use crate::table::Table;

/// Column holding the bucket start of each row.
pub const TS_PARTITION_COL: &str = "ts_partition";

/// Column marking rows that were not copied from the previous bucket.
pub const IS_ORIGINAL_COL: &str = "is_original";

/// Buckets a table's rows into overlapping time brackets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimePartitioner {
    width: f64,
    overlap_fraction: f64,
}

impl TimePartitioner {
    /// Partitioner with buckets of `width` overlapping by `overlap_fraction`.
    ///
    /// Fails unless `width` is finite and positive and `overlap_fraction`
    /// lies in `(0, 1)`.
    pub fn try_new(width: f64, overlap_fraction: f64) -> TableResult<Self> {
        validate_partitioning(width, overlap_fraction)?;
        Ok(TimePartitioner {
            width,
            overlap_fraction,
        })
    }

    /// Bucket width.
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Trailing share of each bucket copied into the next one.
    pub fn overlap_fraction(&self) -> f64 {
        self.overlap_fraction
    }

    /// Add [`TS_PARTITION_COL`] and [`IS_ORIGINAL_COL`] to `table`, copying
    /// boundary rows into the next bucket.
    ///
    /// The returned table's series ids are extended with
    /// [`TS_PARTITION_COL`]. Rows with a null time get a null bucket and are
    /// never copied.
    pub fn partition(&self, table: &Table) -> TableResult<Table> {
        for name in [TS_PARTITION_COL, IS_ORIGINAL_COL] {
            ensure!(
                table.batch().column_by_name(name).is_none(),
                ColumnCollisionSnafu { column: name }
            );
        }

        let width = self.width;
        let times = table.time_index().range_values(table.batch())?;
        let buckets = times.unary::<_, Float64Type>(|t| width * (t / width).floor());

        let threshold = 1.0 - self.overlap_fraction;
        let row_count = u32::try_from(times.len()).ok().context(TooManyRowsSnafu {
            operation: "time partitioning",
            rows: times.len(),
        })?;
        let spill = UInt32Array::from_iter_values((0..row_count).filter(|&i| {
            let i = i as usize;
            times.is_valid(i) && (times.value(i) - buckets.value(i)) / width >= threshold
        }));

        let originals = tag(table.batch(), Arc::new(buckets.clone()), true)?;

        let copied = take_record_batch(table.batch(), &spill).context(ArrowSnafu {
            operation: "copy boundary rows",
        })?;
        let next_buckets = buckets.unary::<_, Float64Type>(|start| start + width);
        let next_buckets = take(&next_buckets, &spill, None).context(ArrowSnafu {
            operation: "copy boundary buckets",
        })?;
        let copies = tag(&copied, next_buckets, false)?;

        log::debug!(
            "partitioned {} rows into {}-wide buckets, {} rows copied across boundaries",
            table.num_rows(),
            width,
            copies.num_rows()
        );

        let schema = originals.schema();
        let batch = frame::concat_rows(&schema, &[originals, copies])?;
        let mut series_ids = table.series_ids().to_vec();
        series_ids.push(TS_PARTITION_COL.to_string());
        let schema = table.schema().with_series_ids(series_ids)?;
        Table::with_schema(batch, schema)
    }
}

fn tag(batch: &RecordBatch, buckets: ArrayRef, original: bool) -> TableResult<RecordBatch> {
    let marker: ArrayRef = Arc::new(BooleanArray::from(vec![original; batch.num_rows()]));
    let batch = frame::with_column(batch, TS_PARTITION_COL, buckets)?;
    frame::with_column(&batch, IS_ORIGINAL_COL, marker)
}
