//! Skew-partitioned execution.
//!
//! The stacked table is cut into overlapping time buckets which become an
//! extra series key, so no single series has to be scanned as one block.
//! A left row only looks back as far as the start of the bucket it was
//! copied into, which bounds the lookback at roughly
//! `width * (1 + overlap_fraction)`; values further back are lost.

use log::{Level, log_enabled, warn};

use crate::error::TableResult;
use crate::partition::TimePartitioner;
use crate::table::Table;

use super::carry::{assemble, carry_forward};
use super::combine::combine;

/// Join `left` and `right` through `partitioner`, always skipping nulls.
///
/// Target rows are the original left rows, which the partitioner keeps at
/// the front in input order; copies made across bucket boundaries only
/// serve as lookback context.
pub(crate) fn join(
    left: &Table,
    right: &Table,
    columns: &[String],
    partitioner: &TimePartitioner,
    report_empty_lookback: bool,
) -> TableResult<Table> {
    warn!(
        "You are using the skew version of the AS OF join. This may result in null values if \
         there are any values outside of the maximum lookback. For maximum efficiency, choose \
         smaller values of maximum lookback, trading off performance and potential blank AS OF \
         values for sparse keys"
    );

    let combined = combine(left, right)?;
    let partitioned = partitioner.partition(&combined.table)?;
    let carried = carry_forward(&partitioned, columns, true, combined.left_rows)?;

    if report_empty_lookback && log_enabled!(Level::Warn) {
        for (column, visible) in columns.iter().zip(&carried.min_visible) {
            if *visible == Some(0) {
                warn!(
                    "Column {column} had no values within the lookback window. Consider using a \
                     larger window to avoid missing values. If this is the first record in the \
                     table, this warning can be ignored."
                );
            }
        }
    }

    assemble(left, &partitioned, columns, &carried.sources)
}
