//! Partitioned, ordered views over a batch for window-style computations.
//!
//! A [`WindowOrder`] is the Arrow-side equivalent of
//! `PARTITION BY p1, p2 ORDER BY k1, k2`: it sorts row positions by the
//! partition columns, then the ordering columns, then an optional caller
//! supplied tie-break, and finally by original row position. The sort is
//! stable, so equal keys always come out in input order and the result is
//! deterministic no matter how the batch was produced.
//!
//! Keys are compared through [`arrow::row`] so any orderable Arrow type
//! (timestamps, integers, strings, ...) works without per-type code.

use std::cmp::Ordering;
use std::ops::Range;

use arrow::array::ArrayRef;
use arrow::compute::SortOptions;
use arrow::row::{RowConverter, Rows, SortField};
use snafu::prelude::*;

use crate::error::{ArrowSnafu, TableResult, TooManyRowsSnafu};

/// Row positions of a batch, grouped into partitions and ordered inside them.
#[derive(Debug, Clone)]
pub(crate) struct WindowOrder {
    positions: Vec<u32>,
    partitions: Vec<Range<usize>>,
}

impl WindowOrder {
    /// Order `num_rows` rows by `partition_by` then `order_by`.
    pub(crate) fn try_new(
        num_rows: usize,
        partition_by: &[ArrayRef],
        order_by: &[(ArrayRef, SortOptions)],
    ) -> TableResult<Self> {
        Self::try_new_with_tie_break(num_rows, partition_by, order_by, |_, _| Ordering::Equal)
    }

    /// Like [`try_new`](Self::try_new), consulting `tie_break` for rows whose
    /// partition and ordering keys are all equal.
    pub(crate) fn try_new_with_tie_break<F>(
        num_rows: usize,
        partition_by: &[ArrayRef],
        order_by: &[(ArrayRef, SortOptions)],
        tie_break: F,
    ) -> TableResult<Self>
    where
        F: Fn(usize, usize) -> Ordering,
    {
        let row_count = u32::try_from(num_rows).ok().context(TooManyRowsSnafu {
            operation: "window ordering",
            rows: num_rows,
        })?;
        let mut positions: Vec<u32> = (0..row_count).collect();

        let mut key_columns: Vec<(ArrayRef, SortOptions)> = partition_by
            .iter()
            .map(|values| (values.clone(), SortOptions::default()))
            .collect();
        key_columns.extend(order_by.iter().cloned());

        match encode_rows(&key_columns)? {
            Some(rows) => positions.sort_by(|&a, &b| {
                rows.row(a as usize)
                    .cmp(&rows.row(b as usize))
                    .then_with(|| tie_break(a as usize, b as usize))
            }),
            None => positions.sort_by(|&a, &b| tie_break(a as usize, b as usize)),
        }

        let partitions = partition_ranges(&positions, partition_by)?;
        Ok(WindowOrder {
            positions,
            partitions,
        })
    }

    /// Each partition as a slice of row positions, in window order.
    pub(crate) fn partitions(&self) -> impl Iterator<Item = &[u32]> + '_ {
        self.partitions
            .iter()
            .map(move |range| &self.positions[range.clone()])
    }

    /// 1-based row number of every row inside its partition, indexed by the
    /// row's original position.
    pub(crate) fn row_numbers(&self) -> Vec<u32> {
        let mut numbers = vec![0_u32; self.positions.len()];
        for partition in self.partitions() {
            for (number, &pos) in (1_u32..).zip(partition) {
                numbers[pos as usize] = number;
            }
        }
        numbers
    }
}

/// Encode `columns` as comparable rows; `None` when there is nothing to encode.
pub(crate) fn encode_rows(columns: &[(ArrayRef, SortOptions)]) -> TableResult<Option<Rows>> {
    if columns.is_empty() {
        return Ok(None);
    }
    let converter = RowConverter::new(
        columns
            .iter()
            .map(|(values, options)| {
                SortField::new_with_options(values.data_type().clone(), *options)
            })
            .collect(),
    )
    .context(ArrowSnafu {
        operation: "build row converter",
    })?;
    let arrays: Vec<ArrayRef> = columns.iter().map(|(values, _)| values.clone()).collect();
    let rows = converter.convert_columns(&arrays).context(ArrowSnafu {
        operation: "encode sort keys",
    })?;
    Ok(Some(rows))
}

fn partition_ranges(positions: &[u32], partition_by: &[ArrayRef]) -> TableResult<Vec<Range<usize>>> {
    if positions.is_empty() {
        return Ok(Vec::new());
    }
    let keys: Vec<(ArrayRef, SortOptions)> = partition_by
        .iter()
        .map(|values| (values.clone(), SortOptions::default()))
        .collect();
    let Some(rows) = encode_rows(&keys)? else {
        return Ok(vec![0..positions.len()]);
    };

    let mut ranges = Vec::new();
    let mut start = 0;
    for i in 1..positions.len() {
        if rows.row(positions[i] as usize) != rows.row(positions[i - 1] as usize) {
            ranges.push(start..i);
            start = i;
        }
    }
    ranges.push(start..positions.len());
    Ok(ranges)
}
