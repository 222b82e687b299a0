//! Interval join against a small right-hand table.
//!
//! Within a series, consecutive right keys split the time axis into
//! half-open intervals `[key, next key)`; every left row falls into at most
//! one of them and takes that interval's right row. The right keys are
//! sorted once and each left row finds its interval by binary search.
//!
//! Keys are `(series ids, primary time, sub-sequence)` encoded with a single
//! row converter over both sides, so left and right keys compare exactly as
//! the windowed strategies order them. A side without a sub-sequence field
//! contributes nulls for it.

use arrow::array::{Array, ArrayRef, new_null_array};
use arrow::compute::{SortOptions, concat};
use arrow::datatypes::DataType;
use snafu::prelude::*;

use crate::error::{ArrowSnafu, TableResult, TooManyRowsSnafu};
use crate::frame::{ordering::encode_rows, temporal};
use crate::table::Table;

use super::carry::assemble;

const ASCENDING: SortOptions = SortOptions {
    descending: false,
    nulls_first: true,
};

/// Join `left` against `right`, carrying `columns` from the last right row
/// at or before each left row.
pub(crate) fn join(left: &Table, right: &Table, columns: &[String]) -> TableResult<Table> {
    let n_left = left.num_rows();
    let n_right = right.num_rows();
    ensure!(
        u32::try_from(n_right).is_ok(),
        TooManyRowsSnafu {
            operation: "broadcast as-of join",
            rows: n_right,
        }
    );

    let left_primary = left.time_index().primary_values(left.batch())?;
    let right_primary = temporal::cast_to(
        &right.time_index().primary_values(right.batch())?,
        left_primary.data_type(),
    )?;
    let (left_secondary, right_secondary) = aligned_secondaries(left, right)?;

    let mut series = Vec::with_capacity(left.series_ids().len());
    for (l, r) in left.series_arrays()?.iter().zip(right.series_arrays()?.iter()) {
        series.push((stack(l, r)?, SortOptions::default()));
    }
    let mut keys = series.clone();
    keys.push((stack(&left_primary, &right_primary)?, ASCENDING));
    if let (Some(l), Some(r)) = (&left_secondary, &right_secondary) {
        keys.push((stack(l, r)?, ASCENDING));
    }

    let Some(rows) = encode_rows(&keys)? else {
        return assemble(left, right, columns, &vec![vec![None; n_left]; columns.len()]);
    };
    let series_rows = encode_rows(&series)?;

    let mut candidates: Vec<usize> = (0..n_right)
        .filter(|&j| right_primary.is_valid(j))
        .map(|j| n_left + j)
        .collect();
    candidates.sort_by(|&a, &b| rows.row(a).cmp(&rows.row(b)));

    let sources: Vec<Option<u32>> = (0..n_left)
        .map(|i| {
            if left_primary.is_null(i) {
                return None;
            }
            let key = rows.row(i);
            let end = candidates.partition_point(|&c| rows.row(c) <= key);
            let candidate = *candidates.get(end.checked_sub(1)?)?;
            let same_series = series_rows
                .as_ref()
                .is_none_or(|s| s.row(candidate) == s.row(i));
            if !same_series {
                return None;
            }
            u32::try_from(candidate - n_left).ok()
        })
        .collect();

    log::debug!(
        "broadcast as-of join matched {} of {} left rows against {} right rows",
        sources.iter().filter(|s| s.is_some()).count(),
        n_left,
        n_right
    );

    assemble(left, right, columns, &vec![sources; columns.len()])
}

/// Sub-sequence values of both sides in one type, or `None` when neither
/// side has a sub-sequence field.
fn aligned_secondaries(
    left: &Table,
    right: &Table,
) -> TableResult<(Option<ArrayRef>, Option<ArrayRef>)> {
    let l = left.time_index().secondary_values(left.batch())?;
    let r = right.time_index().secondary_values(right.batch())?;
    let target: DataType = match (&l, &r) {
        (Some(l), _) => l.data_type().clone(),
        (None, Some(r)) => r.data_type().clone(),
        (None, None) => return Ok((None, None)),
    };
    let l = match l {
        Some(l) => l,
        None => new_null_array(&target, left.num_rows()),
    };
    let r = match r {
        Some(r) => temporal::cast_to(&r, &target)?,
        None => new_null_array(&target, right.num_rows()),
    };
    Ok((Some(l), Some(r)))
}

fn stack(top: &ArrayRef, bottom: &ArrayRef) -> TableResult<ArrayRef> {
    concat(&[top.as_ref(), bottom.as_ref()]).context(ArrowSnafu {
        operation: "stack join keys",
    })
}
