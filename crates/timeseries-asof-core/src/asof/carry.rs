//! Last-value carry-forward over a stacked table, and result assembly.
//!
//! Rows are ordered per series by the unified time index, with right rows
//! ahead of left rows on equal keys and input position as the final tie
//! break. Walking each series in that order, every left row picks up the
//! most recent right row seen so far: per column the last one with a
//! non-null value when skipping nulls, or simply the last right row
//! otherwise. Rows with a null unified time never act as a source.

use arrow::array::{Array, ArrayRef};

use crate::error::TableResult;
use crate::frame::{self, ordering::WindowOrder};
use crate::table::Table;

use super::Origin;
use super::combine::origins;

/// For each carried column, the source row of every target row.
#[derive(Debug)]
pub(crate) struct CarryForward {
    /// `sources[c][row]` is the stacked-table row whose value column `c`
    /// carries into target `row`.
    pub(crate) sources: Vec<Vec<Option<u32>>>,
    /// Per column, the fewest non-null source values any target row could
    /// see. `None` when there are no target rows.
    pub(crate) min_visible: Vec<Option<usize>>,
}

/// Carry `columns` of right rows forward onto left rows.
///
/// Targets are the left rows at positions `0..targets`; left rows past that
/// (copies made by time partitioning) still take part in the ordering but
/// receive nothing.
pub(crate) fn carry_forward(
    stacked: &Table,
    columns: &[String],
    skip_nulls: bool,
    targets: usize,
) -> TableResult<CarryForward> {
    let batch = stacked.batch();
    let origin = origins(stacked)?;
    let times = stacked.time_index().primary_values(batch)?;
    let values: Vec<&ArrayRef> = columns
        .iter()
        .map(|name| frame::column(batch, name))
        .collect::<TableResult<_>>()?;

    let order = WindowOrder::try_new_with_tie_break(
        batch.num_rows(),
        &stacked.series_arrays()?,
        &stacked.time_index().sort_columns(batch, false)?,
        |a, b| origin[a].cmp(&origin[b]),
    )?;

    let mut sources = vec![vec![None; targets]; columns.len()];
    let mut min_visible: Vec<Option<usize>> = vec![None; columns.len()];

    for partition in order.partitions() {
        let mut last: Vec<Option<u32>> = vec![None; columns.len()];
        let mut last_row: Option<u32> = None;
        let mut seen = vec![0_usize; columns.len()];

        for &pos in partition {
            let row = pos as usize;
            if times.is_null(row) {
                continue;
            }
            match origin[row] {
                Origin::Right => {
                    last_row = Some(pos);
                    for (c, column) in values.iter().enumerate() {
                        if column.is_valid(row) {
                            last[c] = Some(pos);
                            seen[c] += 1;
                        }
                    }
                }
                Origin::Left if row < targets => {
                    for c in 0..columns.len() {
                        sources[c][row] = if skip_nulls { last[c] } else { last_row };
                        min_visible[c] = Some(min_visible[c].map_or(seen[c], |m| m.min(seen[c])));
                    }
                }
                Origin::Left => {}
            }
        }
    }

    Ok(CarryForward {
        sources,
        min_visible,
    })
}

/// The join result: `left` in standard column order followed by each of
/// `columns` gathered from `source` at the matching `indices`.
pub(crate) fn assemble(
    left: &Table,
    source: &Table,
    columns: &[String],
    indices: &[Vec<Option<u32>>],
) -> TableResult<Table> {
    let mut batch = left.with_standardized_col_order()?.into_batch();
    for (name, rows) in columns.iter().zip(indices) {
        let gathered = frame::take_optional(frame::column(source.batch(), name)?, rows)?;
        batch = frame::with_column(&batch, name, gathered)?;
    }
    Table::with_schema(batch, left.schema().clone())
}
