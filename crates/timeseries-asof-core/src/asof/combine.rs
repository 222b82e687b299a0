//! The stacked table both windowed strategies scan.
//!
//! Left rows come first (positions `0..left_rows`), right rows after them.
//! A unified time column is added whose value is the left time for left
//! rows and the right time for right rows, plus a boolean origin marker.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, BooleanArray, StructArray};
use arrow::datatypes::{Field, Fields};
use snafu::prelude::*;

use crate::error::{ArrowSnafu, SchemaMismatchSnafu, TableResult};
use crate::frame;
use crate::schema::SeriesSchema;
use crate::table::Table;
use crate::time_index::TimeIndex;

use super::Origin;

/// Unified time column of the stacked table.
pub(crate) const COMBINED_TS_COL: &str = "combined_ts";
/// Primary child of [`COMBINED_TS_COL`] when it is a struct.
pub(crate) const COMBINED_EVENT_TS: &str = "event_ts";
/// Sub-sequence child of [`COMBINED_TS_COL`] when it is a struct.
pub(crate) const COMBINED_SUB_SEQ: &str = "sub_seq";
/// `true` for rows from the left table.
pub(crate) const ORIGIN_COL: &str = "__origin";

/// Left and right rows stacked into one table keyed by [`COMBINED_TS_COL`].
#[derive(Debug)]
pub(crate) struct Combined {
    pub(crate) table: Table,
    pub(crate) left_rows: usize,
}

/// Stack `left` over `right`. Both must already carry their final column
/// names; columns present on one side only are null for the other side's
/// rows.
pub(crate) fn combine(left: &Table, right: &Table) -> TableResult<Combined> {
    let stacked = frame::union_by_name(left.batch(), right.batch(), true)?;
    let left_index = left.time_index();
    let right_index = right.time_index();

    let primary = frame::coalesce(
        &left_index.primary_values(&stacked)?,
        &right_index.primary_values(&stacked)?,
    )?;
    let secondary = match (
        left_index.secondary_values(&stacked)?,
        right_index.secondary_values(&stacked)?,
    ) {
        (Some(l), Some(r)) => Some(frame::coalesce(&l, &r)?),
        (l, r) => l.or(r),
    };

    let (index, combined_ts): (TimeIndex, ArrayRef) = match secondary {
        Some(secondary) => {
            let fields = Fields::from(vec![
                Field::new(COMBINED_EVENT_TS, primary.data_type().clone(), true),
                Field::new(COMBINED_SUB_SEQ, secondary.data_type().clone(), true),
            ]);
            let packed = StructArray::try_new(fields, vec![primary, secondary], None).context(
                ArrowSnafu {
                    operation: "build combined time index",
                },
            )?;
            (
                TimeIndex::composite(
                    COMBINED_TS_COL,
                    COMBINED_EVENT_TS,
                    Some(COMBINED_SUB_SEQ.to_string()),
                ),
                Arc::new(packed),
            )
        }
        None => (TimeIndex::flat(COMBINED_TS_COL), primary),
    };

    let left_rows = left.num_rows();
    let origin: BooleanArray = (0..stacked.num_rows()).map(|i| Some(i < left_rows)).collect();

    let batch = frame::with_column(&stacked, COMBINED_TS_COL, combined_ts)?;
    let batch = frame::with_column(&batch, ORIGIN_COL, Arc::new(origin))?;
    let schema = SeriesSchema::new(index, left.series_ids().to_vec())?;
    Ok(Combined {
        table: Table::with_schema(batch, schema)?,
        left_rows,
    })
}

/// Decode the [`ORIGIN_COL`] of a stacked (possibly partitioned) table.
pub(crate) fn origins(table: &Table) -> TableResult<Vec<Origin>> {
    let column = frame::column(table.batch(), ORIGIN_COL)?;
    let Some(flags) = column.as_boolean_opt() else {
        return SchemaMismatchSnafu {
            role: "origin marker",
            column: ORIGIN_COL,
            available: table.columns(),
        }
        .fail();
    };
    Ok((0..flags.len())
        .map(|i| {
            if flags.is_valid(i) && flags.value(i) {
                Origin::Left
            } else {
                Origin::Right
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::*;
    use arrow::datatypes::DataType;

    #[test]
    fn stacks_left_first_with_unified_time() -> TestResult {
        let left = Table::try_new(price_batch(&[("A", 5, 1.0), ("A", 1, 2.0)])?, "ts", &["symbol"])?;
        let right = Table::try_new(quote_batch(&[("A", 3, Some("q"))])?, "ts", &["symbol"])?
            .with_column_renamed("ts", "right_ts")?;

        let combined = combine(&left, &right)?;
        let batch = combined.table.batch();

        assert_eq!(combined.left_rows, 2);
        assert_eq!(combined.table.ts_col(), COMBINED_TS_COL);
        assert_eq!(combined.table.series_ids(), ["symbol".to_string()]);
        assert_eq!(i64_values(batch, COMBINED_TS_COL), vec![Some(5), Some(1), Some(3)]);
        assert_eq!(i64_values(batch, "ts"), vec![Some(5), Some(1), None]);
        assert_eq!(
            origins(&combined.table)?,
            vec![Origin::Left, Origin::Left, Origin::Right]
        );
        Ok(())
    }

    #[test]
    fn secondary_fields_make_a_struct_index() -> TestResult {
        let left = Table::from_subsequence_col(
            subsequence_batch(&[("A", 1, 0, 1.0)])?,
            "ts",
            "seq",
            &["symbol"],
        )?;
        let right = Table::try_new(quote_batch(&[("A", 1, None)])?, "ts", &["symbol"])?
            .with_column_renamed("ts", "right_ts")?;

        let combined = combine(&left, &right)?;
        let index = combined.table.time_index();
        assert!(index.has_secondary());
        assert_eq!(index.primary_field(), COMBINED_EVENT_TS);
        assert!(matches!(
            combined.table.arrow_schema().field_with_name(COMBINED_TS_COL)?.data_type(),
            DataType::Struct(_)
        ));
        Ok(())
    }
}
