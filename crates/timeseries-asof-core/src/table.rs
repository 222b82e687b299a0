//! Time-series table: an Arrow batch plus the schema that gives its rows a
//! temporal identity.
//!
//! A [`Table`] is an immutable value. Every operation returns a new table;
//! the batch of the receiver is never modified. Transformations that keep the
//! column structure share the receiver's [`SeriesSchema`] through an `Arc`
//! and skip re-validation.
//!
//! Structural columns (series ids and time index columns) are protected:
//! projections must keep them, [`Table::with_column`] refuses to overwrite
//! them, and [`Table::with_column_renamed`] is the only way to rename one.
//! Time slicing lives in [`slice`]; per-series window features (moving
//! averages, lookback features, state intervals) live in [`window`].

pub mod slice;
pub mod window;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, RecordBatch, StructArray};
use arrow::datatypes::{DataType, Field, Fields, SchemaRef};
use snafu::prelude::*;

use crate::error::{
    ArrowSnafu, ColumnCollisionSnafu, ColumnNotFoundSnafu, IncompatibleTablesSnafu,
    StructureChangeSnafu, TableResult,
};
use crate::frame;
use crate::schema::SeriesSchema;
use crate::time_index::{IndexLayout, TimeIndex};

pub use slice::TimeBound;
pub use window::StateComparison;

/// Name of the struct column built by [`Table::from_subsequence_col`].
pub const DEFAULT_TS_IDX_COL: &str = "ts_idx";

/// An immutable, series-partitioned, time-indexed table.
#[derive(Debug, Clone)]
pub struct Table {
    batch: RecordBatch,
    schema: Arc<SeriesSchema>,
}

impl Table {
    /// Build a table over `batch` with a flat time index on `ts_col`.
    ///
    /// An empty `series_ids` treats the whole batch as one series.
    pub fn try_new(batch: RecordBatch, ts_col: &str, series_ids: &[&str]) -> TableResult<Self> {
        let schema = SeriesSchema::from_dataset(batch.schema_ref(), ts_col, series_ids)?;
        Ok(Table {
            batch,
            schema: Arc::new(schema),
        })
    }

    /// Build a table over `batch` with an explicit schema, validating it.
    pub fn with_schema(batch: RecordBatch, schema: SeriesSchema) -> TableResult<Self> {
        schema.validate(batch.schema_ref())?;
        Ok(Table {
            batch,
            schema: Arc::new(schema),
        })
    }

    /// Build a table from parts already known to agree.
    pub(crate) fn from_parts_unchecked(batch: RecordBatch, schema: Arc<SeriesSchema>) -> Self {
        Table { batch, schema }
    }

    /// Build a table whose rows are ordered by `(ts_col, subsequence_col)`.
    ///
    /// Both columns are moved into a struct column named
    /// [`DEFAULT_TS_IDX_COL`] (appended last) and the table gets a composite
    /// time index over it.
    pub fn from_subsequence_col(
        batch: RecordBatch,
        ts_col: &str,
        subsequence_col: &str,
        series_ids: &[&str],
    ) -> TableResult<Self> {
        let schema = batch.schema_ref();
        let mut children: Vec<(Arc<Field>, ArrayRef)> = Vec::with_capacity(2);
        for name in [ts_col, subsequence_col] {
            let idx = schema.index_of(name).map_err(|_| {
                ColumnNotFoundSnafu {
                    column: name,
                    available: frame::column_names(&batch),
                }
                .build()
            })?;
            children.push((Arc::new(schema.field(idx).clone()), Arc::clone(batch.column(idx))));
        }
        let (fields, arrays): (Vec<_>, Vec<_>) = children.into_iter().unzip();
        let ts_idx = StructArray::try_new(Fields::from(fields), arrays, None).context(
            ArrowSnafu {
                operation: "build composite time index",
            },
        )?;

        let rest = frame::drop_columns(&batch, &[ts_col, subsequence_col])?;
        let batch = frame::with_column(&rest, DEFAULT_TS_IDX_COL, Arc::new(ts_idx))?;

        let index = TimeIndex::composite(
            DEFAULT_TS_IDX_COL,
            ts_col,
            Some(subsequence_col.to_string()),
        );
        let schema = SeriesSchema::new(index, series_ids.iter().map(|s| s.to_string()).collect())?;
        Table::with_schema(batch, schema)
    }

    /// New table over `batch` sharing this table's schema.
    pub(crate) fn with_transformed_batch(&self, batch: RecordBatch) -> Self {
        Table::from_parts_unchecked(batch, Arc::clone(&self.schema))
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The underlying Arrow batch.
    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Consume the table, returning the underlying batch.
    pub fn into_batch(self) -> RecordBatch {
        self.batch
    }

    /// The series schema.
    pub fn schema(&self) -> &SeriesSchema {
        &self.schema
    }

    /// Arrow schema of the underlying batch.
    pub fn arrow_schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Column names, in batch order.
    pub fn columns(&self) -> Vec<String> {
        frame::column_names(&self.batch)
    }

    /// The time index.
    pub fn time_index(&self) -> &TimeIndex {
        self.schema.time_index()
    }

    /// Name of the column identifying the time index.
    pub fn ts_col(&self) -> &str {
        self.schema.time_index().name()
    }

    /// Series identifier columns.
    pub fn series_ids(&self) -> &[String] {
        self.schema.series_ids()
    }

    /// Series ids followed by the time columns.
    pub fn structural_cols(&self) -> Vec<String> {
        self.schema.structural_columns()
    }

    /// Every non-structural column.
    pub fn observational_cols(&self) -> Vec<String> {
        self.schema.find_observational_columns(self.batch.schema_ref())
    }

    /// Numeric non-structural columns.
    pub fn metric_cols(&self) -> Vec<String> {
        self.schema.find_metric_columns(self.batch.schema_ref())
    }

    // ------------------------------------------------------------------
    // Transformations
    // ------------------------------------------------------------------

    /// Project onto `cols`, which must include every structural column.
    pub fn select(&self, cols: &[&str]) -> TableResult<Table> {
        if let Some(missing) = self
            .structural_cols()
            .into_iter()
            .find(|c| !cols.contains(&c.as_str()))
        {
            return StructureChangeSnafu {
                operation: "select",
                details: format!("structural column {missing} is not selected"),
            }
            .fail();
        }
        let batch = frame::select(&self.batch, cols)?;
        Ok(self.with_transformed_batch(batch))
    }

    /// Add `values` as column `name`, replacing an existing observational
    /// column of that name.
    pub fn with_column(&self, name: &str, values: ArrayRef) -> TableResult<Table> {
        ensure!(
            !self.schema.is_structural(name),
            StructureChangeSnafu {
                operation: "with_column",
                details: format!("{name} is a structural column"),
            }
        );
        let batch = frame::with_column(&self.batch, name, values)?;
        Ok(self.with_transformed_batch(batch))
    }

    /// Rename column `existing` to `new`.
    ///
    /// Renaming a time index column or a series id updates the schema to
    /// match, so slicing and joins keep working under the new name.
    pub fn with_column_renamed(&self, existing: &str, new: &str) -> TableResult<Table> {
        self.with_columns_renamed(&HashMap::from([(existing.to_string(), new.to_string())]))
    }

    /// Rename several columns at once (old name to new name).
    ///
    /// Every old name must exist, and no two columns may end up sharing a
    /// name.
    pub fn with_columns_renamed(&self, mapping: &HashMap<String, String>) -> TableResult<Table> {
        for old in mapping.keys() {
            frame::column(&self.batch, old)?;
        }
        let mut seen = HashSet::new();
        for name in self.columns() {
            let name = mapping.get(&name).cloned().unwrap_or(name);
            ensure!(seen.insert(name.clone()), ColumnCollisionSnafu { column: name });
        }

        let index = self.time_index().renamed_columns(mapping);
        let series_ids: Vec<String> = self
            .series_ids()
            .iter()
            .map(|id| mapping.get(id).unwrap_or(id).clone())
            .collect();

        let batch = frame::rename(&self.batch, mapping)?;
        Table::with_schema(batch, SeriesSchema::new(index, series_ids)?)
    }

    /// Append `other`'s rows, matching columns by position.
    ///
    /// Column types must agree position by position; this table's column
    /// names are kept.
    pub fn union(&self, other: &Table) -> TableResult<Table> {
        self.ensure_same_structure(other, "union")?;
        let batch = frame::union_positional(&self.batch, &other.batch)?;
        Ok(self.with_transformed_batch(batch))
    }

    /// Append `other`'s rows, matching columns by name.
    ///
    /// The time index columns are matched to this table's even when `other`
    /// calls them something else.
    ///
    /// With `allow_missing_columns`, a column present on only one side is
    /// filled with nulls for the other side's rows; otherwise a differing
    /// column set is a [`ColumnMismatch`](crate::TableError::ColumnMismatch).
    pub fn union_by_name(&self, other: &Table, allow_missing_columns: bool) -> TableResult<Table> {
        self.ensure_same_structure(other, "union_by_name")?;
        let other = self.with_aligned_time_columns(other)?;
        let batch = frame::union_by_name(&self.batch, &other.batch, allow_missing_columns)?;
        Ok(self.with_transformed_batch(batch))
    }

    /// Reorder columns as series ids, time columns, then observational columns.
    pub fn with_standardized_col_order(&self) -> TableResult<Table> {
        let ordered: Vec<String> = self
            .structural_cols()
            .into_iter()
            .chain(self.observational_cols())
            .collect();
        let batch = frame::select(&self.batch, &ordered)?;
        Ok(self.with_transformed_batch(batch))
    }

    /// Series ids must match by name, order and type, and the time indices
    /// must share a comparable type. Time column names may differ.
    pub(crate) fn ensure_compatible(&self, other: &Table, operation: &str) -> TableResult<()> {
        ensure!(
            self.series_ids() == other.series_ids(),
            IncompatibleTablesSnafu {
                operation,
                details: format!(
                    "series ids {:?} and {:?} differ",
                    self.series_ids(),
                    other.series_ids()
                ),
            }
        );

        let mine = self.batch.schema_ref();
        let theirs = other.batch.schema_ref();
        for id in self.series_ids() {
            let l = mine.field_with_name(id).map(|f| f.data_type());
            let r = theirs.field_with_name(id).map(|f| f.data_type());
            ensure!(
                matches!((&l, &r), (Ok(l), Ok(r)) if l == r),
                IncompatibleTablesSnafu {
                    operation,
                    details: format!("series id {id} has type {l:?} on one side and {r:?} on the other"),
                }
            );
        }

        let my_type = self.time_index().comparable_type(mine)?;
        let their_type = other.time_index().comparable_type(theirs)?;
        ensure!(
            my_type == their_type,
            IncompatibleTablesSnafu {
                operation,
                details: format!(
                    "time index {} is {my_type} but {} is {their_type}",
                    self.time_index(),
                    other.time_index()
                ),
            }
        );
        Ok(())
    }

    /// [`ensure_compatible`](Self::ensure_compatible), plus the time index
    /// columns must line up one to one with equal types.
    fn ensure_same_structure(&self, other: &Table, operation: &str) -> TableResult<()> {
        self.ensure_compatible(other, operation)?;

        let (mine, theirs) = (self.time_index(), other.time_index());
        let same_layout = matches!(
            (mine.layout(), theirs.layout()),
            (IndexLayout::Flat, IndexLayout::Flat)
                | (IndexLayout::Composite { .. }, IndexLayout::Composite { .. })
        );
        let my_types = index_column_types(self)?;
        ensure!(
            same_layout && my_types == index_column_types(other)?,
            IncompatibleTablesSnafu {
                operation,
                details: format!("time indices {mine} and {theirs} are stored differently"),
            }
        );
        Ok(())
    }

    /// `other` with its time index columns renamed to this table's names.
    fn with_aligned_time_columns(&self, other: &Table) -> TableResult<Table> {
        let mapping: HashMap<String, String> = other
            .time_index()
            .columns()
            .into_iter()
            .zip(self.time_index().columns())
            .filter(|(theirs, mine)| theirs != mine)
            .collect();
        if mapping.is_empty() {
            return Ok(other.clone());
        }
        other.with_columns_renamed(&mapping)
    }

    /// Arrays of the series id columns, in declaration order.
    pub(crate) fn series_arrays(&self) -> TableResult<Vec<ArrayRef>> {
        self.series_ids()
            .iter()
            .map(|id| frame::column(&self.batch, id).cloned())
            .collect()
    }

    /// Whether any of `columns` holds a null.
    pub(crate) fn any_nulls(&self, columns: &[String]) -> TableResult<bool> {
        for name in columns {
            if frame::column(&self.batch, name)?.null_count() > 0 {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Arrow types of the time index columns, in index order.
fn index_column_types(table: &Table) -> TableResult<Vec<DataType>> {
    table
        .time_index()
        .columns()
        .iter()
        .map(|name| Ok(frame::column(table.batch(), name)?.data_type().clone()))
        .collect()
}
