//! Relational helpers over Arrow record batches.
//!
//! Tables never touch Arrow kernels directly; they issue the declarative
//! steps defined here (project, rename, filter, union with null padding,
//! coalesce, nullable gather) and the window machinery in [`ordering`].
//! Every helper returns a new batch or array and leaves its inputs alone.
//!
//! The [`SizeEstimator`] trait is the one capability the join planner needs
//! from the substrate: an approximate in-memory byte size for a batch.

pub mod ordering;
pub mod temporal;

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, RecordBatch, UInt32Array, new_null_array};
use arrow::compute::kernels::zip::zip;
use arrow::compute::{cast, concat, filter_record_batch, is_not_null, take};
use arrow::datatypes::{Field, Schema, SchemaRef};
use snafu::prelude::*;

use crate::error::{ArrowSnafu, ColumnMismatchSnafu, TableError, TableResult};

/// Approximate byte size of a batch, used for broadcast decisions.
pub trait SizeEstimator {
    /// Estimated number of bytes `batch` occupies once materialized.
    fn estimated_bytes(&self, batch: &RecordBatch) -> u64;
}

/// Estimates size from the Arrow buffers backing the batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrowMemorySize;

impl SizeEstimator for ArrowMemorySize {
    fn estimated_bytes(&self, batch: &RecordBatch) -> u64 {
        batch.get_array_memory_size() as u64
    }
}

impl<F> SizeEstimator for F
where
    F: Fn(&RecordBatch) -> u64,
{
    fn estimated_bytes(&self, batch: &RecordBatch) -> u64 {
        self(batch)
    }
}

/// Column names of `batch`, in order.
pub(crate) fn column_names(batch: &RecordBatch) -> Vec<String> {
    schema_names(batch.schema_ref())
}

pub(crate) fn schema_names(schema: &Schema) -> Vec<String> {
    schema.fields().iter().map(|f| f.name().clone()).collect()
}

/// Look up a column by name.
pub(crate) fn column<'a>(batch: &'a RecordBatch, name: &str) -> TableResult<&'a ArrayRef> {
    batch
        .column_by_name(name)
        .ok_or_else(|| TableError::ColumnNotFound {
            column: name.to_string(),
            available: column_names(batch),
        })
}

/// Keep only `names`, in the given order.
pub(crate) fn select<S: AsRef<str>>(batch: &RecordBatch, names: &[S]) -> TableResult<RecordBatch> {
    let schema = batch.schema_ref();
    let indices = names
        .iter()
        .map(|name| {
            schema
                .index_of(name.as_ref())
                .map_err(|_| TableError::ColumnNotFound {
                    column: name.as_ref().to_string(),
                    available: column_names(batch),
                })
        })
        .collect::<TableResult<Vec<_>>>()?;
    batch.project(&indices).context(ArrowSnafu {
        operation: "project columns",
    })
}

/// Drop every column named in `names`; unknown names are ignored.
pub(crate) fn drop_columns(batch: &RecordBatch, names: &[&str]) -> TableResult<RecordBatch> {
    let keep: Vec<String> = column_names(batch)
        .into_iter()
        .filter(|c| !names.contains(&c.as_str()))
        .collect();
    select(batch, &keep)
}

/// Rename columns according to `mapping` (old name to new name).
pub(crate) fn rename(
    batch: &RecordBatch,
    mapping: &HashMap<String, String>,
) -> TableResult<RecordBatch> {
    if mapping.is_empty() {
        return Ok(batch.clone());
    }
    let schema = batch.schema_ref();
    let fields: Vec<Field> = schema
        .fields()
        .iter()
        .map(|f| match mapping.get(f.name()) {
            Some(new_name) => f.as_ref().clone().with_name(new_name),
            None => f.as_ref().clone(),
        })
        .collect();
    let schema = Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()));
    RecordBatch::try_new(schema, batch.columns().to_vec()).context(ArrowSnafu {
        operation: "rename columns",
    })
}

/// Add `values` as column `name`, replacing any existing column of that name
/// in place.
pub(crate) fn with_column(
    batch: &RecordBatch,
    name: &str,
    values: ArrayRef,
) -> TableResult<RecordBatch> {
    let schema = batch.schema_ref();
    let new_field = Field::new(name, values.data_type().clone(), true);

    let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
    let mut columns = batch.columns().to_vec();
    match schema.index_of(name) {
        Ok(idx) => {
            fields[idx] = new_field;
            columns[idx] = values;
        }
        Err(_) => {
            fields.push(new_field);
            columns.push(values);
        }
    }

    let schema = Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()));
    RecordBatch::try_new(schema, columns).context(ArrowSnafu {
        operation: format!("add column {name}"),
    })
}

/// Keep rows where `mask` is true; null mask entries drop the row.
pub(crate) fn filter(batch: &RecordBatch, mask: &BooleanArray) -> TableResult<RecordBatch> {
    filter_record_batch(batch, mask).context(ArrowSnafu {
        operation: "filter rows",
    })
}

/// Gather `values` at `indices`; a `None` index yields a null.
pub(crate) fn take_optional(values: &ArrayRef, indices: &[Option<u32>]) -> TableResult<ArrayRef> {
    let indices = UInt32Array::from(indices.to_vec());
    take(values.as_ref(), &indices, None).context(ArrowSnafu {
        operation: "gather carried values",
    })
}

/// First non-null of `primary` and `fallback`, row by row.
///
/// `fallback` is cast to the type of `primary` when they differ.
pub(crate) fn coalesce(primary: &ArrayRef, fallback: &ArrayRef) -> TableResult<ArrayRef> {
    let fallback = if fallback.data_type() == primary.data_type() {
        Arc::clone(fallback)
    } else {
        cast(fallback.as_ref(), primary.data_type()).context(ArrowSnafu {
            operation: "cast coalesce fallback",
        })?
    };
    let mask = is_not_null(primary.as_ref()).context(ArrowSnafu {
        operation: "coalesce null mask",
    })?;
    zip(&mask, primary, &fallback).context(ArrowSnafu {
        operation: "coalesce",
    })
}

/// Row-wise concatenation matching columns by name.
///
/// The result carries `top`'s columns first, then any column only `bottom`
/// has. A column missing on one side is padded with nulls when
/// `allow_missing` is set and is a [`TableError::ColumnMismatch`] otherwise.
/// Columns present on both sides must share a data type.
pub(crate) fn union_by_name(
    top: &RecordBatch,
    bottom: &RecordBatch,
    allow_missing: bool,
) -> TableResult<RecordBatch> {
    let top_schema = top.schema_ref();
    let bottom_schema = bottom.schema_ref();

    let mut names = schema_names(top_schema);
    for name in schema_names(bottom_schema) {
        if !names.contains(&name) {
            names.push(name);
        }
    }

    let mut fields = Vec::with_capacity(names.len());
    let mut columns = Vec::with_capacity(names.len());
    for name in &names {
        let upper = top_schema.field_with_name(name).ok();
        let lower = bottom_schema.field_with_name(name).ok();

        let field = match (upper, lower) {
            (Some(u), Some(l)) => {
                ensure!(
                    u.data_type() == l.data_type(),
                    ColumnMismatchSnafu {
                        details: format!(
                            "column {name} is {} on one side and {} on the other",
                            u.data_type(),
                            l.data_type()
                        ),
                    }
                );
                u.clone().with_nullable(u.is_nullable() || l.is_nullable())
            }
            (Some(only), None) | (None, Some(only)) => {
                ensure!(
                    allow_missing,
                    ColumnMismatchSnafu {
                        details: format!("column {name} exists on only one side"),
                    }
                );
                only.clone().with_nullable(true)
            }
            (None, None) => continue,
        };

        let upper_values = padded_column(top, name, field.data_type());
        let lower_values = padded_column(bottom, name, field.data_type());
        let combined =
            concat(&[upper_values.as_ref(), lower_values.as_ref()]).context(ArrowSnafu {
                operation: format!("union column {name}"),
            })?;

        fields.push(field);
        columns.push(combined);
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).context(ArrowSnafu {
        operation: "union by name",
    })
}

/// Row-wise concatenation matching columns by position; `top`'s names win.
pub(crate) fn union_positional(top: &RecordBatch, bottom: &RecordBatch) -> TableResult<RecordBatch> {
    let top_schema = top.schema_ref();
    let bottom_schema = bottom.schema_ref();
    ensure!(
        top.num_columns() == bottom.num_columns(),
        ColumnMismatchSnafu {
            details: format!(
                "{} columns on one side and {} on the other",
                top.num_columns(),
                bottom.num_columns()
            ),
        }
    );

    let mut fields = Vec::with_capacity(top.num_columns());
    let mut columns = Vec::with_capacity(top.num_columns());
    for (idx, (upper, lower)) in top_schema
        .fields()
        .iter()
        .zip(bottom_schema.fields().iter())
        .enumerate()
    {
        ensure!(
            upper.data_type() == lower.data_type(),
            ColumnMismatchSnafu {
                details: format!(
                    "column {idx} ({}) is {} on one side and {} on the other",
                    upper.name(),
                    upper.data_type(),
                    lower.data_type()
                ),
            }
        );
        let combined = concat(&[top.column(idx).as_ref(), bottom.column(idx).as_ref()])
            .context(ArrowSnafu {
                operation: format!("union column {}", upper.name()),
            })?;
        fields.push(
            upper
                .as_ref()
                .clone()
                .with_nullable(upper.is_nullable() || lower.is_nullable()),
        );
        columns.push(combined);
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).context(ArrowSnafu {
        operation: "union",
    })
}

/// Concatenate batches that share `schema`.
pub(crate) fn concat_rows(schema: &SchemaRef, batches: &[RecordBatch]) -> TableResult<RecordBatch> {
    arrow::compute::concat_batches(schema, batches).context(ArrowSnafu {
        operation: "concatenate batches",
    })
}

fn padded_column(
    batch: &RecordBatch,
    name: &str,
    data_type: &arrow::datatypes::DataType,
) -> ArrayRef {
    match batch.column_by_name(name) {
        Some(values) => Arc::clone(values),
        None => new_null_array(data_type, batch.num_rows()),
    }
}
