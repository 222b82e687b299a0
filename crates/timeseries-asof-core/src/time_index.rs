//! Logical time axis of a table.
//!
//! A [`TimeIndex`] names the primary timestamp field, an optional
//! sub-sequence field used to break ties between equal timestamps, and how
//! both are laid out in the Arrow batch:
//!
//! - [`IndexLayout::Flat`]: the fields are top-level columns.
//! - [`IndexLayout::Composite`]: the fields are children of one struct column,
//!   which is what [`Table::from_subsequence_col`](crate::table::Table::from_subsequence_col)
//!   builds.
//!
//! The index itself only carries names. Types are resolved against the batch
//! schema when needed, so renaming is a cheap, pure operation and two indices
//! are compared for join compatibility by their resolved storage type rather
//! than by their names.

use std::collections::HashMap;
use std::fmt;

use arrow::array::{ArrayRef, AsArray, Float64Array, RecordBatch};
use arrow::compute::SortOptions;
use arrow::datatypes::{DataType, Schema};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::error::{
    ColumnNotFoundSnafu, SchemaMismatchSnafu, TableError, TableResult,
    UnsupportedRangeOrderingSnafu,
};
use crate::frame::temporal;

/// How the time index fields are stored in the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexLayout {
    /// Each index field is its own top-level column.
    Flat,
    /// All index fields live inside the named struct column.
    Composite {
        /// Name of the struct column holding the index fields.
        column: String,
    },
}

/// Which field of the index a sort key refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexField {
    /// The primary timestamp field.
    Primary,
    /// The tie-breaking sub-sequence field.
    Secondary,
}

/// One ordering key produced by a [`TimeIndex`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Which index field to order by.
    pub field: IndexField,
    /// Field name (child name for composite indices).
    pub name: String,
    /// `true` for descending order.
    pub descending: bool,
}

impl SortKey {
    /// Arrow sort options matching this key.
    ///
    /// Nulls sort first when ascending and last when descending.
    pub fn options(&self) -> SortOptions {
        SortOptions {
            descending: self.descending,
            nulls_first: !self.descending,
        }
    }
}

/// The logical time axis of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeIndex {
    primary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    secondary: Option<String>,
    layout: IndexLayout,
}

impl TimeIndex {
    /// Index over a single top-level timestamp column.
    pub fn flat(primary: impl Into<String>) -> Self {
        TimeIndex {
            primary: primary.into(),
            secondary: None,
            layout: IndexLayout::Flat,
        }
    }

    /// Index whose fields are children of the struct column `column`.
    pub fn composite(
        column: impl Into<String>,
        primary: impl Into<String>,
        secondary: Option<String>,
    ) -> Self {
        TimeIndex {
            primary: primary.into(),
            secondary,
            layout: IndexLayout::Composite {
                column: column.into(),
            },
        }
    }

    /// Returns a copy of this index with a tie-breaking sub-sequence field.
    pub fn with_secondary(mut self, secondary: impl Into<String>) -> Self {
        self.secondary = Some(secondary.into());
        self
    }

    /// The column that identifies this index in the batch: the struct column
    /// for composite indices, the primary column otherwise.
    pub fn name(&self) -> &str {
        match &self.layout {
            IndexLayout::Flat => &self.primary,
            IndexLayout::Composite { column } => column,
        }
    }

    /// Name of the primary timestamp field.
    pub fn primary_field(&self) -> &str {
        &self.primary
    }

    /// Name of the sub-sequence field, if any.
    pub fn secondary_field(&self) -> Option<&str> {
        self.secondary.as_deref()
    }

    /// Storage layout of the index fields.
    pub fn layout(&self) -> &IndexLayout {
        &self.layout
    }

    /// Whether the index carries a tie-breaking sub-sequence field.
    pub fn has_secondary(&self) -> bool {
        self.secondary.is_some()
    }

    /// Top-level batch columns occupied by the index.
    pub fn columns(&self) -> Vec<String> {
        match &self.layout {
            IndexLayout::Composite { column } => vec![column.clone()],
            IndexLayout::Flat => std::iter::once(self.primary.clone())
                .chain(self.secondary.clone())
                .collect(),
        }
    }

    /// Ordering keys for sorting or windowing by this index.
    ///
    /// The secondary field, when present, follows the primary one with the
    /// same direction. `reverse` flips every direction at once.
    pub fn order_by_expr(&self, reverse: bool) -> Vec<SortKey> {
        let mut keys = vec![SortKey {
            field: IndexField::Primary,
            name: self.primary.clone(),
            descending: reverse,
        }];
        if let Some(secondary) = &self.secondary {
            keys.push(SortKey {
                field: IndexField::Secondary,
                name: secondary.clone(),
                descending: reverse,
            });
        }
        keys
    }

    /// A single numeric ordering key, as range-based windows need.
    ///
    /// The key is the primary field in numeric form (seconds since the epoch
    /// for temporal types). Fails when the primary field has no numeric form
    /// or when the sub-sequence field is not an integer.
    pub fn range_order_by_expr(&self, schema: &Schema, reverse: bool) -> TableResult<SortKey> {
        let primary_type = self.field_type(schema, IndexField::Primary)?;
        ensure!(
            temporal::has_numeric_form(&primary_type),
            UnsupportedRangeOrderingSnafu {
                column: self.primary.clone(),
                datatype: primary_type,
            }
        );

        if let Some(secondary) = &self.secondary {
            let secondary_type = self.field_type(schema, IndexField::Secondary)?;
            ensure!(
                secondary_type.is_integer(),
                UnsupportedRangeOrderingSnafu {
                    column: secondary.clone(),
                    datatype: secondary_type,
                }
            );
        }

        Ok(SortKey {
            field: IndexField::Primary,
            name: self.primary.clone(),
            descending: reverse,
        })
    }

    /// Returns a new index whose identifying column is called `new_name`.
    ///
    /// Flat indices rename the primary column; composite indices rename the
    /// struct column and keep their child field names.
    pub fn renamed(&self, new_name: impl Into<String>) -> TimeIndex {
        let new_name = new_name.into();
        match &self.layout {
            IndexLayout::Flat => TimeIndex {
                primary: new_name,
                ..self.clone()
            },
            IndexLayout::Composite { .. } => TimeIndex {
                layout: IndexLayout::Composite { column: new_name },
                ..self.clone()
            },
        }
    }

    /// Returns the index that results from renaming top-level columns
    /// according to `mapping` (old name to new name), all at once.
    pub(crate) fn renamed_columns(&self, mapping: &HashMap<String, String>) -> TimeIndex {
        let rename = |name: &String| mapping.get(name).unwrap_or(name).clone();
        match &self.layout {
            IndexLayout::Flat => TimeIndex {
                primary: rename(&self.primary),
                secondary: self.secondary.as_ref().map(rename),
                layout: IndexLayout::Flat,
            },
            IndexLayout::Composite { column } => TimeIndex {
                layout: IndexLayout::Composite {
                    column: rename(column),
                },
                ..self.clone()
            },
        }
    }

    /// Check that every index column exists in `schema` (and, for composite
    /// indices, that the struct carries the declared children).
    pub fn validate(&self, schema: &Schema) -> TableResult<()> {
        self.field_type(schema, IndexField::Primary)?;
        if self.secondary.is_some() {
            self.field_type(schema, IndexField::Secondary)?;
        }
        Ok(())
    }

    /// The storage type of the primary field. Two indices are join
    /// compatible when these types are equal, whatever their names.
    pub fn comparable_type(&self, schema: &Schema) -> TableResult<DataType> {
        self.field_type(schema, IndexField::Primary)
    }

    /// Resolve the Arrow type of one index field.
    pub fn field_type(&self, schema: &Schema, field: IndexField) -> TableResult<DataType> {
        let name = match field {
            IndexField::Primary => &self.primary,
            IndexField::Secondary => match &self.secondary {
                Some(name) => name,
                None => {
                    return ColumnNotFoundSnafu {
                        column: format!("{}.<sub-sequence>", self.name()),
                        available: column_names(schema),
                    }
                    .fail();
                }
            },
        };

        match &self.layout {
            IndexLayout::Flat => {
                let f = schema
                    .field_with_name(name)
                    .map_err(|_| index_column_missing(name, schema))?;
                Ok(f.data_type().clone())
            }
            IndexLayout::Composite { column } => {
                let f = schema
                    .field_with_name(column)
                    .map_err(|_| index_column_missing(column, schema))?;
                let DataType::Struct(children) = f.data_type() else {
                    return SchemaMismatchSnafu {
                        role: "composite time index",
                        column: column.clone(),
                        available: column_names(schema),
                    }
                    .fail();
                };
                children
                    .iter()
                    .find(|child| child.name() == name)
                    .map(|child| child.data_type().clone())
                    .ok_or_else(|| TableError::SchemaMismatch {
                        role: "time index field",
                        column: format!("{column}.{name}"),
                        available: children.iter().map(|c| c.name().clone()).collect(),
                    })
            }
        }
    }

    /// Values of the primary field.
    pub(crate) fn primary_values(&self, batch: &RecordBatch) -> TableResult<ArrayRef> {
        self.field_values(batch, &self.primary)
    }

    /// Values of the sub-sequence field, if the index has one.
    pub(crate) fn secondary_values(&self, batch: &RecordBatch) -> TableResult<Option<ArrayRef>> {
        self.secondary
            .as_deref()
            .map(|name| self.field_values(batch, name))
            .transpose()
    }

    /// Evaluate [`order_by_expr`](Self::order_by_expr) against `batch`.
    pub(crate) fn sort_columns(
        &self,
        batch: &RecordBatch,
        reverse: bool,
    ) -> TableResult<Vec<(ArrayRef, SortOptions)>> {
        self.order_by_expr(reverse)
            .into_iter()
            .map(|key| {
                let values = self.field_values(batch, &key.name)?;
                Ok((values, key.options()))
            })
            .collect()
    }

    /// Evaluate [`range_order_by_expr`](Self::range_order_by_expr) against
    /// `batch`, returning the numeric range key for every row.
    pub(crate) fn range_values(&self, batch: &RecordBatch) -> TableResult<Float64Array> {
        let key = self.range_order_by_expr(batch.schema_ref(), false)?;
        let values = self.field_values(batch, &key.name)?;
        temporal::numeric_time(&values, &key.name)
    }

    fn field_values(&self, batch: &RecordBatch, name: &str) -> TableResult<ArrayRef> {
        let schema = batch.schema_ref();
        match &self.layout {
            IndexLayout::Flat => batch
                .column_by_name(name)
                .cloned()
                .ok_or_else(|| index_column_missing(name, schema)),
            IndexLayout::Composite { column } => {
                let parent = batch
                    .column_by_name(column)
                    .ok_or_else(|| index_column_missing(column, schema))?;
                let parent = parent.as_struct_opt().ok_or_else(|| TableError::SchemaMismatch {
                    role: "composite time index",
                    column: column.clone(),
                    available: column_names(schema),
                })?;
                parent.column_by_name(name).cloned().context(ColumnNotFoundSnafu {
                    column: format!("{column}.{name}"),
                    available: parent
                        .column_names()
                        .into_iter()
                        .map(str::to_string)
                        .collect::<Vec<_>>(),
                })
            }
        }
    }
}

impl fmt::Display for TimeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.layout, &self.secondary) {
            (IndexLayout::Flat, None) => write!(f, "{}", self.primary),
            (IndexLayout::Flat, Some(sub)) => write!(f, "({}, {sub})", self.primary),
            (IndexLayout::Composite { column }, None) => write!(f, "{column}.{}", self.primary),
            (IndexLayout::Composite { column }, Some(sub)) => {
                write!(f, "{column}.({}, {sub})", self.primary)
            }
        }
    }
}

fn column_names(schema: &Schema) -> Vec<String> {
    schema.fields().iter().map(|f| f.name().clone()).collect()
}

fn index_column_missing(column: &str, schema: &Schema) -> TableError {
    TableError::SchemaMismatch {
        role: "time",
        column: column.to_string(),
        available: column_names(schema),
    }
}
