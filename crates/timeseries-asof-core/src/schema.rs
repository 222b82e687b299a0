//! Series schema: which columns give a row its temporal identity.
//!
//! A [`SeriesSchema`] binds a [`TimeIndex`] to an ordered list of series id
//! columns. Together they are the *structural* columns; every other column
//! of the batch is *observational*, and the numeric observational columns
//! are *metrics*.
//!
//! Rules enforced here:
//! - series ids and time columns are disjoint;
//! - every declared structural column exists in the batch (`validate`).

use arrow::datatypes::Schema;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::error::{SchemaMismatchSnafu, SeriesTimeOverlapSnafu, TableResult};
use crate::frame::schema_names;
use crate::time_index::TimeIndex;

/// Time index plus series identifiers for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesSchema {
    time_index: TimeIndex,
    #[serde(default)]
    series_ids: Vec<String>,
}

impl SeriesSchema {
    /// Build a schema from an index and series ids.
    ///
    /// Fails with [`TableError::SeriesTimeOverlap`](crate::TableError::SeriesTimeOverlap)
    /// if a series id is also an index column.
    pub fn new(time_index: TimeIndex, series_ids: Vec<String>) -> TableResult<Self> {
        let time_columns = time_index.columns();
        if let Some(column) = series_ids.iter().find(|id| time_columns.contains(id)) {
            return SeriesTimeOverlapSnafu {
                column: column.clone(),
            }
            .fail();
        }
        Ok(SeriesSchema {
            time_index,
            series_ids,
        })
    }

    /// Infer a schema with a flat time index over `ts_col` and validate it
    /// against `schema`. An empty `series_ids` means one global series.
    pub fn from_dataset(schema: &Schema, ts_col: &str, series_ids: &[&str]) -> TableResult<Self> {
        let series_schema = SeriesSchema::new(
            TimeIndex::flat(ts_col),
            series_ids.iter().map(|s| s.to_string()).collect(),
        )?;
        series_schema.validate(schema)?;
        Ok(series_schema)
    }

    /// Check that every declared structural column is present in `schema`.
    pub fn validate(&self, schema: &Schema) -> TableResult<()> {
        self.time_index.validate(schema)?;
        for id in &self.series_ids {
            ensure!(
                schema.field_with_name(id).is_ok(),
                SchemaMismatchSnafu {
                    role: "series id",
                    column: id.clone(),
                    available: schema_names(schema),
                }
            );
        }
        Ok(())
    }

    /// The time index.
    pub fn time_index(&self) -> &TimeIndex {
        &self.time_index
    }

    /// Series identifier columns, in declaration order.
    pub fn series_ids(&self) -> &[String] {
        &self.series_ids
    }

    /// Top-level columns occupied by the time index.
    pub fn time_columns(&self) -> Vec<String> {
        self.time_index.columns()
    }

    /// Series ids followed by the time columns.
    pub fn structural_columns(&self) -> Vec<String> {
        self.series_ids
            .iter()
            .cloned()
            .chain(self.time_index.columns())
            .collect()
    }

    /// Whether `column` is a series id or a time column.
    pub fn is_structural(&self, column: &str) -> bool {
        self.series_ids.iter().any(|id| id == column)
            || self.time_index.columns().iter().any(|c| c == column)
    }

    /// Every column of `schema` that is not structural, in schema order.
    pub fn find_observational_columns(&self, schema: &Schema) -> Vec<String> {
        schema_names(schema)
            .into_iter()
            .filter(|name| !self.is_structural(name))
            .collect()
    }

    /// Observational columns whose type is numeric.
    pub fn find_metric_columns(&self, schema: &Schema) -> Vec<String> {
        schema
            .fields()
            .iter()
            .filter(|f| !self.is_structural(f.name()) && f.data_type().is_numeric())
            .map(|f| f.name().clone())
            .collect()
    }

    /// Same time index over different series ids.
    pub(crate) fn with_series_ids(&self, series_ids: Vec<String>) -> TableResult<Self> {
        SeriesSchema::new(self.time_index.clone(), series_ids)
    }
}
