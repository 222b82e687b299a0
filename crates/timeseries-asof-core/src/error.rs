//! Error types and SNAFU context selectors shared by every table operation.
//!
//! All validation happens eagerly, before any Arrow kernel runs, so a caller
//! either gets a complete new [`Table`](crate::table::Table) or one of these
//! errors; never a partially transformed table. Context selectors are exposed
//! crate-wide (`#[snafu(visibility(pub(crate)))]`) so the table, partitioner
//! and join modules attach context without re-exporting everything.

use arrow::{datatypes::DataType, error::ArrowError};
use chrono::{DateTime, Utc};
use snafu::prelude::*;

use crate::asof::{JoinInput, JoinStrategy};

/// Errors from time-series table construction, transformation and joins.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TableError {
    /// A declared structural column is absent from the dataset.
    #[snafu(display("Declared {role} column {column} not found in dataset columns {available:?}"))]
    SchemaMismatch {
        /// Role of the missing column (for example, `"time"` or `"series id"`).
        role: &'static str,
        /// Name of the missing column.
        column: String,
        /// Columns that the dataset actually carries.
        available: Vec<String>,
    },

    /// A column is declared both as a series id and as part of the time index.
    #[snafu(display("Column {column} cannot be both a series id and a time index column"))]
    SeriesTimeOverlap {
        /// The doubly-declared column.
        column: String,
    },

    /// The operation would drop or overwrite a structural (time or series id) column.
    #[snafu(display(
        "The attempted operation ({operation}) is not allowed because it would alter the \
         structure of the table: {details}. Perform it on the underlying batch and build a new table instead"
    ))]
    StructureChange {
        /// Name of the refused operation.
        operation: String,
        /// What structural column would have been affected.
        details: String,
    },

    /// Two tables disagree on series ids or time index type.
    #[snafu(display(
        "The attempted operation ({operation}) cannot be performed because the tables have \
         incompatible structure: {details}"
    ))]
    IncompatibleTables {
        /// Name of the refused operation.
        operation: String,
        /// The incompatibility found.
        details: String,
    },

    /// A column name is still shared by both join inputs after prefixing.
    #[snafu(display(
        "Column {column} exists on both sides of the join and no prefix disambiguates it"
    ))]
    ColumnCollision {
        /// The colliding column name.
        column: String,
    },

    /// Union inputs do not carry the same column set (or column types).
    #[snafu(display("Cannot union tables with different columns: {details}"))]
    ColumnMismatch {
        /// Description of the mismatch.
        details: String,
    },

    /// A requested option combination is not implemented.
    #[snafu(display("Unsupported combination: {details}"))]
    UnsupportedCombination {
        /// The unsupported combination, spelled out.
        details: String,
    },

    /// The time index cannot produce a single numeric ordering key.
    #[snafu(display(
        "Time index field {column} of type {datatype} cannot produce a numeric range ordering key"
    ))]
    UnsupportedRangeOrdering {
        /// The field that has no numeric form.
        column: String,
        /// Its Arrow data type.
        datatype: DataType,
    },

    /// Overlap fraction for time partitioning must be strictly between 0 and 1.
    #[snafu(display("Overlap fraction must be in (0, 1), got {fraction}"))]
    InvalidOverlapFraction {
        /// The rejected fraction.
        fraction: f64,
    },

    /// Partition width for time partitioning must be positive and finite.
    #[snafu(display("Partition width must be a positive, finite number, got {width}"))]
    InvalidPartitionWidth {
        /// The rejected width.
        width: f64,
    },

    /// Converting a timestamp literal to the column's unit would overflow `i64`.
    #[snafu(display("Timestamp conversion overflow for column {column} (value: {timestamp})"))]
    TimeConversionOverflow {
        /// Name of the time column being compared against.
        column: String,
        /// The timestamp that could not be represented.
        timestamp: DateTime<Utc>,
    },

    /// A batch has more rows than 32-bit row positions or offsets can address.
    #[snafu(display("{operation} cannot address {rows} rows with 32-bit positions"))]
    TooManyRows {
        /// The step that indexes rows.
        operation: String,
        /// Number of rows in the batch.
        rows: usize,
    },

    /// A window operation was asked for an empty window.
    #[snafu(display("{operation} needs a window of at least one row, got {size}"))]
    InvalidWindowSize {
        /// The window operation.
        operation: String,
        /// The rejected size.
        size: usize,
    },

    /// A state comparison operator is not recognised.
    #[snafu(display(
        "Invalid comparison operator for state definition: {definition}; expected one of \
         =, ==, !=, <>, <, <=, >, >=, <=>"
    ))]
    InvalidStateDefinition {
        /// The rejected operator.
        definition: String,
    },

    /// A column used as a numeric feature is not numeric.
    #[snafu(display("Column {column} of type {datatype} is not numeric"))]
    NonNumericColumn {
        /// The offending column.
        column: String,
        /// Its Arrow data type.
        datatype: DataType,
    },

    /// A referenced column does not exist.
    #[snafu(display("Column {column} not found; available columns are {available:?}"))]
    ColumnNotFound {
        /// The requested column.
        column: String,
        /// Columns that exist.
        available: Vec<String>,
    },

    /// Arrow compute or conversion error while evaluating a relational step.
    #[snafu(display("Arrow error during {operation}: {source}"))]
    Arrow {
        /// The relational step being evaluated.
        operation: String,
        /// Underlying Arrow error.
        source: ArrowError,
    },

    /// A join strategy failed while executing.
    #[snafu(display(
        "As-of join failed while executing the {strategy} strategy on the {input}: {source}"
    ))]
    Join {
        /// The strategy that was executing.
        strategy: JoinStrategy,
        /// The input the failing step was working on.
        input: JoinInput,
        /// The error raised by the failing step.
        #[snafu(source(from(TableError, Box::new)))]
        source: Box<TableError>,
    },
}

/// Convenience alias for results of table operations.
pub type TableResult<T> = Result<T, TableError>;
