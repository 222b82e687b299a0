//! Numeric views of time columns.
//!
//! The skew-aware join buckets rows by time, which needs a plain number per
//! row. Temporal Arrow types are converted to fractional seconds since the
//! Unix epoch (matching a timestamp-to-double cast); numeric types are used
//! as-is.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, Float64Array, TimestampNanosecondArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Int32Type, Int64Type, TimeUnit};
use chrono::{DateTime, Utc};
use snafu::prelude::*;

use crate::error::{ArrowSnafu, TableError, TableResult, TimeConversionOverflowSnafu};

const SECONDS_PER_DAY: f64 = 24.0 * 60.0 * 60.0;

/// Whether values of `data_type` can be turned into a numeric time.
pub(crate) fn has_numeric_form(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Timestamp(_, _) | DataType::Date32 | DataType::Date64
    ) || data_type.is_numeric()
}

/// Convert time values to `f64`: seconds since the epoch for temporal
/// types, the raw value for numeric types. Nulls stay null.
pub(crate) fn numeric_time(values: &ArrayRef, column: &str) -> TableResult<Float64Array> {
    let unsupported = || TableError::UnsupportedRangeOrdering {
        column: column.to_string(),
        datatype: values.data_type().clone(),
    };

    match values.data_type() {
        DataType::Timestamp(unit, _) => {
            let per_second = match unit {
                TimeUnit::Second => 1.0,
                TimeUnit::Millisecond => 1e3,
                TimeUnit::Microsecond => 1e6,
                TimeUnit::Nanosecond => 1e9,
            };
            let raw = cast_to(values, &DataType::Int64)?;
            let raw = raw.as_primitive_opt::<Int64Type>().ok_or_else(unsupported)?;
            Ok(raw.unary::<_, Float64Type>(|v| v as f64 / per_second))
        }
        DataType::Date32 => {
            let days = cast_to(values, &DataType::Int32)?;
            let days = days.as_primitive_opt::<Int32Type>().ok_or_else(unsupported)?;
            Ok(days.unary::<_, Float64Type>(|d| d as f64 * SECONDS_PER_DAY))
        }
        DataType::Date64 => {
            let millis = cast_to(values, &DataType::Int64)?;
            let millis = millis.as_primitive_opt::<Int64Type>().ok_or_else(unsupported)?;
            Ok(millis.unary::<_, Float64Type>(|ms| ms as f64 / 1e3))
        }
        other if other.is_numeric() => {
            let as_float = cast_to(values, &DataType::Float64)?;
            as_float
                .as_primitive_opt::<Float64Type>()
                .cloned()
                .ok_or_else(unsupported)
        }
        _ => Err(unsupported()),
    }
}

/// A one-element array holding `instant`, converted to `target`'s type.
///
/// Timestamp targets keep their timezone so Arrow comparison kernels accept
/// the literal and the column as the same type.
pub(crate) fn instant_literal(
    instant: DateTime<Utc>,
    target: &DataType,
    column: &str,
) -> TableResult<ArrayRef> {
    let nanos = instant
        .timestamp_nanos_opt()
        .context(TimeConversionOverflowSnafu {
            column,
            timestamp: instant,
        })?;
    let tz = match target {
        DataType::Timestamp(_, tz) => tz.clone(),
        _ => None,
    };
    let literal: ArrayRef = Arc::new(TimestampNanosecondArray::from(vec![nanos]).with_timezone_opt(tz));
    cast_to(&literal, target)
}

/// Cast `values` to `target`, passing arrays of the right type through.
pub(crate) fn cast_to(values: &ArrayRef, target: &DataType) -> TableResult<ArrayRef> {
    if values.data_type() == target {
        return Ok(Arc::clone(values));
    }
    cast(values.as_ref(), target).context(ArrowSnafu {
        operation: format!("cast {} to {target}", values.data_type()),
    })
}
