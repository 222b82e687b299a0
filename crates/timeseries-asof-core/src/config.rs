//! Join options and engine configuration.
//!
//! Both structs deserialize from partial documents: any field left out takes
//! its default, so a JSON or TOML file only needs the settings it changes.

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::error::{InvalidOverlapFractionSnafu, InvalidPartitionWidthSnafu, TableResult};

/// Default prefix applied to colliding right-hand columns.
pub const DEFAULT_RIGHT_PREFIX: &str = "right";

/// Default share of a time bucket duplicated into the next bucket.
pub const DEFAULT_OVERLAP_FRACTION: f64 = 0.5;

/// Default broadcast threshold: 30 MiB.
pub const DEFAULT_BROADCAST_THRESHOLD_BYTES: u64 = 30 * 1024 * 1024;

/// Options for one as-of join call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsOfJoinOptions {
    /// Prefix for colliding left-hand columns; `None` keeps their names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_prefix: Option<String>,
    /// Prefix for colliding right-hand columns; `None` keeps their names.
    pub right_prefix: Option<String>,
    /// Width of the time buckets for the skew-partitioned strategy, in the
    /// numeric time domain (seconds for temporal columns).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_width: Option<f64>,
    /// Trailing share of each bucket duplicated into the next one.
    pub overlap_fraction: f64,
    /// Carry the last non-null value of each right-hand column.
    pub skip_nulls: bool,
    /// Use the broadcast strategy when one side is small enough.
    pub prefer_broadcast: bool,
    /// Silence the empty-lookback diagnostic of the skew strategy.
    pub suppress_null_warning: bool,
}

impl Default for AsOfJoinOptions {
    fn default() -> Self {
        AsOfJoinOptions {
            left_prefix: None,
            right_prefix: Some(DEFAULT_RIGHT_PREFIX.to_string()),
            partition_width: None,
            overlap_fraction: DEFAULT_OVERLAP_FRACTION,
            skip_nulls: true,
            prefer_broadcast: false,
            suppress_null_warning: false,
        }
    }
}

impl AsOfJoinOptions {
    /// Options with every field at its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the left-hand prefix.
    pub fn with_left_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.left_prefix = Some(prefix.into());
        self
    }

    /// Set the right-hand prefix.
    pub fn with_right_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.right_prefix = Some(prefix.into());
        self
    }

    /// Keep colliding right-hand column names as they are.
    pub fn without_right_prefix(mut self) -> Self {
        self.right_prefix = None;
        self
    }

    /// Use the skew-partitioned strategy with buckets of `width`.
    pub fn with_partition_width(mut self, width: f64) -> Self {
        self.partition_width = Some(width);
        self
    }

    /// Set the bucket overlap fraction.
    pub fn with_overlap_fraction(mut self, fraction: f64) -> Self {
        self.overlap_fraction = fraction;
        self
    }

    /// Choose between last-non-null and last-row carry-forward.
    pub fn with_skip_nulls(mut self, skip_nulls: bool) -> Self {
        self.skip_nulls = skip_nulls;
        self
    }

    /// Ask for the broadcast strategy.
    pub fn with_prefer_broadcast(mut self, prefer: bool) -> Self {
        self.prefer_broadcast = prefer;
        self
    }

    /// Silence the empty-lookback diagnostic.
    pub fn with_suppress_null_warning(mut self, suppress: bool) -> Self {
        self.suppress_null_warning = suppress;
        self
    }

    /// Check the partitioning settings. The overlap fraction is only
    /// checked when a partition width is set.
    pub fn validate(&self) -> TableResult<()> {
        if let Some(width) = self.partition_width {
            validate_partitioning(width, self.overlap_fraction)?;
        }
        Ok(())
    }
}

/// Settings that stay fixed for the lifetime of an engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// A side whose estimated size is below this many bytes may be broadcast.
    pub broadcast_threshold_bytes: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            broadcast_threshold_bytes: DEFAULT_BROADCAST_THRESHOLD_BYTES,
        }
    }
}

impl EngineConfig {
    /// Set the broadcast threshold.
    pub fn with_broadcast_threshold_bytes(mut self, bytes: u64) -> Self {
        self.broadcast_threshold_bytes = bytes;
        self
    }
}

/// Width must be finite and positive; the fraction must lie in `(0, 1)`.
pub(crate) fn validate_partitioning(width: f64, overlap_fraction: f64) -> TableResult<()> {
    ensure!(
        width.is_finite() && width > 0.0,
        InvalidPartitionWidthSnafu { width }
    );
    ensure!(
        overlap_fraction > 0.0 && overlap_fraction < 1.0,
        InvalidOverlapFractionSnafu {
            fraction: overlap_fraction
        }
    );
    Ok(())
}
