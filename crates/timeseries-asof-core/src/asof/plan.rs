//! Join planning: everything decided before any row is touched.
//!
//! A [`JoinPlan`] is computed once per join call from the two tables, the
//! call's [`AsOfJoinOptions`] and the engine's configuration. It fixes the
//! strategy, the column renames that resolve name collisions, and the list
//! of right-hand columns to carry forward. All compatibility checks happen
//! here, so execution never starts on inputs it would reject.

use std::collections::{HashMap, HashSet};

use log::debug;
use snafu::prelude::*;

use crate::asof::JoinStrategy;
use crate::asof::combine::{COMBINED_TS_COL, ORIGIN_COL};
use crate::config::{AsOfJoinOptions, EngineConfig};
use crate::error::{ColumnCollisionSnafu, TableResult, UnsupportedCombinationSnafu};
use crate::frame::SizeEstimator;
use crate::partition::{IS_ORIGINAL_COL, TS_PARTITION_COL, TimePartitioner};
use crate::table::Table;

const OPERATION: &str = "as_of_join";

/// Column renames that keep the two sides of a join apart.
///
/// Every non-series column present on both sides is renamed to
/// `"{prefix}_{column}"` on each side that has a prefix. Series id columns
/// are the join keys and are never renamed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnPlan {
    left_renames: HashMap<String, String>,
    right_renames: HashMap<String, String>,
}

impl ColumnPlan {
    /// Work out the renames for `left` and `right`, failing with
    /// [`ColumnCollision`](crate::TableError::ColumnCollision) if a shared
    /// name survives, or if a final name is one of `reserved`.
    pub fn try_new(
        left: &Table,
        right: &Table,
        left_prefix: Option<&str>,
        right_prefix: Option<&str>,
        reserved: &[&str],
    ) -> TableResult<Self> {
        let series: HashSet<&str> = left.series_ids().iter().map(String::as_str).collect();
        let right_names: HashSet<String> = right.columns().into_iter().collect();
        let common: Vec<String> = left
            .columns()
            .into_iter()
            .filter(|c| !series.contains(c.as_str()) && right_names.contains(c))
            .collect();

        let plan = ColumnPlan {
            left_renames: prefixed(&common, left_prefix),
            right_renames: prefixed(&common, right_prefix),
        };

        let left_final = final_names(&left.columns(), &plan.left_renames)?;
        let right_final = final_names(&right.columns(), &plan.right_renames)?;
        for name in &right_final {
            ensure!(
                series.contains(name.as_str()) || !left_final.contains(name),
                ColumnCollisionSnafu {
                    column: name.clone()
                }
            );
        }
        if let Some(name) = left_final
            .iter()
            .chain(right_final.iter())
            .find(|name| reserved.contains(&name.as_str()))
        {
            return ColumnCollisionSnafu {
                column: name.clone(),
            }
            .fail();
        }

        Ok(plan)
    }

    /// Renames applied to the left table (old name to new name).
    pub fn left_renames(&self) -> &HashMap<String, String> {
        &self.left_renames
    }

    /// Renames applied to the right table (old name to new name).
    pub fn right_renames(&self) -> &HashMap<String, String> {
        &self.right_renames
    }

    /// The left table with its renames applied.
    pub(crate) fn rename_left(&self, left: &Table) -> TableResult<Table> {
        left.with_columns_renamed(&self.left_renames)
    }

    pub(crate) fn rename_right(&self, right: &Table) -> TableResult<Table> {
        right.with_columns_renamed(&self.right_renames)
    }
}

fn prefixed(columns: &[String], prefix: Option<&str>) -> HashMap<String, String> {
    match prefix {
        Some(prefix) if !prefix.is_empty() => columns
            .iter()
            .map(|c| (c.clone(), format!("{prefix}_{c}")))
            .collect(),
        _ => HashMap::new(),
    }
}

fn final_names(columns: &[String], renames: &HashMap<String, String>) -> TableResult<Vec<String>> {
    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(columns.len());
    for column in columns {
        let name = renames.get(column).unwrap_or(column).clone();
        ensure!(
            seen.insert(name.clone()),
            ColumnCollisionSnafu {
                column: name.clone()
            }
        );
        names.push(name);
    }
    Ok(names)
}

/// The decisions for one as-of join call.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinPlan {
    strategy: JoinStrategy,
    columns: ColumnPlan,
    carried: Vec<String>,
    partitioner: Option<TimePartitioner>,
    skip_nulls: bool,
    report_empty_lookback: bool,
    left_bytes: u64,
    right_bytes: u64,
}

impl JoinPlan {
    /// Validate the inputs and decide how to join them.
    pub(crate) fn try_new<E: SizeEstimator>(
        left: &Table,
        right: &Table,
        options: &AsOfJoinOptions,
        config: &EngineConfig,
        estimator: &E,
    ) -> TableResult<Self> {
        left.ensure_compatible(right, OPERATION)?;
        options.validate()?;

        let left_bytes = estimator.estimated_bytes(left.batch());
        let right_bytes = estimator.estimated_bytes(right.batch());
        let threshold = config.broadcast_threshold_bytes;

        let carried_before_rename: Vec<String> = right
            .schema()
            .time_columns()
            .into_iter()
            .chain(right.observational_cols())
            .collect();

        let fallback = match options.partition_width {
            Some(_) => JoinStrategy::Skew,
            None => JoinStrategy::Standard,
        };
        let small_enough = left_bytes < threshold || right_bytes < threshold;
        let strategy = if options.prefer_broadcast && small_enough {
            if options.skip_nulls && right.any_nulls(&carried_before_rename)? {
                debug!(
                    "broadcast requested but right-hand columns contain nulls; using the {fallback} strategy"
                );
                fallback
            } else {
                JoinStrategy::Broadcast
            }
        } else {
            fallback
        };

        let partitioner = match (strategy, options.partition_width) {
            (JoinStrategy::Skew, Some(width)) => {
                ensure!(
                    options.skip_nulls,
                    UnsupportedCombinationSnafu {
                        details: "skip_nulls = false with a partition width (skew-partitioned join)",
                    }
                );
                left.time_index()
                    .range_order_by_expr(left.batch().schema_ref(), false)?;
                right
                    .time_index()
                    .range_order_by_expr(right.batch().schema_ref(), false)?;
                Some(TimePartitioner::try_new(width, options.overlap_fraction)?)
            }
            _ => None,
        };

        let reserved: &[&str] = match strategy {
            JoinStrategy::Broadcast => &[],
            JoinStrategy::Standard => &[COMBINED_TS_COL, ORIGIN_COL],
            JoinStrategy::Skew => &[COMBINED_TS_COL, ORIGIN_COL, TS_PARTITION_COL, IS_ORIGINAL_COL],
        };
        let columns = ColumnPlan::try_new(
            left,
            right,
            options.left_prefix.as_deref(),
            options.right_prefix.as_deref(),
            reserved,
        )?;
        let carried = carried_before_rename
            .iter()
            .map(|c| columns.right_renames.get(c).unwrap_or(c).clone())
            .collect();

        debug!(
            "as-of join plan: strategy={strategy}, left_bytes={left_bytes}, right_bytes={right_bytes}, \
             threshold={threshold}, left_renames={:?}, right_renames={:?}",
            columns.left_renames, columns.right_renames
        );

        Ok(JoinPlan {
            strategy,
            columns,
            carried,
            partitioner,
            skip_nulls: options.skip_nulls,
            report_empty_lookback: !options.suppress_null_warning,
            left_bytes,
            right_bytes,
        })
    }

    /// The chosen strategy.
    pub fn strategy(&self) -> JoinStrategy {
        self.strategy
    }

    /// Column renames for both sides.
    pub fn column_plan(&self) -> &ColumnPlan {
        &self.columns
    }

    /// Right-hand columns carried into the result, after renaming, in
    /// output order.
    pub fn carried_columns(&self) -> &[String] {
        &self.carried
    }

    /// The time partitioner, for the skew-partitioned strategy.
    pub fn partitioner(&self) -> Option<&TimePartitioner> {
        self.partitioner.as_ref()
    }

    /// Whether nulls are skipped when carrying values forward.
    pub fn skip_nulls(&self) -> bool {
        self.skip_nulls
    }

    /// Estimated size of the left table.
    pub fn left_bytes(&self) -> u64 {
        self.left_bytes
    }

    /// Estimated size of the right table.
    pub fn right_bytes(&self) -> u64 {
        self.right_bytes
    }

    pub(crate) fn report_empty_lookback(&self) -> bool {
        self.report_empty_lookback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TableError;
    use crate::test_util::*;
    use arrow::array::RecordBatch;

    fn trades() -> Result<Table, Box<dyn std::error::Error>> {
        Ok(Table::try_new(
            price_batch(&[("A", 1, 10.0), ("A", 4, 11.0)])?,
            "ts",
            &["symbol"],
        )?)
    }

    fn quotes() -> Result<Table, Box<dyn std::error::Error>> {
        Ok(Table::try_new(
            quote_batch(&[("A", 2, Some("x")), ("A", 3, None)])?,
            "ts",
            &["symbol"],
        )?)
    }

    fn plan(
        left: &Table,
        right: &Table,
        options: &AsOfJoinOptions,
        bytes: u64,
    ) -> TableResult<JoinPlan> {
        let fixed = move |_: &RecordBatch| bytes;
        JoinPlan::try_new(left, right, options, &EngineConfig::default(), &fixed)
    }

    #[test]
    fn default_prefixes_rename_right_side_only() -> TestResult {
        let plan = plan(&trades()?, &quotes()?, &AsOfJoinOptions::default(), u64::MAX)?;

        assert_eq!(plan.strategy(), JoinStrategy::Standard);
        assert!(plan.column_plan().left_renames().is_empty());
        assert_eq!(
            plan.column_plan().right_renames().get("ts").map(String::as_str),
            Some("right_ts")
        );
        assert_eq!(plan.carried_columns(), ["right_ts", "quote"]);
        Ok(())
    }

    #[test]
    fn both_prefixes_apply_to_shared_columns() -> TestResult {
        let options = AsOfJoinOptions::new()
            .with_left_prefix("l")
            .with_right_prefix("r");
        let plan = plan(&trades()?, &trades()?, &options, u64::MAX)?;

        let renames = plan.column_plan();
        assert_eq!(renames.left_renames().get("price").map(String::as_str), Some("l_price"));
        assert_eq!(renames.right_renames().get("ts").map(String::as_str), Some("r_ts"));
        assert!(!renames.right_renames().contains_key("symbol"));
        Ok(())
    }

    #[test]
    fn missing_prefixes_are_a_collision() -> TestResult {
        let options = AsOfJoinOptions::new().without_right_prefix();
        let err = plan(&trades()?, &quotes()?, &options, u64::MAX).unwrap_err();
        assert!(matches!(err, TableError::ColumnCollision { column } if column == "ts"));
        Ok(())
    }

    #[test]
    fn prefixed_name_clashing_with_existing_column_is_a_collision() -> TestResult {
        let left = trades()?.with_column_renamed("price", "right_ts")?;
        let err = plan(&left, &quotes()?, &AsOfJoinOptions::default(), u64::MAX).unwrap_err();
        assert!(matches!(err, TableError::ColumnCollision { column } if column == "right_ts"));
        Ok(())
    }

    #[test]
    fn series_ids_must_match() -> TestResult {
        let right = Table::try_new(quote_batch(&[("A", 2, None)])?, "ts", &[])?;
        let err = plan(&trades()?, &right, &AsOfJoinOptions::default(), 0).unwrap_err();
        assert!(matches!(err, TableError::IncompatibleTables { .. }));
        Ok(())
    }

    #[test]
    fn time_types_must_match() -> TestResult {
        let right = Table::try_new(tick_batch(&[("A", 2, 1.0)])?, "ts", &["symbol"])?;
        let err = plan(&trades()?, &right, &AsOfJoinOptions::default(), 0).unwrap_err();
        assert!(matches!(err, TableError::IncompatibleTables { .. }));
        Ok(())
    }

    #[test]
    fn broadcast_needs_preference_and_small_side() -> TestResult {
        let left = trades()?;
        let right = trades()?;
        let prefer = AsOfJoinOptions::new().with_prefer_broadcast(true);

        assert_eq!(plan(&left, &right, &prefer, 10)?.strategy(), JoinStrategy::Broadcast);
        assert_eq!(
            plan(&left, &right, &prefer, u64::MAX)?.strategy(),
            JoinStrategy::Standard
        );
        assert_eq!(
            plan(&left, &right, &AsOfJoinOptions::default(), 10)?.strategy(),
            JoinStrategy::Standard
        );
        Ok(())
    }

    #[test]
    fn broadcast_falls_back_when_right_nulls_must_be_skipped() -> TestResult {
        let prefer = AsOfJoinOptions::new().with_prefer_broadcast(true);
        let planned = plan(&trades()?, &quotes()?, &prefer, 10)?;
        assert_eq!(planned.strategy(), JoinStrategy::Standard);

        let keep_nulls = prefer.with_skip_nulls(false);
        let planned = plan(&trades()?, &quotes()?, &keep_nulls, 10)?;
        assert_eq!(planned.strategy(), JoinStrategy::Broadcast);
        Ok(())
    }

    #[test]
    fn partition_width_selects_skew() -> TestResult {
        let options = AsOfJoinOptions::new().with_partition_width(10.0);
        let planned = plan(&trades()?, &quotes()?, &options, u64::MAX)?;
        assert_eq!(planned.strategy(), JoinStrategy::Skew);
        assert_eq!(planned.partitioner().map(|p| p.width()), Some(10.0));
        Ok(())
    }

    #[test]
    fn skew_rejects_keeping_nulls() -> TestResult {
        let options = AsOfJoinOptions::new()
            .with_partition_width(10.0)
            .with_skip_nulls(false);
        let err = plan(&trades()?, &quotes()?, &options, u64::MAX).unwrap_err();
        assert!(matches!(err, TableError::UnsupportedCombination { .. }));
        Ok(())
    }

    #[test]
    fn skew_rejects_bad_fraction_before_any_work() -> TestResult {
        let options = AsOfJoinOptions::new()
            .with_partition_width(10.0)
            .with_overlap_fraction(0.0);
        let err = plan(&trades()?, &quotes()?, &options, u64::MAX).unwrap_err();
        assert!(matches!(err, TableError::InvalidOverlapFraction { .. }));
        Ok(())
    }

    #[test]
    fn reserved_names_are_refused() -> TestResult {
        let left = trades()?.with_column_renamed("price", COMBINED_TS_COL)?;
        let err = plan(&left, &quotes()?, &AsOfJoinOptions::default(), u64::MAX).unwrap_err();
        assert!(matches!(err, TableError::ColumnCollision { column } if column == COMBINED_TS_COL));
        Ok(())
    }
}
