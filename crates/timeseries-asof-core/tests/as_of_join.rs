//! Integration tests for the as-of join engine across strategies.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use chrono::{TimeZone, Utc};
use common::*;
use timeseries_asof_core::{
    AsOfJoinEngine, AsOfJoinOptions, EngineConfig, JoinStrategy, Table, TableError,
};

/// Deterministic left/right pair over three series. Right rows arrive every
/// three time units per series and never carry nulls.
fn market() -> (Table, Table) {
    let symbols = ["A", "B", "C"];
    let mut left_rows = Vec::new();
    let mut state: u64 = 7;
    for i in 0..90_i64 {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let symbol = symbols[(state >> 33) as usize % 3];
        let ts = (state >> 40) as i64 % 60;
        left_rows.push((symbol, ts, i as f64));
    }
    let mut right_rows = Vec::new();
    for (k, symbol) in symbols.iter().enumerate() {
        for step in 0..20_i64 {
            let ts = step * 3 + k as i64 % 2;
            right_rows.push((*symbol, ts, (k as f64) * 100.0 + step as f64));
        }
    }
    (prices(&left_rows), prices(&right_rows))
}

#[test]
fn self_join_carries_each_row_onto_itself() -> TestResult {
    let table = prices(&[("A", 1, 1.0), ("B", 1, 5.0), ("A", 4, 2.0), ("B", 3, 6.0)]);

    let joined = table.as_of_join(&table, &AsOfJoinOptions::default())?;

    assert_eq!(floats(&joined, "price"), floats(&joined, "right_price"));
    assert_eq!(ints(&joined, "ts"), ints(&joined, "right_ts"));
    Ok(())
}

#[test]
fn carries_last_value_forward() -> TestResult {
    let left = prices(&[("A", 1, 0.0), ("A", 2, 0.0), ("A", 3, 0.0), ("A", 4, 0.0)]);
    let right = labels(&[("A", 1, Some("a")), ("A", 3, Some("b"))]);

    let joined = left.as_of_join(&right, &AsOfJoinOptions::default())?;

    assert_eq!(strings(&joined, "label"), some(&["a", "a", "b", "b"]));
    assert_eq!(
        joined.columns(),
        vec!["symbol", "ts", "price", "right_ts", "label"]
    );
    Ok(())
}

#[test]
fn broadcast_matches_standard() -> TestResult {
    let (left, right) = market();
    let always_small = |_: &RecordBatch| 0_u64;
    let engine = AsOfJoinEngine::with_estimator(always_small);
    let options = AsOfJoinOptions::new().with_prefer_broadcast(true);

    assert_eq!(
        engine.plan(&left, &right, &options)?.strategy(),
        JoinStrategy::Broadcast
    );
    let broadcast = engine.join(&left, &right, &options)?;
    let standard = engine.join(&left, &right, &AsOfJoinOptions::default())?;

    assert_eq!(broadcast.batch(), standard.batch());
    Ok(())
}

#[test]
fn skew_matches_standard_when_overlap_spans_gaps() -> TestResult {
    let (left, right) = market();
    let standard = left.as_of_join(&right, &AsOfJoinOptions::default())?;

    for (width, fraction) in [(10.0, 0.5), (7.0, 0.75), (100.0, 0.1)] {
        let options = AsOfJoinOptions::new()
            .with_partition_width(width)
            .with_overlap_fraction(fraction)
            .with_suppress_null_warning(true);
        let skew = left.as_of_join(&right, &options)?;
        assert_eq!(skew.batch(), standard.batch(), "width {width}, fraction {fraction}");
    }
    Ok(())
}

#[test]
fn boundary_rows_see_the_previous_bucket() -> TestResult {
    let left = prices(&[("A", 10, 0.0), ("A", 20, 0.0)]);
    let right = labels(&[("A", 9, Some("before ten")), ("A", 19, Some("before twenty"))]);
    let standard = left.as_of_join(&right, &AsOfJoinOptions::default())?;

    for fraction in [0.15, 0.5, 0.9] {
        let options = AsOfJoinOptions::new()
            .with_partition_width(10.0)
            .with_overlap_fraction(fraction);
        let skew = left.as_of_join(&right, &options)?;
        assert_eq!(strings(&skew, "label"), strings(&standard, "label"));
    }
    assert_eq!(strings(&standard, "label"), some(&["before ten", "before twenty"]));
    Ok(())
}

#[test]
fn empty_right_leaves_left_rows_with_nulls() -> TestResult {
    let left = prices(&[("A", 1, 1.0), ("B", 2, 2.0)]);
    let right = labels(&[]);

    for options in [
        AsOfJoinOptions::default(),
        AsOfJoinOptions::new().with_prefer_broadcast(true),
        AsOfJoinOptions::new().with_partition_width(5.0),
    ] {
        let joined = left.as_of_join(&right, &options)?;
        assert_eq!(joined.num_rows(), 2);
        assert_eq!(floats(&joined, "price"), vec![Some(1.0), Some(2.0)]);
        assert_eq!(strings(&joined, "label"), vec![None, None]);
        assert_eq!(ints(&joined, "right_ts"), vec![None, None]);
    }
    Ok(())
}

#[test]
fn duplicate_left_times_share_the_carried_value() -> TestResult {
    let left = prices(&[("A", 5, 1.0), ("A", 5, 2.0), ("A", 2, 3.0)]);
    let right = labels(&[("A", 4, Some("x")), ("A", 1, Some("w"))]);

    let joined = left.as_of_join(&right, &AsOfJoinOptions::default())?;

    assert_eq!(joined.num_rows(), 3);
    assert_eq!(strings(&joined, "label"), some(&["x", "x", "w"]));
    Ok(())
}

#[test]
fn null_handling_follows_skip_nulls() -> TestResult {
    let left = prices(&[("A", 3, 0.0), ("A", 6, 0.0)]);
    let right = labels(&[("A", 1, Some("known")), ("A", 2, None), ("A", 5, Some("later"))]);

    let skipping = left.as_of_join(&right, &AsOfJoinOptions::default())?;
    assert_eq!(strings(&skipping, "label"), some(&["known", "later"]));
    assert_eq!(ints(&skipping, "right_ts"), vec![Some(2), Some(5)]);

    let keeping = left.as_of_join(&right, &AsOfJoinOptions::new().with_skip_nulls(false))?;
    assert_eq!(
        strings(&keeping, "label"),
        vec![None, Some("later".to_string())]
    );

    // Nulls on the right rule out broadcast when they must be skipped.
    let engine = AsOfJoinEngine::with_estimator(|_: &RecordBatch| 0_u64);
    let prefer = AsOfJoinOptions::new().with_prefer_broadcast(true);
    assert_eq!(
        engine.plan(&left, &right, &prefer)?.strategy(),
        JoinStrategy::Standard
    );
    let keep_nulls = prefer.with_skip_nulls(false);
    assert_eq!(
        engine.plan(&left, &right, &keep_nulls)?.strategy(),
        JoinStrategy::Broadcast
    );
    assert_eq!(
        engine.join(&left, &right, &keep_nulls)?.batch(),
        keeping.batch()
    );
    Ok(())
}

#[test]
fn null_left_times_are_kept_without_values() -> TestResult {
    let schema = Arc::new(Schema::new(vec![
        Field::new("symbol", DataType::Utf8, false),
        Field::new("ts", DataType::Int64, true),
        Field::new("price", DataType::Float64, true),
    ]));
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(vec!["A", "A"])),
        Arc::new(Int64Array::from(vec![None, Some(3)])),
        Arc::new(Float64Array::from(vec![1.0, 2.0])),
    ];
    let left = Table::try_new(RecordBatch::try_new(schema, columns)?, "ts", &["symbol"])?;
    let right = labels(&[("A", 1, Some("a"))]);

    let joined = left.as_of_join(&right, &AsOfJoinOptions::default())?;
    assert_eq!(strings(&joined, "label"), vec![None, Some("a".to_string())]);
    Ok(())
}

#[test]
fn timestamp_tables_join_on_instants() -> TestResult {
    let base = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap().timestamp_millis();
    let trades = bids(&[("A", base + 500, 1.0), ("A", base + 2_000, 2.0)]);
    let quotes = bids(&[("A", base, 10.0), ("A", base + 1_000, 11.0)])
        .with_column_renamed("bid", "ask")?;

    let joined = trades.as_of_join(&quotes, &AsOfJoinOptions::default())?;
    assert_eq!(floats(&joined, "ask"), vec![Some(10.0), Some(11.0)]);
    assert_eq!(
        joined.columns(),
        vec!["symbol", "event_ts", "bid", "right_event_ts", "ask"]
    );

    let skew = trades.as_of_join(
        &quotes,
        &AsOfJoinOptions::new().with_partition_width(60.0),
    )?;
    assert_eq!(skew.batch(), joined.batch());
    Ok(())
}

#[test]
fn left_prefix_renames_left_columns() -> TestResult {
    let left = prices(&[("A", 2, 1.0)]);
    let right = prices(&[("A", 1, 9.0)]);
    let options = AsOfJoinOptions::new().with_left_prefix("trade").with_right_prefix("quote");

    let joined = left.as_of_join(&right, &options)?;

    assert_eq!(
        joined.columns(),
        vec!["symbol", "trade_ts", "trade_price", "quote_ts", "quote_price"]
    );
    assert_eq!(joined.ts_col(), "trade_ts");
    assert_eq!(floats(&joined, "quote_price"), vec![Some(9.0)]);
    // The inputs are untouched.
    assert_eq!(left.columns(), vec!["symbol", "ts", "price"]);
    Ok(())
}

#[test]
fn unresolved_collisions_fail() {
    let left = prices(&[("A", 2, 1.0)]);
    let right = prices(&[("A", 1, 9.0)]);
    let options = AsOfJoinOptions::new().without_right_prefix();

    let err = left.as_of_join(&right, &options).unwrap_err();
    assert!(matches!(err, TableError::ColumnCollision { .. }));

    let same = AsOfJoinOptions::new().with_left_prefix("x").with_right_prefix("x");
    let err = left.as_of_join(&right, &same).unwrap_err();
    assert!(matches!(err, TableError::ColumnCollision { column } if column == "x_ts"));
}

#[test]
fn incompatible_tables_fail_before_joining() -> TestResult {
    let left = prices(&[("A", 2, 1.0)]);

    let unkeyed = Table::try_new(labels(&[("A", 1, None)]).into_batch(), "ts", &[])?;
    let err = left.as_of_join(&unkeyed, &AsOfJoinOptions::default()).unwrap_err();
    assert!(matches!(err, TableError::IncompatibleTables { .. }));

    let timestamped = bids(&[("A", 1, 1.0)]);
    let err = left.as_of_join(&timestamped, &AsOfJoinOptions::default()).unwrap_err();
    assert!(matches!(err, TableError::IncompatibleTables { .. }));
    Ok(())
}

#[test]
fn skew_refuses_unsupported_requests() -> TestResult {
    let left = prices(&[("A", 2, 1.0)]);
    let right = labels(&[("A", 1, Some("a"))]);

    let keep_nulls = AsOfJoinOptions::new()
        .with_partition_width(10.0)
        .with_skip_nulls(false);
    let err = left.as_of_join(&right, &keep_nulls).unwrap_err();
    assert!(matches!(err, TableError::UnsupportedCombination { .. }));

    let bad_fraction = AsOfJoinOptions::new()
        .with_partition_width(10.0)
        .with_overlap_fraction(1.5);
    let err = left.as_of_join(&right, &bad_fraction).unwrap_err();
    assert!(matches!(err, TableError::InvalidOverlapFraction { .. }));

    let schema = Arc::new(Schema::new(vec![
        Field::new("symbol", DataType::Utf8, false),
        Field::new("ts", DataType::Utf8, true),
        Field::new("price", DataType::Float64, true),
    ]));
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(vec!["A"])),
        Arc::new(StringArray::from(vec!["2024-01-01T00:00:00"])),
        Arc::new(Float64Array::from(vec![1.0])),
    ];
    let text = Table::try_new(RecordBatch::try_new(schema, columns)?, "ts", &["symbol"])?;
    let err = text
        .as_of_join(&text, &AsOfJoinOptions::new().with_partition_width(10.0))
        .unwrap_err();
    assert!(matches!(err, TableError::UnsupportedRangeOrdering { .. }));

    // The same string-indexed tables join fine without partitioning.
    let joined = text.as_of_join(&text, &AsOfJoinOptions::default())?;
    assert_eq!(floats(&joined, "right_price"), vec![Some(1.0)]);
    Ok(())
}

#[test]
fn engine_threshold_gates_broadcast() -> TestResult {
    let left = prices(&[("A", 2, 1.0)]);
    let right = prices(&[("A", 1, 9.0)]);
    let prefer = AsOfJoinOptions::new().with_prefer_broadcast(true);

    let default_engine = AsOfJoinEngine::new();
    assert_eq!(
        default_engine.plan(&left, &right, &prefer)?.strategy(),
        JoinStrategy::Broadcast
    );

    let strict = AsOfJoinEngine::new()
        .with_config(EngineConfig::default().with_broadcast_threshold_bytes(0));
    let plan = strict.plan(&left, &right, &prefer)?;
    assert_eq!(plan.strategy(), JoinStrategy::Standard);
    assert!(plan.left_bytes() > 0);
    Ok(())
}
