//! Batch coordinator tests: enumeration, eligibility, pacing, partial failure.

mod common;

use std::time::Duration;

use chrono::{TimeZone, Utc};
use common::{RecordingPacer, StubExecutor};
use ga4_extract::batch::{parse_batch_config, plan, BatchRunner, ConfigFormat};
use ga4_extract::models::{Brand, DimensionFilter, MatchType, ReportDefinition};
use ga4_extract::{Delimiter, ExtractError, Exporter};

fn runner<'a>(
    executor: &'a StubExecutor,
    dir: &std::path::Path,
) -> BatchRunner<&'a StubExecutor, RecordingPacer> {
    BatchRunner::new(executor, Exporter::new(dir, Delimiter::Comma))
        .with_pacer(RecordingPacer::default())
        .with_today(common::today())
}

fn brands() -> Vec<Brand> {
    vec![Brand::new("Alpha", "111"), Brand::new("Beta", "222")]
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

#[test]
fn plan_enumerates_reports_then_ranges_then_brands() {
    let cfg = common::config(
        vec![
            common::range("q1", "2024-01-01", "2024-03-31"),
            common::range("q2", "2024-04-01", "2024-06-30"),
        ],
        vec![
            ReportDefinition::new("traffic", &["country"], &["sessions"]),
            ReportDefinition::new("totals", &[], &["activeUsers"]),
        ],
        brands(),
    );

    let plan = plan(&cfg).unwrap();
    let order: Vec<(&str, &str, &str)> = plan
        .combinations
        .iter()
        .map(|c| (c.report.name.as_str(), c.date_range.label.as_str(), c.brand.name.as_str()))
        .collect();
    assert_eq!(
        order,
        vec![
            ("traffic", "q1", "Alpha"),
            ("traffic", "q1", "Beta"),
            ("traffic", "q2", "Alpha"),
            ("traffic", "q2", "Beta"),
            ("totals", "q1", "Alpha"),
            ("totals", "q1", "Beta"),
            ("totals", "q2", "Alpha"),
            ("totals", "q2", "Beta"),
        ]
    );
}

#[test]
fn plan_excludes_placeholder_and_empty_property_ids() {
    let cfg = common::config(
        vec![common::range("all", "30daysAgo", "today")],
        vec![ReportDefinition::new("traffic", &[], &["sessions"])],
        vec![
            Brand::new("Alpha", "111"),
            Brand::new("Template", "FILL_IN"),
            Brand::new("Blank", ""),
            Brand::new("Spaces", "   "),
        ],
    );

    let plan = plan(&cfg).unwrap();
    assert_eq!(plan.eligible.len(), 1);
    assert_eq!(plan.skipped.len(), 3);
    assert_eq!(plan.combinations.len(), 1);
}

#[test]
fn plan_with_no_eligible_brands_is_an_error() {
    let cfg = common::config(
        vec![common::range("all", "30daysAgo", "today")],
        vec![ReportDefinition::new("traffic", &[], &["sessions"])],
        vec![Brand::new("Template", "FILL_IN")],
    );
    assert!(matches!(plan(&cfg), Err(ExtractError::NoBrandsConfigured)));
}

// ---------------------------------------------------------------------------
// Calls and pacing
// ---------------------------------------------------------------------------

#[test]
fn issues_one_call_per_combination_with_pauses_between() {
    let tmp = tempfile::tempdir().unwrap();
    let stub = StubExecutor::new();
    let mut cfg = common::config(
        vec![
            common::range("q1", "2024-01-01", "2024-03-31"),
            common::range("q2", "2024-04-01", "2024-06-30"),
        ],
        vec![
            ReportDefinition::new("a", &["country"], &["sessions"]),
            ReportDefinition::new("b", &["city"], &["activeUsers"]),
            ReportDefinition::new("c", &[], &["screenPageViews"]),
        ],
        brands(),
    );
    cfg.request_delay_secs = 0.5;

    let mut runner = runner(&stub, tmp.path());
    let summary = runner.run_batch(&cfg).unwrap();

    assert_eq!(stub.call_count(), 2 * 2 * 3);
    assert_eq!(summary.succeeded, 12);
    assert_eq!(summary.failed, 0);
    assert_eq!(runner.pacer().pauses.len(), 11);
    assert!(runner
        .pacer()
        .pauses
        .iter()
        .all(|d| *d == Duration::from_millis(500)));
}

#[test]
fn failed_calls_are_still_paced() {
    let tmp = tempfile::tempdir().unwrap();
    let stub = StubExecutor::new().failing_property("222");
    let cfg = common::config(
        vec![common::range("all", "7daysAgo", "today")],
        vec![ReportDefinition::new("traffic", &[], &["sessions"])],
        vec![
            Brand::new("Alpha", "111"),
            Brand::new("Beta", "222"),
            Brand::new("Gamma", "333"),
        ],
    );

    let mut runner = runner(&stub, tmp.path());
    let summary = runner.run_batch(&cfg).unwrap();

    assert_eq!(stub.call_count(), 3);
    assert_eq!(runner.pacer().pauses, vec![Duration::from_secs(1); 2]);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
}

#[test]
fn resolves_dates_and_passes_report_fields() {
    let tmp = tempfile::tempdir().unwrap();
    let stub = StubExecutor::new();
    let filter = DimensionFilter {
        field: "country".to_string(),
        match_type: MatchType::Exact,
        value: "France".to_string(),
        case_sensitive: false,
    };
    let cfg = common::config(
        vec![common::range("last_week", "7daysAgo", "yesterday")],
        vec![ReportDefinition::new("fr", &["country", "city"], &["sessions"]).with_filter(filter.clone())],
        vec![Brand::new("Alpha", "111")],
    );

    runner(&stub, tmp.path()).run_batch(&cfg).unwrap();

    let calls = stub.calls.borrow();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].property_id, "111");
    assert_eq!(calls[0].dates.start.to_string(), "2024-03-08");
    assert_eq!(calls[0].dates.end.to_string(), "2024-03-14");
    assert_eq!(calls[0].dimensions, vec!["country", "city"]);
    assert_eq!(calls[0].metrics, vec!["sessions"]);
    assert_eq!(calls[0].filter, Some(filter));
}

#[test]
fn zero_eligible_brands_aborts_before_any_call() {
    let tmp = tempfile::tempdir().unwrap();
    let stub = StubExecutor::new();
    let cfg = common::config(
        vec![common::range("all", "30daysAgo", "today")],
        vec![ReportDefinition::new("traffic", &[], &["sessions"])],
        vec![Brand::new("Template", "FILL_IN"), Brand::new("Blank", "")],
    );

    let result = runner(&stub, tmp.path()).run_batch(&cfg);
    assert!(matches!(result, Err(ExtractError::NoBrandsConfigured)));
    assert_eq!(stub.call_count(), 0);
    assert!(common::files_in(tmp.path()).is_empty());
}

// ---------------------------------------------------------------------------
// Accumulation and export
// ---------------------------------------------------------------------------

#[test]
fn one_eligible_one_placeholder_gives_one_call_and_one_file() {
    let tmp = tempfile::tempdir().unwrap();
    let stub = StubExecutor::new();
    let cfg = common::config(
        vec![common::range("all", "30daysAgo", "today")],
        vec![ReportDefinition::new("traffic", &["country"], &["sessions"])],
        vec![Brand::new("Alpha", "111"), Brand::new("Template", "FILL_IN")],
    );

    let summary = runner(&stub, tmp.path()).run_batch(&cfg).unwrap();

    assert_eq!(stub.call_count(), 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.files_written(), 1);
    assert_eq!(common::files_in(tmp.path()).len(), 1);
}

#[test]
fn rows_follow_enumeration_order_with_context_columns() {
    let tmp = tempfile::tempdir().unwrap();
    let stub = StubExecutor::new();
    let cfg = common::config(
        vec![
            common::range("q1", "2024-01-01", "2024-03-31"),
            common::range("q2", "2024-04-01", "2024-06-30"),
        ],
        vec![ReportDefinition::new("traffic", &["country"], &["sessions", "activeUsers"])],
        brands(),
    );

    let summary = runner(&stub, tmp.path()).run_batch(&cfg).unwrap();
    assert_eq!(summary.files.len(), 1);
    let file = &summary.files[0];
    let name = file.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("traffic_"));
    assert!(name.ends_with(".csv"));

    let (header, rows) = common::read_delimited(file, b',');
    assert_eq!(
        header,
        vec!["country", "sessions", "activeUsers", "brand_name", "property_id", "period"]
    );
    assert_eq!(
        rows,
        vec![
            vec!["country-111", "1", "1", "Alpha", "111", "q1"],
            vec!["country-222", "2", "2", "Beta", "222", "q1"],
            vec!["country-111", "3", "3", "Alpha", "111", "q2"],
            vec!["country-222", "4", "4", "Beta", "222", "q2"],
        ]
    );
}

#[test]
fn one_failing_combination_does_not_abort_the_batch() {
    let tmp = tempfile::tempdir().unwrap();
    let stub = StubExecutor::new().failing_property("111");
    let cfg = common::config(
        vec![common::range("all", "30daysAgo", "today")],
        vec![
            ReportDefinition::new("a", &[], &["sessions"]),
            ReportDefinition::new("b", &[], &["activeUsers"]),
        ],
        brands(),
    );

    let summary = runner(&stub, tmp.path()).run_batch(&cfg).unwrap();

    assert_eq!(stub.call_count(), 4);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.files_written(), 2);
    assert!(summary.is_success());

    let failure = &summary.failures[0];
    assert_eq!(failure.report, "a");
    assert_eq!(failure.brand, "Alpha");
    assert_eq!(failure.period, "all");
    assert!(failure.error.contains("PERMISSION_DENIED"));

    let (_, rows) = common::read_delimited(&summary.files[0], b',');
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][1], "Beta");
}

#[test]
fn report_with_only_failures_writes_no_file() {
    let tmp = tempfile::tempdir().unwrap();
    let stub = StubExecutor::new().failing_metric("notAMetric");
    let cfg = common::config(
        vec![common::range("all", "30daysAgo", "today")],
        vec![
            ReportDefinition::new("good", &["country"], &["sessions"]),
            ReportDefinition::new("broken", &["country"], &["notAMetric"]),
        ],
        brands(),
    );

    let summary = runner(&stub, tmp.path()).run_batch(&cfg).unwrap();

    assert_eq!(summary.failed, 2);
    assert_eq!(summary.empty_reports, vec!["broken"]);
    assert!(summary.is_success());

    let files = common::files_in(tmp.path());
    assert_eq!(files.len(), 1);
    let name = files[0].file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("good_"));
}

#[test]
fn all_failures_is_not_a_success() {
    let tmp = tempfile::tempdir().unwrap();
    let stub = StubExecutor::new().failing_property("111").failing_property("222");
    let cfg = common::config(
        vec![common::range("all", "30daysAgo", "today")],
        vec![ReportDefinition::new("traffic", &[], &["sessions"])],
        brands(),
    );

    let summary = runner(&stub, tmp.path()).run_batch(&cfg).unwrap();

    assert_eq!(summary.failed, 2);
    assert_eq!(summary.files_written(), 0);
    assert!(!summary.is_success());
    assert!(common::files_in(tmp.path()).is_empty());
}

#[test]
fn empty_query_results_count_as_success_but_write_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let empty = ga4_extract::models::QueryResult::new(vec!["sessions".to_string()], Vec::new());
    let stub = StubExecutor::new().returning("111", empty);
    let cfg = common::config(
        vec![common::range("all", "30daysAgo", "today")],
        vec![ReportDefinition::new("traffic", &[], &["sessions"])],
        vec![Brand::new("Alpha", "111")],
    );

    let summary = runner(&stub, tmp.path()).run_batch(&cfg).unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.empty_reports, vec!["traffic"]);
    assert!(!summary.is_success());
}

#[test]
fn property_ids_are_sent_and_written_trimmed() {
    let tmp = tempfile::tempdir().unwrap();
    let stub = StubExecutor::new();
    let cfg = parse_batch_config(
        r#"{
            "date_ranges": [{"label": "all", "start": "30daysAgo", "end": "today"}],
            "reports": [{"name": "traffic", "metrics": ["sessions"]}],
            "brands": [{"name": "Alpha", "property_id": " 111 "}]
        }"#,
        ConfigFormat::Json,
    )
    .unwrap();

    let summary = runner(&stub, tmp.path()).run_batch(&cfg).unwrap();

    assert_eq!(stub.calls.borrow()[0].property_id, "111");
    let (_, rows) = common::read_delimited(&summary.files[0], b',');
    assert_eq!(rows[0][2], "111");
}

// ---------------------------------------------------------------------------
// Metric chunking
// ---------------------------------------------------------------------------

fn twelve_metrics() -> Vec<String> {
    (0..12).map(|i| format!("m{}", i)).collect()
}

#[test]
fn wide_reports_are_queried_in_chunks_and_merged() {
    let tmp = tempfile::tempdir().unwrap();
    let stub = StubExecutor::new();
    let metrics = twelve_metrics();
    let metric_refs: Vec<&str> = metrics.iter().map(|m| m.as_str()).collect();
    let cfg = common::config(
        vec![common::range("all", "30daysAgo", "today")],
        vec![ReportDefinition::new("wide", &["country"], &metric_refs)],
        brands(),
    );

    let mut runner = runner(&stub, tmp.path());
    let summary = runner.run_batch(&cfg).unwrap();

    assert_eq!(stub.call_count(), 4);
    assert_eq!(runner.pacer().pauses.len(), 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 0);
    {
        let calls = stub.calls.borrow();
        assert_eq!(calls[0].metrics, metrics[..10].to_vec());
        assert_eq!(calls[1].metrics, metrics[10..].to_vec());
    }

    let (header, rows) = common::read_delimited(&summary.files[0], b',');
    assert_eq!(header.len(), 1 + 12 + 3);
    assert_eq!(header[12], "m11");
    assert_eq!(rows.len(), 2);

    let mut alpha = vec!["country-111".to_string()];
    alpha.extend(std::iter::repeat("1".to_string()).take(10));
    alpha.extend(std::iter::repeat("2".to_string()).take(2));
    alpha.extend(["Alpha", "111", "all"].map(String::from));
    assert_eq!(rows[0], alpha);
    assert_eq!(rows[1][0], "country-222");
    assert_eq!(rows[1][12], "4");
}

#[test]
fn a_failing_chunk_fails_the_combination_once() {
    let tmp = tempfile::tempdir().unwrap();
    let stub = StubExecutor::new().failing_metric("m11");
    let metrics = twelve_metrics();
    let metric_refs: Vec<&str> = metrics.iter().map(|m| m.as_str()).collect();
    let cfg = common::config(
        vec![common::range("all", "30daysAgo", "today")],
        vec![ReportDefinition::new("wide", &[], &metric_refs)],
        vec![Brand::new("Alpha", "111")],
    );

    let summary = runner(&stub, tmp.path()).run_batch(&cfg).unwrap();

    assert_eq!(stub.call_count(), 2);
    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.empty_reports, vec!["wide"]);
}

// ---------------------------------------------------------------------------
// Export failures
// ---------------------------------------------------------------------------

#[test]
fn export_failure_of_one_report_keeps_the_others() {
    let tmp = tempfile::tempdir().unwrap();
    let stub = StubExecutor::new();
    let stamp = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
    // A directory where report "b" wants to put its file.
    std::fs::create_dir_all(tmp.path().join("b_20240315_120000.csv")).unwrap();
    let cfg = common::config(
        vec![common::range("all", "30daysAgo", "today")],
        vec![
            ReportDefinition::new("a", &[], &["sessions"]),
            ReportDefinition::new("b", &[], &["activeUsers"]),
        ],
        brands(),
    );

    let summary = runner(&stub, tmp.path())
        .with_export_time(stamp)
        .run_batch(&cfg)
        .unwrap();

    assert_eq!(summary.files, vec![tmp.path().join("a_20240315_120000.csv")]);
    assert!(summary.files[0].is_file());
    assert_eq!(summary.export_failures.len(), 1);
    assert_eq!(summary.export_failures[0].report, "b");
    assert!(summary.is_success());
    assert!(!tmp.path().join("b_20240315_120000.csv.tmp").exists());
}

#[test]
fn all_files_of_a_run_share_one_timestamp() {
    let tmp = tempfile::tempdir().unwrap();
    let stub = StubExecutor::new();
    let cfg = common::config(
        vec![common::range("all", "30daysAgo", "today")],
        vec![
            ReportDefinition::new("a", &[], &["sessions"]),
            ReportDefinition::new("b", &[], &["activeUsers"]),
        ],
        brands(),
    );

    let summary = runner(&stub, tmp.path()).run_batch(&cfg).unwrap();

    let suffixes: Vec<String> = summary
        .files
        .iter()
        .map(|p| p.file_name().unwrap().to_str().unwrap()[2..].to_string())
        .collect();
    assert_eq!(suffixes.len(), 2);
    assert_eq!(suffixes[0], suffixes[1]);
}
