use anyhow::Result;
use async_trait::async_trait;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

use get_it_done::app::ports::{HttpClientPort, HttpGetResult};
use get_it_done::config::{Config, SourcesConfig};
use get_it_done::constants::{self, AGGREGATION_VIEWS};
use get_it_done::error::PipelineError;
use get_it_done::pipeline::ingestion::fetch::{self, FetchOutcome};
use get_it_done::pipeline::processing::quality_gate::{CheckStatus, Findings, Validator};
use get_it_done::pipeline::storage::canonical;
use get_it_done::pipeline::Pipeline;
use get_it_done::query::{self, QueryFilter};

const CLOSED_2020: &str = "\
service_request_id,date_requested,date_closed,service_name,status,lat,lng,council_district,comm_plan_name,case_origin,case_age_days
SR100,2020-01-01 08:00:00,2019-12-30 09:00:00,Pothole,Closed,32.72,-117.15,3,Downtown,Phone,abc
SR100,2020-02-01 08:00:00,2020-02-03 09:00:00,Pothole,Closed,32.72,-117.15,3,Downtown,Web,2
SR101,2020-05-05 12:00:00,2020-05-06 12:00:00,Street Light,Closed,,,2,Clairemont,Web,1
";

const OPEN: &str = "\
service_request_id,date_requested,service_name,status,lat,lng,council_district,comm_plan_name,case_origin
SR1,2020-03-02 10:00:00,Pothole,In Process,32.71,-117.16,3,Downtown,Web
SR2,2021-07-04 22:30:00,Graffiti,New,32.75,-117.10,9,Mid-City,Mobile
SR3,not-a-date,Pothole,New,32.70,-117.10,3,Downtown,Phone
";

fn seed_raw(root: &Path) -> Result<Config> {
    let config = Config::with_data_dir(root);
    fs::create_dir_all(&config.paths.raw_dir)?;
    fs::write(config.paths.raw_dir.join("get_it_done_requests_closed_2020_datasd.csv"), CLOSED_2020)?;
    fs::write(config.paths.raw_dir.join("get_it_done_requests_open_datasd.csv"), OPEN)?;
    Ok(config)
}

fn count_sum(dir: &Path, view: &str, column: &str) -> Result<i64> {
    let frame = query::load_view(dir, view, &QueryFilter::default())?;
    Ok(frame.int64(column)?.iter().flatten().sum())
}

#[test]
fn test_transform_builds_canonical_set_and_all_views() -> Result<()> {
    let temp_dir = tempdir()?;
    let config = seed_raw(temp_dir.path())?;

    let result = Pipeline::run(&config)?;
    assert_eq!(result.raw_files, 2);
    assert_eq!(result.raw_rows, 6);
    assert_eq!(result.dropped_rows, 1);
    assert_eq!(result.canonical_rows, 5);
    assert_eq!(result.views.len(), AGGREGATION_VIEWS.len());

    let requests = canonical::read(&config.paths.canonical_path())?;
    assert!(requests.iter().all(|r| r.service_request_id.as_deref() != Some("SR3")));
    let negative = requests
        .iter()
        .find(|r| r.date_closed.is_some() && r.resolution_days == Some(-2))
        .expect("negative resolution row");
    assert_eq!(negative.case_age_days, None);
    assert!(requests.iter().filter(|r| r.source_file.contains("open")).all(|r| r.date_closed.is_none()));

    for view in AGGREGATION_VIEWS {
        assert!(config.paths.view_path(view).is_file(), "{view} missing");
    }
    Ok(())
}

#[test]
fn test_view_counts_sum_to_filtered_canonical_rows() -> Result<()> {
    let temp_dir = tempdir()?;
    let config = seed_raw(temp_dir.path())?;
    Pipeline::run(&config)?;
    let dir = &config.paths.aggregated_dir;

    assert_eq!(count_sum(dir, constants::YEARLY_VOLUME, "total_requests")?, 5);
    assert_eq!(count_sum(dir, constants::MONTHLY_TRENDS, "total_requests")?, 5);
    assert_eq!(count_sum(dir, constants::CASE_ORIGIN, "request_count")?, 5);
    assert_eq!(count_sum(dir, constants::DAY_HOUR_PATTERNS, "request_count")?, 5);
    assert_eq!(count_sum(dir, constants::RESPONSE_BY_NEIGHBORHOOD, "total_requests")?, 5);
    assert_eq!(count_sum(dir, constants::TOP_PROBLEM_TYPES, "total_requests")?, 5);

    let map = query::load_view(dir, constants::MAP_POINTS, &QueryFilter::default())?;
    assert_eq!(map.num_rows(), 4);

    let close_rates = query::load_view(dir, constants::TOP_PROBLEM_TYPES, &QueryFilter::default())?;
    assert!(close_rates
        .float64("close_rate_pct")?
        .iter()
        .flatten()
        .all(|p| (0.0..=100.0).contains(p)));
    Ok(())
}

#[test]
fn test_rerun_is_byte_identical() -> Result<()> {
    let temp_dir = tempdir()?;
    let config = seed_raw(temp_dir.path())?;

    Pipeline::run(&config)?;
    let first: Vec<Vec<u8>> = AGGREGATION_VIEWS
        .iter()
        .map(|v| fs::read(config.paths.view_path(v)))
        .collect::<std::io::Result<_>>()?;
    let first_canonical = fs::read(config.paths.canonical_path())?;

    Pipeline::run(&config)?;
    for (view, bytes) in AGGREGATION_VIEWS.iter().zip(&first) {
        assert_eq!(&fs::read(config.paths.view_path(view))?, bytes, "{view} changed between runs");
    }
    assert_eq!(fs::read(config.paths.canonical_path())?, first_canonical);
    Ok(())
}

#[test]
fn test_validator_reports_seeded_problems() -> Result<()> {
    let temp_dir = tempdir()?;
    let config = seed_raw(temp_dir.path())?;
    Pipeline::run(&config)?;

    let report = Validator::from_config(&config).validate_file(&config.paths.canonical_path())?;
    assert_eq!(report.total_rows, 5);

    let negative = report.check(1).expect("check 1");
    assert_eq!(negative.status, CheckStatus::Fail);
    assert_eq!(negative.affected, 1);

    assert_eq!(report.check(3).expect("check 3").status, CheckStatus::Pass);
    assert_eq!(
        report.check(6).expect("check 6").findings,
        Findings::Duplicates { duplicated_ids: 1, total_rows: 2 }
    );
    assert_eq!(report.check(9).expect("check 9").status, CheckStatus::Pass);
    assert_eq!(report.check(10).expect("check 10").status, CheckStatus::Pass);

    // negative days + missing coordinates + duplicated rows
    assert_eq!(report.issues, 1 + 1 + 2);
    assert!(!report.passed());
    Ok(())
}

#[test]
fn test_setup_failures_write_nothing() -> Result<()> {
    let temp_dir = tempdir()?;
    let config = Config::with_data_dir(temp_dir.path());

    let err = Pipeline::run(&config).unwrap_err();
    assert!(matches!(err, PipelineError::MissingInputDir(_)));

    fs::create_dir_all(&config.paths.raw_dir)?;
    let err = Pipeline::run(&config).unwrap_err();
    assert!(matches!(err, PipelineError::NoInputFiles(_)));
    assert!(!config.paths.canonical_path().exists());

    let err = Validator::from_config(&config)
        .validate_file(&config.paths.canonical_path())
        .unwrap_err();
    assert!(matches!(err, PipelineError::MissingCanonical(_)));
    Ok(())
}

struct StaticHttp;

#[async_trait]
impl HttpClientPort for StaticHttp {
    async fn get(&self, url: &str) -> std::result::Result<HttpGetResult, String> {
        let (status, body) = if url.contains("closed_2017") {
            (403, "")
        } else if url.contains("open") {
            (200, OPEN)
        } else {
            (200, CLOSED_2020)
        };
        Ok(HttpGetResult {
            status,
            bytes: body.as_bytes().to_vec(),
            content_length: body.len() as u64,
        })
    }
}

#[tokio::test]
async fn test_fetch_then_transform() -> Result<()> {
    let temp_dir = tempdir()?;
    let config = Config::with_data_dir(temp_dir.path());
    let sources = fetch::raw_sources(&SourcesConfig {
        first_year: 2017,
        last_year: Some(2018),
        ..SourcesConfig::default()
    });

    let outcomes = fetch::fetch_all(&StaticHttp, &sources, &config.paths.raw_dir, false).await?;
    assert_eq!(outcomes.len(), 3);
    assert!(matches!(&outcomes[1], FetchOutcome::Forbidden { name } if name == "closed_2017"));

    let result = Pipeline::run(&config)?;
    assert_eq!(result.raw_files, 2);
    assert_eq!(result.canonical_rows, 5);
    Ok(())
}
