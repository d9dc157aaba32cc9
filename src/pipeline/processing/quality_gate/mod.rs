//! Data-quality validation over the canonical set and the aggregation files.
//!
//! Ten fixed checks run in order. No check depends on another and nothing is
//! modified; each one reports a status, the number of affected records and
//! how many of those count towards the overall issue total.

mod report;

use chrono::NaiveDate;
use metrics::gauge;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use crate::config::{BoundingBox, Config};
use crate::constants::{
    self, AGGREGATION_VIEWS, EXTREME_RESOLUTION_DAYS, MISSING_FIELD_WARN_PCT,
    NEGATIVE_EXAMPLE_LIMIT, YOY_ANOMALY_PCT,
};
use crate::domain::{is_blank, Request};
use crate::error::Result;
use crate::pipeline::processing::aggregate::stats::round1;
use crate::pipeline::storage::{canonical, parquet_out};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Info,
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CheckStatus::Pass => "PASS",
            CheckStatus::Warn => "WARN",
            CheckStatus::Fail => "FAIL",
            CheckStatus::Info => "INFO",
        };
        f.pad(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NegativeExample {
    pub service_request_id: Option<String>,
    pub service_name: Option<String>,
    pub resolution_days: i64,
    pub date_requested: NaiveDate,
    pub date_closed: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketCount {
    pub bucket: &'static str,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingField {
    pub field: &'static str,
    pub missing: u64,
    pub pct: f64,
    pub status: CheckStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusShare {
    pub status: Option<String>,
    pub count: u64,
    pub pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearChange {
    pub year: i32,
    pub count: u64,
    /// Percent change from the previous listed year; absent for the first year
    pub change_pct: Option<f64>,
    pub anomaly: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileCheck {
    pub file: String,
    pub status: CheckStatus,
    pub rows: Option<u64>,
    pub bytes: Option<u64>,
    pub error: Option<String>,
}

/// Check-specific detail carried alongside the status
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Findings {
    None,
    NegativeResolution {
        examples: Vec<NegativeExample>,
    },
    GeoOutliers {
        lat_range: Option<(f64, f64)>,
        lng_range: Option<(f64, f64)>,
    },
    ExtremeResolution {
        max_days: Option<i64>,
        buckets: Vec<BucketCount>,
    },
    MissingFields {
        fields: Vec<MissingField>,
    },
    Duplicates {
        duplicated_ids: u64,
        total_rows: u64,
    },
    StatusDistribution {
        statuses: Vec<StatusShare>,
    },
    YearOverYear {
        years: Vec<YearChange>,
    },
    AggregationFiles {
        files: Vec<FileCheck>,
    },
    MapConsistency {
        map_points: Option<u64>,
        expected: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub number: u8,
    pub title: &'static str,
    pub status: CheckStatus,
    /// Records (or files) the check flagged
    pub affected: u64,
    /// Contribution to the report's issue total
    pub issues: u64,
    pub findings: Findings,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub total_rows: u64,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub checks: Vec<CheckResult>,
    pub issues: u64,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.issues == 0
    }

    pub fn check(&self, number: u8) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.number == number)
    }
}

fn pct(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

fn fail_if_any(count: u64) -> CheckStatus {
    if count > 0 {
        CheckStatus::Fail
    } else {
        CheckStatus::Pass
    }
}

pub fn check_negative_resolution(requests: &[Request]) -> CheckResult {
    let mut negatives: Vec<&Request> = requests
        .iter()
        .filter(|r| r.resolution_days.is_some_and(|d| d < 0))
        .collect();
    let count = negatives.len() as u64;
    negatives.sort_by_key(|r| r.resolution_days);

    let examples = negatives
        .iter()
        .take(NEGATIVE_EXAMPLE_LIMIT)
        .map(|r| NegativeExample {
            service_request_id: r.service_request_id.clone(),
            service_name: r.service_name.clone(),
            resolution_days: r.resolution_days.unwrap_or_default(),
            date_requested: r.date_requested.date(),
            date_closed: r.date_closed.map(|d| d.date()),
        })
        .collect();

    CheckResult {
        number: 1,
        title: "Negative resolution days (date_closed < date_requested)",
        status: fail_if_any(count),
        affected: count,
        issues: count,
        findings: Findings::NegativeResolution { examples },
    }
}

fn min_max(acc: Option<(f64, f64)>, v: f64) -> Option<(f64, f64)> {
    Some(match acc {
        Some((lo, hi)) => (lo.min(v), hi.max(v)),
        None => (v, v),
    })
}

pub fn check_geo_outliers(requests: &[Request], bbox: &BoundingBox) -> CheckResult {
    let mut count = 0u64;
    let mut lat_range = None;
    let mut lng_range = None;
    for r in requests {
        if let (Some(lat), Some(lng)) = (r.lat, r.lng) {
            if !bbox.contains(lat, lng) {
                count += 1;
                lat_range = min_max(lat_range, lat);
                lng_range = min_max(lng_range, lng);
            }
        }
    }

    CheckResult {
        number: 2,
        title: "Geographic outliers (outside city bounds)",
        status: fail_if_any(count),
        affected: count,
        issues: count,
        findings: Findings::GeoOutliers { lat_range, lng_range },
    }
}

pub fn check_status_date_consistency(requests: &[Request]) -> CheckResult {
    let count = requests
        .iter()
        .filter(|r| r.status.as_deref() == Some("Closed") && r.date_closed.is_none())
        .count() as u64;

    CheckResult {
        number: 3,
        title: "Status/date consistency (Closed but no date_closed)",
        status: fail_if_any(count),
        affected: count,
        issues: count,
        findings: Findings::None,
    }
}

fn extreme_bucket(days: i64) -> &'static str {
    match days {
        731..=1095 => "2-3 years",
        1096..=1825 => "3-5 years",
        _ => "5+ years",
    }
}

pub fn check_extreme_resolution(requests: &[Request]) -> CheckResult {
    let mut count = 0u64;
    let mut max_days = None;
    // bucket -> (count, min days seen)
    let mut buckets: HashMap<&'static str, (u64, i64)> = HashMap::new();
    for days in requests.iter().filter_map(|r| r.resolution_days) {
        max_days = max_days.max(Some(days));
        if days > EXTREME_RESOLUTION_DAYS {
            count += 1;
            let entry = buckets.entry(extreme_bucket(days)).or_insert((0, days));
            entry.0 += 1;
            entry.1 = entry.1.min(days);
        }
    }

    let mut ordered: Vec<_> = buckets.into_iter().collect();
    ordered.sort_by_key(|(_, (_, min_days))| *min_days);
    let buckets = ordered
        .into_iter()
        .map(|(bucket, (count, _))| BucketCount { bucket, count })
        .collect();

    CheckResult {
        number: 4,
        title: "Extreme resolution times (> 2 years)",
        status: if count > 0 { CheckStatus::Warn } else { CheckStatus::Pass },
        affected: count,
        issues: count,
        findings: Findings::ExtremeResolution { max_days, buckets },
    }
}

pub fn check_missing_fields(requests: &[Request]) -> CheckResult {
    let total = requests.len() as u64;
    let checks: [(&'static str, fn(&Request) -> bool); 5] = [
        ("service_name", |r| is_blank(r.service_name.as_deref())),
        ("council_district", |r| r.council_district.is_none()),
        ("lat/lng", |r| r.lat.is_none() || r.lng.is_none()),
        ("comm_plan_name", |r| is_blank(r.comm_plan_name.as_deref())),
        ("status", |r| is_blank(r.status.as_deref())),
    ];

    let fields: Vec<MissingField> = checks
        .iter()
        .map(|(field, is_missing)| {
            let missing = requests.iter().filter(|r| is_missing(r)).count() as u64;
            let share = pct(missing, total);
            let status = if share > MISSING_FIELD_WARN_PCT {
                CheckStatus::Warn
            } else if missing > 0 {
                CheckStatus::Info
            } else {
                CheckStatus::Pass
            };
            MissingField { field, missing, pct: share, status }
        })
        .collect();

    let affected: u64 = fields.iter().map(|f| f.missing).sum();
    let status = if fields.iter().any(|f| f.status == CheckStatus::Warn) {
        CheckStatus::Warn
    } else if affected > 0 {
        CheckStatus::Info
    } else {
        CheckStatus::Pass
    };

    CheckResult {
        number: 5,
        title: "Missing critical fields",
        status,
        affected,
        issues: affected,
        findings: Findings::MissingFields { fields },
    }
}

pub fn check_duplicate_ids(requests: &[Request]) -> CheckResult {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for id in requests.iter().filter_map(|r| r.service_request_id.as_deref()) {
        *counts.entry(id).or_default() += 1;
    }
    let (duplicated_ids, total_rows) = counts
        .values()
        .filter(|&&n| n > 1)
        .fold((0u64, 0u64), |(ids, rows), &n| (ids + 1, rows + n));

    CheckResult {
        number: 6,
        title: "Duplicate service_request_id",
        status: fail_if_any(duplicated_ids),
        affected: total_rows,
        issues: total_rows,
        findings: Findings::Duplicates { duplicated_ids, total_rows },
    }
}

pub fn check_status_distribution(requests: &[Request]) -> CheckResult {
    let total = requests.len() as u64;
    let mut counts: BTreeMap<Option<&str>, u64> = BTreeMap::new();
    for r in requests {
        *counts.entry(r.status.as_deref()).or_default() += 1;
    }
    let mut statuses: Vec<StatusShare> = counts
        .into_iter()
        .map(|(status, count)| StatusShare {
            status: status.map(str::to_string),
            count,
            pct: round1(pct(count, total)),
        })
        .collect();
    statuses.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.status.cmp(&b.status)));

    CheckResult {
        number: 7,
        title: "Status distribution",
        status: CheckStatus::Info,
        affected: 0,
        issues: 0,
        findings: Findings::StatusDistribution { statuses },
    }
}

pub fn check_year_over_year(requests: &[Request]) -> CheckResult {
    let mut counts: BTreeMap<i32, u64> = BTreeMap::new();
    for year in requests.iter().filter_map(|r| r.request_year) {
        *counts.entry(year).or_default() += 1;
    }

    let mut prev: Option<u64> = None;
    let mut years = Vec::with_capacity(counts.len());
    for (year, count) in counts {
        let change_pct = prev
            .filter(|&p| p > 0)
            .map(|p| (count as f64 - p as f64) / p as f64 * 100.0);
        years.push(YearChange {
            year,
            count,
            change_pct,
            anomaly: change_pct.is_some_and(|c| c.abs() > YOY_ANOMALY_PCT),
        });
        prev = Some(count);
    }
    let anomalies = years.iter().filter(|y| y.anomaly).count() as u64;

    CheckResult {
        number: 8,
        title: "Year-over-year volume (>50% change flagged)",
        status: CheckStatus::Info,
        affected: anomalies,
        issues: 0,
        findings: Findings::YearOverYear { years },
    }
}

pub fn check_aggregation_files(aggregated_dir: &Path) -> CheckResult {
    let files: Vec<FileCheck> = AGGREGATION_VIEWS
        .iter()
        .map(|view| {
            let file = constants::view_file_name(view);
            let path = aggregated_dir.join(&file);
            if !path.is_file() {
                return FileCheck { file, status: CheckStatus::Fail, rows: None, bytes: None, error: None };
            }
            let bytes = std::fs::metadata(&path).map(|m| m.len()).ok();
            match parquet_out::row_count(&path) {
                Ok(rows) => FileCheck { file, status: CheckStatus::Pass, rows: Some(rows), bytes, error: None },
                Err(e) => {
                    warn!("{} is present but unreadable: {}", file, e);
                    FileCheck {
                        file,
                        status: CheckStatus::Fail,
                        rows: None,
                        bytes,
                        error: Some(e.to_string()),
                    }
                }
            }
        })
        .collect();

    let failed = files.iter().filter(|f| f.status == CheckStatus::Fail).count() as u64;
    CheckResult {
        number: 9,
        title: "Aggregation files",
        status: fail_if_any(failed),
        affected: failed,
        issues: failed,
        findings: Findings::AggregationFiles { files },
    }
}

pub fn check_map_consistency(requests: &[Request], bbox: &BoundingBox, aggregated_dir: &Path) -> CheckResult {
    let expected = requests
        .iter()
        .filter(|r| bbox.contains_pair(r.lat, r.lng))
        .count() as u64;
    let path = aggregated_dir.join(constants::view_file_name(constants::MAP_POINTS));
    let map_points = if path.is_file() {
        parquet_out::row_count(&path).ok()
    } else {
        None
    };

    let (status, issues) = match map_points {
        None => (CheckStatus::Info, 0),
        Some(n) if n == expected => (CheckStatus::Pass, 0),
        Some(_) => (CheckStatus::Fail, 1),
    };

    CheckResult {
        number: 10,
        title: "Map points consistency",
        status,
        affected: issues,
        issues,
        findings: Findings::MapConsistency { map_points, expected },
    }
}

/// Runs the fixed battery of checks
pub struct Validator {
    bbox: BoundingBox,
    aggregated_dir: PathBuf,
}

impl Validator {
    pub fn new(bbox: BoundingBox, aggregated_dir: impl Into<PathBuf>) -> Self {
        Self {
            bbox,
            aggregated_dir: aggregated_dir.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.geo, config.paths.aggregated_dir.clone())
    }

    /// Validate the persisted canonical file. A missing file is fatal.
    #[instrument(skip(self), fields(canonical = %canonical_path.display()))]
    pub fn validate_file(&self, canonical_path: &Path) -> Result<ValidationReport> {
        let requests = canonical::read(canonical_path)?;
        Ok(self.validate(&requests))
    }

    pub fn validate(&self, requests: &[Request]) -> ValidationReport {
        let date_range = requests
            .iter()
            .map(|r| r.date_requested.date())
            .fold(None, |acc: Option<(NaiveDate, NaiveDate)>, d| {
                Some(match acc {
                    Some((lo, hi)) => (lo.min(d), hi.max(d)),
                    None => (d, d),
                })
            });

        let checks = vec![
            check_negative_resolution(requests),
            check_geo_outliers(requests, &self.bbox),
            check_status_date_consistency(requests),
            check_extreme_resolution(requests),
            check_missing_fields(requests),
            check_duplicate_ids(requests),
            check_status_distribution(requests),
            check_year_over_year(requests),
            check_aggregation_files(&self.aggregated_dir),
            check_map_consistency(requests, &self.bbox, &self.aggregated_dir),
        ];
        let issues: u64 = checks.iter().map(|c| c.issues).sum();

        for c in &checks {
            info!(check = c.number, status = %c.status, affected = c.affected, "{}", c.title);
        }
        gauge!("gid_validation_issues").set(issues as f64);

        ValidationReport {
            total_rows: requests.len() as u64,
            date_range,
            checks,
            issues,
        }
    }
}
