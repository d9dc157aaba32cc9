//! Read-only access to the aggregation files with the optional filter set
//! used by the API and dashboard.

use chrono::Datelike;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;

use crate::constants::{self, AGGREGATION_VIEWS};
use crate::error::{PipelineError, Result};
use crate::pipeline::processing::aggregate::stats::{close_rate_pct, round1};
use crate::pipeline::storage::frame::{ColumnData, Frame};
use crate::pipeline::storage::parquet_out;

/// Optional row filters; an absent field imposes no constraint
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryFilter {
    pub year_min: Option<i32>,
    pub year_max: Option<i32>,
    pub service_name: Option<String>,
    pub district: Option<i32>,
    pub neighborhood: Option<String>,
}

impl QueryFilter {
    /// Year bounds only, for the views keyed by time
    pub fn years(year_min: Option<i32>, year_max: Option<i32>) -> Self {
        Self {
            year_min,
            year_max,
            ..Self::default()
        }
    }

    fn year_in_range(&self, year: Option<i32>) -> bool {
        if self.year_min.is_none() && self.year_max.is_none() {
            return true;
        }
        match year {
            Some(y) => self.year_min.map_or(true, |min| y >= min) && self.year_max.map_or(true, |max| y <= max),
            None => false,
        }
    }

    /// Row mask over `frame`. Filters on columns the frame lacks are ignored.
    pub fn mask(&self, frame: &Frame) -> Result<Vec<bool>> {
        let mut keep = vec![true; frame.num_rows()];

        if self.year_min.is_some() || self.year_max.is_some() {
            if frame.has_column("request_year") {
                for (k, year) in keep.iter_mut().zip(frame.int32("request_year")?) {
                    *k &= self.year_in_range(*year);
                }
            } else if frame.has_column("request_month_start") {
                for (k, month) in keep.iter_mut().zip(frame.date("request_month_start")?) {
                    *k &= self.year_in_range(month.map(|d| d.year()));
                }
            }
        }

        if let (Some(wanted), true) = (&self.service_name, frame.has_column("service_name")) {
            for (k, v) in keep.iter_mut().zip(frame.utf8("service_name")?) {
                *k &= v.as_deref() == Some(wanted.as_str());
            }
        }
        if let (Some(wanted), true) = (self.district, frame.has_column("council_district")) {
            for (k, v) in keep.iter_mut().zip(frame.int32("council_district")?) {
                *k &= *v == Some(wanted);
            }
        }
        if let (Some(wanted), true) = (&self.neighborhood, frame.has_column("comm_plan_name")) {
            for (k, v) in keep.iter_mut().zip(frame.utf8("comm_plan_name")?) {
                *k &= v.as_deref() == Some(wanted.as_str());
            }
        }

        Ok(keep)
    }
}

fn read_view(dir: &Path, view: &str) -> Result<Frame> {
    if !AGGREGATION_VIEWS.contains(&view) {
        return Err(PipelineError::UnknownView(view.to_string()));
    }
    let path = dir.join(constants::view_file_name(view));
    if !path.is_file() {
        return Err(PipelineError::MissingView(path));
    }
    parquet_out::read_frame(&path)
}

/// Rows of one aggregation view that satisfy `filter`, in stored order
pub fn load_view(dir: &Path, view: &str, filter: &QueryFilter) -> Result<Frame> {
    let frame = read_view(dir, view)?;
    let keep = filter.mask(&frame)?;
    let filtered = frame.filter(&keep);
    debug!("{}: {} of {} rows match", view, filtered.num_rows(), frame.num_rows());
    Ok(filtered)
}

/// Headline numbers for a year range
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub total_requests: u64,
    pub closed_requests: u64,
    pub close_rate_pct: f64,
    /// Mean of the monthly medians, 0 when no month has one
    pub median_resolution_days: f64,
}

pub fn overview(dir: &Path, filter: &QueryFilter) -> Result<Overview> {
    let years = QueryFilter::years(filter.year_min, filter.year_max);

    let yearly = load_view(dir, constants::YEARLY_VOLUME, &years)?;
    let sum = |col: &str| -> Result<u64> {
        Ok(yearly.int64(col)?.iter().flatten().map(|&n| n.max(0) as u64).sum())
    };
    let total_requests = sum("total_requests")?;
    let closed_requests = sum("closed_requests")?;

    let monthly = load_view(dir, constants::MONTHLY_TRENDS, &years)?;
    let medians: Vec<f64> = monthly
        .float64("median_resolution_days")?
        .iter()
        .flatten()
        .copied()
        .collect();
    let median_resolution_days = if medians.is_empty() {
        0.0
    } else {
        round1(medians.iter().sum::<f64>() / medians.len() as f64)
    };

    Ok(Overview {
        total_requests,
        closed_requests,
        close_rate_pct: close_rate_pct(closed_requests, total_requests),
        median_resolution_days,
    })
}

/// One district summed across its service rows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistrictRollup {
    pub council_district: i32,
    pub total_requests: u64,
    pub closed_requests: u64,
    /// Request-weighted mean of the per-service averages
    pub avg_resolution_days: Option<f64>,
    /// Request-weighted mean of the per-service medians
    pub median_resolution_days: Option<f64>,
    pub close_rate_pct: f64,
}

#[derive(Default)]
struct RollupAcc {
    total: u64,
    closed: u64,
    avg_weighted: Option<f64>,
    median_weighted: Option<f64>,
}

fn add_weighted(acc: &mut Option<f64>, value: Option<f64>, weight: u64) {
    if let Some(v) = value {
        *acc = Some(acc.unwrap_or(0.0) + v * weight as f64);
    }
}

/// Resolution metrics per district, rolled up over the matching service rows.
///
/// Weighted means divide by every matching row's requests, including rows
/// without a resolution value. Ordered by district.
pub fn district_rollup(dir: &Path, filter: &QueryFilter) -> Result<Vec<DistrictRollup>> {
    let frame = load_view(dir, constants::RESOLUTION_BY_DISTRICT, filter)?;
    let districts = frame.int32("council_district")?;
    let totals = frame.int64("total_requests")?;
    let closed = frame.int64("closed_requests")?;
    let avgs = frame.float64("avg_resolution_days")?;
    let medians = frame.float64("median_resolution_days")?;

    let mut groups: BTreeMap<i32, RollupAcc> = BTreeMap::new();
    for i in 0..frame.num_rows() {
        let Some(district) = districts[i] else { continue };
        let total = totals[i].unwrap_or(0).max(0) as u64;
        let acc = groups.entry(district).or_default();
        acc.total += total;
        acc.closed += closed[i].unwrap_or(0).max(0) as u64;
        add_weighted(&mut acc.avg_weighted, avgs[i], total);
        add_weighted(&mut acc.median_weighted, medians[i], total);
    }

    let weighted = |sum: Option<f64>, total: u64| {
        sum.filter(|_| total > 0).map(|s| round1(s / total as f64))
    };
    Ok(groups
        .into_iter()
        .map(|(council_district, acc)| DistrictRollup {
            council_district,
            total_requests: acc.total,
            closed_requests: acc.closed,
            avg_resolution_days: weighted(acc.avg_weighted, acc.total),
            median_resolution_days: weighted(acc.median_weighted, acc.total),
            close_rate_pct: close_rate_pct(acc.closed, acc.total),
        })
        .collect())
}

/// Valid values for each filter field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterOptions {
    pub service_names: Vec<String>,
    pub council_districts: Vec<i32>,
    pub neighborhoods: Vec<String>,
    pub years: Vec<i32>,
}

fn distinct<T: Ord + Clone>(values: &[Option<T>]) -> Vec<T> {
    values
        .iter()
        .flatten()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn filter_options(dir: &Path) -> Result<FilterOptions> {
    let all = QueryFilter::default();
    let problems = load_view(dir, constants::TOP_PROBLEM_TYPES, &all)?;
    let districts = load_view(dir, constants::RESOLUTION_BY_DISTRICT, &all)?;
    let neighborhoods = load_view(dir, constants::RESPONSE_BY_NEIGHBORHOOD, &all)?;
    let yearly = load_view(dir, constants::YEARLY_VOLUME, &all)?;

    Ok(FilterOptions {
        service_names: distinct(problems.utf8("service_name")?),
        council_districts: distinct(districts.int32("council_district")?),
        neighborhoods: distinct(neighborhoods.utf8("comm_plan_name")?),
        years: distinct(yearly.int32("request_year")?),
    })
}
