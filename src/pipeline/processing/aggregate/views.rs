//! Row types of the nine aggregation views and their Parquet column layout.

use chrono::NaiveDate;
use serde::Serialize;

use crate::constants;
use crate::pipeline::storage::frame::{col, Frame};

/// A row type persisted as one aggregation file
pub trait ViewRow: Sized {
    const VIEW: &'static str;

    fn to_frame(rows: &[Self]) -> Frame;
}

fn count(v: u64) -> Option<i64> {
    Some(v as i64)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NeighborhoodResponse {
    pub comm_plan_name: String,
    pub council_district: Option<i32>,
    pub total_requests: u64,
    pub closed_requests: u64,
    pub avg_resolution_days: Option<f64>,
    pub median_resolution_days: Option<f64>,
    pub p90_resolution_days: Option<f64>,
    pub close_rate_pct: f64,
}

impl ViewRow for NeighborhoodResponse {
    const VIEW: &'static str = constants::RESPONSE_BY_NEIGHBORHOOD;

    fn to_frame(rows: &[Self]) -> Frame {
        Frame::new()
            .with_column("comm_plan_name", col!(rows, Utf8, |r| Some(r.comm_plan_name.clone())))
            .with_column("council_district", col!(rows, Int32, |r| r.council_district))
            .with_column("total_requests", col!(rows, Int64, |r| count(r.total_requests)))
            .with_column("closed_requests", col!(rows, Int64, |r| count(r.closed_requests)))
            .with_column("avg_resolution_days", col!(rows, Float64, |r| r.avg_resolution_days))
            .with_column("median_resolution_days", col!(rows, Float64, |r| r.median_resolution_days))
            .with_column("p90_resolution_days", col!(rows, Float64, |r| r.p90_resolution_days))
            .with_column("close_rate_pct", col!(rows, Float64, |r| Some(r.close_rate_pct)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceMonthlyVolume {
    pub request_month_start: Option<NaiveDate>,
    pub service_name: String,
    pub request_count: u64,
}

impl ViewRow for ServiceMonthlyVolume {
    const VIEW: &'static str = constants::VOLUME_BY_SERVICE_MONTHLY;

    fn to_frame(rows: &[Self]) -> Frame {
        Frame::new()
            .with_column("request_month_start", col!(rows, Date, |r| r.request_month_start))
            .with_column("service_name", col!(rows, Utf8, |r| Some(r.service_name.clone())))
            .with_column("request_count", col!(rows, Int64, |r| count(r.request_count)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistrictResolution {
    pub council_district: i32,
    pub service_name: Option<String>,
    pub total_requests: u64,
    pub closed_requests: u64,
    pub avg_resolution_days: Option<f64>,
    pub median_resolution_days: Option<f64>,
    pub close_rate_pct: f64,
}

impl ViewRow for DistrictResolution {
    const VIEW: &'static str = constants::RESOLUTION_BY_DISTRICT;

    fn to_frame(rows: &[Self]) -> Frame {
        Frame::new()
            .with_column("council_district", col!(rows, Int32, |r| Some(r.council_district)))
            .with_column("service_name", col!(rows, Utf8, |r| r.service_name.clone()))
            .with_column("total_requests", col!(rows, Int64, |r| count(r.total_requests)))
            .with_column("closed_requests", col!(rows, Int64, |r| count(r.closed_requests)))
            .with_column("avg_resolution_days", col!(rows, Float64, |r| r.avg_resolution_days))
            .with_column("median_resolution_days", col!(rows, Float64, |r| r.median_resolution_days))
            .with_column("close_rate_pct", col!(rows, Float64, |r| Some(r.close_rate_pct)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTrend {
    pub request_month_start: Option<NaiveDate>,
    pub total_requests: u64,
    pub closed_requests: u64,
    pub avg_resolution_days: Option<f64>,
    pub median_resolution_days: Option<f64>,
}

impl ViewRow for MonthlyTrend {
    const VIEW: &'static str = constants::MONTHLY_TRENDS;

    fn to_frame(rows: &[Self]) -> Frame {
        Frame::new()
            .with_column("request_month_start", col!(rows, Date, |r| r.request_month_start))
            .with_column("total_requests", col!(rows, Int64, |r| count(r.total_requests)))
            .with_column("closed_requests", col!(rows, Int64, |r| count(r.closed_requests)))
            .with_column("avg_resolution_days", col!(rows, Float64, |r| r.avg_resolution_days))
            .with_column("median_resolution_days", col!(rows, Float64, |r| r.median_resolution_days))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProblemType {
    pub service_name: String,
    pub total_requests: u64,
    pub closed_requests: u64,
    pub avg_resolution_days: Option<f64>,
    pub median_resolution_days: Option<f64>,
    pub close_rate_pct: f64,
}

impl ViewRow for ProblemType {
    const VIEW: &'static str = constants::TOP_PROBLEM_TYPES;

    fn to_frame(rows: &[Self]) -> Frame {
        Frame::new()
            .with_column("service_name", col!(rows, Utf8, |r| Some(r.service_name.clone())))
            .with_column("total_requests", col!(rows, Int64, |r| count(r.total_requests)))
            .with_column("closed_requests", col!(rows, Int64, |r| count(r.closed_requests)))
            .with_column("avg_resolution_days", col!(rows, Float64, |r| r.avg_resolution_days))
            .with_column("median_resolution_days", col!(rows, Float64, |r| r.median_resolution_days))
            .with_column("close_rate_pct", col!(rows, Float64, |r| Some(r.close_rate_pct)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapPoint {
    pub lat: f64,
    pub lng: f64,
    pub service_name: Option<String>,
    pub request_year: Option<i32>,
    pub comm_plan_name: Option<String>,
    pub council_district: Option<i32>,
}

impl ViewRow for MapPoint {
    const VIEW: &'static str = constants::MAP_POINTS;

    fn to_frame(rows: &[Self]) -> Frame {
        Frame::new()
            .with_column("lat", col!(rows, Float64, |r| Some(r.lat)))
            .with_column("lng", col!(rows, Float64, |r| Some(r.lng)))
            .with_column("service_name", col!(rows, Utf8, |r| r.service_name.clone()))
            .with_column("request_year", col!(rows, Int32, |r| r.request_year))
            .with_column("comm_plan_name", col!(rows, Utf8, |r| r.comm_plan_name.clone()))
            .with_column("council_district", col!(rows, Int32, |r| r.council_district))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearlyVolume {
    pub request_year: i32,
    pub total_requests: u64,
    pub closed_requests: u64,
}

impl ViewRow for YearlyVolume {
    const VIEW: &'static str = constants::YEARLY_VOLUME;

    fn to_frame(rows: &[Self]) -> Frame {
        Frame::new()
            .with_column("request_year", col!(rows, Int32, |r| Some(r.request_year)))
            .with_column("total_requests", col!(rows, Int64, |r| count(r.total_requests)))
            .with_column("closed_requests", col!(rows, Int64, |r| count(r.closed_requests)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelVolume {
    pub channel: String,
    pub request_count: u64,
}

impl ViewRow for ChannelVolume {
    const VIEW: &'static str = constants::CASE_ORIGIN;

    fn to_frame(rows: &[Self]) -> Frame {
        Frame::new()
            .with_column("channel", col!(rows, Utf8, |r| Some(r.channel.clone())))
            .with_column("request_count", col!(rows, Int64, |r| count(r.request_count)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayHourPattern {
    /// 0 = Sunday .. 6 = Saturday
    pub request_dow: Option<i32>,
    pub request_hour: i32,
    pub request_count: u64,
}

impl ViewRow for DayHourPattern {
    const VIEW: &'static str = constants::DAY_HOUR_PATTERNS;

    fn to_frame(rows: &[Self]) -> Frame {
        Frame::new()
            .with_column("request_dow", col!(rows, Int32, |r| r.request_dow))
            .with_column("request_hour", col!(rows, Int32, |r| Some(r.request_hour)))
            .with_column("request_count", col!(rows, Int64, |r| count(r.request_count)))
    }
}
