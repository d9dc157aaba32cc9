//! The nine pre-computed views served to the API and dashboard.
//!
//! Every view is recomputed from the full canonical set on each run. Sort
//! orders follow the published column contract; ties fall back to the group
//! key so repeated runs write identical files.

pub mod stats;
pub mod views;

use chrono::NaiveDate;
use metrics::gauge;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

use crate::config::BoundingBox;
use crate::constants::{self, channel_for_origin};
use crate::domain::{is_blank, Request};
use crate::error::Result;
use crate::pipeline::processing::clean::hour_of_day;
use crate::pipeline::storage::parquet_out;
use stats::{cmp_nulls_last, GroupStats};
pub use views::{
    ChannelVolume, DayHourPattern, DistrictResolution, MapPoint, MonthlyTrend,
    NeighborhoodResponse, ProblemType, ServiceMonthlyVolume, ViewRow, YearlyVolume,
};

fn non_blank(value: &Option<String>) -> Option<&str> {
    let v = value.as_deref();
    (!is_blank(v)).then_some(v).flatten()
}

pub fn response_by_neighborhood(requests: &[Request]) -> Vec<NeighborhoodResponse> {
    let mut groups: BTreeMap<(&str, Option<i32>), GroupStats> = BTreeMap::new();
    for r in requests {
        if let Some(name) = non_blank(&r.comm_plan_name) {
            groups
                .entry((name, r.council_district))
                .or_default()
                .add(r.is_closed(), r.resolution_days);
        }
    }

    let mut rows: Vec<_> = groups
        .into_iter()
        .map(|((name, district), mut g)| NeighborhoodResponse {
            comm_plan_name: name.to_string(),
            council_district: district,
            total_requests: g.total,
            closed_requests: g.closed,
            avg_resolution_days: g.avg_days(),
            median_resolution_days: g.median_days(),
            p90_resolution_days: g.p90_days(),
            close_rate_pct: g.close_rate_pct(),
        })
        .collect();
    rows.sort_by(|a, b| {
        b.total_requests
            .cmp(&a.total_requests)
            .then_with(|| a.comm_plan_name.cmp(&b.comm_plan_name))
            .then_with(|| cmp_nulls_last(&a.council_district, &b.council_district))
    });
    rows
}

pub fn volume_by_service_monthly(requests: &[Request]) -> Vec<ServiceMonthlyVolume> {
    let mut groups: BTreeMap<(Option<NaiveDate>, &str), u64> = BTreeMap::new();
    for r in requests {
        if let Some(service) = non_blank(&r.service_name) {
            *groups.entry((r.request_month_start, service)).or_default() += 1;
        }
    }

    let mut rows: Vec<_> = groups
        .into_iter()
        .map(|((month, service), n)| ServiceMonthlyVolume {
            request_month_start: month,
            service_name: service.to_string(),
            request_count: n,
        })
        .collect();
    rows.sort_by(|a, b| {
        cmp_nulls_last(&a.request_month_start, &b.request_month_start)
            .then_with(|| b.request_count.cmp(&a.request_count))
            .then_with(|| a.service_name.cmp(&b.service_name))
    });
    rows
}

pub fn resolution_by_district(requests: &[Request]) -> Vec<DistrictResolution> {
    let mut groups: BTreeMap<(i32, Option<&str>), GroupStats> = BTreeMap::new();
    for r in requests {
        if let Some(district) = r.council_district {
            groups
                .entry((district, r.service_name.as_deref()))
                .or_default()
                .add(r.is_closed(), r.resolution_days);
        }
    }

    let mut rows: Vec<_> = groups
        .into_iter()
        .map(|((district, service), mut g)| DistrictResolution {
            council_district: district,
            service_name: service.map(str::to_string),
            total_requests: g.total,
            closed_requests: g.closed,
            avg_resolution_days: g.avg_days(),
            median_resolution_days: g.median_days(),
            close_rate_pct: g.close_rate_pct(),
        })
        .collect();
    rows.sort_by(|a, b| {
        a.council_district
            .cmp(&b.council_district)
            .then_with(|| b.total_requests.cmp(&a.total_requests))
            .then_with(|| cmp_nulls_last(&a.service_name, &b.service_name))
    });
    rows
}

pub fn monthly_trends(requests: &[Request]) -> Vec<MonthlyTrend> {
    let mut groups: BTreeMap<Option<NaiveDate>, GroupStats> = BTreeMap::new();
    for r in requests {
        groups
            .entry(r.request_month_start)
            .or_default()
            .add(r.is_closed(), r.resolution_days);
    }

    let mut rows: Vec<_> = groups
        .into_iter()
        .map(|(month, mut g)| MonthlyTrend {
            request_month_start: month,
            total_requests: g.total,
            closed_requests: g.closed,
            avg_resolution_days: g.avg_days(),
            median_resolution_days: g.median_days(),
        })
        .collect();
    rows.sort_by(|a, b| cmp_nulls_last(&a.request_month_start, &b.request_month_start));
    rows
}

pub fn top_problem_types(requests: &[Request]) -> Vec<ProblemType> {
    let mut groups: BTreeMap<&str, GroupStats> = BTreeMap::new();
    for r in requests {
        if let Some(service) = non_blank(&r.service_name) {
            groups
                .entry(service)
                .or_default()
                .add(r.is_closed(), r.resolution_days);
        }
    }

    let mut rows: Vec<_> = groups
        .into_iter()
        .map(|(service, mut g)| ProblemType {
            service_name: service.to_string(),
            total_requests: g.total,
            closed_requests: g.closed,
            avg_resolution_days: g.avg_days(),
            median_resolution_days: g.median_days(),
            close_rate_pct: g.close_rate_pct(),
        })
        .collect();
    rows.sort_by_key(|row| Reverse(row.total_requests));
    rows
}

/// Requests with coordinates inside `bbox`, in canonical order
pub fn map_points(requests: &[Request], bbox: &BoundingBox) -> Vec<MapPoint> {
    requests
        .iter()
        .filter_map(|r| match (r.lat, r.lng) {
            (Some(lat), Some(lng)) if bbox.contains(lat, lng) => Some(MapPoint {
                lat,
                lng,
                service_name: r.service_name.clone(),
                request_year: r.request_year,
                comm_plan_name: r.comm_plan_name.clone(),
                council_district: r.council_district,
            }),
            _ => None,
        })
        .collect()
}

pub fn yearly_volume(requests: &[Request]) -> Vec<YearlyVolume> {
    let mut groups: BTreeMap<i32, (u64, u64)> = BTreeMap::new();
    for r in requests {
        if let Some(year) = r.request_year {
            let entry = groups.entry(year).or_default();
            entry.0 += 1;
            if r.is_closed() {
                entry.1 += 1;
            }
        }
    }
    groups
        .into_iter()
        .map(|(year, (total, closed))| YearlyVolume {
            request_year: year,
            total_requests: total,
            closed_requests: closed,
        })
        .collect()
}

pub fn case_origin(requests: &[Request]) -> Vec<ChannelVolume> {
    let mut groups: BTreeMap<&'static str, u64> = BTreeMap::new();
    for r in requests {
        *groups.entry(channel_for_origin(r.case_origin.as_deref())).or_default() += 1;
    }

    let mut rows: Vec<_> = groups
        .into_iter()
        .map(|(channel, n)| ChannelVolume {
            channel: channel.to_string(),
            request_count: n,
        })
        .collect();
    rows.sort_by_key(|row| Reverse(row.request_count));
    rows
}

pub fn day_hour_patterns(requests: &[Request]) -> Vec<DayHourPattern> {
    let mut groups: BTreeMap<(Option<i32>, i32), u64> = BTreeMap::new();
    for r in requests {
        *groups
            .entry((r.request_dow, hour_of_day(r.date_requested)))
            .or_default() += 1;
    }

    let mut rows: Vec<_> = groups
        .into_iter()
        .map(|((dow, hour), n)| DayHourPattern {
            request_dow: dow,
            request_hour: hour,
            request_count: n,
        })
        .collect();
    rows.sort_by(|a, b| {
        cmp_nulls_last(&a.request_dow, &b.request_dow).then_with(|| a.request_hour.cmp(&b.request_hour))
    });
    rows
}

/// All nine views computed from one canonical set
#[derive(Debug, Clone, Serialize)]
pub struct Aggregations {
    pub response_by_neighborhood: Vec<NeighborhoodResponse>,
    pub volume_by_service_monthly: Vec<ServiceMonthlyVolume>,
    pub resolution_by_district: Vec<DistrictResolution>,
    pub monthly_trends: Vec<MonthlyTrend>,
    pub top_problem_types: Vec<ProblemType>,
    pub map_points: Vec<MapPoint>,
    pub yearly_volume: Vec<YearlyVolume>,
    pub case_origin: Vec<ChannelVolume>,
    pub day_hour_patterns: Vec<DayHourPattern>,
}

/// Where one view landed on disk
#[derive(Debug, Clone, Serialize)]
pub struct WrittenView {
    pub view: &'static str,
    pub path: PathBuf,
    pub rows: usize,
    pub bytes: u64,
}

fn write_view<R: ViewRow>(dir: &Path, rows: &[R]) -> Result<WrittenView> {
    let path = dir.join(constants::view_file_name(R::VIEW));
    let bytes = parquet_out::write_frame(&path, &R::to_frame(rows))?;
    gauge!("gid_view_rows", "view" => R::VIEW).set(rows.len() as f64);
    info!("  [agg] {} ({} rows)", R::VIEW, rows.len());
    Ok(WrittenView {
        view: R::VIEW,
        path,
        rows: rows.len(),
        bytes,
    })
}

impl Aggregations {
    #[instrument(skip_all, fields(rows = requests.len()))]
    pub fn build(requests: &[Request], bbox: &BoundingBox) -> Self {
        Self {
            response_by_neighborhood: response_by_neighborhood(requests),
            volume_by_service_monthly: volume_by_service_monthly(requests),
            resolution_by_district: resolution_by_district(requests),
            monthly_trends: monthly_trends(requests),
            top_problem_types: top_problem_types(requests),
            map_points: map_points(requests, bbox),
            yearly_volume: yearly_volume(requests),
            case_origin: case_origin(requests),
            day_hour_patterns: day_hour_patterns(requests),
        }
    }

    /// Replace all nine aggregation files under `dir`
    pub fn write_all(&self, dir: &Path) -> Result<Vec<WrittenView>> {
        Ok(vec![
            write_view(dir, &self.response_by_neighborhood)?,
            write_view(dir, &self.volume_by_service_monthly)?,
            write_view(dir, &self.resolution_by_district)?,
            write_view(dir, &self.monthly_trends)?,
            write_view(dir, &self.top_problem_types)?,
            write_view(dir, &self.map_points)?,
            write_view(dir, &self.yearly_volume)?,
            write_view(dir, &self.case_origin)?,
            write_view(dir, &self.day_hour_patterns)?,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::clean::{parse_timestamp, resolution_days, Calendar};

    struct R<'a> {
        requested: &'a str,
        closed: Option<&'a str>,
        service: Option<&'a str>,
        plan: Option<&'a str>,
        district: Option<i32>,
        origin: Option<&'a str>,
        coords: Option<(f64, f64)>,
    }

    impl Default for R<'_> {
        fn default() -> Self {
            Self {
                requested: "2020-01-06 09:15:00",
                closed: None,
                service: Some("Pothole"),
                plan: Some("Downtown"),
                district: Some(3),
                origin: Some("Web"),
                coords: Some((32.71, -117.16)),
            }
        }
    }

    fn build(r: R) -> Request {
        let date_requested = parse_timestamp(Some(r.requested)).unwrap();
        let date_closed = parse_timestamp(r.closed);
        let cal = Calendar::derive(Some(date_requested));
        Request {
            service_request_id: None,
            service_request_parent_id: None,
            sap_notification_number: None,
            date_requested,
            date_closed,
            case_age_days: None,
            case_record_type: None,
            service_name: r.service.map(str::to_string),
            service_name_detail: None,
            status: None,
            lat: r.coords.map(|c| c.0),
            lng: r.coords.map(|c| c.1),
            street_address: None,
            zipcode: None,
            council_district: r.district,
            comm_plan_code: None,
            comm_plan_name: r.plan.map(str::to_string),
            park_name: None,
            case_origin: r.origin.map(str::to_string),
            referred: None,
            resolution_days: resolution_days(Some(date_requested), date_closed),
            request_year: cal.map(|c| c.year),
            request_month: cal.map(|c| c.month),
            request_quarter: cal.map(|c| c.quarter),
            request_dow: cal.map(|c| c.dow),
            request_month_start: cal.map(|c| c.month_start),
            source_file: "t.csv".into(),
        }
    }

    fn sample() -> Vec<Request> {
        vec![
            build(R { closed: Some("2020-01-08"), ..R::default() }),
            build(R { closed: Some("2020-01-16"), ..R::default() }),
            build(R { service: Some("Graffiti"), origin: Some("Mobile"), ..R::default() }),
            build(R {
                requested: "2021-03-02 18:00:00",
                service: Some(""),
                plan: Some("Mid-City"),
                district: None,
                origin: None,
                coords: Some((40.0, -117.0)),
                ..R::default()
            }),
            build(R {
                requested: "2021-03-05",
                closed: Some("2021-03-01"),
                service: None,
                plan: None,
                origin: Some("Phone"),
                coords: None,
                ..R::default()
            }),
        ]
    }

    #[test]
    fn test_neighborhood_metrics_and_order() {
        let rows = response_by_neighborhood(&sample());
        // Rows without a plan name are excluded
        assert_eq!(rows.iter().map(|r| r.total_requests).sum::<u64>(), 4);
        assert_eq!(rows[0].comm_plan_name, "Downtown");
        assert_eq!(rows[0].total_requests, 3);
        assert_eq!(rows[0].closed_requests, 2);
        assert_eq!(rows[0].avg_resolution_days, Some(6.0));
        assert_eq!(rows[0].median_resolution_days, Some(6.0));
        assert!((rows[0].p90_resolution_days.unwrap() - 9.2).abs() < 1e-9);
        assert_eq!(rows[0].close_rate_pct, 66.7);
        assert_eq!(rows[1].comm_plan_name, "Mid-City");
        assert_eq!(rows[1].council_district, None);
        assert_eq!(rows[1].avg_resolution_days, None);
    }

    #[test]
    fn test_problem_types_exclude_blank_service_names() {
        let rows = top_problem_types(&sample());
        let names: Vec<_> = rows.iter().map(|r| r.service_name.as_str()).collect();
        assert_eq!(names, vec!["Pothole", "Graffiti"]);
        assert_eq!(rows[0].total_requests, 2);
        assert_eq!(rows[1].close_rate_pct, 0.0);
    }

    #[test]
    fn test_district_view_keeps_null_service_and_negative_days() {
        let rows = resolution_by_district(&sample());
        assert_eq!(rows.iter().map(|r| r.total_requests).sum::<u64>(), 4);
        assert!(rows.iter().all(|r| r.council_district == 3));
        assert_eq!(rows[0].service_name.as_deref(), Some("Pothole"));
        let unnamed = rows.iter().find(|r| r.service_name.is_none()).unwrap();
        assert_eq!(unnamed.avg_resolution_days, Some(-4.0));
    }

    #[test]
    fn test_monthly_and_service_monthly_order() {
        let reqs = sample();
        let trends = monthly_trends(&reqs);
        let months: Vec<_> = trends.iter().map(|t| t.request_month_start.unwrap().to_string()).collect();
        assert_eq!(months, vec!["2020-01-01", "2021-03-01"]);
        assert_eq!(trends[0].total_requests, 3);

        let volume = volume_by_service_monthly(&reqs);
        assert_eq!(volume.len(), 2);
        assert_eq!(volume[0].service_name, "Pothole");
        assert_eq!(volume[0].request_count, 2);
        assert_eq!(volume[1].service_name, "Graffiti");
    }

    #[test]
    fn test_map_points_filter_by_bounding_box() {
        let points = map_points(&sample(), &BoundingBox::default());
        assert_eq!(points.len(), 3);
        assert!(points.iter().all(|p| p.lat < 33.3));
    }

    #[test]
    fn test_yearly_channel_and_day_hour() {
        let reqs = sample();
        let years = yearly_volume(&reqs);
        assert_eq!(years.len(), 2);
        assert_eq!((years[0].request_year, years[0].total_requests, years[0].closed_requests), (2020, 3, 2));
        assert_eq!((years[1].request_year, years[1].total_requests, years[1].closed_requests), (2021, 2, 1));

        let channels = case_origin(&reqs);
        assert_eq!(channels[0].channel, "Web");
        assert_eq!(channels[0].request_count, 2);
        assert_eq!(channels.iter().map(|c| c.request_count).sum::<u64>(), 5);
        // Ties fall back to channel name
        let rest: Vec<_> = channels[1..].iter().map(|c| c.channel.as_str()).collect();
        assert_eq!(rest, vec!["Mobile App", "Other", "Phone"]);

        let dh = day_hour_patterns(&reqs);
        // 2020-01-06 is a Monday; 2021-03-02 a Tuesday; 2021-03-05 a Friday
        assert_eq!(
            dh.iter().map(|p| (p.request_dow.unwrap(), p.request_hour, p.request_count)).collect::<Vec<_>>(),
            vec![(1, 9, 3), (2, 18, 1), (5, 0, 1)]
        );
    }
}
