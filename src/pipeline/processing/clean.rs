//! Raw rows to canonical [`Request`]s.
//!
//! Every field is a try-cast: a value that does not parse becomes `None` and
//! the row survives. The one exception is `date_requested`; a row without a
//! parseable request timestamp is left out of the canonical set and counted.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use metrics::counter;
use tracing::{info, instrument};

use crate::domain::{RawRecord, RawTable, Request};

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parse a timestamp the way the source extracts write them, or `None`.
pub fn parse_timestamp(raw: Option<&str>) -> Option<NaiveDateTime> {
    let s = raw?.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts);
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.naive_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Integer cast; accepts an integral decimal such as `"3.0"`.
pub fn parse_int(raw: Option<&str>) -> Option<i32> {
    let s = raw?.trim();
    if let Ok(v) = s.parse::<i32>() {
        return Some(v);
    }
    let f = s.parse::<f64>().ok()?;
    if f.is_finite() && f.fract() == 0.0 && f >= i32::MIN as f64 && f <= i32::MAX as f64 {
        Some(f as i32)
    } else {
        None
    }
}

pub fn parse_double(raw: Option<&str>) -> Option<f64> {
    raw?.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_text(raw: Option<&str>) -> Option<String> {
    raw.filter(|s| !s.is_empty()).map(str::to_string)
}

/// Signed whole-day difference between the calendar dates of the two timestamps
pub fn resolution_days(requested: Option<NaiveDateTime>, closed: Option<NaiveDateTime>) -> Option<i64> {
    match (requested, closed) {
        (Some(r), Some(c)) => Some((c.date() - r.date()).num_days()),
        _ => None,
    }
}

/// Calendar buckets derived from the request timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    pub year: i32,
    pub month: i32,
    pub quarter: i32,
    /// 0 = Sunday .. 6 = Saturday
    pub dow: i32,
    pub month_start: NaiveDate,
}

impl Calendar {
    pub fn derive(requested: Option<NaiveDateTime>) -> Option<Self> {
        let ts = requested?;
        let date = ts.date();
        let month = date.month();
        Some(Self {
            year: date.year(),
            month: month as i32,
            quarter: ((month - 1) / 3 + 1) as i32,
            dow: date.weekday().num_days_from_sunday() as i32,
            month_start: date.with_day(1)?,
        })
    }
}

/// Hour of day of the stored timestamp, 0-23
pub fn hour_of_day(ts: NaiveDateTime) -> i32 {
    ts.hour() as i32
}

/// Column positions of the canonical source fields within a [`RawTable`]
struct FieldIndex {
    service_request_id: Option<usize>,
    service_request_parent_id: Option<usize>,
    sap_notification_number: Option<usize>,
    date_requested: Option<usize>,
    date_closed: Option<usize>,
    case_age_days: Option<usize>,
    case_record_type: Option<usize>,
    service_name: Option<usize>,
    service_name_detail: Option<usize>,
    status: Option<usize>,
    lat: Option<usize>,
    lng: Option<usize>,
    street_address: Option<usize>,
    zipcode: Option<usize>,
    council_district: Option<usize>,
    comm_plan_code: Option<usize>,
    comm_plan_name: Option<usize>,
    park_name: Option<usize>,
    case_origin: Option<usize>,
    referred: Option<usize>,
}

impl FieldIndex {
    fn resolve(table: &RawTable) -> Self {
        let idx = |name: &str| table.column_index(name);
        Self {
            service_request_id: idx("service_request_id"),
            service_request_parent_id: idx("service_request_parent_id"),
            sap_notification_number: idx("sap_notification_number"),
            date_requested: idx("date_requested"),
            date_closed: idx("date_closed"),
            case_age_days: idx("case_age_days"),
            case_record_type: idx("case_record_type"),
            service_name: idx("service_name"),
            service_name_detail: idx("service_name_detail"),
            status: idx("status"),
            lat: idx("lat"),
            lng: idx("lng"),
            street_address: idx("street_address"),
            zipcode: idx("zipcode"),
            council_district: idx("council_district"),
            comm_plan_code: idx("comm_plan_code"),
            comm_plan_name: idx("comm_plan_name"),
            park_name: idx("park_name"),
            case_origin: idx("case_origin"),
            referred: idx("referred"),
        }
    }
}

/// Cast one raw row; `None` when `date_requested` does not parse.
fn clean_record(raw: &RawRecord, f: &FieldIndex) -> Option<Request> {
    let date_requested = parse_timestamp(raw.get(f.date_requested))?;
    let date_closed = parse_timestamp(raw.get(f.date_closed));
    let calendar = Calendar::derive(Some(date_requested));

    Some(Request {
        service_request_id: parse_text(raw.get(f.service_request_id)),
        service_request_parent_id: parse_text(raw.get(f.service_request_parent_id)),
        sap_notification_number: parse_text(raw.get(f.sap_notification_number)),
        date_requested,
        date_closed,
        case_age_days: parse_int(raw.get(f.case_age_days)),
        case_record_type: parse_text(raw.get(f.case_record_type)),
        service_name: parse_text(raw.get(f.service_name)),
        service_name_detail: parse_text(raw.get(f.service_name_detail)),
        status: parse_text(raw.get(f.status)),
        lat: parse_double(raw.get(f.lat)),
        lng: parse_double(raw.get(f.lng)),
        street_address: parse_text(raw.get(f.street_address)),
        zipcode: parse_text(raw.get(f.zipcode)),
        council_district: parse_int(raw.get(f.council_district)),
        comm_plan_code: parse_int(raw.get(f.comm_plan_code)),
        comm_plan_name: parse_text(raw.get(f.comm_plan_name)),
        park_name: parse_text(raw.get(f.park_name)),
        case_origin: parse_text(raw.get(f.case_origin)),
        referred: parse_text(raw.get(f.referred)),
        resolution_days: resolution_days(Some(date_requested), date_closed),
        request_year: calendar.map(|c| c.year),
        request_month: calendar.map(|c| c.month),
        request_quarter: calendar.map(|c| c.quarter),
        request_dow: calendar.map(|c| c.dow),
        request_month_start: calendar.map(|c| c.month_start),
        source_file: raw.source_file.to_string(),
    })
}

#[derive(Debug)]
pub struct CleanOutcome {
    pub requests: Vec<Request>,
    /// Rows left out because `date_requested` did not parse
    pub dropped: usize,
}

/// Map the unioned raw table onto the canonical request set, preserving row order.
#[instrument(skip_all, fields(raw_rows = table.len()))]
pub fn clean(table: &RawTable) -> CleanOutcome {
    let fields = FieldIndex::resolve(table);
    let requests: Vec<Request> = table
        .records
        .iter()
        .filter_map(|raw| clean_record(raw, &fields))
        .collect();
    let dropped = table.len() - requests.len();

    counter!("gid_clean_rows_total").increment(requests.len() as u64);
    counter!("gid_clean_rows_dropped_total").increment(dropped as u64);
    info!("Cleaned: {} rows (dropped {} unparseable)", requests.len(), dropped);

    CleanOutcome { requests, dropped }
}
