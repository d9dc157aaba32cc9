//! File and view name constants shared by the pipeline, validator and query layer.

// Canonical dataset
pub const CANONICAL_FILE: &str = "requests.parquet";

// Aggregation views
pub const RESPONSE_BY_NEIGHBORHOOD: &str = "response_by_neighborhood";
pub const VOLUME_BY_SERVICE_MONTHLY: &str = "volume_by_service_monthly";
pub const RESOLUTION_BY_DISTRICT: &str = "resolution_by_district";
pub const MONTHLY_TRENDS: &str = "monthly_trends";
pub const TOP_PROBLEM_TYPES: &str = "top_problem_types";
pub const MAP_POINTS: &str = "map_points";
pub const YEARLY_VOLUME: &str = "yearly_volume";
pub const CASE_ORIGIN: &str = "case_origin";
pub const DAY_HOUR_PATTERNS: &str = "day_hour_patterns";

/// All nine views, in the lexical order the validator reports them.
pub const AGGREGATION_VIEWS: [&str; 9] = [
    CASE_ORIGIN,
    DAY_HOUR_PATTERNS,
    MAP_POINTS,
    MONTHLY_TRENDS,
    RESOLUTION_BY_DISTRICT,
    RESPONSE_BY_NEIGHBORHOOD,
    TOP_PROBLEM_TYPES,
    VOLUME_BY_SERVICE_MONTHLY,
    YEARLY_VOLUME,
];

pub const PARQUET_EXTENSION: &str = "parquet";

/// Parquet file name for an aggregation view
pub fn view_file_name(view: &str) -> String {
    format!("{view}.{PARQUET_EXTENSION}")
}

// Submission channels
pub const CHANNEL_MOBILE_APP: &str = "Mobile App";
pub const CHANNEL_WEB: &str = "Web";
pub const CHANNEL_PHONE: &str = "Phone";
pub const CHANNEL_OTHER: &str = "Other";

/// Map a raw `case_origin` value onto its reporting channel
pub fn channel_for_origin(case_origin: Option<&str>) -> &'static str {
    match case_origin {
        Some("Mobile") => CHANNEL_MOBILE_APP,
        Some("Web") => CHANNEL_WEB,
        Some("Phone") => CHANNEL_PHONE,
        _ => CHANNEL_OTHER,
    }
}

// Source download locations
pub const DEFAULT_BASE_URL: &str = "https://seshat.datasd.org/get_it_done_reports";
pub const DEFAULT_FIRST_YEAR: i32 = 2016;
pub const OPEN_SOURCE_NAME: &str = "open";

// Validation thresholds
pub const EXTREME_RESOLUTION_DAYS: i64 = 730;
pub const MISSING_FIELD_WARN_PCT: f64 = 1.0;
pub const YOY_ANOMALY_PCT: f64 = 50.0;
pub const NEGATIVE_EXAMPLE_LIMIT: usize = 5;
