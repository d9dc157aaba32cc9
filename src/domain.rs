use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::sync::Arc;

/// Union of every raw CSV row, keyed by column name.
///
/// `columns` is the union of all file headers in first-seen order; each
/// record carries one slot per union column, `None` where the origin file
/// lacks that column or the field was empty.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub records: Vec<RawRecord>,
}

impl RawTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// One untyped row from a source CSV
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub source_file: Arc<str>,
    pub values: Vec<Option<String>>,
}

impl RawRecord {
    pub fn get(&self, index: Option<usize>) -> Option<&str> {
        index
            .and_then(|i| self.values.get(i))
            .and_then(|v| v.as_deref())
    }
}

/// A cleaned, enriched 311 service request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    pub service_request_id: Option<String>,
    pub service_request_parent_id: Option<String>,
    pub sap_notification_number: Option<String>,

    pub date_requested: NaiveDateTime,
    pub date_closed: Option<NaiveDateTime>,
    pub case_age_days: Option<i32>,

    pub case_record_type: Option<String>,
    pub service_name: Option<String>,
    pub service_name_detail: Option<String>,
    pub status: Option<String>,

    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub street_address: Option<String>,
    pub zipcode: Option<String>,
    pub council_district: Option<i32>,
    pub comm_plan_code: Option<i32>,
    pub comm_plan_name: Option<String>,
    pub park_name: Option<String>,

    pub case_origin: Option<String>,
    pub referred: Option<String>,

    pub resolution_days: Option<i64>,
    pub request_year: Option<i32>,
    pub request_month: Option<i32>,
    pub request_quarter: Option<i32>,
    /// 0 = Sunday .. 6 = Saturday
    pub request_dow: Option<i32>,
    pub request_month_start: Option<NaiveDate>,

    pub source_file: String,
}

impl Request {
    pub fn is_closed(&self) -> bool {
        self.date_closed.is_some()
    }
}

/// Treats a missing value and an empty string alike
pub fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, str::is_empty)
}
