//! Column contract of the canonical `requests.parquet` file.

use std::path::Path;

use super::frame::{col, Frame};
use super::parquet_out;
use crate::domain::Request;
use crate::error::{PipelineError, Result};

pub fn to_frame(requests: &[Request]) -> Frame {
    Frame::new()
        .with_column("service_request_id", col!(requests, Utf8, |r| r.service_request_id.clone()))
        .with_column("service_request_parent_id", col!(requests, Utf8, |r| r.service_request_parent_id.clone()))
        .with_column("sap_notification_number", col!(requests, Utf8, |r| r.sap_notification_number.clone()))
        .with_column("date_requested", col!(requests, Timestamp, |r| Some(r.date_requested)))
        .with_column("date_closed", col!(requests, Timestamp, |r| r.date_closed))
        .with_column("case_age_days", col!(requests, Int32, |r| r.case_age_days))
        .with_column("case_record_type", col!(requests, Utf8, |r| r.case_record_type.clone()))
        .with_column("service_name", col!(requests, Utf8, |r| r.service_name.clone()))
        .with_column("service_name_detail", col!(requests, Utf8, |r| r.service_name_detail.clone()))
        .with_column("status", col!(requests, Utf8, |r| r.status.clone()))
        .with_column("lat", col!(requests, Float64, |r| r.lat))
        .with_column("lng", col!(requests, Float64, |r| r.lng))
        .with_column("street_address", col!(requests, Utf8, |r| r.street_address.clone()))
        .with_column("zipcode", col!(requests, Utf8, |r| r.zipcode.clone()))
        .with_column("council_district", col!(requests, Int32, |r| r.council_district))
        .with_column("comm_plan_code", col!(requests, Int32, |r| r.comm_plan_code))
        .with_column("comm_plan_name", col!(requests, Utf8, |r| r.comm_plan_name.clone()))
        .with_column("park_name", col!(requests, Utf8, |r| r.park_name.clone()))
        .with_column("case_origin", col!(requests, Utf8, |r| r.case_origin.clone()))
        .with_column("referred", col!(requests, Utf8, |r| r.referred.clone()))
        .with_column("resolution_days", col!(requests, Int64, |r| r.resolution_days))
        .with_column("request_year", col!(requests, Int32, |r| r.request_year))
        .with_column("request_month", col!(requests, Int32, |r| r.request_month))
        .with_column("request_quarter", col!(requests, Int32, |r| r.request_quarter))
        .with_column("request_dow", col!(requests, Int32, |r| r.request_dow))
        .with_column("request_month_start", col!(requests, Date, |r| r.request_month_start))
        .with_column("source_file", col!(requests, Utf8, |r| Some(r.source_file.clone())))
}

pub fn from_frame(frame: &Frame) -> Result<Vec<Request>> {
    let ids = frame.utf8("service_request_id")?;
    let parent_ids = frame.utf8("service_request_parent_id")?;
    let sap = frame.utf8("sap_notification_number")?;
    let requested = frame.timestamp("date_requested")?;
    let closed = frame.timestamp("date_closed")?;
    let case_age = frame.int32("case_age_days")?;
    let record_type = frame.utf8("case_record_type")?;
    let service = frame.utf8("service_name")?;
    let service_detail = frame.utf8("service_name_detail")?;
    let status = frame.utf8("status")?;
    let lat = frame.float64("lat")?;
    let lng = frame.float64("lng")?;
    let street = frame.utf8("street_address")?;
    let zipcode = frame.utf8("zipcode")?;
    let district = frame.int32("council_district")?;
    let plan_code = frame.int32("comm_plan_code")?;
    let plan_name = frame.utf8("comm_plan_name")?;
    let park = frame.utf8("park_name")?;
    let origin = frame.utf8("case_origin")?;
    let referred = frame.utf8("referred")?;
    let resolution = frame.int64("resolution_days")?;
    let year = frame.int32("request_year")?;
    let month = frame.int32("request_month")?;
    let quarter = frame.int32("request_quarter")?;
    let dow = frame.int32("request_dow")?;
    let month_start = frame.date("request_month_start")?;
    let source = frame.utf8("source_file")?;

    let mut requests = Vec::with_capacity(frame.num_rows());
    for i in 0..frame.num_rows() {
        let date_requested = requested[i].ok_or_else(|| PipelineError::Schema {
            file: String::new(),
            message: format!("row {} has a null date_requested", i),
        })?;
        requests.push(Request {
            service_request_id: ids[i].clone(),
            service_request_parent_id: parent_ids[i].clone(),
            sap_notification_number: sap[i].clone(),
            date_requested,
            date_closed: closed[i],
            case_age_days: case_age[i],
            case_record_type: record_type[i].clone(),
            service_name: service[i].clone(),
            service_name_detail: service_detail[i].clone(),
            status: status[i].clone(),
            lat: lat[i],
            lng: lng[i],
            street_address: street[i].clone(),
            zipcode: zipcode[i].clone(),
            council_district: district[i],
            comm_plan_code: plan_code[i],
            comm_plan_name: plan_name[i].clone(),
            park_name: park[i].clone(),
            case_origin: origin[i].clone(),
            referred: referred[i].clone(),
            resolution_days: resolution[i],
            request_year: year[i],
            request_month: month[i],
            request_quarter: quarter[i],
            request_dow: dow[i],
            request_month_start: month_start[i],
            source_file: source[i].clone().unwrap_or_default(),
        });
    }
    Ok(requests)
}

pub fn write(path: &Path, requests: &[Request]) -> Result<u64> {
    parquet_out::write_frame(path, &to_frame(requests))
}

/// Load the canonical dataset; a missing file is reported as [`PipelineError::MissingCanonical`].
pub fn read(path: &Path) -> Result<Vec<Request>> {
    if !path.is_file() {
        return Err(PipelineError::MissingCanonical(path.to_path_buf()));
    }
    let frame = parquet_out::read_frame(path)?;
    from_frame(&frame).map_err(|e| match e {
        PipelineError::Schema { message, .. } => PipelineError::Schema {
            file: path.display().to_string(),
            message,
        },
        other => other,
    })
}
