use metrics::counter;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::domain::{RawRecord, RawTable};
use crate::error::{PipelineError, Result};

/// Outcome of loading the raw directory
#[derive(Debug)]
pub struct RawLoad {
    pub table: RawTable,
    pub files: Vec<PathBuf>,
    /// Rows skipped because they did not match their file's header or were not UTF-8
    pub malformed_rows: usize,
}

/// Lexically sorted `*.csv` files directly inside `raw_dir`.
///
/// A missing directory or an empty one is fatal.
pub fn discover_csv_files(raw_dir: &Path) -> Result<Vec<PathBuf>> {
    if !raw_dir.is_dir() {
        return Err(PipelineError::MissingInputDir(raw_dir.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(raw_dir)? {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if is_csv && path.is_file() {
            files.push(path);
        }
    }

    if files.is_empty() {
        return Err(PipelineError::NoInputFiles(raw_dir.to_path_buf()));
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn normalize_header(name: &str) -> String {
    name.trim_start_matches('\u{feff}').trim().to_ascii_lowercase()
}

fn read_header(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    Ok(reader.headers()?.iter().map(normalize_header).collect())
}

/// Load every raw CSV in `raw_dir` and union the rows by column name.
#[instrument(skip_all, fields(raw_dir = %raw_dir.display()))]
pub fn load_raw(raw_dir: &Path) -> Result<RawLoad> {
    let files = discover_csv_files(raw_dir)?;
    info!("Loading {} CSV files", files.len());

    // First pass: headers only, to fix the union column order
    let mut headers = Vec::with_capacity(files.len());
    let mut columns: Vec<String> = Vec::new();
    let mut union_index: HashMap<String, usize> = HashMap::new();
    for path in &files {
        let header = read_header(path)?;
        for name in &header {
            if !union_index.contains_key(name) {
                union_index.insert(name.clone(), columns.len());
                columns.push(name.clone());
            }
        }
        headers.push(header);
    }

    let mut records = Vec::new();
    let mut malformed_rows = 0usize;

    for (path, header) in files.iter().zip(&headers) {
        let source_file: Arc<str> = Arc::from(
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        // Position in this file -> position in the union
        let slots: Vec<usize> = header.iter().map(|name| union_index[name]).collect();

        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
        let mut file_rows = 0usize;
        let mut file_skipped = 0usize;

        for result in reader.records() {
            let record = match result {
                Ok(record) => record,
                Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => return Err(e.into()),
                Err(e) => {
                    debug!("Skipping malformed row in {}: {}", source_file, e);
                    file_skipped += 1;
                    continue;
                }
            };

            let mut values: Vec<Option<String>> = vec![None; columns.len()];
            for (field, &slot) in record.iter().zip(&slots) {
                if !field.is_empty() {
                    values[slot] = Some(field.to_string());
                }
            }
            records.push(RawRecord {
                source_file: Arc::clone(&source_file),
                values,
            });
            file_rows += 1;
        }

        if file_skipped > 0 {
            warn!("{}: skipped {} malformed rows", source_file, file_skipped);
        }
        debug!("{}: {} rows, {} columns", source_file, file_rows, header.len());
        malformed_rows += file_skipped;
    }

    counter!("gid_raw_rows_loaded_total").increment(records.len() as u64);
    counter!("gid_raw_rows_malformed_total").increment(malformed_rows as u64);
    info!("Loaded {} rows ({} malformed skipped)", records.len(), malformed_rows);

    Ok(RawLoad {
        table: RawTable { columns, records },
        files,
        malformed_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_union_by_name_fills_missing_columns_with_null() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("closed_2016.csv"),
            "service_request_id,date_requested,date_closed\nSR1,2016-05-01 10:00:00,2016-05-03 09:00:00\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("open.csv"),
            "date_requested,service_request_id,public_description\n2020-01-01,SR2,pothole\n",
        )
        .unwrap();

        let load = load_raw(dir.path()).unwrap();
        let table = &load.table;
        assert_eq!(
            table.columns,
            vec!["service_request_id", "date_requested", "date_closed", "public_description"]
        );
        assert_eq!(table.len(), 2);

        let closed_idx = table.column_index("date_closed");
        let desc_idx = table.column_index("public_description");
        let id_idx = table.column_index("service_request_id");

        let first = &table.records[0];
        assert_eq!(&*first.source_file, "closed_2016.csv");
        assert_eq!(first.get(closed_idx), Some("2016-05-03 09:00:00"));
        assert_eq!(first.get(desc_idx), None);

        let second = &table.records[1];
        assert_eq!(&*second.source_file, "open.csv");
        assert_eq!(second.get(id_idx), Some("SR2"));
        assert_eq!(second.get(closed_idx), None);
        assert_eq!(second.get(desc_idx), Some("pothole"));
    }

    #[test]
    fn test_malformed_rows_are_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("a.csv"),
            "service_request_id,date_requested\nSR1,2020-01-01\nSR2,2020-01-02,extra\nSR3,2020-01-03\n",
        )
        .unwrap();

        let load = load_raw(dir.path()).unwrap();
        assert_eq!(load.table.len(), 2);
        assert_eq!(load.malformed_rows, 1);
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.csv"), "\u{feff}Service_Request_ID , DATE_REQUESTED\nSR1,2020-01-01\n").unwrap();
        fs::write(dir.path().join("b.csv"), "service_request_id,date_requested\nSR2,2020-01-02\n").unwrap();

        let load = load_raw(dir.path()).unwrap();
        assert_eq!(load.table.columns, vec!["service_request_id", "date_requested"]);
        assert_eq!(load.table.len(), 2);
    }

    #[test]
    fn test_missing_dir_and_empty_dir_are_fatal() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(load_raw(&missing), Err(PipelineError::MissingInputDir(_))));

        fs::write(dir.path().join("notes.txt"), "not a csv").unwrap();
        assert!(matches!(load_raw(dir.path()), Err(PipelineError::NoInputFiles(_))));
    }

    #[test]
    fn test_files_are_discovered_in_lexical_order() {
        let dir = tempdir().unwrap();
        for name in ["open.csv", "closed_2017.csv", "closed_2016.CSV"] {
            fs::write(dir.path().join(name), "date_requested\n2020-01-01\n").unwrap();
        }
        let files = discover_csv_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["closed_2016.CSV", "closed_2017.csv", "open.csv"]);
    }
}
