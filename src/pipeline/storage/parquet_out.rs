use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, SerializedFileReader};
use std::fs::{self, File};
use std::path::Path;
use tracing::debug;

use super::frame::Frame;
use crate::error::{PipelineError, Result};

fn writer_properties() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::default()))
        .build()
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Write `frame` as a single ZSTD-compressed Parquet file, replacing any previous file.
pub fn write_frame(path: &Path, frame: &Frame) -> Result<u64> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let batch = frame.to_record_batch()?;
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(writer_properties()))?;
    writer.write(&batch)?;
    writer.close()?;

    let size = fs::metadata(path)?.len();
    debug!("wrote {} ({} rows, {} bytes)", path.display(), frame.num_rows(), size);
    Ok(size)
}

/// Read a whole Parquet file back into a frame
pub fn read_frame(path: &Path) -> Result<Frame> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = builder.schema().clone();
    let reader = builder.build()?;

    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch?);
    }

    Frame::from_batches(&schema, &batches).map_err(|e| match e {
        PipelineError::Schema { message, .. } => PipelineError::Schema {
            file: display_name(path),
            message,
        },
        other => other,
    })
}

/// Row count from the file footer, without decoding any pages
pub fn row_count(path: &Path) -> Result<u64> {
    let reader = SerializedFileReader::new(File::open(path)?)?;
    Ok(reader.metadata().file_metadata().num_rows().max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::storage::frame::ColumnData;
    use tempfile::tempdir;

    #[test]
    fn test_write_then_read_and_count() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("t.parquet");
        let frame = Frame::new()
            .with_column("channel", ColumnData::Utf8(vec![Some("Web".into()), Some("Other".into())]))
            .with_column("request_count", ColumnData::Int64(vec![Some(4), Some(1)]));

        let size = write_frame(&path, &frame).unwrap();
        assert!(size > 0);
        assert_eq!(row_count(&path).unwrap(), 2);
        assert_eq!(read_frame(&path).unwrap(), frame);
    }

    #[test]
    fn test_empty_frame_keeps_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.parquet");
        let frame = Frame::new().with_column("request_year", ColumnData::Int32(Vec::new()));

        write_frame(&path, &frame).unwrap();
        let back = read_frame(&path).unwrap();
        assert_eq!(back.column_names(), vec!["request_year"]);
        assert_eq!(back.num_rows(), 0);
        assert_eq!(row_count(&path).unwrap(), 0);
    }

    #[test]
    fn test_rewrite_is_byte_identical() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.parquet");
        let frame = Frame::new().with_column("x", ColumnData::Float64(vec![Some(1.5), None]));

        write_frame(&path, &frame).unwrap();
        let first = fs::read(&path).unwrap();
        write_frame(&path, &frame).unwrap();
        assert_eq!(first, fs::read(&path).unwrap());
    }
}
