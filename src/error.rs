use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Fetching source '{source_name}' failed: {message}")]
    Fetch { source_name: String, message: String },

    #[error("HTTP {status} while fetching source '{source_name}'")]
    HttpStatus { source_name: String, status: u16 },

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Raw input directory not found: {}", .0.display())]
    MissingInputDir(PathBuf),

    #[error("No CSV files found in {}", .0.display())]
    NoInputFiles(PathBuf),

    #[error("Canonical dataset not found at {}; run the pipeline first", .0.display())]
    MissingCanonical(PathBuf),

    #[error("Unknown aggregation view '{0}'")]
    UnknownView(String),

    #[error("Aggregation file not found at {}; run the pipeline first", .0.display())]
    MissingView(PathBuf),

    #[error("Unexpected schema in {file}: {message}")]
    Schema { file: String, message: String },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
