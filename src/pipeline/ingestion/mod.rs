// Pipeline ingestion: raw CSV download and loading

pub mod fetch;
pub mod raw_loader;
