// Columnar persistence of the canonical set and the aggregation views

pub mod canonical;
pub mod frame;
pub mod parquet_out;
