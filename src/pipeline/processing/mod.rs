// Pipeline processing: cleaning, aggregation, and validation

pub mod aggregate;
pub mod clean;
pub mod quality_gate;
