use metrics::{counter, histogram};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, instrument};

use crate::config::Config;
use crate::error::Result;
use crate::pipeline::ingestion::raw_loader;
use crate::pipeline::processing::aggregate::{Aggregations, WrittenView};
use crate::pipeline::processing::clean;
use crate::pipeline::storage::canonical;

/// Result of a complete transform run
#[derive(Debug, Serialize)]
pub struct PipelineResult {
    pub raw_files: usize,
    pub raw_rows: usize,
    pub malformed_rows: usize,
    pub dropped_rows: usize,
    pub canonical_rows: usize,
    pub canonical_file: PathBuf,
    pub canonical_bytes: u64,
    pub views: Vec<WrittenView>,
    pub duration_secs: f64,
}

pub struct Pipeline;

impl Pipeline {
    /// Load every raw CSV, clean it, persist the canonical set and rebuild all views.
    ///
    /// Setup failures abort before anything is written; a rerun overwrites
    /// the previous outputs in full.
    #[instrument(skip_all, fields(raw_dir = %config.paths.raw_dir.display()))]
    pub fn run(config: &Config) -> Result<PipelineResult> {
        let paths = &config.paths;
        counter!("gid_pipeline_runs_total").increment(1);
        let t_pipeline = Instant::now();

        // Step 1: load
        info!("Loading raw CSVs from {}", paths.raw_dir.display());
        println!("Loading raw CSVs from {} ...", paths.raw_dir.display());
        let t_stage = Instant::now();
        let load = raw_loader::load_raw(&paths.raw_dir)?;
        histogram!("gid_stage_duration_seconds", "stage" => "load").record(t_stage.elapsed().as_secs_f64());
        println!(
            "  Raw rows: {} from {} file(s) ({} malformed skipped)",
            load.table.len(),
            load.files.len(),
            load.malformed_rows
        );

        // Step 2: clean and enrich
        let t_stage = Instant::now();
        let cleaned = clean::clean(&load.table);
        histogram!("gid_stage_duration_seconds", "stage" => "clean").record(t_stage.elapsed().as_secs_f64());
        println!(
            "  Cleaned: {} rows (dropped {} with unparseable date_requested)",
            cleaned.requests.len(),
            cleaned.dropped
        );

        // Step 3: persist canonical set
        let canonical_file = paths.canonical_path();
        let canonical_bytes = canonical::write(&canonical_file, &cleaned.requests)?;
        info!("Wrote {} ({} bytes)", canonical_file.display(), canonical_bytes);
        println!("  Wrote {} ({:.1} MB)", canonical_file.display(), canonical_bytes as f64 / 1_048_576.0);

        // Step 4: aggregate
        println!("Building aggregations ...");
        let t_stage = Instant::now();
        let aggregations = Aggregations::build(&cleaned.requests, &config.geo);
        let views = aggregations.write_all(&paths.aggregated_dir)?;
        histogram!("gid_stage_duration_seconds", "stage" => "aggregate").record(t_stage.elapsed().as_secs_f64());
        for v in &views {
            println!("  [agg] {} ({} rows)", v.view, v.rows);
        }

        let duration_secs = t_pipeline.elapsed().as_secs_f64();
        histogram!("gid_pipeline_duration_seconds").record(duration_secs);
        info!("Transform complete in {:.2}s", duration_secs);
        println!("Transform complete.");

        Ok(PipelineResult {
            raw_files: load.files.len(),
            raw_rows: load.table.len(),
            malformed_rows: load.malformed_rows,
            dropped_rows: cleaned.dropped,
            canonical_rows: cleaned.requests.len(),
            canonical_file,
            canonical_bytes,
            views,
            duration_secs,
        })
    }
}
