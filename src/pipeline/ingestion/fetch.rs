use metrics::counter;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use crate::app::ports::HttpClientPort;
use crate::config::SourcesConfig;
use crate::constants::OPEN_SOURCE_NAME;
use crate::error::{PipelineError, Result};

/// One downloadable raw extract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSource {
    pub name: String,
    pub url: String,
}

impl RawSource {
    pub fn file_name(&self) -> String {
        format!("{}.csv", self.name)
    }
}

/// The open-requests extract plus one closed-requests extract per year
pub fn raw_sources(config: &SourcesConfig) -> Vec<RawSource> {
    let base = config.base_url.trim_end_matches('/');
    let mut sources = vec![RawSource {
        name: OPEN_SOURCE_NAME.to_string(),
        url: format!("{base}/get_it_done_requests_open_datasd.csv"),
    }];
    for year in config.first_year..=config.last_year() {
        sources.push(RawSource {
            name: format!("closed_{year}"),
            url: format!("{base}/get_it_done_requests_closed_{year}_datasd.csv"),
        });
    }
    sources
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FetchOutcome {
    Downloaded { path: PathBuf, bytes: u64, sha256: String },
    Skipped { path: PathBuf, bytes: u64 },
    Forbidden { name: String },
}

/// Download one source into `raw_dir`, unless it is already there and `force` is off.
#[instrument(skip(http, source), fields(source = %source.name))]
pub async fn download(
    http: &dyn HttpClientPort,
    source: &RawSource,
    raw_dir: &Path,
    force: bool,
) -> Result<FetchOutcome> {
    let dest = raw_dir.join(source.file_name());
    if dest.exists() && !force {
        let bytes = fs::metadata(&dest)?.len();
        info!("[skip] {} (already exists, {} bytes)", source.name, bytes);
        return Ok(FetchOutcome::Skipped { path: dest, bytes });
    }

    info!("[download] {} ...", source.name);
    let resp = http.get(&source.url).await.map_err(|message| PipelineError::Fetch {
        source_name: source.name.clone(),
        message,
    })?;

    if resp.status == 403 {
        warn!("[warn] {}: 403 forbidden, skipping", source.name);
        counter!("gid_fetch_forbidden_total").increment(1);
        return Ok(FetchOutcome::Forbidden { name: source.name.clone() });
    }
    if !resp.is_success() {
        return Err(PipelineError::HttpStatus {
            source_name: source.name.clone(),
            status: resp.status,
        });
    }

    if resp.content_length != resp.bytes.len() as u64 {
        warn!(
            "{}: announced {} bytes but received {}",
            source.name,
            resp.content_length,
            resp.bytes.len()
        );
    }

    fs::write(&dest, &resp.bytes)?;
    let sha256 = hex::encode(Sha256::digest(&resp.bytes));
    let bytes = resp.bytes.len() as u64;
    counter!("gid_fetch_bytes_total").increment(bytes);
    info!("[done] {} -> {} bytes (sha256 {})", source.name, bytes, sha256);

    Ok(FetchOutcome::Downloaded { path: dest, bytes, sha256 })
}

/// Download every configured source. A 403 skips that source; any other failure aborts.
pub async fn fetch_all(
    http: &dyn HttpClientPort,
    sources: &[RawSource],
    raw_dir: &Path,
    force: bool,
) -> Result<Vec<FetchOutcome>> {
    fs::create_dir_all(raw_dir)?;
    let mut outcomes = Vec::with_capacity(sources.len());
    for source in sources {
        outcomes.push(download(http, source, raw_dir, force).await?);
    }
    Ok(outcomes)
}
