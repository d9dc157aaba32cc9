use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{self, CANONICAL_FILE};
use crate::error::{PipelineError, Result};

/// Environment variable that rebases every data directory onto one root
pub const DATA_DIR_ENV: &str = "GET_IT_DONE_DATA_DIR";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub sources: SourcesConfig,
    pub geo: BoundingBox,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub aggregated_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self::under(Path::new("data"))
    }
}

impl PathsConfig {
    /// Standard raw/processed/aggregated layout below `root`
    pub fn under(root: &Path) -> Self {
        Self {
            raw_dir: root.join("raw"),
            processed_dir: root.join("processed"),
            aggregated_dir: root.join("aggregated"),
        }
    }

    pub fn canonical_path(&self) -> PathBuf {
        self.processed_dir.join(CANONICAL_FILE)
    }

    pub fn view_path(&self, view: &str) -> PathBuf {
        self.aggregated_dir.join(constants::view_file_name(view))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub base_url: String,
    pub first_year: i32,
    /// Defaults to the current calendar year
    pub last_year: Option<i32>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            base_url: constants::DEFAULT_BASE_URL.to_string(),
            first_year: constants::DEFAULT_FIRST_YEAR,
            last_year: None,
        }
    }
}

impl SourcesConfig {
    pub fn last_year(&self) -> i32 {
        self.last_year
            .unwrap_or_else(|| chrono::Local::now().year())
    }
}

/// Plausible lat/lng rectangle for the city; bounds are inclusive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lng_min: f64,
    pub lng_max: f64,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            lat_min: 32.5,
            lat_max: 33.3,
            lng_min: -117.7,
            lng_max: -116.8,
        }
    }
}

impl BoundingBox {
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        lat >= self.lat_min && lat <= self.lat_max && lng >= self.lng_min && lng <= self.lng_max
    }

    /// True only when both coordinates are present and inside the box
    pub fn contains_pair(&self, lat: Option<f64>, lng: Option<f64>) -> bool {
        matches!((lat, lng), (Some(lat), Some(lng)) if self.contains(lat, lng))
    }
}

impl Config {
    /// Load configuration from `path` if it exists, otherwise fall back to defaults.
    /// `GET_IT_DONE_DATA_DIR` rebases the data directories afterwards.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let content = fs::read_to_string(p).map_err(|e| {
                    PipelineError::Config(format!("Failed to read config file '{}': {}", p.display(), e))
                })?;
                toml::from_str::<Config>(&content)?
            }
            None => Config::default(),
        };

        if let Ok(root) = std::env::var(DATA_DIR_ENV) {
            if !root.trim().is_empty() {
                config.paths = PathsConfig::under(Path::new(root.trim()));
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Configuration rooted at an explicit data directory
    pub fn with_data_dir(root: &Path) -> Self {
        Self {
            paths: PathsConfig::under(root),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let g = &self.geo;
        if g.lat_min > g.lat_max || g.lng_min > g.lng_max {
            return Err(PipelineError::Config(format!(
                "bounding box is inverted: lat [{}, {}], lng [{}, {}]",
                g.lat_min, g.lat_max, g.lng_min, g.lng_max
            )));
        }
        if let Some(last) = self.sources.last_year {
            if last < self.sources.first_year {
                return Err(PipelineError::Config(format!(
                    "sources.last_year {} precedes first_year {}",
                    last, self.sources.first_year
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [paths]
            raw_dir = "/tmp/raw"

            [sources]
            first_year = 2019
            last_year = 2020
            "#,
        )
        .unwrap();

        assert_eq!(config.paths.raw_dir, PathBuf::from("/tmp/raw"));
        assert_eq!(config.paths.aggregated_dir, PathBuf::from("data/aggregated"));
        assert_eq!(config.sources.base_url, constants::DEFAULT_BASE_URL);
        assert_eq!(config.sources.last_year(), 2020);
        assert_eq!(config.geo, BoundingBox::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bounding_box_is_inclusive() {
        let bbox = BoundingBox::default();
        assert!(bbox.contains(32.5, -117.7));
        assert!(bbox.contains(33.3, -116.8));
        assert!(!bbox.contains(33.31, -117.0));
        assert!(!bbox.contains_pair(Some(32.7), None));
        assert!(bbox.contains_pair(Some(32.7), Some(-117.1)));
    }

    #[test]
    fn test_inverted_years_rejected() {
        let mut config = Config::default();
        config.sources.first_year = 2020;
        config.sources.last_year = Some(2018);
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }
}
