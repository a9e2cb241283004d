//! Configuration for dataset access.

use std::path::{Path, PathBuf};

use grid_store::{GridStoreConfig, Resampling};
use serde::{Deserialize, Serialize};

use crate::error::{CubeError, Result};

/// Settings shared by every dataset adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CubeConfig {
    /// Directory holding one grid store per time-grid dataset.
    pub cache_root: PathBuf,

    /// Root of the flood mosaic archive.
    pub flood_root: PathBuf,

    /// Root of the terrain tile archive.
    pub dem_root: PathBuf,

    /// Fail reads that would return uncached days instead of masking them.
    pub strict: bool,

    /// Days fetched and written concurrently during a cache update.
    pub max_concurrent_days: usize,

    /// Resampling used when normalizing provider slices.
    pub resampling: Resampling,

    /// Chunking and compression for newly created stores.
    pub store: GridStoreConfig,
}

impl Default for CubeConfig {
    fn default() -> Self {
        Self {
            cache_root: PathBuf::from("cache"),
            flood_root: PathBuf::from("/eodc/products/global_flood_monitoring"),
            dem_root: PathBuf::from("resources/DEDL/COPDEM"),
            strict: false,
            max_concurrent_days: 4,
            resampling: Resampling::Nearest,
            store: GridStoreConfig::default(),
        }
    }
}

impl CubeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self {
            store: GridStoreConfig::from_env(),
            ..Self::default()
        };

        if let Ok(val) = std::env::var("CUBE_CACHE_ROOT") {
            config.cache_root = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("CUBE_FLOOD_ROOT") {
            config.flood_root = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("CUBE_DEM_ROOT") {
            config.dem_root = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("CUBE_STRICT") {
            config.strict = matches!(val.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        if let Ok(val) = std::env::var("CUBE_MAX_CONCURRENT_DAYS") {
            if let Ok(n) = val.parse() {
                config.max_concurrent_days = n;
            }
        }

        if let Ok(val) = std::env::var("CUBE_RESAMPLING") {
            config.resampling = Resampling::from_str(&val);
        }

        config
    }

    /// Parse a YAML document. Missing keys keep their defaults.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| CubeError::config(format!("invalid YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CubeError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache_root = root.into();
        self
    }

    pub fn with_flood_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.flood_root = root.into();
        self
    }

    pub fn with_dem_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.dem_root = root.into();
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Store location of a time-grid dataset: `<cache_root>/<name>.zarr`,
    /// where `name` is the last segment of the dataset id.
    pub fn store_path(&self, dataset_id: &str) -> PathBuf {
        let name = dataset_id.rsplit('/').next().unwrap_or(dataset_id);
        self.cache_root.join(format!("{name}.zarr"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_days == 0 {
            return Err(CubeError::config("max_concurrent_days must be at least 1"));
        }
        self.store.validate().map_err(CubeError::Config)
    }
}
