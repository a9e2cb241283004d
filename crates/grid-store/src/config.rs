//! Configuration for grid stores.

use serde::{Deserialize, Serialize};

/// Chunking and compression settings applied when a store is created.
///
/// An existing store keeps the layout it was created with; these settings
/// are only consulted by [`GridStore::create`](crate::GridStore::create).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridStoreConfig {
    /// Chunk length along time for data variables.
    ///
    /// A length of 1 keeps every daily region write inside its own chunks.
    pub time_chunk: usize,

    /// Chunk edge along latitude and longitude (square chunks).
    pub spatial_chunk: usize,

    /// Chunk length of the `covered` flag array.
    pub covered_chunk: usize,

    /// Compression codec for data variables.
    pub compression: ZarrCompression,

    /// Compression level (1-9).
    pub compression_level: u8,

    /// Enable byte shuffle filter for better compression.
    pub shuffle: bool,
}

impl Default for GridStoreConfig {
    fn default() -> Self {
        Self {
            time_chunk: 1,
            spatial_chunk: 512,
            covered_chunk: 4096,
            compression: ZarrCompression::BloscZstd,
            compression_level: 1,
            shuffle: true,
        }
    }
}

impl GridStoreConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("GRID_TIME_CHUNK") {
            if let Ok(size) = val.parse() {
                config.time_chunk = size;
            }
        }

        if let Ok(val) = std::env::var("GRID_SPATIAL_CHUNK") {
            if let Ok(size) = val.parse() {
                config.spatial_chunk = size;
            }
        }

        if let Ok(val) = std::env::var("GRID_COVERED_CHUNK") {
            if let Ok(size) = val.parse() {
                config.covered_chunk = size;
            }
        }

        if let Ok(val) = std::env::var("GRID_COMPRESSION") {
            config.compression = ZarrCompression::from_str(&val);
        }

        if let Ok(val) = std::env::var("GRID_COMPRESSION_LEVEL") {
            if let Ok(level) = val.parse() {
                config.compression_level = level;
            }
        }

        if let Ok(val) = std::env::var("GRID_SHUFFLE") {
            config.shuffle = val.to_lowercase() == "true" || val == "1";
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.time_chunk == 0 {
            return Err("time_chunk must be > 0".to_string());
        }

        if self.spatial_chunk == 0 {
            return Err("spatial_chunk must be > 0".to_string());
        }

        if self.covered_chunk == 0 {
            return Err("covered_chunk must be > 0".to_string());
        }

        if self.compression_level == 0 || self.compression_level > 9 {
            return Err("compression_level must be 1-9".to_string());
        }

        Ok(())
    }
}

/// Compression codec for Zarr arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ZarrCompression {
    /// No compression.
    None,
    /// Blosc with LZ4.
    BloscLz4,
    /// Blosc with Zstd.
    #[default]
    BloscZstd,
}

impl ZarrCompression {
    /// Parse from string (case-insensitive), falling back to Blosc/Zstd.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "none" => Self::None,
            "lz4" | "blosc_lz4" => Self::BloscLz4,
            _ => Self::BloscZstd,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::BloscLz4 => "blosc_lz4",
            Self::BloscZstd => "blosc_zstd",
        }
    }
}

impl std::fmt::Display for ZarrCompression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
