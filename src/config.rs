//! Configuration for CaskKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{CaskError, Result};

/// Default maximum segment size before rotation (8 MiB)
pub const DEFAULT_MAX_SEGMENT_SIZE: u64 = 8 * 1024 * 1024;

/// Default disk usage below which compaction is never worth it (10 MiB)
pub const DEFAULT_COMPACTION_MIN_DISK_USAGE: u64 = 10 * 1024 * 1024;

/// Default on-disk / live-data ratio above which compaction runs
pub const DEFAULT_COMPACTION_RATIO: f64 = 1.5;

/// Main configuration for a CaskKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding the segment files of this instance.
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── segment_000001.data   (sealed)
    ///     ├── segment_000002.data   (sealed)
    ///     └── segment_000003.data   (active)
    pub data_dir: PathBuf,

    /// Size in bytes a segment may reach before writes rotate to a new one
    pub max_segment_size: u64,

    /// Verify CRC and key of every record read back from disk
    pub verify_checksums: bool,

    // -------------------------------------------------------------------------
    // Compaction Configuration
    // -------------------------------------------------------------------------
    /// Total disk usage (bytes) that must be reached before compaction triggers
    pub compaction_min_disk_usage: u64,

    /// Trigger when `total_disk_used / actual_data_size` exceeds this ratio
    pub compaction_ratio: f64,

    /// Evaluate the compaction trigger on every rotation
    pub auto_compaction: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./caskkv_data"),
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            verify_checksums: true,
            compaction_min_disk_usage: DEFAULT_COMPACTION_MIN_DISK_USAGE,
            compaction_ratio: DEFAULT_COMPACTION_RATIO,
            auto_compaction: true,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_segment_size == 0 {
            return Err(CaskError::Config(
                "max_segment_size must be greater than zero".to_string(),
            ));
        }

        if !self.compaction_ratio.is_finite() || self.compaction_ratio < 1.0 {
            return Err(CaskError::Config(format!(
                "compaction_ratio must be a finite number >= 1.0, got {}",
                self.compaction_ratio
            )));
        }

        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the maximum segment size (in bytes)
    pub fn max_segment_size(mut self, size: u64) -> Self {
        self.config.max_segment_size = size;
        self
    }

    /// Enable or disable checksum verification on reads
    pub fn verify_checksums(mut self, enabled: bool) -> Self {
        self.config.verify_checksums = enabled;
        self
    }

    /// Set the compaction low-water mark (in bytes)
    pub fn compaction_min_disk_usage(mut self, size: u64) -> Self {
        self.config.compaction_min_disk_usage = size;
        self
    }

    /// Set the compaction ratio threshold
    pub fn compaction_ratio(mut self, ratio: f64) -> Self {
        self.config.compaction_ratio = ratio;
        self
    }

    /// Enable or disable automatic compaction on rotation
    pub fn auto_compaction(mut self, enabled: bool) -> Self {
        self.config.auto_compaction = enabled;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
