//! Configuration for DiskBuffer
//!
//! Centralized configuration with sensible defaults. All budgets are in
//! caller-defined units; the cache only compares them with the sizes the
//! pageable objects report.

use std::path::PathBuf;

use crate::error::{DiskBufferError, Result};

/// Main configuration for a DiskBuffer instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Backing file that every pageable object is written into
    pub file_path: PathBuf,

    // -------------------------------------------------------------------------
    // Write Buffer Configuration
    // -------------------------------------------------------------------------
    /// Buffered volume above which old objects are written out
    /// (0 disables batching: every buffered object is written immediately)
    pub write_buffer_size: u64,

    // -------------------------------------------------------------------------
    // MRU Configuration
    // -------------------------------------------------------------------------
    /// Resident memory budget (0 disables the MRU; objects page through)
    pub mru_size: u64,

    // -------------------------------------------------------------------------
    // Small-Object Pool Configuration
    // -------------------------------------------------------------------------
    /// Budget for objects that never page (0 disables the pool)
    pub small_buffer_size: u64,

    /// Expected number of objects; the per-object pool threshold is
    /// `small_buffer_size / expected_object_count`
    pub expected_object_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            file_path: PathBuf::from("./diskbuffer.dat"),
            write_buffer_size: 10_000_000,
            mru_size: 50_000_000,
            small_buffer_size: 0,
            expected_object_count: 0,
        }
    }
}

impl Config {
    /// Option keys accepted by [`Config::set_option`]
    pub const OPTION_KEYS: [&'static str; 3] = ["write_buffer_size", "mru_size", "small_buffer_size"];

    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Set a budget from its textual form
    ///
    /// Unknown keys and values that are not non-negative integers are
    /// rejected; on error the previous value is kept.
    pub fn set_option(&mut self, key: &str, value: &str) -> Result<()> {
        let parsed = parse_budget(key, value)?;
        match key {
            "write_buffer_size" => self.write_buffer_size = parsed,
            "mru_size" => self.mru_size = parsed,
            "small_buffer_size" => self.small_buffer_size = parsed,
            _ => {
                return Err(DiskBufferError::Config(format!(
                    "unknown option '{}' (expected one of {:?})",
                    key,
                    Self::OPTION_KEYS
                )))
            }
        }
        Ok(())
    }
}

fn parse_budget(key: &str, value: &str) -> Result<u64> {
    value.trim().parse::<u64>().map_err(|e| {
        DiskBufferError::Config(format!("invalid value '{}' for {}: {}", value, key, e))
    })
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the backing file path
    pub fn file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.file_path = path.into();
        self
    }

    /// Set the write buffer threshold
    pub fn write_buffer_size(mut self, size: u64) -> Self {
        self.config.write_buffer_size = size;
        self
    }

    /// Set the MRU memory budget
    pub fn mru_size(mut self, size: u64) -> Self {
        self.config.mru_size = size;
        self
    }

    /// Set the small-object pool budget
    pub fn small_buffer_size(mut self, size: u64) -> Self {
        self.config.small_buffer_size = size;
        self
    }

    /// Set the expected number of objects (sizes the small-object pool)
    pub fn expected_object_count(mut self, count: usize) -> Self {
        self.config.expected_object_count = count;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
