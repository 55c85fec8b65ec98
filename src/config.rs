// filestream-core - Streaming file I/O for mobile
// Copyright (C) 2025 filestream-core contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Engine and downloader configuration
//!
//! Both configs are serde structs with defaults so a host can pass a JSON
//! blob across the bridge, or leave everything unset.

use crate::buffer::{BufferPool, DEFAULT_BUFFER_SIZE, DEFAULT_MAX_POOL_SIZE};
use crate::error::{Result, StreamError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Buffer pool sizing presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolPreset {
    /// Use `default_buffer_size` / `pool_capacity` as configured
    Default,
    /// 4KB buffers, 50 kept
    Small,
    /// 64KB buffers, 10 kept
    Large,
}

/// Stream engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Buffer size used when a stream does not specify one
    pub default_buffer_size: usize,

    /// Maximum number of free buffers kept by the shared pool
    pub pool_capacity: usize,

    /// Pool preset; overrides the two fields above unless `Default`
    pub pool_preset: PoolPreset,

    /// Maximum number of queued write requests per write stream
    pub write_queue_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_buffer_size: DEFAULT_BUFFER_SIZE,
            pool_capacity: DEFAULT_MAX_POOL_SIZE,
            pool_preset: PoolPreset::Default,
            write_queue_depth: 64,
        }
    }
}

impl EngineConfig {
    /// Parse a config from a JSON string, filling gaps with defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a JSON file
    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StreamError::from_io(e, &path.display().to_string()))?;
        Self::from_json_str(&json)
    }

    /// Reject sizes that would make the engine unusable
    pub fn validate(&self) -> Result<()> {
        if self.default_buffer_size == 0 {
            return Err(StreamError::InvalidConfiguration(
                "default_buffer_size must be greater than zero".to_string(),
            ));
        }
        if self.write_queue_depth == 0 {
            return Err(StreamError::InvalidConfiguration(
                "write_queue_depth must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the shared buffer pool this config describes
    pub fn build_pool(&self) -> BufferPool {
        match self.pool_preset {
            PoolPreset::Default => BufferPool::new(self.default_buffer_size, self.pool_capacity),
            PoolPreset::Small => BufferPool::small(),
            PoolPreset::Large => BufferPool::large(),
        }
    }
}

/// Downloader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Maximum redirect hops followed before failing
    pub max_redirects: u32,

    /// Connect timeout used when a job sets none (0 = no limit)
    pub default_connect_timeout_ms: u64,

    /// Per-chunk read timeout used when a job sets none (0 = no limit)
    pub default_read_timeout_ms: u64,

    /// Largest slice written to disk per progress step
    pub chunk_size: usize,

    /// User-Agent sent by the default transport
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_redirects: 5,
            default_connect_timeout_ms: 0,
            default_read_timeout_ms: 0,
            chunk_size: 8192,
            user_agent: concat!("filestream-core/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl DownloadConfig {
    pub(crate) fn connect_timeout(&self) -> Option<Duration> {
        millis(self.default_connect_timeout_ms)
    }

    pub(crate) fn read_timeout(&self) -> Option<Duration> {
        millis(self.default_read_timeout_ms)
    }

    /// Reject a zero chunk size
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(StreamError::InvalidConfiguration(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Zero means "no limit"
pub(crate) fn millis(ms: u64) -> Option<Duration> {
    if ms == 0 {
        None
    } else {
        Some(Duration::from_millis(ms))
    }
}
