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


//! Stream identifiers and option bags

use crate::error::{Result, StreamError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle for one read or write stream session
///
/// Generated from a random UUID at creation; never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    pub(crate) fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StreamId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for StreamId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Options for `create_read_stream`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReadStreamOptions {
    /// Chunk size; the engine default when unset
    pub buffer_size: Option<usize>,

    /// First byte offset to read (default 0)
    pub start: Option<u64>,

    /// Last byte offset to read, inclusive (default EOF)
    pub end: Option<u64>,
}

impl ReadStreamOptions {
    /// Read the inclusive byte range `[start, end]`
    pub fn range(start: u64, end: u64) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            ..Default::default()
        }
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.buffer_size == Some(0) {
            return Err(StreamError::InvalidConfiguration(
                "bufferSize must be greater than zero".to_string(),
            ));
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(StreamError::InvalidConfiguration(format!(
                    "range start {} is past range end {}",
                    start, end
                )));
            }
        }
        Ok(())
    }
}

/// Options for `create_write_stream`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WriteStreamOptions {
    /// Append to an existing file instead of truncating it
    pub append: bool,

    /// Chunk size `write_file_via_stream` splits its payload into; queued
    /// writes are never split
    pub buffer_size: Option<usize>,

    /// Create missing parent directories
    pub create_directories: bool,
}

impl WriteStreamOptions {
    pub fn append() -> Self {
        Self {
            append: true,
            ..Default::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.buffer_size == Some(0) {
            return Err(StreamError::InvalidConfiguration(
                "bufferSize must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
