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


//! Host path to filesystem path mapping
//!
//! Hosts hand over `file://` URIs, content URIs, or plain paths. Mapping
//! content URIs to real paths is platform work and lives outside this crate;
//! a host plugs it in through [`PathResolver`].

use crate::error::{Result, StreamError};
use std::path::PathBuf;

/// Turns a host-supplied path string into a filesystem path
pub trait PathResolver: Send + Sync {
    fn resolve(&self, path: &str) -> Result<PathBuf>;
}

/// Accepts plain paths and `file://` URIs
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver;

impl PathResolver for IdentityResolver {
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let stripped = path.strip_prefix("file://").unwrap_or(path);
        if stripped.is_empty() {
            return Err(StreamError::InvalidState("empty path".to_string()));
        }
        Ok(PathBuf::from(stripped))
    }
}
