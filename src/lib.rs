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


//! Streaming file I/O engine and resumable downloader
//!
//! # Modules
//! - [`stream`]: chunked, pausable read streams and FIFO write streams
//! - [`download`]: resumable HTTP downloads with throttled progress
//! - [`buffer`]: the shared buffer pool both of them read into
//! - [`config`]: serde configuration for the engine and the downloader
//! - [`error`]: the crate error type and its POSIX-style codes
//!
//! Host bindings drive everything through [`StreamEngine`] and
//! [`DownloadManager`]; both are async and need a tokio runtime.

pub mod buffer;
pub mod config;
pub mod download;
pub mod error;
pub mod listeners;
pub mod stream;

pub use buffer::{BufferPool, PoolStats, PooledBuffer};
pub use config::{DownloadConfig, EngineConfig, PoolPreset};
pub use download::{DownloadManager, DownloadOptions, DownloadState, HttpTransport};
pub use error::{Result, StreamError};
pub use listeners::Subscription;
pub use stream::{ReadStreamOptions, StreamEngine, StreamId, WriteStreamOptions};
