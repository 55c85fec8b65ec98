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


//! Stream engine facade
//!
//! [`StreamEngine`] is the only entry point hosts use. It is cheap to clone;
//! clones share the registries, listener hub and buffer pool.
//!
//! # Example
//! ```no_run
//! use filestream_core::{EngineConfig, ReadStreamOptions, StreamEngine};
//!
//! # async fn demo() -> filestream_core::Result<()> {
//! let engine = StreamEngine::new(EngineConfig::default())?;
//! let id = engine.create_read_stream("/tmp/input.bin", ReadStreamOptions::default()).await?;
//! let _data = engine.listen_to_read_stream_data(&id, |event| {
//!     println!("chunk {} at {}: {} bytes", event.chunk, event.position, event.data.len());
//! });
//! engine.start_read_stream(&id).await?;
//! # Ok(())
//! # }
//! ```

use super::events::{
    EventHub, ReadStreamDataEvent, ReadStreamEndEvent, ReadStreamProgressEvent, StreamErrorEvent,
    WriteStreamFinishEvent, WriteStreamProgressEvent,
};
use super::options::{ReadStreamOptions, StreamId, WriteStreamOptions};
use super::read::{self, ReadSession};
use super::registry::StreamRegistry;
use super::resolver::{IdentityResolver, PathResolver};
use super::write::{self, WriteSession};
use crate::buffer::{BufferPool, PoolStats};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::listeners::Subscription;
use std::sync::Arc;
use tracing::{info, warn};

/// State shared by the facade and every stream task
pub(crate) struct EngineShared {
    pub(crate) config: EngineConfig,
    pub(crate) pool: BufferPool,
    pub(crate) reads: StreamRegistry<ReadSession>,
    pub(crate) writes: StreamRegistry<WriteSession>,
    pub(crate) events: EventHub,
    pub(crate) resolver: Arc<dyn PathResolver>,
}

/// Streaming file I/O engine
#[derive(Clone)]
pub struct StreamEngine {
    shared: Arc<EngineShared>,
}

impl StreamEngine {
    /// Create an engine that accepts plain paths and `file://` URIs
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_resolver(config, Arc::new(IdentityResolver))
    }

    /// Create an engine with a host-supplied path resolver
    pub fn with_resolver(config: EngineConfig, resolver: Arc<dyn PathResolver>) -> Result<Self> {
        config.validate()?;
        let pool = config.build_pool();
        info!(
            buffer_size = pool.buffer_size(),
            write_queue_depth = config.write_queue_depth,
            "Stream engine initialized"
        );
        Ok(Self {
            shared: Arc::new(EngineShared {
                config,
                pool,
                reads: StreamRegistry::new(),
                writes: StreamRegistry::new(),
                events: EventHub::new(),
                resolver,
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Shared buffer pool statistics
    pub fn pool_stats(&self) -> PoolStats {
        self.shared.pool.stats()
    }

    /// Drop every free buffer held by the shared pool
    pub fn clear_pool(&self) {
        self.shared.pool.clear();
    }

    /// Number of read streams still registered
    pub fn read_stream_count(&self) -> usize {
        self.shared.reads.len()
    }

    /// Number of write streams still registered
    pub fn write_stream_count(&self) -> usize {
        self.shared.writes.len()
    }

    // ===== Read Streams =====

    /// Validate `path` and open it; reading begins at `start_read_stream`
    pub async fn create_read_stream(&self, path: &str, options: ReadStreamOptions) -> Result<StreamId> {
        read::create(&self.shared, path, options).await
    }

    pub async fn start_read_stream(&self, id: &StreamId) -> Result<()> {
        read::start(&self.shared, id)
    }

    /// Suspend before the next chunk; the chunk being read still completes
    pub async fn pause_read_stream(&self, id: &StreamId) -> Result<()> {
        read::pause(&self.shared, id)
    }

    pub async fn resume_read_stream(&self, id: &StreamId) -> Result<()> {
        read::resume(&self.shared, id)
    }

    /// Cancel and wait for the read task; a second call fails with
    /// `InvalidStream`
    pub async fn close_read_stream(&self, id: &StreamId) -> Result<()> {
        read::close(&self.shared, id).await
    }

    /// Running and not paused
    pub async fn is_read_stream_active(&self, id: &StreamId) -> Result<bool> {
        read::is_active(&self.shared, id)
    }

    // ===== Write Streams =====

    /// Open `path` for writing; the consumer starts immediately
    pub async fn create_write_stream(&self, path: &str, options: WriteStreamOptions) -> Result<StreamId> {
        write::create(&self.shared, path, options).await
    }

    /// Queue a copy of `data`; waits only when the queue is full
    pub async fn write_to_stream(&self, id: &StreamId, data: &[u8]) -> Result<()> {
        write::write(&self.shared, id, data).await
    }

    /// Queue an fsync behind the writes already queued
    pub async fn flush_write_stream(&self, id: &StreamId) -> Result<()> {
        write::flush(&self.shared, id).await
    }

    /// Drain the queue, close the file and return the finish summary
    pub async fn end_write_stream(&self, id: &StreamId) -> Result<WriteStreamFinishEvent> {
        write::end(&self.shared, id).await
    }

    /// Unregister the stream, then drain and close it like `end_write_stream`
    pub async fn close_write_stream(&self, id: &StreamId) -> Result<WriteStreamFinishEvent> {
        write::close(&self.shared, id).await
    }

    pub async fn is_write_stream_active(&self, id: &StreamId) -> Result<bool> {
        write::is_active(&self.shared, id)
    }

    /// Bytes committed to the file so far
    pub async fn get_write_stream_position(&self, id: &StreamId) -> Result<u64> {
        write::position(&self.shared, id)
    }

    // ===== Event Listeners =====

    pub fn listen_to_read_stream_data<F>(&self, id: &StreamId, callback: F) -> Subscription
    where
        F: Fn(ReadStreamDataEvent) + Send + Sync + 'static,
    {
        self.shared.events.on_read_data(id, Arc::new(callback))
    }

    pub fn listen_to_read_stream_progress<F>(&self, id: &StreamId, callback: F) -> Subscription
    where
        F: Fn(ReadStreamProgressEvent) + Send + Sync + 'static,
    {
        self.shared.events.on_read_progress(id, Arc::new(callback))
    }

    pub fn listen_to_read_stream_end<F>(&self, id: &StreamId, callback: F) -> Subscription
    where
        F: Fn(ReadStreamEndEvent) + Send + Sync + 'static,
    {
        self.shared.events.on_read_end(id, Arc::new(callback))
    }

    pub fn listen_to_read_stream_error<F>(&self, id: &StreamId, callback: F) -> Subscription
    where
        F: Fn(StreamErrorEvent) + Send + Sync + 'static,
    {
        self.shared.events.on_read_error(id, Arc::new(callback))
    }

    pub fn listen_to_write_stream_progress<F>(&self, id: &StreamId, callback: F) -> Subscription
    where
        F: Fn(WriteStreamProgressEvent) + Send + Sync + 'static,
    {
        self.shared.events.on_write_progress(id, Arc::new(callback))
    }

    pub fn listen_to_write_stream_finish<F>(&self, id: &StreamId, callback: F) -> Subscription
    where
        F: Fn(WriteStreamFinishEvent) + Send + Sync + 'static,
    {
        self.shared.events.on_write_finish(id, Arc::new(callback))
    }

    pub fn listen_to_write_stream_error<F>(&self, id: &StreamId, callback: F) -> Subscription
    where
        F: Fn(StreamErrorEvent) + Send + Sync + 'static,
    {
        self.shared.events.on_write_error(id, Arc::new(callback))
    }

    // ===== Shutdown =====

    /// Close every read stream and abort every write stream
    ///
    /// Queued writes that were not yet committed are dropped.
    pub async fn shutdown(&self) {
        for id in self.shared.reads.ids() {
            if let Err(e) = read::close(&self.shared, &id).await {
                warn!(stream_id = %id, "Read stream already gone during shutdown: {}", e);
            }
        }
        for id in self.shared.writes.ids() {
            if let Err(e) = write::abort(&self.shared, &id).await {
                warn!(stream_id = %id, "Write stream already gone during shutdown: {}", e);
            }
        }
        info!("Stream engine shut down");
    }
}
