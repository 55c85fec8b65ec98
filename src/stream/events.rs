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


//! Stream events and the per-stream listener hub
//!
//! # Slots
//! Each event kind has exactly one listener slot per stream id. Registering
//! again for the same id and kind replaces the previous callback.
//!
//! # Dispatch
//! Callbacks run synchronously on the stream's background task. They should
//! hand work off quickly; a slow callback stalls that stream's I/O.

use super::options::StreamId;
use crate::error::StreamError;
use crate::listeners::{Callback, KeyedListeners, Subscription};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;

/// One chunk read from a file
#[derive(Debug, Clone)]
pub struct ReadStreamDataEvent {
    pub stream_id: StreamId,

    /// Bytes read for this chunk
    pub data: Bytes,

    /// 0-based chunk counter
    pub chunk: u64,

    /// File offset of the first byte of `data`
    pub position: u64,
}

/// Cumulative read progress, emitted after every chunk
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadStreamProgressEvent {
    pub stream_id: StreamId,
    pub bytes_read: u64,

    /// File length when the stream started
    pub total_bytes: u64,

    /// `bytes_read / total_bytes`, 0.0 for an empty file
    pub progress: f64,
}

/// Read stream reached the end of its range or file
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadStreamEndEvent {
    pub stream_id: StreamId,
    pub bytes_read: u64,
    pub success: bool,
}

/// Failure inside a read or write stream task
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamErrorEvent {
    pub stream_id: StreamId,
    pub error: String,
    pub code: String,
}

impl StreamErrorEvent {
    pub(crate) fn new(stream_id: &StreamId, err: &StreamError) -> Self {
        Self {
            stream_id: stream_id.clone(),
            error: err.to_string(),
            code: err.code().to_string(),
        }
    }
}

/// Write committed to the file
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteStreamProgressEvent {
    pub stream_id: StreamId,

    /// Total bytes committed so far
    pub bytes_written: u64,

    /// Size of the write that produced this event
    pub last_chunk_size: u64,
}

/// Write stream consumer stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteStreamFinishEvent {
    pub stream_id: StreamId,
    pub bytes_written: u64,
    pub success: bool,
}

/// Listener slots for every stream event kind
pub(crate) struct EventHub {
    read_data: Arc<KeyedListeners<StreamId, ReadStreamDataEvent>>,
    read_progress: Arc<KeyedListeners<StreamId, ReadStreamProgressEvent>>,
    read_end: Arc<KeyedListeners<StreamId, ReadStreamEndEvent>>,
    read_error: Arc<KeyedListeners<StreamId, StreamErrorEvent>>,
    write_progress: Arc<KeyedListeners<StreamId, WriteStreamProgressEvent>>,
    write_finish: Arc<KeyedListeners<StreamId, WriteStreamFinishEvent>>,
    write_error: Arc<KeyedListeners<StreamId, StreamErrorEvent>>,
}

impl EventHub {
    pub(crate) fn new() -> Self {
        Self {
            read_data: KeyedListeners::new(),
            read_progress: KeyedListeners::new(),
            read_end: KeyedListeners::new(),
            read_error: KeyedListeners::new(),
            write_progress: KeyedListeners::new(),
            write_finish: KeyedListeners::new(),
            write_error: KeyedListeners::new(),
        }
    }

    // ===== Registration =====

    pub(crate) fn on_read_data(&self, id: &StreamId, cb: Callback<ReadStreamDataEvent>) -> Subscription {
        self.read_data.set(id.clone(), cb)
    }

    pub(crate) fn on_read_progress(
        &self,
        id: &StreamId,
        cb: Callback<ReadStreamProgressEvent>,
    ) -> Subscription {
        self.read_progress.set(id.clone(), cb)
    }

    pub(crate) fn on_read_end(&self, id: &StreamId, cb: Callback<ReadStreamEndEvent>) -> Subscription {
        self.read_end.set(id.clone(), cb)
    }

    pub(crate) fn on_read_error(&self, id: &StreamId, cb: Callback<StreamErrorEvent>) -> Subscription {
        self.read_error.set(id.clone(), cb)
    }

    pub(crate) fn on_write_progress(
        &self,
        id: &StreamId,
        cb: Callback<WriteStreamProgressEvent>,
    ) -> Subscription {
        self.write_progress.set(id.clone(), cb)
    }

    pub(crate) fn on_write_finish(
        &self,
        id: &StreamId,
        cb: Callback<WriteStreamFinishEvent>,
    ) -> Subscription {
        self.write_finish.set(id.clone(), cb)
    }

    pub(crate) fn on_write_error(&self, id: &StreamId, cb: Callback<StreamErrorEvent>) -> Subscription {
        self.write_error.set(id.clone(), cb)
    }

    // ===== Dispatch =====

    pub(crate) fn read_data(&self, event: ReadStreamDataEvent) {
        self.read_data.emit(&event.stream_id.clone(), event);
    }

    pub(crate) fn read_progress(&self, event: ReadStreamProgressEvent) {
        self.read_progress.emit(&event.stream_id.clone(), event);
    }

    pub(crate) fn read_end(&self, event: ReadStreamEndEvent) {
        self.read_end.emit(&event.stream_id.clone(), event);
    }

    pub(crate) fn read_error(&self, event: StreamErrorEvent) {
        self.read_error.emit(&event.stream_id.clone(), event);
    }

    pub(crate) fn write_progress(&self, event: WriteStreamProgressEvent) {
        self.write_progress.emit(&event.stream_id.clone(), event);
    }

    pub(crate) fn write_finish(&self, event: WriteStreamFinishEvent) {
        self.write_finish.emit(&event.stream_id.clone(), event);
    }

    pub(crate) fn write_error(&self, event: StreamErrorEvent) {
        self.write_error.emit(&event.stream_id.clone(), event);
    }

    // ===== Teardown =====

    /// Drop every read listener for `id`
    pub(crate) fn clear_read(&self, id: &StreamId) {
        self.read_data.remove(id);
        self.read_progress.remove(id);
        self.read_end.remove(id);
        self.read_error.remove(id);
    }

    /// Drop every write listener for `id`
    pub(crate) fn clear_write(&self, id: &StreamId) {
        self.write_progress.remove(id);
        self.write_finish.remove(id);
        self.write_error.remove(id);
    }

    #[cfg(test)]
    pub(crate) fn has_read_listeners(&self, id: &StreamId) -> bool {
        self.read_data.contains(id)
            || self.read_progress.contains(id)
            || self.read_end.contains(id)
            || self.read_error.contains(id)
    }
}
