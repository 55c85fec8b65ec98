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


//! Chunked read and write streams over local files
//!
//! # Architecture
//! - [`StreamEngine`]: facade holding the registries, listener hub and pool
//! - `read`: read sessions, started on demand, pausable
//! - `write`: write sessions, a FIFO of requests drained by one task
//! - [`events`]: event payloads and the per-stream listener slots
//! - [`helpers`]: whole-file read, write, copy and chunk processing
//!
//! Each stream runs on its own tokio task. Callers only ever hold a
//! [`StreamId`]; the session itself stays inside the engine.

pub mod engine;
pub mod events;
pub mod helpers;
pub mod options;
pub mod resolver;

mod read;
mod registry;
mod write;

// Re-export commonly used types
pub use engine::StreamEngine;
pub use events::{
    ReadStreamDataEvent, ReadStreamEndEvent, ReadStreamProgressEvent, StreamErrorEvent,
    WriteStreamFinishEvent, WriteStreamProgressEvent,
};
pub use helpers::{
    copy_file_with_progress, process_file_in_chunks, read_file_via_stream, write_file_via_stream,
    DEFAULT_COPY_BUFFER_SIZE,
};
pub use options::{ReadStreamOptions, StreamId, WriteStreamOptions};
pub use resolver::{IdentityResolver, PathResolver};
