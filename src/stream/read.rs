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


//! Read stream sessions
//!
//! # Lifecycle
//! 1. `create`: the path must be a regular file; the handle is opened but
//!    nothing is read.
//! 2. `start`: spawns the read loop, which owns the handle from then on.
//! 3. The loop ends on EOF, range end, I/O error, or cancellation.
//! 4. The session leaves the registry once, either from the loop's own
//!    cleanup or from `close`.
//!
//! # Pause
//! The pause gate is a `watch` channel checked between chunks. A chunk whose
//! read already started completes and is emitted before the loop suspends.

use super::engine::EngineShared;
use super::events::{ReadStreamDataEvent, ReadStreamEndEvent, ReadStreamProgressEvent, StreamErrorEvent};
use super::options::{ReadStreamOptions, StreamId};
use crate::error::{Result, StreamError};
use bytes::Bytes;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Live state for one read stream
pub(crate) struct ReadSession {
    id: StreamId,
    path: PathBuf,
    buffer_size: usize,
    start: u64,
    end: Option<u64>,

    /// File length when the session was created
    total_bytes: u64,

    /// Handle waiting for `start`; the read loop takes it
    file: Mutex<Option<File>>,

    started: AtomicBool,
    running: AtomicBool,

    /// Next offset to read
    position: AtomicU64,

    paused: watch::Sender<bool>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ReadSession {
    fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    pub(crate) fn is_active(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.is_paused()
    }

    pub(crate) fn position(&self) -> u64 {
        self.position.load(Ordering::SeqCst)
    }
}

/// Open `path` for reading and register a session that has not started
pub(crate) async fn create(
    shared: &Arc<EngineShared>,
    path: &str,
    options: ReadStreamOptions,
) -> Result<StreamId> {
    options.validate()?;
    let resolved = shared.resolver.resolve(path)?;
    let shown = resolved.display().to_string();

    let metadata = tokio::fs::metadata(&resolved)
        .await
        .map_err(|e| StreamError::from_io(e, &shown))?;
    if !metadata.is_file() {
        return Err(StreamError::NotFound(shown));
    }

    let file = File::open(&resolved)
        .await
        .map_err(|e| StreamError::from_io(e, &shown))?;

    let id = StreamId::generate();
    let start = options.start.unwrap_or(0);
    let (paused, _) = watch::channel(false);
    let session = Arc::new(ReadSession {
        id: id.clone(),
        path: resolved,
        buffer_size: options.buffer_size.unwrap_or(shared.config.default_buffer_size),
        start,
        end: options.end,
        total_bytes: metadata.len(),
        file: Mutex::new(Some(file)),
        started: AtomicBool::new(false),
        running: AtomicBool::new(false),
        position: AtomicU64::new(start),
        paused,
        cancel: CancellationToken::new(),
        task: Mutex::new(None),
    });

    shared.reads.insert(id.clone(), session);
    debug!(stream_id = %id, path = %shown, "Read stream created");
    Ok(id)
}

fn lookup(shared: &EngineShared, id: &StreamId) -> Result<Arc<ReadSession>> {
    shared
        .reads
        .get(id)
        .ok_or_else(|| StreamError::InvalidStream(id.to_string()))
}

/// Spawn the read loop; a no-op when already started
pub(crate) fn start(shared: &Arc<EngineShared>, id: &StreamId) -> Result<()> {
    let session = lookup(shared, id)?;

    let mut task = session.task.lock().unwrap_or_else(|p| p.into_inner());
    if session.started.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    let file = session
        .file
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .take()
        .ok_or_else(|| StreamError::StreamClosed(id.to_string()))?;

    session.running.store(true, Ordering::SeqCst);
    // The loop clears this slot on exit, so it must be filled before the
    // lock is released.
    *task = Some(tokio::spawn(run(Arc::clone(shared), Arc::clone(&session), file)));

    debug!(stream_id = %id, "Read stream started");
    Ok(())
}

pub(crate) fn pause(shared: &EngineShared, id: &StreamId) -> Result<()> {
    let session = lookup(shared, id)?;
    if !session.running.load(Ordering::SeqCst) || session.is_paused() {
        return Ok(());
    }
    session.paused.send_replace(true);
    debug!(stream_id = %id, position = session.position(), "Read stream paused");
    Ok(())
}

pub(crate) fn resume(shared: &EngineShared, id: &StreamId) -> Result<()> {
    let session = lookup(shared, id)?;
    if !session.started.load(Ordering::SeqCst) {
        return Err(StreamError::io("Cannot resume: stream not started"));
    }
    if !session.is_paused() {
        return Ok(());
    }
    session.paused.send_replace(false);
    debug!(stream_id = %id, "Read stream resumed");
    Ok(())
}

pub(crate) fn is_active(shared: &EngineShared, id: &StreamId) -> Result<bool> {
    Ok(lookup(shared, id)?.is_active())
}

/// Stop the loop, wait for it, release the handle and listeners
pub(crate) async fn close(shared: &EngineShared, id: &StreamId) -> Result<()> {
    let session = shared
        .reads
        .remove(id)
        .ok_or_else(|| StreamError::InvalidStream(id.to_string()))?;

    session.cancel.cancel();
    let handle = session.task.lock().unwrap_or_else(|p| p.into_inner()).take();
    if let Some(handle) = handle {
        if let Err(e) = handle.await {
            error!(stream_id = %id, "Read task failed: {}", e);
        }
    }
    session.running.store(false, Ordering::SeqCst);

    // A stream that never started still holds its handle here
    drop(session.file.lock().unwrap_or_else(|p| p.into_inner()).take());

    shared.events.clear_read(id);
    debug!(stream_id = %id, "Read stream closed");
    Ok(())
}

/// Background task body
async fn run(shared: Arc<EngineShared>, session: Arc<ReadSession>, mut file: File) {
    let outcome = read_chunks(&shared, &session, &mut file).await;
    drop(file);
    session.running.store(false, Ordering::SeqCst);

    match outcome {
        Ok(bytes_read) => {
            debug!(stream_id = %session.id, bytes_read, "Read stream finished");
            shared.events.read_end(ReadStreamEndEvent {
                stream_id: session.id.clone(),
                bytes_read,
                success: true,
            });
        }
        Err(StreamError::Cancelled) => {
            debug!(stream_id = %session.id, "Read stream cancelled");
        }
        Err(e) => {
            error!(stream_id = %session.id, "Read stream failed: {}", e);
            shared.events.read_error(StreamErrorEvent::new(&session.id, &e));
        }
    }

    drop(session.task.lock().unwrap_or_else(|p| p.into_inner()).take());
    if shared.reads.remove(&session.id).is_some() {
        shared.events.clear_read(&session.id);
    }
}

async fn read_chunks(shared: &EngineShared, session: &ReadSession, file: &mut File) -> Result<u64> {
    let shown = session.path.display().to_string();
    if session.start > 0 {
        file.seek(SeekFrom::Start(session.start))
            .await
            .map_err(|e| StreamError::from_io(e, &shown))?;
    }

    let mut gate = session.paused.subscribe();
    let mut position = session.start;
    let mut bytes_read: u64 = 0;
    let mut chunk: u64 = 0;

    loop {
        wait_while_paused(&mut gate, &session.cancel).await?;

        let to_read = match session.end {
            Some(end) if position > end => break,
            Some(end) => (session.buffer_size as u64).min((end - position).saturating_add(1)) as usize,
            None => session.buffer_size,
        };

        let mut buffer = shared.pool.lease(Some(to_read));
        let n = tokio::select! {
            biased;
            _ = session.cancel.cancelled() => return Err(StreamError::Cancelled),
            read = file.read(&mut buffer[..to_read]) => {
                read.map_err(|e| StreamError::from_io(e, &shown))?
            }
        };
        if n == 0 {
            break;
        }

        shared.events.read_data(ReadStreamDataEvent {
            stream_id: session.id.clone(),
            data: Bytes::copy_from_slice(&buffer[..n]),
            chunk,
            position,
        });
        drop(buffer);

        position += n as u64;
        bytes_read += n as u64;
        chunk += 1;
        session.position.store(position, Ordering::SeqCst);

        shared.events.read_progress(ReadStreamProgressEvent {
            stream_id: session.id.clone(),
            bytes_read,
            total_bytes: session.total_bytes,
            progress: if session.total_bytes == 0 {
                0.0
            } else {
                bytes_read as f64 / session.total_bytes as f64
            },
        });
    }

    Ok(bytes_read)
}

/// Suspend until the gate opens; cancellation wins over a pending resume
async fn wait_while_paused(gate: &mut watch::Receiver<bool>, cancel: &CancellationToken) -> Result<()> {
    loop {
        if cancel.is_cancelled() {
            return Err(StreamError::Cancelled);
        }
        if !*gate.borrow_and_update() {
            return Ok(());
        }
        tokio::select! {
            _ = cancel.cancelled() => return Err(StreamError::Cancelled),
            changed = gate.changed() => {
                if changed.is_err() {
                    return Err(StreamError::Cancelled);
                }
            }
        }
    }
}
