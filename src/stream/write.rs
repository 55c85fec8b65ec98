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


//! Write stream sessions
//!
//! A write stream is a bounded FIFO of requests drained by one consumer
//! task, spawned as soon as the file is opened. Callers never touch the
//! handle; they enqueue copies of their bytes and the consumer commits them
//! in enqueue order.
//!
//! # Stop paths
//! - An end marker from `end`/`close`.
//! - The first write or sync error.
//! - Engine shutdown (cancellation).
//!
//! Every stop path flushes, closes the handle and emits exactly one finish
//! event.

use super::engine::EngineShared;
use super::events::{StreamErrorEvent, WriteStreamFinishEvent, WriteStreamProgressEvent};
use super::options::{StreamId, WriteStreamOptions};
use crate::error::{Result, StreamError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Request consumed by the write task
enum WriteRequest {
    Data(Vec<u8>),
    Flush,
    End,
}

/// Live state for one write stream
pub(crate) struct WriteSession {
    id: StreamId,
    path: PathBuf,

    /// `None` once an end marker was sent
    sender: Mutex<Option<mpsc::Sender<WriteRequest>>>,

    running: AtomicBool,

    /// Bytes committed to the handle
    position: AtomicU64,

    cancel: CancellationToken,
    task: std::sync::Mutex<Option<JoinHandle<WriteStreamFinishEvent>>>,
}

impl WriteSession {
    pub(crate) fn is_active(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn position(&self) -> u64 {
        self.position.load(Ordering::SeqCst)
    }

    async fn enqueue(&self, request: WriteRequest) -> Result<()> {
        if !self.is_active() {
            return Err(StreamError::StreamInactive(self.id.to_string()));
        }
        // Holding the lock across `send` keeps concurrent callers in order
        let sender = self.sender.lock().await;
        let sender = sender
            .as_ref()
            .ok_or_else(|| StreamError::StreamClosed(self.id.to_string()))?;
        sender
            .send(request)
            .await
            .map_err(|_| StreamError::StreamInactive(self.id.to_string()))
    }

    /// Send the end marker and wait for the consumer's summary
    async fn finish(&self) -> Result<WriteStreamFinishEvent> {
        if let Some(sender) = self.sender.lock().await.take() {
            // Fails only when the consumer already stopped on its own
            let _ = sender.send(WriteRequest::End).await;
        }

        let handle = self.task.lock().unwrap_or_else(|p| p.into_inner()).take();
        match handle {
            Some(handle) => handle
                .await
                .map_err(|e| StreamError::io(format!("write task failed: {}", e))),
            None => Err(StreamError::StreamClosed(self.id.to_string())),
        }
    }
}

/// Open `path` for writing and spawn its consumer
pub(crate) async fn create(
    shared: &Arc<EngineShared>,
    path: &str,
    options: WriteStreamOptions,
) -> Result<StreamId> {
    options.validate()?;
    let resolved = shared.resolver.resolve(path)?;
    let shown = resolved.display().to_string();

    if options.create_directories {
        if let Some(parent) = resolved.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StreamError::from_io(e, &parent.display().to_string()))?;
        }
    }

    let mut open = OpenOptions::new();
    open.write(true).create(true);
    if options.append {
        open.append(true);
    } else {
        open.truncate(true);
    }
    let file = open
        .open(&resolved)
        .await
        .map_err(|e| StreamError::from_io(e, &shown))?;

    let id = StreamId::generate();
    let (tx, rx) = mpsc::channel(shared.config.write_queue_depth);
    let session = Arc::new(WriteSession {
        id: id.clone(),
        path: resolved,
        sender: Mutex::new(Some(tx)),
        running: AtomicBool::new(true),
        position: AtomicU64::new(0),
        cancel: CancellationToken::new(),
        task: std::sync::Mutex::new(None),
    });

    shared.writes.insert(id.clone(), Arc::clone(&session));
    {
        let mut task = session.task.lock().unwrap_or_else(|p| p.into_inner());
        *task = Some(tokio::spawn(run(Arc::clone(shared), Arc::clone(&session), file, rx)));
    }

    debug!(stream_id = %id, path = %shown, append = options.append, "Write stream created");
    Ok(id)
}

fn lookup(shared: &EngineShared, id: &StreamId) -> Result<Arc<WriteSession>> {
    shared
        .writes
        .get(id)
        .ok_or_else(|| StreamError::InvalidStream(id.to_string()))
}

/// Queue a copy of `data`
pub(crate) async fn write(shared: &EngineShared, id: &StreamId, data: &[u8]) -> Result<()> {
    let session = lookup(shared, id)?;
    let payload = copy_payload(data)?;
    session.enqueue(WriteRequest::Data(payload)).await
}

pub(crate) async fn flush(shared: &EngineShared, id: &StreamId) -> Result<()> {
    lookup(shared, id)?.enqueue(WriteRequest::Flush).await
}

/// Drain the queue and wait for the consumer to stop
pub(crate) async fn end(shared: &EngineShared, id: &StreamId) -> Result<WriteStreamFinishEvent> {
    lookup(shared, id)?.finish().await
}

/// Like [`end`], but the id is unusable as soon as this is called
pub(crate) async fn close(shared: &EngineShared, id: &StreamId) -> Result<WriteStreamFinishEvent> {
    let session = shared
        .writes
        .remove(id)
        .ok_or_else(|| StreamError::InvalidStream(id.to_string()))?;

    let result = session.finish().await;
    shared.events.clear_write(id);
    debug!(stream_id = %id, "Write stream closed");
    result
}

/// Stop the consumer without draining pending writes
pub(crate) async fn abort(shared: &EngineShared, id: &StreamId) -> Result<WriteStreamFinishEvent> {
    let session = shared
        .writes
        .remove(id)
        .ok_or_else(|| StreamError::InvalidStream(id.to_string()))?;

    session.cancel.cancel();
    let result = session.finish().await;
    shared.events.clear_write(id);
    result
}

pub(crate) fn is_active(shared: &EngineShared, id: &StreamId) -> Result<bool> {
    Ok(lookup(shared, id)?.is_active())
}

pub(crate) fn position(shared: &EngineShared, id: &StreamId) -> Result<u64> {
    Ok(lookup(shared, id)?.position())
}

fn copy_payload(data: &[u8]) -> Result<Vec<u8>> {
    let mut payload = Vec::new();
    payload
        .try_reserve_exact(data.len())
        .map_err(|e| StreamError::BufferError(format!("cannot copy {} bytes: {}", data.len(), e)))?;
    payload.extend_from_slice(data);
    Ok(payload)
}

/// Background consumer body
async fn run(
    shared: Arc<EngineShared>,
    session: Arc<WriteSession>,
    mut file: File,
    mut queue: mpsc::Receiver<WriteRequest>,
) -> WriteStreamFinishEvent {
    let shown = session.path.display().to_string();
    let mut failure: Option<StreamError> = None;

    loop {
        let request = tokio::select! {
            biased;
            _ = session.cancel.cancelled() => break,
            request = queue.recv() => request,
        };

        match request {
            Some(WriteRequest::Data(bytes)) => {
                if let Err(e) = commit(&mut file, &bytes).await {
                    failure = Some(StreamError::from_io(e, &shown));
                    break;
                }
                let bytes_written = session.position.fetch_add(bytes.len() as u64, Ordering::SeqCst)
                    + bytes.len() as u64;
                shared.events.write_progress(WriteStreamProgressEvent {
                    stream_id: session.id.clone(),
                    bytes_written,
                    last_chunk_size: bytes.len() as u64,
                });
            }
            Some(WriteRequest::Flush) => {
                if let Err(e) = file.sync_all().await {
                    failure = Some(StreamError::from_io(e, &shown));
                    break;
                }
            }
            Some(WriteRequest::End) | None => break,
        }
    }

    session.running.store(false, Ordering::SeqCst);
    queue.close();

    if let Err(e) = finalize(file).await {
        if failure.is_none() {
            failure = Some(StreamError::from_io(e, &shown));
        }
    }

    if let Some(err) = &failure {
        error!(stream_id = %session.id, "Write stream failed: {}", err);
        shared.events.write_error(StreamErrorEvent::new(&session.id, err));
    }

    let finish = WriteStreamFinishEvent {
        stream_id: session.id.clone(),
        bytes_written: session.position(),
        success: failure.is_none(),
    };
    debug!(
        stream_id = %session.id,
        bytes_written = finish.bytes_written,
        success = finish.success,
        "Write stream finished"
    );
    shared.events.write_finish(finish.clone());

    if shared.writes.remove(&session.id).is_some() {
        shared.events.clear_write(&session.id);
    }
    finish
}

async fn commit(file: &mut File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    // tokio hands writes to a blocking thread; wait for it so the cursor
    // only counts bytes the handle accepted
    file.flush().await
}

async fn finalize(mut file: File) -> std::io::Result<()> {
    file.flush().await?;
    file.sync_all().await
}
