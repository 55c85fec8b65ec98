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


//! Whole-file operations built on the public stream API
//!
//! Stream callbacks are synchronous, so each helper forwards read events into
//! a channel and does its async work (writes, user processors) on the
//! caller's task. When the consumer falls behind, the read stream is paused
//! until the backlog drains.

use super::engine::StreamEngine;
use super::events::{ReadStreamDataEvent, ReadStreamProgressEvent, StreamErrorEvent, WriteStreamFinishEvent};
use super::options::{ReadStreamOptions, StreamId, WriteStreamOptions};
use crate::error::{Result, StreamError};
use crate::listeners::Subscription;
use bytes::Bytes;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

/// Chunk size used by `copy_file_with_progress` when none is given
pub const DEFAULT_COPY_BUFFER_SIZE: usize = 16384;

/// Pause the source once this many chunks wait unprocessed
const BACKLOG_HIGH_WATER: usize = 32;

/// Resume the source once the backlog is down to this
const BACKLOG_LOW_WATER: usize = 4;

enum Delivery {
    Chunk(ReadStreamDataEvent),
    Progress(ReadStreamProgressEvent),
    End(u64),
    Failed(StreamErrorEvent),
}

/// A read stream whose events arrive through a channel
struct ReadPump {
    engine: StreamEngine,
    id: StreamId,
    rx: mpsc::UnboundedReceiver<Delivery>,
    backlog: Arc<AtomicUsize>,
    paused: bool,
    subscriptions: Vec<Subscription>,
}

impl ReadPump {
    async fn open(engine: &StreamEngine, path: &str, options: ReadStreamOptions) -> Result<Self> {
        let id = engine.create_read_stream(path, options).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let backlog = Arc::new(AtomicUsize::new(0));

        let data_tx = tx.clone();
        let data_backlog = Arc::clone(&backlog);
        let progress_tx = tx.clone();
        let end_tx = tx.clone();
        let subscriptions = vec![
            engine.listen_to_read_stream_data(&id, move |event| {
                data_backlog.fetch_add(1, Ordering::SeqCst);
                let _ = data_tx.send(Delivery::Chunk(event));
            }),
            engine.listen_to_read_stream_progress(&id, move |event| {
                let _ = progress_tx.send(Delivery::Progress(event));
            }),
            engine.listen_to_read_stream_end(&id, move |event| {
                let _ = end_tx.send(Delivery::End(event.bytes_read));
            }),
            engine.listen_to_read_stream_error(&id, move |event| {
                let _ = tx.send(Delivery::Failed(event));
            }),
        ];

        Ok(Self {
            engine: engine.clone(),
            id,
            rx,
            backlog,
            paused: false,
            subscriptions,
        })
    }

    async fn start(&self) -> Result<()> {
        self.engine.start_read_stream(&self.id).await
    }

    /// Next event; `None` when the stream was closed by someone else
    async fn next(&mut self) -> Option<Delivery> {
        let delivery = self.rx.recv().await?;
        if matches!(delivery, Delivery::Chunk(_)) {
            let pending = self.backlog.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
            self.regulate(pending).await;
        }
        Some(delivery)
    }

    async fn regulate(&mut self, pending: usize) {
        if !self.paused && pending >= BACKLOG_HIGH_WATER {
            // Fails only once the stream already ended
            if self.engine.pause_read_stream(&self.id).await.is_ok() {
                debug!(stream_id = %self.id, pending, "Pausing source until backlog drains");
                self.paused = true;
            }
        } else if self.paused && pending <= BACKLOG_LOW_WATER {
            let _ = self.engine.resume_read_stream(&self.id).await;
            self.paused = false;
        }
    }

    /// Stop the read stream early
    async fn abandon(&self) {
        if let Err(e) = self.engine.close_read_stream(&self.id).await {
            debug!(stream_id = %self.id, "Read stream already finished: {}", e);
        }
    }
}

impl Drop for ReadPump {
    fn drop(&mut self) {
        for subscription in &self.subscriptions {
            subscription.unsubscribe();
        }
    }
}

fn stream_failure(event: StreamErrorEvent) -> StreamError {
    match event.code.as_str() {
        "ENOENT" => StreamError::NotFound(event.error),
        "EACCES" => StreamError::AccessDenied(event.error),
        _ => StreamError::IoError(event.error),
    }
}

/// Read a whole file through a read stream
pub async fn read_file_via_stream(
    engine: &StreamEngine,
    path: &str,
    options: ReadStreamOptions,
) -> Result<Vec<u8>> {
    let mut pump = ReadPump::open(engine, path, options).await?;
    pump.start().await?;

    let mut content = Vec::new();
    while let Some(delivery) = pump.next().await {
        match delivery {
            Delivery::Chunk(event) => content.extend_from_slice(&event.data),
            Delivery::Progress(_) => {}
            Delivery::End(_) => return Ok(content),
            Delivery::Failed(event) => return Err(stream_failure(event)),
        }
    }
    Err(StreamError::StreamClosed(pump.id.to_string()))
}

/// Write `data` through a write stream and close it
pub async fn write_file_via_stream(
    engine: &StreamEngine,
    path: &str,
    data: &[u8],
    options: WriteStreamOptions,
) -> Result<WriteStreamFinishEvent> {
    let chunk_size = options
        .buffer_size
        .unwrap_or(engine.config().default_buffer_size);
    let id = engine.create_write_stream(path, options).await?;

    let failure: Arc<Mutex<Option<StreamErrorEvent>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&failure);
    let errors = engine.listen_to_write_stream_error(&id, move |event| {
        *slot.lock().unwrap_or_else(|p| p.into_inner()) = Some(event);
    });

    let mut write_result = Ok(());
    for chunk in data.chunks(chunk_size.max(1)) {
        if let Err(e) = engine.write_to_stream(&id, chunk).await {
            write_result = Err(e);
            break;
        }
    }
    let close_result = engine.close_write_stream(&id).await;
    errors.unsubscribe();

    let captured = failure.lock().unwrap_or_else(|p| p.into_inner()).take();
    if let Some(event) = captured {
        return Err(stream_failure(event));
    }
    write_result?;
    let finish = close_result?;
    if !finish.success {
        return Err(StreamError::io(format!("write to {} did not complete", path)));
    }
    Ok(finish)
}

/// Copy `source` to `dest` chunk by chunk, reporting a 0..=1 progress ratio
///
/// Returns the number of bytes written to `dest`.
pub async fn copy_file_with_progress<P>(
    engine: &StreamEngine,
    source: &str,
    dest: &str,
    buffer_size: Option<usize>,
    mut on_progress: P,
) -> Result<u64>
where
    P: FnMut(f64),
{
    let buffer_size = buffer_size.unwrap_or(DEFAULT_COPY_BUFFER_SIZE);
    let mut pump = ReadPump::open(
        engine,
        source,
        ReadStreamOptions::default().with_buffer_size(buffer_size),
    )
    .await?;

    let sink = match engine
        .create_write_stream(
            dest,
            WriteStreamOptions {
                buffer_size: Some(buffer_size),
                ..Default::default()
            },
        )
        .await
    {
        Ok(id) => id,
        Err(e) => {
            pump.abandon().await;
            return Err(e);
        }
    };

    let outcome = pipe(&mut pump, engine, &sink, &mut on_progress).await;
    if outcome.is_err() {
        pump.abandon().await;
    }
    let finish = engine.close_write_stream(&sink).await;
    outcome?;

    let finish = finish?;
    if !finish.success {
        return Err(StreamError::io(format!("copy to {} did not complete", dest)));
    }
    Ok(finish.bytes_written)
}

async fn pipe<P>(pump: &mut ReadPump, engine: &StreamEngine, sink: &StreamId, on_progress: &mut P) -> Result<()>
where
    P: FnMut(f64),
{
    pump.start().await?;
    while let Some(delivery) = pump.next().await {
        match delivery {
            Delivery::Chunk(event) => engine.write_to_stream(sink, &event.data).await?,
            Delivery::Progress(event) => on_progress(event.progress),
            Delivery::End(_) => return Ok(()),
            Delivery::Failed(event) => return Err(stream_failure(event)),
        }
    }
    Err(StreamError::StreamClosed(pump.id.to_string()))
}

/// Run an async processor over every chunk of a file, in order
///
/// The processor receives the chunk, its 0-based index and its file offset.
/// The first processor error stops the read and is returned. Returns the
/// number of bytes read.
pub async fn process_file_in_chunks<F, Fut>(
    engine: &StreamEngine,
    path: &str,
    options: ReadStreamOptions,
    mut processor: F,
) -> Result<u64>
where
    F: FnMut(Bytes, u64, u64) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut pump = ReadPump::open(engine, path, options).await?;
    pump.start().await?;

    while let Some(delivery) = pump.next().await {
        match delivery {
            Delivery::Chunk(event) => {
                if let Err(e) = processor(event.data, event.chunk, event.position).await {
                    pump.abandon().await;
                    return Err(e);
                }
            }
            Delivery::Progress(_) => {}
            Delivery::End(bytes_read) => return Ok(bytes_read),
            Delivery::Failed(event) => return Err(stream_failure(event)),
        }
    }
    Err(StreamError::StreamClosed(pump.id.to_string()))
}
