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


//! One transfer attempt of a download job
//!
//! # Resume Mechanism
//! 1. A failed or cancelled attempt leaves `bytes_written` bytes on disk.
//! 2. If the server advertised `Accept-Ranges: bytes` (or already answered a
//!    range request with 206), the attempt yields a [`ResumeToken`].
//! 3. The next attempt sends `Range: bytes={bytes_written}-`, plus `If-Range`
//!    with the ETag or Last-Modified seen earlier.
//! 4. 206 appends after the kept bytes; 200 means the server ignored the
//!    range (or the resource changed) and the file is rewritten from zero.

use super::events::{DownloadBeginEvent, DownloadEvents, DownloadProgressEvent};
use super::progress::{DownloadState, ProgressThrottle};
use super::transport::{BodyStream, HttpRequest, HttpResponse, HttpTransport};
use crate::error::{Result, StreamError};
use bytes::Bytes;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// Host-facing download request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DownloadOptions {
    /// Caller-supplied id, unique among registered jobs
    pub job_id: u64,

    pub from_url: String,
    pub to_file: String,

    /// Extra request headers
    pub headers: HashMap<String, String>,

    /// Minimum milliseconds between progress events (0 = off)
    pub progress_interval: u64,

    /// Emit progress only at multiples of this percent (0 = off)
    pub progress_divider: u32,

    /// Keep partial data for `resume_download` after a stop or failure
    pub resumable: bool,

    /// Milliseconds to wait for a response head (0 = config default)
    pub connection_timeout: u64,

    /// Milliseconds to wait for each body chunk (0 = config default)
    pub read_timeout: u64,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            job_id: 0,
            from_url: String::new(),
            to_file: String::new(),
            headers: HashMap::new(),
            progress_interval: 0,
            progress_divider: 0,
            resumable: true,
            connection_timeout: 0,
            read_timeout: 0,
        }
    }
}

impl DownloadOptions {
    pub fn new(job_id: u64, from_url: impl Into<String>, to_file: impl Into<String>) -> Self {
        Self {
            job_id,
            from_url: from_url.into(),
            to_file: to_file.into(),
            ..Default::default()
        }
    }
}

/// Where a stopped transfer can pick up again
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResumeToken {
    /// Bytes already in the destination file
    pub(crate) bytes_written: u64,

    /// Full resource length, if known
    pub(crate) content_length: Option<u64>,

    /// ETag or Last-Modified for `If-Range`
    pub(crate) validator: Option<String>,
}

/// Per-job status shared between the job table and the transfer task
#[derive(Debug)]
pub(crate) struct JobStatus {
    state: Mutex<DownloadState>,
    begun: AtomicBool,
    bytes_written: AtomicU64,
}

impl JobStatus {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(DownloadState::Idle),
            begun: AtomicBool::new(false),
            bytes_written: AtomicU64::new(0),
        }
    }

    pub(crate) fn state(&self) -> DownloadState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub(crate) fn set_state(&self, state: DownloadState) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = state;
    }

    pub(crate) fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::SeqCst)
    }
}

/// Everything one attempt needs, fixed before it starts
#[derive(Debug, Clone)]
pub(crate) struct TransferPlan {
    pub(crate) job_id: u64,
    pub(crate) url: Url,
    pub(crate) dest: PathBuf,
    pub(crate) headers: HashMap<String, String>,
    pub(crate) progress_interval: u64,
    pub(crate) progress_divider: u32,
    pub(crate) connect_timeout: Option<Duration>,
    pub(crate) read_timeout: Option<Duration>,
    pub(crate) max_redirects: u32,
    pub(crate) chunk_size: usize,
    pub(crate) resume_from: Option<ResumeToken>,
}

/// Borrowed collaborators for one attempt
pub(crate) struct TransferContext<'a> {
    pub(crate) transport: &'a dyn HttpTransport,
    pub(crate) events: &'a DownloadEvents,
    pub(crate) status: &'a JobStatus,
    pub(crate) cancel: &'a CancellationToken,
}

#[derive(Debug)]
pub(crate) enum TransferOutcome {
    /// A final response was received; `bytes_written` is 0 unless 2xx
    Completed { status_code: u16, bytes_written: u64 },

    /// Stopped early; `resume` is set when the partial file is reusable
    Failed {
        error: StreamError,
        resume: Option<ResumeToken>,
    },
}

/// What the destination file holds if this attempt stops now
#[derive(Debug, Default)]
struct Partial {
    bytes_on_disk: u64,
    accepts_ranges: bool,
    content_length: Option<u64>,
    validator: Option<String>,
}

/// Run one attempt to completion, failure or cancellation
pub(crate) async fn transfer(ctx: &TransferContext<'_>, plan: &TransferPlan) -> TransferOutcome {
    let mut partial = match &plan.resume_from {
        Some(token) => Partial {
            bytes_on_disk: token.bytes_written,
            accepts_ranges: true,
            content_length: token.content_length,
            validator: token.validator.clone(),
        },
        None => Partial::default(),
    };

    match run(ctx, plan, &mut partial).await {
        Ok(outcome) => outcome,
        Err(error) => {
            let resume = (partial.accepts_ranges && partial.bytes_on_disk > 0).then(|| ResumeToken {
                bytes_written: partial.bytes_on_disk,
                content_length: partial.content_length,
                validator: partial.validator.clone(),
            });
            TransferOutcome::Failed { error, resume }
        }
    }
}

async fn run(ctx: &TransferContext<'_>, plan: &TransferPlan, partial: &mut Partial) -> Result<TransferOutcome> {
    ctx.status.set_state(DownloadState::Connecting);

    let offset = plan
        .resume_from
        .as_ref()
        .map(|token| token.bytes_written)
        .filter(|&n| n > 0);

    let mut headers = plan.headers.clone();
    headers.retain(|name, _| {
        !name.eq_ignore_ascii_case("range") && !name.eq_ignore_ascii_case("if-range")
    });
    if let Some(offset) = offset {
        headers.insert("Range".to_string(), format!("bytes={}-", offset));
        if let Some(validator) = &partial.validator {
            headers.insert("If-Range".to_string(), validator.clone());
        }
        debug!(job_id = plan.job_id, offset, "Resuming download");
    }

    let response = connect(ctx, plan, headers).await?;
    let status_code = response.status;

    if !response.is_success() {
        emit_begin(ctx, plan, &response, response.content_length);
        warn!(job_id = plan.job_id, status_code, "Download answered with non-success status");
        return Ok(TransferOutcome::Completed {
            status_code,
            bytes_written: 0,
        });
    }

    let (start_at, content_length) = match (status_code, offset) {
        (206, Some(offset)) => {
            let (range_start, total) = parse_content_range(response.header("content-range"))?;
            if range_start != offset {
                partial.accepts_ranges = false;
                return Err(StreamError::network(
                    format!("server resumed at byte {} instead of {}", range_start, offset),
                    false,
                ));
            }
            (offset, total.or(partial.content_length))
        }
        (206, None) => {
            partial.accepts_ranges = false;
            return Err(StreamError::network("unexpected partial content response", false));
        }
        (_, Some(_)) => {
            debug!(job_id = plan.job_id, status_code, "Range ignored; restarting from zero");
            (0, response.content_length)
        }
        (_, None) => (0, response.content_length),
    };

    partial.accepts_ranges = status_code == 206
        || response
            .header("accept-ranges")
            .map_or(false, |v| v.eq_ignore_ascii_case("bytes"));
    if let Some(validator) = response.header("etag").or_else(|| response.header("last-modified")) {
        partial.validator = Some(validator.to_string());
    } else if status_code != 206 {
        partial.validator = None;
    }
    partial.content_length = content_length;
    partial.bytes_on_disk = start_at;

    emit_begin(ctx, plan, &response, content_length);

    let shown = plan.dest.display().to_string();
    let file = open_destination(plan, start_at)
        .await
        .map_err(|e| StreamError::from_io(e, &shown))?;

    ctx.status.set_state(DownloadState::Transferring);
    ctx.status.bytes_written.store(start_at, Ordering::SeqCst);

    let mut writer = BufWriter::with_capacity(plan.chunk_size, file);
    let mut body = response.body;
    let mut throttle = ProgressThrottle::new(plan.progress_interval, plan.progress_divider);
    let mut total = start_at;
    let mut disk_error = false;

    let streamed: Result<()> = async {
        loop {
            let next = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return Err(StreamError::Cancelled),
                next = next_chunk(&mut body, plan.read_timeout) => next?,
            };
            let Some(bytes) = next else { break };

            for piece in bytes.chunks(plan.chunk_size) {
                if let Err(e) = writer.write_all(piece).await {
                    disk_error = true;
                    return Err(StreamError::from_io(e, &shown));
                }
                total += piece.len() as u64;
                ctx.status.bytes_written.store(total, Ordering::SeqCst);

                if throttle.should_emit(total, content_length) {
                    ctx.events.progress.emit(DownloadProgressEvent {
                        job_id: plan.job_id,
                        content_length,
                        bytes_written: total,
                    });
                }
            }
        }
        Ok(())
    }
    .await;

    let flushed = finish_file(&mut writer).await;
    if disk_error || flushed.is_err() {
        // Unknown how much of the tail reached the disk
        partial.accepts_ranges = false;
    } else {
        partial.bytes_on_disk = total;
    }
    streamed?;
    flushed.map_err(|e| StreamError::from_io(e, &shown))?;

    if let Some(length) = content_length {
        if total < length {
            return Err(StreamError::network(
                format!("connection closed after {} of {} bytes", total, length),
                true,
            ));
        }
    }

    Ok(TransferOutcome::Completed {
        status_code,
        bytes_written: total,
    })
}

/// Send the request, following up to `max_redirects` redirect hops
async fn connect(
    ctx: &TransferContext<'_>,
    plan: &TransferPlan,
    headers: HashMap<String, String>,
) -> Result<HttpResponse> {
    let mut url = plan.url.clone();
    let mut hops = 0;

    loop {
        let request = HttpRequest {
            url: url.clone(),
            headers: headers.clone(),
        };
        let response = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(StreamError::Cancelled),
            response = with_timeout(plan.connect_timeout, ctx.transport.send(request)) => response?,
        };

        if !response.is_redirect() {
            return Ok(response);
        }
        let Some(location) = response.header("location") else {
            return Ok(response);
        };
        if hops >= plan.max_redirects {
            return Err(StreamError::network(
                format!("too many redirects (limit {})", plan.max_redirects),
                false,
            ));
        }

        let next = url.join(location)?;
        debug!(job_id = plan.job_id, from = %url, to = %next, status = response.status, "Following redirect");
        // Dropping the response releases the redirecting connection
        drop(response);
        url = next;
        hops += 1;
    }
}

fn emit_begin(ctx: &TransferContext<'_>, plan: &TransferPlan, response: &HttpResponse, content_length: Option<u64>) {
    if ctx.status.begun.swap(true, Ordering::SeqCst) {
        return;
    }
    ctx.events.begin.emit(DownloadBeginEvent {
        job_id: plan.job_id,
        status_code: response.status,
        content_length,
        headers: response.headers.clone(),
    });
}

async fn open_destination(plan: &TransferPlan, start_at: u64) -> std::io::Result<File> {
    if start_at == 0 {
        return File::create(&plan.dest).await;
    }
    let mut file = OpenOptions::new().write(true).open(&plan.dest).await?;
    // Drop anything past the resume point left by a torn write
    file.set_len(start_at).await?;
    file.seek(SeekFrom::Start(start_at)).await?;
    Ok(file)
}

async fn finish_file(writer: &mut BufWriter<File>) -> std::io::Result<()> {
    writer.flush().await?;
    writer.get_mut().sync_all().await
}

async fn next_chunk(body: &mut BodyStream, limit: Option<Duration>) -> Result<Option<Bytes>> {
    with_timeout(limit, async { body.next().await.transpose() }).await
}

async fn with_timeout<T, F>(limit: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| StreamError::Timeout(limit))?,
        None => fut.await,
    }
}

/// Parse `Content-Range: bytes 1000-1999/2000` into (1000, Some(2000))
fn parse_content_range(value: Option<&str>) -> Result<(u64, Option<u64>)> {
    let invalid = || StreamError::network(format!("invalid Content-Range: {:?}", value), false);
    let value = value.ok_or_else(invalid)?;
    let spec = value.trim().strip_prefix("bytes").ok_or_else(invalid)?.trim();
    let (range, total) = spec.split_once('/').ok_or_else(invalid)?;
    let start = range
        .split_once('-')
        .and_then(|(start, _)| start.trim().parse::<u64>().ok())
        .ok_or_else(invalid)?;
    let total = match total.trim() {
        "*" => None,
        n => Some(n.parse::<u64>().map_err(|_| invalid())?),
    };
    Ok((start, total))
}
