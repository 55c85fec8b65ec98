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


//! Download events
//!
//! Download listeners are global: every subscriber sees every job and
//! filters on `job_id`. Any number of subscribers may be registered per kind.

use crate::error::StreamError;
use crate::listeners::{ListenerList, Subscription};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Response head of the first non-redirect response, once per job
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadBeginEvent {
    pub job_id: u64,
    pub status_code: u16,

    /// Full resource length when known
    pub content_length: Option<u64>,

    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgressEvent {
    pub job_id: u64,
    pub content_length: Option<u64>,

    /// Bytes in the destination file so far
    pub bytes_written: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadCompleteEvent {
    pub job_id: u64,
    pub status_code: u16,

    /// 0 for a non-2xx response
    pub bytes_written: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadErrorEvent {
    pub job_id: u64,
    pub error: String,
    pub code: String,
}

impl DownloadErrorEvent {
    pub(crate) fn new(job_id: u64, err: &StreamError) -> Self {
        Self {
            job_id,
            error: err.to_string(),
            code: err.code().to_string(),
        }
    }
}

/// Job stopped with partial data and a resume token
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResumableEvent {
    pub job_id: u64,
    pub bytes_written: u64,
}

pub(crate) struct DownloadEvents {
    pub(crate) begin: Arc<ListenerList<DownloadBeginEvent>>,
    pub(crate) progress: Arc<ListenerList<DownloadProgressEvent>>,
    pub(crate) complete: Arc<ListenerList<DownloadCompleteEvent>>,
    pub(crate) error: Arc<ListenerList<DownloadErrorEvent>>,
    pub(crate) can_be_resumed: Arc<ListenerList<DownloadResumableEvent>>,
}

impl DownloadEvents {
    pub(crate) fn new() -> Self {
        Self {
            begin: ListenerList::new(),
            progress: ListenerList::new(),
            complete: ListenerList::new(),
            error: ListenerList::new(),
            can_be_resumed: ListenerList::new(),
        }
    }

    pub(crate) fn subscribe_begin(&self, cb: impl Fn(DownloadBeginEvent) + Send + Sync + 'static) -> Subscription {
        self.begin.add(Arc::new(cb))
    }

    pub(crate) fn subscribe_progress(
        &self,
        cb: impl Fn(DownloadProgressEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.progress.add(Arc::new(cb))
    }

    pub(crate) fn subscribe_complete(
        &self,
        cb: impl Fn(DownloadCompleteEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.complete.add(Arc::new(cb))
    }

    pub(crate) fn subscribe_error(&self, cb: impl Fn(DownloadErrorEvent) + Send + Sync + 'static) -> Subscription {
        self.error.add(Arc::new(cb))
    }

    pub(crate) fn subscribe_can_be_resumed(
        &self,
        cb: impl Fn(DownloadResumableEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.can_be_resumed.add(Arc::new(cb))
    }

    /// Total registered listeners across all kinds
    pub(crate) fn listener_count(&self) -> usize {
        self.begin.len()
            + self.progress.len()
            + self.complete.len()
            + self.error.len()
            + self.can_be_resumed.len()
    }
}
