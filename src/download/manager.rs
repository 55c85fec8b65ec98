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


//! Download job table
//!
//! # Job lifecycle
//! - `download_file` validates the URL and destination, registers the job and
//!   spawns its first attempt.
//! - Completion and non-resumable failure remove the job.
//! - A stop or failure that leaves reusable partial data keeps the job with
//!   a resume token; `resume_download` consumes the token.
//!
//! Distinct job ids run concurrently; one job has at most one attempt in
//! flight.

use super::events::{
    DownloadBeginEvent, DownloadCompleteEvent, DownloadErrorEvent, DownloadEvents, DownloadProgressEvent,
    DownloadResumableEvent,
};
use super::job::{transfer, DownloadOptions, JobStatus, ResumeToken, TransferContext, TransferOutcome, TransferPlan};
use super::progress::DownloadState;
use super::transport::{HttpTransport, ReqwestTransport};
use crate::config::{millis, DownloadConfig};
use crate::error::{Result, StreamError};
use crate::listeners::Subscription;
use crate::stream::{IdentityResolver, PathResolver};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

/// Registered job
struct JobEntry {
    url: Url,
    dest: PathBuf,
    options: DownloadOptions,
    status: Arc<JobStatus>,

    /// Present only while stopped with reusable partial data
    resume_token: Option<ResumeToken>,

    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

struct ManagerShared {
    config: DownloadConfig,
    transport: Arc<dyn HttpTransport>,
    resolver: Arc<dyn PathResolver>,

    /// Registered jobs (job id -> entry)
    jobs: RwLock<HashMap<u64, JobEntry>>,

    events: DownloadEvents,
}

/// Resumable downloader managing concurrent jobs
#[derive(Clone)]
pub struct DownloadManager {
    shared: Arc<ManagerShared>,
}

impl DownloadManager {
    /// Create a manager using the reqwest transport
    pub fn new(config: DownloadConfig) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(&config)?);
        Self::with_transport(config, transport)
    }

    /// Create a manager with a custom transport
    pub fn with_transport(config: DownloadConfig, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        Self::with_resolver(config, transport, Arc::new(IdentityResolver))
    }

    /// Create a manager with a custom transport and destination resolver
    pub fn with_resolver(
        config: DownloadConfig,
        transport: Arc<dyn HttpTransport>,
        resolver: Arc<dyn PathResolver>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(ManagerShared {
                config,
                transport,
                resolver,
                jobs: RwLock::new(HashMap::new()),
                events: DownloadEvents::new(),
            }),
        })
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.shared.config
    }

    /// Start a download; returns the job id once the first attempt is spawned
    ///
    /// Fails without registering anything when the URL is not http(s), the
    /// destination is not writable, or the job id is already registered.
    pub async fn download_file(&self, options: DownloadOptions) -> Result<u64> {
        let url = parse_download_url(&options.from_url)?;
        let dest = self.shared.resolver.resolve(&options.to_file)?;
        ensure_writable(&dest).await?;

        let job_id = options.job_id;
        let mut jobs = self.shared.jobs.write().await;
        if jobs.contains_key(&job_id) {
            return Err(StreamError::JobExists(job_id));
        }

        let mut entry = JobEntry {
            url,
            dest,
            options,
            status: Arc::new(JobStatus::new()),
            resume_token: None,
            cancel: CancellationToken::new(),
            handle: None,
        };
        spawn_attempt(&self.shared, job_id, &mut entry, None);
        info!(job_id, url = %entry.url, dest = %entry.dest.display(), "Download started");
        jobs.insert(job_id, entry);
        Ok(job_id)
    }

    /// Cancel the job's transfer and wait for it to settle
    ///
    /// The job stays registered if the partial file can be resumed. Stopping
    /// a job that is already stopped discards its resume token.
    pub async fn stop_download(&self, job_id: u64) -> Result<()> {
        let handle = {
            let mut jobs = self.shared.jobs.write().await;
            let entry = jobs.get_mut(&job_id).ok_or(StreamError::JobNotFound(job_id))?;
            match entry.handle.take() {
                Some(handle) => {
                    entry.cancel.cancel();
                    handle
                }
                None => {
                    jobs.remove(&job_id);
                    debug!(job_id, "Discarded stopped download");
                    return Ok(());
                }
            }
        };

        if let Err(e) = handle.await {
            error!(job_id, "Download task failed: {}", e);
        }
        Ok(())
    }

    /// Continue a stopped job from its resume token
    pub async fn resume_download(&self, job_id: u64) -> Result<()> {
        let mut jobs = self.shared.jobs.write().await;
        let entry = jobs.get_mut(&job_id).ok_or(StreamError::JobNotFound(job_id))?;
        if entry.status.state().is_running() {
            return Err(StreamError::InvalidState(format!(
                "download {} is already transferring",
                job_id
            )));
        }
        let token = entry
            .resume_token
            .take()
            .ok_or(StreamError::NotResumable(job_id))?;

        info!(job_id, offset = token.bytes_written, "Download resumed");
        spawn_attempt(&self.shared, job_id, entry, Some(token));
        Ok(())
    }

    /// True iff the job holds a resume token
    pub async fn is_resumable(&self, job_id: u64) -> bool {
        self.shared
            .jobs
            .read()
            .await
            .get(&job_id)
            .map_or(false, |entry| entry.resume_token.is_some())
    }

    /// State of a registered job
    pub async fn job_state(&self, job_id: u64) -> Option<DownloadState> {
        self.shared
            .jobs
            .read()
            .await
            .get(&job_id)
            .map(|entry| entry.status.state())
    }

    /// Bytes in the destination file of a registered job
    pub async fn bytes_written(&self, job_id: u64) -> Option<u64> {
        self.shared
            .jobs
            .read()
            .await
            .get(&job_id)
            .map(|entry| match &entry.resume_token {
                Some(token) => token.bytes_written,
                None => entry.status.bytes_written(),
            })
    }

    /// Ids of every registered job, running or stopped
    pub async fn active_jobs(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.shared.jobs.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Cancel every running transfer and wait for all of them
    pub async fn shutdown(&self) {
        let handles: Vec<(u64, JoinHandle<()>)> = {
            let mut jobs = self.shared.jobs.write().await;
            jobs.iter_mut()
                .filter_map(|(id, entry)| {
                    entry.handle.take().map(|handle| {
                        entry.cancel.cancel();
                        (*id, handle)
                    })
                })
                .collect()
        };

        for (job_id, handle) in handles {
            if let Err(e) = handle.await {
                error!(job_id, "Download task failed: {}", e);
            }
        }
        info!("Download manager shut down");
    }

    // ===== Event Listeners =====

    pub fn listen_to_download_begin<F>(&self, callback: F) -> Subscription
    where
        F: Fn(DownloadBeginEvent) + Send + Sync + 'static,
    {
        self.shared.events.subscribe_begin(callback)
    }

    pub fn listen_to_download_progress<F>(&self, callback: F) -> Subscription
    where
        F: Fn(DownloadProgressEvent) + Send + Sync + 'static,
    {
        self.shared.events.subscribe_progress(callback)
    }

    pub fn listen_to_download_complete<F>(&self, callback: F) -> Subscription
    where
        F: Fn(DownloadCompleteEvent) + Send + Sync + 'static,
    {
        self.shared.events.subscribe_complete(callback)
    }

    pub fn listen_to_download_error<F>(&self, callback: F) -> Subscription
    where
        F: Fn(DownloadErrorEvent) + Send + Sync + 'static,
    {
        self.shared.events.subscribe_error(callback)
    }

    pub fn listen_to_download_can_be_resumed<F>(&self, callback: F) -> Subscription
    where
        F: Fn(DownloadResumableEvent) + Send + Sync + 'static,
    {
        self.shared.events.subscribe_can_be_resumed(callback)
    }

    /// Total download listeners currently registered
    pub fn listener_count(&self) -> usize {
        self.shared.events.listener_count()
    }
}

/// Spawn one transfer attempt for `entry`
fn spawn_attempt(shared: &Arc<ManagerShared>, job_id: u64, entry: &mut JobEntry, resume_from: Option<ResumeToken>) {
    let options = &entry.options;
    let plan = TransferPlan {
        job_id,
        url: entry.url.clone(),
        dest: entry.dest.clone(),
        headers: options.headers.clone(),
        progress_interval: options.progress_interval,
        progress_divider: options.progress_divider,
        connect_timeout: millis(options.connection_timeout).or_else(|| shared.config.connect_timeout()),
        read_timeout: millis(options.read_timeout).or_else(|| shared.config.read_timeout()),
        max_redirects: shared.config.max_redirects,
        chunk_size: shared.config.chunk_size,
        resume_from,
    };
    let resumable = options.resumable;

    let cancel = CancellationToken::new();
    entry.cancel = cancel.clone();
    entry.status.set_state(DownloadState::Connecting);

    let status = Arc::clone(&entry.status);
    let shared = Arc::clone(shared);
    entry.handle = Some(tokio::spawn(async move {
        let outcome = {
            let ctx = TransferContext {
                transport: shared.transport.as_ref(),
                events: &shared.events,
                status: &status,
                cancel: &cancel,
            };
            transfer(&ctx, &plan).await
        };
        settle(&shared, job_id, &status, outcome, resumable).await;
    }));
}

/// Record an attempt's outcome in the table, then notify listeners
async fn settle(shared: &ManagerShared, job_id: u64, status: &JobStatus, outcome: TransferOutcome, resumable: bool) {
    match outcome {
        TransferOutcome::Completed {
            status_code,
            bytes_written,
        } => {
            status.set_state(DownloadState::Completed);
            shared.jobs.write().await.remove(&job_id);
            info!(job_id, status_code, bytes_written, "Download complete");
            shared.events.complete.emit(DownloadCompleteEvent {
                job_id,
                status_code,
                bytes_written,
            });
        }
        TransferOutcome::Failed {
            error,
            resume: Some(token),
        } if resumable => {
            status.set_state(DownloadState::StoppedResumable);
            let bytes_written = token.bytes_written;
            {
                let mut jobs = shared.jobs.write().await;
                if let Some(entry) = jobs.get_mut(&job_id) {
                    entry.resume_token = Some(token);
                    entry.handle = None;
                }
            }
            warn!(job_id, bytes_written, "Download stopped, can be resumed: {}", error);
            shared.events.can_be_resumed.emit(DownloadResumableEvent {
                job_id,
                bytes_written,
            });
        }
        TransferOutcome::Failed { error, .. } => {
            status.set_state(DownloadState::Errored);
            shared.jobs.write().await.remove(&job_id);
            if matches!(error, StreamError::Cancelled) {
                info!(job_id, "Download cancelled");
            } else {
                error!(job_id, retryable = error.is_retryable(), "Download failed: {}", error);
            }
            shared.events.error.emit(DownloadErrorEvent::new(job_id, &error));
        }
    }
}

fn parse_download_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| StreamError::InvalidUrl(format!("{}: {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(StreamError::InvalidUrl(format!(
            "{}: unsupported scheme {}",
            raw, scheme
        ))),
    }
}

/// Fail fast when an existing destination cannot be written
async fn ensure_writable(dest: &Path) -> Result<()> {
    let shown = dest.display().to_string();
    match tokio::fs::metadata(dest).await {
        Ok(meta) if meta.is_dir() => Err(StreamError::InvalidState(format!(
            "destination is a directory: {}",
            shown
        ))),
        Ok(meta) if meta.permissions().readonly() => Err(StreamError::AccessDenied(shown)),
        Ok(_) => {
            OpenOptions::new()
                .write(true)
                .open(dest)
                .await
                .map_err(|e| StreamError::from_io(e, &shown))?;
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StreamError::from_io(e, &shown)),
    }
}
