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


//! Resumable HTTP downloads
//!
//! # Components
//! - [`DownloadManager`]: job table and public API
//! - `job`: one transfer attempt (redirects, range resume, disk writes)
//! - [`progress`]: state enum and progress throttling
//! - [`transport`]: the HTTP seam and its reqwest implementation
//! - [`events`]: begin/progress/complete/error/can-be-resumed payloads

pub mod events;
pub mod job;
pub mod manager;
pub mod progress;
pub mod transport;

// Re-export commonly used types
pub use events::{
    DownloadBeginEvent, DownloadCompleteEvent, DownloadErrorEvent, DownloadProgressEvent, DownloadResumableEvent,
};
pub use job::DownloadOptions;
pub use manager::DownloadManager;
pub use progress::{DownloadState, ProgressThrottle};
pub use transport::{BodyStream, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
