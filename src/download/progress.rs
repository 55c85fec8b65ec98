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


//! Download state and progress throttling
//!
//! # Throttle modes
//! Exactly one mode is active, chosen in this order:
//! 1. `progress_interval > 0`: at most one event per interval.
//! 2. `progress_divider > 0`: only when `floor(bytes * 100 / length)` is a
//!    multiple of the divider and differs from the last emitted percent, or
//!    the transfer just completed. Needs a known content length.
//! 3. Otherwise every chunk.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Download state enum representing the lifecycle of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadState {
    /// Registered, no request sent yet
    Idle,
    /// Request sent, waiting for the response head
    Connecting,
    /// Body is being written to disk
    Transferring,
    /// Finished with a response (any status)
    Completed,
    /// Failed with no way to resume
    Errored,
    /// Stopped or failed with a resume token held
    StoppedResumable,
}

impl DownloadState {
    /// A network transfer is in flight
    pub fn is_running(&self) -> bool {
        matches!(self, DownloadState::Connecting | DownloadState::Transferring)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ThrottleMode {
    Interval(Duration),
    Divider(u64),
    EveryChunk,
}

/// Decides which progress updates reach listeners
///
/// One throttle per transfer attempt; state never crosses jobs.
#[derive(Debug)]
pub struct ProgressThrottle {
    mode: ThrottleMode,

    /// Last emission time (interval mode)
    last_update: Option<Instant>,

    /// Last emitted percent (divider mode)
    last_percent: Option<u64>,
}

impl ProgressThrottle {
    /// `interval_ms` wins over `divider`; both zero means every chunk
    pub fn new(interval_ms: u64, divider: u32) -> Self {
        let mode = if interval_ms > 0 {
            ThrottleMode::Interval(Duration::from_millis(interval_ms))
        } else if divider > 0 {
            ThrottleMode::Divider(u64::from(divider))
        } else {
            ThrottleMode::EveryChunk
        };
        Self {
            mode,
            last_update: None,
            last_percent: None,
        }
    }

    /// Record `bytes_written` and report whether to emit a progress event
    pub fn should_emit(&mut self, bytes_written: u64, content_length: Option<u64>) -> bool {
        self.should_emit_at(bytes_written, content_length, Instant::now())
    }

    fn should_emit_at(&mut self, bytes_written: u64, content_length: Option<u64>, now: Instant) -> bool {
        match self.mode {
            ThrottleMode::EveryChunk => true,
            ThrottleMode::Interval(interval) => {
                let due = self
                    .last_update
                    .map_or(true, |last| now.duration_since(last) > interval);
                if due {
                    self.last_update = Some(now);
                }
                due
            }
            ThrottleMode::Divider(divider) => {
                let length = match content_length {
                    Some(length) if length > 0 => length,
                    _ => return false,
                };
                let percent = bytes_written.saturating_mul(100) / length;
                let complete = bytes_written == length;
                if percent % divider != 0 {
                    return false;
                }
                if self.last_percent != Some(percent) || complete {
                    self.last_percent = Some(percent);
                    return true;
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_chunk() {
        let mut throttle = ProgressThrottle::new(0, 0);
        assert!((0..5).all(|i| throttle.should_emit(i * 10, None)));
    }

    #[test]
    fn test_divider_quarters() {
        let mut throttle = ProgressThrottle::new(0, 25);
        let emitted: Vec<u64> = (1..=100u64)
            .map(|i| i * 10)
            .filter(|&bytes| throttle.should_emit(bytes, Some(1000)))
            .collect();
        assert_eq!(emitted, vec![250, 500, 750, 1000]);
    }

    #[test]
    fn test_divider_repeats_complete() {
        let mut throttle = ProgressThrottle::new(0, 50);
        assert!(throttle.should_emit(1000, Some(1000)));
        // A trailing zero-length write at 100% still reports completion
        assert!(throttle.should_emit(1000, Some(1000)));
        assert!(!throttle.should_emit(600, Some(1000)));
    }

    #[test]
    fn test_divider_needs_length() {
        let mut throttle = ProgressThrottle::new(0, 10);
        assert!(!throttle.should_emit(500, None));
        assert!(!throttle.should_emit(500, Some(0)));
    }

    #[test]
    fn test_interval_beats_divider() {
        let mut throttle = ProgressThrottle::new(200, 25);
        let start = Instant::now();
        assert!(throttle.should_emit_at(1, Some(1000), start));
        assert!(!throttle.should_emit_at(250, Some(1000), start + Duration::from_millis(100)));
        assert!(throttle.should_emit_at(260, Some(1000), start + Duration::from_millis(201)));
    }

    #[test]
    fn test_running_states() {
        assert!(DownloadState::Connecting.is_running());
        assert!(!DownloadState::StoppedResumable.is_running());
    }
}
