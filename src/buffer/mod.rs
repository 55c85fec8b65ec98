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


//! Fixed-size byte buffer recycling
//!
//! Stream tasks read every chunk into a buffer leased from a shared
//! [`BufferPool`] so a long transfer does not allocate once per chunk.

pub mod pool;

// Re-export commonly used types
pub use pool::{BufferPool, PoolStats, PooledBuffer, DEFAULT_BUFFER_SIZE, DEFAULT_MAX_POOL_SIZE};
