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


//! Bounded free-list of fixed-size buffers
//!
//! # Size discipline
//! - A pool serves exactly one buffer size.
//! - `acquire` above that size hands out a one-off buffer and never touches
//!   the free-list.
//! - `release` of any other size is a no-op; the buffer is simply dropped.
//! - At most `max_pool_size` buffers are kept; extra releases are dropped.
//!
//! All operations take one short mutex critical section and never wait on
//! other buffers being returned.

use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard};

/// Default buffer size in bytes (8KB)
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Default maximum number of buffers to keep in the pool
pub const DEFAULT_MAX_POOL_SIZE: usize = 25;

/// Pool statistics for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Configured buffer size
    pub buffer_size: usize,

    /// Maximum number of free buffers kept
    pub max_pool_size: usize,

    /// Free buffers currently held
    pub current_pool_size: usize,

    /// `current_pool_size / max_pool_size` (0.0 for a zero-capacity pool)
    pub pool_utilization: f64,
}

/// Thread-safe pool of byte buffers for one size class
#[derive(Debug)]
pub struct BufferPool {
    buffer_size: usize,
    max_pool_size: usize,
    free: Mutex<Vec<Vec<u8>>>,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE, DEFAULT_MAX_POOL_SIZE)
    }
}

impl BufferPool {
    /// Create a pool handing out `buffer_size` buffers, keeping at most
    /// `max_pool_size` of them when released
    pub fn new(buffer_size: usize, max_pool_size: usize) -> Self {
        Self {
            buffer_size,
            max_pool_size,
            free: Mutex::new(Vec::with_capacity(max_pool_size)),
        }
    }

    /// Pool for small frequent reads (4KB buffers, 50 kept)
    pub fn small() -> Self {
        Self::new(4096, 50)
    }

    /// Pool for large file operations (64KB buffers, 10 kept)
    pub fn large() -> Self {
        Self::new(65536, 10)
    }

    /// Configured buffer size
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn free_list(&self) -> MutexGuard<'_, Vec<Vec<u8>>> {
        // A panic while holding the lock cannot leave the Vec inconsistent.
        self.free.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take a buffer of at least `requested_size` bytes
    ///
    /// `None` means the configured size. Requests above the configured size
    /// get a dedicated buffer of exactly that size.
    pub fn acquire(&self, requested_size: Option<usize>) -> Vec<u8> {
        let size = requested_size.unwrap_or(self.buffer_size);
        if size > self.buffer_size {
            return vec![0u8; size];
        }

        if let Some(buffer) = self.free_list().pop() {
            return buffer;
        }

        vec![0u8; self.buffer_size]
    }

    /// Return a buffer, zeroing its contents before it is reused
    pub fn release(&self, mut buffer: Vec<u8>) {
        if buffer.len() != self.buffer_size {
            return;
        }
        buffer.fill(0);
        self.push(buffer);
    }

    /// Return a buffer as-is
    ///
    /// Only for buffers that never held data the next user must not see.
    pub fn release_fast(&self, buffer: Vec<u8>) {
        if buffer.len() != self.buffer_size {
            return;
        }
        self.push(buffer);
    }

    fn push(&self, buffer: Vec<u8>) {
        let mut free = self.free_list();
        if free.len() < self.max_pool_size {
            free.push(buffer);
        }
    }

    /// Lease a buffer that goes back to the pool when dropped
    pub fn lease(&self, requested_size: Option<usize>) -> PooledBuffer<'_> {
        PooledBuffer {
            pool: self,
            buffer: Some(self.acquire(requested_size)),
            zero_on_release: false,
        }
    }

    /// Run `f` with a leased buffer, releasing it (zeroed) afterwards
    pub fn with_buffer<T>(&self, requested_size: Option<usize>, f: impl FnOnce(&mut [u8]) -> T) -> T {
        let mut lease = self.lease(requested_size);
        lease.zero_on_release = true;
        f(&mut *lease)
    }

    /// Drop every free buffer
    pub fn clear(&self) {
        self.free_list().clear();
    }

    /// Number of free buffers currently held
    pub fn available_buffers(&self) -> usize {
        self.free_list().len()
    }

    /// Snapshot of pool statistics
    pub fn stats(&self) -> PoolStats {
        let current = self.available_buffers();
        PoolStats {
            buffer_size: self.buffer_size,
            max_pool_size: self.max_pool_size,
            current_pool_size: current,
            pool_utilization: if self.max_pool_size == 0 {
                0.0
            } else {
                current as f64 / self.max_pool_size as f64
            },
        }
    }
}

/// A buffer on loan from a [`BufferPool`]
///
/// Released back to its pool on drop, on every exit path.
#[derive(Debug)]
pub struct PooledBuffer<'a> {
    pool: &'a BufferPool,
    buffer: Option<Vec<u8>>,
    zero_on_release: bool,
}

impl PooledBuffer<'_> {
    /// Detach the buffer from the pool
    pub fn into_inner(mut self) -> Vec<u8> {
        self.buffer.take().unwrap_or_default()
    }
}

impl Deref for PooledBuffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buffer.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buffer.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            if self.zero_on_release {
                self.pool.release(buffer);
            } else {
                self.pool.release_fast(buffer);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_acquire_release_reuses() {
        let pool = BufferPool::new(16, 2);
        let buf = pool.acquire(None);
        assert_eq!(buf.len(), 16);
        assert_eq!(pool.available_buffers(), 0);

        pool.release(buf);
        assert_eq!(pool.available_buffers(), 1);

        let again = pool.acquire(Some(8));
        assert_eq!(again.len(), 16);
        assert_eq!(pool.available_buffers(), 0);
    }

    #[test]
    fn test_wrong_size_release_is_ignored() {
        let pool = BufferPool::new(16, 4);
        pool.release(vec![0u8; 15]);
        pool.release_fast(vec![0u8; 32]);
        assert_eq!(pool.available_buffers(), 0);
    }

    #[test]
    fn test_oversized_acquire_bypasses_pool() {
        let pool = BufferPool::new(16, 4);
        pool.release(vec![0u8; 16]);
        assert_eq!(pool.available_buffers(), 1);

        let big = pool.acquire(Some(100));
        assert_eq!(big.len(), 100);
        assert_eq!(pool.available_buffers(), 1);

        pool.release(big);
        assert_eq!(pool.available_buffers(), 1);
    }

    #[test]
    fn test_capacity_cap() {
        let pool = BufferPool::new(8, 2);
        for _ in 0..5 {
            pool.release(vec![0u8; 8]);
        }
        let stats = pool.stats();
        assert_eq!(stats.current_pool_size, 2);
        assert_eq!(stats.pool_utilization, 1.0);
    }

    #[test]
    fn test_release_zeroes_but_fast_does_not() {
        let pool = BufferPool::new(4, 1);
        pool.release(vec![1, 2, 3, 4]);
        assert_eq!(pool.acquire(None), vec![0, 0, 0, 0]);

        pool.release_fast(vec![9, 9, 9, 9]);
        assert_eq!(pool.acquire(None), vec![9, 9, 9, 9]);
    }

    #[test]
    fn test_lease_returns_on_drop() {
        let pool = BufferPool::new(32, 4);
        {
            let mut lease = pool.lease(Some(10));
            lease[0] = 7;
            assert_eq!(pool.available_buffers(), 0);
        }
        assert_eq!(pool.available_buffers(), 1);

        let sum = pool.with_buffer(None, |buf| {
            buf[0] = 1;
            buf.len()
        });
        assert_eq!(sum, 32);
        assert_eq!(pool.acquire(None)[0], 0);
    }

    #[test]
    fn test_presets_and_clear() {
        assert_eq!(BufferPool::small().stats().buffer_size, 4096);
        assert_eq!(BufferPool::large().stats().max_pool_size, 10);

        let pool = BufferPool::default();
        pool.release(vec![0u8; DEFAULT_BUFFER_SIZE]);
        pool.clear();
        assert_eq!(pool.available_buffers(), 0);
    }

    #[test]
    fn test_concurrent_use() {
        let pool = Arc::new(BufferPool::new(64, 8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let buf = pool.acquire(None);
                        pool.release_fast(buf);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(pool.available_buffers() <= 8);
    }
}
