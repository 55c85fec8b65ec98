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


//! Callback registries shared by the stream and download event hubs
//!
//! Two shapes are offered:
//! - [`KeyedListeners`]: one callback slot per key, last registration wins.
//! - [`ListenerList`]: any number of callbacks, all invoked per event.
//!
//! Dispatch clones the callback out of the map and releases the lock before
//! invoking it, so a callback may unsubscribe itself (or register others)
//! without deadlocking.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

/// Callback type for events
pub type Callback<E> = Arc<dyn Fn(E) + Send + Sync>;

/// Handle returned by every `listen_to_*` call
///
/// `unsubscribe` may be called any number of times, including after the
/// stream or job it refers to has gone away. Dropping the handle does NOT
/// unsubscribe.
pub struct Subscription {
    remove: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    fn new(remove: impl FnOnce() + Send + 'static) -> Self {
        Self {
            remove: Mutex::new(Some(Box::new(remove))),
        }
    }

    /// Remove the listener this handle registered
    pub fn unsubscribe(&self) {
        let remove = self
            .remove
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(remove) = remove {
            remove();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// One listener slot per key
pub(crate) struct KeyedListeners<K, E> {
    next_token: AtomicU64,
    slots: RwLock<HashMap<K, (u64, Callback<E>)>>,
}

impl<K, E> KeyedListeners<K, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    E: 'static,
{
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            next_token: AtomicU64::new(1),
            slots: RwLock::new(HashMap::new()),
        })
    }

    /// Install `callback` for `key`, replacing any previous one
    ///
    /// The returned handle only removes this registration: once a newer
    /// callback replaced it, unsubscribing the old handle is a no-op.
    pub(crate) fn set(self: &Arc<Self>, key: K, callback: Callback<E>) -> Subscription {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.slots
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.clone(), (token, callback));

        let weak: Weak<Self> = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(map) = weak.upgrade() {
                map.remove_token(&key, token);
            }
        })
    }

    fn remove_token(&self, key: &K, token: u64) {
        let mut slots = self.slots.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        if slots.get(key).map(|(t, _)| *t) == Some(token) {
            slots.remove(key);
        }
    }

    /// Drop whatever callback is registered for `key`
    pub(crate) fn remove(&self, key: &K) {
        self.slots
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(key);
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, key: &K) -> bool {
        self.slots
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(key)
    }

    /// Invoke the callback for `key`, if any
    pub(crate) fn emit(&self, key: &K, event: E) {
        let callback = self
            .slots
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .map(|(_, cb)| Arc::clone(cb));
        if let Some(callback) = callback {
            callback(event);
        }
    }
}

/// Any number of listeners, each invoked for every event
pub(crate) struct ListenerList<E> {
    next_token: AtomicU64,
    entries: RwLock<Vec<(u64, Callback<E>)>>,
}

impl<E> ListenerList<E>
where
    E: Clone + 'static,
{
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            next_token: AtomicU64::new(1),
            entries: RwLock::new(Vec::new()),
        })
    }

    pub(crate) fn add(self: &Arc<Self>, callback: Callback<E>) -> Subscription {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((token, callback));

        let weak: Weak<Self> = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(list) = weak.upgrade() {
                list.entries
                    .write()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .retain(|(t, _)| *t != token);
            }
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub(crate) fn emit(&self, event: E) {
        let callbacks: Vec<Callback<E>> = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(event.clone());
        }
    }
}
