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


//! Concurrent map from stream id to live session
//!
//! # Teardown ownership
//! A session leaves the registry exactly once. Both the caller's `close` and
//! the session's own task race to [`StreamRegistry::remove`]; whoever gets
//! `Some` back performs listener teardown, the other skips it.

use super::options::StreamId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub(crate) struct StreamRegistry<S> {
    sessions: RwLock<HashMap<StreamId, Arc<S>>>,
}

impl<S> StreamRegistry<S> {
    pub(crate) fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn insert(&self, id: StreamId, session: Arc<S>) {
        self.sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id, session);
    }

    pub(crate) fn get(&self, id: &StreamId) -> Option<Arc<S>> {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(id)
            .cloned()
    }

    /// Remove and return the session; `None` if someone else already did
    pub(crate) fn remove(&self, id: &StreamId) -> Option<Arc<S>> {
        self.sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(id)
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: &StreamId) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(id)
    }

    pub(crate) fn ids(&self) -> Vec<StreamId> {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_only_once() {
        let registry: StreamRegistry<u32> = StreamRegistry::new();
        let id = StreamId::from("s");
        registry.insert(id.clone(), Arc::new(7));
        assert!(registry.contains(&id));
        assert_eq!(registry.get(&id).as_deref(), Some(&7));

        assert!(registry.remove(&id).is_some());
        assert!(registry.remove(&id).is_none());
        assert_eq!(registry.len(), 0);
    }
}
