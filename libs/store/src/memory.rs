// Copyright 2026 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! In-memory store backend.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::{Store, StoreError};

/// A store that keeps all values in process memory.
///
/// Keys are held in a sorted map so that `load_all` iteration order is
/// deterministic.
#[derive(Debug, Default)]
pub struct MemoryStore<T> {
    data: Mutex<BTreeMap<String, T>>,
}

impl<T> MemoryStore<T> {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self {
            data: Mutex::new(BTreeMap::new()),
        }
    }
}

impl<T: Clone + Send + Sync> Store<T> for MemoryStore<T> {
    fn save(&self, key: &str, value: T) -> Result<(), StoreError> {
        self.data.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<T>, StoreError> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn load_all(&self) -> Result<Vec<T>, StoreError> {
        Ok(self.data.lock().values().cloned().collect())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.data.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_delete() {
        let store = MemoryStore::new();
        store.save("a", 1u32).unwrap();
        store.save("b", 2u32).unwrap();

        assert_eq!(store.load("a").unwrap(), Some(1));
        assert_eq!(store.load("missing").unwrap(), None);
        assert_eq!(store.load_all().unwrap(), vec![1, 2]);

        store.delete("a").unwrap();
        assert_eq!(store.load("a").unwrap(), None);

        // Deleting an absent key is fine.
        store.delete("a").unwrap();
    }

    #[test]
    fn save_replaces_existing_value() {
        let store = MemoryStore::new();
        store.save("a", 1u32).unwrap();
        store.save("a", 2u32).unwrap();
        assert_eq!(store.load("a").unwrap(), Some(2));
    }
}
