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
//! JSON file store backend.

use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use parking_lot::Mutex;
use serde::{Serialize, de::DeserializeOwned};

use crate::{Store, StoreError};

/// A store persisting all values into a single JSON object file.
///
/// Every mutation rewrites the whole file: the current contents are read,
/// merged with the change, and persisted through a temp-file rename so a
/// crash mid-write never leaves a truncated store behind.
pub struct FileStore<T> {
    path: PathBuf,
    // Serializes read-modify-write cycles on the backing file.
    lock: Mutex<()>,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T> FileStore<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    /// Opens a file store at `path`, creating an empty file if absent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            fs::write(&path, b"{}")?;
        }

        Ok(Self {
            path,
            lock: Mutex::new(()),
            _marker: std::marker::PhantomData,
        })
    }

    fn read_map(&self) -> Result<BTreeMap<String, T>, StoreError> {
        let raw = fs::read(&self.path)?;
        if raw.is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_slice(&raw)?)
    }

    fn persist(&self, map: &BTreeMap<String, T>) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec(map)?;

        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&encoded)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        Ok(())
    }
}

impl<T> Store<T> for FileStore<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    fn save(&self, key: &str, value: T) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut map = self.read_map()?;
        map.insert(key.to_string(), value);
        self.persist(&map)
    }

    fn load(&self, key: &str) -> Result<Option<T>, StoreError> {
        let _guard = self.lock.lock();
        Ok(self.read_map()?.remove(key))
    }

    fn load_all(&self) -> Result<Vec<T>, StoreError> {
        let _guard = self.lock.lock();
        Ok(self.read_map()?.into_values().collect())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut map = self.read_map()?;
        if map.remove(key).is_some() {
            self.persist(&map)?;
        }
        Ok(())
    }
}
