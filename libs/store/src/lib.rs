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
//! Pluggable key-value persistence for the GSLB control plane.
//!
//! Repositories operate against the [Store] trait so that the backing
//! medium can be swapped between the JSON file store used in production
//! and the in-memory store used in tests and for ephemeral caches.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Errors produced by store backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading from or writing to the backing medium failed.
    #[error("storage i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// The stored payload could not be decoded, or a value could not be
    /// encoded.
    #[error("storage serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A keyed store for values of type `T`.
///
/// Implementations must be safe to share across tasks; all operations are
/// synchronous and expected to complete quickly.
pub trait Store<T>: Send + Sync {
    /// Saves `value` under `key`, replacing any previous value.
    fn save(&self, key: &str, value: T) -> Result<(), StoreError>;

    /// Loads the value stored under `key`, if any.
    fn load(&self, key: &str) -> Result<Option<T>, StoreError>;

    /// Loads every stored value.
    fn load_all(&self) -> Result<Vec<T>, StoreError>;

    /// Deletes the value stored under `key`. Deleting a missing key is not
    /// an error.
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}
