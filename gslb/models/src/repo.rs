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
//! Spoof repository with override semantics.

use std::sync::Arc;

use gslb_store::{Store, StoreError};

use crate::spoof::{Spoof, SpoofRecord, spoof_set_hash};

/// Errors produced by repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// No spoof is stored for the requested group.
    #[error("no spoof stored for {0:?}")]
    NotFound(String),

    /// An override already pins the requested group.
    #[error("{0:?} already has an active override")]
    AlreadyOverridden(String),

    /// The requested group is not pinned by an override.
    #[error("{0:?} has no active override")]
    NoOverride(String),

    /// The backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Repository of the currently installed spoofs.
///
/// Records are keyed by the group name (`member_of`), which makes the
/// single-answer rule structural: storing a new active member for a group
/// replaces the previous one.
pub struct SpoofRepository {
    store: Arc<dyn Store<SpoofRecord>>,
}

impl SpoofRepository {
    /// Creates a repository over the given store.
    pub fn new(store: Arc<dyn Store<SpoofRecord>>) -> Self {
        Self { store }
    }

    /// Returns the spoof for a group, if one is installed.
    pub fn get(&self, member_of: &str) -> Result<Option<Spoof>, RepoError> {
        Ok(self.store.load(member_of)?.map(|r| r.spoof))
    }

    /// Returns the full record for a group, including the override flag.
    pub fn get_record(&self, member_of: &str) -> Result<Option<SpoofRecord>, RepoError> {
        Ok(self.store.load(member_of)?)
    }

    /// Returns every installed spoof.
    pub fn all(&self) -> Result<Vec<Spoof>, RepoError> {
        Ok(self
            .store
            .load_all()?
            .into_iter()
            .map(|r| r.spoof)
            .collect())
    }

    /// Returns the stable hash of the current spoof set.
    pub fn hash(&self) -> Result<String, RepoError> {
        Ok(spoof_set_hash(self.all()?))
    }

    /// Whether the group is pinned by an override.
    pub fn has_override(&self, member_of: &str) -> Result<bool, RepoError> {
        Ok(self
            .store
            .load(member_of)?
            .is_some_and(|r| r.has_override))
    }

    /// Installs or replaces the automated spoof for a group.
    ///
    /// Silently ignored while the group is pinned by an override: the
    /// pinned answer must survive automated promotion traffic.
    pub fn upsert(&self, member_of: &str, spoof: Spoof) -> Result<(), RepoError> {
        if self.has_override(member_of)? {
            tracing::debug!(member_of, "spoof is pinned by an override, skipping upsert");
            return Ok(());
        }
        self.store.save(
            member_of,
            SpoofRecord {
                spoof,
                has_override: false,
            },
        )?;
        Ok(())
    }

    /// Removes the automated spoof for a group. Ignored while pinned.
    pub fn delete(&self, member_of: &str) -> Result<(), RepoError> {
        if self.has_override(member_of)? {
            tracing::debug!(member_of, "spoof is pinned by an override, skipping delete");
            return Ok(());
        }
        self.store.delete(member_of)?;
        Ok(())
    }

    /// Pins the group to `ip`.
    ///
    /// Requires an installed spoof to pin and fails if the group is already
    /// pinned.
    pub fn create_override(&self, member_of: &str, ip: std::net::IpAddr) -> Result<(), RepoError> {
        let mut record = self
            .store
            .load(member_of)?
            .ok_or_else(|| RepoError::NotFound(member_of.to_string()))?;

        if record.has_override {
            return Err(RepoError::AlreadyOverridden(member_of.to_string()));
        }

        record.spoof.ip = ip;
        record.has_override = true;
        self.store.save(member_of, record)?;
        Ok(())
    }

    /// Re-pins an already overridden group to a new address.
    pub fn update_override(&self, member_of: &str, ip: std::net::IpAddr) -> Result<(), RepoError> {
        let mut record = self
            .store
            .load(member_of)?
            .ok_or_else(|| RepoError::NotFound(member_of.to_string()))?;

        if !record.has_override {
            return Err(RepoError::NoOverride(member_of.to_string()));
        }

        record.spoof.ip = ip;
        self.store.save(member_of, record)?;
        Ok(())
    }

    /// Clears the override flag, returning control to automated updates.
    ///
    /// The pinned answer stays installed until the next promotion replaces
    /// it.
    pub fn clear_override(&self, member_of: &str) -> Result<Spoof, RepoError> {
        let mut record = self
            .store
            .load(member_of)?
            .ok_or_else(|| RepoError::NotFound(member_of.to_string()))?;

        if !record.has_override {
            return Err(RepoError::NoOverride(member_of.to_string()));
        }

        record.has_override = false;
        self.store.save(member_of, record.clone())?;
        Ok(record.spoof)
    }
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;

    use gslb_store::MemoryStore;

    use super::*;

    fn repo() -> SpoofRepository {
        SpoofRepository::new(Arc::new(MemoryStore::new()))
    }

    fn spoof(fqdn: &str, ip: &str, dc: &str) -> Spoof {
        Spoof {
            fqdn: fqdn.to_string(),
            ip: ip.parse().unwrap(),
            datacenter: dc.to_string(),
        }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn upsert_replaces_single_answer() {
        let repo = repo();
        repo.upsert("x.example", spoof("x.example", "10.0.0.1", "dc1"))
            .unwrap();
        repo.upsert("x.example", spoof("x.example", "10.0.0.2", "dc2"))
            .unwrap();

        let all = repo.all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].ip, ip("10.0.0.2"));
    }

    #[test]
    fn override_pins_against_automated_updates() {
        let repo = repo();
        repo.upsert("x.example", spoof("x.example", "10.0.0.1", "dc1"))
            .unwrap();
        repo.create_override("x.example", ip("10.9.9.9")).unwrap();

        // Automated traffic must not change or remove the pinned answer.
        repo.upsert("x.example", spoof("x.example", "10.0.0.2", "dc2"))
            .unwrap();
        repo.delete("x.example").unwrap();

        let current = repo.get("x.example").unwrap().unwrap();
        assert_eq!(current.ip, ip("10.9.9.9"));

        // Clearing the override returns control to automation.
        repo.clear_override("x.example").unwrap();
        repo.upsert("x.example", spoof("x.example", "10.0.0.2", "dc2"))
            .unwrap();
        assert_eq!(repo.get("x.example").unwrap().unwrap().ip, ip("10.0.0.2"));
    }

    #[test]
    fn override_conflicts() {
        let repo = repo();

        // Nothing installed yet.
        assert!(matches!(
            repo.create_override("x.example", ip("10.9.9.9")),
            Err(RepoError::NotFound(_))
        ));
        assert!(matches!(
            repo.update_override("x.example", ip("10.9.9.9")),
            Err(RepoError::NotFound(_))
        ));

        repo.upsert("x.example", spoof("x.example", "10.0.0.1", "dc1"))
            .unwrap();

        // Update without an existing override.
        assert!(matches!(
            repo.update_override("x.example", ip("10.9.9.9")),
            Err(RepoError::NoOverride(_))
        ));

        repo.create_override("x.example", ip("10.9.9.9")).unwrap();

        // Create on top of an existing override.
        assert!(matches!(
            repo.create_override("x.example", ip("10.8.8.8")),
            Err(RepoError::AlreadyOverridden(_))
        ));

        repo.update_override("x.example", ip("10.8.8.8")).unwrap();
        assert_eq!(repo.get("x.example").unwrap().unwrap().ip, ip("10.8.8.8"));
    }

    #[test]
    fn hash_tracks_contents() {
        let repo = repo();
        repo.upsert("b.example", spoof("b.example", "10.0.0.2", "dc2"))
            .unwrap();
        repo.upsert("a.example", spoof("a.example", "10.0.0.1", "dc1"))
            .unwrap();

        let h1 = repo.hash().unwrap();
        repo.upsert("c.example", spoof("c.example", "10.0.0.3", "dc1"))
            .unwrap();
        let h2 = repo.hash().unwrap();
        assert_ne!(h1, h2);
    }
}
