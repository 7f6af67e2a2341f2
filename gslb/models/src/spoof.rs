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
//! The spoof contract shared with the downstream DNS rewriter.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A single `fqdn → ip` rewrite installed in the data plane.
///
/// Field order is part of the contract: the spoof-set hash is computed
/// over the serialized form, so reordering fields changes the hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spoof {
    /// The user-visible name the rewrite answers for.
    pub fqdn: String,
    /// The address the name resolves to.
    pub ip: IpAddr,
    /// The datacenter serving the address.
    pub datacenter: String,
}

/// Storage form of a spoof: the rewrite plus its override flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpoofRecord {
    /// The installed rewrite.
    #[serde(flatten)]
    pub spoof: Spoof,
    /// True when the rewrite was pinned manually. Pinned spoofs suppress
    /// automated updates until the override is cleared.
    #[serde(default)]
    pub has_override: bool,
}

/// Admin request to pin or re-pin a spoof.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideRequest {
    /// The group name to pin.
    #[serde(rename = "memberOf", alias = "fqdn")]
    pub member_of: String,
    /// The address to pin the name to.
    pub ip: IpAddr,
}

/// Hashes a spoof set into a stable lowercase hex digest.
///
/// Spoofs are sorted ascending by fqdn before hashing so that two processes
/// holding the same set (in any insertion order) agree on the digest.
pub fn spoof_set_hash(mut spoofs: Vec<Spoof>) -> String {
    spoofs.sort_by(|a, b| a.fqdn.cmp(&b.fqdn));

    let encoded = serde_json::to_vec(&spoofs).expect("spoofs serialize infallibly");
    let digest = Sha256::digest(&encoded);
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spoof(fqdn: &str, ip: &str, dc: &str) -> Spoof {
        Spoof {
            fqdn: fqdn.to_string(),
            ip: ip.parse().unwrap(),
            datacenter: dc.to_string(),
        }
    }

    #[test]
    fn hash_is_order_independent() {
        let a = spoof("a.example", "10.0.0.1", "dc1");
        let b = spoof("b.example", "10.0.0.2", "dc2");
        let c = spoof("c.example", "10.0.0.3", "dc1");

        let h1 = spoof_set_hash(vec![b.clone(), a.clone(), c.clone()]);
        let h2 = spoof_set_hash(vec![c, a, b]);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert_eq!(h1, h1.to_lowercase());
    }

    #[test]
    fn hash_changes_when_set_changes() {
        let a = spoof("a.example", "10.0.0.1", "dc1");
        let b = spoof("b.example", "10.0.0.2", "dc2");

        let h1 = spoof_set_hash(vec![a.clone()]);
        let h2 = spoof_set_hash(vec![a, b]);
        assert_ne!(h1, h2);
    }

    #[test]
    fn record_round_trips_flattened() {
        let record = SpoofRecord {
            spoof: spoof("a.example", "10.0.0.1", "dc1"),
            has_override: true,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"fqdn\":\"a.example\""));

        let back: SpoofRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
