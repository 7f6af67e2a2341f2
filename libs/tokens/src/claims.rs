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
//! Service token claims and the role registry.

use serde::{Deserialize, Serialize};

const READ_METHODS: &[&str] = &["GET"];
const READ_WRITE_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE"];

/// The claims carried by a GSLB service token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceClaims {
    /// Name of the role the token was issued for.
    pub name: String,
    /// HTTP methods the holder may use.
    pub allowed_methods: Vec<String>,
    /// Route patterns (anchored regexes) the holder may call.
    pub allowed_routes: Vec<String>,
    /// Expiration time (seconds since epoch).
    pub exp: u64,
    /// Issued at (seconds since epoch).
    pub iat: u64,
    /// Issuer. Self-issued tokens use the role name.
    pub iss: String,
}

/// Access tier of a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Full access to every route.
    Admin,
    /// Read and write access to the granted routes.
    ReadWrite,
    /// Read-only access to the granted routes.
    ReadOnly,
}

impl Role {
    fn methods(&self) -> Vec<String> {
        let methods = match self {
            Role::Admin | Role::ReadWrite => READ_WRITE_METHODS,
            Role::ReadOnly => READ_METHODS,
        };
        methods.iter().map(|m| m.to_string()).collect()
    }
}

/// A named grant: the role tier plus the routes it applies to.
#[derive(Debug, Clone)]
pub struct RoleGrant {
    /// Role name, matched against the `name` claim.
    pub name: String,
    /// Access tier.
    pub role: Role,
    /// Anchored route regexes.
    pub routes: Vec<String>,
}

/// Registry of the roles this deployment accepts.
///
/// The registry is an explicit object handed to the validator and the token
/// manager rather than process-global state, so tests can construct their
/// own.
#[derive(Debug, Clone, Default)]
pub struct RoleRegistry {
    grants: Vec<RoleGrant>,
}

impl RoleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self { grants: Vec::new() }
    }

    /// The roles known to a standard GSLB deployment.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(RoleGrant {
            name: "ADMIN".to_string(),
            role: Role::Admin,
            routes: vec![".*".to_string()],
        });
        registry.register(RoleGrant {
            name: "GSLB-OPERATOR".to_string(),
            role: Role::ReadWrite,
            routes: vec!["^/spoofs$".to_string(), "^/spoofs/.*$".to_string()],
        });
        registry.register(RoleGrant {
            name: "OVERRIDER".to_string(),
            role: Role::ReadWrite,
            routes: vec!["^/spoofs/override.*$".to_string()],
        });
        registry.register(RoleGrant {
            name: "DNSDIST-WORKER".to_string(),
            role: Role::ReadOnly,
            routes: vec!["^/spoofs$".to_string(), "^/spoofs/hash$".to_string()],
        });
        registry
    }

    /// Adds a grant to the registry.
    pub fn register(&mut self, grant: RoleGrant) {
        self.grants.push(grant);
    }

    /// Looks up a grant by role name.
    pub fn grant(&self, name: &str) -> Option<&RoleGrant> {
        self.grants.iter().find(|g| g.name == name)
    }

    /// Builds unsigned claims for the named role, valid for `ttl_secs`
    /// starting at `now_secs`.
    pub fn claims_for(&self, name: &str, now_secs: u64, ttl_secs: u64) -> Option<ServiceClaims> {
        let grant = self.grant(name)?;
        Some(ServiceClaims {
            name: grant.name.clone(),
            allowed_methods: grant.role.methods(),
            allowed_routes: grant.routes.clone(),
            exp: now_secs + ttl_secs,
            iat: now_secs,
            iss: grant.name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_grants() {
        let registry = RoleRegistry::standard();

        let admin = registry.claims_for("ADMIN", 100, 60).unwrap();
        assert!(admin.allowed_methods.contains(&"DELETE".to_string()));
        assert_eq!(admin.exp, 160);
        assert_eq!(admin.iss, "ADMIN");

        let worker = registry.claims_for("DNSDIST-WORKER", 100, 60).unwrap();
        assert_eq!(worker.allowed_methods, vec!["GET"]);

        assert!(registry.claims_for("UNKNOWN", 100, 60).is_none());
    }
}
