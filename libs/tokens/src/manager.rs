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
//! Self-renewing service token manager.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

use crate::{claims::RoleRegistry, issuer::TokenIssuer};

/// Token lifetime for self-issued tokens.
const TOKEN_TTL: Duration = Duration::from_secs(30 * 24 * 3600);
/// Tokens are renewed this long before they expire.
const RENEWAL_BUFFER: Duration = Duration::from_secs(5 * 60);

/// Errors produced when obtaining a service token.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The configured role is not present in the registry.
    #[error("role {0:?} is not registered")]
    UnknownRole(String),

    /// Signing the claims failed.
    #[error("could not sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

struct TokenState {
    current: String,
    expires_at: SystemTime,
}

/// Issues and caches the control plane's own service token, re-signing it
/// before expiry.
pub struct ServiceTokenManager {
    issuer: TokenIssuer,
    registry: RoleRegistry,
    role: String,
    renewal_buffer: Duration,
    state: RwLock<Option<TokenState>>,
}

impl ServiceTokenManager {
    /// Creates a manager issuing tokens for `role` out of `registry`.
    ///
    /// Fails if the role is unknown, so misconfiguration aborts at startup
    /// rather than on the first downstream call.
    pub fn new(
        secret: &[u8],
        role: impl Into<String>,
        registry: RoleRegistry,
    ) -> Result<Self, TokenError> {
        let role = role.into();
        if registry.grant(&role).is_none() {
            return Err(TokenError::UnknownRole(role));
        }

        Ok(Self {
            issuer: TokenIssuer::new(secret),
            registry,
            role,
            renewal_buffer: RENEWAL_BUFFER,
            state: RwLock::new(None),
        })
    }

    /// Returns the current token formatted as an `Authorization` header
    /// value, refreshing it when it is within the renewal buffer of expiry.
    pub fn authorization(&self) -> Result<String, TokenError> {
        let needs_refresh = {
            let state = self.state.read();
            match state.as_ref() {
                Some(s) => SystemTime::now() + self.renewal_buffer >= s.expires_at,
                None => true,
            }
        };

        if needs_refresh {
            self.refresh()?;
        }

        let state = self.state.read();
        let token = &state.as_ref().expect("token state set by refresh").current;
        Ok(format!("Bearer {token}"))
    }

    /// Discards the cached token and signs a fresh one. Used when the
    /// downstream rejects the current token.
    pub fn refresh(&self) -> Result<(), TokenError> {
        let now = SystemTime::now();
        let now_secs = now
            .duration_since(UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_secs();

        let claims = self
            .registry
            .claims_for(&self.role, now_secs, TOKEN_TTL.as_secs())
            .ok_or_else(|| TokenError::UnknownRole(self.role.clone()))?;

        let token = self.issuer.issue(&claims)?;
        tracing::debug!(role = %self.role, "signed fresh service token");

        *self.state.write() = Some(TokenState {
            current: token,
            expires_at: now + TOKEN_TTL,
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_role_is_rejected_at_construction() {
        let err = ServiceTokenManager::new(b"secret", "NOPE", RoleRegistry::standard())
            .err()
            .unwrap();
        assert!(matches!(err, TokenError::UnknownRole(_)));
    }

    #[test]
    fn issues_bearer_token_and_caches_it() {
        let mgr =
            ServiceTokenManager::new(b"secret", "GSLB-OPERATOR", RoleRegistry::standard()).unwrap();

        let first = mgr.authorization().unwrap();
        assert!(first.starts_with("Bearer "));

        // A fresh token is far from expiry, so the cached one is reused.
        let second = mgr.authorization().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn refresh_replaces_token_state() {
        let mgr =
            ServiceTokenManager::new(b"secret", "GSLB-OPERATOR", RoleRegistry::standard()).unwrap();
        mgr.authorization().unwrap();

        let before = mgr.state.read().as_ref().unwrap().expires_at;
        mgr.refresh().unwrap();
        let after = mgr.state.read().as_ref().unwrap().expires_at;
        assert!(after >= before);
    }
}
