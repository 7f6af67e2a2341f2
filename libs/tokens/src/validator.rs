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
//! Token validation and route-based authorization.

use jsonwebtoken::{Algorithm, DecodingKey, Validation};

use crate::claims::{RoleRegistry, ServiceClaims};

/// Authentication or authorization failure.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The token is missing, malformed, expired, or the holder may not use
    /// the request method.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The token is valid but the route is not granted to the role.
    #[error("forbidden: {0}")]
    Forbidden(String),
}

/// Validates incoming bearer tokens against the role registry.
pub struct TokenValidator {
    key: DecodingKey,
    registry: RoleRegistry,
    validation: Validation,
}

impl TokenValidator {
    /// Creates a validator for HS512 tokens signed with `secret`.
    pub fn new(secret: &[u8], registry: RoleRegistry) -> Self {
        let mut validation = Validation::new(Algorithm::HS512);
        validation.set_required_spec_claims(&["exp"]);
        Self {
            key: DecodingKey::from_secret(secret),
            registry,
            validation,
        }
    }

    /// Validates `token` for a request with the given method and route.
    ///
    /// The grants checked are the ones in the local registry, not the ones
    /// carried in the token: a token naming an unknown role is rejected
    /// even if its own claims would allow the call.
    pub fn validate(
        &self,
        token: &str,
        method: &str,
        route: &str,
    ) -> Result<ServiceClaims, AuthError> {
        let token = token.trim();
        let decoded = jsonwebtoken::decode::<ServiceClaims>(token, &self.key, &self.validation)
            .map_err(|e| AuthError::Unauthorized(format!("invalid token: {e}")))?;
        let claims = decoded.claims;

        let grant = self.registry.grant(&claims.name).ok_or_else(|| {
            AuthError::Forbidden(format!("{:?} is not a registered service role", claims.name))
        })?;

        let allowed = self
            .registry
            .claims_for(&grant.name, claims.iat, 0)
            .expect("grant was just looked up");

        if !allowed.allowed_methods.iter().any(|m| m == method) {
            return Err(AuthError::Unauthorized(format!(
                "role {:?} is not allowed to perform {method}",
                claims.name
            )));
        }

        for pattern in &allowed.allowed_routes {
            let re = regex::Regex::new(pattern).map_err(|e| {
                AuthError::Forbidden(format!("invalid route pattern {pattern:?}: {e}"))
            })?;
            if re.is_match(route) {
                return Ok(claims);
            }
        }

        Err(AuthError::Forbidden("no route matched: default deny".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use crate::issuer::TokenIssuer;

    use super::*;

    const SECRET: &[u8] = b"test-secret";

    fn signed_token(role: &str) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let claims = RoleRegistry::standard()
            .claims_for(role, now, 3600)
            .unwrap();
        TokenIssuer::new(SECRET).issue(&claims).unwrap()
    }

    #[test]
    fn accepts_granted_method_and_route() {
        let validator = TokenValidator::new(SECRET, RoleRegistry::standard());
        let token = signed_token("DNSDIST-WORKER");

        let claims = validator.validate(&token, "GET", "/spoofs").unwrap();
        assert_eq!(claims.name, "DNSDIST-WORKER");
        validator.validate(&token, "GET", "/spoofs/hash").unwrap();
    }

    #[test]
    fn rejects_method_outside_grant() {
        let validator = TokenValidator::new(SECRET, RoleRegistry::standard());
        let token = signed_token("DNSDIST-WORKER");

        let err = validator.validate(&token, "POST", "/spoofs").unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));
    }

    #[test]
    fn rejects_route_outside_grant() {
        let validator = TokenValidator::new(SECRET, RoleRegistry::standard());
        let token = signed_token("DNSDIST-WORKER");

        let err = validator
            .validate(&token, "GET", "/failover/x.example")
            .unwrap_err();
        assert!(matches!(err, AuthError::Forbidden(_)));
    }

    #[test]
    fn rejects_wrong_signature() {
        let validator = TokenValidator::new(b"other-secret", RoleRegistry::standard());
        let token = signed_token("ADMIN");

        let err = validator.validate(&token, "GET", "/spoofs").unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));
    }

    #[test]
    fn admin_matches_everything() {
        let validator = TokenValidator::new(SECRET, RoleRegistry::standard());
        let token = signed_token("ADMIN");

        validator.validate(&token, "DELETE", "/spoofs/override").unwrap();
        validator.validate(&token, "POST", "/failover/x.example").unwrap();
    }
}
