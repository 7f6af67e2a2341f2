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
//! Token issuing.

use jsonwebtoken::{Algorithm, EncodingKey, Header};

use crate::claims::ServiceClaims;

/// Signs service tokens with a shared secret.
pub struct TokenIssuer {
    key: EncodingKey,
    algorithm: Algorithm,
}

impl TokenIssuer {
    /// Creates a new issuer with the default HS512 signing algorithm.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: EncodingKey::from_secret(secret),
            algorithm: Algorithm::HS512,
        }
    }

    /// Overrides the signing algorithm.
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// The algorithm used for signing.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Signs the given claims into a compact JWT.
    pub fn issue(&self, claims: &ServiceClaims) -> Result<String, jsonwebtoken::errors::Error> {
        jsonwebtoken::encode(&Header::new(self.algorithm), claims, &self.key)
    }
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}
