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
//! GSLB service token library.
//!
//! Tokens are self-issued HS512 JWTs that bind a named role to the HTTP
//! methods and route patterns it may use. The control plane issues its own
//! token to talk to the downstream DNS rewriter and validates incoming
//! tokens on the admin API.

pub mod claims;
pub mod issuer;
pub mod manager;
pub mod validator;

pub use claims::{Role, RoleRegistry, ServiceClaims};
pub use issuer::TokenIssuer;
pub use manager::ServiceTokenManager;
pub use validator::{AuthError, TokenValidator};
