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
//! Health check probes.
//!
//! A [Probe] is built once per service from its zone configuration and
//! re-used for every check. Check outcomes are binary; the error carries
//! the reason for logging only and never propagates past the service state
//! machine.

mod dryrun;
mod http;
pub mod lua;
mod tcp;

use std::{net::SocketAddr, time::Duration};

pub use lua::{LuaPool, LuaValidator, ScriptError};

/// Default probe timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// Maximum HTTP response body read by a check.
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Reasons a health check can fail.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    /// The probe did not complete within its timeout.
    #[error("check timed out after {0:?}")]
    Timeout(Duration),

    /// Connecting or reading failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The HTTP request failed below the status-code level.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a status the check treats as down.
    #[error("server responded with status code {0}")]
    Status(u16),

    /// The response body exceeded [MAX_BODY_SIZE].
    #[error("response body exceeded maximum of {MAX_BODY_SIZE} bytes")]
    BodyTooLarge,

    /// The validation script rejected the response or failed to run.
    #[error(transparent)]
    Script(#[from] ScriptError),

    /// Synthetic dry-run failure.
    #[error("dry-run failure")]
    DryRun,
}

/// A reusable health probe for one service.
#[derive(Debug)]
pub enum Probe {
    /// Full TCP connect, closed immediately after establishment.
    TcpFull {
        /// Member address.
        addr: SocketAddr,
        /// Connect timeout.
        timeout: Duration,
    },
    /// TCP connect torn down with RST instead of a graceful close; no
    /// application bytes are exchanged.
    TcpHalf {
        /// Member address.
        addr: SocketAddr,
        /// Connect timeout.
        timeout: Duration,
    },
    /// HTTP(S) GET with optional script validation.
    Http {
        /// Probe URL, `https://<fqdn>/` or `http://<fqdn>/`.
        url: String,
        /// Pre-built client with certificate verification disabled.
        client: reqwest::Client,
        /// Script validating the response, when configured.
        validator: Option<LuaValidator>,
    },
    /// Random 10% failure for development.
    DryRun,
}

impl Probe {
    /// Builds an HTTP probe client.
    ///
    /// Certificate verification is off because targets are routinely
    /// private VIPs carrying self-signed certificates.
    pub fn http(
        url: String,
        timeout: Duration,
        validator: Option<LuaValidator>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Probe::Http {
            url,
            client,
            validator,
        })
    }

    /// Runs the probe once.
    pub async fn check(&self) -> Result<(), CheckError> {
        match self {
            Probe::TcpFull { addr, timeout } => tcp::check_full(*addr, *timeout).await,
            Probe::TcpHalf { addr, timeout } => tcp::check_half(*addr, *timeout).await,
            Probe::Http {
                url,
                client,
                validator,
            } => http::check(client, url, validator.as_ref()).await,
            Probe::DryRun => dryrun::check(),
        }
    }
}
