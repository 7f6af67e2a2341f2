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
//! Daemon configuration.
//!
//! Settings are resolved through a chain, last writer wins: process
//! environment, then a `.env` file, then command-line flags.

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use gslb_utils::duration::GoDuration;
use url::Url;

/// GSLB control plane daemon.
#[derive(Debug, Parser)]
#[command(name = "gslbd", version, about)]
pub struct Config {
    /// Deployment environment; `dev` switches to human-friendly logs.
    #[arg(long, env = "SRV_ENV", default_value = "prod")]
    pub srv_env: String,

    /// The local datacenter, preferred when arbitrating equal-priority
    /// members.
    #[arg(long, env = "SRV_DATACENTER")]
    pub datacenter: String,

    /// Path to the Lua sandbox configuration file. Without it, HTTP checks
    /// skip script validation.
    #[arg(long, env = "SRV_LUA_SANDBOX")]
    pub lua_sandbox: Option<PathBuf>,

    /// Admin API listen port.
    #[arg(long, env = "API_PORT", default_value_t = 8080)]
    pub api_port: u16,

    /// The configuration zone to transfer.
    #[arg(long, env = "GSLB_ZONE")]
    pub zone: String,

    /// Authoritative nameserver serving the zone (`host:port`).
    #[arg(long, env = "GSLB_NAMESERVER")]
    pub nameserver: String,

    /// Interval between zone transfers.
    #[arg(long, env = "GSLB_POLL_INTERVAL", default_value = "30s")]
    pub poll_interval: GoDuration,

    /// Base URL of the downstream DNS rewriter.
    #[arg(long, env = "GSLB_UPDATER_HOST")]
    pub updater_host: Url,

    /// Shared secret signing and validating service tokens.
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// Role the control plane issues its own token for.
    #[arg(long, env = "JWT_USER", default_value = "GSLB-OPERATOR")]
    pub jwt_user: String,

    /// Path of the JSON spoof store.
    #[arg(long, default_value = "store.json")]
    pub store: PathBuf,

    /// Replace all probes with synthetic dry-run checks.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

impl Config {
    /// Loads the configuration chain: environment, `.env` file, flags.
    pub fn load() -> Self {
        // The .env file takes precedence over the inherited environment;
        // flags override both via clap.
        match dotenvy::dotenv_override() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env file"),
            Err(_) => {}
        }
        Config::parse()
    }

    /// Whether the daemon runs in the development environment.
    pub fn is_dev(&self) -> bool {
        self.srv_env.eq_ignore_ascii_case("dev")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags_with_defaults() {
        let config = Config::parse_from([
            "gslbd",
            "--datacenter",
            "dc1",
            "--zone",
            "gslb.example.com.",
            "--nameserver",
            "ns1.example.com:53",
            "--updater-host",
            "https://rewriter.example.com",
            "--jwt-secret",
            "secret",
        ]);

        assert_eq!(config.api_port, 8080);
        assert_eq!(
            config.poll_interval.duration(),
            Duration::from_secs(30)
        );
        assert_eq!(config.jwt_user, "GSLB-OPERATOR");
        assert!(!config.is_dev());
    }

    #[test]
    fn poll_interval_accepts_go_durations() {
        let config = Config::parse_from([
            "gslbd",
            "--datacenter",
            "dc1",
            "--zone",
            "z.",
            "--nameserver",
            "ns:53",
            "--updater-host",
            "https://r.example.com",
            "--jwt-secret",
            "secret",
            "--poll-interval",
            "1m30s",
        ]);
        assert_eq!(config.poll_interval.duration(), Duration::from_secs(90));
    }
}
