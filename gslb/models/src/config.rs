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
//! Service configuration as provisioned in the GSLB zone.
//!
//! Every member of a load-balanced group is described by one TXT record
//! whose owner name is the group FQDN and whose rdata is a JSON object.
//! DNS TXT escaping doubles backslashes, so the rdata is unescaped before
//! parsing.

use std::{net::IpAddr, time::Duration};

use gslb_utils::duration::GoDuration;
use serde::{Deserialize, Serialize};

/// Default number of consecutive check outcomes required to flip health.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
/// The fastest interval a service may be checked at.
pub const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(5);
/// The slowest interval a demoted service decays to.
pub const MAX_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// The kind of health check a member is probed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckKind {
    /// Plain HTTP GET against the member FQDN.
    #[serde(rename = "HTTP")]
    Http,
    /// HTTPS GET against the member FQDN, certificate verification off.
    #[serde(rename = "HTTPS")]
    Https,
    /// Full TCP connect, closed immediately.
    #[serde(rename = "TCP-FULL")]
    TcpFull,
    /// Half-open TCP connect torn down with RST, no data bytes.
    #[serde(rename = "TCP-HALF")]
    TcpHalf,
    /// Random 10% failure, for development.
    #[serde(rename = "DRY-RUN")]
    DryRun,
}

impl CheckKind {
    /// Whether this check produces an HTTP response a script can validate.
    pub fn is_http(&self) -> bool {
        matches!(self, CheckKind::Http | CheckKind::Https)
    }
}

/// One decoded TXT record from the configuration zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Stable identity of the member across snapshots.
    #[serde(rename = "service_id")]
    pub service_id: String,
    /// The group FQDN this member answers for. Defaults to the TXT owner
    /// name when absent.
    #[serde(rename = "member_of", default)]
    pub member_of: String,
    /// Per-member hostname, e.g. a per-datacenter name.
    pub fqdn: String,
    /// Member address.
    pub ip: IpAddr,
    /// Member port, encoded as a string in the zone.
    pub port: String,
    /// Datacenter the member lives in.
    pub datacenter: String,
    /// Base check interval.
    #[serde(default = "default_interval")]
    pub interval: GoDuration,
    /// Priority; smaller is more preferred, minimum 1.
    #[serde(default = "default_priority")]
    pub priority: u32,
    /// Consecutive outcomes required to flip health.
    #[serde(rename = "failure_threshold", default = "default_threshold")]
    pub failure_threshold: u32,
    /// Probe kind.
    #[serde(rename = "check_type")]
    pub check_type: CheckKind,
    /// Optional Lua validation script for HTTP(S) checks.
    #[serde(rename = "lua", default)]
    pub script: Option<String>,
}

fn default_interval() -> GoDuration {
    GoDuration(MIN_CHECK_INTERVAL)
}

fn default_priority() -> u32 {
    1
}

fn default_threshold() -> u32 {
    DEFAULT_FAILURE_THRESHOLD
}

/// Errors produced when decoding a TXT record into a [ServiceConfig].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The rdata is not valid JSON for a service configuration.
    #[error("invalid service configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field value is out of range.
    #[error("invalid service configuration: {0}")]
    Invalid(String),
}

impl ServiceConfig {
    /// Decodes a TXT record into a service configuration.
    ///
    /// `owner` is the record owner name and becomes `member_of` when the
    /// payload does not carry one. Backslash escapes introduced by DNS TXT
    /// quoting are stripped before parsing.
    pub fn from_txt(owner: &str, rdata: &str) -> Result<Self, ConfigError> {
        let unescaped = rdata.replace('\\', "");
        let mut config: ServiceConfig = serde_json::from_str(&unescaped)?;

        if config.member_of.is_empty() {
            config.member_of = owner.trim_end_matches('.').to_string();
        }
        config.validate()?;

        Ok(config)
    }

    /// Validates field ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_id.is_empty() {
            return Err(ConfigError::Invalid("service_id is required".to_string()));
        }
        if self.priority < 1 {
            return Err(ConfigError::Invalid(format!(
                "priority must be >= 1, got {}",
                self.priority
            )));
        }
        if self.failure_threshold < 1 {
            return Err(ConfigError::Invalid(format!(
                "failure_threshold must be >= 1, got {}",
                self.failure_threshold
            )));
        }
        if self.port.parse::<u16>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "port must be a number in [0, 65535], got {:?}",
                self.port
            )));
        }
        Ok(())
    }

    /// The member address in `ip:port` form.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORD: &str = r#"{"service_id":"svc-1","fqdn":"dc1.svc.example.com","ip":"10.0.0.1","port":"80","datacenter":"dc1","interval":"5s","priority":1,"failure_threshold":3,"check_type":"HTTPS","lua":"return status_code ~= 503"}"#;

    #[test]
    fn parses_full_record() {
        let config = ServiceConfig::from_txt("svc.example.com.", RECORD).unwrap();
        assert_eq!(config.service_id, "svc-1");
        assert_eq!(config.member_of, "svc.example.com");
        assert_eq!(config.fqdn, "dc1.svc.example.com");
        assert_eq!(config.interval.duration(), Duration::from_secs(5));
        assert_eq!(config.check_type, CheckKind::Https);
        assert_eq!(config.script.as_deref(), Some("return status_code ~= 503"));
    }

    #[test]
    fn strips_txt_escaping() {
        let escaped = RECORD.replace('"', "\\\"");
        let config = ServiceConfig::from_txt("svc.example.com.", &escaped).unwrap();
        assert_eq!(config.service_id, "svc-1");
    }

    #[test]
    fn member_of_in_payload_wins_over_owner() {
        let record = r#"{"service_id":"svc-1","member_of":"other.example","fqdn":"f","ip":"10.0.0.1","port":"80","datacenter":"dc1","check_type":"TCP-FULL"}"#;
        let config = ServiceConfig::from_txt("svc.example.com.", record).unwrap();
        assert_eq!(config.member_of, "other.example");
    }

    #[test]
    fn defaults_applied() {
        let record = r#"{"service_id":"svc-1","fqdn":"f","ip":"10.0.0.1","port":"80","datacenter":"dc1","check_type":"TCP-FULL"}"#;
        let config = ServiceConfig::from_txt("svc.example.com.", record).unwrap();
        assert_eq!(config.failure_threshold, DEFAULT_FAILURE_THRESHOLD);
        assert_eq!(config.priority, 1);
        assert_eq!(config.interval.duration(), MIN_CHECK_INTERVAL);
        assert!(config.script.is_none());
    }

    #[test]
    fn missing_service_id_is_rejected() {
        let record = r#"{"fqdn":"f","ip":"10.0.0.1","port":"80","datacenter":"dc1","check_type":"TCP-FULL"}"#;
        assert!(ServiceConfig::from_txt("svc.example.com.", record).is_err());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let record = r#"{"service_id":"svc-1","fqdn":"f","ip":"10.0.0.1","port":"80","datacenter":"dc1","check_type":"TCP-FULL","future_field":42}"#;
        assert!(ServiceConfig::from_txt("svc.example.com.", record).is_ok());
    }

    #[test]
    fn bad_port_is_rejected() {
        let record = r#"{"service_id":"svc-1","fqdn":"f","ip":"10.0.0.1","port":"http","datacenter":"dc1","check_type":"TCP-FULL"}"#;
        assert!(ServiceConfig::from_txt("svc.example.com.", record).is_err());
    }
}
