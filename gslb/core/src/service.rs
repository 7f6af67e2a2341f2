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
//! Live service entity and its hysteretic health state machine.

use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use arc_swap::{ArcSwap, ArcSwapOption};
use gslb_models::{CheckKind, ServiceConfig, Spoof};
use parking_lot::{Mutex, RwLock};

use crate::{
    checks::{DEFAULT_TIMEOUT, LuaPool, LuaValidator, Probe},
    pool::{Job, JobError},
    roundtrip::Roundtripper,
};

/// Validation script applied to HTTP(S) checks that configure none.
pub const DEFAULT_VALIDATION_SCRIPT: &str = "return status_code ~= 503";

/// Errors creating or reconfiguring a service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The configured port is not a valid TCP port.
    #[error("invalid port: {0:?}")]
    InvalidPort(String),

    /// The HTTP probe client could not be constructed.
    #[error("could not build http probe: {0}")]
    ProbeClient(#[from] reqwest::Error),
}

/// Inputs needed to build a probe out of a service configuration.
#[derive(Clone, Default)]
pub struct ProbeContext {
    /// Probe timeout; [DEFAULT_TIMEOUT] when `None`.
    pub timeout: Option<Duration>,
    /// Replace every probe with the dry-run probe.
    pub dry_run: bool,
    /// VM pool for script validation; without one, scripts are ignored.
    pub lua: Option<Arc<LuaPool>>,
}

/// Configured identity of a service. All fields may change on a zone
/// update except the service id.
#[derive(Debug, Clone)]
struct Profile {
    member_of: String,
    fqdn: String,
    datacenter: String,
    ip: IpAddr,
    port: u16,
    check_kind: CheckKind,
    priority: u32,
    failure_threshold: u32,
    default_interval: Duration,
    script: Option<String>,
}

impl Profile {
    fn from_config(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let port: u16 = config
            .port
            .parse()
            .map_err(|_| ServiceError::InvalidPort(config.port.clone()))?;

        Ok(Profile {
            member_of: config.member_of.clone(),
            fqdn: config.fqdn.clone(),
            datacenter: config.datacenter.clone(),
            ip: config.ip,
            port,
            check_kind: config.check_type,
            priority: config.priority.max(1),
            failure_threshold: config.failure_threshold.max(1),
            default_interval: config.interval.duration(),
            script: config.script.clone(),
        })
    }

    fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

#[derive(Debug)]
struct Health {
    healthy: bool,
    failure_count: u32,
}

type HealthCallback = Box<dyn Fn(bool) + Send + Sync>;

/// A health-checked member of a service group.
///
/// Owned by the registry; shared with its scheduler bucket, its group and
/// in-flight check jobs through `Arc`. Identity is the stable `id`; the
/// rest of the configuration can be reassigned when the zone changes
/// without losing accumulated health state.
pub struct Service {
    id: String,
    profile: RwLock<Profile>,
    probe: ArcSwap<Probe>,
    health: Mutex<Health>,
    scheduled_interval: Mutex<Duration>,
    roundtrip: Roundtripper,
    on_health: ArcSwapOption<HealthCallback>,
}

impl Service {
    /// Builds a service from its zone configuration.
    ///
    /// Services start unhealthy with a full failure counter: a member must
    /// prove itself with `failure_threshold` consecutive successes before
    /// it can be promoted.
    pub fn from_config(
        config: &ServiceConfig,
        context: &ProbeContext,
    ) -> Result<Arc<Self>, ServiceError> {
        let profile = Profile::from_config(config)?;
        let probe = build_probe(&profile, context)?;

        Ok(Arc::new(Service {
            id: config.service_id.clone(),
            health: Mutex::new(Health {
                healthy: false,
                failure_count: profile.failure_threshold,
            }),
            scheduled_interval: Mutex::new(profile.default_interval),
            profile: RwLock::new(profile),
            probe: ArcSwap::from_pointee(probe),
            roundtrip: Roundtripper::new(),
            on_health: ArcSwapOption::empty(),
        }))
    }

    /// Stable identity across snapshots.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The group FQDN this member answers for.
    pub fn member_of(&self) -> String {
        self.profile.read().member_of.clone()
    }

    /// The per-member hostname.
    pub fn fqdn(&self) -> String {
        self.profile.read().fqdn.clone()
    }

    /// The datacenter the member lives in.
    pub fn datacenter(&self) -> String {
        self.profile.read().datacenter.clone()
    }

    /// The probed address.
    pub fn addr(&self) -> SocketAddr {
        self.profile.read().addr()
    }

    /// Priority; smaller is more preferred.
    pub fn priority(&self) -> u32 {
        self.profile.read().priority
    }

    /// Consecutive outcomes required to flip health.
    pub fn failure_threshold(&self) -> u32 {
        self.profile.read().failure_threshold
    }

    /// The configured base check interval.
    pub fn default_interval(&self) -> Duration {
        self.profile.read().default_interval
    }

    /// The interval bucket the service currently polls on.
    pub fn scheduled_interval(&self) -> Duration {
        *self.scheduled_interval.lock()
    }

    /// Moves the service to a new interval bucket. Called by the registry
    /// only; the scheduler moves are handled there.
    pub(crate) fn set_scheduled_interval(&self, interval: Duration) {
        *self.scheduled_interval.lock() = interval;
    }

    /// Whether the member currently counts as up.
    pub fn is_healthy(&self) -> bool {
        self.health.lock().healthy
    }

    /// Current failure counter, for diagnostics.
    pub fn failure_count(&self) -> u32 {
        self.health.lock().failure_count
    }

    /// Rolling average check duration, `None` before the first check.
    pub fn average_roundtrip(&self) -> Option<Duration> {
        self.roundtrip.average()
    }

    /// Records one synthetic roundtrip sample.
    #[cfg(test)]
    pub(crate) fn roundtrip_for_tests(&self) {
        self.roundtrip.start_record();
        self.roundtrip.end_record();
    }

    /// The spoof this member installs when active.
    pub fn spoof(&self) -> Spoof {
        let profile = self.profile.read();
        Spoof {
            fqdn: profile.member_of.clone(),
            ip: profile.ip,
            datacenter: profile.datacenter.clone(),
        }
    }

    /// Installs the health-change callback. The callback runs on worker
    /// tasks and must not block.
    pub fn set_on_health(&self, callback: impl Fn(bool) + Send + Sync + 'static) {
        self.on_health.store(Some(Arc::new(Box::new(callback))));
    }

    /// Whether `config` differs from the live configuration in any
    /// observable way.
    pub fn config_changed(&self, config: &ServiceConfig) -> bool {
        let profile = self.profile.read();
        let port_changed = config
            .port
            .parse::<u16>()
            .map(|p| p != profile.port)
            .unwrap_or(true);

        profile.member_of != config.member_of
            || profile.fqdn != config.fqdn
            || profile.datacenter != config.datacenter
            || profile.ip != config.ip
            || port_changed
            || profile.check_kind != config.check_type
            || profile.priority != config.priority.max(1)
            || profile.failure_threshold != config.failure_threshold.max(1)
            || profile.default_interval != config.interval.duration()
            || profile.script != config.script
    }

    /// Replaces the live configuration with `config`, rebuilding the probe
    /// while preserving health state, the failure counter and the rolling
    /// roundtrip samples.
    pub fn assign(
        &self,
        config: &ServiceConfig,
        context: &ProbeContext,
    ) -> Result<(), ServiceError> {
        let profile = Profile::from_config(config)?;
        let probe = build_probe(&profile, context)?;

        let threshold = profile.failure_threshold;
        *self.profile.write() = profile;
        self.probe.store(Arc::new(probe));

        let mut health = self.health.lock();
        health.failure_count = health.failure_count.min(threshold);

        Ok(())
    }

    /// Applies one successful check outcome. Returns `Some(true)` when the
    /// service flips to healthy.
    fn on_check_success(&self) -> Option<bool> {
        let mut health = self.health.lock();
        if health.healthy {
            // An intervening success resets a partial failure run.
            health.failure_count = 0;
            return None;
        }

        health.failure_count = health.failure_count.saturating_sub(1);
        if health.failure_count == 0 {
            health.healthy = true;
            return Some(true);
        }
        None
    }

    /// Applies one failed check outcome. Returns `Some(false)` when the
    /// service flips to unhealthy.
    fn on_check_failure(&self) -> Option<bool> {
        let mut health = self.health.lock();
        if !health.healthy {
            // Pin the counter so recovery requires a full run of successes.
            health.failure_count = self.profile.read().failure_threshold;
            return None;
        }

        health.failure_count += 1;
        if health.failure_count >= self.profile.read().failure_threshold {
            health.healthy = false;
            health.failure_count = self.profile.read().failure_threshold;
            return Some(false);
        }
        None
    }

    fn emit_health_change(&self, healthy: bool) {
        if let Some(callback) = self.on_health.load_full() {
            callback(healthy);
        }
    }
}

#[async_trait::async_trait]
impl Job for Service {
    async fn execute(&self) -> Result<(), JobError> {
        let probe = self.probe.load_full();

        self.roundtrip.start_record();
        let result = probe.check().await;
        self.roundtrip.end_record();

        result.map_err(|e| Box::new(e) as JobError)
    }

    fn on_success(&self) {
        if let Some(flip) = self.on_check_success() {
            tracing::info!(id = %self.id, fqdn = %self.fqdn(), "service became healthy");
            self.emit_health_change(flip);
        }
    }

    fn on_failure(&self, err: JobError) {
        tracing::debug!(id = %self.id, fqdn = %self.fqdn(), error = %err, "health check failed");
        if let Some(flip) = self.on_check_failure() {
            tracing::warn!(id = %self.id, fqdn = %self.fqdn(), "service became unhealthy");
            self.emit_health_change(flip);
        }
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let profile = self.profile.read();
        f.debug_struct("Service")
            .field("id", &self.id)
            .field("member_of", &profile.member_of)
            .field("fqdn", &profile.fqdn)
            .field("datacenter", &profile.datacenter)
            .field("priority", &profile.priority)
            .field("healthy", &self.is_healthy())
            .finish_non_exhaustive()
    }
}

fn build_probe(profile: &Profile, context: &ProbeContext) -> Result<Probe, ServiceError> {
    if context.dry_run {
        return Ok(Probe::DryRun);
    }

    let timeout = context.timeout.unwrap_or(DEFAULT_TIMEOUT);
    let probe = match profile.check_kind {
        CheckKind::TcpFull => Probe::TcpFull {
            addr: profile.addr(),
            timeout,
        },
        CheckKind::TcpHalf => Probe::TcpHalf {
            addr: profile.addr(),
            timeout,
        },
        CheckKind::Http | CheckKind::Https => {
            let scheme = match profile.check_kind {
                CheckKind::Http => "http",
                _ => "https",
            };
            let url = format!("{scheme}://{}/", profile.fqdn);

            let validator = context.lua.as_ref().map(|pool| {
                let script = profile
                    .script
                    .clone()
                    .unwrap_or_else(|| DEFAULT_VALIDATION_SCRIPT.to_string());
                LuaValidator::new(pool.clone(), script)
            });
            Probe::http(url, timeout, validator)?
        }
        CheckKind::DryRun => Probe::DryRun,
    };

    Ok(probe)
}

#[cfg(test)]
pub(crate) mod tests {
    use gslb_utils::duration::GoDuration;

    use super::*;

    pub(crate) fn config(id: &str, priority: u32) -> ServiceConfig {
        ServiceConfig {
            service_id: id.to_string(),
            member_of: "x.example".to_string(),
            fqdn: format!("dc1.{id}.example"),
            ip: "10.0.0.1".parse().unwrap(),
            port: "80".to_string(),
            datacenter: "dc1".to_string(),
            interval: GoDuration(Duration::from_secs(5)),
            priority,
            failure_threshold: 3,
            check_type: CheckKind::TcpFull,
            script: None,
        }
    }

    fn service(id: &str) -> Arc<Service> {
        Service::from_config(&config(id, 1), &ProbeContext::default()).unwrap()
    }

    #[test]
    fn starts_unhealthy_with_pinned_counter() {
        let svc = service("a");
        assert!(!svc.is_healthy());
        assert_eq!(svc.failure_count(), 3);
    }

    #[test]
    fn exactly_threshold_successes_flip_healthy() {
        let svc = service("a");

        assert_eq!(svc.on_check_success(), None);
        assert_eq!(svc.on_check_success(), None);
        assert_eq!(svc.on_check_success(), Some(true));
        assert!(svc.is_healthy());
        assert_eq!(svc.failure_count(), 0);

        // Steady state: further successes emit nothing.
        assert_eq!(svc.on_check_success(), None);
    }

    #[test]
    fn intervening_failure_repins_the_counter() {
        let svc = service("a");

        svc.on_check_success();
        svc.on_check_success();
        assert_eq!(svc.failure_count(), 1);

        // One failure undoes the whole run.
        assert_eq!(svc.on_check_failure(), None);
        assert_eq!(svc.failure_count(), 3);

        // It now takes the full threshold again.
        assert_eq!(svc.on_check_success(), None);
        assert_eq!(svc.on_check_success(), None);
        assert_eq!(svc.on_check_success(), Some(true));
    }

    #[test]
    fn exactly_threshold_failures_flip_unhealthy() {
        let svc = service("a");
        for _ in 0..3 {
            svc.on_check_success();
        }
        assert!(svc.is_healthy());

        assert_eq!(svc.on_check_failure(), None);
        assert_eq!(svc.on_check_failure(), None);
        assert_eq!(svc.on_check_failure(), Some(false));
        assert!(!svc.is_healthy());
        assert_eq!(svc.failure_count(), 3);
    }

    #[test]
    fn intervening_success_resets_failure_run() {
        let svc = service("a");
        for _ in 0..3 {
            svc.on_check_success();
        }

        svc.on_check_failure();
        svc.on_check_failure();
        assert_eq!(svc.failure_count(), 2);

        assert_eq!(svc.on_check_success(), None);
        assert_eq!(svc.failure_count(), 0);
        assert!(svc.is_healthy());
    }

    #[test]
    fn health_flip_emits_callback() {
        let svc = service("a");
        let flips = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = flips.clone();
        svc.set_on_health(move |healthy| sink.lock().push(healthy));

        for _ in 0..3 {
            svc.on_success();
        }
        for _ in 0..3 {
            svc.on_failure("boom".into());
        }

        assert_eq!(*flips.lock(), vec![true, false]);
    }

    #[test]
    fn config_changed_detects_observable_changes() {
        let svc = service("a");
        assert!(!svc.config_changed(&config("a", 1)));

        let mut changed = config("a", 2);
        assert!(svc.config_changed(&changed));

        changed = config("a", 1);
        changed.datacenter = "dc2".to_string();
        assert!(svc.config_changed(&changed));

        changed = config("a", 1);
        changed.interval = GoDuration(Duration::from_secs(10));
        assert!(svc.config_changed(&changed));
    }

    #[test]
    fn assign_preserves_health_state() {
        let svc = service("a");
        for _ in 0..3 {
            svc.on_check_success();
        }
        assert!(svc.is_healthy());

        let mut new_config = config("a", 2);
        new_config.datacenter = "dc2".to_string();
        svc.assign(&new_config, &ProbeContext::default()).unwrap();

        assert!(svc.is_healthy());
        assert_eq!(svc.failure_count(), 0);
        assert_eq!(svc.priority(), 2);
        assert_eq!(svc.datacenter(), "dc2");
    }

    #[test]
    fn assign_clamps_counter_to_new_threshold() {
        let svc = service("a");
        assert_eq!(svc.failure_count(), 3);

        let mut new_config = config("a", 1);
        new_config.failure_threshold = 2;
        svc.assign(&new_config, &ProbeContext::default()).unwrap();
        assert_eq!(svc.failure_count(), 2);
    }
}
