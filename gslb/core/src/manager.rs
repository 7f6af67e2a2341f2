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
//! Service registry and orchestration.
//!
//! The manager owns every live service and the machinery around it: one
//! scheduler per active check interval, one group per group FQDN, and the
//! shared worker pool. Zone snapshots are reconciled against the live set;
//! promotion events coming back from the groups are translated into
//! scheduler moves and DNS updates.
//!
//! Lock discipline: the registry state lock is never held across a call
//! into a group or scheduler, both of which emit callbacks that re-enter
//! the registry.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use arc_swap::ArcSwapOption;
use futures::FutureExt;
use gslb_models::{Failover, MAX_CHECK_INTERVAL, ServiceConfig};
use parking_lot::RwLock;

use crate::{
    checks::LuaPool,
    group::{GroupError, PromotionEvent, ServiceGroup},
    pool::WorkerPool,
    scheduler::{Scheduler, TickFn},
    service::{ProbeContext, Service, ServiceError},
};

/// Options for [ServiceManager].
#[derive(Clone)]
pub struct ManagerOptions {
    /// Baseline number of check workers.
    pub min_workers: usize,
    /// Capacity of the job queue. Must at least cover the baseline.
    pub buffer_size: usize,
    /// Replace every probe with the dry-run probe.
    pub dry_run: bool,
    /// Local datacenter, preferred as the ActiveActive tie-break.
    pub prioritized_datacenter: Option<String>,
    /// Probe timeout override.
    pub probe_timeout: Option<Duration>,
    /// Lua VM pool for scripted HTTP validation.
    pub lua: Option<Arc<LuaPool>>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        ManagerOptions {
            min_workers: 100,
            buffer_size: 110,
            dry_run: false,
            prioritized_datacenter: None,
            probe_timeout: None,
            lua: None,
        }
    }
}

impl ManagerOptions {
    fn validate(&self) -> Result<(), &'static str> {
        if self.buffer_size < self.min_workers {
            // Otherwise a full queue does not mean missing capacity and the
            // pool would grow without bound.
            return Err("buffer_size must be at least min_workers");
        }
        Ok(())
    }
}

/// Errors produced by registry operations.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// No service with the given id is registered.
    #[error("service not found: {0}")]
    ServiceNotFound(String),

    /// No group answers for the given FQDN.
    #[error("no registered service group for {0:?}")]
    GroupNotFound(String),

    /// The service could not be built from its configuration.
    #[error("unable to register service: {0}")]
    Register(#[from] ServiceError),

    /// A group operation failed.
    #[error(transparent)]
    Group(#[from] GroupError),
}

/// Callback pushing a member's spoof to (or removing it from) the data
/// plane. The `bool` is true for "service up".
pub type DnsUpdateFn = Arc<dyn Fn(Arc<Service>, bool) + Send + Sync>;

/// Read-side interface the admin API consumes.
pub trait QueryManager: Send + Sync {
    /// The active member for a group, if any.
    fn active_for(&self, member_of: &str) -> Option<Arc<Service>>;

    /// Force-promote the member in the requested datacenter.
    fn failover(&self, fqdn: &str, failover: &Failover) -> Result<(), ManagerError>;
}

struct ManagerState {
    groups: HashMap<String, Arc<ServiceGroup>>,
    schedulers: HashMap<Duration, Arc<Scheduler>>,
    // Sorted by service id per interval so lookups can binary-search.
    scheduled: HashMap<Duration, Vec<Arc<Service>>>,
}

struct ManagerInner {
    context: ProbeContext,
    prioritized_datacenter: Option<String>,
    pool: WorkerPool,
    state: RwLock<ManagerState>,
    dns_update: ArcSwapOption<DnsUpdateFn>,
}

/// The service registry.
#[derive(Clone)]
pub struct ServiceManager {
    inner: Arc<ManagerInner>,
}

/// The interval a member polls on while demoted: the base interval scaled
/// by `3^(priority-1)`, capped at [MAX_CHECK_INTERVAL].
pub fn scaled_interval(default: Duration, priority: u32) -> Duration {
    let factor = 3u32.saturating_pow(priority.saturating_sub(1));
    (default * factor).min(MAX_CHECK_INTERVAL)
}

impl ServiceManager {
    /// Creates a manager. The worker pool is not started yet; call
    /// [Self::start].
    pub fn new(options: ManagerOptions) -> Result<Self, &'static str> {
        options.validate()?;

        if options.dry_run {
            tracing::warn!("dry-run enabled, all probes are synthetic");
        }

        Ok(ServiceManager {
            inner: Arc::new(ManagerInner {
                context: ProbeContext {
                    timeout: options.probe_timeout,
                    dry_run: options.dry_run,
                    lua: options.lua,
                },
                prioritized_datacenter: options.prioritized_datacenter,
                pool: WorkerPool::new(options.min_workers, options.buffer_size),
                state: RwLock::new(ManagerState {
                    groups: HashMap::new(),
                    schedulers: HashMap::new(),
                    scheduled: HashMap::new(),
                }),
                dns_update: ArcSwapOption::empty(),
            }),
        })
    }

    /// Starts the worker pool.
    pub fn start(&self) {
        self.inner.pool.start();
    }

    /// Stops every scheduler, waits for their loops, then drains and stops
    /// the worker pool.
    pub async fn stop(&self) {
        let schedulers: Vec<Arc<Scheduler>> = {
            let mut state = self.inner.state.write();
            state.schedulers.drain().map(|(_, s)| s).collect()
        };

        for scheduler in &schedulers {
            scheduler.cancel();
        }
        for scheduler in schedulers {
            scheduler.shutdown().await;
        }

        self.inner.pool.stop().await;
        tracing::debug!("service manager stopped");
    }

    /// Installs the DNS update callback.
    pub fn set_dns_update(&self, callback: DnsUpdateFn) {
        self.inner.dns_update.store(Some(Arc::new(callback)));
    }

    /// Registers a service, or updates it when the id is already known.
    pub fn register_service(&self, config: &ServiceConfig) -> Result<Arc<Service>, ManagerError> {
        if let Some((_, existing)) = self.find_service(&config.service_id) {
            self.update_service(&existing, config)?;
            return Ok(existing);
        }

        let service = Service::from_config(config, &self.inner.context)?;

        // The health callback resolves the group at call time; weak
        // references keep the registry ⇄ service dependency one-way.
        let weak_inner = Arc::downgrade(&self.inner);
        let weak_service = Arc::downgrade(&service);
        service.set_on_health(move |healthy| {
            let (Some(inner), Some(service)) = (weak_inner.upgrade(), weak_service.upgrade())
            else {
                return;
            };
            tracing::debug!(id = %service.id(), healthy, "received health change");
            let group = inner.state.read().groups.get(&service.member_of()).cloned();
            if let Some(group) = group {
                group.on_service_health_change(&service, healthy);
            }
        });

        let interval = scaled_interval(service.default_interval(), service.priority());
        service.set_scheduled_interval(interval);

        let (scheduler, group) = {
            let mut state = self.inner.state.write();
            insert_sorted(state.scheduled.entry(interval).or_default(), &service);
            let scheduler = self.ensure_scheduler(&mut state, interval);
            let group = self.ensure_group(&mut state, &service.member_of());
            (scheduler, group)
        };

        scheduler.schedule_service(service.clone());
        group.register_service(service.clone());

        tracing::debug!(service = ?service, "registered service");
        Ok(service)
    }

    /// Removes a service by id, garbage-collecting its scheduler and group
    /// when they empty out.
    pub fn remove_service(&self, id: &str) -> Result<(), ManagerError> {
        let Some((interval, service)) = self.find_service(id) else {
            return Err(ManagerError::ServiceNotFound(id.to_string()));
        };

        let scheduler = self.inner.state.read().schedulers.get(&interval).cloned();
        if let Some(scheduler) = scheduler
            && scheduler.remove_service(id)
        {
            scheduler.cancel();
            self.inner.state.write().schedulers.remove(&interval);
        }

        let member_of = service.member_of();
        let group = self.inner.state.read().groups.get(&member_of).cloned();
        if let Some(group) = group
            && group.remove_service(id)
        {
            self.inner.state.write().groups.remove(&member_of);
        }

        let mut state = self.inner.state.write();
        if let Some(services) = state.scheduled.get_mut(&interval) {
            services.retain(|s| s.id() != id);
            if services.is_empty() {
                state.scheduled.remove(&interval);
            }
        }

        tracing::debug!(id, "removed service");
        Ok(())
    }

    /// Applies one full zone snapshot: every present config is registered
    /// (idempotently), every known id absent from the snapshot is removed.
    pub fn reconcile(&self, configs: &[ServiceConfig]) {
        let mut present: HashSet<String> = HashSet::with_capacity(configs.len());

        for config in configs {
            match self.register_service(config) {
                Ok(service) => {
                    present.insert(service.id().to_string());
                }
                Err(err) => {
                    tracing::error!(
                        service_id = %config.service_id,
                        error = %err,
                        "skipping service from snapshot"
                    );
                }
            }
        }

        for id in self.service_ids() {
            if !present.contains(&id) {
                tracing::info!(id, "service no longer in zone, removing");
                if let Err(err) = self.remove_service(&id) {
                    tracing::error!(id, error = %err, "failed to remove service");
                }
            }
        }
    }

    /// Looks up a registered service by id.
    pub fn service(&self, id: &str) -> Option<Arc<Service>> {
        self.find_service(id).map(|(_, service)| service)
    }

    /// Ids of every registered service.
    pub fn service_ids(&self) -> Vec<String> {
        let state = self.inner.state.read();
        state
            .scheduled
            .values()
            .flat_map(|services| services.iter().map(|s| s.id().to_string()))
            .collect()
    }

    /// Number of registered services.
    pub fn len(&self) -> usize {
        self.inner
            .state
            .read()
            .scheduled
            .values()
            .map(Vec::len)
            .sum()
    }

    /// Whether no services are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find_service(&self, id: &str) -> Option<(Duration, Arc<Service>)> {
        let state = self.inner.state.read();
        for (interval, services) in &state.scheduled {
            if let Ok(idx) = services.binary_search_by(|s| s.id().cmp(id)) {
                return Some((*interval, services[idx].clone()));
            }
        }
        None
    }

    /// Updates a live service in place from a new snapshot config.
    fn update_service(
        &self,
        service: &Arc<Service>,
        config: &ServiceConfig,
    ) -> Result<(), ManagerError> {
        if !service.config_changed(config) {
            tracing::debug!(id = %service.id(), "skipping update, config unchanged");
            return Ok(());
        }

        let old_member_of = service.member_of();
        let old_default = service.default_interval();
        let new_member_of = config.member_of.clone();

        if old_member_of != new_member_of {
            // Leave the old group before the new name is assigned: a
            // removal event emitted there must still carry the old group
            // name into the DNS delete.
            let old_group = self.inner.state.read().groups.get(&old_member_of).cloned();
            if let Some(old_group) = old_group
                && old_group.remove_service(service.id())
            {
                self.inner.state.write().groups.remove(&old_member_of);
            }

            service.assign(config, &self.inner.context)?;

            let new_group = {
                let mut state = self.inner.state.write();
                self.ensure_group(&mut state, &new_member_of)
            };
            // The new group re-arbitrates; a healthy mover may promote.
            new_group.register_service(service.clone());

            tracing::debug!(
                id = %service.id(),
                old_group = %old_member_of,
                new_group = %new_member_of,
                "updated service group membership"
            );
        } else {
            service.assign(config, &self.inner.context)?;
            let group = self.inner.state.read().groups.get(&old_member_of).cloned();
            if let Some(group) = group {
                group.update();
            }
        }

        let new_default = service.default_interval();

        // Checked after the groups ran their arbitration: a promotion may
        // already have moved the service. Only a service still sitting on
        // its old default bucket follows the new default.
        if old_default != new_default && service.scheduled_interval() == old_default {
            self.move_service_to_interval(service, new_default);
        }

        tracing::debug!(service = ?service, "updated service");
        Ok(())
    }

    /// Translates an arbitration event into scheduler moves and a DNS
    /// update.
    fn handle_promotion(&self, event: PromotionEvent) {
        let PromotionEvent {
            member_of,
            old_active,
            new_active,
        } = event;

        match (old_active, new_active) {
            (Some(old), Some(new)) => {
                // Swap: the demoted member takes over the successor's
                // (scaled) slot, the promoted one polls at the base rate.
                let demoted_interval = new.scheduled_interval();
                let base_interval = old.default_interval();

                tracing::warn!(
                    member_of,
                    old = %old.datacenter(),
                    new = %new.datacenter(),
                    "failing over active member"
                );

                self.move_service_to_interval(&old, demoted_interval);
                self.dns_update(&old, false);

                self.move_service_to_interval(&new, base_interval);
                self.dns_update(&new, true);
            }
            (None, Some(new)) => {
                tracing::info!(member_of, new = %new.datacenter(), "new active member");
                self.move_service_to_interval(&new, new.default_interval());
                self.dns_update(&new, true);
            }
            (Some(old), None) => {
                tracing::warn!(member_of, "no healthy members left");
                self.dns_update(&old, false);
            }
            (None, None) => {}
        }
    }

    fn dns_update(&self, service: &Arc<Service>, up: bool) {
        if let Some(callback) = self.inner.dns_update.load_full() {
            callback(service.clone(), up);
        }
    }

    /// Moves a service between interval buckets, creating and collecting
    /// schedulers as needed.
    fn move_service_to_interval(&self, service: &Arc<Service>, new_interval: Duration) {
        let old_interval = service.scheduled_interval();
        if old_interval == new_interval {
            return;
        }

        let (old_scheduler, new_scheduler) = {
            let mut state = self.inner.state.write();

            if let Some(services) = state.scheduled.get_mut(&old_interval) {
                services.retain(|s| s.id() != service.id());
                if services.is_empty() {
                    state.scheduled.remove(&old_interval);
                }
            }
            service.set_scheduled_interval(new_interval);
            insert_sorted(state.scheduled.entry(new_interval).or_default(), service);

            let old_scheduler = state.schedulers.get(&old_interval).cloned();
            let new_scheduler = self.ensure_scheduler(&mut state, new_interval);
            (old_scheduler, new_scheduler)
        };

        if let Some(old_scheduler) = old_scheduler
            && old_scheduler.remove_service(service.id())
        {
            old_scheduler.cancel();
            self.inner.state.write().schedulers.remove(&old_interval);
        }
        new_scheduler.schedule_service(service.clone());

        tracing::debug!(
            id = %service.id(),
            from = ?old_interval,
            to = ?new_interval,
            "moved service to new interval"
        );
    }

    fn ensure_scheduler(&self, state: &mut ManagerState, interval: Duration) -> Arc<Scheduler> {
        if let Some(scheduler) = state.schedulers.get(&interval) {
            return scheduler.clone();
        }

        let pool = self.inner.pool.clone();
        let on_tick: TickFn = Arc::new(move |service: Arc<Service>| {
            let pool = pool.clone();
            async move {
                if let Err(err) = pool.put(service).await {
                    tracing::error!(error = %err, "failed to schedule health check");
                }
            }
            .boxed()
        });

        let scheduler = Scheduler::new(interval, on_tick);
        state.schedulers.insert(interval, scheduler.clone());
        tracing::debug!(?interval, "new scheduler");
        scheduler
    }

    fn ensure_group(&self, state: &mut ManagerState, member_of: &str) -> Arc<ServiceGroup> {
        if let Some(group) = state.groups.get(member_of) {
            return group.clone();
        }

        let group = Arc::new(ServiceGroup::new(
            member_of,
            self.inner.prioritized_datacenter.clone(),
        ));

        let weak_inner = Arc::downgrade(&self.inner);
        group.set_on_promotion(Arc::new(move |event| {
            if let Some(inner) = weak_inner.upgrade() {
                ServiceManager { inner }.handle_promotion(event);
            }
        }));

        state.groups.insert(member_of.to_string(), group.clone());
        tracing::debug!(member_of, "new service group");
        group
    }
}

impl QueryManager for ServiceManager {
    fn active_for(&self, member_of: &str) -> Option<Arc<Service>> {
        let group = self.inner.state.read().groups.get(member_of).cloned()?;
        group.active()
    }

    fn failover(&self, fqdn: &str, failover: &Failover) -> Result<(), ManagerError> {
        let group = self
            .inner
            .state
            .read()
            .groups
            .get(fqdn)
            .cloned()
            .ok_or_else(|| ManagerError::GroupNotFound(fqdn.to_string()))?;

        group.failover(&failover.datacenter)?;
        Ok(())
    }
}

fn insert_sorted(services: &mut Vec<Arc<Service>>, service: &Arc<Service>) {
    let idx = services
        .binary_search_by(|s| s.id().cmp(service.id()))
        .unwrap_or_else(|idx| idx);
    services.insert(idx, service.clone());
}
