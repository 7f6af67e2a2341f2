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
//! Per-group arbitration of the active member.
//!
//! A group collects every member answering for one FQDN and decides which
//! of them the data plane should point at. Members are kept sorted by
//! `(priority, datacenter affinity, average roundtrip)`; health flips,
//! membership changes and operator failovers move the `active` pointer and
//! emit exactly one [PromotionEvent] per transition.
//!
//! Only one answer ever goes to DNS, so ActiveActive collapses to "prefer
//! the local datacenter, otherwise any healthy member"; ActivePassive
//! follows strict priority order.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::{Mutex, RwLock};

use crate::service::Service;

/// Arbitration semantics of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupMode {
    /// All members share one priority; datacenter affinity picks the
    /// answer.
    ActiveActive,
    /// Members have distinct priorities; the best healthy priority wins.
    ActivePassive,
}

/// Notification that a group's active member changed.
///
/// `new_active = None` means no member is healthy and the DNS record must
/// be removed.
#[derive(Clone)]
pub struct PromotionEvent {
    /// The group FQDN.
    pub member_of: String,
    /// The previously active member, if any.
    pub old_active: Option<Arc<Service>>,
    /// The newly active member, if any.
    pub new_active: Option<Arc<Service>>,
}

impl std::fmt::Debug for PromotionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromotionEvent")
            .field("member_of", &self.member_of)
            .field("old_active", &self.old_active.as_ref().map(|s| s.id().to_string()))
            .field("new_active", &self.new_active.as_ref().map(|s| s.id().to_string()))
            .finish()
    }
}

/// Callback receiving promotion events. Always invoked with the group lock
/// released.
pub type PromotionFn = Arc<dyn Fn(PromotionEvent) + Send + Sync>;

/// Errors produced by group operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GroupError {
    /// No member lives in the requested datacenter.
    #[error("no member of the group lives in datacenter {0:?}")]
    MemberNotFound(String),

    /// The requested member is not healthy.
    #[error("cannot promote unhealthy service in datacenter {0:?}")]
    CannotPromoteUnhealthy(String),
}

struct GroupInner {
    members: Vec<Arc<Service>>,
    mode: GroupMode,
    active: Option<Arc<Service>>,
    last_active: Option<Arc<Service>>,
}

/// The set of services answering for one FQDN.
pub struct ServiceGroup {
    member_of: String,
    prioritized_datacenter: Option<String>,
    on_promotion: ArcSwapOption<PromotionFn>,
    // Serializes whole mutating operations including their event emission,
    // so the registry finishes handling one promotion before the group can
    // produce the next. The inner lock alone cannot give that guarantee
    // because events are emitted after it is released.
    emit_lock: Mutex<()>,
    inner: RwLock<GroupInner>,
}

impl ServiceGroup {
    /// Creates an empty group for `member_of`. `prioritized_datacenter`
    /// is the local datacenter used as the ActiveActive tie-break.
    pub fn new(member_of: impl Into<String>, prioritized_datacenter: Option<String>) -> Self {
        ServiceGroup {
            member_of: member_of.into(),
            prioritized_datacenter,
            on_promotion: ArcSwapOption::empty(),
            emit_lock: Mutex::new(()),
            inner: RwLock::new(GroupInner {
                members: Vec::new(),
                mode: GroupMode::ActiveActive,
                active: None,
                last_active: None,
            }),
        }
    }

    /// The group FQDN.
    pub fn member_of(&self) -> &str {
        &self.member_of
    }

    /// Installs the promotion callback.
    pub fn set_on_promotion(&self, callback: PromotionFn) {
        self.on_promotion.store(Some(Arc::new(callback)));
    }

    /// Current arbitration mode.
    pub fn mode(&self) -> GroupMode {
        self.inner.read().mode
    }

    /// The currently active member.
    pub fn active(&self) -> Option<Arc<Service>> {
        self.inner.read().active.clone()
    }

    /// The member that was active before the last transition, for audit.
    pub fn last_active(&self) -> Option<Arc<Service>> {
        self.inner.read().last_active.clone()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.inner.read().members.len()
    }

    /// Whether the group has no members.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds a member and recomputes the mode.
    ///
    /// Freshly created services are never healthy, so registration alone
    /// cannot promote. A healthy service moved in from another group is
    /// arbitrated immediately.
    pub fn register_service(&self, service: Arc<Service>) {
        let _order = self.emit_lock.lock();
        let event = {
            let mut inner = self.inner.write();
            inner.members.push(service.clone());
            self.sort_members(&mut inner);
            self.recompute_mode(&mut inner);

            if service.is_healthy() {
                self.arbitrate(&mut inner, &service, true)
            } else {
                None
            }
        };
        self.emit(event);
    }

    /// Removes a member by id. Returns `true` when the group is empty
    /// afterwards, signaling the registry to garbage-collect it.
    ///
    /// Removing the active member arbitrates a replacement so the data
    /// plane never keeps pointing at a deregistered service.
    pub fn remove_service(&self, id: &str) -> bool {
        let _order = self.emit_lock.lock();
        let (event, empty) = {
            let mut inner = self.inner.write();
            let Some(idx) = inner.members.iter().position(|m| m.id() == id) else {
                return inner.members.is_empty();
            };
            let removed = inner.members.remove(idx);
            self.recompute_mode(&mut inner);

            let was_active = inner.active.as_ref().is_some_and(|a| a.id() == id);
            let event = if was_active {
                let next = inner.members.iter().find(|m| m.is_healthy()).cloned();
                Some(self.set_active(&mut inner, next, Some(removed)))
            } else {
                None
            };
            (event, inner.members.is_empty())
        };

        self.emit(event);
        empty
    }

    /// Reacts to a member's health flip.
    pub fn on_service_health_change(&self, service: &Arc<Service>, healthy: bool) {
        let _order = self.emit_lock.lock();
        let event = {
            let mut inner = self.inner.write();
            // Roundtrip averages moved since the last sort.
            self.sort_members(&mut inner);
            self.arbitrate(&mut inner, service, healthy)
        };
        self.emit(event);
    }

    /// Re-sorts and re-arbitrates after a configuration change.
    pub fn update(&self) {
        let _order = self.emit_lock.lock();
        let event = {
            let mut inner = self.inner.write();
            self.sort_members(&mut inner);
            self.recompute_mode(&mut inner);

            let best_healthy = inner.members.iter().find(|m| m.is_healthy()).cloned();
            let active = inner.active.clone();
            match (active, best_healthy) {
                (None, Some(best)) => Some(self.set_active(&mut inner, Some(best), None)),
                (Some(a), Some(best))
                    if best.id() != a.id()
                        && (!a.is_healthy() || best.priority() < a.priority()) =>
                {
                    Some(self.set_active(&mut inner, Some(best), Some(a)))
                }
                _ => None,
            }
        };
        self.emit(event);
    }

    /// Force-promotes the member in `datacenter`, provided it is healthy.
    pub fn failover(&self, datacenter: &str) -> Result<(), GroupError> {
        let _order = self.emit_lock.lock();
        let event = {
            let mut inner = self.inner.write();
            let target = inner
                .members
                .iter()
                .find(|m| m.datacenter() == datacenter)
                .cloned()
                .ok_or_else(|| GroupError::MemberNotFound(datacenter.to_string()))?;

            if !target.is_healthy() {
                return Err(GroupError::CannotPromoteUnhealthy(datacenter.to_string()));
            }

            let active = inner.active.clone();
            Some(self.set_active(&mut inner, Some(target), active))
        };

        self.emit(event);
        Ok(())
    }

    fn arbitrate(
        &self,
        inner: &mut GroupInner,
        service: &Arc<Service>,
        healthy: bool,
    ) -> Option<PromotionEvent> {
        match inner.mode {
            GroupMode::ActivePassive => self.arbitrate_active_passive(inner, service, healthy),
            GroupMode::ActiveActive => self.arbitrate_active_active(inner, service, healthy),
        }
    }

    fn arbitrate_active_passive(
        &self,
        inner: &mut GroupInner,
        service: &Arc<Service>,
        healthy: bool,
    ) -> Option<PromotionEvent> {
        let active = inner.active.clone();

        if !healthy {
            if active.as_ref().is_some_and(|a| a.id() == service.id()) {
                // The active member went dark: members are in priority
                // order, so the first healthy one is the best successor.
                let next = inner
                    .members
                    .iter()
                    .find(|m| m.is_healthy() && m.id() != service.id())
                    .cloned();
                return Some(self.set_active(inner, next, Some(service.clone())));
            }
            return None;
        }

        match active {
            None => Some(self.set_active(inner, Some(service.clone()), None)),
            Some(a) if !a.is_healthy() || service.priority() <= a.priority() => {
                Some(self.set_active(inner, Some(service.clone()), Some(a)))
            }
            Some(_) => None,
        }
    }

    fn arbitrate_active_active(
        &self,
        inner: &mut GroupInner,
        service: &Arc<Service>,
        healthy: bool,
    ) -> Option<PromotionEvent> {
        let active = inner.active.clone();

        if healthy {
            let affinity = self
                .prioritized_datacenter
                .as_deref()
                .is_some_and(|dc| service.datacenter() == dc);
            let is_active = active.as_ref().is_some_and(|a| a.id() == service.id());

            if affinity && !is_active {
                // The local datacenter always wins the single record.
                return Some(self.set_active(inner, Some(service.clone()), active));
            }
            if !active.as_ref().is_some_and(|a| a.is_healthy()) {
                return Some(self.set_active(inner, Some(service.clone()), active));
            }
            return None;
        }

        if active.as_ref().is_some_and(|a| a.id() == service.id()) {
            let next = inner.members.iter().find(|m| m.is_healthy()).cloned();
            return Some(self.set_active(inner, next, Some(service.clone())));
        }
        None
    }

    fn set_active(
        &self,
        inner: &mut GroupInner,
        new: Option<Arc<Service>>,
        old: Option<Arc<Service>>,
    ) -> PromotionEvent {
        if let Some(old) = &old {
            inner.last_active = Some(old.clone());
        }
        inner.active = new.clone();

        PromotionEvent {
            member_of: self.member_of.clone(),
            old_active: old,
            new_active: new,
        }
    }

    /// Stable member order: priority first, then the prioritized
    /// datacenter, then the faster average roundtrip with unmeasured
    /// members last.
    fn sort_members(&self, inner: &mut GroupInner) {
        let prioritized = self.prioritized_datacenter.clone();
        inner.members.sort_by_key(|svc| {
            let roundtrip = svc.average_roundtrip();
            let foreign_dc = prioritized
                .as_deref()
                .map(|dc| svc.datacenter() != dc)
                .unwrap_or(true);
            (
                svc.priority(),
                foreign_dc,
                roundtrip.is_none(),
                roundtrip.unwrap_or_default(),
            )
        });
    }

    /// Mode selection: one member or uniform priority means ActiveActive,
    /// anything else ActivePassive.
    fn recompute_mode(&self, inner: &mut GroupInner) {
        let mode = match inner.members.as_slice() {
            [] | [_] => GroupMode::ActiveActive,
            [first, rest @ ..] => {
                let priority = first.priority();
                if rest.iter().all(|m| m.priority() == priority) {
                    GroupMode::ActiveActive
                } else {
                    GroupMode::ActivePassive
                }
            }
        };

        if mode != inner.mode {
            tracing::debug!(member_of = %self.member_of, ?mode, "service group mode changed");
            inner.mode = mode;
        }
    }

    /// Emits an event with the lock released, suppressing no-op
    /// transitions.
    fn emit(&self, event: Option<PromotionEvent>) {
        let Some(event) = event else { return };

        match (&event.old_active, &event.new_active) {
            (None, None) => return,
            (Some(old), Some(new)) if old.id() == new.id() => return,
            _ => {}
        }

        tracing::info!(
            member_of = %event.member_of,
            old = event.old_active.as_ref().map(|s| s.datacenter()),
            new = event.new_active.as_ref().map(|s| s.datacenter()),
            "promotion"
        );

        if let Some(callback) = self.on_promotion.load_full() {
            callback(event);
        }
    }
}

impl std::fmt::Debug for ServiceGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("ServiceGroup")
            .field("member_of", &self.member_of)
            .field("mode", &inner.mode)
            .field("members", &inner.members.len())
            .field("active", &inner.active.as_ref().map(|s| s.id().to_string()))
            .finish()
    }
}
