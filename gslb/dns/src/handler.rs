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
//! Wires zone snapshots into the registry and health transitions into the
//! rewriter.

use std::{collections::HashMap, sync::Arc};

use gslb_core::ServiceManager;
use gslb_models::ServiceConfig;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    poller::{PollError, ZoneRecord},
    updater::DnsUpdater,
};

/// Consumes zone snapshots and reconciles them into the service registry.
pub struct ZoneHandler {
    manager: ServiceManager,
    updater: Arc<DnsUpdater>,
    /// Number of consecutive snapshots a known service may be absent from
    /// before it is removed. 0 removes on the first absence.
    removal_grace_snapshots: u32,
    absent: HashMap<String, u32>,
}

impl ZoneHandler {
    /// Creates a handler with single-snapshot removal.
    pub fn new(manager: ServiceManager, updater: Arc<DnsUpdater>) -> Self {
        Self::with_removal_grace(manager, updater, 0)
    }

    /// Creates a handler that tolerates `grace` absent snapshots before
    /// removing a service.
    pub fn with_removal_grace(
        manager: ServiceManager,
        updater: Arc<DnsUpdater>,
        grace: u32,
    ) -> Self {
        ZoneHandler {
            manager,
            updater,
            removal_grace_snapshots: grace,
            absent: HashMap::new(),
        }
    }

    /// Installs the DNS-update wiring and starts the worker pool. Must be
    /// called before [Self::run].
    ///
    /// Updates flow through one pipeline task so the rewriter observes
    /// them in promotion order; a failover's delete always lands before
    /// the successor's upsert.
    pub fn start(&self) {
        let updater = self.updater.clone();
        let (updates_tx, mut updates_rx) =
            mpsc::unbounded_channel::<(Arc<gslb_core::Service>, bool)>();

        tokio::spawn(async move {
            while let Some((service, up)) = updates_rx.recv().await {
                let result = if up {
                    updater.service_up(&service).await
                } else {
                    updater.service_down(&service).await
                };
                if let Err(err) = result {
                    tracing::error!(
                        id = %service.id(),
                        up,
                        error = %err,
                        "dns update failed"
                    );
                }
            }
        });

        self.manager.set_dns_update(Arc::new(move |service, up| {
            if updates_tx.send((service, up)).is_err() {
                tracing::error!("dns update pipeline closed");
            }
        }));

        self.manager.start();
    }

    /// Drives the handler until the snapshot channel closes or `cancel`
    /// fires, then stops the registry.
    pub async fn run(
        mut self,
        mut records: mpsc::Receiver<Vec<ZoneRecord>>,
        mut errors: mpsc::Receiver<PollError>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                snapshot = records.recv() => {
                    match snapshot {
                        Some(snapshot) => self.apply_snapshot(snapshot),
                        None => break,
                    }
                }
                err = errors.recv() => {
                    if let Some(err) = err {
                        tracing::error!(error = %err, "zone transfer did not succeed");
                    }
                }
            }
        }

        self.manager.stop().await;
        tracing::info!("zone handler stopped");
    }

    /// Applies one full zone snapshot.
    ///
    /// Every decodable record is registered (registration is idempotent and
    /// doubles as update); bad records are skipped without affecting the
    /// rest. Known services missing from the snapshot are removed once
    /// their absence outlasts the grace window.
    pub fn apply_snapshot(&mut self, snapshot: Vec<ZoneRecord>) {
        let mut present = Vec::with_capacity(snapshot.len());

        for record in snapshot {
            let config = match ServiceConfig::from_txt(&record.owner, &record.rdata) {
                Ok(config) => config,
                Err(err) => {
                    tracing::error!(owner = %record.owner, error = %err, "skipping gslb entry");
                    continue;
                }
            };

            match self.manager.register_service(&config) {
                Ok(service) => present.push(service.id().to_string()),
                Err(err) => {
                    tracing::error!(
                        service_id = %config.service_id,
                        error = %err,
                        "could not register service"
                    );
                }
            }
        }

        for id in self.manager.service_ids() {
            if present.iter().any(|p| p == &id) {
                self.absent.remove(&id);
                continue;
            }

            let misses = self.absent.entry(id.clone()).or_insert(0);
            *misses += 1;
            if *misses > self.removal_grace_snapshots {
                tracing::info!(id, "service no longer in zone, removing");
                if let Err(err) = self.manager.remove_service(&id) {
                    tracing::error!(id, error = %err, "failed to remove service");
                }
                self.absent.remove(&id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use gslb_core::ManagerOptions;
    use gslb_models::SpoofRepository;
    use gslb_store::MemoryStore;
    use gslb_tokens::{RoleRegistry, ServiceTokenManager};

    use super::*;

    fn handler_with_grace(grace: u32) -> ZoneHandler {
        let manager = ServiceManager::new(ManagerOptions {
            min_workers: 1,
            buffer_size: 1,
            ..Default::default()
        })
        .unwrap();

        let tokens = Arc::new(
            ServiceTokenManager::new(b"secret", "GSLB-OPERATOR", RoleRegistry::standard()).unwrap(),
        );
        let repo = Arc::new(SpoofRepository::new(Arc::new(MemoryStore::new())));
        let updater = Arc::new(
            DnsUpdater::new("http://127.0.0.1:1".parse().unwrap(), tokens, repo).unwrap(),
        );

        ZoneHandler::with_removal_grace(manager, updater, grace)
    }

    fn record(id: &str) -> ZoneRecord {
        ZoneRecord {
            owner: "x.example.".to_string(),
            rdata: format!(
                r#"{{"service_id":"{id}","fqdn":"dc1.x.example","ip":"10.0.0.1","port":"80","datacenter":"dc1","check_type":"TCP-FULL"}}"#
            ),
        }
    }

    #[tokio::test]
    async fn snapshot_registers_and_removes_services() {
        let mut handler = handler_with_grace(0);

        handler.apply_snapshot(vec![record("a"), record("b")]);
        let mut ids = handler.manager.service_ids();
        ids.sort();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);

        handler.apply_snapshot(vec![record("b")]);
        assert_eq!(handler.manager.service_ids(), vec!["b".to_string()]);

        handler.manager.stop().await;
    }

    #[tokio::test]
    async fn bad_records_do_not_poison_the_snapshot() {
        let mut handler = handler_with_grace(0);

        handler.apply_snapshot(vec![
            ZoneRecord {
                owner: "x.example.".to_string(),
                rdata: "not json".to_string(),
            },
            record("a"),
        ]);

        assert_eq!(handler.manager.service_ids(), vec!["a".to_string()]);
        handler.manager.stop().await;
    }

    #[tokio::test]
    async fn removal_grace_keeps_services_across_one_missing_snapshot() {
        let mut handler = handler_with_grace(1);

        handler.apply_snapshot(vec![record("a")]);
        handler.apply_snapshot(vec![]);
        // Still present: one absence is within the grace window.
        assert_eq!(handler.manager.service_ids(), vec!["a".to_string()]);

        handler.apply_snapshot(vec![]);
        assert!(handler.manager.service_ids().is_empty());

        handler.manager.stop().await;
    }

    #[tokio::test]
    async fn reappearing_service_resets_the_grace_counter() {
        let mut handler = handler_with_grace(1);

        handler.apply_snapshot(vec![record("a")]);
        handler.apply_snapshot(vec![]);
        handler.apply_snapshot(vec![record("a")]);
        handler.apply_snapshot(vec![]);
        // The counter restarted; a single absence does not remove.
        assert_eq!(handler.manager.service_ids(), vec!["a".to_string()]);

        handler.manager.stop().await;
    }
}
