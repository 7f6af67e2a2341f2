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
//! GSLB control plane daemon entry point.

mod config;
mod telemetry;

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use gslb_api::ApiState;
use gslb_core::{ManagerOptions, ServiceManager, checks::LuaPool};
use gslb_dns::{DnsUpdater, ZoneHandler, ZonePoller};
use gslb_models::SpoofRepository;
use gslb_store::FileStore;
use gslb_tokens::{RoleRegistry, ServiceTokenManager, TokenValidator};
use tokio::{net::TcpListener, signal::unix::SignalKind};
use tokio_util::sync::CancellationToken;

use crate::config::Config;

/// How long shutdown waits for in-flight work before giving up.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    telemetry::init(config.is_dev());

    tracing::info!(
        datacenter = %config.datacenter,
        zone = %config.zone,
        nameserver = %config.nameserver,
        updater = %config.updater_host,
        api_port = config.api_port,
        "starting gslbd"
    );

    // Persistence and auth plumbing. Failures here are fatal: the daemon
    // must not enter steady state half-configured.
    let store: FileStore<gslb_models::SpoofRecord> = FileStore::open(&config.store)
        .with_context(|| format!("opening spoof store {}", config.store.display()))?;
    let repo = Arc::new(SpoofRepository::new(Arc::new(store)));

    let registry = RoleRegistry::standard();
    let tokens = Arc::new(
        ServiceTokenManager::new(config.jwt_secret.as_bytes(), &config.jwt_user, registry.clone())
            .context("creating service token manager")?,
    );
    let validator = Arc::new(TokenValidator::new(
        config.jwt_secret.as_bytes(),
        registry,
    ));

    let lua = match &config.lua_sandbox {
        Some(path) => Some(Arc::new(
            LuaPool::from_file(path).context("loading lua sandbox configuration")?,
        )),
        None => {
            tracing::warn!("no lua sandbox configured, http checks run without scripts");
            None
        }
    };

    // Core registry and the DNS plumbing around it.
    let manager = ServiceManager::new(ManagerOptions {
        dry_run: config.dry_run,
        prioritized_datacenter: Some(config.datacenter.clone()),
        lua,
        ..Default::default()
    })
    .map_err(anyhow::Error::msg)
    .context("creating service manager")?;

    let updater = Arc::new(
        DnsUpdater::new(config.updater_host.clone(), tokens, repo.clone())
            .context("creating dns updater")?,
    );

    let cancel = CancellationToken::new();

    let handler = ZoneHandler::new(manager.clone(), updater);
    handler.start();

    let poller = ZonePoller::new(
        config.zone.clone(),
        config.nameserver.clone(),
        config.poll_interval.duration(),
    );
    let (records, errors) = poller.start(cancel.child_token());

    let handler_task = tokio::spawn(handler.run(records, errors, cancel.clone()));

    // Admin API.
    let listener = TcpListener::bind(("0.0.0.0", config.api_port))
        .await
        .with_context(|| format!("binding admin api port {}", config.api_port))?;
    let api_state = ApiState {
        repo,
        manager: Arc::new(manager),
        validator,
    };
    let api_task = tokio::spawn(gslb_api::serve(listener, api_state, cancel.clone()));

    wait_for_shutdown_signal().await;
    tracing::info!("shutting down");
    cancel.cancel();

    if tokio::time::timeout(SHUTDOWN_GRACE, async {
        let _ = handler_task.await;
        let _ = api_task.await;
    })
    .await
    .is_err()
    {
        tracing::warn!(grace = ?SHUTDOWN_GRACE, "shutdown grace expired, exiting anyway");
    }

    tracing::info!("gslbd stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())
        .expect("installing SIGTERM handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}
