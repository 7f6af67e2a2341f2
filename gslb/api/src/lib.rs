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
//! Admin HTTP API of the GSLB control plane.
//!
//! Thin JSON I/O over the spoof repository and the registry's query
//! interface: inspecting the installed spoof set, pinning emergency
//! overrides, and triggering graceful failovers. Every route sits behind
//! bearer-token authorization.

pub mod error;
pub mod handlers;
pub mod middleware;

use std::{sync::Arc, time::Duration};

use axum::{
    BoxError, Router,
    error_handling::HandleErrorLayer,
    http::StatusCode,
    routing::{get, post},
};
use gslb_core::QueryManager;
use gslb_models::SpoofRepository;
use gslb_tokens::TokenValidator;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::{ServiceBuilder, timeout::TimeoutLayer};

const ADMIN_API_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared state of the admin API.
#[derive(Clone)]
pub struct ApiState {
    /// The installed spoof set.
    pub repo: Arc<SpoofRepository>,
    /// Query interface into the service registry.
    pub manager: Arc<dyn QueryManager>,
    /// Validator for incoming bearer tokens.
    pub validator: Arc<TokenValidator>,
}

/// Builds the admin API router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/spoofs", get(handlers::spoofs::list))
        .route("/spoofs/hash", get(handlers::spoofs::hash))
        .route("/spoofs/{fqdn}", get(handlers::spoofs::get_one))
        .route(
            "/spoofs/override",
            post(handlers::overrides::create).delete(handlers::overrides::clear),
        )
        .route(
            "/spoofs/override/{member_of}",
            get(handlers::overrides::get_one).put(handlers::overrides::update),
        )
        .route("/failover/{fqdn}", post(handlers::failover::failover))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(|err: BoxError| {
                    async move {
                        tracing::error!(error = %err, "admin api error");
                        (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            format!("Unhandled error: {err}"),
                        )
                    }
                }))
                .layer(TimeoutLayer::new(ADMIN_API_TIMEOUT)),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_token,
        ))
        .layer(axum::middleware::from_fn(middleware::log_requests))
        .with_state(state)
}

/// Serves the admin API until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    state: ApiState,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "starting admin api");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

    tracing::info!("admin api stopped");
    Ok(())
}
