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
//! Pushes spoof changes to the downstream DNS rewriter.
//!
//! Every promotion ends here: the local spoof cache is updated first (it
//! backs the admin API), then the rewriter is called over REST with the
//! control plane's own service token. Overrides pin a group: while one is
//! set, automated updates for that group are dropped.

use std::{sync::Arc, time::Duration};

use gslb_core::Service;
use gslb_models::{RepoError, Spoof, SpoofRepository};
use gslb_tokens::{ServiceTokenManager, manager::TokenError};
use gslb_utils::backoff::{BackoffConfig, ExponentialBackoff};
use reqwest::{Method, StatusCode, header::AUTHORIZATION};
use url::Url;

/// Per-request timeout against the rewriter.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Transient failures are retried this many times.
const MAX_RETRIES: u32 = 3;

/// Errors produced by rewriter updates.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    /// The local spoof cache failed.
    #[error(transparent)]
    Repo(#[from] RepoError),

    /// No service token could be obtained.
    #[error("could not obtain service token: {0}")]
    Token(#[from] TokenError),

    /// The request path did not resolve against the rewriter base URL.
    #[error("invalid rewriter url: {0}")]
    Url(#[from] url::ParseError),

    /// The request failed on the wire after all retries.
    #[error("rewriter request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The rewriter kept answering with a non-success status.
    #[error("rewriter responded with status code {0}")]
    Status(u16),
}

/// REST client driving the downstream DNS rewriter.
pub struct DnsUpdater {
    base_url: Url,
    client: reqwest::Client,
    tokens: Arc<ServiceTokenManager>,
    repo: Arc<SpoofRepository>,
    backoff: ExponentialBackoff,
}

impl DnsUpdater {
    /// Creates an updater against `base_url`.
    pub fn new(
        base_url: Url,
        tokens: Arc<ServiceTokenManager>,
        repo: Arc<SpoofRepository>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(DnsUpdater {
            base_url,
            client,
            tokens,
            repo,
            backoff: ExponentialBackoff::new_from_config(BackoffConfig {
                minimum_delay_secs: 0.2,
                maximum_delay_secs: 2.0,
                factor: 2.0,
                jitter_secs: 0.1,
            }),
        })
    }

    /// Installs the spoof for a freshly promoted member.
    pub async fn service_up(&self, service: &Arc<Service>) -> Result<(), UpdateError> {
        let member_of = service.member_of();
        if self.repo.has_override(&member_of)? {
            tracing::debug!(member_of, "group has an active override, skipping update");
            return Ok(());
        }

        let spoof = service.spoof();
        self.repo.upsert(&member_of, spoof.clone())?;

        self.request(Method::POST, "/spoofs", Some(&spoof)).await?;
        tracing::info!(member_of, ip = %spoof.ip, dc = %spoof.datacenter, "spoof installed");
        Ok(())
    }

    /// Removes the spoof of a member that went dark.
    pub async fn service_down(&self, service: &Arc<Service>) -> Result<(), UpdateError> {
        let member_of = service.member_of();
        if self.repo.has_override(&member_of)? {
            tracing::debug!(member_of, "group has an active override, skipping delete");
            return Ok(());
        }

        self.repo.delete(&member_of)?;

        let path = format!("/spoofs/{}:{}", member_of, service.datacenter());
        self.request(Method::DELETE, &path, None).await?;
        tracing::info!(member_of, dc = %service.datacenter(), "spoof removed");
        Ok(())
    }

    /// Re-installs a spoof directly, used when an override is cleared and
    /// the automated answer must be restored.
    pub async fn push_spoof(&self, spoof: &Spoof) -> Result<(), UpdateError> {
        self.request(Method::POST, "/spoofs", Some(spoof)).await
    }

    /// Issues one rewriter call with retries and a single re-auth attempt
    /// on 401/403.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Spoof>,
    ) -> Result<(), UpdateError> {
        let url = self.base_url.join(path)?;
        let mut reauthed = false;
        let mut attempt = 0u32;

        loop {
            let token = self.tokens.authorization()?;
            let mut request = self
                .client
                .request(method.clone(), url.clone())
                .header(AUTHORIZATION, token);
            if let Some(body) = body {
                request = request.json(body);
            }

            tracing::debug!(%method, %url, attempt, "rewriter request");
            match request.send().await {
                Ok(response) if response.status().is_success() => return Ok(()),

                Ok(response)
                    if matches!(
                        response.status(),
                        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
                    ) && !reauthed =>
                {
                    tracing::warn!(%url, status = %response.status(), "re-signing service token");
                    self.tokens.refresh()?;
                    reauthed = true;
                    continue;
                }

                Ok(response) => {
                    let status = response.status();
                    tracing::warn!(%method, %url, %status, attempt, "rewriter request rejected");
                    if attempt >= MAX_RETRIES {
                        return Err(UpdateError::Status(status.as_u16()));
                    }
                }

                Err(err) => {
                    tracing::warn!(%method, %url, error = %err, attempt, "rewriter request failed");
                    if attempt >= MAX_RETRIES {
                        return Err(UpdateError::Request(err));
                    }
                }
            }

            attempt += 1;
            tokio::time::sleep(self.backoff.duration(attempt)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::{
        Router,
        extract::State,
        http::{HeaderMap, StatusCode},
        routing::{delete, post},
    };
    use gslb_core::{ManagerOptions, ServiceManager};
    use gslb_models::ServiceConfig;
    use gslb_store::MemoryStore;
    use gslb_tokens::RoleRegistry;
    use tokio::sync::mpsc;

    use super::*;

    const SECRET: &[u8] = b"updater-test-secret";

    #[derive(Clone)]
    struct ServerState {
        requests: mpsc::UnboundedSender<(String, String, Option<Spoof>)>,
        rejections: Arc<AtomicUsize>,
        reject_with: StatusCode,
    }

    /// Rewriter double recording every call; the first `rejections` calls
    /// are answered with `reject_with`.
    async fn fake_rewriter(
        rejections: usize,
        reject_with: StatusCode,
    ) -> (Url, mpsc::UnboundedReceiver<(String, String, Option<Spoof>)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = ServerState {
            requests: tx,
            rejections: Arc::new(AtomicUsize::new(rejections)),
            reject_with,
        };

        async fn answer(state: &ServerState) -> StatusCode {
            let left = state.rejections.load(Ordering::SeqCst);
            if left > 0 {
                state.rejections.store(left - 1, Ordering::SeqCst);
                return state.reject_with;
            }
            StatusCode::OK
        }

        let app = Router::new()
            .route(
                "/spoofs",
                post(
                    |State(state): State<ServerState>,
                     headers: HeaderMap,
                     axum::Json(spoof): axum::Json<Spoof>| {
                        async move {
                            let auth = headers
                                .get(AUTHORIZATION)
                                .and_then(|v| v.to_str().ok())
                                .unwrap_or_default()
                                .to_string();
                            state
                                .requests
                                .send(("POST".to_string(), auth, Some(spoof)))
                                .unwrap();
                            answer(&state).await
                        }
                    },
                ),
            )
            .route(
                "/spoofs/{key}",
                delete(
                    |State(state): State<ServerState>,
                     axum::extract::Path(key): axum::extract::Path<String>| {
                        async move {
                            state.requests.send(("DELETE".to_string(), key, None)).unwrap();
                            answer(&state).await
                        }
                    },
                ),
            )
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (url, rx)
    }

    fn updater(url: Url) -> (DnsUpdater, Arc<SpoofRepository>) {
        let tokens = Arc::new(
            ServiceTokenManager::new(SECRET, "GSLB-OPERATOR", RoleRegistry::standard()).unwrap(),
        );
        let repo = Arc::new(SpoofRepository::new(Arc::new(MemoryStore::new())));
        (DnsUpdater::new(url, tokens, repo.clone()).unwrap(), repo)
    }

    fn test_service() -> Arc<Service> {
        let config: ServiceConfig = serde_json::from_str(
            r#"{"service_id":"a","member_of":"x.example","fqdn":"dc1.x.example",
                "ip":"10.0.0.1","port":"80","datacenter":"dc1","check_type":"TCP-FULL"}"#,
        )
        .unwrap();
        let manager = ServiceManager::new(ManagerOptions {
            min_workers: 1,
            buffer_size: 1,
            ..Default::default()
        })
        .unwrap();
        manager.register_service(&config).unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn service_up_posts_spoof_with_bearer_token() {
        let (url, mut requests) = fake_rewriter(0, StatusCode::OK).await;
        let (updater, repo) = updater(url);
        let service = test_service();

        updater.service_up(&service).await.unwrap();

        let (method, auth, spoof) = requests.recv().await.unwrap();
        assert_eq!(method, "POST");
        assert!(auth.starts_with("Bearer "));
        let spoof = spoof.unwrap();
        assert_eq!(spoof.fqdn, "x.example");
        assert_eq!(spoof.datacenter, "dc1");

        // The local cache mirrors the pushed spoof.
        assert_eq!(repo.get("x.example").unwrap().unwrap(), spoof);
    }

    #[test_log::test(tokio::test)]
    async fn service_down_deletes_by_group_and_datacenter() {
        let (url, mut requests) = fake_rewriter(0, StatusCode::OK).await;
        let (updater, repo) = updater(url);
        let service = test_service();

        updater.service_up(&service).await.unwrap();
        requests.recv().await.unwrap();

        updater.service_down(&service).await.unwrap();
        let (method, key, _) = requests.recv().await.unwrap();
        assert_eq!(method, "DELETE");
        assert_eq!(key, "x.example:dc1");
        assert_eq!(repo.get("x.example").unwrap(), None);
    }

    #[test_log::test(tokio::test)]
    async fn override_suppresses_automated_updates() {
        let (url, mut requests) = fake_rewriter(0, StatusCode::OK).await;
        let (updater, repo) = updater(url);
        let service = test_service();

        updater.service_up(&service).await.unwrap();
        requests.recv().await.unwrap();

        repo.create_override("x.example", "10.9.9.9".parse().unwrap())
            .unwrap();

        // Neither direction reaches the rewriter while pinned.
        updater.service_up(&service).await.unwrap();
        updater.service_down(&service).await.unwrap();
        assert!(requests.try_recv().is_err());
        assert_eq!(
            repo.get("x.example").unwrap().unwrap().ip,
            "10.9.9.9".parse::<std::net::IpAddr>().unwrap()
        );
    }

    #[test_log::test(tokio::test)]
    async fn unauthorized_triggers_resign_and_retry() {
        let (url, mut requests) = fake_rewriter(1, StatusCode::UNAUTHORIZED).await;
        let (updater, _) = updater(url);
        let service = test_service();

        updater.service_up(&service).await.unwrap();

        // First call rejected, second carries a fresh token and succeeds.
        let (_, first_auth, _) = requests.recv().await.unwrap();
        let (_, second_auth, _) = requests.recv().await.unwrap();
        assert!(second_auth.starts_with("Bearer "));
        assert!(!first_auth.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn transient_errors_are_retried() {
        let (url, mut requests) = fake_rewriter(2, StatusCode::BAD_GATEWAY).await;
        let (updater, _) = updater(url);
        let service = test_service();

        updater.service_up(&service).await.unwrap();

        let mut calls = 0;
        while requests.try_recv().is_ok() {
            calls += 1;
        }
        assert_eq!(calls, 3);
    }
}
