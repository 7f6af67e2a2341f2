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
//! Shared harness for end-to-end GSLB control plane tests.
//!
//! Each test gets a full stack: a fake authoritative server answering AXFR
//! from mutable in-memory zone contents, a fake DNS rewriter recording
//! every REST call, real TCP backends the probes dial, the real registry,
//! poller, handler, updater, and the admin API on a loopback port.

use std::{
    net::SocketAddr,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{delete, post},
};
use gslb_api::ApiState;
use gslb_core::{ManagerOptions, ServiceManager};
use gslb_models::{Spoof, SpoofRepository};
use gslb_store::MemoryStore;
use gslb_tokens::{RoleRegistry, ServiceTokenManager, TokenIssuer, TokenValidator};
use hickory_proto::{
    op::{Message, MessageType, OpCode},
    rr::{Name, RData, Record, rdata},
};
use parking_lot::Mutex;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Shared signing secret of the test deployment.
pub const JWT_SECRET: &[u8] = b"integration-test-secret";

/// One call observed at the fake rewriter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriterCall {
    /// `POST /spoofs`.
    Upsert(Spoof),
    /// `DELETE /spoofs/{member_of}:{datacenter}`.
    Delete(String),
}

/// One TXT entry of the fake configuration zone.
#[derive(Debug, Clone)]
pub struct ZoneEntry {
    /// Record owner name.
    pub owner: String,
    /// JSON payload.
    pub rdata: String,
}

/// Builds the TXT payload for one service member.
pub fn member_record(
    id: &str,
    member_of: &str,
    datacenter: &str,
    backend: SocketAddr,
    priority: u32,
    failure_threshold: u32,
) -> ZoneEntry {
    ZoneEntry {
        owner: format!("{member_of}."),
        rdata: format!(
            concat!(
                r#"{{"service_id":"{id}","fqdn":"{dc}.{member_of}","ip":"{ip}","port":"{port}","#,
                r#""datacenter":"{dc}","interval":"1s","priority":{priority},"#,
                r#""failure_threshold":{threshold},"check_type":"TCP-FULL"}}"#
            ),
            id = id,
            member_of = member_of,
            dc = datacenter,
            ip = backend.ip(),
            port = backend.port(),
            priority = priority,
            threshold = failure_threshold,
        ),
    }
}

/// A TCP backend the health probes dial.
///
/// Dropping the guard (or calling [Backend::kill]) closes the port, which
/// makes subsequent probes fail.
pub struct Backend {
    /// Address the backend listens on.
    pub addr: SocketAddr,
    accept_task: Option<JoinHandle<()>>,
}

impl Backend {
    /// Spawns a backend accepting (and immediately dropping) connections.
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept_task = tokio::spawn(async move {
            loop {
                let _ = listener.accept().await;
            }
        });
        Backend {
            addr,
            accept_task: Some(accept_task),
        }
    }

    /// Closes the port.
    pub fn kill(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
    }

    /// Re-binds the same address after a [Self::kill].
    pub async fn resurrect(&mut self) {
        self.kill();
        let listener = TcpListener::bind(self.addr).await.unwrap();
        self.accept_task = Some(tokio::spawn(async move {
            loop {
                let _ = listener.accept().await;
            }
        }));
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        self.kill();
    }
}

/// A full control plane instance wired against fakes.
pub struct TestStack {
    /// The live registry.
    pub manager: ServiceManager,
    /// The spoof repository backing the admin API and the updater.
    pub repo: Arc<SpoofRepository>,
    /// Mutable zone contents served by the fake authoritative server.
    pub zone: Arc<Mutex<Vec<ZoneEntry>>>,
    /// Calls observed at the fake rewriter, in order.
    pub rewriter_calls: mpsc::UnboundedReceiver<RewriterCall>,
    /// Base URL of the admin API.
    pub admin_base: String,
    /// HTTP client for admin calls.
    pub client: reqwest::Client,
    /// Cancels the whole stack.
    pub cancel: CancellationToken,
}

impl Drop for TestStack {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl TestStack {
    /// Starts the whole stack. The zone starts out with `entries`.
    pub async fn start(entries: Vec<ZoneEntry>) -> Self {
        let zone = Arc::new(Mutex::new(entries));
        let cancel = CancellationToken::new();

        let nameserver = spawn_fake_authoritative(zone.clone(), cancel.clone()).await;
        let (rewriter_url, rewriter_calls) = spawn_fake_rewriter().await;

        let repo = Arc::new(SpoofRepository::new(Arc::new(MemoryStore::new())));
        let registry = RoleRegistry::standard();
        let tokens = Arc::new(
            ServiceTokenManager::new(JWT_SECRET, "GSLB-OPERATOR", registry.clone()).unwrap(),
        );

        let manager = ServiceManager::new(ManagerOptions {
            min_workers: 4,
            buffer_size: 8,
            prioritized_datacenter: Some("dc1".to_string()),
            ..Default::default()
        })
        .unwrap();

        let updater =
            Arc::new(gslb_dns::DnsUpdater::new(rewriter_url, tokens, repo.clone()).unwrap());

        let handler = gslb_dns::ZoneHandler::new(manager.clone(), updater);
        handler.start();

        let poller = gslb_dns::ZonePoller::new(
            "gslb.test.",
            nameserver.to_string(),
            Duration::from_secs(1),
        );
        let (records, errors) = poller.start(cancel.child_token());
        tokio::spawn(handler.run(records, errors, cancel.clone()));

        // Admin API.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let admin_base = format!("http://{}", listener.local_addr().unwrap());
        let api_state = ApiState {
            repo: repo.clone(),
            manager: Arc::new(manager.clone()),
            validator: Arc::new(TokenValidator::new(JWT_SECRET, registry)),
        };
        tokio::spawn(gslb_api::serve(listener, api_state, cancel.clone()));

        TestStack {
            manager,
            repo,
            zone,
            rewriter_calls,
            admin_base,
            client: reqwest::Client::new(),
            cancel,
        }
    }

    /// Replaces the zone contents; the next poll publishes them.
    pub fn set_zone(&self, entries: Vec<ZoneEntry>) {
        *self.zone.lock() = entries;
    }

    /// Signed admin token.
    pub fn admin_token(&self) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let claims = RoleRegistry::standard()
            .claims_for("ADMIN", now, 3600)
            .unwrap();
        TokenIssuer::new(JWT_SECRET).issue(&claims).unwrap()
    }

    /// Waits for the next rewriter call, failing the test after `timeout`.
    pub async fn next_call(&mut self, timeout: Duration) -> RewriterCall {
        tokio::time::timeout(timeout, self.rewriter_calls.recv())
            .await
            .expect("timed out waiting for rewriter call")
            .expect("rewriter channel closed")
    }

    /// Asserts that the rewriter stays quiet for `window`.
    pub async fn expect_quiet(&mut self, window: Duration) {
        if let Ok(Some(call)) = tokio::time::timeout(window, self.rewriter_calls.recv()).await {
            panic!("unexpected rewriter call: {call:?}");
        }
    }
}

/// Fake rewriter recording every REST call and answering 200.
async fn spawn_fake_rewriter() -> (Url, mpsc::UnboundedReceiver<RewriterCall>) {
    let (tx, rx) = mpsc::unbounded_channel();

    let app = Router::new()
        .route(
            "/spoofs",
            post(
                |State(tx): State<mpsc::UnboundedSender<RewriterCall>>,
                 axum::Json(spoof): axum::Json<Spoof>| {
                    async move {
                        let _ = tx.send(RewriterCall::Upsert(spoof));
                        StatusCode::OK
                    }
                },
            ),
        )
        .route(
            "/spoofs/{key}",
            delete(
                |State(tx): State<mpsc::UnboundedSender<RewriterCall>>,
                 axum::extract::Path(key): axum::extract::Path<String>| {
                    async move {
                        let _ = tx.send(RewriterCall::Delete(key));
                        StatusCode::OK
                    }
                },
            ),
        )
        .with_state(tx);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (url, rx)
}

/// Fake authoritative nameserver answering AXFR over TCP from the shared
/// zone state.
async fn spawn_fake_authoritative(
    zone: Arc<Mutex<Vec<ZoneEntry>>>,
    cancel: CancellationToken,
) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            let Ok((mut stream, _)) = accepted else { break };

            let entries = zone.lock().clone();
            tokio::spawn(async move {
                let mut len_buf = [0u8; 2];
                if stream.read_exact(&mut len_buf).await.is_err() {
                    return;
                }
                let mut buf = vec![0u8; u16::from_be_bytes(len_buf) as usize];
                if stream.read_exact(&mut buf).await.is_err() {
                    return;
                }
                let Ok(query) = Message::from_vec(&buf) else {
                    return;
                };

                let zone_name = query.queries()[0].name().clone();
                let soa = Record::from_rdata(
                    zone_name,
                    300,
                    RData::SOA(rdata::SOA::new(
                        Name::from_utf8("ns1.test.").unwrap(),
                        Name::from_utf8("admin.test.").unwrap(),
                        1,
                        3600,
                        600,
                        604800,
                        60,
                    )),
                );

                let mut response = Message::new();
                response
                    .set_id(query.id())
                    .set_message_type(MessageType::Response)
                    .set_op_code(OpCode::Query);
                response.add_answer(soa.clone());
                for entry in entries {
                    response.add_answer(Record::from_rdata(
                        Name::from_utf8(&entry.owner).unwrap(),
                        300,
                        RData::TXT(rdata::TXT::new(vec![entry.rdata])),
                    ));
                }
                response.add_answer(soa);

                let Ok(encoded) = response.to_vec() else { return };
                let _ = stream
                    .write_all(&(encoded.len() as u16).to_be_bytes())
                    .await;
                let _ = stream.write_all(&encoded).await;
            });
        }
    });

    addr
}
