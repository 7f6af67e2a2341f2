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
//! Periodic AXFR of the GSLB configuration zone.
//!
//! The poller performs a full zone transfer over TCP on every tick and
//! publishes the complete TXT record set of the zone as one snapshot.
//! Consumers always see full state, never deltas, so a missed snapshot is
//! harmless.

use std::time::Duration;

use hickory_proto::{
    op::{Message, MessageType, OpCode, Query, ResponseCode},
    rr::{Name, RData, RecordType},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;

/// Default zone poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Per-envelope read timeout; a stalled stream aborts the attempt.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for connecting to the authoritative server.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a snapshot waits for a slow consumer before being dropped.
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// One TXT record from the configuration zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneRecord {
    /// Record owner name.
    pub owner: String,
    /// Concatenated TXT rdata.
    pub rdata: String,
}

/// Errors produced by zone transfers.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// Encoding the query or decoding a response message failed.
    #[error("dns protocol error: {0}")]
    Proto(#[from] hickory_proto::ProtoError),

    /// Connecting or reading failed.
    #[error("zone transfer i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// The server or the network stalled mid-transfer.
    #[error("zone transfer timed out after {0:?}")]
    Timeout(Duration),

    /// The server refused the transfer.
    #[error("zone transfer refused with response code {0:?}")]
    Refused(ResponseCode),
}

/// Periodically transfers a configuration zone from one authoritative
/// server.
#[derive(Debug, Clone)]
pub struct ZonePoller {
    zone: String,
    server: String,
    poll_interval: Duration,
}

impl ZonePoller {
    /// Creates a poller for `zone` against `server` (`host:port`).
    pub fn new(zone: impl Into<String>, server: impl Into<String>, poll_interval: Duration) -> Self {
        ZonePoller {
            zone: zone.into(),
            server: server.into(),
            poll_interval,
        }
    }

    /// Starts polling. The first transfer runs immediately, then once per
    /// poll interval. Returns the snapshot and error channels.
    ///
    /// Publication is bounded by a timeout so a wedged consumer stalls
    /// snapshots (which are full state and therefore safe to drop) instead
    /// of wedging the poller.
    pub fn start(
        self,
        cancel: CancellationToken,
    ) -> (mpsc::Receiver<Vec<ZoneRecord>>, mpsc::Receiver<PollError>) {
        let (records_tx, records_rx) = mpsc::channel(1);
        let (errors_tx, errors_rx) = mpsc::channel(8);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            tracing::info!(zone = %self.zone, server = %self.server, "zone poller started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let transfer = tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = self.transfer() => result,
                };

                match transfer {
                    Ok(records) => {
                        tracing::debug!(records = records.len(), "zone transfer complete");
                        if records_tx
                            .send_timeout(records, PUBLISH_TIMEOUT)
                            .await
                            .is_err()
                        {
                            tracing::warn!("snapshot consumer not ready, dropping snapshot");
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "zone transfer failed");
                        let _ = errors_tx.send_timeout(err, PUBLISH_TIMEOUT).await;
                    }
                }
            }
            tracing::info!("zone poller stopped");
        });

        (records_rx, errors_rx)
    }

    /// Performs one full AXFR, returning every TXT record of the zone.
    pub async fn transfer(&self) -> Result<Vec<ZoneRecord>, PollError> {
        let mut stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&self.server))
            .await
            .map_err(|_| PollError::Timeout(CONNECT_TIMEOUT))??;

        let query = build_axfr_query(&self.zone)?;
        let encoded = query.to_vec()?;
        stream.write_all(&(encoded.len() as u16).to_be_bytes()).await?;
        stream.write_all(&encoded).await?;

        let mut records = Vec::new();
        let mut soa_seen = 0usize;

        // The transfer is a stream of DNS messages; the zone's SOA record
        // opens and closes it.
        while soa_seen < 2 {
            let message = read_message(&mut stream).await?;
            if message.response_code() != ResponseCode::NoError {
                return Err(PollError::Refused(message.response_code()));
            }

            for record in message.answers() {
                if record.record_type() == RecordType::SOA {
                    soa_seen += 1;
                    continue;
                }

                if let RData::TXT(txt) = record.data() {
                    let rdata: String = txt
                        .txt_data()
                        .iter()
                        .map(|part| String::from_utf8_lossy(part).into_owned())
                        .collect();
                    records.push(ZoneRecord {
                        owner: record.name().to_utf8(),
                        rdata,
                    });
                }
            }
        }

        Ok(records)
    }
}

fn build_axfr_query(zone: &str) -> Result<Message, PollError> {
    let name = Name::from_utf8(zone)?;
    let mut message = Message::new();
    message
        .set_id(rand::random())
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(false)
        .add_query(Query::query(name, RecordType::AXFR));
    Ok(message)
}

async fn read_message(stream: &mut TcpStream) -> Result<Message, PollError> {
    let mut len_buf = [0u8; 2];
    tokio::time::timeout(READ_TIMEOUT, stream.read_exact(&mut len_buf))
        .await
        .map_err(|_| PollError::Timeout(READ_TIMEOUT))??;

    let len = u16::from_be_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    tokio::time::timeout(READ_TIMEOUT, stream.read_exact(&mut buf))
        .await
        .map_err(|_| PollError::Timeout(READ_TIMEOUT))??;

    Ok(Message::from_vec(&buf)?)
}

#[cfg(test)]
mod tests {
    use hickory_proto::rr::{
        Record,
        rdata::{SOA, TXT},
    };
    use tokio::net::TcpListener;

    use super::*;

    /// Serves one AXFR response: SOA, the given TXT payloads, SOA.
    async fn fake_axfr_server(txts: Vec<(&'static str, &'static str)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();

            let mut len_buf = [0u8; 2];
            stream.read_exact(&mut len_buf).await.unwrap();
            let mut buf = vec![0u8; u16::from_be_bytes(len_buf) as usize];
            stream.read_exact(&mut buf).await.unwrap();
            let query = Message::from_vec(&buf).unwrap();

            let zone = query.queries()[0].name().clone();
            let soa = Record::from_rdata(
                zone.clone(),
                300,
                RData::SOA(SOA::new(
                    Name::from_utf8("ns1.example.com.").unwrap(),
                    Name::from_utf8("admin.example.com.").unwrap(),
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
            for (owner, rdata) in txts {
                response.add_answer(Record::from_rdata(
                    Name::from_utf8(owner).unwrap(),
                    300,
                    RData::TXT(TXT::new(vec![rdata.to_string()])),
                ));
            }
            response.add_answer(soa);

            let encoded = response.to_vec().unwrap();
            stream
                .write_all(&(encoded.len() as u16).to_be_bytes())
                .await
                .unwrap();
            stream.write_all(&encoded).await.unwrap();
        });

        addr
    }

    #[test_log::test(tokio::test)]
    async fn transfer_collects_txt_records() {
        let server = fake_axfr_server(vec![
            ("x.example.com.", r#"{"service_id":"a"}"#),
            ("y.example.com.", r#"{"service_id":"b"}"#),
        ])
        .await;

        let poller = ZonePoller::new("example.com.", server, DEFAULT_POLL_INTERVAL);
        let records = poller.transfer().await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].owner, "x.example.com.");
        assert_eq!(records[0].rdata, r#"{"service_id":"a"}"#);
    }

    #[test_log::test(tokio::test)]
    async fn start_emits_initial_snapshot() {
        let server = fake_axfr_server(vec![("x.example.com.", r#"{"service_id":"a"}"#)]).await;

        let cancel = CancellationToken::new();
        let poller = ZonePoller::new("example.com.", server, Duration::from_secs(3600));
        let (mut records_rx, _errors_rx) = poller.start(cancel.clone());

        let snapshot = tokio::time::timeout(Duration::from_secs(5), records_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.len(), 1);

        cancel.cancel();
    }

    #[test_log::test(tokio::test)]
    async fn unreachable_server_reports_error() {
        // Bind and drop to get a closed port.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = listener.local_addr().unwrap().to_string();
        drop(listener);

        let poller = ZonePoller::new("example.com.", server, DEFAULT_POLL_INTERVAL);
        assert!(poller.transfer().await.is_err());
    }
}
