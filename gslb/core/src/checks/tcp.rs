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
//! TCP probes.

use std::{net::SocketAddr, time::Duration};

use tokio::net::TcpStream;

use crate::checks::CheckError;

/// Full TCP handshake: connect within `timeout`, then close gracefully.
pub(crate) async fn check_full(addr: SocketAddr, timeout: Duration) -> Result<(), CheckError> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| CheckError::Timeout(timeout))??;
    drop(stream);
    Ok(())
}

/// Half-open TCP handshake: connect within `timeout`, then tear the
/// connection down with RST so no graceful close is exchanged and the peer
/// never sees application traffic.
pub(crate) async fn check_half(addr: SocketAddr, timeout: Duration) -> Result<(), CheckError> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| CheckError::Timeout(timeout))??;

    // SO_LINGER with a zero timeout turns the close into an RST.
    let sock = socket2::SockRef::from(&stream);
    sock.set_linger(Some(Duration::ZERO))?;
    drop(stream);

    Ok(())
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn full_check_succeeds_against_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        check_full(addr, Duration::from_millis(500)).await.unwrap();
    }

    #[tokio::test]
    async fn half_check_succeeds_against_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        check_half(addr, Duration::from_millis(500)).await.unwrap();
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        // Bind and drop to find a port that is very likely closed.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = check_full(addr, Duration::from_millis(500)).await;
        assert!(err.is_err());
    }
}
