// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Companion TCP server.

use anyhow::Result;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};

use super::connection::ConnectionHandler;
use super::{CompanionEvent, CompanionLinks};
use crate::peers::PeerId;

/// Server that accepts companion connections.
pub struct CompanionServer {
    listener: TcpListener,
    links: CompanionLinks,
}

impl CompanionServer {
    /// Bind the companion port.
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Companion server listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            links: CompanionLinks::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Outbound side, shared with the coordinator.
    pub fn links(&self) -> CompanionLinks {
        self.links.clone()
    }

    /// Start accepting. Returns a channel receiver for companion events.
    pub fn listen(self) -> mpsc::Receiver<CompanionEvent> {
        let (event_tx, event_rx) = mpsc::channel(64);
        tokio::spawn(Self::accept_loop(self.listener, self.links, event_tx));
        event_rx
    }

    async fn accept_loop(
        listener: TcpListener,
        links: CompanionLinks,
        event_tx: mpsc::Sender<CompanionEvent>,
    ) {
        info!("Waiting for companions...");

        loop {
            match listener.accept().await {
                Ok((stream, remote_addr)) => {
                    let peer = PeerId::new(format!("companion-{}", remote_addr));
                    info!("Connection from: {}", remote_addr);

                    let handler =
                        ConnectionHandler::new(stream, peer, links.clone(), event_tx.clone());
                    tokio::spawn(async move {
                        if let Err(e) = handler.run().await {
                            error!("Companion handler error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                    // Continue listening despite errors
                    tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
                }
            }

            if event_tx.is_closed() {
                info!("Companion events no longer consumed, stopping server");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::companion::PeerSink;
    use crate::protocol::{ActionKind, Message};
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;
    use tokio::time::timeout;

    async fn next_event(rx: &mut mpsc::Receiver<CompanionEvent>) -> CompanionEvent {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for companion event")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn test_companion_session() {
        let server = CompanionServer::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let links = server.links();
        let mut events = server.listen();

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();

        let peer = match next_event(&mut events).await {
            CompanionEvent::Connected { peer } => peer,
            other => panic!("unexpected event: {:?}", other),
        };

        write_half
            .write_all(Message::action_request().to_json().unwrap().as_bytes())
            .await
            .unwrap();
        match next_event(&mut events).await {
            CompanionEvent::Frame { peer: from, frame } => {
                assert_eq!(from, peer);
                assert!(Message::from_slice(&frame).unwrap().verify());
            }
            other => panic!("unexpected event: {:?}", other),
        }

        links.send_action(&peer, ActionKind::Land).unwrap();
        let mut lines = BufReader::new(read_half).lines();
        let line = timeout(Duration::from_secs(5), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(Message::from_json(&line).unwrap().payload, "LAND");

        drop(write_half);
        assert_eq!(
            next_event(&mut events).await,
            CompanionEvent::Disconnected { peer: peer.clone() }
        );
        assert!(links.send_action(&peer, ActionKind::Land).is_err());
    }
}
