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

//! Individual companion connection handler.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::{CompanionEvent, CompanionLinks};
use crate::peers::PeerId;

/// Handler for a single companion connection.
pub struct ConnectionHandler {
    stream: TcpStream,
    peer: PeerId,
    links: CompanionLinks,
    event_tx: mpsc::Sender<CompanionEvent>,
}

impl ConnectionHandler {
    pub fn new(
        stream: TcpStream,
        peer: PeerId,
        links: CompanionLinks,
        event_tx: mpsc::Sender<CompanionEvent>,
    ) -> Self {
        Self {
            stream,
            peer,
            links,
            event_tx,
        }
    }

    /// Run until the companion goes away. Emits `Connected` first and
    /// `Disconnected` last.
    pub async fn run(self) -> Result<()> {
        let (reader, mut writer) = self.stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        self.links.register(self.peer.clone(), out_tx);
        let _ = self
            .event_tx
            .send(CompanionEvent::Connected {
                peer: self.peer.clone(),
            })
            .await;
        info!("Companion {} connected", self.peer);

        let result = loop {
            tokio::select! {
                read = lines.next_line() => match read {
                    Ok(None) => {
                        info!("Companion {} closed the connection", self.peer);
                        break Ok(());
                    }
                    Ok(Some(line)) => {
                        let frame = line.trim_end().as_bytes().to_vec();
                        if frame.is_empty() {
                            continue;
                        }
                        debug!("Frame from {}: {} bytes", self.peer, frame.len());
                        let event = CompanionEvent::Frame {
                            peer: self.peer.clone(),
                            frame,
                        };
                        if self.event_tx.send(event).await.is_err() {
                            break Ok(());
                        }
                    }
                    Err(e) => {
                        error!("Read error from {}: {}", self.peer, e);
                        break Err(e.into());
                    }
                },
                outbound = out_rx.recv() => {
                    // The sender lives in `links` until unregistered below.
                    let Some(line) = outbound else { break Ok(()) };
                    if let Err(e) = writer.write_all(line.as_bytes()).await {
                        error!("Write error to {}: {}", self.peer, e);
                        break Err(e.into());
                    }
                }
            }
        };

        self.links.unregister(&self.peer);
        let _ = self
            .event_tx
            .send(CompanionEvent::Disconnected {
                peer: self.peer.clone(),
            })
            .await;
        result
    }
}
