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

//! Companion transport.
//!
//! Companions connect over TCP and exchange newline-delimited protocol
//! messages. Inbound frames are handed out as [`CompanionEvent`]s, outbound
//! action announcements go through [`PeerSink`].

mod connection;
mod server;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::peers::PeerId;
use crate::protocol::{ActionKind, Message};

pub use connection::ConnectionHandler;
pub use server::CompanionServer;

/// Events emitted by the companion transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompanionEvent {
    Connected { peer: PeerId },
    /// One delimited inbound unit.
    Frame { peer: PeerId, frame: Vec<u8> },
    Disconnected { peer: PeerId },
}

/// Outbound path to companions.
pub trait PeerSink: Send + Sync {
    /// Announce the vehicle's current action to one peer. Must not block.
    fn send_action(&self, peer: &PeerId, action: ActionKind) -> Result<()>;
}

/// Writers of the currently open companion connections.
#[derive(Clone, Default)]
pub struct CompanionLinks {
    writers: Arc<Mutex<HashMap<PeerId, mpsc::UnboundedSender<String>>>>,
}

impl CompanionLinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, peer: PeerId, writer: mpsc::UnboundedSender<String>) {
        self.writers.lock().insert(peer, writer);
    }

    pub(crate) fn unregister(&self, peer: &PeerId) {
        self.writers.lock().remove(peer);
    }

    /// Peers with an open connection.
    pub fn connected(&self) -> Vec<PeerId> {
        self.writers.lock().keys().cloned().collect()
    }
}

impl PeerSink for CompanionLinks {
    fn send_action(&self, peer: &PeerId, action: ActionKind) -> Result<()> {
        let line = Message::action(action).to_json()?;
        let writers = self.writers.lock();
        let writer = writers
            .get(peer)
            .ok_or_else(|| anyhow!("No open connection to {}", peer))?;
        writer
            .send(line)
            .map_err(|_| anyhow!("Connection to {} is closing", peer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_action_to_registered_peer() {
        let links = CompanionLinks::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let peer = PeerId::new("watch");
        links.register(peer.clone(), tx);

        links.send_action(&peer, ActionKind::TakeOff).unwrap();
        let line = rx.try_recv().unwrap();
        let message = Message::from_json(&line).unwrap();
        assert_eq!(message.payload, "TAKE_OFF");
        assert!(message.verify());
        assert_eq!(links.connected(), vec![peer.clone()]);

        links.unregister(&peer);
        assert!(links.send_action(&peer, ActionKind::Land).is_err());
    }

    #[test]
    fn test_send_action_to_closed_writer_fails() {
        let links = CompanionLinks::new();
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let peer = PeerId::new("watch");
        links.register(peer.clone(), tx);
        assert!(links.send_action(&peer, ActionKind::Land).is_err());
    }
}
