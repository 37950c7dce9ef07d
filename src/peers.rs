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

//! Registry of connected companion devices.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info};

/// Opaque identifier of a paired companion device.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Thread-safe set of currently connected peers.
///
/// Every operation runs under the registry lock. Re-adding a known peer and
/// removing an unknown one are both no-ops.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: Mutex<BTreeSet<PeerId>>,
}

impl PeerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a peer. Returns `true` if it was not already present.
    pub fn add(&self, id: PeerId) -> bool {
        let mut peers = self.peers.lock();
        if peers.contains(&id) {
            debug!("Peer {} already registered", id);
            return false;
        }
        info!("Adding peer {}", id);
        peers.insert(id)
    }

    /// Remove a peer. Returns `true` if it was present.
    pub fn remove(&self, id: &PeerId) -> bool {
        let removed = self.peers.lock().remove(id);
        if removed {
            info!("Removing peer {}", id);
        } else {
            debug!("Peer {} was not registered", id);
        }
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.peers.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.peers.lock().contains(id)
    }

    /// Visit every peer while holding the registry lock.
    ///
    /// `f` must not call back into the registry.
    pub fn for_each<F: FnMut(&PeerId)>(&self, mut f: F) {
        let peers = self.peers.lock();
        for peer in peers.iter() {
            f(peer);
        }
    }

    /// Copy of the current members, taken under the lock.
    pub fn snapshot(&self) -> Vec<PeerId> {
        self.peers.lock().iter().cloned().collect()
    }
}
