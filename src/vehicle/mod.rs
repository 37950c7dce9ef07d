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

//! Vehicle session abstraction.
//!
//! A session is the live command channel to one discovered vehicle. The
//! coordinator only talks to it through [`VehicleSession`]; sessions report
//! back through a [`VehicleListener`].

pub mod link;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

pub use crate::protocol::{ActionKind, MotionData};
pub use link::TcpVehicleFactory;

/// Connection state reported by a vehicle session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VehicleConnectionState {
    Stopped,
    Starting,
    Running,
    Paused,
    Stopping,
}

/// Product family announced by the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductFamily {
    /// Drones: pilotable and able to cut motors.
    Flying,
    /// Ground vehicles: pilotable only.
    Rolling,
}

/// A vehicle found on the local network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub name: String,
    pub addr: SocketAddr,
    pub product: ProductFamily,
}

/// Optional things a session can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Pilotable,
    Emergency,
}

/// Set of capabilities of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pilotable: bool,
    emergency: bool,
}

impl Capabilities {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with(mut self, capability: Capability) -> Self {
        match capability {
            Capability::Pilotable => self.pilotable = true,
            Capability::Emergency => self.emergency = true,
        }
        self
    }

    pub fn contains(&self, capability: Capability) -> bool {
        match capability {
            Capability::Pilotable => self.pilotable,
            Capability::Emergency => self.emergency,
        }
    }

    /// Capabilities implied by a product family.
    pub fn for_product(product: ProductFamily) -> Self {
        match product {
            ProductFamily::Flying => Self::none()
                .with(Capability::Pilotable)
                .with(Capability::Emergency),
            ProductFamily::Rolling => Self::none().with(Capability::Pilotable),
        }
    }
}

/// Identity of one session instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Command sink for a live vehicle connection.
///
/// Every call is fire-and-forget: implementations queue the work and return
/// immediately, must never call back into the coordinator synchronously, and
/// must tolerate being invoked during or after teardown.
pub trait VehicleSession: Send + Sync {
    fn capabilities(&self) -> Capabilities;

    /// Drive the vehicle from a motion sample.
    fn pilot_with_motion(&self, data: &MotionData);

    /// Zero every piloting input.
    fn stop_piloting(&self);

    /// Perform the current discrete action and announce it.
    fn send_action(&self);

    /// Cut motors. Only meaningful with [`Capability::Emergency`].
    fn send_emergency(&self);

    /// Close the connection.
    fn disconnect(&self);
}

/// Creates sessions for discovered vehicles.
pub trait VehicleSessionFactory: Send + Sync {
    fn create(
        &self,
        device: &DeviceDescriptor,
        listener: VehicleListener,
    ) -> Result<Arc<dyn VehicleSession>>;
}

/// What a session reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleEventKind {
    ConnectionChanged(VehicleConnectionState),
    ActionChanged(ActionKind),
}

/// A report tagged with the session that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VehicleEvent {
    pub session: SessionId,
    pub kind: VehicleEventKind,
}

/// Handle a session uses to report back to the coordinator.
#[derive(Debug, Clone)]
pub struct VehicleListener {
    session: SessionId,
    event_tx: mpsc::UnboundedSender<VehicleEvent>,
}

impl VehicleListener {
    pub fn new(session: SessionId, event_tx: mpsc::UnboundedSender<VehicleEvent>) -> Self {
        Self { session, event_tx }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn connection_changed(&self, state: VehicleConnectionState) {
        self.emit(VehicleEventKind::ConnectionChanged(state));
    }

    pub fn action_changed(&self, action: ActionKind) {
        self.emit(VehicleEventKind::ActionChanged(action));
    }

    fn emit(&self, kind: VehicleEventKind) {
        let event = VehicleEvent {
            session: self.session,
            kind,
        };
        if self.event_tx.send(event).is_err() {
            debug!("Vehicle event dropped, coordinator gone: {:?}", kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_for_product() {
        let flying = Capabilities::for_product(ProductFamily::Flying);
        assert!(flying.contains(Capability::Pilotable));
        assert!(flying.contains(Capability::Emergency));

        let rolling = Capabilities::for_product(ProductFamily::Rolling);
        assert!(rolling.contains(Capability::Pilotable));
        assert!(!rolling.contains(Capability::Emergency));

        assert!(!Capabilities::none().contains(Capability::Pilotable));
    }

    #[test]
    fn test_listener_tags_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = SessionId::new();
        let listener = VehicleListener::new(id, tx);

        listener.connection_changed(VehicleConnectionState::Running);
        listener.action_changed(ActionKind::Land);

        let first = rx.try_recv().unwrap();
        assert_eq!(first.session, id);
        assert_eq!(
            first.kind,
            VehicleEventKind::ConnectionChanged(VehicleConnectionState::Running)
        );
        let second = rx.try_recv().unwrap();
        assert_eq!(second.kind, VehicleEventKind::ActionChanged(ActionKind::Land));
    }

    #[test]
    fn test_listener_survives_closed_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let listener = VehicleListener::new(SessionId::new(), tx);
        listener.connection_changed(VehicleConnectionState::Stopped);
    }

    #[test]
    fn test_connection_state_wire_names() {
        let state: VehicleConnectionState = serde_json::from_str("\"RUNNING\"").unwrap();
        assert_eq!(state, VehicleConnectionState::Running);
        let product: ProductFamily = serde_json::from_str("\"rolling\"").unwrap();
        assert_eq!(product, ProductFamily::Rolling);
    }
}
