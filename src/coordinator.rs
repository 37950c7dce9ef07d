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

//! Session coordination.
//!
//! The coordinator owns the single vehicle session and serializes every
//! event that can affect it: discovery results, session state reports,
//! companion messages and local overrides. Two locks are involved, the
//! session lock (phase, session, motion switch) and the peer registry's own
//! lock. No path ever holds both.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::companion::PeerSink;
use crate::discovery::Discoverer;
use crate::peers::{PeerId, PeerRegistry};
use crate::protocol::{ActionKind, MotionData};
use crate::state::{ControllerState, ControllerStatus};
use crate::vehicle::{
    Capability, DeviceDescriptor, SessionId, VehicleConnectionState, VehicleEvent,
    VehicleEventKind, VehicleListener, VehicleSession, VehicleSessionFactory,
};

/// Phase of the vehicle session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Discovering,
    Connecting,
    Connected,
    Disconnecting,
}

/// Everything the coordinator talks to.
pub struct Collaborators {
    pub discoverer: Arc<dyn Discoverer>,
    pub factory: Arc<dyn VehicleSessionFactory>,
    pub peer_sink: Arc<dyn PeerSink>,
}

struct ActiveSession {
    id: SessionId,
    device: DeviceDescriptor,
    handle: Arc<dyn VehicleSession>,
}

/// State guarded by the session lock.
struct SessionSlot {
    phase: SessionPhase,
    active: Option<ActiveSession>,
    motion_source_enabled: bool,
}

impl SessionSlot {
    /// The active session, if `id` is the one currently held.
    fn current(&self, id: SessionId) -> Option<&ActiveSession> {
        self.active.as_ref().filter(|active| active.id == id)
    }
}

pub struct Coordinator {
    session: Mutex<SessionSlot>,
    peers: PeerRegistry,
    discoverer: Arc<dyn Discoverer>,
    factory: Arc<dyn VehicleSessionFactory>,
    peer_sink: Arc<dyn PeerSink>,
    vehicle_tx: mpsc::UnboundedSender<VehicleEvent>,
    state: Arc<ControllerState>,
}

impl Coordinator {
    /// Create a coordinator. Sessions it creates report into `vehicle_tx`.
    pub fn new(
        collaborators: Collaborators,
        state: Arc<ControllerState>,
        vehicle_tx: mpsc::UnboundedSender<VehicleEvent>,
        motion_source_enabled: bool,
    ) -> Self {
        state.set_motion_source_enabled(motion_source_enabled);
        Self {
            session: Mutex::new(SessionSlot {
                phase: SessionPhase::Idle,
                active: None,
                motion_source_enabled,
            }),
            peers: PeerRegistry::new(),
            discoverer: collaborators.discoverer,
            factory: collaborators.factory,
            peer_sink: collaborators.peer_sink,
            vehicle_tx,
            state,
        }
    }

    // --- lifecycle ---

    /// Acquire discovery resources and start looking for a vehicle.
    pub fn resume(&self) {
        if let Err(e) = self.discoverer.setup() {
            warn!("Discovery setup failed: {}", e);
            return;
        }
        self.start();
    }

    /// `Idle -> Discovering`.
    pub fn start(&self) {
        {
            let mut slot = self.session.lock();
            if slot.phase != SessionPhase::Idle {
                debug!("Start ignored in phase {:?}", slot.phase);
                return;
            }
            slot.phase = SessionPhase::Discovering;
        }
        self.state.set_status(ControllerStatus::Searching);
        self.start_discovery();
    }

    /// Stop discovery and drop the active session.
    pub fn shutdown(&self) {
        let active = {
            let mut slot = self.session.lock();
            slot.phase = SessionPhase::Disconnecting;
            slot.active.take()
        };

        self.stop_discovery();
        if let Err(e) = self.discoverer.cleanup() {
            warn!("Discovery cleanup failed: {}", e);
        }
        if let Some(active) = active {
            info!("Disconnecting from {}", active.device.name);
            active.handle.disconnect();
        }

        let mut slot = self.session.lock();
        if let Some(late) = slot.active.take() {
            warn!("Dropping session {} opened during shutdown", late.id);
            late.handle.disconnect();
        }
        slot.phase = SessionPhase::Idle;
        drop(slot);
        info!("Coordinator shut down");
    }

    // --- discovery ---

    pub fn on_service_discovered(&self, device: DeviceDescriptor) {
        self.state.set_timeout_hint_visible(false);

        {
            let mut slot = self.session.lock();
            if slot.phase != SessionPhase::Discovering {
                debug!("Not discovering ({:?}), ignoring {}", slot.phase, device.name);
                return;
            }
            if slot.active.is_some() {
                debug!("Already have a session, ignoring {}", device.name);
                return;
            }

            let id = SessionId::new();
            let listener = VehicleListener::new(id, self.vehicle_tx.clone());
            let handle = match self.factory.create(&device, listener) {
                Ok(handle) => handle,
                Err(e) => {
                    warn!("Could not open a session to {}: {}", device.name, e);
                    return;
                }
            };
            info!("Session {} created for {}", id, device.name);
            slot.active = Some(ActiveSession {
                id,
                device: device.clone(),
                handle,
            });
            slot.phase = SessionPhase::Connecting;
        }

        self.stop_discovery();
        self.state.set_status(ControllerStatus::Connecting {
            device_name: device.name,
        });
    }

    /// Informational only; the session is untouched.
    pub fn on_discovery_timed_out(&self) {
        info!("No vehicle found yet");
        self.state.set_timeout_hint_visible(true);
    }

    // --- vehicle session ---

    /// Dispatch a report produced by a session listener.
    pub fn on_vehicle_event(&self, event: VehicleEvent) {
        match event.kind {
            VehicleEventKind::ConnectionChanged(state) => {
                self.on_connection_changed(event.session, state)
            }
            VehicleEventKind::ActionChanged(action) => {
                self.on_action_changed(event.session, action)
            }
        }
    }

    pub fn on_connection_changed(&self, session: SessionId, state: VehicleConnectionState) {
        match state {
            VehicleConnectionState::Running => {
                {
                    let mut slot = self.session.lock();
                    let Some(active) = slot.current(session) else {
                        debug!("Running from stale session {}", session);
                        return;
                    };
                    info!("Connected to {}", active.device.name);
                    slot.phase = SessionPhase::Connected;
                }
                self.stop_discovery();
                self.state.set_status(ControllerStatus::Connected);
            }
            VehicleConnectionState::Stopped => {
                {
                    let mut slot = self.session.lock();
                    if slot.current(session).is_none() {
                        debug!("Stopped from stale session {}", session);
                        return;
                    }
                    if let Some(active) = slot.active.take() {
                        info!("Session with {} stopped", active.device.name);
                    }
                    slot.phase = SessionPhase::Discovering;
                }
                self.state.set_status(ControllerStatus::Disconnected);
                self.start_discovery();
            }
            other => debug!("Session {} state {:?}", session, other),
        }
    }

    /// Mirror the vehicle's current action to the UI and every peer.
    pub fn on_action_changed(&self, session: SessionId, action: ActionKind) {
        if self.session.lock().current(session).is_none() {
            debug!("Action from stale session {}", session);
            return;
        }

        self.state.set_last_action(action);

        let peers = self.peers.snapshot();
        debug!("Broadcasting {} to {} peer(s)", action.as_str(), peers.len());
        for peer in peers {
            if let Err(e) = self.peer_sink.send_action(&peer, action) {
                warn!("Failed to send action to {}: {}", peer, e);
            }
        }
    }

    // --- local overrides ---

    pub fn on_emergency_requested(&self) {
        let slot = self.session.lock();
        match &slot.active {
            Some(active) if active.handle.capabilities().contains(Capability::Emergency) => {
                warn!("Emergency requested for {}", active.device.name);
                active.handle.send_emergency();
            }
            Some(active) => debug!("{} has no emergency stop", active.device.name),
            None => debug!("Emergency requested without a session"),
        }
    }

    /// Enable or disable the companion as motion source. Disabling always
    /// stops piloting on the current session.
    pub fn on_motion_source_toggled(&self, enabled: bool) {
        {
            let mut slot = self.session.lock();
            slot.motion_source_enabled = enabled;
            info!("Companion motion {}", if enabled { "enabled" } else { "disabled" });
            if !enabled {
                if let Some(active) = &slot.active {
                    active.handle.stop_piloting();
                }
            }
        }
        self.state.set_motion_source_enabled(enabled);
    }

    // --- routed companion messages ---

    /// Forward a motion sample. `None` stops piloting.
    pub fn handle_motion(&self, sample: Option<MotionData>) {
        let slot = self.session.lock();
        let Some(active) = &slot.active else {
            return;
        };
        if !slot.motion_source_enabled {
            return;
        }
        if !active.handle.capabilities().contains(Capability::Pilotable) {
            debug!("{} is not pilotable", active.device.name);
            return;
        }
        match sample {
            Some(data) => active.handle.pilot_with_motion(&data),
            None => active.handle.stop_piloting(),
        }
    }

    pub fn handle_action_request(&self) {
        let slot = self.session.lock();
        match &slot.active {
            Some(active) => active.handle.send_action(),
            None => debug!("Action request without a session"),
        }
    }

    // --- peers ---

    pub fn on_peer_connected(&self, peer: PeerId) {
        self.peers.add(peer);
    }

    pub fn on_peer_disconnected(&self, peer: &PeerId) {
        self.peers.remove(peer);
    }

    /// Register peers that were already connected when the transport came up.
    pub fn on_peers_listed(&self, peers: impl IntoIterator<Item = PeerId>) {
        for peer in peers {
            self.peers.add(peer);
        }
    }

    // --- queries ---

    pub fn phase(&self) -> SessionPhase {
        self.session.lock().phase
    }

    pub fn has_session(&self) -> bool {
        self.session.lock().active.is_some()
    }

    /// Id of the active session, if any.
    pub fn session_id(&self) -> Option<SessionId> {
        self.session.lock().active.as_ref().map(|active| active.id)
    }

    pub fn motion_source_enabled(&self) -> bool {
        self.session.lock().motion_source_enabled
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    pub fn state(&self) -> &Arc<ControllerState> {
        &self.state
    }

    fn start_discovery(&self) {
        if let Err(e) = self.discoverer.start_discovering() {
            warn!("Failed to start discovery: {}", e);
        }
    }

    fn stop_discovery(&self) {
        if let Err(e) = self.discoverer.stop_discovering() {
            warn!("Failed to stop discovery: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vehicle::{Capabilities, ProductFamily};
    use anyhow::{anyhow, Result};

    #[derive(Default)]
    struct NullDiscoverer;

    impl Discoverer for NullDiscoverer {
        fn setup(&self) -> Result<()> {
            Ok(())
        }
        fn cleanup(&self) -> Result<()> {
            Ok(())
        }
        fn start_discovering(&self) -> Result<()> {
            Err(anyhow!("radio off"))
        }
        fn stop_discovering(&self) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingSession {
        calls: Mutex<Vec<&'static str>>,
    }

    impl VehicleSession for CountingSession {
        fn capabilities(&self) -> Capabilities {
            Capabilities::for_product(ProductFamily::Rolling)
        }
        fn pilot_with_motion(&self, _data: &MotionData) {
            self.calls.lock().push("pilot");
        }
        fn stop_piloting(&self) {
            self.calls.lock().push("stop");
        }
        fn send_action(&self) {
            self.calls.lock().push("action");
        }
        fn send_emergency(&self) {
            self.calls.lock().push("emergency");
        }
        fn disconnect(&self) {
            self.calls.lock().push("disconnect");
        }
    }

    struct OneSessionFactory {
        session: Arc<CountingSession>,
        fail: bool,
    }

    impl VehicleSessionFactory for OneSessionFactory {
        fn create(
            &self,
            _device: &DeviceDescriptor,
            _listener: VehicleListener,
        ) -> Result<Arc<dyn VehicleSession>> {
            if self.fail {
                return Err(anyhow!("no route to vehicle"));
            }
            Ok(self.session.clone())
        }
    }

    struct NullSink;

    impl PeerSink for NullSink {
        fn send_action(&self, _peer: &PeerId, _action: ActionKind) -> Result<()> {
            Ok(())
        }
    }

    fn coordinator(fail: bool) -> (Coordinator, Arc<CountingSession>) {
        let session = Arc::new(CountingSession::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        let coordinator = Coordinator::new(
            Collaborators {
                discoverer: Arc::new(NullDiscoverer),
                factory: Arc::new(OneSessionFactory {
                    session: session.clone(),
                    fail,
                }),
                peer_sink: Arc::new(NullSink),
            },
            ControllerState::new(),
            tx,
            true,
        );
        (coordinator, session)
    }

    fn rover() -> DeviceDescriptor {
        DeviceDescriptor {
            name: "Sumo".to_string(),
            addr: "127.0.0.1:44444".parse().unwrap(),
            product: ProductFamily::Rolling,
        }
    }

    #[test]
    fn test_discovery_failure_does_not_block_start() {
        let (coordinator, _) = coordinator(false);
        coordinator.start();
        assert_eq!(coordinator.phase(), SessionPhase::Discovering);
    }

    #[test]
    fn test_factory_failure_keeps_discovering() {
        let (coordinator, _) = coordinator(true);
        coordinator.start();
        coordinator.on_service_discovered(rover());
        assert!(!coordinator.has_session());
        assert_eq!(coordinator.phase(), SessionPhase::Discovering);
    }

    #[test]
    fn test_emergency_needs_capability() {
        let (coordinator, session) = coordinator(false);
        coordinator.start();
        coordinator.on_service_discovered(rover());
        coordinator.on_emergency_requested();
        assert!(session.calls.lock().is_empty());
    }

    #[test]
    fn test_stale_session_events_are_ignored() {
        let (coordinator, _) = coordinator(false);
        coordinator.start();
        coordinator.on_service_discovered(rover());

        let stale = SessionId::new();
        coordinator.on_connection_changed(stale, VehicleConnectionState::Running);
        assert_eq!(coordinator.phase(), SessionPhase::Connecting);

        coordinator.on_connection_changed(stale, VehicleConnectionState::Stopped);
        assert!(coordinator.has_session());

        let current = coordinator.session_id().unwrap();
        coordinator.on_connection_changed(current, VehicleConnectionState::Paused);
        assert_eq!(coordinator.phase(), SessionPhase::Connecting);
    }

    #[test]
    fn test_stopped_while_connecting_restarts_discovery() {
        let (coordinator, _) = coordinator(false);
        coordinator.start();
        coordinator.on_service_discovered(rover());
        let id = coordinator.session_id().unwrap();

        coordinator.on_connection_changed(id, VehicleConnectionState::Stopped);
        assert!(!coordinator.has_session());
        assert_eq!(coordinator.phase(), SessionPhase::Discovering);
        assert_eq!(
            coordinator.state().get_status(),
            ControllerStatus::Disconnected
        );
    }

    #[test]
    fn test_shutdown_disconnects_session() {
        let (coordinator, session) = coordinator(false);
        coordinator.start();
        coordinator.on_service_discovered(rover());
        coordinator.shutdown();

        assert_eq!(coordinator.phase(), SessionPhase::Idle);
        assert!(!coordinator.has_session());
        assert_eq!(*session.calls.lock(), vec!["disconnect"]);
    }
}
