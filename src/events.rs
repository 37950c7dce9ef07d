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

//! Event pumps.
//!
//! Each event source gets its own task, so sources run concurrently while
//! events from one source keep their delivery order.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::companion::{CompanionEvent, CompanionLinks};
use crate::coordinator::Coordinator;
use crate::discovery::DiscoveryEvent;
use crate::router::MessageRouter;
use crate::vehicle::VehicleEvent;

/// Feed discovery results to the coordinator.
pub async fn run_discovery_events(
    coordinator: Arc<Coordinator>,
    mut event_rx: mpsc::UnboundedReceiver<DiscoveryEvent>,
) {
    while let Some(event) = event_rx.recv().await {
        match event {
            DiscoveryEvent::ServiceDiscovered(device) => {
                info!("Vehicle found: {} ({:?})", device.name, device.product);
                coordinator.on_service_discovered(device);
            }
            DiscoveryEvent::TimedOut => coordinator.on_discovery_timed_out(),
        }
    }
    debug!("Discovery event stream ended");
}

/// Feed vehicle session reports to the coordinator.
pub async fn run_vehicle_events(
    coordinator: Arc<Coordinator>,
    mut event_rx: mpsc::UnboundedReceiver<VehicleEvent>,
) {
    while let Some(event) = event_rx.recv().await {
        debug!("Vehicle event: {:?}", event);
        coordinator.on_vehicle_event(event);
    }
    debug!("Vehicle event stream ended");
}

/// Track companion membership and route their frames.
///
/// Each connect also re-lists every open link, so companions whose own
/// `Connected` is still queued are known before the first broadcast.
pub async fn run_companion_events(
    coordinator: Arc<Coordinator>,
    links: CompanionLinks,
    mut event_rx: mpsc::Receiver<CompanionEvent>,
) {
    let router = MessageRouter::new(coordinator.clone());

    while let Some(event) = event_rx.recv().await {
        match event {
            CompanionEvent::Connected { peer } => {
                coordinator.on_peer_connected(peer);
                coordinator.on_peers_listed(links.connected());
            }
            CompanionEvent::Frame { peer, frame } => router.route(&peer, &frame),
            CompanionEvent::Disconnected { peer } => coordinator.on_peer_disconnected(&peer),
        }
    }
    debug!("Companion event stream ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::companion::PeerSink;
    use crate::coordinator::Collaborators;
    use crate::discovery::Discoverer;
    use crate::peers::PeerId;
    use crate::protocol::ActionKind;
    use crate::state::ControllerState;
    use crate::vehicle::{DeviceDescriptor, VehicleListener, VehicleSession, VehicleSessionFactory};
    use anyhow::{anyhow, Result};

    struct IdleDiscoverer;

    impl Discoverer for IdleDiscoverer {
        fn setup(&self) -> Result<()> {
            Ok(())
        }
        fn cleanup(&self) -> Result<()> {
            Ok(())
        }
        fn start_discovering(&self) -> Result<()> {
            Ok(())
        }
        fn stop_discovering(&self) -> Result<()> {
            Ok(())
        }
    }

    struct NoVehicles;

    impl VehicleSessionFactory for NoVehicles {
        fn create(
            &self,
            _device: &DeviceDescriptor,
            _listener: VehicleListener,
        ) -> Result<Arc<dyn VehicleSession>> {
            Err(anyhow!("no vehicles here"))
        }
    }

    fn coordinator(links: &CompanionLinks) -> Arc<Coordinator> {
        let (vehicle_tx, _vehicle_rx) = mpsc::unbounded_channel();
        let sink: Arc<dyn PeerSink> = Arc::new(links.clone());
        Arc::new(Coordinator::new(
            Collaborators {
                discoverer: Arc::new(IdleDiscoverer),
                factory: Arc::new(NoVehicles),
                peer_sink: sink,
            },
            ControllerState::new(),
            vehicle_tx,
            true,
        ))
    }

    #[tokio::test]
    async fn test_connect_lists_already_open_links() {
        let links = CompanionLinks::new();
        let coordinator = coordinator(&links);
        let (event_tx, event_rx) = mpsc::channel(8);

        let first = PeerId::new("companion-a");
        let second = PeerId::new("companion-b");
        let (writer_a, _out_a) = mpsc::unbounded_channel();
        let (writer_b, mut out_b) = mpsc::unbounded_channel();
        links.register(first.clone(), writer_a);
        // Open, but its own `Connected` has not been delivered.
        links.register(second.clone(), writer_b);

        event_tx
            .send(CompanionEvent::Connected {
                peer: first.clone(),
            })
            .await
            .unwrap();
        drop(event_tx);
        run_companion_events(coordinator.clone(), links.clone(), event_rx).await;

        assert!(coordinator.peers().contains(&first));
        assert!(coordinator.peers().contains(&second));

        links.send_action(&second, ActionKind::Land).unwrap();
        assert!(out_b.try_recv().unwrap().contains("LAND"));
    }

    #[tokio::test]
    async fn test_disconnect_leaves_registry() {
        let links = CompanionLinks::new();
        let coordinator = coordinator(&links);
        let (event_tx, event_rx) = mpsc::channel(8);
        let peer = PeerId::new("companion-a");

        event_tx
            .send(CompanionEvent::Connected { peer: peer.clone() })
            .await
            .unwrap();
        event_tx
            .send(CompanionEvent::Disconnected { peer: peer.clone() })
            .await
            .unwrap();
        drop(event_tx);
        run_companion_events(coordinator.clone(), links, event_rx).await;

        assert!(coordinator.peers().is_empty());
    }
}
