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

//! Droneswear mobile controller

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use droneswear_mobile::companion::CompanionServer;
use droneswear_mobile::config::Config;
use droneswear_mobile::console::{self, ControlAction};
use droneswear_mobile::discovery::UdpDiscoverer;
use droneswear_mobile::events;
use droneswear_mobile::state::ControllerState;
use droneswear_mobile::vehicle::TcpVehicleFactory;
use droneswear_mobile::{Collaborators, Coordinator};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("droneswear_mobile=info".parse()?),
        )
        .init();

    info!(
        "Starting Droneswear controller v{}...",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::load()?;
    info!("Configuration loaded");

    let state = ControllerState::new();

    // Companion transport
    let companion_addr = SocketAddr::from(([0, 0, 0, 0], config.companion.listen_port));
    let server = CompanionServer::bind(companion_addr).await?;
    let links = server.links();
    let companion_rx = server.listen();

    // Vehicle discovery and sessions
    let (discovery_tx, discovery_rx) = mpsc::unbounded_channel();
    let discoverer = Arc::new(UdpDiscoverer::new(
        config.discovery.port,
        config.discovery.timeout(),
        Handle::current(),
        discovery_tx,
    ));
    let (vehicle_tx, vehicle_rx) = mpsc::unbounded_channel();

    let coordinator = Arc::new(Coordinator::new(
        Collaborators {
            discoverer,
            factory: Arc::new(TcpVehicleFactory::new(Handle::current())),
            peer_sink: Arc::new(links.clone()),
        },
        state.clone(),
        vehicle_tx,
        config.control.motion_source_enabled,
    ));

    tokio::spawn(events::run_discovery_events(coordinator.clone(), discovery_rx));
    tokio::spawn(events::run_vehicle_events(coordinator.clone(), vehicle_rx));
    tokio::spawn(events::run_companion_events(
        coordinator.clone(),
        links,
        companion_rx,
    ));

    coordinator.resume();

    let mut action_rx = console::run_console();
    info!("Ready. Commands: motion on|off|toggle, emergency, status, quit");

    loop {
        tokio::select! {
            Some(action) = action_rx.recv() => {
                match action {
                    ControlAction::SetMotionSource(enabled) => {
                        coordinator.on_motion_source_toggled(enabled);
                    }
                    ControlAction::ToggleMotionSource => {
                        let enabled = !coordinator.motion_source_enabled();
                        coordinator.on_motion_source_toggled(enabled);
                    }
                    ControlAction::Emergency => coordinator.on_emergency_requested(),
                    ControlAction::Status => info!("{}", console::status_line(&coordinator)),
                    ControlAction::Quit => {
                        info!("Quit requested");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    coordinator.shutdown();
    info!("Droneswear controller stopped");
    Ok(())
}
