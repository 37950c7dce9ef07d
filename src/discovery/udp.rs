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

//! UDP beacon discovery.
//!
//! Vehicles broadcast a small JSON beacon on the discovery port. While
//! discovery is active every valid beacon is reported; if none arrives within
//! the timeout a [`DiscoveryEvent::TimedOut`] is emitted and the timer re-arms.

use anyhow::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info};

use super::{DiscoveryEvent, Discoverer};
use crate::vehicle::{DeviceDescriptor, ProductFamily};

/// Announcement broadcast by a vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beacon {
    pub name: String,
    pub product: ProductFamily,
    /// TCP port of the vehicle's command link.
    pub port: u16,
}

/// Parse a beacon datagram into a device descriptor.
pub fn parse_beacon(datagram: &[u8], from: SocketAddr) -> Option<DeviceDescriptor> {
    let beacon: Beacon = serde_json::from_slice(datagram).ok()?;
    Some(DeviceDescriptor {
        name: beacon.name,
        addr: SocketAddr::new(from.ip(), beacon.port),
        product: beacon.product,
    })
}

/// Discoverer listening for UDP beacons.
pub struct UdpDiscoverer {
    port: u16,
    timeout: Duration,
    runtime: Handle,
    event_tx: mpsc::UnboundedSender<DiscoveryEvent>,
    active_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
    bound_port: Mutex<Option<u16>>,
}

impl UdpDiscoverer {
    /// Create a discoverer. Nothing is bound until [`Discoverer::setup`].
    pub fn new(
        port: u16,
        timeout: Duration,
        runtime: Handle,
        event_tx: mpsc::UnboundedSender<DiscoveryEvent>,
    ) -> Self {
        let (active_tx, _) = watch::channel(false);
        Self {
            port,
            timeout,
            runtime,
            event_tx,
            active_tx,
            task: Mutex::new(None),
            bound_port: Mutex::new(None),
        }
    }

    /// Port actually bound, once set up.
    pub fn local_port(&self) -> Option<u16> {
        *self.bound_port.lock()
    }

    pub fn is_active(&self) -> bool {
        *self.active_tx.borrow()
    }
}

impl Discoverer for UdpDiscoverer {
    fn setup(&self) -> Result<()> {
        let mut task = self.task.lock();
        if task.is_some() {
            debug!("Discovery already set up");
            return Ok(());
        }

        let std_socket = std::net::UdpSocket::bind(("0.0.0.0", self.port))?;
        std_socket.set_broadcast(true)?;
        std_socket.set_nonblocking(true)?;
        let local_port = std_socket.local_addr()?.port();

        let socket = {
            let _guard = self.runtime.enter();
            UdpSocket::from_std(std_socket)?
        };

        *task = Some(self.runtime.spawn(discovery_loop(
            socket,
            self.active_tx.subscribe(),
            self.event_tx.clone(),
            self.timeout,
        )));
        *self.bound_port.lock() = Some(local_port);
        info!("Discovery listening on UDP port {}", local_port);
        Ok(())
    }

    fn cleanup(&self) -> Result<()> {
        self.active_tx.send_replace(false);
        if let Some(task) = self.task.lock().take() {
            task.abort();
            info!("Discovery stopped and released");
        }
        *self.bound_port.lock() = None;
        Ok(())
    }

    fn start_discovering(&self) -> Result<()> {
        if !self.active_tx.send_replace(true) {
            info!("Discovering vehicles...");
        }
        Ok(())
    }

    fn stop_discovering(&self) -> Result<()> {
        if self.active_tx.send_replace(false) {
            info!("Discovery paused");
        }
        Ok(())
    }
}

async fn discovery_loop(
    socket: UdpSocket,
    mut active_rx: watch::Receiver<bool>,
    event_tx: mpsc::UnboundedSender<DiscoveryEvent>,
    timeout: Duration,
) {
    let mut buf = vec![0u8; 2048];
    let mut deadline = Instant::now() + timeout;

    loop {
        let active = *active_rx.borrow_and_update();

        if !active {
            // Beacons received while idle are drained and dropped.
            tokio::select! {
                received = socket.recv_from(&mut buf) => {
                    if let Err(e) = received {
                        error!("Discovery receive error: {}", e);
                        return;
                    }
                }
                changed = active_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    deadline = Instant::now() + timeout;
                }
            }
            continue;
        }

        tokio::select! {
            received = socket.recv_from(&mut buf) => match received {
                Ok((n, from)) => match parse_beacon(&buf[..n], from) {
                    Some(device) => {
                        debug!("Beacon from {} at {}", device.name, device.addr);
                        deadline = Instant::now() + timeout;
                        if event_tx.send(DiscoveryEvent::ServiceDiscovered(device)).is_err() {
                            return;
                        }
                    }
                    None => debug!("Ignoring malformed beacon from {}", from),
                },
                Err(e) => {
                    error!("Discovery receive error: {}", e);
                    return;
                }
            },
            _ = sleep_until(deadline) => {
                info!("Discovery timed out after {:?}", timeout);
                deadline = Instant::now() + timeout;
                if event_tx.send(DiscoveryEvent::TimedOut).is_err() {
                    return;
                }
            }
            changed = active_rx.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}
