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

//! TCP vehicle link.
//!
//! Commands go out as newline-delimited JSON, reports come back the same way.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{
    ActionKind, Capabilities, DeviceDescriptor, MotionData, VehicleConnectionState,
    VehicleListener, VehicleSession, VehicleSessionFactory,
};

/// Command written to the vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum VehicleCommand {
    Pilot { motion: MotionData },
    StopPiloting,
    Action,
    Emergency,
}

/// Report read from the vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VehicleReport {
    State { state: VehicleConnectionState },
    Action { action: String },
}

#[derive(Debug)]
enum LinkCommand {
    Send(VehicleCommand),
    Close,
}

/// Session over a TCP link. Calls only queue work for the link task.
pub struct TcpVehicleSession {
    name: String,
    capabilities: Capabilities,
    command_tx: mpsc::UnboundedSender<LinkCommand>,
}

impl TcpVehicleSession {
    fn queue(&self, command: LinkCommand) {
        if self.command_tx.send(command).is_err() {
            debug!("Link to {} already closed", self.name);
        }
    }
}

impl VehicleSession for TcpVehicleSession {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn pilot_with_motion(&self, data: &MotionData) {
        self.queue(LinkCommand::Send(VehicleCommand::Pilot { motion: *data }));
    }

    fn stop_piloting(&self) {
        self.queue(LinkCommand::Send(VehicleCommand::StopPiloting));
    }

    fn send_action(&self) {
        self.queue(LinkCommand::Send(VehicleCommand::Action));
    }

    fn send_emergency(&self) {
        self.queue(LinkCommand::Send(VehicleCommand::Emergency));
    }

    fn disconnect(&self) {
        self.queue(LinkCommand::Close);
    }
}

/// Opens a [`TcpVehicleSession`] per discovered vehicle.
pub struct TcpVehicleFactory {
    runtime: Handle,
}

impl TcpVehicleFactory {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }
}

impl VehicleSessionFactory for TcpVehicleFactory {
    fn create(
        &self,
        device: &DeviceDescriptor,
        listener: VehicleListener,
    ) -> Result<Arc<dyn VehicleSession>> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        info!(
            "Opening session {} to {} at {}",
            listener.session(),
            device.name,
            device.addr
        );
        self.runtime
            .spawn(run_link(device.addr, listener, command_rx));

        Ok(Arc::new(TcpVehicleSession {
            name: device.name.clone(),
            capabilities: Capabilities::for_product(device.product),
            command_tx,
        }))
    }
}

/// Drive one link until either side closes it. Always ends with `Stopped`.
async fn run_link(
    addr: SocketAddr,
    listener: VehicleListener,
    mut command_rx: mpsc::UnboundedReceiver<LinkCommand>,
) {
    listener.connection_changed(VehicleConnectionState::Starting);

    let stream = match TcpStream::connect(addr).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Failed to connect to vehicle at {}: {}", addr, e);
            listener.connection_changed(VehicleConnectionState::Stopped);
            return;
        }
    };
    info!("Vehicle link up: {}", addr);
    listener.connection_changed(VehicleConnectionState::Running);

    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => handle_report(&line, &listener),
                Ok(None) => {
                    info!("Vehicle closed the link");
                    break;
                }
                Err(e) => {
                    error!("Vehicle read error: {}", e);
                    break;
                }
            },
            command = command_rx.recv() => match command {
                Some(LinkCommand::Send(command)) => {
                    if let Err(e) = write_command(&mut writer, &command).await {
                        error!("Vehicle write error: {}", e);
                        break;
                    }
                }
                Some(LinkCommand::Close) | None => {
                    debug!("Closing vehicle link");
                    let _ = writer.shutdown().await;
                    break;
                }
            },
        }
    }

    listener.connection_changed(VehicleConnectionState::Stopped);
}

async fn write_command(
    writer: &mut tokio::net::tcp::OwnedWriteHalf,
    command: &VehicleCommand,
) -> Result<()> {
    let line = format!("{}\n", serde_json::to_string(command)?);
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

fn handle_report(line: &str, listener: &VehicleListener) {
    let report: VehicleReport = match serde_json::from_str(line.trim()) {
        Ok(report) => report,
        Err(e) => {
            warn!("Ignoring malformed vehicle report: {}", e);
            return;
        }
    };

    match report {
        VehicleReport::State { state } => listener.connection_changed(state),
        VehicleReport::Action { action } => match ActionKind::parse(&action) {
            Some(action) => listener.action_changed(action),
            None => warn!("Unknown vehicle action: {}", action),
        },
    }
}
