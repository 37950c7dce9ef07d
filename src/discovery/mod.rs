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

//! Vehicle discovery on the local network.

pub mod udp;

use anyhow::Result;

use crate::vehicle::DeviceDescriptor;

pub use udp::UdpDiscoverer;

/// Events emitted by a discoverer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// A vehicle answered.
    ServiceDiscovered(DeviceDescriptor),
    /// Nothing was found within the discovery timeout.
    TimedOut,
}

/// Finds vehicles. Implementations report through a [`DiscoveryEvent`] channel.
pub trait Discoverer: Send + Sync {
    /// Acquire the underlying resources. Discovery stays idle until started.
    fn setup(&self) -> Result<()>;

    /// Release everything acquired by [`Discoverer::setup`].
    fn cleanup(&self) -> Result<()>;

    fn start_discovering(&self) -> Result<()>;

    fn stop_discovering(&self) -> Result<()>;
}
