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

//! Droneswear mobile controller.
//!
//! Keeps one vehicle session alive at a time and routes motion and action
//! messages from a paired wrist companion into it.

pub mod companion;
pub mod config;
pub mod console;
pub mod coordinator;
pub mod discovery;
pub mod events;
pub mod peers;
pub mod protocol;
pub mod router;
pub mod state;
pub mod vehicle;

pub use coordinator::{Collaborators, Coordinator, SessionPhase};
pub use peers::{PeerId, PeerRegistry};
pub use router::{InboundMessage, MessageRouter};
