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

//! Decoding and dispatch of companion messages.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::coordinator::Coordinator;
use crate::peers::PeerId;
use crate::protocol::{Message, MessageType, MotionData, PROTOCOL_VERSION};

/// A decoded companion message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InboundMessage {
    /// Motion sample. `None` is an explicit "stop" signal: an empty or
    /// undecodable sample never means "keep the last motion".
    Motion(Option<MotionData>),
    /// Ask the vehicle to perform its current action.
    ActionRequest,
}

/// Decode one delimited frame. Never fails: unrecognised frames yield `None`,
/// damaged motion frames yield `Motion(None)`.
pub fn decode(frame: &[u8]) -> Option<InboundMessage> {
    let message = match Message::from_slice(frame) {
        Ok(message) => message,
        Err(e) => {
            debug!("Ignoring unparseable frame: {}", e);
            return None;
        }
    };
    let intact = message.version == PROTOCOL_VERSION && message.verify();

    match message.message_type {
        MessageType::Motion => {
            if !intact {
                warn!("Damaged motion frame, treating as stop");
                return Some(InboundMessage::Motion(None));
            }
            let sample = message
                .motion_payload()
                .ok()
                .filter(|data| data.is_finite());
            Some(InboundMessage::Motion(sample))
        }
        MessageType::Action => {
            if !intact {
                warn!("Damaged action frame ignored");
                return None;
            }
            Some(InboundMessage::ActionRequest)
        }
        MessageType::Unknown => {
            debug!("Ignoring unknown message type");
            None
        }
    }
}

/// Routes companion frames into the coordinator.
#[derive(Clone)]
pub struct MessageRouter {
    coordinator: Arc<Coordinator>,
}

impl MessageRouter {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }

    /// Decode a frame from `peer` and hand it to the coordinator.
    pub fn route(&self, peer: &PeerId, frame: &[u8]) {
        match decode(frame) {
            Some(message) => {
                debug!("Message from {}: {:?}", peer, message);
                self.dispatch(message);
            }
            None => debug!("Nothing to route from {}", peer),
        }
    }

    pub fn dispatch(&self, message: InboundMessage) {
        match message {
            InboundMessage::Motion(sample) => self.coordinator.handle_motion(sample),
            InboundMessage::ActionRequest => self.coordinator.handle_action_request(),
        }
    }
}
