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

//! User-facing controller state.
//!
//! Written by the coordinator after it releases its own locks, read by
//! whatever presents it.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::protocol::ActionKind;

/// Vehicle connection status shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerStatus {
    Searching,
    Connecting { device_name: String },
    Connected,
    Disconnected,
}

impl ControllerStatus {
    pub fn describe(&self) -> String {
        match self {
            ControllerStatus::Searching => "Searching for a vehicle...".to_string(),
            ControllerStatus::Connecting { device_name } => {
                format!("Connecting to {}...", device_name)
            }
            ControllerStatus::Connected => "Vehicle connected".to_string(),
            ControllerStatus::Disconnected => "Vehicle disconnected".to_string(),
        }
    }
}

/// Shared presentation state.
#[derive(Debug)]
pub struct ControllerState {
    pub status: RwLock<ControllerStatus>,

    /// Discovery timed out; the "how to connect" help should be shown.
    pub timeout_hint_visible: RwLock<bool>,

    /// The emergency control should be offered.
    pub emergency_visible: RwLock<bool>,

    /// Last action reported by the vehicle.
    pub last_action: RwLock<ActionKind>,

    /// Mirror of the motion-source switch.
    pub motion_source_enabled: RwLock<bool>,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            status: RwLock::new(ControllerStatus::Searching),
            timeout_hint_visible: RwLock::new(false),
            emergency_visible: RwLock::new(false),
            last_action: RwLock::new(ActionKind::None),
            motion_source_enabled: RwLock::new(true),
        }
    }
}

impl ControllerState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_status(&self, status: ControllerStatus) {
        *self.status.write() = status;
    }

    pub fn get_status(&self) -> ControllerStatus {
        self.status.read().clone()
    }

    pub fn set_timeout_hint_visible(&self, visible: bool) {
        *self.timeout_hint_visible.write() = visible;
    }

    pub fn is_timeout_hint_visible(&self) -> bool {
        *self.timeout_hint_visible.read()
    }

    /// Record the vehicle's current action. The emergency control is offered
    /// while landing is the next action, i.e. while airborne.
    pub fn set_last_action(&self, action: ActionKind) {
        *self.last_action.write() = action;
        *self.emergency_visible.write() = action == ActionKind::Land;
    }

    pub fn get_last_action(&self) -> ActionKind {
        *self.last_action.read()
    }

    pub fn is_emergency_visible(&self) -> bool {
        *self.emergency_visible.read()
    }

    pub fn set_motion_source_enabled(&self, enabled: bool) {
        *self.motion_source_enabled.write() = enabled;
    }

    pub fn is_motion_source_enabled(&self) -> bool {
        *self.motion_source_enabled.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emergency_follows_action() {
        let state = ControllerState::new();
        assert!(!state.is_emergency_visible());

        state.set_last_action(ActionKind::Land);
        assert!(state.is_emergency_visible());

        state.set_last_action(ActionKind::TakeOff);
        assert!(!state.is_emergency_visible());
        assert_eq!(state.get_last_action(), ActionKind::TakeOff);
    }

    #[test]
    fn test_status_description() {
        let status = ControllerStatus::Connecting {
            device_name: "Bebop".to_string(),
        };
        assert_eq!(status.describe(), "Connecting to Bebop...");
        assert_eq!(ControllerState::new().get_status(), ControllerStatus::Searching);
    }
}
