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

//! Local control input read from stdin.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;

use crate::coordinator::Coordinator;

/// Actions the operator can trigger locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    SetMotionSource(bool),
    ToggleMotionSource,
    Emergency,
    Status,
    Quit,
}

impl ControlAction {
    /// Parse one console line.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.to_lowercase();
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            ["motion", "on"] => Some(Self::SetMotionSource(true)),
            ["motion", "off"] => Some(Self::SetMotionSource(false)),
            ["motion"] | ["motion", "toggle"] => Some(Self::ToggleMotionSource),
            ["emergency"] | ["e"] => Some(Self::Emergency),
            ["status"] | ["s"] => Some(Self::Status),
            ["quit"] | ["q"] | ["exit"] => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Start reading control actions from stdin.
pub fn run_console() -> mpsc::UnboundedReceiver<ControlAction> {
    let (action_tx, action_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match ControlAction::parse(&line) {
                Some(action) => {
                    if action_tx.send(action).is_err() {
                        break;
                    }
                }
                None => warn!("Unknown command: {}", line.trim()),
            }
        }
    });

    action_rx
}

/// One-line summary for the `status` command.
pub fn status_line(coordinator: &Coordinator) -> String {
    let state = coordinator.state();
    let mut peers = Vec::new();
    coordinator
        .peers()
        .for_each(|peer| peers.push(peer.to_string()));

    format!(
        "{} | phase {:?} | motion {} | last action {} | emergency {} | peers [{}]",
        state.get_status().describe(),
        coordinator.phase(),
        if coordinator.motion_source_enabled() { "on" } else { "off" },
        state.get_last_action().as_str(),
        if state.is_emergency_visible() { "available" } else { "hidden" },
        peers.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_control_actions() {
        assert_eq!(
            ControlAction::parse("motion on"),
            Some(ControlAction::SetMotionSource(true))
        );
        assert_eq!(
            ControlAction::parse("  MOTION   OFF "),
            Some(ControlAction::SetMotionSource(false))
        );
        assert_eq!(
            ControlAction::parse("motion"),
            Some(ControlAction::ToggleMotionSource)
        );
        assert_eq!(ControlAction::parse("e"), Some(ControlAction::Emergency));
        assert_eq!(ControlAction::parse("status"), Some(ControlAction::Status));
        assert_eq!(ControlAction::parse("q"), Some(ControlAction::Quit));
        assert_eq!(ControlAction::parse("fly"), None);
        assert_eq!(ControlAction::parse(""), None);
    }
}
