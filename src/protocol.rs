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

//! Companion message envelope and shared payload types.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Message types exchanged with the companion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "MOTION")]
    Motion,
    #[serde(rename = "ACTION")]
    Action,
    /// Anything this build does not understand.
    #[serde(other)]
    Unknown,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Motion => "MOTION",
            Self::Action => "ACTION",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Accelerometer sample streamed by the companion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionData {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl MotionData {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// All axes carry finite values.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Discrete vehicle action mirrored to the companion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ActionKind {
    #[default]
    None,
    TakeOff,
    Land,
    Jump,
}

impl ActionKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "NONE" => Some(Self::None),
            "TAKE_OFF" => Some(Self::TakeOff),
            "LAND" => Some(Self::Land),
            "JUMP" => Some(Self::Jump),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::TakeOff => "TAKE_OFF",
            Self::Land => "LAND",
            Self::Jump => "JUMP",
        }
    }
}

/// Protocol message structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "v")]
    pub version: u8,

    #[serde(rename = "t")]
    pub message_type: MessageType,

    /// Type-specific payload, empty when there is none.
    #[serde(rename = "p", default)]
    pub payload: String,

    /// Timestamp in milliseconds
    #[serde(rename = "ts")]
    pub timestamp: u64,

    /// Checksum (first 8 chars of SHA-256)
    #[serde(rename = "cs", default)]
    pub checksum: String,
}

impl Message {
    /// Create a signed message stamped with the current time.
    pub fn new(message_type: MessageType, payload: impl Into<String>) -> Self {
        let timestamp = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let mut msg = Self {
            version: PROTOCOL_VERSION,
            message_type,
            payload: payload.into(),
            timestamp,
            checksum: String::new(),
        };
        msg.sign();
        msg
    }

    /// Create a MOTION message carrying a sample.
    pub fn motion(data: &MotionData) -> Result<Self> {
        Ok(Self::new(MessageType::Motion, serde_json::to_string(data)?))
    }

    /// Create a MOTION message with no sample, meaning "stop".
    pub fn motion_stop() -> Self {
        Self::new(MessageType::Motion, "")
    }

    /// Create an ACTION request (companion to controller).
    pub fn action_request() -> Self {
        Self::new(MessageType::Action, "")
    }

    /// Create an ACTION announcement (controller to companion).
    pub fn action(kind: ActionKind) -> Self {
        Self::new(MessageType::Action, kind.as_str())
    }

    fn compute_checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(
            format!(
                "{}|{}|{}|{}",
                self.version,
                self.message_type.as_str(),
                self.payload,
                self.timestamp
            )
            .as_bytes(),
        );
        let digest = hex::encode(hasher.finalize());
        digest[..8].to_string()
    }

    /// Recompute the checksum after editing fields.
    pub fn sign(&mut self) {
        self.checksum = self.compute_checksum();
    }

    /// Verify the message checksum.
    pub fn verify(&self) -> bool {
        self.checksum == self.compute_checksum()
    }

    /// Decode the payload of a MOTION message.
    pub fn motion_payload(&self) -> Result<MotionData> {
        Ok(serde_json::from_str(&self.payload)?)
    }

    /// Serialize to JSON string with newline delimiter.
    pub fn to_json(&self) -> Result<String> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }

    /// Parse from JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let msg: Self = serde_json::from_str(json.trim())?;
        Ok(msg)
    }

    /// Parse from a raw frame.
    pub fn from_slice(frame: &[u8]) -> Result<Self> {
        Self::from_json(std::str::from_utf8(frame)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serialization() {
        let msg = Message::action(ActionKind::Land);
        let json = msg.to_json().unwrap();

        assert!(json.contains("\"v\":1"));
        assert!(json.contains("\"t\":\"ACTION\""));
        assert!(json.contains("\"p\":\"LAND\""));
        assert!(json.ends_with('\n'));

        let parsed = Message::from_json(&json).unwrap();
        assert_eq!(parsed.message_type, MessageType::Action);
        assert_eq!(parsed.payload, "LAND");
        assert!(parsed.verify());
    }

    #[test]
    fn test_unknown_type_parses() {
        let parsed = Message::from_json(r#"{"v":1,"t":"HEARTBEAT","p":"","ts":5,"cs":""}"#).unwrap();
        assert_eq!(parsed.message_type, MessageType::Unknown);
    }

    #[test]
    fn test_tampered_message_fails_verification() {
        let mut msg = Message::motion(&MotionData::new(0.1, -0.2, 9.8)).unwrap();
        assert!(msg.verify());

        msg.payload = r#"{"x":5.0,"y":5.0,"z":5.0}"#.to_string();
        assert!(!msg.verify());

        msg.sign();
        assert!(msg.verify());
    }

    #[test]
    fn test_motion_payload() {
        let msg = Message::motion(&MotionData::new(1.0, 2.0, 3.0)).unwrap();
        assert_eq!(msg.motion_payload().unwrap(), MotionData::new(1.0, 2.0, 3.0));
        assert!(Message::motion_stop().motion_payload().is_err());
    }

    #[test]
    fn test_action_kinds() {
        assert_eq!(ActionKind::parse("TAKE_OFF"), Some(ActionKind::TakeOff));
        assert_eq!(ActionKind::parse("land"), Some(ActionKind::Land));
        assert_eq!(ActionKind::parse(" JUMP "), Some(ActionKind::Jump));
        assert_eq!(ActionKind::parse("hover"), None);
        assert_eq!(ActionKind::default(), ActionKind::None);
    }

    #[test]
    fn test_motion_data_finite() {
        assert!(MotionData::new(0.0, 1.0, -1.0).is_finite());
        assert!(!MotionData::new(f32::NAN, 0.0, 0.0).is_finite());
        assert!(!MotionData::new(0.0, f32::INFINITY, 0.0).is_finite());
    }
}
