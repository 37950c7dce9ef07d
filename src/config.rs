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

//! Configuration module.
//!
//! Handles loading and saving controller settings.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

const APP_DIR: &str = "droneswear";

/// Controller configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Vehicle discovery settings.
    pub discovery: DiscoveryConfig,

    /// Companion transport settings.
    pub companion: CompanionConfig,

    /// Local control defaults.
    pub control: ControlConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// UDP port vehicles broadcast beacons on.
    pub port: u16,

    /// Seconds without a beacon before the timeout hint is raised.
    pub timeout_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: 44_444,
            timeout_secs: 10,
        }
    }
}

impl DiscoveryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanionConfig {
    /// TCP port companions connect to.
    pub listen_port: u16,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            listen_port: 45_700,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Whether companion motion drives the vehicle at startup.
    pub motion_source_enabled: bool,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            motion_source_enabled: true,
        }
    }
}

impl Config {
    /// Load configuration from the user config directory, creating it with
    /// defaults when missing, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);
        std::fs::create_dir_all(&config_dir)?;

        let mut config = Self::load_from(&config_dir.join("config.toml"))?;
        config.apply_env();
        Ok(config)
    }

    /// Load from `path`, writing defaults there if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            let config = Self::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Override ports from `DRONESWEAR_DISCOVERY_PORT` / `DRONESWEAR_COMPANION_PORT`.
    pub fn apply_env(&mut self) {
        if let Some(port) = env_port("DRONESWEAR_DISCOVERY_PORT") {
            self.discovery.port = port;
        }
        if let Some(port) = env_port("DRONESWEAR_COMPANION_PORT") {
            self.companion.listen_port = port;
        }
    }
}

fn env_port(name: &str) -> Option<u16> {
    let value = std::env::var(name).ok()?;
    match value.parse() {
        Ok(port) => Some(port),
        Err(_) => {
            warn!("Ignoring invalid {}: {}", name, value);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[discovery]\ntimeout_secs = 3\n\n[control]\nmotion_source_enabled = false\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.discovery.timeout(), Duration::from_secs(3));
        assert_eq!(config.discovery.port, 44_444);
        assert_eq!(config.companion.listen_port, 45_700);
        assert!(!config.control.motion_source_enabled);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[discovery]\nport = \"fast\"\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_zero_timeout_is_clamped() {
        let discovery = DiscoveryConfig {
            port: 1,
            timeout_secs: 0,
        };
        assert_eq!(discovery.timeout(), Duration::from_secs(1));
    }
}
