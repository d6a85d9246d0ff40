/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use std::path::Path;
use std::time::Duration;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Configuration for Courier transports.
///
/// Loaded from TOML in XDG-compliant directories; every field has a default, so a
/// partial file only overrides what it names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    /// Timeout configuration
    pub timeouts: TimeoutConfig,
    /// Limits and capacity configuration
    pub limits: LimitsConfig,
}

/// Timeout-related configuration values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// How long a request/response call waits for its response, in milliseconds
    pub call_timeout_ms: u64,
    /// How long the TCP network waits to connect to a peer, in milliseconds
    pub connect_timeout_ms: u64,
}

/// Limits and capacity configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest frame accepted from the network, in bytes
    pub max_frame_size: usize,
    /// Capacity of the channel between a network and its transport's router
    pub inbound_queue_capacity: usize,
    /// Capacity of each per-peer outbound connection queue
    pub outbound_queue_capacity: usize,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 30_000,
            connect_timeout_ms: 5_000,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024,
            inbound_queue_capacity: 1024,
            outbound_queue_capacity: 1024,
        }
    }
}

impl CourierConfig {
    /// Call timeout as a `Duration`.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.call_timeout_ms)
    }

    /// Connect timeout as a `Duration`.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.connect_timeout_ms)
    }

    /// Returns a copy with a different call timeout.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.call_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Load configuration from XDG-compliant locations
    ///
    /// Looks for `courier/config.toml` under `$XDG_CONFIG_HOME` and then the XDG
    /// config search path. A missing file yields the defaults; an unreadable or
    /// malformed one is logged and also yields the defaults.
    pub fn load() -> Self {
        let xdg_dirs = match xdg::BaseDirectories::with_prefix("courier") {
            Ok(dirs) => dirs,
            Err(e) => {
                error!("Failed to initialize XDG directories: {}", e);
                return Self::default();
            }
        };

        match xdg_dirs.find_config_file("config.toml") {
            Some(path) => Self::load_from(&path),
            None => {
                info!("No configuration file found, using defaults");
                Self::default()
            }
        }
    }

    /// Load configuration from an explicit file, falling back to defaults on error.
    pub fn load_from(path: &Path) -> Self {
        info!("Loading configuration from: {}", path.display());
        match std::fs::read_to_string(path) {
            Ok(config_str) => match toml::from_str::<Self>(&config_str) {
                Ok(config) => {
                    info!("Successfully loaded configuration");
                    config
                }
                Err(e) => {
                    error!("Failed to parse configuration file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                error!("Failed to read configuration file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

lazy_static! {
    /// Global configuration instance loaded from XDG-compliant locations
    pub static ref CONFIG: CourierConfig = CourierConfig::load();
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = CourierConfig::default();
        assert_eq!(config.call_timeout(), Duration::from_secs(30));
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.limits.max_frame_size, 16 * 1024 * 1024);
    }

    #[test]
    fn test_partial_file_overrides_only_named_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[timeouts]\ncall_timeout_ms = 250\n").unwrap();

        let config = CourierConfig::load_from(file.path());
        assert_eq!(config.call_timeout(), Duration::from_millis(250));
        assert_eq!(config.timeouts.connect_timeout_ms, 5_000);
        assert_eq!(config.limits, LimitsConfig::default());
    }

    #[test]
    fn test_malformed_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[timeouts\ncall_timeout_ms = \"soon\"").unwrap();

        assert_eq!(CourierConfig::load_from(file.path()), CourierConfig::default());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = CourierConfig::load_from(Path::new("/nonexistent/courier/config.toml"));
        assert_eq!(config, CourierConfig::default());
    }

    #[test]
    fn test_with_call_timeout() {
        let config = CourierConfig::default().with_call_timeout(Duration::from_millis(40));
        assert_eq!(config.timeouts.call_timeout_ms, 40);
    }
}
