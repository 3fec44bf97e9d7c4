// Copyright 2025 Lablup Inc. and Jeongkyu Shin
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

use crate::device::types::EntityGroup;
use serde::Deserialize;
use std::path::PathBuf;

/// Application-wide constants
pub struct AppConfig;

impl AppConfig {
    // Collection
    pub const DEFAULT_COLLECT_INTERVAL_MS: u64 = 30_000;
    pub const MIN_COLLECT_INTERVAL_MS: u64 = 100;

    // Environment
    pub const NODE_NAME_ENV: &'static str = "NODE_NAME";
    pub const LOG_FILTER_DEFAULT: &'static str = "mig_power_exporter=info";
}

/// Where samples come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Local GPUs through NVML.
    #[default]
    Nvml,
    /// A fixed two-GPU topology with one GPU split into MIG instances.
    Mock,
}

/// Collector settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Counter definitions; the built-in set is used when unset.
    pub collectors_file: Option<PathBuf>,
    pub collect_interval_ms: u64,
    /// Emit the UUID label as `uuid` instead of `UUID`.
    pub use_old_namespace: bool,
    pub replace_blanks_in_model_name: bool,
    /// Leave the hostname label empty.
    pub no_hostname: bool,
    pub entity_type: EntityGroup,
    pub backend: BackendKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            collectors_file: None,
            collect_interval_ms: AppConfig::DEFAULT_COLLECT_INTERVAL_MS,
            use_old_namespace: false,
            replace_blanks_in_model_name: false,
            no_hostname: false,
            entity_type: EntityGroup::Gpu,
            backend: BackendKind::default(),
        }
    }
}

impl Config {
    /// The collection interval, raised to the supported minimum.
    pub fn collect_interval_ms(&self) -> u64 {
        self.collect_interval_ms
            .max(AppConfig::MIN_COLLECT_INTERVAL_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.collect_interval_ms, 30_000);
        assert_eq!(config.entity_type, EntityGroup::Gpu);
        assert_eq!(config.backend, BackendKind::Nvml);
        assert!(config.collectors_file.is_none());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: Config = serde_json::from_str(
            r#"{"collect_interval_ms": 5000, "use_old_namespace": true, "backend": "mock"}"#,
        )
        .unwrap();
        assert_eq!(config.collect_interval_ms, 5000);
        assert!(config.use_old_namespace);
        assert_eq!(config.backend, BackendKind::Mock);
        assert!(!config.no_hostname);
    }

    #[test]
    fn test_interval_floor() {
        let config = Config {
            collect_interval_ms: 1,
            ..Config::default()
        };
        assert_eq!(config.collect_interval_ms(), AppConfig::MIN_COLLECT_INTERVAL_MS);
    }
}
