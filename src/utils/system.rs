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

use crate::common::config::{AppConfig, Config};
use std::io;

/// Hostname label value: empty when disabled, otherwise `NODE_NAME` when set,
/// otherwise the system hostname.
pub fn get_hostname(config: &Config) -> io::Result<String> {
    if config.no_hostname {
        return Ok(String::new());
    }
    if let Ok(node_name) = std::env::var(AppConfig::NODE_NAME_ENV) {
        if !node_name.is_empty() {
            return Ok(node_name);
        }
    }
    whoami::fallible::hostname()
}
