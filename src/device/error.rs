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

use thiserror::Error;

/// Errors reported by a monitoring backend.
#[derive(Debug, Error)]
pub enum DcgmError {
    /// The connection to the monitoring subsystem is gone. Nothing sampled
    /// after this point can be trusted.
    #[error("Connection to the monitoring subsystem is not valid: {0}")]
    ConnectionNotValid(String),

    #[error("Entity {group}:{id} not found")]
    EntityNotFound { group: String, id: u32 },

    #[error("Failed to watch fields: {0}")]
    Watch(String),

    #[error("Sampling failed: {0}")]
    Sampling(String),
}

pub type DcgmResult<T> = Result<T, DcgmError>;

impl DcgmError {
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, DcgmError::ConnectionNotValid(_))
    }
}
