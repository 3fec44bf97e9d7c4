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

//! Error types for the collector library.
//!
//! Errors fall in three tiers. Per-sample problems (an unconfigured field, an
//! unparsable value) are absorbed where they happen and never reach this type
//! through a collection cycle. Ordinary sampling failures abort the current
//! cycle. Loss of the monitoring connection is fatal; see [`Error::is_fatal`].

use crate::device::fields::FieldId;
use crate::device::DcgmError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The collector was constructed without any fields to sample.
    #[error("Field entity group system info is empty")]
    EmptySystemInfo,

    /// No configured counter matches a sampled field.
    #[error("Could not find counter corresponding to field ID '{0}'")]
    CounterNotFound(FieldId),

    /// A counter definition could not be parsed.
    #[error("Invalid counter definition at line {line}: {reason}")]
    InvalidCounter { line: usize, reason: String },

    /// A MIG profile name does not start with a slice count between 1 and 7.
    #[error("Invalid MIG profile '{0}': expected a leading slice count between 1 and 7")]
    InvalidMigProfile(String),

    /// A sampling call failed; the current cycle is aborted.
    #[error("Could not retrieve metrics: {0}")]
    Sampling(#[source] DcgmError),

    /// The monitoring connection is gone; the process should terminate.
    #[error("Lost connection to the monitoring subsystem: {0}")]
    ConnectionLost(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the process must stop instead of retrying on the next cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ConnectionLost(_))
    }
}

impl From<DcgmError> for Error {
    fn from(err: DcgmError) -> Self {
        match err {
            DcgmError::ConnectionNotValid(msg) => Error::ConnectionLost(msg),
            other => Error::Sampling(other),
        }
    }
}
