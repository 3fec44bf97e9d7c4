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

//! Monitoring backends: entity topology, field sampling and field watches.

pub mod error;
pub mod fields;
pub mod readers;
pub mod traits;
pub mod types;

pub use error::{DcgmError, DcgmResult};
pub use traits::{DcgmBackend, EntityTopology, FieldSampler, FieldWatcher, WatchGuard};
pub use types::{
    DeviceInfo, EntityGroup, FieldEntityGroupSystemInfo, FieldValue, GpuInstanceInfo,
    GroupEntityPair, MonitoredEntity, SampleValue, SystemInfo,
};

use crate::common::config::BackendKind;
use tracing::info;

/// Create the backend selected in the configuration.
pub fn create_backend(kind: BackendKind) -> DcgmResult<Box<dyn DcgmBackend>> {
    match kind {
        BackendKind::Nvml => {
            let backend = readers::nvml::NvmlBackend::new()?;
            info!("Using NVML backend");
            Ok(Box::new(backend))
        }
        BackendKind::Mock => {
            info!("Using mock backend");
            Ok(Box::new(readers::mock::MockBackend::demo()))
        }
    }
}
