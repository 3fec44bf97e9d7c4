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

use crate::device::error::DcgmResult;
use crate::device::fields::FieldId;
use crate::device::types::{EntityGroup, FieldValue, MonitoredEntity, SystemInfo};

/// Enumerates the entities currently present for an entity group.
pub trait EntityTopology: Send {
    fn monitored_entities(&self, group: EntityGroup) -> DcgmResult<Vec<MonitoredEntity>>;
}

/// Returns the latest cached values for a set of fields.
pub trait FieldSampler: Send {
    fn entity_latest_values(
        &self,
        group: EntityGroup,
        entity_id: u32,
        fields: &[FieldId],
    ) -> DcgmResult<Vec<FieldValue>>;

    fn link_latest_values(
        &self,
        link_id: u32,
        parent_id: u32,
        fields: &[FieldId],
    ) -> DcgmResult<Vec<FieldValue>>;
}

/// Subscribes the backend to periodic updates of a field list.
pub trait FieldWatcher: Send {
    fn watch_fields(
        &self,
        fields: &[FieldId],
        system_info: &SystemInfo,
        update_freq_us: i64,
    ) -> DcgmResult<Vec<WatchGuard>>;
}

pub trait DcgmBackend: EntityTopology + FieldSampler + FieldWatcher {}

impl<T: EntityTopology + FieldSampler + FieldWatcher> DcgmBackend for T {}

/// Releases a field-watch subscription when dropped.
pub struct WatchGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl WatchGuard {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A guard with nothing to release, for backends that sample on demand.
    pub fn noop() -> Self {
        Self { release: None }
    }
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for WatchGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchGuard")
            .field("armed", &self.release.is_some())
            .finish()
    }
}
