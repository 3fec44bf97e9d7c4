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

//! Scripted backend with a fixed topology and fixed samples.
//!
//! Used by the test suite and by `--backend mock` to exercise the collector on
//! hosts without NVIDIA hardware.

use crate::device::error::{DcgmError, DcgmResult};
use crate::device::fields::*;
use crate::device::traits::{EntityTopology, FieldSampler, FieldWatcher, WatchGuard};
use crate::device::types::{
    DeviceInfo, EntityGroup, FieldValue, GpuInstanceInfo, MonitoredEntity, SystemInfo,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Failure injected for one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Sampling,
    ConnectionLost,
}

#[derive(Debug, Default)]
pub struct MockBackend {
    entities: Vec<MonitoredEntity>,
    values: HashMap<(EntityGroup, u32), Vec<FieldValue>>,
    link_values: HashMap<(u32, u32), Vec<FieldValue>>,
    failures: HashMap<(EntityGroup, u32), MockFailure>,
    active_watches: Arc<AtomicUsize>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity: MonitoredEntity) -> Self {
        self.entities.push(entity);
        self
    }

    /// Values are returned in insertion order, filtered to the requested fields.
    pub fn with_values(mut self, group: EntityGroup, id: u32, values: Vec<FieldValue>) -> Self {
        self.values.entry((group, id)).or_default().extend(values);
        self
    }

    pub fn with_link_values(
        mut self,
        link_id: u32,
        parent_id: u32,
        values: Vec<FieldValue>,
    ) -> Self {
        self.link_values
            .entry((link_id, parent_id))
            .or_default()
            .extend(values);
        self
    }

    pub fn with_failure(mut self, group: EntityGroup, id: u32, failure: MockFailure) -> Self {
        self.failures.insert((group, id), failure);
        self
    }

    /// Number of watches handed out and not yet released.
    pub fn active_watches(&self) -> usize {
        self.active_watches.load(Ordering::SeqCst)
    }

    /// Shared counter behind [`MockBackend::active_watches`], readable after
    /// the backend has been moved into a collector.
    pub fn watch_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.active_watches)
    }

    /// One whole GPU and one GPU split into `3g.20gb` and `4g.20gb` instances.
    pub fn demo() -> Self {
        let model = "NVIDIA A100-SXM4-40GB";
        let gpu1 = DeviceInfo {
            gpu: 1,
            uuid: "GPU-5c3a1b2e-0000-4000-8000-000000000001".to_string(),
            model: model.to_string(),
        };
        let instance = |profile: &str, nvml_id: u32, entity_id: u32| GpuInstanceInfo {
            profile_name: profile.to_string(),
            nvml_instance_id: nvml_id,
            entity_id,
        };

        let mut backend = Self::new()
            .with_entity(MonitoredEntity::gpu(
                0,
                "GPU-5c3a1b2e-0000-4000-8000-000000000000",
                model,
            ))
            .with_entity(MonitoredEntity::mig_instance(
                gpu1.clone(),
                7,
                instance("3g.20gb", 1, 7),
            ))
            .with_entity(MonitoredEntity::mig_instance(
                gpu1,
                8,
                instance("4g.20gb", 2, 8),
            ));

        for (group, id, power) in [
            (EntityGroup::Gpu, 0, 143.5),
            (EntityGroup::GpuInstance, 7, 200.0),
            (EntityGroup::GpuInstance, 8, 200.0),
        ] {
            backend = backend.with_values(
                group,
                id,
                vec![
                    FieldValue::string(DCGM_FI_DRIVER_VERSION, "550.54.15"),
                    FieldValue::int64(DCGM_FI_DEV_SM_CLOCK, 1410),
                    FieldValue::int64(DCGM_FI_DEV_GPU_TEMP, 41),
                    FieldValue::double(DCGM_FI_DEV_POWER_USAGE, power),
                    FieldValue::int64(DCGM_FI_DEV_FB_USED, 4096),
                ],
            );
        }

        let util = |tensor: f64, dram: f64| {
            vec![
                FieldValue::double(DCGM_FI_PROF_PIPE_TENSOR_ACTIVE, tensor),
                FieldValue::double(DCGM_FI_PROF_DRAM_ACTIVE, dram),
                FieldValue::double(DCGM_FI_PROF_PIPE_FP64_ACTIVE, DCGM_FT_FP64_NOT_SUPPORTED),
                FieldValue::double(DCGM_FI_PROF_PIPE_FP32_ACTIVE, 0.0),
                FieldValue::double(DCGM_FI_PROF_PIPE_FP16_ACTIVE, 0.0),
            ]
        };
        backend
            .with_values(EntityGroup::GpuInstance, 7, util(0.5, 0.2))
            .with_values(EntityGroup::GpuInstance, 8, util(0.1, 0.05))
    }

    fn check_failure(&self, group: EntityGroup, id: u32) -> DcgmResult<()> {
        match self.failures.get(&(group, id)) {
            None => Ok(()),
            Some(MockFailure::Sampling) => Err(DcgmError::Sampling(format!(
                "injected failure for {group} {id}"
            ))),
            Some(MockFailure::ConnectionLost) => Err(DcgmError::ConnectionNotValid(
                "injected connection loss".to_string(),
            )),
        }
    }
}

fn select(values: Option<&Vec<FieldValue>>, fields: &[FieldId]) -> Vec<FieldValue> {
    values
        .map(|vals| {
            vals.iter()
                .filter(|v| fields.contains(&v.field_id))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

impl EntityTopology for MockBackend {
    fn monitored_entities(&self, group: EntityGroup) -> DcgmResult<Vec<MonitoredEntity>> {
        Ok(self
            .entities
            .iter()
            .filter(|e| {
                e.entity.group == group
                    || (group == EntityGroup::Gpu && e.entity.group == EntityGroup::GpuInstance)
            })
            .cloned()
            .collect())
    }
}

impl FieldSampler for MockBackend {
    fn entity_latest_values(
        &self,
        group: EntityGroup,
        entity_id: u32,
        fields: &[FieldId],
    ) -> DcgmResult<Vec<FieldValue>> {
        self.check_failure(group, entity_id)?;
        Ok(select(self.values.get(&(group, entity_id)), fields))
    }

    fn link_latest_values(
        &self,
        link_id: u32,
        parent_id: u32,
        fields: &[FieldId],
    ) -> DcgmResult<Vec<FieldValue>> {
        self.check_failure(EntityGroup::Link, link_id)?;
        Ok(select(self.link_values.get(&(link_id, parent_id)), fields))
    }
}

impl FieldWatcher for MockBackend {
    fn watch_fields(
        &self,
        fields: &[FieldId],
        _system_info: &SystemInfo,
        _update_freq_us: i64,
    ) -> DcgmResult<Vec<WatchGuard>> {
        if fields.is_empty() {
            return Err(DcgmError::Watch("empty field list".to_string()));
        }
        self.active_watches.fetch_add(1, Ordering::SeqCst);
        let counter = Arc::clone(&self.active_watches);
        Ok(vec![WatchGuard::new(move || {
            counter.fetch_sub(1, Ordering::SeqCst);
        })])
    }
}
