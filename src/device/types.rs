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

use crate::device::fields::FieldId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// DCGM entity group. Discriminants match `dcgm_field_entity_group_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum EntityGroup {
    Gpu = 1,
    Vgpu = 2,
    Switch = 3,
    GpuInstance = 4,
    ComputeInstance = 5,
    Link = 6,
    Cpu = 7,
    CpuCore = 8,
}

impl fmt::Display for EntityGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityGroup::Gpu => "GPU",
            EntityGroup::Vgpu => "vGPU",
            EntityGroup::Switch => "NvSwitch",
            EntityGroup::GpuInstance => "GPU instance",
            EntityGroup::ComputeInstance => "compute instance",
            EntityGroup::Link => "NvLink",
            EntityGroup::Cpu => "CPU",
            EntityGroup::CpuCore => "CPU core",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct GroupEntityPair {
    pub group: EntityGroup,
    pub id: u32,
}

/// Identifiers of the physical GPU an entity belongs to.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub gpu: u32,
    pub uuid: String,
    pub model: String,
}

/// MIG partition metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GpuInstanceInfo {
    /// Profile name such as `3g.20gb`; the leading digit is the slice count.
    pub profile_name: String,
    pub nvml_instance_id: u32,
    pub entity_id: u32,
}

/// One addressable thing to sample during a collection cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitoredEntity {
    pub entity: GroupEntityPair,
    pub parent_id: u32,
    pub device_info: DeviceInfo,
    pub instance_info: Option<GpuInstanceInfo>,
}

impl MonitoredEntity {
    pub fn gpu(index: u32, uuid: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            entity: GroupEntityPair {
                group: EntityGroup::Gpu,
                id: index,
            },
            parent_id: 0,
            device_info: DeviceInfo {
                gpu: index,
                uuid: uuid.into(),
                model: model.into(),
            },
            instance_info: None,
        }
    }

    pub fn mig_instance(parent: DeviceInfo, entity_id: u32, info: GpuInstanceInfo) -> Self {
        Self {
            entity: GroupEntityPair {
                group: EntityGroup::GpuInstance,
                id: entity_id,
            },
            parent_id: parent.gpu,
            device_info: parent,
            instance_info: Some(info),
        }
    }

    /// Switches, links, CPUs and CPU cores carry no device metadata.
    pub fn child(group: EntityGroup, id: u32, parent_id: u32) -> Self {
        Self {
            entity: GroupEntityPair { group, id },
            parent_id,
            device_info: DeviceInfo::default(),
            instance_info: None,
        }
    }

    pub fn is_mig(&self) -> bool {
        self.instance_info.is_some()
    }
}

/// Raw payload of a sampled field.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleValue {
    Int64(i64),
    Double(f64),
    String(String),
    Timestamp(i64),
    Binary(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue {
    pub field_id: FieldId,
    pub value: SampleValue,
}

impl FieldValue {
    pub fn int64(field_id: FieldId, v: i64) -> Self {
        Self {
            field_id,
            value: SampleValue::Int64(v),
        }
    }

    pub fn double(field_id: FieldId, v: f64) -> Self {
        Self {
            field_id,
            value: SampleValue::Double(v),
        }
    }

    pub fn string(field_id: FieldId, v: impl Into<String>) -> Self {
        Self {
            field_id,
            value: SampleValue::String(v.into()),
        }
    }
}

/// The entity group a collector instance is responsible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SystemInfo {
    pub info_type: EntityGroup,
}

/// Field list and system info pair handed to a collector at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldEntityGroupSystemInfo {
    pub system_info: SystemInfo,
    pub device_fields: Vec<FieldId>,
}

impl FieldEntityGroupSystemInfo {
    pub fn is_empty(&self) -> bool {
        self.device_fields.is_empty()
    }
}
