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

//! DCGM field identifiers, blank-value sentinels and the known-field table.
//!
//! Identifiers follow the numbering of the DCGM field catalogue so that
//! counter files written for dcgm-exporter load unchanged.

use crate::device::types::EntityGroup;

pub type FieldId = u16;

pub const DCGM_FI_DRIVER_VERSION: FieldId = 1;
pub const DCGM_FI_DEV_NAME: FieldId = 50;
pub const DCGM_FI_DEV_SERIAL: FieldId = 53;
pub const DCGM_FI_DEV_UUID: FieldId = 54;
pub const DCGM_FI_DEV_SM_CLOCK: FieldId = 100;
pub const DCGM_FI_DEV_MEM_CLOCK: FieldId = 101;
pub const DCGM_FI_DEV_MEMORY_TEMP: FieldId = 140;
pub const DCGM_FI_DEV_GPU_TEMP: FieldId = 150;
pub const DCGM_FI_DEV_POWER_USAGE: FieldId = 155;
pub const DCGM_FI_DEV_TOTAL_ENERGY_CONSUMPTION: FieldId = 156;
pub const DCGM_FI_DEV_GPU_UTIL: FieldId = 203;
pub const DCGM_FI_DEV_MEM_COPY_UTIL: FieldId = 204;
pub const DCGM_FI_DEV_FB_TOTAL: FieldId = 250;
pub const DCGM_FI_DEV_FB_FREE: FieldId = 251;
pub const DCGM_FI_DEV_FB_USED: FieldId = 252;
pub const DCGM_FI_DEV_NVSWITCH_LINK_THROUGHPUT_TX: FieldId = 780;
pub const DCGM_FI_DEV_NVSWITCH_LINK_THROUGHPUT_RX: FieldId = 781;
pub const DCGM_FI_PROF_GR_ENGINE_ACTIVE: FieldId = 1001;
pub const DCGM_FI_PROF_SM_ACTIVE: FieldId = 1002;
pub const DCGM_FI_PROF_PIPE_TENSOR_ACTIVE: FieldId = 1004;
pub const DCGM_FI_PROF_DRAM_ACTIVE: FieldId = 1005;
pub const DCGM_FI_PROF_PIPE_FP64_ACTIVE: FieldId = 1006;
pub const DCGM_FI_PROF_PIPE_FP32_ACTIVE: FieldId = 1007;
pub const DCGM_FI_PROF_PIPE_FP16_ACTIVE: FieldId = 1008;
pub const DCGM_FI_DEV_CPU_UTIL_TOTAL: FieldId = 1100;
pub const DCGM_FI_DEV_CPU_UTIL_USER: FieldId = 1101;
pub const DCGM_FI_DEV_CPU_UTIL_NICE: FieldId = 1102;
pub const DCGM_FI_DEV_CPU_UTIL_SYS: FieldId = 1103;
pub const DCGM_FI_DEV_CPU_UTIL_IRQ: FieldId = 1104;
pub const DCGM_FI_DEV_CPU_TEMP_CURRENT: FieldId = 1110;
pub const DCGM_FI_DEV_CPU_CLOCK_CURRENT: FieldId = 1120;
pub const DCGM_FI_DEV_CPU_POWER_UTIL_CURRENT: FieldId = 1130;
pub const DCGM_FI_DEV_CPU_VENDOR: FieldId = 1140;
pub const DCGM_FI_DEV_CPU_MODEL: FieldId = 1141;

/// The five profiling fields sampled for every MIG instance, in the order
/// tensor, DRAM, FP64, FP32, FP16.
pub const MIG_RESOURCE_FIELDS: [FieldId; 5] = [
    DCGM_FI_PROF_PIPE_TENSOR_ACTIVE,
    DCGM_FI_PROF_DRAM_ACTIVE,
    DCGM_FI_PROF_PIPE_FP64_ACTIVE,
    DCGM_FI_PROF_PIPE_FP32_ACTIVE,
    DCGM_FI_PROF_PIPE_FP16_ACTIVE,
];

// Blank sentinels. Each family is BLANK, NOT_FOUND, NOT_SUPPORTED, NOT_PERMISSIONED.
pub const DCGM_FT_INT32_BLANK: i64 = 0x7fff_fff0;
pub const DCGM_FT_INT32_NOT_FOUND: i64 = DCGM_FT_INT32_BLANK + 1;
pub const DCGM_FT_INT32_NOT_SUPPORTED: i64 = DCGM_FT_INT32_BLANK + 2;
pub const DCGM_FT_INT32_NOT_PERMISSIONED: i64 = DCGM_FT_INT32_BLANK + 3;

pub const DCGM_FT_INT64_BLANK: i64 = 0x7fff_ffff_ffff_fff0;
pub const DCGM_FT_INT64_NOT_FOUND: i64 = DCGM_FT_INT64_BLANK + 1;
pub const DCGM_FT_INT64_NOT_SUPPORTED: i64 = DCGM_FT_INT64_BLANK + 2;
pub const DCGM_FT_INT64_NOT_PERMISSIONED: i64 = DCGM_FT_INT64_BLANK + 3;

pub const DCGM_FT_FP64_BLANK: f64 = 140_737_488_355_328.0;
pub const DCGM_FT_FP64_NOT_FOUND: f64 = DCGM_FT_FP64_BLANK + 1.0;
pub const DCGM_FT_FP64_NOT_SUPPORTED: f64 = DCGM_FT_FP64_BLANK + 2.0;
pub const DCGM_FT_FP64_NOT_PERMISSIONED: f64 = DCGM_FT_FP64_BLANK + 3.0;

pub const DCGM_FT_STR_BLANK: &str = "<<<NULL>>>";
pub const DCGM_FT_STR_NOT_FOUND: &str = "<<<NOT_FOUND>>>";
pub const DCGM_FT_STR_NOT_SUPPORTED: &str = "<<<NOT_SUPPORTED>>>";
pub const DCGM_FT_STR_NOT_PERMISSIONED: &str = "<<<NOT_PERM>>>";

pub const INT_BLANK_SENTINELS: [i64; 8] = [
    DCGM_FT_INT32_BLANK,
    DCGM_FT_INT32_NOT_FOUND,
    DCGM_FT_INT32_NOT_SUPPORTED,
    DCGM_FT_INT32_NOT_PERMISSIONED,
    DCGM_FT_INT64_BLANK,
    DCGM_FT_INT64_NOT_FOUND,
    DCGM_FT_INT64_NOT_SUPPORTED,
    DCGM_FT_INT64_NOT_PERMISSIONED,
];

pub const FP64_BLANK_SENTINELS: [f64; 4] = [
    DCGM_FT_FP64_BLANK,
    DCGM_FT_FP64_NOT_FOUND,
    DCGM_FT_FP64_NOT_SUPPORTED,
    DCGM_FT_FP64_NOT_PERMISSIONED,
];

pub const STR_BLANK_SENTINELS: [&str; 4] = [
    DCGM_FT_STR_BLANK,
    DCGM_FT_STR_NOT_FOUND,
    DCGM_FT_STR_NOT_SUPPORTED,
    DCGM_FT_STR_NOT_PERMISSIONED,
];

/// Which kind of entity a field is reported for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldScope {
    /// Host-wide values such as the driver version; attached to every entity.
    Global,
    Gpu,
    Switch,
    Link,
    Cpu,
}

impl FieldScope {
    pub fn applies_to(self, group: EntityGroup) -> bool {
        match self {
            FieldScope::Global => true,
            FieldScope::Gpu => matches!(group, EntityGroup::Gpu | EntityGroup::GpuInstance),
            FieldScope::Switch => group == EntityGroup::Switch,
            FieldScope::Link => matches!(group, EntityGroup::Switch | EntityGroup::Link),
            FieldScope::Cpu => matches!(group, EntityGroup::Cpu | EntityGroup::CpuCore),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldMeta {
    pub id: FieldId,
    pub name: &'static str,
    pub scope: FieldScope,
}

macro_rules! field {
    ($name:ident, $scope:ident) => {
        FieldMeta {
            id: $name,
            name: stringify!($name),
            scope: FieldScope::$scope,
        }
    };
}

pub const KNOWN_FIELDS: &[FieldMeta] = &[
    field!(DCGM_FI_DRIVER_VERSION, Global),
    field!(DCGM_FI_DEV_NAME, Gpu),
    field!(DCGM_FI_DEV_SERIAL, Gpu),
    field!(DCGM_FI_DEV_UUID, Gpu),
    field!(DCGM_FI_DEV_SM_CLOCK, Gpu),
    field!(DCGM_FI_DEV_MEM_CLOCK, Gpu),
    field!(DCGM_FI_DEV_MEMORY_TEMP, Gpu),
    field!(DCGM_FI_DEV_GPU_TEMP, Gpu),
    field!(DCGM_FI_DEV_POWER_USAGE, Gpu),
    field!(DCGM_FI_DEV_TOTAL_ENERGY_CONSUMPTION, Gpu),
    field!(DCGM_FI_DEV_GPU_UTIL, Gpu),
    field!(DCGM_FI_DEV_MEM_COPY_UTIL, Gpu),
    field!(DCGM_FI_DEV_FB_TOTAL, Gpu),
    field!(DCGM_FI_DEV_FB_FREE, Gpu),
    field!(DCGM_FI_DEV_FB_USED, Gpu),
    field!(DCGM_FI_DEV_NVSWITCH_LINK_THROUGHPUT_TX, Link),
    field!(DCGM_FI_DEV_NVSWITCH_LINK_THROUGHPUT_RX, Link),
    field!(DCGM_FI_PROF_GR_ENGINE_ACTIVE, Gpu),
    field!(DCGM_FI_PROF_SM_ACTIVE, Gpu),
    field!(DCGM_FI_PROF_PIPE_TENSOR_ACTIVE, Gpu),
    field!(DCGM_FI_PROF_DRAM_ACTIVE, Gpu),
    field!(DCGM_FI_PROF_PIPE_FP64_ACTIVE, Gpu),
    field!(DCGM_FI_PROF_PIPE_FP32_ACTIVE, Gpu),
    field!(DCGM_FI_PROF_PIPE_FP16_ACTIVE, Gpu),
    field!(DCGM_FI_DEV_CPU_UTIL_TOTAL, Cpu),
    field!(DCGM_FI_DEV_CPU_UTIL_USER, Cpu),
    field!(DCGM_FI_DEV_CPU_UTIL_NICE, Cpu),
    field!(DCGM_FI_DEV_CPU_UTIL_SYS, Cpu),
    field!(DCGM_FI_DEV_CPU_UTIL_IRQ, Cpu),
    field!(DCGM_FI_DEV_CPU_TEMP_CURRENT, Cpu),
    field!(DCGM_FI_DEV_CPU_CLOCK_CURRENT, Cpu),
    field!(DCGM_FI_DEV_CPU_POWER_UTIL_CURRENT, Cpu),
    field!(DCGM_FI_DEV_CPU_VENDOR, Cpu),
    field!(DCGM_FI_DEV_CPU_MODEL, Cpu),
];

pub fn field_by_name(name: &str) -> Option<&'static FieldMeta> {
    KNOWN_FIELDS.iter().find(|f| f.name == name)
}

pub fn field_by_id(id: FieldId) -> Option<&'static FieldMeta> {
    KNOWN_FIELDS.iter().find(|f| f.id == id)
}
