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

//! NVML-backed implementation of the monitoring traits.
//!
//! Whole GPUs and MIG instances are enumerated through NVML. A GPU with MIG
//! enabled is represented by its instances only. The MIG profiling fields
//! come from GPM (Hopper and newer), measured over a short window between two
//! samples. Fields NVML cannot answer are reported with the DCGM blank
//! sentinels so the normalizer drops them.

use crate::device::error::{DcgmError, DcgmResult};
use crate::device::fields::*;
use crate::device::traits::{EntityTopology, FieldSampler, FieldWatcher, WatchGuard};
use crate::device::types::{
    DeviceInfo, EntityGroup, FieldValue, GpuInstanceInfo, MonitoredEntity, SampleValue,
    SystemInfo,
};
use nvml_wrapper::enum_wrappers::device::{Clock, TemperatureSensor};
use nvml_wrapper::enums::gpm::GpmMetricId;
use nvml_wrapper::error::{nvml_sym, nvml_try, NvmlError};
use nvml_wrapper::gpm::{gpm_metrics_get, GpmSample};
use nvml_wrapper::{Device, Nvml};
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;
use tracing::{debug, warn};

const BYTES_PER_MIB: u64 = 1024 * 1024;
const MIG_MODE_ENABLED: u32 = 1;

/// MIG entity ids are `parent_index * MIG_ENTITY_STRIDE + mig_index`.
const MIG_ENTITY_STRIDE: u32 = 8;

/// Time between the two GPM samples a utilization reading is derived from.
const GPM_SAMPLE_WINDOW: Duration = Duration::from_millis(100);

const GPM_FIELDS: [(FieldId, GpmMetricId); 5] = [
    (DCGM_FI_PROF_PIPE_TENSOR_ACTIVE, GpmMetricId::AnyTensorUtil),
    (DCGM_FI_PROF_DRAM_ACTIVE, GpmMetricId::DramBwUtil),
    (DCGM_FI_PROF_PIPE_FP64_ACTIVE, GpmMetricId::Fp64Util),
    (DCGM_FI_PROF_PIPE_FP32_ACTIVE, GpmMetricId::Fp32Util),
    (DCGM_FI_PROF_PIPE_FP16_ACTIVE, GpmMetricId::Fp16Util),
];

pub struct NvmlBackend {
    /// Cached driver version (fetched only once)
    driver_version: OnceLock<String>,
    /// Cached NVML handle, reinitialized if it goes stale
    nvml: Mutex<Option<Nvml>>,
}

#[derive(Clone, Copy)]
enum ValueKind {
    Int,
    Double,
    Str,
}

/// Handles resolved for one sampled entity. `device` answers per-instance
/// queries; `parent` answers board-level ones such as power.
struct Target<'nvml> {
    device: Device<'nvml>,
    parent: Device<'nvml>,
    gpu_instance_id: Option<u32>,
}

impl NvmlBackend {
    pub fn new() -> DcgmResult<Self> {
        let nvml = Nvml::init().map_err(|e| connection_error(&e))?;
        Ok(Self {
            driver_version: OnceLock::new(),
            nvml: Mutex::new(Some(nvml)),
        })
    }

    /// Execute a closure with the cached NVML handle.
    /// Reinitializes the handle if it was previously unavailable or became invalid.
    fn with_nvml<F, T>(&self, f: F) -> DcgmResult<T>
    where
        F: FnOnce(&Nvml) -> DcgmResult<T>,
    {
        let mut guard = self
            .nvml
            .lock()
            .map_err(|_| DcgmError::ConnectionNotValid("NVML handle lock poisoned".to_string()))?;
        if let Some(ref nvml) = *guard {
            if nvml.device_count().is_ok() {
                return f(nvml);
            }
            warn!("NVML handle is stale, reinitializing");
        }
        match Nvml::init() {
            Ok(nvml) => {
                let result = f(&nvml);
                *guard = Some(nvml);
                result
            }
            Err(e) => {
                *guard = None;
                Err(connection_error(&e))
            }
        }
    }

    fn driver_version(&self, nvml: &Nvml) -> Result<String, NvmlError> {
        if let Some(version) = self.driver_version.get() {
            return Ok(version.clone());
        }
        let version = nvml.sys_driver_version()?;
        Ok(self.driver_version.get_or_init(|| version).clone())
    }

    fn sample_field(
        &self,
        nvml: &Nvml,
        target: &Target<'_>,
        profiling: &HashMap<FieldId, SampleValue>,
        field_id: FieldId,
    ) -> DcgmResult<FieldValue> {
        use ValueKind::*;

        let device = &target.device;
        let parent = &target.parent;
        let value = match field_id {
            DCGM_FI_DRIVER_VERSION => convert(Str, self.driver_version(nvml), SampleValue::String)?,
            DCGM_FI_DEV_NAME => convert(Str, device.name(), SampleValue::String)?,
            DCGM_FI_DEV_SERIAL => convert(Str, parent.serial(), SampleValue::String)?,
            DCGM_FI_DEV_UUID => convert(Str, device.uuid(), SampleValue::String)?,
            DCGM_FI_DEV_SM_CLOCK => convert(Int, parent.clock_info(Clock::SM), |v| {
                SampleValue::Int64(v as i64)
            })?,
            DCGM_FI_DEV_MEM_CLOCK => convert(Int, parent.clock_info(Clock::Memory), |v| {
                SampleValue::Int64(v as i64)
            })?,
            DCGM_FI_DEV_GPU_TEMP => {
                convert(Int, parent.temperature(TemperatureSensor::Gpu), |v| {
                    SampleValue::Int64(v as i64)
                })?
            }
            // NVML reports milliwatts, DCGM reports watts. MIG instances
            // report the whole board; attribution happens downstream.
            DCGM_FI_DEV_POWER_USAGE => convert(Double, parent.power_usage(), |mw| {
                SampleValue::Double(mw as f64 / 1000.0)
            })?,
            DCGM_FI_DEV_TOTAL_ENERGY_CONSUMPTION => {
                convert(Int, parent.total_energy_consumption(), |mj| {
                    SampleValue::Int64(mj as i64)
                })?
            }
            DCGM_FI_DEV_GPU_UTIL => convert(Int, device.utilization_rates(), |u| {
                SampleValue::Int64(u.gpu as i64)
            })?,
            DCGM_FI_DEV_MEM_COPY_UTIL => convert(Int, device.utilization_rates(), |u| {
                SampleValue::Int64(u.memory as i64)
            })?,
            DCGM_FI_DEV_FB_TOTAL => convert(Int, device.memory_info(), |m| {
                SampleValue::Int64((m.total / BYTES_PER_MIB) as i64)
            })?,
            DCGM_FI_DEV_FB_FREE => convert(Int, device.memory_info(), |m| {
                SampleValue::Int64((m.free / BYTES_PER_MIB) as i64)
            })?,
            DCGM_FI_DEV_FB_USED => convert(Int, device.memory_info(), |m| {
                SampleValue::Int64((m.used / BYTES_PER_MIB) as i64)
            })?,
            id if MIG_RESOURCE_FIELDS.contains(&id) => profiling
                .get(&id)
                .cloned()
                .unwrap_or(SampleValue::Double(DCGM_FT_FP64_NOT_SUPPORTED)),
            _ => SampleValue::Int64(DCGM_FT_INT64_NOT_SUPPORTED),
        };

        Ok(FieldValue { field_id, value })
    }
}

fn connection_error(error: &NvmlError) -> DcgmError {
    DcgmError::ConnectionNotValid(format!("NVML Error: {error}"))
}

fn is_connection_error(error: &NvmlError) -> bool {
    matches!(
        error,
        NvmlError::Uninitialized | NvmlError::DriverNotLoaded | NvmlError::GpuLost
    )
}

/// Map an NVML query result onto a DCGM sample, translating per-field
/// failures into blank sentinels of the right type.
fn convert<T>(
    kind: ValueKind,
    result: Result<T, NvmlError>,
    ok: impl FnOnce(T) -> SampleValue,
) -> DcgmResult<SampleValue> {
    let (int, double, string) = match result {
        Ok(v) => return Ok(ok(v)),
        Err(NvmlError::NotSupported) => (
            DCGM_FT_INT64_NOT_SUPPORTED,
            DCGM_FT_FP64_NOT_SUPPORTED,
            DCGM_FT_STR_NOT_SUPPORTED,
        ),
        Err(NvmlError::NoPermission) => (
            DCGM_FT_INT64_NOT_PERMISSIONED,
            DCGM_FT_FP64_NOT_PERMISSIONED,
            DCGM_FT_STR_NOT_PERMISSIONED,
        ),
        Err(NvmlError::NotFound) => (
            DCGM_FT_INT64_NOT_FOUND,
            DCGM_FT_FP64_NOT_FOUND,
            DCGM_FT_STR_NOT_FOUND,
        ),
        Err(e) if is_connection_error(&e) => return Err(connection_error(&e)),
        Err(e) => {
            debug!("NVML query failed: {e}");
            (DCGM_FT_INT64_BLANK, DCGM_FT_FP64_BLANK, DCGM_FT_STR_BLANK)
        }
    };

    Ok(match kind {
        ValueKind::Int => SampleValue::Int64(int),
        ValueKind::Double => SampleValue::Double(double),
        ValueKind::Str => SampleValue::String(string.to_string()),
    })
}

/// Profile of a MIG device from its NVML name, e.g.
/// `NVIDIA A100-SXM4-40GB MIG 3g.20gb` yields `3g.20gb`.
fn mig_profile_from_name(name: &str) -> Option<&str> {
    name.rsplit_once("MIG")
        .map(|(_, profile)| profile.trim())
        .filter(|profile| !profile.is_empty())
}

fn mig_entity_id(parent_index: u32, mig_index: u32) -> u32 {
    parent_index * MIG_ENTITY_STRIDE + mig_index
}

/// Inverse of [`mig_entity_id`]: `(parent_index, mig_index)`.
fn split_mig_entity_id(entity_id: u32) -> (u32, u32) {
    (entity_id / MIG_ENTITY_STRIDE, entity_id % MIG_ENTITY_STRIDE)
}

fn gpm_field_id(metric: GpmMetricId) -> Option<FieldId> {
    GPM_FIELDS
        .iter()
        .find(|(_, m)| *m == metric)
        .map(|(field, _)| *field)
}

/// GPM reports percentages; the profiling fields are fractions.
fn gpm_fraction(percent: f64) -> f64 {
    percent / 100.0
}

/// GPU instance id of a MIG device handle. Not wrapped by nvml-wrapper, so
/// the symbol is called directly.
fn gpu_instance_id(nvml: &Nvml, device: &Device<'_>) -> Result<u32, NvmlError> {
    let sym = nvml_sym(nvml.lib().nvmlDeviceGetGpuInstanceId.as_ref())?;
    let mut id: std::os::raw::c_uint = 0;
    // SAFETY: the handle was obtained from `nvml`, which outlives this call,
    // and `id` is a valid out pointer.
    unsafe {
        nvml_try(sym(device.handle(), &mut id))?;
    }
    Ok(id)
}

fn gpm_snapshot<'nvml>(
    device: &Device<'nvml>,
    gpu_instance_id: Option<u32>,
) -> Result<GpmSample<'nvml>, NvmlError> {
    match gpu_instance_id {
        Some(id) => device.gpm_mig_sample(id),
        None => device.gpm_sample(),
    }
}

/// Utilization of the five MIG resource dimensions over [`GPM_SAMPLE_WINDOW`].
fn sample_gpm(
    nvml: &Nvml,
    device: &Device<'_>,
    gpu_instance_id: Option<u32>,
) -> Result<Vec<(FieldId, f64)>, NvmlError> {
    let first = gpm_snapshot(device, gpu_instance_id)?;
    std::thread::sleep(GPM_SAMPLE_WINDOW);
    let second = gpm_snapshot(device, gpu_instance_id)?;

    let metric_ids = GPM_FIELDS.map(|(_, metric)| metric);
    let results = gpm_metrics_get(nvml, &first, &second, &metric_ids)?;
    Ok(results
        .into_iter()
        .flatten()
        .filter_map(|r| gpm_field_id(r.metric_id).map(|field| (field, gpm_fraction(r.value))))
        .collect())
}

/// Profiling samples for `target`, with every dimension set to the matching
/// sentinel when GPM is unavailable.
fn profiling_values(
    nvml: &Nvml,
    target: &Target<'_>,
) -> DcgmResult<HashMap<FieldId, SampleValue>> {
    match sample_gpm(nvml, &target.parent, target.gpu_instance_id) {
        Ok(values) => Ok(values
            .into_iter()
            .map(|(field, v)| (field, SampleValue::Double(v)))
            .collect()),
        Err(e) => {
            let blank = convert(ValueKind::Double, Err::<f64, _>(e), SampleValue::Double)?;
            Ok(MIG_RESOURCE_FIELDS
                .iter()
                .map(|&field| (field, blank.clone()))
                .collect())
        }
    }
}

fn mig_enabled(device: &Device<'_>) -> bool {
    device
        .mig_mode()
        .map(|mode| mode.current == MIG_MODE_ENABLED)
        .unwrap_or(false)
}

/// MIG instances of one physical GPU. Empty slots are skipped.
fn mig_instances(
    nvml: &Nvml,
    parent_index: u32,
    parent: &Device<'_>,
    info: &DeviceInfo,
) -> Vec<MonitoredEntity> {
    let count = match parent.mig_device_count() {
        Ok(count) => count.min(MIG_ENTITY_STRIDE),
        Err(e) => {
            warn!("Could not count MIG devices of GPU {parent_index}: {e}");
            return Vec::new();
        }
    };

    let mut instances = Vec::new();
    for mig_index in 0..count {
        let Ok(mig) = parent.mig_device_by_index(mig_index) else {
            continue;
        };
        let name = mig.name().unwrap_or_default();
        let Some(profile) = mig_profile_from_name(&name) else {
            warn!("Skipping MIG device {parent_index}/{mig_index} with unrecognized name '{name}'");
            continue;
        };
        let instance_id = match gpu_instance_id(nvml, &mig) {
            Ok(id) => id,
            Err(e) => {
                warn!("Skipping MIG device {parent_index}/{mig_index}: {e}");
                continue;
            }
        };

        let entity_id = mig_entity_id(parent_index, mig_index);
        instances.push(MonitoredEntity::mig_instance(
            info.clone(),
            entity_id,
            GpuInstanceInfo {
                profile_name: profile.to_string(),
                nvml_instance_id: instance_id,
                entity_id,
            },
        ));
    }
    instances
}

impl EntityTopology for NvmlBackend {
    fn monitored_entities(&self, group: EntityGroup) -> DcgmResult<Vec<MonitoredEntity>> {
        if !matches!(group, EntityGroup::Gpu | EntityGroup::GpuInstance) {
            debug!("NVML backend does not enumerate {group} entities");
            return Ok(Vec::new());
        }

        self.with_nvml(|nvml| {
            let count = nvml.device_count().map_err(|e| connection_error(&e))?;
            let mut entities = Vec::with_capacity(count as usize);
            for i in 0..count {
                let device = match nvml.device_by_index(i) {
                    Ok(device) => device,
                    Err(e) => {
                        warn!("Skipping GPU {i}: {e}");
                        continue;
                    }
                };
                let info = DeviceInfo {
                    gpu: i,
                    uuid: device.uuid().unwrap_or_else(|_| format!("GPU-{i}")),
                    model: device.name().unwrap_or_else(|_| "Unknown GPU".to_string()),
                };

                let instances = if mig_enabled(&device) {
                    mig_instances(nvml, i, &device, &info)
                } else {
                    Vec::new()
                };
                if instances.is_empty() {
                    if group == EntityGroup::Gpu {
                        entities.push(MonitoredEntity::gpu(i, info.uuid, info.model));
                    }
                } else {
                    entities.extend(instances);
                }
            }
            Ok(entities)
        })
    }
}

impl FieldSampler for NvmlBackend {
    fn entity_latest_values(
        &self,
        group: EntityGroup,
        entity_id: u32,
        fields: &[FieldId],
    ) -> DcgmResult<Vec<FieldValue>> {
        let not_found = || DcgmError::EntityNotFound {
            group: group.to_string(),
            id: entity_id,
        };
        let lookup_error = |e: NvmlError| {
            if is_connection_error(&e) {
                connection_error(&e)
            } else {
                not_found()
            }
        };

        self.with_nvml(|nvml| {
            let target = match group {
                EntityGroup::Gpu => {
                    let device = nvml.device_by_index(entity_id).map_err(lookup_error)?;
                    let parent = nvml.device_by_index(entity_id).map_err(lookup_error)?;
                    Target {
                        device,
                        parent,
                        gpu_instance_id: None,
                    }
                }
                EntityGroup::GpuInstance => {
                    let (parent_index, mig_index) = split_mig_entity_id(entity_id);
                    let parent = nvml.device_by_index(parent_index).map_err(lookup_error)?;
                    let device = parent.mig_device_by_index(mig_index).map_err(lookup_error)?;
                    let gpu_instance_id = gpu_instance_id(nvml, &device).map_err(lookup_error)?;
                    Target {
                        device,
                        parent,
                        gpu_instance_id: Some(gpu_instance_id),
                    }
                }
                _ => return Err(not_found()),
            };

            let profiling = if fields.iter().any(|f| MIG_RESOURCE_FIELDS.contains(f)) {
                profiling_values(nvml, &target)?
            } else {
                HashMap::new()
            };

            fields
                .iter()
                .map(|&field_id| self.sample_field(nvml, &target, &profiling, field_id))
                .collect()
        })
    }

    fn link_latest_values(
        &self,
        link_id: u32,
        _parent_id: u32,
        _fields: &[FieldId],
    ) -> DcgmResult<Vec<FieldValue>> {
        Err(DcgmError::EntityNotFound {
            group: EntityGroup::Link.to_string(),
            id: link_id,
        })
    }
}

impl FieldWatcher for NvmlBackend {
    fn watch_fields(
        &self,
        fields: &[FieldId],
        system_info: &SystemInfo,
        _update_freq_us: i64,
    ) -> DcgmResult<Vec<WatchGuard>> {
        debug!(
            "NVML samples on demand; {} field(s) for {} need no watch",
            fields.len(),
            system_info.info_type
        );
        Ok(vec![WatchGuard::noop()])
    }
}
