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

//! Per-entity metric builders.
//!
//! Label-typed counters never become metrics of their own: their values are
//! gathered into one label set per entity and attached to every value metric
//! of that entity. Samples arrive in arbitrary order, so value metrics are
//! only built once all of the entity's samples have been seen.

use crate::device::types::{EntityGroup, FieldValue, MonitoredEntity};
use crate::metrics::counter::{find_counter_field, Counter};
use crate::metrics::metric::{push_metric, Metric, MetricsByCounter};
use crate::metrics::mig::{mig_device_resource, MigResourceCache};
use crate::metrics::value::{to_string, FAILED_TO_CONVERT, SKIP_DCGM_VALUE};
use std::collections::HashMap;
use tracing::{trace, warn};

/// Settings shared by every builder during one cycle.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    pub counters: &'a [Counter],
    pub hostname: &'a str,
    pub use_old_namespace: bool,
    pub replace_blanks_in_model_name: bool,
}

impl BuildContext<'_> {
    fn uuid_label(&self) -> &'static str {
        if self.use_old_namespace {
            "uuid"
        } else {
            "UUID"
        }
    }
}

/// Normalized samples of one entity, labels already folded together.
struct EntitySamples<'c> {
    labels: HashMap<String, String>,
    values: Vec<(&'c Counter, String)>,
}

fn collect_samples<'c>(values: &[FieldValue], counters: &'c [Counter]) -> EntitySamples<'c> {
    let mut samples = EntitySamples {
        labels: HashMap::new(),
        values: Vec::new(),
    };

    for val in values {
        let v = to_string(val);
        if v == SKIP_DCGM_VALUE {
            continue;
        }
        if v == FAILED_TO_CONVERT {
            warn!("Dropping field {}: {v}", val.field_id);
            continue;
        }

        let counter = match find_counter_field(counters, val.field_id) {
            Ok(counter) => counter,
            Err(e) => {
                trace!("{e}");
                continue;
            }
        };

        if counter.is_label() {
            samples.labels.insert(counter.field_name.clone(), v);
        } else {
            samples.values.push((counter, v));
        }
    }

    samples
}

/// Identifier fields that differ between entity categories.
struct Identity {
    gpu: String,
    gpu_uuid: String,
    gpu_device: String,
    gpu_model_name: String,
}

fn emit(
    metrics: &mut MetricsByCounter,
    ctx: &BuildContext<'_>,
    samples: EntitySamples<'_>,
    identity: &Identity,
    mut finish: impl FnMut(&mut Metric),
) {
    for (counter, value) in samples.values {
        let mut m = Metric {
            counter: counter.clone(),
            value,
            uuid: ctx.uuid_label().to_string(),
            gpu: identity.gpu.clone(),
            gpu_uuid: identity.gpu_uuid.clone(),
            gpu_device: identity.gpu_device.clone(),
            gpu_model_name: identity.gpu_model_name.clone(),
            hostname: ctx.hostname.to_string(),
            mig_profile: String::new(),
            gpu_instance_id: String::new(),
            labels: samples.labels.clone(),
            attributes: HashMap::new(),
        };
        finish(&mut m);
        push_metric(metrics, m);
    }
}

/// Model name, optionally with whitespace runs collapsed into single hyphens.
pub fn get_gpu_model(model: &str, replace_blanks_in_model_name: bool) -> String {
    if replace_blanks_in_model_name {
        model
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .replace(' ', "-")
    } else {
        model.to_string()
    }
}

/// GPUs and MIG instances. Power draw of a MIG instance is replaced by its
/// attributed share of the parent GPU's power.
pub fn to_gpu_metric(
    metrics: &mut MetricsByCounter,
    values: &[FieldValue],
    ctx: &BuildContext<'_>,
    entity: &MonitoredEntity,
    mig_cache: &MigResourceCache,
) {
    let device = &entity.device_info;
    let identity = Identity {
        gpu: device.gpu.to_string(),
        gpu_uuid: device.uuid.clone(),
        gpu_device: format!("nvidia{}", device.gpu),
        gpu_model_name: get_gpu_model(&device.model, ctx.replace_blanks_in_model_name),
    };
    let samples = collect_samples(values, ctx.counters);

    emit(metrics, ctx, samples, &identity, |m| {
        if let Some(instance) = &entity.instance_info {
            m.mig_profile = instance.profile_name.clone();
            m.gpu_instance_id = instance.nvml_instance_id.to_string();
            m.value = mig_device_resource(
                &m.value,
                &instance.profile_name,
                &m.gpu_instance_id,
                device.gpu,
                &m.counter,
                mig_cache,
            );
        }
    });
}

pub fn to_switch_metric(
    metrics: &mut MetricsByCounter,
    values: &[FieldValue],
    ctx: &BuildContext<'_>,
    entity: &MonitoredEntity,
) {
    let identity = Identity {
        gpu: entity.entity.id.to_string(),
        gpu_uuid: String::new(),
        gpu_device: format!("nvswitch{}", entity.parent_id),
        gpu_model_name: String::new(),
    };
    emit(
        metrics,
        ctx,
        collect_samples(values, ctx.counters),
        &identity,
        |_| {},
    );
}

pub fn to_link_metric(
    metrics: &mut MetricsByCounter,
    values: &[FieldValue],
    ctx: &BuildContext<'_>,
    entity: &MonitoredEntity,
) {
    let identity = Identity {
        gpu: entity.entity.id.to_string(),
        gpu_uuid: String::new(),
        gpu_device: entity.parent_id.to_string(),
        gpu_model_name: String::new(),
    };
    emit(
        metrics,
        ctx,
        collect_samples(values, ctx.counters),
        &identity,
        |_| {},
    );
}

/// CPUs and CPU cores.
pub fn to_cpu_metric(
    metrics: &mut MetricsByCounter,
    values: &[FieldValue],
    ctx: &BuildContext<'_>,
    entity: &MonitoredEntity,
) {
    let identity = Identity {
        gpu: entity.entity.id.to_string(),
        gpu_uuid: String::new(),
        gpu_device: entity.parent_id.to_string(),
        gpu_model_name: String::new(),
    };
    emit(
        metrics,
        ctx,
        collect_samples(values, ctx.counters),
        &identity,
        |_| {},
    );
}

/// Route an entity's samples to the builder for its category.
pub fn to_entity_metric(
    metrics: &mut MetricsByCounter,
    values: &[FieldValue],
    ctx: &BuildContext<'_>,
    entity: &MonitoredEntity,
    mig_cache: &MigResourceCache,
) {
    match entity.entity.group {
        EntityGroup::Switch => to_switch_metric(metrics, values, ctx, entity),
        EntityGroup::Link => to_link_metric(metrics, values, ctx, entity),
        EntityGroup::Cpu | EntityGroup::CpuCore => to_cpu_metric(metrics, values, ctx, entity),
        EntityGroup::Gpu
        | EntityGroup::GpuInstance
        | EntityGroup::Vgpu
        | EntityGroup::ComputeInstance => to_gpu_metric(metrics, values, ctx, entity, mig_cache),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::fields::*;
    use crate::device::types::{DeviceInfo, GpuInstanceInfo, SampleValue};
    use crate::metrics::counter::{default_counters, PromType};
    use crate::metrics::mig::MigResourceSample;

    fn ctx(counters: &[Counter]) -> BuildContext<'_> {
        BuildContext {
            counters,
            hostname: "node-1",
            use_old_namespace: false,
            replace_blanks_in_model_name: false,
        }
    }

    fn counter(counters: &[Counter], id: FieldId) -> Counter {
        find_counter_field(counters, id).unwrap().clone()
    }

    fn mig_a() -> MonitoredEntity {
        MonitoredEntity::mig_instance(
            DeviceInfo {
                gpu: 1,
                uuid: "GPU-1".to_string(),
                model: "NVIDIA A100".to_string(),
            },
            7,
            GpuInstanceInfo {
                profile_name: "3g.20gb".to_string(),
                nvml_instance_id: 1,
                entity_id: 7,
            },
        )
    }

    #[test]
    fn test_gpu_metric_identity() {
        let counters = default_counters();
        let entity = MonitoredEntity::gpu(2, "GPU-abc", "NVIDIA  A100-SXM4   40GB");
        let mut metrics = MetricsByCounter::new();
        let values = vec![FieldValue::int64(DCGM_FI_DEV_GPU_TEMP, 41)];

        to_gpu_metric(
            &mut metrics,
            &values,
            &ctx(&counters),
            &entity,
            &MigResourceCache::new(),
        );

        let m = &metrics[&counter(&counters, DCGM_FI_DEV_GPU_TEMP)][0];
        assert_eq!(m.value, "41");
        assert_eq!(m.uuid, "UUID");
        assert_eq!(m.gpu, "2");
        assert_eq!(m.gpu_uuid, "GPU-abc");
        assert_eq!(m.gpu_device, "nvidia2");
        assert_eq!(m.gpu_model_name, "NVIDIA  A100-SXM4   40GB");
        assert_eq!(m.hostname, "node-1");
        assert_eq!(m.mig_profile, "");
        assert_eq!(m.gpu_instance_id, "");
    }

    #[test]
    fn test_model_name_blank_replacement() {
        assert_eq!(
            get_gpu_model("  NVIDIA  A100-SXM4   40GB ", true),
            "NVIDIA-A100-SXM4-40GB"
        );
        assert_eq!(get_gpu_model("NVIDIA A100", false), "NVIDIA A100");
    }

    #[test]
    fn test_old_namespace_uuid_label() {
        let counters = default_counters();
        let mut context = ctx(&counters);
        context.use_old_namespace = true;
        let mut metrics = MetricsByCounter::new();
        to_gpu_metric(
            &mut metrics,
            &[FieldValue::int64(DCGM_FI_DEV_GPU_TEMP, 41)],
            &context,
            &MonitoredEntity::gpu(0, "GPU-0", "A100"),
            &MigResourceCache::new(),
        );
        assert_eq!(metrics[&counter(&counters, DCGM_FI_DEV_GPU_TEMP)][0].uuid, "uuid");
    }

    #[test]
    fn test_labels_apply_regardless_of_order() {
        let counters = default_counters();
        let mut metrics = MetricsByCounter::new();
        // the label arrives after the value fields
        let values = vec![
            FieldValue::int64(DCGM_FI_DEV_GPU_TEMP, 41),
            FieldValue::double(DCGM_FI_DEV_POWER_USAGE, 120.0),
            FieldValue::string(DCGM_FI_DRIVER_VERSION, "550.54.15"),
        ];
        to_gpu_metric(
            &mut metrics,
            &values,
            &ctx(&counters),
            &MonitoredEntity::gpu(0, "GPU-0", "A100"),
            &MigResourceCache::new(),
        );

        assert!(!metrics.contains_key(&counter(&counters, DCGM_FI_DRIVER_VERSION)));
        assert_eq!(metrics.len(), 2);
        for list in metrics.values() {
            for m in list {
                assert_eq!(
                    m.labels.get("DCGM_FI_DRIVER_VERSION").map(String::as_str),
                    Some("550.54.15")
                );
            }
        }
    }

    #[test]
    fn test_skips_blank_unknown_and_unconvertible_fields() {
        let counters = default_counters();
        let mut metrics = MetricsByCounter::new();
        let values = vec![
            FieldValue::int64(DCGM_FI_DEV_GPU_TEMP, DCGM_FT_INT32_NOT_SUPPORTED),
            FieldValue::string(DCGM_FI_DRIVER_VERSION, DCGM_FT_STR_BLANK),
            FieldValue::int64(DCGM_FI_DEV_CPU_UTIL_TOTAL, 12),
            FieldValue {
                field_id: DCGM_FI_DEV_SM_CLOCK,
                value: SampleValue::Binary(vec![1, 2]),
            },
            FieldValue::int64(DCGM_FI_DEV_MEM_CLOCK, 1215),
        ];
        to_gpu_metric(
            &mut metrics,
            &values,
            &ctx(&counters),
            &MonitoredEntity::gpu(0, "GPU-0", "A100"),
            &MigResourceCache::new(),
        );

        assert_eq!(metrics.len(), 1);
        let m = &metrics[&counter(&counters, DCGM_FI_DEV_MEM_CLOCK)][0];
        assert_eq!(m.value, "1215");
        assert!(m.labels.is_empty());
    }

    #[test]
    fn test_mig_metric_attributes_power() {
        let counters = default_counters();
        let mut cache = MigResourceCache::new();
        cache.insert(
            1,
            vec![
                MigResourceSample {
                    tensor: 0.5,
                    ..MigResourceSample::new(1, "1", "3g.20gb")
                },
                MigResourceSample {
                    tensor: 0.1,
                    ..MigResourceSample::new(1, "2", "4g.20gb")
                },
            ],
        );
        let mut metrics = MetricsByCounter::new();
        let values = vec![
            FieldValue::double(DCGM_FI_DEV_POWER_USAGE, 200.0),
            FieldValue::int64(DCGM_FI_DEV_GPU_TEMP, 41),
        ];
        to_gpu_metric(&mut metrics, &values, &ctx(&counters), &mig_a(), &cache);

        let power = &metrics[&counter(&counters, DCGM_FI_DEV_POWER_USAGE)][0];
        assert_eq!(power.value, "125.413534");
        assert_eq!(power.mig_profile, "3g.20gb");
        assert_eq!(power.gpu_instance_id, "1");
        assert_eq!(power.gpu_device, "nvidia1");

        let temp = &metrics[&counter(&counters, DCGM_FI_DEV_GPU_TEMP)][0];
        assert_eq!(temp.value, "41");
    }

    #[test]
    fn test_whole_gpu_power_is_not_attributed() {
        let counters = default_counters();
        let mut cache = MigResourceCache::new();
        cache.insert(0, vec![MigResourceSample::new(0, "1", "3g.20gb")]);
        let mut metrics = MetricsByCounter::new();
        to_gpu_metric(
            &mut metrics,
            &[FieldValue::double(DCGM_FI_DEV_POWER_USAGE, 200.0)],
            &ctx(&counters),
            &MonitoredEntity::gpu(0, "GPU-0", "A100"),
            &cache,
        );
        assert_eq!(
            metrics[&counter(&counters, DCGM_FI_DEV_POWER_USAGE)][0].value,
            "200.000000"
        );
    }

    #[test]
    fn test_switch_link_and_cpu_identity() {
        let tx = Counter::new(
            DCGM_FI_DEV_NVSWITCH_LINK_THROUGHPUT_TX,
            "DCGM_FI_DEV_NVSWITCH_LINK_THROUGHPUT_TX",
            PromType::Counter,
            "tx",
        );
        let cpu = Counter::new(
            DCGM_FI_DEV_CPU_UTIL_TOTAL,
            "DCGM_FI_DEV_CPU_UTIL_TOTAL",
            PromType::Gauge,
            "cpu",
        );
        let counters = vec![tx.clone(), cpu.clone()];
        let context = ctx(&counters);
        let cache = MigResourceCache::new();
        let mut metrics = MetricsByCounter::new();

        let tx_value = [FieldValue::int64(DCGM_FI_DEV_NVSWITCH_LINK_THROUGHPUT_TX, 10)];
        to_entity_metric(
            &mut metrics,
            &tx_value,
            &context,
            &MonitoredEntity::child(EntityGroup::Switch, 3, 1),
            &cache,
        );
        to_entity_metric(
            &mut metrics,
            &tx_value,
            &context,
            &MonitoredEntity::child(EntityGroup::Link, 12, 1),
            &cache,
        );
        to_entity_metric(
            &mut metrics,
            &[FieldValue::double(DCGM_FI_DEV_CPU_UTIL_TOTAL, 0.25)],
            &context,
            &MonitoredEntity::child(EntityGroup::CpuCore, 5, 0),
            &cache,
        );

        let switch = &metrics[&tx][0];
        assert_eq!(switch.gpu, "3");
        assert_eq!(switch.gpu_device, "nvswitch1");
        assert_eq!(switch.gpu_uuid, "");
        assert_eq!(switch.gpu_model_name, "");

        let link = &metrics[&tx][1];
        assert_eq!(link.gpu, "12");
        assert_eq!(link.gpu_device, "1");

        let core = &metrics[&cpu][0];
        assert_eq!(core.gpu, "5");
        assert_eq!(core.gpu_device, "0");
        assert_eq!(core.value, "0.250000");
    }
}
