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

//! End-to-end collection cycles against the mock backend.

use std::sync::atomic::Ordering;

use mig_power_exporter::device::fields::*;
use mig_power_exporter::device::readers::mock::{MockBackend, MockFailure};
use mig_power_exporter::device::{DeviceInfo, GpuInstanceInfo};
use mig_power_exporter::metrics::counter::find_counter_field;
use mig_power_exporter::metrics::metric::snapshot;
use mig_power_exporter::prelude::*;

fn gpu_info(counters: &[Counter]) -> FieldEntityGroupSystemInfo {
    FieldEntityGroupSystemInfo {
        system_info: SystemInfo {
            info_type: EntityGroup::Gpu,
        },
        device_fields: device_fields(counters, EntityGroup::Gpu),
    }
}

fn collector_with(backend: MockBackend, config: &Config) -> DcgmCollector {
    let counters = default_counters();
    let info = gpu_info(&counters);
    DcgmCollector::new(counters, "node-1".to_string(), config, info, Box::new(backend))
        .expect("collector should be created")
}

fn a100() -> DeviceInfo {
    DeviceInfo {
        gpu: 0,
        uuid: "GPU-0".to_string(),
        model: "NVIDIA A100-SXM4-40GB".to_string(),
    }
}

fn mig(entity_id: u32, profile: &str, nvml_id: u32) -> MonitoredEntity {
    MonitoredEntity::mig_instance(
        a100(),
        entity_id,
        GpuInstanceInfo {
            profile_name: profile.to_string(),
            nvml_instance_id: nvml_id,
            entity_id,
        },
    )
}

fn power_values(metrics: &MetricsByCounter) -> Vec<f64> {
    let counters = default_counters();
    let counter = find_counter_field(&counters, DCGM_FI_DEV_POWER_USAGE).unwrap();
    metrics[counter]
        .iter()
        .map(|m| m.value.parse::<f64>().unwrap())
        .collect()
}

#[test]
fn test_two_instances_split_gpu_power() {
    let collector = collector_with(MockBackend::demo(), &Config::default());
    let metrics = collector.get_metrics().unwrap();

    let power = power_values(&metrics);
    assert_eq!(power.len(), 3);
    assert!((power[0] - 143.5).abs() < 1e-9);
    assert!((power[1] - 125.413534).abs() < 1e-6);
    assert!((power[2] - 74.586466).abs() < 1e-6);
    assert!((power[1] + power[2] - 200.0).abs() < 1e-5);
}

#[test]
fn test_every_metric_carries_driver_label() {
    let collector = collector_with(MockBackend::demo(), &Config::default());
    let metrics = collector.get_metrics().unwrap();

    assert!(!metrics.is_empty());
    for list in metrics.values() {
        for m in list {
            assert_eq!(m.labels["DCGM_FI_DRIVER_VERSION"], "550.54.15");
            assert_eq!(m.hostname, "node-1");
            assert_eq!(m.uuid, "UUID");
        }
    }
}

#[test]
fn test_power_is_conserved_across_instances() {
    let util = |tensor: f64, dram: f64, fp32: f64| {
        vec![
            FieldValue::double(DCGM_FI_DEV_POWER_USAGE, 310.0),
            FieldValue::double(DCGM_FI_PROF_PIPE_TENSOR_ACTIVE, tensor),
            FieldValue::double(DCGM_FI_PROF_DRAM_ACTIVE, dram),
            FieldValue::double(DCGM_FI_PROF_PIPE_FP32_ACTIVE, fp32),
        ]
    };
    let backend = MockBackend::new()
        .with_entity(mig(1, "1g.5gb", 11))
        .with_entity(mig(2, "2g.10gb", 12))
        .with_entity(mig(3, "4g.20gb", 13))
        .with_values(EntityGroup::GpuInstance, 1, util(0.9, 0.4, 0.1))
        .with_values(EntityGroup::GpuInstance, 2, util(0.2, 0.1, 0.6))
        .with_values(EntityGroup::GpuInstance, 3, util(0.05, 0.3, 0.0));

    let metrics = collector_with(backend, &Config::default())
        .get_metrics()
        .unwrap();
    let power = power_values(&metrics);

    assert_eq!(power.len(), 3);
    assert!(power.iter().all(|p| *p > 0.0));
    assert!((power.iter().sum::<f64>() - 310.0).abs() < 1e-5);
}

#[test]
fn test_idle_gpu_splits_by_slices() {
    let backend = MockBackend::new()
        .with_entity(mig(1, "3g.20gb", 1))
        .with_entity(mig(2, "4g.20gb", 2))
        .with_values(
            EntityGroup::GpuInstance,
            1,
            vec![FieldValue::double(DCGM_FI_DEV_POWER_USAGE, 160.0)],
        )
        .with_values(
            EntityGroup::GpuInstance,
            2,
            vec![FieldValue::double(DCGM_FI_DEV_POWER_USAGE, 160.0)],
        );

    let power = power_values(
        &collector_with(backend, &Config::default())
            .get_metrics()
            .unwrap(),
    );
    assert!((power[0] - 160.0 * 3.0 / 7.0).abs() < 1e-6);
    assert!((power[1] - 160.0 * 4.0 / 7.0).abs() < 1e-6);
}

#[test]
fn test_unparsable_profile_reports_raw_power() {
    let backend = MockBackend::new()
        .with_entity(mig(1, "xg.20gb", 1))
        .with_values(
            EntityGroup::GpuInstance,
            1,
            vec![FieldValue::double(DCGM_FI_DEV_POWER_USAGE, 150.0)],
        );

    let metrics = collector_with(backend, &Config::default())
        .get_metrics()
        .unwrap();
    let counters = default_counters();
    let counter = find_counter_field(&counters, DCGM_FI_DEV_POWER_USAGE).unwrap();
    assert_eq!(metrics[counter][0].value, "150.000000");
    assert_eq!(metrics[counter][0].mig_profile, "xg.20gb");
}

#[test]
fn test_model_name_and_namespace_options() {
    let config = Config {
        use_old_namespace: true,
        replace_blanks_in_model_name: true,
        ..Config::default()
    };
    let backend = MockBackend::new()
        .with_entity(MonitoredEntity::gpu(0, "GPU-0", "NVIDIA  A100 SXM4"))
        .with_values(
            EntityGroup::Gpu,
            0,
            vec![FieldValue::int64(DCGM_FI_DEV_GPU_TEMP, 40)],
        );

    let metrics = collector_with(backend, &config).get_metrics().unwrap();
    let metric = metrics.values().next().unwrap().first().unwrap();
    assert_eq!(metric.uuid, "uuid");
    assert_eq!(metric.gpu_model_name, "NVIDIA-A100-SXM4");
}

#[test]
fn test_sampling_failure_aborts_cycle() {
    let backend =
        MockBackend::demo().with_failure(EntityGroup::GpuInstance, 7, MockFailure::Sampling);
    let err = collector_with(backend, &Config::default())
        .get_metrics()
        .unwrap_err();
    match err {
        Error::Sampling(_) => {}
        other => panic!("Expected Sampling error, got: {other}"),
    }
}

#[test]
fn test_connection_loss_during_cache_build_is_fatal() {
    let backend =
        MockBackend::demo().with_failure(EntityGroup::GpuInstance, 7, MockFailure::ConnectionLost);
    let err = collector_with(backend, &Config::default())
        .get_metrics()
        .unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn test_watches_released_on_cleanup() {
    let backend = MockBackend::demo();
    let watches = backend.watch_counter();

    let mut collector = collector_with(backend, &Config::default());
    assert_eq!(watches.load(Ordering::SeqCst), 1);
    collector.get_metrics().unwrap();
    collector.cleanup();
    assert_eq!(watches.load(Ordering::SeqCst), 0);
}

#[test]
fn test_snapshot_is_ordered_by_field_id() {
    let collector = collector_with(MockBackend::demo(), &Config::default());
    let json = snapshot(&collector.get_metrics().unwrap());

    let ids: Vec<u64> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["counter"]["field_id"].as_u64().unwrap())
        .collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted);
    assert!(!ids.contains(&u64::from(DCGM_FI_DRIVER_VERSION)));
}
