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

//! Loading counter definitions from disk.

use std::io::Write;

use mig_power_exporter::device::fields::*;
use mig_power_exporter::metrics::counter::should_monitor_device_type;
use mig_power_exporter::prelude::*;
use tempfile::NamedTempFile;

fn write_csv(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write counters");
    file
}

#[test]
fn test_load_counters_file() {
    let file = write_csv(
        "# power only\n\
         DCGM_FI_DEV_POWER_USAGE, gauge, Power draw (in W).\n\
         \n\
         DCGM_FI_DEV_TOTAL_ENERGY_CONSUMPTION, counter, Energy, since boot (in mJ).\n\
         DCGM_FI_DRIVER_VERSION, label, Driver Version.\n",
    );

    let counters = load_counters(file.path()).unwrap();
    assert_eq!(counters.len(), 3);
    assert_eq!(counters[0].field_id, DCGM_FI_DEV_POWER_USAGE);
    assert_eq!(counters[0].prom_type, PromType::Gauge);
    assert_eq!(counters[1].prom_type, PromType::Counter);
    assert_eq!(counters[1].help, "Energy, since boot (in mJ).");
    assert!(counters[2].is_label());
}

#[test]
fn test_load_counters_reports_line() {
    let file = write_csv("DCGM_FI_DEV_GPU_TEMP, gauge, ok\nDCGM_FI_DEV_NOPE, gauge, bad\n");

    match load_counters(file.path()).unwrap_err() {
        Error::InvalidCounter { line, .. } => assert_eq!(line, 2),
        other => panic!("Expected InvalidCounter error, got: {other}"),
    }
}

#[test]
fn test_load_counters_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_counters(&dir.path().join("absent.csv")).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn test_label_only_counters_skip_entity_type() {
    let file = write_csv("DCGM_FI_DRIVER_VERSION, label, Driver Version.\n");
    let counters = load_counters(file.path()).unwrap();

    for group in [EntityGroup::Gpu, EntityGroup::Switch, EntityGroup::Cpu] {
        let fields = device_fields(&counters, group);
        assert_eq!(fields, vec![DCGM_FI_DRIVER_VERSION]);
        assert!(!should_monitor_device_type(&fields, group));
    }
}

#[test]
fn test_collector_uses_loaded_counters() {
    let file = write_csv("DCGM_FI_DEV_GPU_TEMP, gauge, GPU temperature (in C).\n");
    let counters = load_counters(file.path()).unwrap();
    let info = FieldEntityGroupSystemInfo {
        system_info: SystemInfo {
            info_type: EntityGroup::Gpu,
        },
        device_fields: device_fields(&counters, EntityGroup::Gpu),
    };
    let backend = mig_power_exporter::device::readers::mock::MockBackend::demo();

    let collector = DcgmCollector::new(
        counters,
        String::new(),
        &Config::default(),
        info,
        Box::new(backend),
    )
    .unwrap();
    let metrics = collector.get_metrics().unwrap();

    assert_eq!(metrics.len(), 1);
    let temps = metrics.values().next().unwrap();
    assert_eq!(temps.len(), 3);
    assert!(temps.iter().all(|m| m.value == "41" && m.labels.is_empty()));
}
