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

//! Counter descriptors and their configuration.
//!
//! Counters are read from the dcgm-exporter CSV format:
//!
//! ```text
//! # Format: DCGM field name, Prometheus metric type, help message
//! DCGM_FI_DEV_POWER_USAGE, gauge, Power draw (in W).
//! DCGM_FI_DRIVER_VERSION,  label, Driver Version.
//! ```

use crate::device::fields::{self, FieldId, DCGM_FI_DRIVER_VERSION};
use crate::device::types::EntityGroup;
use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PromType {
    Gauge,
    Counter,
    Histogram,
    /// Not emitted on its own; the value becomes a label on the entity's
    /// other metrics.
    Label,
}

impl FromStr for PromType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gauge" => Ok(PromType::Gauge),
            "counter" => Ok(PromType::Counter),
            "histogram" => Ok(PromType::Histogram),
            "label" => Ok(PromType::Label),
            other => Err(format!("unknown metric type '{other}'")),
        }
    }
}

impl fmt::Display for PromType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PromType::Gauge => "gauge",
            PromType::Counter => "counter",
            PromType::Histogram => "histogram",
            PromType::Label => "label",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Counter {
    pub field_id: FieldId,
    pub field_name: String,
    pub prom_type: PromType,
    pub help: String,
}

impl Counter {
    pub fn new(field_id: FieldId, field_name: &str, prom_type: PromType, help: &str) -> Self {
        Self {
            field_id,
            field_name: field_name.to_string(),
            prom_type,
            help: help.to_string(),
        }
    }

    pub fn is_label(&self) -> bool {
        self.prom_type == PromType::Label
    }
}

/// Look up the counter configured for a field.
pub fn find_counter_field(counters: &[Counter], field_id: FieldId) -> Result<&Counter> {
    counters
        .iter()
        .find(|c| c.field_id == field_id)
        .ok_or(Error::CounterNotFound(field_id))
}

/// Parse counter definitions. Field names must be known; duplicate fields are
/// rejected so that resolution by field id stays unambiguous.
pub fn parse_counters_csv(input: &str) -> Result<Vec<Counter>> {
    let mut counters: Vec<Counter> = Vec::new();

    for (idx, raw) in input.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let invalid = |reason: String| Error::InvalidCounter {
            line: idx + 1,
            reason,
        };

        let mut parts = line.splitn(3, ',').map(str::trim);
        let (name, kind, help) = match (parts.next(), parts.next(), parts.next()) {
            (Some(name), Some(kind), Some(help)) => (name, kind, help),
            _ => return Err(invalid(format!("expected 3 columns in '{line}'"))),
        };

        let meta = fields::field_by_name(name)
            .ok_or_else(|| invalid(format!("unknown field '{name}'")))?;
        let prom_type = kind.parse::<PromType>().map_err(invalid)?;

        if counters.iter().any(|c| c.field_id == meta.id) {
            return Err(invalid(format!("field '{name}' configured twice")));
        }
        counters.push(Counter::new(meta.id, meta.name, prom_type, help));
    }

    Ok(counters)
}

pub fn load_counters(path: &Path) -> Result<Vec<Counter>> {
    let contents = std::fs::read_to_string(path)?;
    parse_counters_csv(&contents)
}

const DEFAULT_COUNTERS: &str = "\
# Clocks
DCGM_FI_DEV_SM_CLOCK,  gauge, SM clock frequency (in MHz).
DCGM_FI_DEV_MEM_CLOCK, gauge, Memory clock frequency (in MHz).
# Temperature
DCGM_FI_DEV_MEMORY_TEMP, gauge, Memory temperature (in C).
DCGM_FI_DEV_GPU_TEMP,    gauge, GPU temperature (in C).
# Power
DCGM_FI_DEV_POWER_USAGE,              gauge,   Power draw (in W).
DCGM_FI_DEV_TOTAL_ENERGY_CONSUMPTION, counter, Total energy consumption since boot (in mJ).
# Utilization
DCGM_FI_DEV_GPU_UTIL,      gauge, GPU utilization (in %).
DCGM_FI_DEV_MEM_COPY_UTIL, gauge, Memory utilization (in %).
# Memory usage
DCGM_FI_DEV_FB_FREE, gauge, Framebuffer memory free (in MiB).
DCGM_FI_DEV_FB_USED, gauge, Framebuffer memory used (in MiB).
# Profiling
DCGM_FI_PROF_PIPE_TENSOR_ACTIVE, gauge, Ratio of cycles the tensor (HMMA) pipe is active.
DCGM_FI_PROF_DRAM_ACTIVE,        gauge, Ratio of cycles the device memory interface is active sending or receiving data.
# Labels
DCGM_FI_DRIVER_VERSION, label, Driver Version.
";

/// The counter set used when no counters file is configured.
pub fn default_counters() -> Vec<Counter> {
    // The built-in table only names known fields and has no duplicates.
    parse_counters_csv(DEFAULT_COUNTERS).unwrap_or_default()
}

/// Field ids of the counters that apply to an entity group. Fields missing
/// from the known-field table are assumed to be GPU fields.
pub fn device_fields(counters: &[Counter], group: EntityGroup) -> Vec<FieldId> {
    counters
        .iter()
        .filter(|c| {
            fields::field_by_id(c.field_id)
                .map(|meta| meta.scope.applies_to(group))
                .unwrap_or(matches!(group, EntityGroup::Gpu | EntityGroup::GpuInstance))
        })
        .map(|c| c.field_id)
        .collect()
}

/// A field list holding only the driver version says nothing about the
/// entities themselves, so such an entity type is not worth a collector.
pub fn should_monitor_device_type(fields: &[FieldId], _group: EntityGroup) -> bool {
    match fields {
        [] => false,
        [only] => *only != DCGM_FI_DRIVER_VERSION,
        _ => true,
    }
}
