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

//! MIG resource cache and power attribution.
//!
//! Power is measured once per physical GPU. Each MIG instance on that GPU is
//! credited with a share of it:
//!
//! * idle power, `min(IDLE_POWER_WATTS, P)`, split by slice count out of
//!   [`MIG_SLICES_PER_GPU`];
//! * active power, the remainder, split by the instance's weighted resource
//!   utilization relative to every instance on the GPU. When that ratio is
//!   undefined (all utilization zero, a malformed sibling profile, or the
//!   instance missing from the cache) active power is split by slice count
//!   as well.
//!
//! Profile names encode the slice count in their first character
//! (`3g.20gb` has 3 slices). This holds while MIG partitions are at most
//! 7-way; anything else is rejected rather than guessed.

use crate::device::fields::*;
use crate::device::traits::FieldSampler;
use crate::device::types::{FieldValue, MonitoredEntity};
use crate::error::{Error, Result};
use crate::metrics::counter::Counter;
use crate::metrics::value::{to_string, SKIP_DCGM_VALUE};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Static power floor of a GPU in watts, drawn regardless of load.
pub const IDLE_POWER_WATTS: f64 = 90.0;

/// Compute slices of a full GPU.
pub const MIG_SLICES_PER_GPU: u32 = 7;

/// Relative power cost of each profiled resource.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MigResourceWeights {
    pub tensor: f64,
    pub dram: f64,
    pub fp64: f64,
    pub fp32: f64,
    pub fp16: f64,
}

pub const MIG_RESOURCE_WEIGHTS: MigResourceWeights = MigResourceWeights {
    tensor: 0.338,
    dram: 0.152,
    fp64: 0.17,
    fp32: 0.17,
    fp16: 0.17,
};

/// Utilization of one MIG instance during the current cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigResourceSample {
    pub gpu: u32,
    pub instance_id: String,
    pub profile: String,
    pub tensor: f64,
    pub dram: f64,
    pub fp64: f64,
    pub fp32: f64,
    pub fp16: f64,
}

impl MigResourceSample {
    pub fn new(gpu: u32, instance_id: impl Into<String>, profile: impl Into<String>) -> Self {
        Self {
            gpu,
            instance_id: instance_id.into(),
            profile: profile.into(),
            ..Default::default()
        }
    }

    fn record(&mut self, field_id: FieldId, value: f64) {
        match field_id {
            DCGM_FI_PROF_PIPE_TENSOR_ACTIVE => self.tensor = value,
            DCGM_FI_PROF_DRAM_ACTIVE => self.dram = value,
            DCGM_FI_PROF_PIPE_FP64_ACTIVE => self.fp64 = value,
            DCGM_FI_PROF_PIPE_FP32_ACTIVE => self.fp32 = value,
            DCGM_FI_PROF_PIPE_FP16_ACTIVE => self.fp16 = value,
            _ => {}
        }
    }

    /// Utilization scaled by slice count and resource weight, in the order
    /// tensor, DRAM, FP64, FP32, FP16.
    pub fn weighted(&self, slices: u32, weights: &MigResourceWeights) -> [f64; 5] {
        let s = slices as f64;
        [
            self.tensor * s * weights.tensor,
            self.dram * s * weights.dram,
            self.fp64 * s * weights.fp64,
            self.fp32 * s * weights.fp32,
            self.fp16 * s * weights.fp16,
        ]
    }
}

/// Per-instance samples keyed by physical GPU index. Built fresh every cycle.
pub type MigResourceCache = HashMap<u32, Vec<MigResourceSample>>;

/// Slice count encoded in the first character of a MIG profile name.
pub fn slice_count(profile: &str) -> Result<u32> {
    profile
        .chars()
        .next()
        .and_then(|c| c.to_digit(10))
        .filter(|n| (1..=MIG_SLICES_PER_GPU).contains(n))
        .ok_or_else(|| Error::InvalidMigProfile(profile.to_string()))
}

/// Sample the profiling fields of every MIG instance. Missing, blank or
/// unparsable values count as zero utilization and out-of-range ones are
/// clamped to `[0, 1]`; an ordinary sampling failure zeroes the whole
/// instance. Only connection loss is returned as an error.
pub fn build_mig_cache<S: FieldSampler + ?Sized>(
    sampler: &S,
    entities: &[MonitoredEntity],
) -> Result<MigResourceCache> {
    let mut cache = MigResourceCache::new();

    for entity in entities {
        let Some(instance) = &entity.instance_info else {
            continue;
        };

        let values = match sampler.entity_latest_values(
            entity.entity.group,
            entity.entity.id,
            &MIG_RESOURCE_FIELDS,
        ) {
            Ok(values) => values,
            Err(e) if e.is_connection_lost() => return Err(e.into()),
            Err(e) => {
                warn!(
                    "Could not sample MIG resources of {} {}: {e}",
                    entity.entity.group, entity.entity.id
                );
                Vec::new()
            }
        };

        let mut sample = MigResourceSample::new(
            entity.device_info.gpu,
            instance.nvml_instance_id.to_string(),
            instance.profile_name.as_str(),
        );
        for value in &values {
            if let Some(v) = utilization(value) {
                sample.record(value.field_id, v);
            }
        }

        cache.entry(entity.device_info.gpu).or_default().push(sample);
    }

    debug!("MIG resource cache: {cache:?}");
    Ok(cache)
}

fn utilization(value: &FieldValue) -> Option<f64> {
    let s = to_string(value);
    if s == SKIP_DCGM_VALUE {
        return None;
    }
    match s.parse::<f64>() {
        Ok(v) if (0.0..=1.0).contains(&v) => Some(v),
        Ok(v) if v.is_finite() => {
            warn!(
                "Clamping out-of-range utilization {v} for field {}",
                value.field_id
            );
            Some(v.clamp(0.0, 1.0))
        }
        _ => {
            warn!("Ignoring unusable utilization '{s}' for field {}", value.field_id);
            None
        }
    }
}

/// Attribute a share of the GPU's power to one instance. Non-power counters
/// are returned untouched, and so is the value itself when the instance's
/// own profile or the measured power cannot be parsed.
pub fn mig_device_resource(
    value: &str,
    profile: &str,
    instance_id: &str,
    gpu: u32,
    counter: &Counter,
    cache: &MigResourceCache,
) -> String {
    if counter.field_id != DCGM_FI_DEV_POWER_USAGE {
        return value.to_string();
    }

    let slices = match slice_count(profile) {
        Ok(slices) => slices,
        Err(e) => {
            warn!("Not attributing power of GPU {gpu} instance {instance_id}: {e}");
            return value.to_string();
        }
    };
    let measured = match value.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => {
            warn!("Not attributing unparsable power '{value}' of GPU {gpu}");
            return value.to_string();
        }
    };

    let samples = cache.get(&gpu).map(Vec::as_slice).unwrap_or_default();
    let total = attribute_power(measured, slices, instance_id, samples);
    debug!(
        "GPU {gpu} instance {instance_id} ({profile}): {measured:.3} W measured, {total:.3} W attributed"
    );
    format!("{total:.6}")
}

/// Idle share plus active share of `measured` watts for the instance
/// `instance_id` with `slices` slices, given every sample on its GPU.
pub fn attribute_power(
    measured: f64,
    slices: u32,
    instance_id: &str,
    samples: &[MigResourceSample],
) -> f64 {
    let idle = IDLE_POWER_WATTS.min(measured);
    let active = measured - idle;
    let slice_share = slices as f64 / MIG_SLICES_PER_GPU as f64;

    let idle_share = idle * slice_share;
    let active_share = match weighted_share(instance_id, samples) {
        Some(share) => active * share,
        None => {
            debug!("Falling back to slice-proportional active power for instance {instance_id}");
            active * slice_share
        }
    };

    idle_share + active_share
}

/// Fraction of the GPU's weighted utilization belonging to `instance_id`,
/// or `None` when it is undefined.
fn weighted_share(instance_id: &str, samples: &[MigResourceSample]) -> Option<f64> {
    let mut totals = [0.0_f64; 5];
    let mut target: Option<f64> = None;

    for sample in samples {
        let slices = match slice_count(&sample.profile) {
            Ok(slices) => slices,
            Err(e) => {
                warn!("Skipping weighted attribution on GPU {}: {e}", sample.gpu);
                return None;
            }
        };
        let weighted = sample.weighted(slices, &MIG_RESOURCE_WEIGHTS);
        for (total, w) in totals.iter_mut().zip(weighted) {
            *total += w;
        }
        if sample.instance_id == instance_id {
            target = Some(weighted.iter().sum());
        }
    }

    let share = target? / totals.iter().sum::<f64>();
    share.is_finite().then_some(share)
}
