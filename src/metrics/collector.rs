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

//! One collector per monitored entity type.

use crate::common::config::Config;
use crate::device::fields::FieldId;
use crate::device::traits::{DcgmBackend, WatchGuard};
use crate::device::types::{EntityGroup, FieldEntityGroupSystemInfo, SystemInfo};
use crate::error::{Error, Result};
use crate::metrics::builders::{to_entity_metric, BuildContext};
use crate::metrics::counter::Counter;
use crate::metrics::metric::MetricsByCounter;
use crate::metrics::mig::build_mig_cache;
use tracing::{debug, info};

/// Samples every entity of one type and turns the values into metrics.
///
/// Field watches acquired on construction are held until [`cleanup`] or drop.
///
/// [`cleanup`]: DcgmCollector::cleanup
pub struct DcgmCollector {
    counters: Vec<Counter>,
    device_fields: Vec<FieldId>,
    sys_info: SystemInfo,
    hostname: String,
    use_old_namespace: bool,
    replace_blanks_in_model_name: bool,
    backend: Box<dyn DcgmBackend>,
    watches: Vec<WatchGuard>,
}

impl DcgmCollector {
    pub fn new(
        counters: Vec<Counter>,
        hostname: String,
        config: &Config,
        fields_info: FieldEntityGroupSystemInfo,
        backend: Box<dyn DcgmBackend>,
    ) -> Result<Self> {
        if fields_info.is_empty() {
            return Err(Error::EmptySystemInfo);
        }

        let update_freq_us = (config.collect_interval_ms() as i64).saturating_mul(1000);
        let watches = backend.watch_fields(
            &fields_info.device_fields,
            &fields_info.system_info,
            update_freq_us,
        )?;
        info!(
            "Watching {} fields for {} entities every {} ms",
            fields_info.device_fields.len(),
            fields_info.system_info.info_type,
            config.collect_interval_ms()
        );

        Ok(Self {
            counters,
            device_fields: fields_info.device_fields,
            sys_info: fields_info.system_info,
            hostname,
            use_old_namespace: config.use_old_namespace,
            replace_blanks_in_model_name: config.replace_blanks_in_model_name,
            backend,
            watches,
        })
    }

    pub fn entity_type(&self) -> EntityGroup {
        self.sys_info.info_type
    }

    pub fn counters(&self) -> &[Counter] {
        &self.counters
    }

    /// Run one collection cycle. The first sampling failure aborts the cycle;
    /// a lost connection comes back as [`Error::ConnectionLost`].
    pub fn get_metrics(&self) -> Result<MetricsByCounter> {
        let entities = self.backend.monitored_entities(self.sys_info.info_type)?;
        let mig_cache = build_mig_cache(&*self.backend, &entities)?;

        let ctx = BuildContext {
            counters: &self.counters,
            hostname: &self.hostname,
            use_old_namespace: self.use_old_namespace,
            replace_blanks_in_model_name: self.replace_blanks_in_model_name,
        };

        let mut metrics = MetricsByCounter::new();
        for entity in &entities {
            let values = if entity.entity.group == EntityGroup::Link {
                self.backend.link_latest_values(
                    entity.entity.id,
                    entity.parent_id,
                    &self.device_fields,
                )?
            } else {
                self.backend.entity_latest_values(
                    entity.entity.group,
                    entity.entity.id,
                    &self.device_fields,
                )?
            };

            to_entity_metric(&mut metrics, &values, &ctx, entity, &mig_cache);
        }

        debug!(
            "Collected {} counters from {} entities",
            metrics.len(),
            entities.len()
        );
        Ok(metrics)
    }

    /// Release every field watch. Safe to call more than once.
    pub fn cleanup(&mut self) {
        if self.watches.is_empty() {
            return;
        }
        debug!(
            "Releasing {} field watches for {}",
            self.watches.len(),
            self.sys_info.info_type
        );
        self.watches.drain(..).for_each(drop);
    }
}

impl Drop for DcgmCollector {
    fn drop(&mut self) {
        self.cleanup();
    }
}
