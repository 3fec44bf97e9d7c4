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

use crate::metrics::counter::Counter;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;

/// One observation of one counter on one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    #[serde(skip)]
    pub counter: Counter,
    pub value: String,

    /// Name of the UUID label: `UUID`, or `uuid` under the old namespace.
    pub uuid: String,
    pub gpu: String,
    pub gpu_uuid: String,
    pub gpu_device: String,
    pub gpu_model_name: String,
    pub hostname: String,

    pub mig_profile: String,
    pub gpu_instance_id: String,

    pub labels: HashMap<String, String>,
    pub attributes: HashMap<String, String>,
}

/// Metrics of one cycle grouped by counter, each list in sampling order.
pub type MetricsByCounter = HashMap<Counter, Vec<Metric>>;

pub fn push_metric(metrics: &mut MetricsByCounter, metric: Metric) {
    metrics
        .entry(metric.counter.clone())
        .or_default()
        .push(metric);
}

/// Render a collection as JSON, counters ordered by field id.
pub fn snapshot(metrics: &MetricsByCounter) -> Value {
    let mut counters: Vec<&Counter> = metrics.keys().collect();
    counters.sort_by_key(|c| c.field_id);

    Value::Array(
        counters
            .into_iter()
            .map(|counter| {
                json!({
                    "counter": counter,
                    "metrics": metrics[counter],
                })
            })
            .collect(),
    )
}
