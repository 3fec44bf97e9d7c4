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

//! The mig-power-exporter prelude.
//!
//! Re-exports the types needed to build a collector and run cycles:
//!
//! ```rust,no_run
//! use mig_power_exporter::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let config = Config::default();
//!     let counters = default_counters();
//!     let info = FieldEntityGroupSystemInfo {
//!         system_info: SystemInfo { info_type: EntityGroup::Gpu },
//!         device_fields: device_fields(&counters, EntityGroup::Gpu),
//!     };
//!     let backend = create_backend(config.backend)?;
//!     let hostname = get_hostname(&config)?;
//!     let collector = DcgmCollector::new(counters, hostname, &config, info, backend)?;
//!
//!     for (counter, metrics) in collector.get_metrics()? {
//!         println!("{}: {} metrics", counter.field_name, metrics.len());
//!     }
//!     Ok(())
//! }
//! ```

// Configuration
pub use crate::common::config::{AppConfig, BackendKind, Config};

// Error types
pub use crate::error::{Error, Result};

// Backends
pub use crate::device::{
    create_backend, DcgmBackend, DcgmError, EntityGroup, FieldEntityGroupSystemInfo, FieldValue,
    MonitoredEntity, SystemInfo,
};

// Collection
pub use crate::metrics::counter::{default_counters, device_fields, load_counters};
pub use crate::metrics::{Counter, DcgmCollector, Metric, MetricsByCounter, PromType};

pub use crate::utils::get_hostname;
