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

use crate::common::config::{AppConfig, BackendKind, Config};
use crate::device::types::EntityGroup;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Collect metrics on an interval and print each cycle as JSON. (default)
    Collect(CollectArgs),
    /// Print the resolved counter table and the fields watched per entity type.
    Counters(CountersArgs),
}

#[derive(Parser, Clone, Debug)]
pub struct CollectArgs {
    /// Collection interval in milliseconds.
    #[arg(short, long, default_value_t = AppConfig::DEFAULT_COLLECT_INTERVAL_MS)]
    pub interval: u64,
    /// Run a single cycle and exit.
    #[arg(long)]
    pub once: bool,
    /// Counter definitions in CSV form (`NAME, type, help`).
    #[arg(short = 'f', long)]
    pub collectors: Option<PathBuf>,
    /// Entity type to collect.
    #[arg(long, value_enum, default_value_t = EntityGroup::Gpu)]
    pub entity_type: EntityGroup,
    /// Sampling backend.
    #[arg(long, value_enum, default_value_t = BackendKind::Nvml)]
    pub backend: BackendKind,
    /// Replace whitespace in GPU model names with hyphens.
    #[arg(long)]
    pub replace_blanks_in_model_name: bool,
    /// Name the UUID label `uuid` instead of `UUID`.
    #[arg(long)]
    pub use_old_namespace: bool,
    /// Leave the hostname label empty.
    #[arg(long)]
    pub no_hostname: bool,
}

impl Default for CollectArgs {
    fn default() -> Self {
        Self {
            interval: AppConfig::DEFAULT_COLLECT_INTERVAL_MS,
            once: false,
            collectors: None,
            entity_type: EntityGroup::Gpu,
            backend: BackendKind::Nvml,
            replace_blanks_in_model_name: false,
            use_old_namespace: false,
            no_hostname: false,
        }
    }
}

impl From<&CollectArgs> for Config {
    fn from(args: &CollectArgs) -> Self {
        Config {
            collectors_file: args.collectors.clone(),
            collect_interval_ms: args.interval,
            use_old_namespace: args.use_old_namespace,
            replace_blanks_in_model_name: args.replace_blanks_in_model_name,
            no_hostname: args.no_hostname,
            entity_type: args.entity_type,
            backend: args.backend,
        }
    }
}

#[derive(Parser, Clone, Debug)]
pub struct CountersArgs {
    /// Counter definitions in CSV form (`NAME, type, help`).
    #[arg(short = 'f', long)]
    pub collectors: Option<PathBuf>,
}
