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

use chrono::Utc;
use clap::Parser;
use clap::ValueEnum;
use mig_power_exporter::cli::{Cli, CollectArgs, Commands, CountersArgs};
use mig_power_exporter::common::config::{AppConfig, Config};
use mig_power_exporter::device::{
    create_backend, EntityGroup, FieldEntityGroupSystemInfo, SystemInfo,
};
use mig_power_exporter::error::Result;
use mig_power_exporter::metrics::counter::{
    default_counters, device_fields, load_counters, should_monitor_device_type, Counter,
};
use mig_power_exporter::metrics::metric::{snapshot, MetricsByCounter};
use mig_power_exporter::metrics::DcgmCollector;
use mig_power_exporter::utils::get_hostname;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // stdout carries the JSON snapshots
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| AppConfig::LOG_FILTER_DEFAULT.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Collect(args)) => run_collect(&args).await,
        Some(Commands::Counters(args)) => print_counters(&args),
        None => run_collect(&CollectArgs::default()).await,
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}

fn resolve_counters(path: Option<&Path>) -> Result<Vec<Counter>> {
    match path {
        Some(path) => {
            let counters = load_counters(path)?;
            info!("Loaded {} counters from {}", counters.len(), path.display());
            Ok(counters)
        }
        None => Ok(default_counters()),
    }
}

async fn run_collect(args: &CollectArgs) -> Result<()> {
    let config = Config::from(args);
    let counters = resolve_counters(config.collectors_file.as_deref())?;

    let fields = device_fields(&counters, config.entity_type);
    if !should_monitor_device_type(&fields, config.entity_type) {
        warn!(
            "No configured counters apply to {} entities, nothing to collect",
            config.entity_type
        );
        return Ok(());
    }

    let hostname = get_hostname(&config)?;
    let backend = create_backend(config.backend)?;
    let info = FieldEntityGroupSystemInfo {
        system_info: SystemInfo {
            info_type: config.entity_type,
        },
        device_fields: fields,
    };
    let mut collector = DcgmCollector::new(counters, hostname.clone(), &config, info, backend)?;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(Duration::from_millis(config.collect_interval_ms()));

    let result = loop {
        tokio::select! {
            _ = ticker.tick() => {
                match collector.get_metrics() {
                    Ok(metrics) => {
                        print_snapshot(&hostname, config.entity_type, &metrics);
                        if args.once {
                            break Ok(());
                        }
                    }
                    Err(e) if e.is_fatal() || args.once => break Err(e),
                    Err(e) => error!("Collection cycle failed: {e}"),
                }
            }
            _ = &mut shutdown => {
                info!("Shutting down");
                break Ok(());
            }
        }
    };

    collector.cleanup();
    result
}

fn print_snapshot(hostname: &str, entity_type: EntityGroup, metrics: &MetricsByCounter) {
    let document = json!({
        "timestamp": Utc::now().to_rfc3339(),
        "hostname": hostname,
        "entity_type": entity_type,
        "counters": snapshot(metrics),
    });
    println!("{document}");
}

fn print_counters(args: &CountersArgs) -> Result<()> {
    let counters = resolve_counters(args.collectors.as_deref())?;

    println!("{:<8} {:<44} {:<10} HELP", "FIELD", "NAME", "TYPE");
    for counter in &counters {
        println!(
            "{:<8} {:<44} {:<10} {}",
            counter.field_id,
            counter.field_name,
            counter.prom_type.to_string(),
            counter.help
        );
    }

    println!();
    for group in EntityGroup::value_variants() {
        let fields = device_fields(&counters, *group);
        let state = if should_monitor_device_type(&fields, *group) {
            "collected"
        } else {
            "skipped"
        };
        println!("{:<18} {state:<10} {fields:?}", group.to_string());
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
