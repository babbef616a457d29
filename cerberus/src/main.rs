// src/main.rs
mod aggregator;
mod classify;
mod config;
mod iface;
mod ingest;
mod l7;
mod metrics;
mod model;
mod notify;
mod snapshot;
mod stats;
mod tables;
mod util;
mod wire;

use crate::config::AppConfig;
use crate::util::BarrierFlag;
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    let cfg_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let cfg = AppConfig::from_file(&cfg_path)?;

    if cfg.general.json_logs {
        let mut b =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
        b.format(|buf, record| {
            use std::io::Write;
            let ts = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
            writeln!(
                buf,
                "{{\"ts\":\"{}\",\"level\":\"{}\",\"target\":\"{}\",\"msg\":\"{}\"}}",
                ts,
                record.level(),
                record.target(),
                record.args().to_string().replace('"', "'")
            )
        })
        .init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    info!("loaded config: {:?}", cfg);

    let shutdown = Arc::new(BarrierFlag::default());
    {
        let s = shutdown.clone();
        ctrlc::set_handler(move || {
            s.raise();
        })?;
    }

    let store = Arc::new(snapshot::SnapshotStore::open(&cfg.snapshot.path)?);
    let (notifier, new_device_rx, new_pattern_rx) = notify::Notifier::new(
        cfg.channels.new_device_capacity,
        cfg.channels.new_pattern_capacity,
    );
    let aggregator = Arc::new(aggregator::Aggregator::new(
        cfg.cache.device_capacity,
        store.clone(),
        notifier,
    ));

    // Not joined: this subscriber runs for the process lifetime and exits
    // with it once the notifier's senders are dropped alongside `aggregator`.
    let _console_handle = thread::Builder::new()
        .name("notify-console".into())
        .spawn(move || notify::run_console_subscriber(new_device_rx, new_pattern_rx))?;

    let mut supervisor = iface::AttachmentSupervisor::attach(
        aya::include_bytes_aligned!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../cerberus-ebpf/target/bpfel-unknown-none/release/cerberus"
        )),
        &cfg.interfaces.names,
    )?;
    let attached = supervisor.attached_interfaces();
    info!("attached to interfaces: {:?}", attached);
    let iface_label = attached.first().cloned().unwrap_or_else(|| "unknown".to_string());
    let ring_buf = supervisor.take_events_map()?;

    let t_ingest = {
        let aggregator = aggregator.clone();
        let shutdown = shutdown.clone();
        thread::Builder::new()
            .name("ingest".into())
            .spawn(move || ingest::run(ring_buf, aggregator, iface_label, shutdown))?
    };

    let t_snapshot = {
        let aggregator_for_devices = aggregator.clone();
        let store = store.clone();
        let shutdown = shutdown.clone();
        let period = Duration::from_secs(cfg.snapshot.interval_secs);
        snapshot::spawn_periodic_flush(
            store,
            move || aggregator_for_devices.cache_entries(),
            period,
            shutdown,
        )
    };

    let t_stats = {
        let aggregator = aggregator.clone();
        let shutdown = shutdown.clone();
        let liveness = Duration::from_secs(cfg.general.liveness_interval_secs);
        let full = Duration::from_secs(cfg.general.stats_interval_secs);
        let metrics_enabled = cfg.metrics.enable;
        thread::Builder::new()
            .name("stats".into())
            .spawn(move || stats::run(aggregator, liveness, full, metrics_enabled, shutdown))?
    };

    if t_ingest.join().is_err() {
        error!("ingestion thread panicked");
    }
    if t_snapshot.join().is_err() {
        error!("snapshot thread panicked");
    }
    if t_stats.join().is_err() {
        error!("stats thread panicked");
    }

    supervisor.detach_all();

    info!("clean shutdown");
    Ok(())
}
