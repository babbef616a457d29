//! Stats printer: a liveness line on a short cadence and
//! a full-stats line on a longer one, grounded on `decode.rs`'s periodic
//! `info!("pkts=... msgs=... live_orders=...")` logging.
use crate::aggregator::Aggregator;
use crate::util::BarrierFlag;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub fn run(
    aggregator: Arc<Aggregator>,
    liveness_interval: Duration,
    stats_interval: Duration,
    metrics_enabled: bool,
    shutdown: Arc<BarrierFlag>,
) {
    let mut last_liveness = Instant::now();
    let mut last_stats = Instant::now();
    let tick = Duration::from_millis(200).min(liveness_interval);

    while !shutdown.is_raised() {
        std::thread::sleep(tick);
        if shutdown.is_raised() {
            break;
        }

        let snapshot = aggregator.global().snapshot();

        if last_liveness.elapsed() >= liveness_interval {
            log::info!(
                "alive: devices={} total_packets={}",
                aggregator.cache_len(),
                snapshot.total_packets
            );
            last_liveness = Instant::now();
        }

        if last_stats.elapsed() >= stats_interval {
            log::info!(
                "stats: devices={} total={} arp={} tcp={} udp={} icmp={} dns={} http={} tls={}",
                aggregator.cache_len(),
                snapshot.total_packets,
                snapshot.arp_packets,
                snapshot.tcp_packets,
                snapshot.udp_packets,
                snapshot.icmp_packets,
                snapshot.dns_packets,
                snapshot.http_packets,
                snapshot.tls_packets,
            );
            if metrics_enabled {
                crate::metrics::publish_global(snapshot);
                crate::metrics::set_devices_tracked(aggregator.cache_len());
            }
            last_stats = Instant::now();
        }
    }
}
