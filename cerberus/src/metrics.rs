//! Internal metrics: a private `prometheus`
//! registry mirroring the counters already tracked in
//! [`crate::model::GlobalStats`] plus queue depth gauges, read in-process
//! by the stats printer. No HTTP exposition: scraping metrics over HTTP
//! is itself an out-of-scope REST surface.
use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntGaugeVec, Opts, Registry};

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

static TOTAL_PACKETS: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("total_packets", "Total classified packets observed").unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static ARP_PACKETS: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("arp_packets", "ARP packets observed").unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static TCP_PACKETS: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("tcp_packets", "TCP packets observed").unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static UDP_PACKETS: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("udp_packets", "UDP packets observed").unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static ICMP_PACKETS: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("icmp_packets", "ICMP packets observed").unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static DNS_PACKETS: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("dns_packets", "DNS packets observed").unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static HTTP_PACKETS: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("http_packets", "HTTP packets observed").unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static TLS_PACKETS: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("tls_packets", "TLS packets observed").unwrap();
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static DEVICES_TRACKED: Lazy<prometheus::IntGauge> = Lazy::new(|| {
    let g = prometheus::IntGauge::new("devices_tracked", "Entries in the device cache").unwrap();
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

static QUEUE_LEN: Lazy<IntGaugeVec> = Lazy::new(|| {
    let g = IntGaugeVec::new(
        Opts::new("queue_len", "Current length of internal queues"),
        &["queue"],
    )
    .unwrap();
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

/// Mirrors a [`crate::model::GlobalStatsSnapshot`] into the registry.
/// Called by the stats printer on each tick; counters only move forward
/// so re-publishing the same cumulative snapshot is harmless.
pub fn publish_global(snapshot: crate::model::GlobalStatsSnapshot) {
    set_counter(&TOTAL_PACKETS, snapshot.total_packets);
    set_counter(&ARP_PACKETS, snapshot.arp_packets);
    set_counter(&TCP_PACKETS, snapshot.tcp_packets);
    set_counter(&UDP_PACKETS, snapshot.udp_packets);
    set_counter(&ICMP_PACKETS, snapshot.icmp_packets);
    set_counter(&DNS_PACKETS, snapshot.dns_packets);
    set_counter(&HTTP_PACKETS, snapshot.http_packets);
    set_counter(&TLS_PACKETS, snapshot.tls_packets);
}

fn set_counter(counter: &IntCounter, value: u64) {
    let delta = value as i64 - counter.get() as i64;
    if delta > 0 {
        counter.inc_by(delta as u64);
    }
}

pub fn set_devices_tracked(n: usize) {
    DEVICES_TRACKED.set(n as i64);
}

pub fn set_queue_len(queue: &str, len: usize) {
    QUEUE_LEN.with_label_values(&[queue]).set(len as i64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_is_monotonic_safe() {
        publish_global(crate::model::GlobalStatsSnapshot {
            total_packets: 5,
            ..Default::default()
        });
        publish_global(crate::model::GlobalStatsSnapshot {
            total_packets: 3,
            ..Default::default()
        });
        assert_eq!(TOTAL_PACKETS.get(), 5);
    }

    #[test]
    fn queue_len_tracks_last_set_value() {
        set_queue_len("new_device", 7);
        assert_eq!(QUEUE_LEN.with_label_values(&["new_device"]).get(), 7);
        set_queue_len("new_device", 2);
        assert_eq!(QUEUE_LEN.with_label_values(&["new_device"]).get(), 2);
    }
}
