//! The aggregator / device cache: an LRU-bounded
//! map of MAC → [`Device`], the global counters, and the two notification
//! channels. The single shared mutable structure in the process; readers
//! (snapshot worker, stats printer) and the one writer (the ingestion
//! task) coordinate through a single `RwLock`.
use crate::classify::{self, Protocol, TrafficType};
use crate::l7::{self, TlsHandshakeKind};
use crate::model::{CommunicationPattern, Device, FlowStats, GlobalStats};
use crate::notify::Notifier;
use crate::snapshot::SnapshotStore;
use crate::tables;
use crate::wire::{self, ZERO_IP};
use cerberus_common::{event_type, WireEvent};
use chrono::Utc;
use hashbrown::HashMap;
use std::sync::RwLock;

/// Bounded, least-recently-updated cache of device records. Grounded on
/// `orderbook.rs`'s `hashbrown::HashMap`-keyed instrument map; eviction
/// order is tracked with a logical clock per entry rather than a true
/// intrusive linked list, since the recency set is scanned only on the
/// rare insert that triggers eviction.
pub struct DeviceCache {
    map: HashMap<String, Device>,
    recency: HashMap<String, u64>,
    clock: u64,
    capacity: usize,
}

impl DeviceCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            map: HashMap::new(),
            recency: HashMap::new(),
            clock: 0,
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    fn touch(&mut self, key: &str) {
        self.clock += 1;
        self.recency.insert(key.to_string(), self.clock);
    }

    /// Inserts `device` under `key`, evicting the least-recently-touched
    /// entry if the cache is at capacity and `key` is not already present.
    /// No flush-on-evict: the evicted device simply loses any unsnapshotted
    /// updates in memory, though its last flushed record survives on disk.
    fn upsert(&mut self, key: String, device: Device) {
        if !self.map.contains_key(&key) && self.map.len() >= self.capacity {
            if let Some(evict_key) = self
                .recency
                .iter()
                .min_by_key(|(_, &clock)| clock)
                .map(|(k, _)| k.clone())
            {
                self.map.remove(&evict_key);
                self.recency.remove(&evict_key);
            }
        }
        self.touch(&key);
        self.map.insert(key, device);
    }

    pub fn get(&self, key: &str) -> Option<&Device> {
        self.map.get(key)
    }

    /// Copies out every current key (enumerate the key set
    /// under the read lock, then release before serializing).
    pub fn keys_snapshot(&self) -> Vec<String> {
        self.map.keys().cloned().collect()
    }
}

pub struct Aggregator {
    cache: RwLock<DeviceCache>,
    global: GlobalStats,
    store: std::sync::Arc<SnapshotStore>,
    notifier: Notifier,
}

impl Aggregator {
    pub fn new(capacity: usize, store: std::sync::Arc<SnapshotStore>, notifier: Notifier) -> Self {
        Self {
            cache: RwLock::new(DeviceCache::new(capacity)),
            global: GlobalStats::default(),
            store,
            notifier,
        }
    }

    pub fn global(&self) -> &GlobalStats {
        &self.global
    }

    pub fn cache_len(&self) -> usize {
        self.cache.read().unwrap().len()
    }

    /// Copies out a device record under the read lock (readers
    /// see a consistent per-device snapshot, not a cross-device view).
    pub fn device(&self, mac: &str) -> Option<Device> {
        self.cache.read().unwrap().get(mac).cloned()
    }

    pub fn cache_keys(&self) -> Vec<String> {
        self.cache.read().unwrap().keys_snapshot()
    }

    pub fn cache_entries(&self) -> Vec<Device> {
        self.cache.read().unwrap().map.values().cloned().collect()
    }

    /// `ingest`: the single mutation path for the device
    /// cache. Returns `Ok(false)` for an unrecognized/all-zero record
    /// (no counter update), `Ok(true)` otherwise.
    pub fn ingest(&self, ev: &WireEvent, iface: &str) -> anyhow::Result<bool> {
        let Some(protocol) = classify::protocol_for(ev) else {
            return Ok(false);
        };
        let now = Utc::now();
        bump_family_counter(&self.global, protocol);

        let src_mac = wire::mac_to_string(&ev.src_mac);
        let src_ip = wire::ip_to_dotted(ev.src_ip_dotted());
        let dst_ip = wire::ip_to_dotted(ev.dst_ip_dotted());

        let tls_kind = if ev.event_type == event_type::TLS {
            Some(l7::tls_handshake_kind(&ev.l7_payload))
        } else {
            None
        };
        let http_method = if ev.event_type == event_type::HTTP {
            l7::http_request_line(&ev.l7_payload).map(|(m, _)| m)
        } else {
            None
        };
        let dns_response = if ev.event_type == event_type::DNS {
            ev.l7_payload.get(2).map(|b| b & 0x80 != 0).unwrap_or(false)
        } else {
            false
        };
        let tt = classify::traffic_type(ev, tls_kind, dns_response, http_method);
        let service = classify::service_label(ev, protocol, &tt);
        let l7_info = l7_info_for(ev, protocol, http_method);

        let mut cache = self.cache.write().unwrap();
        let mut is_new = false;
        let mut device = match cache.get(&src_mac).cloned() {
            Some(d) => d,
            None => match self.store.get(&src_mac) {
                Some(d) => d,
                None => {
                    is_new = true;
                    Device::new(
                        src_mac.clone(),
                        tables::vendor_for_mac(&ev.src_mac).to_string(),
                        iface.to_string(),
                        now,
                    )
                }
            },
        };

        device.last_seen = now;
        if src_ip != ZERO_IP && device.ip != src_ip {
            device.ip = src_ip.clone();
        }

        *device.traffic_type_counts.entry(tt.to_string()).or_insert(0) += 1;
        *device.services.entry(service.clone()).or_insert(0) += 1;

        if let Some(info) = &l7_info {
            match protocol {
                Protocol::Dns => {
                    *device.dns_domains.entry(info.clone()).or_insert(0) += 1;
                    device.dns_queries += 1;
                }
                Protocol::Http => {
                    *device.http_hosts.entry(info.clone()).or_insert(0) += 1;
                    device.http_requests += 1;
                }
                Protocol::Tls => {
                    *device.tls_snis.entry(info.clone()).or_insert(0) += 1;
                    device.tls_connections += 1;
                }
                _ => {}
            }
        }

        match protocol {
            Protocol::Tcp | Protocol::Http | Protocol::Tls => device.tcp_connections += 1,
            Protocol::Udp | Protocol::Dns => device.udp_connections += 1,
            Protocol::Icmp => device.icmp_packets += 1,
            Protocol::Arp => {
                if ev.arp_op == 1 {
                    device.request_count += 1;
                } else {
                    device.reply_count += 1;
                }
            }
        }

        device.push_recent_target(&dst_ip);

        let flow_key = format!("{protocol}:{src_ip}->{dst_ip}:{}", ev.dst_port);
        let flow = device
            .flow_stats
            .entry(flow_key)
            .or_insert_with(|| FlowStats::new(now));
        flow.packet_count += 1;
        flow.last_seen = now;

        let key = classify::pattern_key(protocol, &src_ip, &dst_ip, ev.dst_port, &tt);
        let mut new_pattern = None;
        if !device.seen_patterns.contains(&key) {
            device.seen_patterns.insert(key.clone());
            new_pattern = Some(CommunicationPattern {
                src_mac: src_mac.clone(),
                src_ip,
                dst_ip,
                dst_port: ev.dst_port,
                protocol: protocol.to_string(),
                traffic_type: tt.to_string(),
                service,
                timestamp: now,
                l7_info,
                interface: iface.to_string(),
            });
        }

        cache.upsert(src_mac, device.clone());
        drop(cache);

        if is_new {
            self.notifier.new_device(device);
        }
        if let Some(p) = new_pattern {
            self.notifier.new_pattern(p);
        }

        Ok(true)
    }
}

/// Bumps `total_packets` plus exactly one per-family counter, keyed on the
/// final (possibly kernel-upgraded) protocol — an HTTP/TLS event counts as
/// HTTP/TLS only, never also as TCP; a DNS event counts as DNS only, never
/// also as UDP.
fn bump_family_counter(g: &GlobalStats, protocol: Protocol) {
    use std::sync::atomic::Ordering::Relaxed;
    g.total_packets.fetch_add(1, Relaxed);
    match protocol {
        Protocol::Arp => g.arp_packets.fetch_add(1, Relaxed),
        Protocol::Tcp => g.tcp_packets.fetch_add(1, Relaxed),
        Protocol::Udp => g.udp_packets.fetch_add(1, Relaxed),
        Protocol::Icmp => g.icmp_packets.fetch_add(1, Relaxed),
        Protocol::Dns => g.dns_packets.fetch_add(1, Relaxed),
        Protocol::Http => g.http_packets.fetch_add(1, Relaxed),
        Protocol::Tls => g.tls_packets.fetch_add(1, Relaxed),
    };
}

fn l7_info_for(ev: &WireEvent, protocol: Protocol, http_method: Option<&str>) -> Option<String> {
    match protocol {
        Protocol::Dns => {
            let name = l7::dns_query_name(&ev.l7_payload);
            if name.is_empty() {
                None
            } else {
                Some(name)
            }
        }
        Protocol::Http => {
            let (_, path) = l7::http_request_line(&ev.l7_payload)?;
            let method = http_method.unwrap_or("");
            if path.is_empty() {
                Some(method.to_string())
            } else {
                Some(format!("{method} {path}"))
            }
        }
        Protocol::Tls => match l7::tls_handshake_kind(&ev.l7_payload) {
            TlsHandshakeKind::ClientHello => Some("client_hello".to_string()),
            TlsHandshakeKind::ServerHello => Some("server_hello".to_string()),
            TlsHandshakeKind::Handshake => Some("handshake".to_string()),
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Notifier;
    use crate::snapshot::SnapshotStore;
    use cerberus_common::tcp_flag;
    use std::sync::Arc;

    fn new_agg(capacity: usize) -> (Aggregator, crossbeam_channel::Receiver<Device>, crossbeam_channel::Receiver<CommunicationPattern>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SnapshotStore::open(dir.path().join("snap.jsonl")).unwrap());
        let (notifier, new_device_rx, new_pattern_rx) = Notifier::new(100, 1000);
        (Aggregator::new(capacity, store, notifier), new_device_rx, new_pattern_rx)
    }

    fn arp_probe_event() -> WireEvent {
        let mut ev = WireEvent::zeroed();
        ev.event_type = event_type::ARP;
        ev.arp_op = 1;
        ev.src_mac = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff];
        ev.arp_sha = ev.src_mac;
        ev.dst_ip = [192, 168, 1, 50];
        ev
    }

    #[test]
    fn arp_probe_scenario() {
        let (agg, new_device_rx, new_pattern_rx) = new_agg(1000);
        agg.ingest(&arp_probe_event(), "eth0").unwrap();
        let d = agg.device("aa:bb:cc:dd:ee:ff").unwrap();
        assert_eq!(d.request_count, 1);
        assert!(new_device_rx.try_recv().is_ok());
        let p = new_pattern_rx.try_recv().unwrap();
        assert_eq!(p.traffic_type, "ARP_PROBE");
    }

    fn tcp_https_syn_event() -> WireEvent {
        let mut ev = WireEvent::zeroed();
        ev.event_type = event_type::TCP;
        ev.src_mac = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
        ev.src_ip = [192, 168, 0, 100];
        ev.dst_ip = [8, 8, 8, 8];
        ev.src_port = 51000;
        ev.dst_port = 443;
        ev.tcp_flags = tcp_flag::SYN;
        ev
    }

    #[test]
    fn pattern_dedup_across_repeated_ingests() {
        let (agg, _new_device_rx, new_pattern_rx) = new_agg(1000);
        let ev = tcp_https_syn_event();
        for _ in 0..3 {
            agg.ingest(&ev, "eth0").unwrap();
        }
        assert_eq!(new_pattern_rx.len(), 1);
        let d = agg.device("01:02:03:04:05:06").unwrap();
        assert_eq!(d.tcp_connections, 3);
        assert_eq!(d.services["HTTPS"], 3);
    }

    #[test]
    fn recent_targets_cap_from_distinct_destinations() {
        let (agg, ..) = new_agg(1000);
        for i in 1u8..=25 {
            let mut ev = tcp_https_syn_event();
            ev.dst_ip = [192, 168, 0, i];
            agg.ingest(&ev, "eth0").unwrap();
        }
        let d = agg.device("01:02:03:04:05:06").unwrap();
        assert_eq!(d.recent_targets.len(), 20);
        assert_eq!(d.recent_targets.front().unwrap(), "192.168.0.6");
        assert_eq!(d.recent_targets.back().unwrap(), "192.168.0.25");
    }

    #[test]
    fn all_zero_record_is_rejected() {
        let (agg, ..) = new_agg(1000);
        let ev = WireEvent::zeroed();
        assert!(!agg.ingest(&ev, "eth0").unwrap());
        assert_eq!(agg.global().snapshot().total_packets, 0);
    }

    #[test]
    fn dns_event_bumps_exactly_one_family_counter() {
        let (agg, ..) = new_agg(1000);
        let mut ev = WireEvent::zeroed();
        ev.event_type = event_type::DNS;
        ev.src_mac = [0, 1, 2, 3, 4, 5];
        ev.src_ip = [192, 168, 0, 10];
        ev.dst_ip = [8, 8, 8, 8];
        ev.src_port = 51000;
        ev.dst_port = 53;
        agg.ingest(&ev, "eth0").unwrap();
        let snap = agg.global().snapshot();
        assert_eq!(snap.dns_packets, 1);
        assert_eq!(snap.udp_packets, 0);
        assert_eq!(snap.total_packets, 1);
    }

    #[test]
    fn http_event_bumps_exactly_one_family_counter() {
        let (agg, ..) = new_agg(1000);
        let mut ev = WireEvent::zeroed();
        ev.event_type = event_type::HTTP;
        ev.src_mac = [0, 1, 2, 3, 4, 6];
        ev.src_ip = [192, 168, 0, 11];
        ev.dst_ip = [93, 184, 216, 34];
        ev.src_port = 51001;
        ev.dst_port = 80;
        agg.ingest(&ev, "eth0").unwrap();
        let snap = agg.global().snapshot();
        assert_eq!(snap.http_packets, 1);
        assert_eq!(snap.tcp_packets, 0);
        assert_eq!(snap.total_packets, 1);
    }

    #[test]
    fn lru_cache_never_exceeds_bound() {
        let (agg, ..) = new_agg(4);
        for i in 0u8..10 {
            let mut ev = arp_probe_event();
            ev.src_mac = [0, 0, 0, 0, 0, i];
            ev.arp_sha = ev.src_mac;
            agg.ingest(&ev, "eth0").unwrap();
        }
        assert!(agg.cache_len() <= 4);
    }
}
