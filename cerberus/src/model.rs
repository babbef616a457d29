//! The data model: the cache value (`Device`), the emitted
//! pattern record, per-flow counters, and process-lifetime totals.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

pub const RECENT_TARGETS_CAP: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlowStats {
    pub packet_count: u64,
    pub byte_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl FlowStats {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            packet_count: 0,
            byte_count: 0,
            first_seen: now,
            last_seen: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommunicationPattern {
    pub src_mac: String,
    pub src_ip: String,
    pub dst_ip: String,
    pub dst_port: u16,
    pub protocol: String,
    pub traffic_type: String,
    pub service: String,
    pub timestamp: DateTime<Utc>,
    pub l7_info: Option<String>,
    pub interface: String,
}

/// The cache value, keyed by `mac`. `seen_patterns` and `flow_stats` are
/// excluded from the durable snapshot: they are transient,
/// rebuilt (empty) on rehydration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub mac: String,
    pub ip: String,
    pub vendor: String,
    pub interface: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub request_count: u64,
    pub reply_count: u64,
    pub tcp_connections: u64,
    pub udp_connections: u64,
    pub icmp_packets: u64,
    pub dns_queries: u64,
    pub http_requests: u64,
    pub tls_connections: u64,
    pub recent_targets: VecDeque<String>,
    pub services: HashMap<String, u64>,
    pub dns_domains: HashMap<String, u64>,
    pub http_hosts: HashMap<String, u64>,
    pub tls_snis: HashMap<String, u64>,
    pub traffic_type_counts: HashMap<String, u64>,

    #[serde(skip, default)]
    pub seen_patterns: HashSet<String>,
    #[serde(skip, default)]
    pub flow_stats: HashMap<String, FlowStats>,
}

impl Device {
    pub fn new(mac: String, vendor: String, interface: String, now: DateTime<Utc>) -> Self {
        Self {
            mac,
            ip: crate::wire::ZERO_IP.to_string(),
            vendor,
            interface,
            first_seen: now,
            last_seen: now,
            request_count: 0,
            reply_count: 0,
            tcp_connections: 0,
            udp_connections: 0,
            icmp_packets: 0,
            dns_queries: 0,
            http_requests: 0,
            tls_connections: 0,
            recent_targets: VecDeque::new(),
            services: HashMap::new(),
            dns_domains: HashMap::new(),
            http_hosts: HashMap::new(),
            tls_snis: HashMap::new(),
            traffic_type_counts: HashMap::new(),
            seen_patterns: HashSet::new(),
            flow_stats: HashMap::new(),
        }
    }

    /// Appends `target` if absent, evicting the oldest entry once the cap
    /// is exceeded. A no-op for `0.0.0.0`.
    pub fn push_recent_target(&mut self, target: &str) {
        if target == crate::wire::ZERO_IP {
            return;
        }
        if self.recent_targets.iter().any(|t| t == target) {
            return;
        }
        self.recent_targets.push_back(target.to_string());
        if self.recent_targets.len() > RECENT_TARGETS_CAP {
            self.recent_targets.pop_front();
        }
    }
}

#[derive(Debug, Default)]
pub struct GlobalStats {
    pub total_packets: std::sync::atomic::AtomicU64,
    pub arp_packets: std::sync::atomic::AtomicU64,
    pub tcp_packets: std::sync::atomic::AtomicU64,
    pub udp_packets: std::sync::atomic::AtomicU64,
    pub icmp_packets: std::sync::atomic::AtomicU64,
    pub dns_packets: std::sync::atomic::AtomicU64,
    pub http_packets: std::sync::atomic::AtomicU64,
    pub tls_packets: std::sync::atomic::AtomicU64,
}

impl GlobalStats {
    pub fn snapshot(&self) -> GlobalStatsSnapshot {
        use std::sync::atomic::Ordering::Relaxed;
        GlobalStatsSnapshot {
            total_packets: self.total_packets.load(Relaxed),
            arp_packets: self.arp_packets.load(Relaxed),
            tcp_packets: self.tcp_packets.load(Relaxed),
            udp_packets: self.udp_packets.load(Relaxed),
            icmp_packets: self.icmp_packets.load(Relaxed),
            dns_packets: self.dns_packets.load(Relaxed),
            http_packets: self.http_packets.load(Relaxed),
            tls_packets: self.tls_packets.load(Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalStatsSnapshot {
    pub total_packets: u64,
    pub arp_packets: u64,
    pub tcp_packets: u64,
    pub udp_packets: u64,
    pub icmp_packets: u64,
    pub dns_packets: u64,
    pub http_packets: u64,
    pub tls_packets: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_targets_cap_evicts_oldest() {
        let mut d = Device::new("aa:bb:cc:dd:ee:ff".into(), "Unknown".into(), "eth0".into(), Utc::now());
        for i in 1..=25u8 {
            d.push_recent_target(&format!("192.168.0.{i}"));
        }
        assert_eq!(d.recent_targets.len(), RECENT_TARGETS_CAP);
        assert_eq!(d.recent_targets.front().unwrap(), "192.168.0.6");
        assert_eq!(d.recent_targets.back().unwrap(), "192.168.0.25");
    }

    #[test]
    fn zero_dst_ip_never_recorded() {
        let mut d = Device::new("aa:bb:cc:dd:ee:ff".into(), "Unknown".into(), "eth0".into(), Utc::now());
        d.push_recent_target("0.0.0.0");
        assert!(d.recent_targets.is_empty());
    }
}
