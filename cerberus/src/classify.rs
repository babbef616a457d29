//! Traffic-type and service-label classification: pure
//! functions mapping an event plus its already-extracted ports/flags/L7
//! info to a closed-set traffic-type tag and a service label string.
use crate::l7::TlsHandshakeKind;
use crate::tables;
use cerberus_common::{event_type, tcp_flag, WireEvent};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrafficType {
    ArpRequest,
    ArpReply,
    ArpProbe,
    ArpAnnounce,
    ArpScan,
    TcpSyn,
    TcpSynAck,
    TcpAck,
    TcpFin,
    TcpRst,
    TcpHttp,
    TcpHttps,
    TcpSsh,
    TcpCustom,
    UdpDns,
    UdpDhcp,
    UdpNtp,
    UdpSnmp,
    UdpCustom,
    IcmpEchoRequest,
    IcmpEchoReply,
    IcmpDestUnreach,
    IcmpTimeExceeded,
    IcmpRedirect,
    IcmpCustom,
    DnsQuery,
    DnsResponse,
    HttpGet,
    HttpPost,
    HttpRequest,
    TlsClientHello,
    TlsServerHello,
    TlsHandshake,
    /// All-zero or otherwise unrecognized record; never counted.
    Unknown,
}

impl fmt::Display for TrafficType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrafficType::ArpRequest => "ARP_REQUEST",
            TrafficType::ArpReply => "ARP_REPLY",
            TrafficType::ArpProbe => "ARP_PROBE",
            TrafficType::ArpAnnounce => "ARP_ANNOUNCE",
            TrafficType::ArpScan => "ARP_SCAN",
            TrafficType::TcpSyn => "TCP_SYN",
            TrafficType::TcpSynAck => "TCP_SYNACK",
            TrafficType::TcpAck => "TCP_ACK",
            TrafficType::TcpFin => "TCP_FIN",
            TrafficType::TcpRst => "TCP_RST",
            TrafficType::TcpHttp => "TCP_HTTP",
            TrafficType::TcpHttps => "TCP_HTTPS",
            TrafficType::TcpSsh => "TCP_SSH",
            TrafficType::TcpCustom => "TCP_CUSTOM",
            TrafficType::UdpDns => "UDP_DNS",
            TrafficType::UdpDhcp => "UDP_DHCP",
            TrafficType::UdpNtp => "UDP_NTP",
            TrafficType::UdpSnmp => "UDP_SNMP",
            TrafficType::UdpCustom => "UDP_CUSTOM",
            TrafficType::IcmpEchoRequest => "ICMP_ECHO_REQUEST",
            TrafficType::IcmpEchoReply => "ICMP_ECHO_REPLY",
            TrafficType::IcmpDestUnreach => "ICMP_DEST_UNREACH",
            TrafficType::IcmpTimeExceeded => "ICMP_TIME_EXCEEDED",
            TrafficType::IcmpRedirect => "ICMP_REDIRECT",
            TrafficType::IcmpCustom => "ICMP_CUSTOM",
            TrafficType::DnsQuery => "DNS_QUERY",
            TrafficType::DnsResponse => "DNS_RESPONSE",
            TrafficType::HttpGet => "HTTP_GET",
            TrafficType::HttpPost => "HTTP_POST",
            TrafficType::HttpRequest => "HTTP_REQUEST",
            TrafficType::TlsClientHello => "TLS_CLIENT_HELLO",
            TrafficType::TlsServerHello => "TLS_SERVER_HELLO",
            TrafficType::TlsHandshake => "TLS_HANDSHAKE",
            TrafficType::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Arp,
    Tcp,
    Udp,
    Icmp,
    Dns,
    Http,
    Tls,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Protocol::Arp => "ARP",
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Icmp => "ICMP",
            Protocol::Dns => "DNS",
            Protocol::Http => "HTTP",
            Protocol::Tls => "TLS",
        };
        f.write_str(s)
    }
}

pub fn protocol_for(ev: &WireEvent) -> Option<Protocol> {
    match ev.event_type {
        event_type::ARP => Some(Protocol::Arp),
        event_type::TCP => Some(Protocol::Tcp),
        event_type::UDP => Some(Protocol::Udp),
        event_type::ICMP => Some(Protocol::Icmp),
        event_type::DNS => Some(Protocol::Dns),
        event_type::HTTP => Some(Protocol::Http),
        event_type::TLS => Some(Protocol::Tls),
        _ => None,
    }
}

/// Traffic-type decision table. `tls_kind` must be the result
/// of [`crate::l7::tls_handshake_kind`] for TLS events; `dns_response` is
/// the DNS header's QR bit; `http_method` is the method recognized by
/// [`crate::l7::http_request_line`], if any.
pub fn traffic_type(
    ev: &WireEvent,
    tls_kind: Option<TlsHandshakeKind>,
    dns_response: bool,
    http_method: Option<&str>,
) -> TrafficType {
    match ev.event_type {
        event_type::ARP => {
            let src_ip = u32::from_le_bytes(ev.src_ip);
            let dst_ip = u32::from_le_bytes(ev.dst_ip);
            if src_ip == 0 {
                TrafficType::ArpProbe
            } else if src_ip == dst_ip {
                TrafficType::ArpAnnounce
            } else if ev.arp_op == 1 {
                TrafficType::ArpRequest
            } else if ev.arp_op == 2 {
                TrafficType::ArpReply
            } else {
                TrafficType::ArpRequest
            }
        }
        event_type::TCP | event_type::HTTP | event_type::TLS => {
            // HTTP/TLS event_type upgrades are themselves the result of
            // port+prefix matching in the kernel; classify them first.
            if ev.event_type == event_type::HTTP {
                return match http_method {
                    Some("GET") => TrafficType::HttpGet,
                    Some("POST") => TrafficType::HttpPost,
                    _ => TrafficType::HttpRequest,
                };
            }
            if ev.event_type == event_type::TLS {
                return match tls_kind {
                    Some(TlsHandshakeKind::ClientHello) => TrafficType::TlsClientHello,
                    Some(TlsHandshakeKind::ServerHello) => TrafficType::TlsServerHello,
                    _ => TrafficType::TlsHandshake,
                };
            }
            match ev.dst_port {
                80 => TrafficType::TcpHttp,
                443 => TrafficType::TcpHttps,
                22 => TrafficType::TcpSsh,
                _ => {
                    let f = ev.tcp_flags;
                    let syn = f & tcp_flag::SYN != 0;
                    let ack = f & tcp_flag::ACK != 0;
                    if syn && !ack {
                        TrafficType::TcpSyn
                    } else if syn && ack {
                        TrafficType::TcpSynAck
                    } else if f & tcp_flag::FIN != 0 {
                        TrafficType::TcpFin
                    } else if f & tcp_flag::RST != 0 {
                        TrafficType::TcpRst
                    } else if ack {
                        TrafficType::TcpAck
                    } else {
                        TrafficType::TcpCustom
                    }
                }
            }
        }
        event_type::UDP | event_type::DNS => {
            if ev.event_type == event_type::DNS {
                return if dns_response {
                    TrafficType::DnsResponse
                } else {
                    TrafficType::DnsQuery
                };
            }
            match (ev.src_port, ev.dst_port) {
                (53, _) | (_, 53) => TrafficType::UdpDns,
                (_, 67) | (_, 68) => TrafficType::UdpDhcp,
                (_, 123) => TrafficType::UdpNtp,
                (_, 161) | (_, 162) => TrafficType::UdpSnmp,
                _ => TrafficType::UdpCustom,
            }
        }
        event_type::ICMP => match ev.icmp_type {
            0 => TrafficType::IcmpEchoReply,
            3 => TrafficType::IcmpDestUnreach,
            5 => TrafficType::IcmpRedirect,
            8 => TrafficType::IcmpEchoRequest,
            11 => TrafficType::IcmpTimeExceeded,
            _ => TrafficType::IcmpCustom,
        },
        _ => TrafficType::Unknown,
    }
}

/// Service label: for TCP/UDP, looks up `(port, proto)` in the static
/// service table; for the other protocols the traffic-type string itself
/// is the label.
pub fn service_label(ev: &WireEvent, protocol: Protocol, traffic_type: &TrafficType) -> String {
    match protocol {
        Protocol::Tcp => tables::service_name(ev.dst_port, "TCP")
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("TCP/{}", ev.dst_port)),
        Protocol::Udp => tables::service_name(ev.dst_port, "UDP")
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("UDP/{}", ev.dst_port)),
        _ => traffic_type.to_string(),
    }
}

/// The canonical dedup key: `"<proto>:<src_ip>-><dst_ip>:<dst_port>:<traffic_type>"`.
pub fn pattern_key(protocol: Protocol, src_ip: &str, dst_ip: &str, dst_port: u16, tt: &TrafficType) -> String {
    format!("{protocol}:{src_ip}->{dst_ip}:{dst_port}:{tt}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_event() -> WireEvent {
        WireEvent::zeroed()
    }

    #[test]
    fn arp_probe_when_src_ip_zero() {
        let mut ev = base_event();
        ev.event_type = event_type::ARP;
        ev.arp_op = 1;
        ev.dst_ip = [192, 168, 1, 50];
        let tt = traffic_type(&ev, None, false, None);
        assert_eq!(tt, TrafficType::ArpProbe);
    }

    #[test]
    fn tcp_port_wins_over_flags() {
        let mut ev = base_event();
        ev.event_type = event_type::TCP;
        ev.dst_port = 443;
        ev.tcp_flags = tcp_flag::SYN;
        assert_eq!(traffic_type(&ev, None, false, None), TrafficType::TcpHttps);
    }

    #[test]
    fn pattern_key_matches_scenario_format() {
        let key = pattern_key(Protocol::Tcp, "192.168.0.100", "8.8.8.8", 443, &TrafficType::TcpHttps);
        assert_eq!(key, "TCP:192.168.0.100->8.8.8.8:443:TCP_HTTPS");
    }
}
