//! Read-only external lookup tables: OUI prefix → vendor string,
//! and (port, protocol) → service name. Loaded once into static maps built
//! from embedded const arrays and never mutated afterwards, matching the
//! teacher's convention of loading configuration-like data once at startup.
use hashbrown::HashMap;
use once_cell::sync::Lazy;

/// A representative sample; extend as needed. Keys are the first three
/// MAC octets, uppercase, colon-separated.
const OUI_TABLE: &[(&str, &str)] = &[
    ("00:1A:2B", "Cisco Systems"),
    ("00:50:56", "VMware"),
    ("00:0C:29", "VMware"),
    ("08:00:27", "Oracle VirtualBox"),
    ("B8:27:EB", "Raspberry Pi Foundation"),
    ("DC:A6:32", "Raspberry Pi Trading"),
    ("3C:5A:B4", "Google"),
    ("F4:5C:89", "Apple"),
    ("AC:DE:48", "Apple"),
    ("00:16:3E", "Xensource"),
    ("52:54:00", "QEMU/KVM"),
];

static OUI_MAP: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| OUI_TABLE.iter().copied().collect());

pub const UNKNOWN_VENDOR: &str = "Unknown";

/// `src_mac[0..3]` formatted as `"AA:BB:CC"`. Best-effort: unknown
/// prefixes yield the literal "Unknown", never an error.
pub fn vendor_for_mac(mac: &[u8; 6]) -> &'static str {
    let prefix = format!("{:02X}:{:02X}:{:02X}", mac[0], mac[1], mac[2]);
    OUI_MAP.get(prefix.as_str()).copied().unwrap_or(UNKNOWN_VENDOR)
}

const SERVICE_TABLE: &[(u16, &str, &str)] = &[
    (20, "TCP", "FTP-DATA"),
    (21, "TCP", "FTP"),
    (22, "BOTH", "SSH"),
    (23, "TCP", "TELNET"),
    (25, "TCP", "SMTP"),
    (53, "BOTH", "DNS"),
    (67, "UDP", "DHCP"),
    (68, "UDP", "DHCP"),
    (80, "TCP", "HTTP"),
    (110, "TCP", "POP3"),
    (123, "UDP", "NTP"),
    (143, "TCP", "IMAP"),
    (161, "UDP", "SNMP"),
    (162, "UDP", "SNMP"),
    (443, "TCP", "HTTPS"),
    (445, "TCP", "SMB"),
    (3306, "TCP", "MySQL"),
    (3389, "TCP", "RDP"),
    (5432, "TCP", "PostgreSQL"),
    (8080, "TCP", "HTTP-ALT"),
    (8443, "TCP", "HTTPS-ALT"),
];

static SERVICE_MAP: Lazy<HashMap<(u16, &'static str), &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    for (port, proto, name) in SERVICE_TABLE {
        if *proto == "BOTH" {
            m.insert((*port, "TCP"), *name);
            m.insert((*port, "UDP"), *name);
        } else {
            m.insert((*port, *proto), *name);
        }
    }
    m
});

/// Looks up `(port, proto)` where `proto` is `"TCP"` or `"UDP"`.
pub fn service_name(port: u16, proto: &'static str) -> Option<&'static str> {
    SERVICE_MAP.get(&(port, proto)).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_port_resolves() {
        assert_eq!(service_name(443, "TCP"), Some("HTTPS"));
        assert_eq!(service_name(53, "UDP"), Some("DNS"));
    }

    #[test]
    fn unknown_port_is_none() {
        assert_eq!(service_name(59999, "TCP"), None);
    }

    #[test]
    fn unknown_vendor_prefix_is_unknown() {
        assert_eq!(vendor_for_mac(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]), UNKNOWN_VENDOR);
    }
}
