//! Wire-format record shared between the kernel classifier (`cerberus-ebpf`)
//! and the userspace agent (`cerberus`). Defined once so both sides stay
//! byte-exact; never hand-diverge the two decoders (see DESIGN.md).
#![no_std]

use zerocopy::{AsBytes, FromBytes, Unaligned};

/// Size in bytes of [`WireEvent`] on the wire. `size_of::<WireEvent>()` must
/// equal this; a mismatch is a silent kernel/userspace corruption.
pub const WIRE_EVENT_LEN: usize = 75;

pub mod event_type {
    pub const ARP: u8 = 1;
    pub const TCP: u8 = 2;
    pub const UDP: u8 = 3;
    pub const ICMP: u8 = 4;
    pub const DNS: u8 = 5;
    pub const HTTP: u8 = 6;
    pub const TLS: u8 = 7;
}

pub mod tcp_flag {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
}

pub const L7_PEEK_LEN: usize = 32;

/// Fixed-layout, packed, 75-byte record produced by the kernel classifier
/// and decoded byte-for-byte in userspace. Field order here must not
/// change without bumping a wire version, which does not currently exist
/// (no version byte is carried).
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromBytes, AsBytes, Unaligned)]
pub struct WireEvent {
    pub event_type: u8,
    pub src_mac: [u8; 6],
    pub dst_mac: [u8; 6],
    /// Raw network-order bytes, as memcpy'd from the IPv4 header.
    pub src_ip: [u8; 4],
    pub dst_ip: [u8; 4],
    /// Host byte order (post-`ntohs`), written little-endian.
    pub src_port: u16,
    pub dst_port: u16,
    pub ip_proto: u8,
    pub tcp_flags: u8,
    /// Host byte order (post-`ntohs`), written little-endian.
    pub arp_op: u16,
    pub arp_sha: [u8; 6],
    pub arp_tha: [u8; 6],
    pub icmp_type: u8,
    pub icmp_code: u8,
    pub l7_payload: [u8; L7_PEEK_LEN],
}

const _: () = assert!(core::mem::size_of::<WireEvent>() == WIRE_EVENT_LEN);

impl WireEvent {
    pub const fn zeroed() -> Self {
        Self {
            event_type: 0,
            src_mac: [0; 6],
            dst_mac: [0; 6],
            src_ip: [0; 4],
            dst_ip: [0; 4],
            src_port: 0,
            dst_port: 0,
            ip_proto: 0,
            tcp_flags: 0,
            arp_op: 0,
            arp_sha: [0; 6],
            arp_tha: [0; 6],
            icmp_type: 0,
            icmp_code: 0,
            l7_payload: [0; L7_PEEK_LEN],
        }
    }

    /// Renders `src_ip`/`dst_ip` as dotted-quad octets by round-tripping the
    /// stored network-order bytes through a little-endian `u32`. On a
    /// little-endian host the two conversions cancel and this is the
    /// identity function, which is exactly the quirk being preserved
    /// bit-for-bit rather than fixed: a big-endian host would see
    /// byte-reversed addresses.
    pub fn src_ip_dotted(&self) -> [u8; 4] {
        u32::from_le_bytes(self.src_ip).to_le_bytes()
    }

    pub fn dst_ip_dotted(&self) -> [u8; 4] {
        u32::from_le_bytes(self.dst_ip).to_le_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_event_is_75_bytes() {
        assert_eq!(core::mem::size_of::<WireEvent>(), WIRE_EVENT_LEN);
    }

    #[test]
    fn zeroed_round_trips_through_bytes() {
        let e = WireEvent::zeroed();
        let bytes = e.as_bytes();
        assert_eq!(bytes.len(), WIRE_EVENT_LEN);
        let back = WireEvent::read_from(bytes).unwrap();
        assert_eq!(back, e);
    }
}
