//! Event parser: decodes a raw byte slice produced by
//! the kernel classifier into a [`WireEvent`]. Pure, allocation-free beyond
//! the returned value; the only failure mode is a record shorter than
//! [`cerberus_common::WIRE_EVENT_LEN`].
use anyhow::{bail, Result};
use cerberus_common::{WireEvent, WIRE_EVENT_LEN};
use zerocopy::FromBytes;

/// Reads fields in fixed-offset order matching [`WireEvent`]'s layout.
/// Does not validate semantic consistency: a TCP record with an unknown
/// flag combination is still returned as-is.
pub fn parse(bytes: &[u8]) -> Result<WireEvent> {
    if bytes.len() < WIRE_EVENT_LEN {
        bail!(
            "short wire record: got {} bytes, need {}",
            bytes.len(),
            WIRE_EVENT_LEN
        );
    }
    WireEvent::read_from(&bytes[..WIRE_EVENT_LEN])
        .ok_or_else(|| anyhow::anyhow!("wire record failed to decode"))
}

pub fn mac_to_string(mac: &[u8; 6]) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}

pub fn ip_to_dotted(octets: [u8; 4]) -> String {
    format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3])
}

pub const ZERO_IP: &str = "0.0.0.0";

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_short_record() {
        let buf = [0u8; 74];
        assert!(parse(&buf).is_err());
    }

    #[test]
    fn accepts_exact_and_longer_records() {
        let buf = [0u8; 75];
        assert!(parse(&buf).is_ok());
        let buf2 = [0u8; 200];
        assert!(parse(&buf2).is_ok());
    }

    #[test]
    fn mac_formats_lowercase_colon_hex() {
        let mac = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];
        assert_eq!(mac_to_string(&mac), "aa:bb:cc:dd:ee:ff");
    }

    proptest! {
        #[test]
        fn wire_round_trip(bytes in proptest::collection::vec(any::<u8>(), 75..512)) {
            let ev = parse(&bytes).unwrap();
            let encoded = zerocopy::AsBytes::as_bytes(&ev);
            prop_assert_eq!(encoded, &bytes[..75]);
        }
    }
}
