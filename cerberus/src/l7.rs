//! Shallow layer-7 peek: three pure, total functions
//! over the fixed 32-byte peek window copied by the kernel classifier.
//! None of these reassemble a flow or look past the first 32 bytes; all
//! return an empty/default result on malformed input rather than failing.
use cerberus_common::L7_PEEK_LEN;

/// Extracts the query name from a DNS message's first question, if any.
/// Skips the 12-byte header, then walks length-prefixed labels until a
/// zero-length label, a label length over 63, or the 32-byte window is
/// exhausted. No compression-pointer support (out of scope; a 32-byte
/// window rarely contains one).
pub fn dns_query_name(buf: &[u8; L7_PEEK_LEN]) -> String {
    const HEADER_LEN: usize = 12;
    let mut labels = Vec::new();
    let mut off = HEADER_LEN;
    if off >= buf.len() {
        return String::new();
    }
    loop {
        if off >= L7_PEEK_LEN {
            break;
        }
        let len = buf[off] as usize;
        if len == 0 || len > 63 {
            break;
        }
        off += 1;
        if off + len > L7_PEEK_LEN {
            break;
        }
        let label = &buf[off..off + len];
        if let Ok(s) = std::str::from_utf8(label) {
            labels.push(s.to_string());
        } else {
            break;
        }
        off += len;
    }
    labels.join(".")
}

/// Returns `(method, path)` for the first line of an HTTP/1.x request
/// found at the start of the buffer. The path is only returned if the
/// space-delimited second token is wholly contained in the window.
/// Methods are checked in order: GET, POST, HEAD, PUT, DELETE.
pub fn http_request_line(buf: &[u8; L7_PEEK_LEN]) -> Option<(&'static str, String)> {
    const METHODS: &[(&str, &[u8])] = &[
        ("GET", b"GET "),
        ("POST", b"POST "),
        ("HEAD", b"HEAD "),
        ("PUT", b"PUT "),
        ("DELETE", b"DELETE "),
    ];
    for (name, prefix) in METHODS {
        if buf.starts_with(prefix) {
            let rest = &buf[prefix.len()..];
            let path_end = rest.iter().position(|&b| b == b' ');
            let path = match path_end {
                Some(end) => std::str::from_utf8(&rest[..end]).unwrap_or("").to_string(),
                None => String::new(),
            };
            return Some((name, path));
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsHandshakeKind {
    ClientHello,
    ServerHello,
    Handshake,
}

/// Classifies a TLS record header found at the start of the buffer.
/// ClientHello iff byte 0 = 0x16 and byte 5 = 0x01; ServerHello iff byte 0
/// = 0x16 and byte 5 = 0x02; otherwise the generic `Handshake` tag.
pub fn tls_handshake_kind(buf: &[u8; L7_PEEK_LEN]) -> TlsHandshakeKind {
    if buf[0] == 0x16 && buf[5] == 0x01 {
        TlsHandshakeKind::ClientHello
    } else if buf[0] == 0x16 && buf[5] == 0x02 {
        TlsHandshakeKind::ServerHello
    } else {
        TlsHandshakeKind::Handshake
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn buf_from(bytes: &[u8]) -> [u8; L7_PEEK_LEN] {
        let mut b = [0u8; L7_PEEK_LEN];
        let n = bytes.len().min(L7_PEEK_LEN);
        b[..n].copy_from_slice(&bytes[..n]);
        b
    }

    #[test]
    fn dns_query_name_decodes_google_com() {
        let bytes = [
            0x00, 0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x06, b'g',
            b'o', b'o', b'g', b'l', b'e', 0x03, b'c', b'o', b'm', 0x00,
        ];
        let buf = buf_from(&bytes);
        assert_eq!(dns_query_name(&buf), "google.com");
    }

    #[test]
    fn dns_query_name_empty_when_13th_byte_zero() {
        let mut bytes = [0u8; L7_PEEK_LEN];
        bytes[12] = 0;
        assert_eq!(dns_query_name(&bytes), "");
    }

    #[test]
    fn http_get_exact_four_bytes_yields_empty_path() {
        let buf = buf_from(b"GET ");
        let (method, path) = http_request_line(&buf).unwrap();
        assert_eq!(method, "GET");
        assert_eq!(path, "");
    }

    #[test]
    fn http_get_with_path() {
        let buf = buf_from(b"GET /index.html HTTP/1.1\r\n");
        let (method, path) = http_request_line(&buf).unwrap();
        assert_eq!(method, "GET");
        assert_eq!(path, "/index.html");
    }

    #[test]
    fn tls_client_hello() {
        let buf = buf_from(&[0x16, 0x03, 0x03, 0x00, 0x00, 0x01]);
        assert_eq!(tls_handshake_kind(&buf), TlsHandshakeKind::ClientHello);
    }

    proptest! {
        #[test]
        fn l7_functions_never_panic(bytes in proptest::collection::vec(any::<u8>(), L7_PEEK_LEN..=L7_PEEK_LEN)) {
            let mut buf = [0u8; L7_PEEK_LEN];
            buf.copy_from_slice(&bytes);
            let _ = dns_query_name(&buf);
            let _ = http_request_line(&buf);
            let _ = tls_handshake_kind(&buf);
        }
    }
}
