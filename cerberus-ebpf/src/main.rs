//! TC ingress classifier. Attached to every monitored interface; decodes
//! Ethernet + {ARP, IPv4/TCP, IPv4/UDP, IPv4/ICMP}, fills one `WireEvent`
//! and pushes it into the `EVENTS` ring buffer. Never drops the packet:
//! always returns a pass verdict, even when classification fails or the
//! ring buffer reservation fails.
#![no_std]
#![no_main]

use aya_ebpf::{
    bindings::TC_ACT_OK,
    macros::{classifier, map},
    maps::RingBuf,
    programs::TcContext,
};
use cerberus_common::{event_type, tcp_flag, WireEvent, L7_PEEK_LEN};
use core::mem;

#[map]
static EVENTS: RingBuf = RingBuf::with_byte_size(256 * 1024, 0);

const ETH_P_IP: u16 = 0x0800_u16.swap_bytes();
const ETH_P_ARP: u16 = 0x0806_u16.swap_bytes();

const IPPROTO_TCP: u8 = 6;
const IPPROTO_UDP: u8 = 17;
const IPPROTO_ICMP: u8 = 1;

#[repr(C)]
struct EthHdr {
    h_dest: [u8; 6],
    h_source: [u8; 6],
    h_proto: u16, // network byte order
}

/// Minimal IPv4 header (no options parsed beyond `ihl`).
#[repr(C)]
struct IpHdr {
    version_ihl: u8,
    tos: u8,
    tot_len: u16,
    id: u16,
    frag_off: u16,
    ttl: u8,
    protocol: u8,
    check: u16,
    saddr: [u8; 4], // network byte order, raw
    daddr: [u8; 4],
}

impl IpHdr {
    #[inline(always)]
    fn ihl(&self) -> u8 {
        self.version_ihl & 0x0F
    }
}

#[repr(C)]
struct TcpHdr {
    source: u16, // network byte order
    dest: u16,   // network byte order
    seq: u32,
    ack_seq: u32,
    offset_flags: u16,
    window: u16,
    check: u16,
    urg_ptr: u16,
}

impl TcpHdr {
    #[inline(always)]
    fn doff(&self) -> u8 {
        ((u16::from_be(self.offset_flags) >> 12) & 0xF) as u8
    }

    #[inline(always)]
    fn flags(&self) -> u8 {
        let v = u16::from_be(self.offset_flags);
        let mut out = 0u8;
        if v & 0x01 != 0 {
            out |= tcp_flag::FIN;
        }
        if v & 0x02 != 0 {
            out |= tcp_flag::SYN;
        }
        if v & 0x04 != 0 {
            out |= tcp_flag::RST;
        }
        if v & 0x08 != 0 {
            out |= tcp_flag::PSH;
        }
        if v & 0x10 != 0 {
            out |= tcp_flag::ACK;
        }
        out
    }
}

#[repr(C)]
struct UdpHdr {
    source: u16,
    dest: u16,
    len: u16,
    check: u16,
}

#[repr(C)]
struct IcmpHdr {
    icmp_type: u8,
    icmp_code: u8,
    checksum: u16,
}

#[repr(C)]
struct ArpHdr {
    htype: u16,
    ptype: u16,
    hlen: u8,
    plen: u8,
    oper: u16,
    sha: [u8; 6],
    spa: [u8; 4],
    tha: [u8; 6],
    tpa: [u8; 4],
}

/// Bounds-checked read of `T` at `offset` bytes from the packet start. The
/// verifier requires the explicit `checked_add`/comparison before the cast;
/// this is the one place in the program unsafe pointer arithmetic happens.
#[inline(always)]
unsafe fn ptr_at<T>(ctx: &TcContext, offset: usize) -> Option<*const T> {
    let start = ctx.data();
    let end = ctx.data_end();
    let access_end = start.checked_add(offset)?.checked_add(mem::size_of::<T>())?;
    if access_end > end {
        return None;
    }
    Some(start.checked_add(offset)? as *const T)
}

/// Copies up to `L7_PEEK_LEN` bytes starting at `offset`, one byte at a
/// time with a per-iteration tail check so the verifier can prove
/// termination and in-bounds access. Short payloads leave the tail
/// zero-filled.
#[inline(always)]
fn copy_l7_peek(ctx: &TcContext, offset: usize, out: &mut [u8; L7_PEEK_LEN]) {
    let start = ctx.data();
    let end = ctx.data_end();
    let mut i = 0usize;
    while i < L7_PEEK_LEN {
        let at = match start.checked_add(offset).and_then(|b| b.checked_add(i)) {
            Some(a) => a,
            None => break,
        };
        if at.checked_add(1).map(|e| e > end).unwrap_or(true) {
            break;
        }
        out[i] = unsafe { *(at as *const u8) };
        i += 1;
    }
}

#[classifier]
pub fn cerberus(ctx: TcContext) -> i32 {
    let _ = try_classify(&ctx);
    TC_ACT_OK
}

fn try_classify(ctx: &TcContext) -> Result<(), ()> {
    let eth = unsafe { ptr_at::<EthHdr>(ctx, 0).ok_or(())? };
    let eth_type = unsafe { (*eth).h_proto };
    let eth_len = mem::size_of::<EthHdr>();

    if eth_type == ETH_P_ARP {
        return on_arp(ctx, eth_len);
    }
    if eth_type == ETH_P_IP {
        return on_ipv4(ctx, eth_len);
    }
    Ok(())
}

fn on_arp(ctx: &TcContext, offset: usize) -> Result<(), ()> {
    let arp = unsafe { ptr_at::<ArpHdr>(ctx, offset).ok_or(())? };
    let (htype, ptype, hlen, plen, oper, sha, spa, tha, tpa) = unsafe {
        (
            u16::from_be((*arp).htype),
            u16::from_be((*arp).ptype),
            (*arp).hlen,
            (*arp).plen,
            u16::from_be((*arp).oper),
            (*arp).sha,
            (*arp).spa,
            (*arp).tha,
            (*arp).tpa,
        )
    };
    if htype != 1 || ptype != 0x0800 || hlen != 6 || plen != 4 {
        return Ok(());
    }
    let dst_mac = unsafe {
        let eth = ptr_at::<EthHdr>(ctx, 0).ok_or(())?;
        (*eth).h_dest
    };

    let mut ev = WireEvent::zeroed();
    ev.event_type = event_type::ARP;
    ev.src_mac = sha;
    ev.dst_mac = dst_mac;
    ev.arp_op = oper;
    ev.arp_sha = sha;
    ev.arp_tha = tha;
    ev.src_ip = spa;
    ev.dst_ip = tpa;
    submit(ev)
}

fn on_ipv4(ctx: &TcContext, eth_len: usize) -> Result<(), ()> {
    let ip = unsafe { ptr_at::<IpHdr>(ctx, eth_len).ok_or(())? };
    let ihl = unsafe { (*ip).ihl() } as usize * 4;
    if ihl < mem::size_of::<IpHdr>() {
        return Ok(());
    }
    let (proto, saddr, daddr, eth_src, eth_dst) = unsafe {
        let eth = ptr_at::<EthHdr>(ctx, 0).ok_or(())?;
        ((*ip).protocol, (*ip).saddr, (*ip).daddr, (*eth).h_source, (*eth).h_dest)
    };
    let l4_off = eth_len + ihl;

    let mut ev = WireEvent::zeroed();
    ev.src_mac = eth_src;
    ev.dst_mac = eth_dst;
    ev.src_ip = saddr;
    ev.dst_ip = daddr;
    ev.ip_proto = proto;

    match proto {
        IPPROTO_TCP => {
            let tcp = unsafe { ptr_at::<TcpHdr>(ctx, l4_off).ok_or(())? };
            let (sport, dport, flags, doff) = unsafe {
                (
                    u16::from_be((*tcp).source),
                    u16::from_be((*tcp).dest),
                    (*tcp).flags(),
                    (*tcp).doff(),
                )
            };
            ev.event_type = event_type::TCP;
            ev.src_port = sport;
            ev.dst_port = dport;
            ev.tcp_flags = flags;
            let payload_off = l4_off + (doff as usize).max(5) * 4;
            copy_l7_peek(ctx, payload_off, &mut ev.l7_payload);
            upgrade_tcp(&mut ev, sport, dport);
        }
        IPPROTO_UDP => {
            let udp = unsafe { ptr_at::<UdpHdr>(ctx, l4_off).ok_or(())? };
            let (sport, dport) =
                unsafe { (u16::from_be((*udp).source), u16::from_be((*udp).dest)) };
            ev.event_type = event_type::UDP;
            ev.src_port = sport;
            ev.dst_port = dport;
            copy_l7_peek(ctx, l4_off + mem::size_of::<UdpHdr>(), &mut ev.l7_payload);
            if sport == 53 || dport == 53 {
                ev.event_type = event_type::DNS;
            }
        }
        IPPROTO_ICMP => {
            let icmp = unsafe { ptr_at::<IcmpHdr>(ctx, l4_off).ok_or(())? };
            ev.event_type = event_type::ICMP;
            ev.icmp_type = unsafe { (*icmp).icmp_type };
            ev.icmp_code = unsafe { (*icmp).icmp_code };
        }
        _ => return Ok(()),
    }

    submit(ev)
}

fn upgrade_tcp(ev: &mut WireEvent, sport: u16, dport: u16) {
    let is_http_port = matches!(sport, 80 | 8080) || matches!(dport, 80 | 8080);
    let is_tls_port = matches!(sport, 443 | 8443) || matches!(dport, 443 | 8443);
    if is_http_port && starts_with_http_method(&ev.l7_payload) {
        ev.event_type = event_type::HTTP;
    } else if is_tls_port
        && ev.l7_payload[0] == 0x16
        && ev.l7_payload[1] == 0x03
        && ev.l7_payload[2] <= 0x04
    {
        ev.event_type = event_type::TLS;
    }
}

#[inline(always)]
fn starts_with_http_method(buf: &[u8; L7_PEEK_LEN]) -> bool {
    buf.starts_with(b"GET ")
        || buf.starts_with(b"POST")
        || buf.starts_with(b"HEAD")
        || buf.starts_with(b"PUT ")
        || buf.starts_with(b"DELE")
}

#[inline(always)]
fn submit(ev: WireEvent) -> Result<(), ()> {
    if let Some(mut entry) = EVENTS.reserve::<WireEvent>(0) {
        entry.write(ev);
        entry.submit(0);
        Ok(())
    } else {
        // Reservation failed: silent drop, per the classifier's contract.
        Err(())
    }
}

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
