//! Notification fan-out: bounded channels carrying
//! new-device and new-pattern events to subscribers. A full channel means
//! a slow subscriber, not a reason to block ingestion, so every send is a
//! `try_send` that silently drops on backpressure (grounded on
//! `recovery.rs`'s `Client::notify_gap`).
use crate::model::{CommunicationPattern, Device};
use crossbeam_channel::{Receiver, Sender};

pub const NEW_DEVICE_CAPACITY: usize = 100;
pub const NEW_PATTERN_CAPACITY: usize = 1000;

#[derive(Clone)]
pub struct Notifier {
    new_device_tx: Sender<Device>,
    new_pattern_tx: Sender<CommunicationPattern>,
}

impl Notifier {
    pub fn new(
        device_capacity: usize,
        pattern_capacity: usize,
    ) -> (Self, Receiver<Device>, Receiver<CommunicationPattern>) {
        let (new_device_tx, new_device_rx) = crossbeam_channel::bounded(device_capacity);
        let (new_pattern_tx, new_pattern_rx) = crossbeam_channel::bounded(pattern_capacity);
        (
            Self {
                new_device_tx,
                new_pattern_tx,
            },
            new_device_rx,
            new_pattern_rx,
        )
    }

    pub fn new_device(&self, device: Device) {
        if self.new_device_tx.try_send(device).is_err() {
            log::debug!("new-device channel full, dropping notification");
        }
        crate::metrics::set_queue_len("new_device", self.new_device_tx.len());
    }

    pub fn new_pattern(&self, pattern: CommunicationPattern) {
        if self.new_pattern_tx.try_send(pattern).is_err() {
            log::debug!("new-pattern channel full, dropping notification");
        }
        crate::metrics::set_queue_len("new_pattern", self.new_pattern_tx.len());
    }
}

/// Console subscriber: prints one line per new device and one
/// line per new pattern until both channels' senders are dropped.
pub fn run_console_subscriber(new_device_rx: Receiver<Device>, new_pattern_rx: Receiver<CommunicationPattern>) {
    loop {
        crossbeam_channel::select! {
            recv(new_device_rx) -> msg => match msg {
                Ok(d) => println!(
                    "[new device] mac={} ip={} vendor={} iface={}",
                    d.mac, d.ip, d.vendor, d.interface
                ),
                Err(_) => break,
            },
            recv(new_pattern_rx) -> msg => match msg {
                Ok(p) => println!(
                    "[new pattern] mac={} {}:{}->{}:{} {} ({})",
                    p.src_mac, p.protocol, p.src_ip, p.dst_ip, p.dst_port, p.traffic_type, p.service
                ),
                Err(_) => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn full_device_channel_drops_silently() {
        let (notifier, rx, _prx) = Notifier::new(1, 1);
        let d = Device::new("aa:bb:cc:dd:ee:ff".into(), "Unknown".into(), "eth0".into(), Utc::now());
        notifier.new_device(d.clone());
        notifier.new_device(d);
        assert_eq!(rx.len(), 1);
    }
}
