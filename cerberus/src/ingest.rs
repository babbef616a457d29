//! Ring-buffer ingestion loop: drains the
//! kernel-side `EVENTS` ring buffer, parses each record, and hands it to
//! the aggregator. Grounded on `rx.rs`'s shutdown-checked poll loop,
//! simplified to the blocking, non-batched shape since the ring buffer
//! itself provides the backpressure the UDP recv loop had to hand-roll.
use crate::aggregator::Aggregator;
use crate::util::BarrierFlag;
use aya::maps::{MapData, RingBuf};
use std::sync::Arc;
use std::time::Duration;

/// Polls `ring_buf` until `shutdown` is raised. Every iteration's "the
/// interface whose filter produced this record" is unknown to the ring
/// buffer itself (one shared map across all attached interfaces), so the
/// supervisor's first attached interface name is used as a stand-in
/// label; a future wire version could carry the ingress ifindex.
pub fn run(
    mut ring_buf: RingBuf<MapData>,
    aggregator: Arc<Aggregator>,
    iface_label: String,
    shutdown: Arc<BarrierFlag>,
) {
    log::info!("ingestion loop started");
    let mut idle_spins: u32 = 0;
    while !shutdown.is_raised() {
        let mut progressed = false;
        while let Some(item) = ring_buf.next() {
            progressed = true;
            match crate::wire::parse(&item) {
                Ok(ev) => {
                    if let Err(e) = aggregator.ingest(&ev, &iface_label) {
                        log::warn!("ingest failed, dropping record: {e:?}");
                    }
                }
                Err(e) => log::debug!("malformed wire record, dropping: {e:?}"),
            }
        }
        if !progressed {
            idle_spins = idle_spins.saturating_add(1);
            let backoff = Duration::from_micros((idle_spins as u64).min(1000));
            std::thread::sleep(backoff);
        } else {
            idle_spins = 0;
        }
    }
    log::info!("ingestion loop stopped");
}
