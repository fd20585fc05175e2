use crate::protocol::messages::Lsa;
use ipnet::Ipv4Net;
use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::time::Instant;

/// Reachability claim of one router for one subnet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyEntry {
    pub router_id: Ipv4Addr,
    pub network: Ipv4Net,
    /// Router on the other side of that link, `0.0.0.0` for a stub.
    pub neighbor_id: Ipv4Addr,
    /// Source address of the LSU that carried the claim.
    pub next_hop: Ipv4Addr,
    pub sequence: u16,
    pub refreshed: Instant,
}

#[derive(Debug, Clone, Default)]
pub struct Topology {
    entries: BTreeMap<(Ipv4Addr, Ipv4Net), TopologyEntry>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one advertisement. Returns `None` for a non-contiguous mask,
    /// otherwise whether a new entry was created.
    pub fn update_from_lsa(
        &mut self,
        router_id: Ipv4Addr,
        lsa: &Lsa,
        next_hop: Ipv4Addr,
        sequence: u16,
        now: Instant,
    ) -> Option<bool> {
        let network = Ipv4Net::with_netmask(lsa.subnet, lsa.mask).ok()?.trunc();

        match self.entries.get_mut(&(router_id, network)) {
            Some(entry) => {
                entry.neighbor_id = lsa.router_id;
                entry.next_hop = next_hop;
                entry.sequence = sequence;
                entry.refreshed = now;
                Some(false)
            }
            None => {
                self.entries.insert(
                    (router_id, network),
                    TopologyEntry {
                        router_id,
                        network,
                        neighbor_id: lsa.router_id,
                        next_hop,
                        sequence,
                        refreshed: now,
                    },
                );
                Some(true)
            }
        }
    }

    /// Drops entries whose advertiser has not refreshed them within `max_age`.
    pub fn expire(&mut self, now: Instant, max_age: Duration) -> Vec<TopologyEntry> {
        let stale: Vec<(Ipv4Addr, Ipv4Net)> = self
            .entries
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.refreshed) > max_age)
            .map(|(key, _)| *key)
            .collect();

        stale.iter().filter_map(|key| self.entries.remove(key)).collect()
    }

    #[cfg(test)]
    pub fn get(&self, router_id: Ipv4Addr, network: Ipv4Net) -> Option<&TopologyEntry> {
        self.entries.get(&(router_id, network))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TopologyEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// True when `candidate` follows `last` in 16-bit serial number order.
pub fn sequence_newer(candidate: u16, last: u16) -> bool {
    let distance = candidate.wrapping_sub(last);
    distance != 0 && distance < 0x8000
}

/// Last accepted LSU sequence number per originating router.
#[derive(Debug, Clone, Default)]
pub struct SequenceTracker {
    last: HashMap<Ipv4Addr, (u16, Instant)>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `sequence` if it is newer than what was last accepted.
    pub fn accept(&mut self, router_id: Ipv4Addr, sequence: u16, now: Instant) -> bool {
        match self.last.get(&router_id) {
            Some((last, _)) if !sequence_newer(sequence, *last) => false,
            _ => {
                self.last.insert(router_id, (sequence, now));
                true
            }
        }
    }

    pub fn last(&self, router_id: Ipv4Addr) -> Option<u16> {
        self.last.get(&router_id).map(|(sequence, _)| *sequence)
    }

    pub fn expire(&mut self, now: Instant, max_age: Duration) -> usize {
        let before = self.last.len();
        self.last
            .retain(|_, (_, accepted)| now.saturating_duration_since(*accepted) <= max_age);
        before - self.last.len()
    }
}
