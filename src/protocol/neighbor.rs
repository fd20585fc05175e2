use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neighbor {
    pub router_id: Ipv4Addr,
    pub last_seen: Instant,
}

impl Neighbor {
    pub fn is_alive(&self, now: Instant, dead_interval: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) <= dead_interval
    }
}

/// Adjacent routers keyed by router id.
#[derive(Debug, Clone, Default)]
pub struct NeighborTable {
    neighbors: BTreeMap<Ipv4Addr, Neighbor>,
}

impl NeighborTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `router_id` or refreshes it when already known.
    pub fn upsert(&mut self, router_id: Ipv4Addr, now: Instant) {
        self.neighbors
            .entry(router_id)
            .and_modify(|neighbor| neighbor.last_seen = now)
            .or_insert(Neighbor { router_id, last_seen: now });
    }

    pub fn refresh(&mut self, router_id: Ipv4Addr, now: Instant) -> bool {
        match self.neighbors.get_mut(&router_id) {
            Some(neighbor) => {
                neighbor.last_seen = now;
                true
            }
            None => false,
        }
    }

    /// Removes every neighbor not heard from within `dead_interval`.
    pub fn expire(&mut self, now: Instant, dead_interval: Duration) -> Vec<Ipv4Addr> {
        let dead: Vec<Ipv4Addr> = self
            .neighbors
            .values()
            .filter(|neighbor| !neighbor.is_alive(now, dead_interval))
            .map(|neighbor| neighbor.router_id)
            .collect();

        for router_id in &dead {
            self.neighbors.remove(router_id);
        }
        dead
    }

    pub fn contains(&self, router_id: Ipv4Addr) -> bool {
        self.neighbors.contains_key(&router_id)
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Neighbor> {
        self.neighbors.values()
    }
}
