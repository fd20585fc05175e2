use crate::network::Topology;
use ipnet::Ipv4Net;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap};
use std::net::Ipv4Addr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortestPath {
    /// Hops from the source to `advertiser`.
    pub cost: u32,
    pub advertiser: Ipv4Addr,
    /// First router on the path, always an adjacent one.
    pub next_hop: Ipv4Addr,
    pub path: Vec<Ipv4Addr>,
}

#[derive(Debug, PartialEq, Eq)]
struct State {
    cost: u32,
    router: Ipv4Addr,
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap, lower router id first on equal cost
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.router.cmp(&self.router))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Router graph built from neighbor claims. An edge exists only when both
/// ends claim each other.
#[derive(Debug, Default)]
pub struct RouterGraph {
    claims: BTreeMap<Ipv4Addr, BTreeSet<Ipv4Addr>>,
}

impl RouterGraph {
    pub fn build(topology: &Topology, source: Ipv4Addr, local_neighbors: &BTreeSet<Ipv4Addr>) -> Self {
        let mut claims: BTreeMap<Ipv4Addr, BTreeSet<Ipv4Addr>> = BTreeMap::new();
        claims.insert(source, local_neighbors.clone());

        for entry in topology.iter() {
            // Our own view comes from the live interface table, not from
            // copies of our LSUs relayed back to us.
            if entry.router_id == source || entry.neighbor_id.is_unspecified() {
                continue;
            }
            claims.entry(entry.router_id).or_default().insert(entry.neighbor_id);
        }

        Self { claims }
    }

    pub fn neighbors(&self, router: Ipv4Addr) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.claims
            .get(&router)
            .into_iter()
            .flatten()
            .copied()
            .filter(move |other| {
                self.claims
                    .get(other)
                    .is_some_and(|back| back.contains(&router))
            })
    }
}

/// Best path from `source` to every subnet advertised by a reachable router.
pub fn calculate_shortest_paths(
    topology: &Topology,
    source: Ipv4Addr,
    local_neighbors: &BTreeSet<Ipv4Addr>,
) -> BTreeMap<Ipv4Net, ShortestPath> {
    let graph = RouterGraph::build(topology, source, local_neighbors);
    let mut distances: HashMap<Ipv4Addr, u32> = HashMap::new();
    let mut previous: HashMap<Ipv4Addr, Ipv4Addr> = HashMap::new();
    let mut heap = BinaryHeap::new();

    distances.insert(source, 0);
    heap.push(State { cost: 0, router: source });

    while let Some(State { cost, router }) = heap.pop() {
        // Skip if we've already found a better path
        if cost > distances.get(&router).copied().unwrap_or(u32::MAX) {
            continue;
        }

        for neighbor in graph.neighbors(router) {
            let new_cost = cost + 1;
            if new_cost < distances.get(&neighbor).copied().unwrap_or(u32::MAX) {
                distances.insert(neighbor, new_cost);
                previous.insert(neighbor, router);
                heap.push(State { cost: new_cost, router: neighbor });
            }
        }
    }

    // Nearest advertiser per subnet, lower router id on ties
    let mut network_paths: BTreeMap<Ipv4Net, ShortestPath> = BTreeMap::new();

    for entry in topology.iter() {
        if entry.router_id == source {
            continue;
        }
        let Some(&cost) = distances.get(&entry.router_id) else {
            continue;
        };
        let Some(next_hop) = find_next_hop(&previous, source, entry.router_id) else {
            continue;
        };

        let better = network_paths.get(&entry.network).map_or(true, |current| {
            (cost, entry.router_id) < (current.cost, current.advertiser)
        });
        if better {
            network_paths.insert(
                entry.network,
                ShortestPath {
                    cost,
                    advertiser: entry.router_id,
                    next_hop,
                    path: reconstruct_path(&previous, entry.router_id),
                },
            );
        }
    }

    network_paths
}

fn find_next_hop(previous: &HashMap<Ipv4Addr, Ipv4Addr>, source: Ipv4Addr, dest: Ipv4Addr) -> Option<Ipv4Addr> {
    if dest == source {
        return None;
    }

    let mut current = dest;
    while let Some(&prev) = previous.get(&current) {
        if prev == source {
            return Some(current);
        }
        current = prev;
    }
    None
}

fn reconstruct_path(previous: &HashMap<Ipv4Addr, Ipv4Addr>, dest: Ipv4Addr) -> Vec<Ipv4Addr> {
    let mut path = vec![dest];
    let mut current = dest;

    while let Some(&prev) = previous.get(&current) {
        path.push(prev);
        current = prev;
    }

    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::Lsa;
    use tokio::time::Instant;

    fn rid(n: u8) -> Ipv4Addr {
        Ipv4Addr::new(n, n, n, n)
    }

    fn claim(topology: &mut Topology, router: u8, subnet: [u8; 4], neighbor: Option<u8>) {
        let lsa = Lsa {
            subnet: Ipv4Addr::from(subnet),
            mask: Ipv4Addr::new(255, 255, 255, 0),
            router_id: neighbor.map_or(Ipv4Addr::UNSPECIFIED, rid),
        };
        topology.update_from_lsa(rid(router), &lsa, Ipv4Addr::UNSPECIFIED, 1, Instant::now());
    }

    fn net(s: &str) -> Ipv4Net {
        s.parse().unwrap()
    }

    /// 1 - 2 - 3 chain plus a stub behind 3.
    fn chain() -> Topology {
        let mut topology = Topology::new();
        claim(&mut topology, 2, [10, 0, 12, 0], Some(1));
        claim(&mut topology, 2, [10, 0, 23, 0], Some(3));
        claim(&mut topology, 3, [10, 0, 23, 0], Some(2));
        claim(&mut topology, 3, [10, 0, 30, 0], None);
        topology
    }

    #[test]
    fn chain_routes_go_through_the_middle_router() {
        let topology = chain();
        let paths = calculate_shortest_paths(&topology, rid(1), &BTreeSet::from([rid(2)]));

        let stub = &paths[&net("10.0.30.0/24")];
        assert_eq!(stub.advertiser, rid(3));
        assert_eq!(stub.cost, 2);
        assert_eq!(stub.next_hop, rid(2));
        assert_eq!(stub.path, vec![rid(1), rid(2), rid(3)]);

        let transit = &paths[&net("10.0.23.0/24")];
        assert_eq!(transit.advertiser, rid(2));
        assert_eq!(transit.cost, 1);
    }

    #[test]
    fn one_sided_claim_creates_no_edge() {
        let mut topology = Topology::new();
        claim(&mut topology, 2, [10, 0, 20, 0], None);
        // Router 2 never claims router 1.
        let paths = calculate_shortest_paths(&topology, rid(1), &BTreeSet::from([rid(2)]));
        assert!(paths.is_empty());
    }

    #[test]
    fn unreachable_routers_contribute_nothing() {
        let topology = chain();
        let paths = calculate_shortest_paths(&topology, rid(1), &BTreeSet::new());
        assert!(paths.is_empty());
    }

    #[test]
    fn equal_cost_paths_prefer_lower_router_id() {
        // Square: 1 - 2 - 4 and 1 - 3 - 4
        let mut topology = Topology::new();
        claim(&mut topology, 2, [10, 0, 12, 0], Some(1));
        claim(&mut topology, 2, [10, 0, 24, 0], Some(4));
        claim(&mut topology, 3, [10, 0, 13, 0], Some(1));
        claim(&mut topology, 3, [10, 0, 34, 0], Some(4));
        claim(&mut topology, 4, [10, 0, 24, 0], Some(2));
        claim(&mut topology, 4, [10, 0, 34, 0], Some(3));
        claim(&mut topology, 4, [10, 0, 40, 0], None);

        let paths = calculate_shortest_paths(&topology, rid(1), &BTreeSet::from([rid(2), rid(3)]));
        let stub = &paths[&net("10.0.40.0/24")];
        assert_eq!(stub.cost, 2);
        assert_eq!(stub.next_hop, rid(2));
    }

    #[test]
    fn nearest_advertiser_wins() {
        let topology = chain();
        let paths = calculate_shortest_paths(&topology, rid(1), &BTreeSet::from([rid(2)]));
        // 10.0.23.0/24 is advertised by both 2 (one hop) and 3 (two hops).
        assert_eq!(paths[&net("10.0.23.0/24")].advertiser, rid(2));
    }
}
