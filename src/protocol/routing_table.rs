use ipnet::Ipv4Net;
use std::fmt;
use std::net::Ipv4Addr;

/// Administrative distance of a route installed by configuration.
pub const DISTANCE_STATIC: u8 = 0;
/// Administrative distance of a directly connected subnet.
pub const DISTANCE_DIRECT: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteSource {
    Static,
    Direct,
    Protocol,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub destination: Ipv4Net,
    /// `0.0.0.0` means the destination is on-link.
    pub gateway: Ipv4Addr,
    pub interface: String,
    pub distance: u8,
}

impl RouteEntry {
    pub fn direct(destination: Ipv4Net, interface: impl Into<String>) -> Self {
        Self {
            destination: destination.trunc(),
            gateway: Ipv4Addr::UNSPECIFIED,
            interface: interface.into(),
            distance: DISTANCE_DIRECT,
        }
    }

    pub fn source(&self) -> RouteSource {
        match self.distance {
            DISTANCE_STATIC => RouteSource::Static,
            DISTANCE_DIRECT => RouteSource::Direct,
            _ => RouteSource::Protocol,
        }
    }

    /// Static and directly connected routes are the ones a router advertises.
    pub fn is_local(&self) -> bool {
        self.distance <= DISTANCE_DIRECT
    }

    /// Address to resolve at layer 2 when sending toward `destination`.
    pub fn next_hop_for(&self, destination: Ipv4Addr) -> Ipv4Addr {
        if self.gateway.is_unspecified() {
            destination
        } else {
            self.gateway
        }
    }
}

impl fmt::Display for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<18} via {:<15} dev {:<8} distance {:>3} ({:?})",
            self.destination.to_string(),
            self.gateway.to_string(),
            self.interface,
            self.distance,
            self.source()
        )
    }
}

/// Ordered list of routes. Insertion order matters: it breaks ties between
/// equally long prefixes.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    entries: Vec<RouteEntry>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_route(&mut self, entry: RouteEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.entries.iter()
    }

    pub fn local_routes(&self) -> impl Iterator<Item = &RouteEntry> {
        self.entries.iter().filter(|entry| entry.is_local())
    }

    pub fn has_local_route(&self, destination: &Ipv4Net) -> bool {
        self.local_routes().any(|entry| entry.destination == *destination)
    }

    /// Longest-prefix match. The first entry wins among equal prefix lengths.
    pub fn find_best_route(&self, target: Ipv4Addr) -> Option<&RouteEntry> {
        let mut best_route: Option<&RouteEntry> = None;

        for entry in &self.entries {
            if !entry.destination.contains(&target) {
                continue;
            }
            let longer = best_route
                .map_or(true, |best| entry.destination.prefix_len() > best.destination.prefix_len());
            if longer {
                best_route = Some(entry);
            }
        }

        best_route
    }

    /// Drops every learned route and installs `learned` in its place, keeping
    /// static and direct entries where they are. Returns whether the set of
    /// learned routes changed.
    pub fn replace_learned(&mut self, learned: Vec<RouteEntry>) -> bool {
        let previous: Vec<RouteEntry> = self
            .entries
            .iter()
            .filter(|entry| !entry.is_local())
            .cloned()
            .collect();

        self.entries.retain(|entry| entry.is_local());
        let changed = previous != learned;
        self.entries.extend(learned);
        changed
    }
}

impl fmt::Display for RoutingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{}", entry)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(destination: &str, gateway: [u8; 4], interface: &str, distance: u8) -> RouteEntry {
        RouteEntry {
            destination: destination.parse().unwrap(),
            gateway: Ipv4Addr::from(gateway),
            interface: interface.to_string(),
            distance,
        }
    }

    #[test]
    fn longest_prefix_wins() {
        let mut table = RoutingTable::new();
        table.add_route(route("10.0.0.0/8", [10, 0, 0, 1], "eth0", 0));
        table.add_route(route("10.0.1.0/24", [0, 0, 0, 0], "eth1", 1));

        let best = table.find_best_route(Ipv4Addr::new(10, 0, 1, 5)).unwrap();
        assert_eq!(best.interface, "eth1");

        let best = table.find_best_route(Ipv4Addr::new(10, 9, 9, 9)).unwrap();
        assert_eq!(best.interface, "eth0");
    }

    #[test]
    fn first_inserted_wins_ties() {
        let mut table = RoutingTable::new();
        table.add_route(route("192.168.0.0/16", [1, 1, 1, 1], "eth0", 0));
        table.add_route(route("192.168.0.0/16", [2, 2, 2, 2], "eth1", 0));

        let best = table.find_best_route(Ipv4Addr::new(192, 168, 3, 4)).unwrap();
        assert_eq!(best.interface, "eth0");
    }

    #[test]
    fn default_route_matches_everything_else() {
        let mut table = RoutingTable::new();
        table.add_route(route("0.0.0.0/0", [10, 0, 0, 254], "eth0", 0));
        table.add_route(route("10.0.2.0/24", [0, 0, 0, 0], "eth2", 1));

        assert_eq!(table.find_best_route(Ipv4Addr::new(8, 8, 8, 8)).unwrap().interface, "eth0");
        assert_eq!(table.find_best_route(Ipv4Addr::new(10, 0, 2, 9)).unwrap().interface, "eth2");
    }

    #[test]
    fn no_match_without_default() {
        let mut table = RoutingTable::new();
        table.add_route(route("10.0.1.0/24", [0, 0, 0, 0], "eth1", 1));
        assert!(table.find_best_route(Ipv4Addr::new(172, 16, 0, 1)).is_none());
    }

    #[test]
    fn replace_learned_keeps_local_routes() {
        let mut table = RoutingTable::new();
        table.add_route(route("10.0.1.0/24", [0, 0, 0, 0], "eth1", 1));
        table.add_route(route("10.0.9.0/24", [10, 0, 1, 2], "eth1", 3));

        let learned = vec![route("10.0.7.0/24", [10, 0, 1, 2], "eth1", 2)];
        assert!(table.replace_learned(learned.clone()));
        assert!(!table.replace_learned(learned));

        let destinations: Vec<String> = table.iter().map(|r| r.destination.to_string()).collect();
        assert_eq!(destinations, vec!["10.0.1.0/24", "10.0.7.0/24"]);
    }

    #[test]
    fn on_link_routes_resolve_the_destination_itself() {
        let direct = route("10.0.1.0/24", [0, 0, 0, 0], "eth1", 1);
        let learned = route("10.0.7.0/24", [10, 0, 1, 2], "eth1", 2);
        let target = Ipv4Addr::new(10, 0, 1, 77);

        assert_eq!(direct.next_hop_for(target), target);
        assert_eq!(learned.next_hop_for(target), Ipv4Addr::new(10, 0, 1, 2));
        assert_eq!(direct.source(), RouteSource::Direct);
        assert_eq!(learned.source(), RouteSource::Protocol);
    }
}
