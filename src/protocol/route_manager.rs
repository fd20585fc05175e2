use super::routing_table::RouteEntry;
use crate::algorithms::dijkstra::calculate_shortest_paths;
use crate::router::RouterContext;
use log::{debug, info, warn};
use std::collections::{BTreeSet, HashMap};
use std::net::Ipv4Addr;
use tokio::time::Instant;

/// Recomputes every protocol-learned route from the current topology.
/// Returns whether the routing table changed.
pub async fn recompute_routes(ctx: &RouterContext) -> bool {
    let _spf = ctx.spf_lock.lock().await;
    let Some(router_id) = ctx.router_id() else {
        return false;
    };

    // Snapshot under the coordinating lock, compute without it
    let (topology, interfaces, local_table) = {
        let state = ctx.state.lock().await;
        (
            state.topology.clone(),
            state.interfaces.clone(),
            state.routing_table.clone(),
        )
    };

    let local_neighbors: BTreeSet<Ipv4Addr> = interfaces
        .iter()
        .filter(|iface| iface.has_neighbor())
        .map(|iface| iface.neighbor_id)
        .collect();

    // First-hop router id -> (interface, neighbor address)
    let mut first_hops: HashMap<Ipv4Addr, (String, Ipv4Addr)> = HashMap::new();
    for iface in interfaces.iter().filter(|iface| iface.has_neighbor()) {
        first_hops
            .entry(iface.neighbor_id)
            .or_insert_with(|| (iface.name.clone(), iface.neighbor_ip));
    }

    let paths = calculate_shortest_paths(&topology, router_id, &local_neighbors);
    let mut learned = Vec::new();

    for (network, path) in paths {
        if local_table.has_local_route(&network) {
            continue;
        }
        let Some((interface, gateway)) = first_hops.get(&path.next_hop) else {
            warn!("No interface toward first hop {} for {}", path.next_hop, network);
            continue;
        };

        debug!("Path to {} via {:?} ({} hops)", network, path.path, path.cost);
        learned.push(RouteEntry {
            destination: network,
            gateway: *gateway,
            interface: interface.clone(),
            distance: u8::try_from(path.cost + 1).unwrap_or(u8::MAX),
        });
    }

    let count = learned.len();
    let changed = ctx.state.lock().await.routing_table.replace_learned(learned);
    if changed {
        info!("Routing table updated: {} learned routes", count);
    }
    changed
}

/// Ages out topology entries and sequence records not refreshed within the
/// maximum age. Returns the number of topology entries removed.
pub async fn topology_sweep(ctx: &RouterContext) -> usize {
    let max_age = ctx.timers().topology_max_age;
    let now = Instant::now();
    let mut state = ctx.state.lock().await;

    let removed = state.topology.expire(now, max_age);
    let forgotten = state.sequences.expire(now, max_age);

    for entry in &removed {
        info!("Topology entry {} from {} expired", entry.network, entry.router_id);
    }
    if forgotten > 0 {
        debug!("Forgot LSU sequence of {} silent routers", forgotten);
    }

    if !removed.is_empty() {
        ctx.trigger_spf();
    }
    removed.len()
}
