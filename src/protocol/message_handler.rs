use super::messages::{Lsu, OspfMessage};
use super::neighbor_manager;
use crate::network::Interface;
use crate::protocol::send_to_neighbor;
use crate::router::RouterContext;
use log::{debug, warn};
use std::net::Ipv4Addr;
use tokio::time::Instant;

/// Entry point for PWOSPF packets. `payload` is the IP payload, `source`
/// the IP source address.
pub async fn handle_message(ctx: &RouterContext, payload: &[u8], source: Ipv4Addr, interface: &str) {
    if ctx.router_id().is_none() {
        debug!("Router id not elected yet, ignoring PWOSPF packet from {}", source);
        return;
    }

    match OspfMessage::parse(payload) {
        Ok(OspfMessage::Hello(hello)) => {
            debug!("← Received HELLO from {} on {}", hello.router_id, interface);
            neighbor_manager::handle_hello(ctx, hello, source, interface).await;
        }
        Ok(OspfMessage::Lsu(lsu)) => {
            debug!(
                "← Received LSU from {} seq {} via {} on {}",
                lsu.router_id, lsu.sequence, source, interface
            );
            handle_lsu(ctx, lsu, source, interface).await;
        }
        Err(e) => debug!("Dropping PWOSPF packet from {} on {}: {}", source, interface, e),
    }
}

/// Stores the advertisements of a fresh LSU and relays it to every other
/// neighbor.
pub async fn handle_lsu(ctx: &RouterContext, lsu: Lsu, source: Ipv4Addr, interface: &str) {
    let Some(router_id) = ctx.router_id() else {
        return;
    };
    if lsu.router_id == router_id {
        debug!("Ignoring our own LSU relayed by {}", source);
        return;
    }

    let now = Instant::now();
    let mut state = ctx.state.lock().await;

    if !state.sequences.accept(lsu.router_id, lsu.sequence, now) {
        debug!(
            "Stale LSU from {}: seq {} not newer than {:?}",
            lsu.router_id,
            lsu.sequence,
            state.sequences.last(lsu.router_id)
        );
        return;
    }

    for lsa in &lsu.advertisements {
        match state.topology.update_from_lsa(lsu.router_id, lsa, source, lsu.sequence, now) {
            Some(true) => debug!("New topology entry {}/{} from {}", lsa.subnet, lsa.mask, lsu.router_id),
            Some(false) => {}
            None => warn!("Skipping LSA {}/{} from {}: bad mask", lsa.subnet, lsa.mask, lsu.router_id),
        }
    }
    ctx.trigger_spf();

    if lsu.ttl <= 1 {
        debug!("LSU from {} reached its hop limit", lsu.router_id);
        return;
    }

    let relayed = Lsu {
        ttl: lsu.ttl - 1,
        ..lsu
    };
    let payload = relayed.to_bytes();

    let targets: Vec<Interface> = state
        .interfaces
        .iter()
        .filter(|iface| iface.name != interface && iface.has_neighbor())
        .cloned()
        .collect();
    for iface in &targets {
        send_to_neighbor(ctx, iface, &payload).await;
    }
}
