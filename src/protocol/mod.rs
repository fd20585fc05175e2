pub mod message_handler;
pub mod messages;
pub mod neighbor;
pub mod neighbor_manager;
pub mod route_manager;
pub mod routing_table;
pub mod task_manager;

pub use messages::{Hello, Lsa, Lsu, OspfMessage, WireError};
pub use neighbor::{Neighbor, NeighborTable};
pub use routing_table::{RouteEntry, RouteSource, RoutingTable};

use crate::forwarding;
use crate::network::Interface;
use crate::router::{RouterContext, RouterState};
use log::{debug, error};
use messages::{ALL_SPF_ROUTERS, ALL_SPF_ROUTERS_MAC, DEFAULT_TTL, IP_PROTOCOL_OSPF, Ipv4Frame};
use pnet::datalink::MacAddr;
use std::net::Ipv4Addr;

/// One-second Hello cadence: every interface whose countdown runs out
/// multicasts a Hello and restarts the countdown.
pub async fn hello_tick(ctx: &RouterContext) {
    let Some(router_id) = ctx.router_id() else {
        return;
    };
    let hello_interval = ctx.timers().hello_interval;
    let mut state = ctx.state.lock().await;

    for iface in state.interfaces.iter_mut() {
        iface.hello_countdown = iface.hello_countdown.saturating_sub(1);
        if iface.hello_countdown > 0 {
            continue;
        }
        iface.hello_countdown = hello_interval;

        let hello = Hello {
            router_id,
            network_mask: iface.mask,
            hello_interval,
        };
        match multicast_frame(iface, &hello.to_bytes()) {
            Ok(frame) => {
                debug!("Sending hello on {}", iface.name);
                ctx.link().transmit(&iface.name, frame);
            }
            Err(e) => error!("Failed to build hello for {}: {}", iface.name, e),
        }
    }
}

/// Periodic LSU: advertise local routes to every adjacent router.
pub async fn lsu_round(ctx: &RouterContext) {
    if ctx.router_id().is_none() {
        return;
    }
    let mut state = ctx.state.lock().await;
    flood_own_lsu(ctx, &mut state).await;
}

/// Builds this router's LSU from its static and direct routes.
pub fn build_lsu(router_id: Ipv4Addr, state: &RouterState) -> Lsu {
    let advertisements = state
        .routing_table
        .local_routes()
        .map(|route| Lsa {
            subnet: route.destination.network(),
            mask: route.destination.netmask(),
            router_id: state
                .interface(&route.interface)
                .map_or(Ipv4Addr::UNSPECIFIED, |iface| iface.neighbor_id),
        })
        .collect();

    Lsu {
        router_id,
        sequence: state.lsu_sequence,
        ttl: DEFAULT_TTL,
        advertisements,
    }
}

/// Sends this router's LSU to every neighbor and advances the sequence.
/// Caller holds the coordinating lock.
pub(crate) async fn flood_own_lsu(ctx: &RouterContext, state: &mut RouterState) {
    let Some(router_id) = ctx.router_id() else {
        return;
    };
    let lsu = build_lsu(router_id, state);
    let payload = lsu.to_bytes();

    let targets: Vec<Interface> = state
        .interfaces
        .iter()
        .filter(|iface| iface.has_neighbor())
        .cloned()
        .collect();
    for iface in &targets {
        send_to_neighbor(ctx, iface, &payload).await;
    }
    debug!(
        "Flooded LSU seq {} ({} advertisements) to {} neighbors",
        lsu.sequence,
        lsu.advertisements.len(),
        targets.len()
    );

    state.lsu_sequence = state.lsu_sequence.wrapping_add(1);
}

/// Unicasts an OSPF payload to the neighbor learned on `iface`.
pub(crate) async fn send_to_neighbor(ctx: &RouterContext, iface: &Interface, payload: &[u8]) {
    let frame = Ipv4Frame {
        src_mac: iface.mac,
        dst_mac: MacAddr::zero(),
        src_ip: iface.ip,
        dst_ip: iface.neighbor_ip,
        protocol: IP_PROTOCOL_OSPF,
        ttl: DEFAULT_TTL,
        payload,
    }
    .build();

    match frame {
        Ok(frame) => forwarding::resolve_or_queue(ctx, iface, iface.neighbor_ip, frame).await,
        Err(e) => error!("Failed to build LSU for {}: {}", iface.name, e),
    }
}

fn multicast_frame(iface: &Interface, payload: &[u8]) -> Result<Vec<u8>, WireError> {
    Ipv4Frame {
        src_mac: iface.mac,
        dst_mac: ALL_SPF_ROUTERS_MAC,
        src_ip: iface.ip,
        dst_ip: ALL_SPF_ROUTERS,
        protocol: IP_PROTOCOL_OSPF,
        ttl: DEFAULT_TTL,
        payload,
    }
    .build()
}
