use super::messages::Hello;
use crate::protocol::flood_own_lsu;
use crate::router::RouterContext;
use log::{debug, info, warn};
use std::net::Ipv4Addr;
use tokio::time::Instant;

/// Processes a Hello received on `interface` from `source`.
pub async fn handle_hello(ctx: &RouterContext, hello: Hello, source: Ipv4Addr, interface: &str) {
    let Some(router_id) = ctx.router_id() else {
        return;
    };

    // Ignore messages from ourselves
    if hello.router_id == router_id {
        return;
    }

    let hello_interval = ctx.timers().hello_interval;
    let now = Instant::now();
    let mut state = ctx.state.lock().await;

    let Some(iface) = state.interface_mut(interface) else {
        warn!("Hello from {} on unknown interface {}", hello.router_id, interface);
        return;
    };

    if hello.network_mask != iface.mask {
        debug!(
            "Hello from {} on {}: mask {} does not match {}",
            hello.router_id, interface, hello.network_mask, iface.mask
        );
        return;
    }
    if hello.hello_interval != hello_interval {
        debug!(
            "Hello from {} on {}: interval {} does not match {}",
            hello.router_id, interface, hello.hello_interval, hello_interval
        );
        return;
    }

    if iface.neighbor_id != hello.router_id {
        iface.set_neighbor(hello.router_id, source);
        if state.neighbors.contains(hello.router_id) {
            info!("Neighbor {} now also seen on {}", hello.router_id, interface);
        } else {
            info!("New neighbor {} ({}) on {}", hello.router_id, source, interface);
        }
        state.neighbors.upsert(hello.router_id, now);

        flood_own_lsu(ctx, &mut state).await;
        ctx.trigger_spf();
    } else if iface.neighbor_ip != source {
        info!("Neighbor {} on {} moved from {} to {}", hello.router_id, interface, iface.neighbor_ip, source);
        iface.neighbor_ip = source;
    }

    state.neighbors.refresh(hello.router_id, now);
}

/// Evicts neighbors that missed the dead interval and forgets them on
/// every interface. Returns the evicted router ids.
pub async fn neighbor_sweep(ctx: &RouterContext) -> Vec<Ipv4Addr> {
    let dead_interval = ctx.timers().dead_interval();
    let mut state = ctx.state.lock().await;

    let dead = state.neighbors.expire(Instant::now(), dead_interval);
    for router_id in &dead {
        warn!("Neighbor {} timed out", router_id);
        for iface in state.interfaces.iter_mut().filter(|iface| iface.neighbor_id == *router_id) {
            iface.clear_neighbor();
        }
    }

    if !dead.is_empty() {
        ctx.trigger_spf();
    }
    dead
}
