use super::{hello_tick, lsu_round, neighbor_manager, route_manager};
use crate::forwarding;
use crate::router::{RouterContext, SharedContext};
use log::{debug, info};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval, interval_at};

const TICK: Duration = Duration::from_secs(1);
const STATUS_INTERVAL: Duration = Duration::from_secs(30);

/// Handles of every background loop plus their shared shutdown signal.
pub struct TaskManager {
    shutdown_tx: broadcast::Sender<()>,
    handles: Vec<JoinHandle<()>>,
}

impl TaskManager {
    pub fn start(ctx: SharedContext, status_dump: bool) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut handles = Vec::new();

        // Route recomputation first so no trigger is missed
        handles.push(start_spf_task(ctx.clone(), ctx.subscribe_spf(), shutdown_tx.subscribe()));
        handles.push(start_hello_task(ctx.clone(), shutdown_tx.subscribe()));
        handles.push(start_lsu_task(ctx.clone(), shutdown_tx.subscribe()));
        handles.push(start_neighbor_sweep_task(ctx.clone(), shutdown_tx.subscribe()));
        handles.push(start_topology_sweep_task(ctx.clone(), shutdown_tx.subscribe()));
        handles.push(start_arp_sweep_task(ctx.clone(), shutdown_tx.subscribe()));

        if status_dump {
            handles.push(start_status_task(ctx, shutdown_tx.subscribe()));
        }

        info!("All protocol tasks started");
        Self { shutdown_tx, handles }
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("All protocol tasks stopped");
    }
}

fn start_spf_task(
    ctx: SharedContext,
    mut trigger: watch::Receiver<u64>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        route_manager::recompute_routes(&ctx).await;
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("SPF task shutting down");
                    break;
                }
                changed = trigger.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    route_manager::recompute_routes(&ctx).await;
                }
            }
        }
    })
}

fn start_hello_task(ctx: SharedContext, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = interval(TICK);
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("Hello task shutting down");
                    break;
                }
                _ = interval.tick() => hello_tick(&ctx).await,
            }
        }
    })
}

fn start_lsu_task(ctx: SharedContext, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = ctx.timers().lsu_interval;
        let mut interval = interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("LSU task shutting down");
                    break;
                }
                _ = interval.tick() => lsu_round(&ctx).await,
            }
        }
    })
}

fn start_neighbor_sweep_task(ctx: SharedContext, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = interval(TICK);
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("Neighbor sweep task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    neighbor_manager::neighbor_sweep(&ctx).await;
                }
            }
        }
    })
}

fn start_topology_sweep_task(ctx: SharedContext, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = interval(TICK);
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("Topology sweep task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    route_manager::topology_sweep(&ctx).await;
                }
            }
        }
    })
}

fn start_arp_sweep_task(ctx: SharedContext, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = interval(TICK);
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("ARP sweep task shutting down");
                    break;
                }
                _ = interval.tick() => forwarding::arp_sweep(&ctx).await,
            }
        }
    })
}

fn start_status_task(ctx: SharedContext, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = interval(STATUS_INTERVAL);
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("Status task shutting down");
                    break;
                }
                _ = interval.tick() => print_debug_status(&ctx).await,
            }
        }
    })
}

pub async fn print_debug_status(ctx: &RouterContext) {
    let state = ctx.state.lock().await;
    let router_id = ctx
        .router_id()
        .map_or_else(|| "unset".to_string(), |id| id.to_string());

    info!("=== STATUS {} ===", router_id);

    info!("Interfaces:");
    for iface in &state.interfaces {
        info!(
            "  {} {}/{} {} neighbor {} ({})",
            iface.name, iface.ip, iface.mask, iface.mac, iface.neighbor_id, iface.neighbor_ip
        );
    }

    info!("Neighbors ({}):", state.neighbors.len());
    for neighbor in state.neighbors.iter() {
        info!("  {} (last seen: {:?} ago)", neighbor.router_id, neighbor.last_seen.elapsed());
    }

    info!("Topology ({} entries):", state.topology.len());
    for entry in state.topology.iter() {
        info!(
            "  {} -> {} neighbor {} seq {} via {}",
            entry.router_id, entry.network, entry.neighbor_id, entry.sequence, entry.next_hop
        );
    }

    info!("Routing table:");
    if state.routing_table.is_empty() {
        info!("  (no routes)");
    }
    for route in state.routing_table.iter() {
        info!("  {}", route);
    }
    info!("===================");
}
