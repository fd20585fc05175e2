use crate::config::ProtocolTimers;
use crate::network::{ArpCache, Interface, Link, SequenceTracker, Topology, TopologyEntry};
use crate::protocol::neighbor::{Neighbor, NeighborTable};
use crate::protocol::routing_table::{RouteEntry, RoutingTable};
use crate::protocol::task_manager::TaskManager;
use log::{info, warn};
use std::net::Ipv4Addr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{Mutex, watch};

/// Everything guarded by the coordinating lock.
#[derive(Debug, Default)]
pub struct RouterState {
    pub interfaces: Vec<Interface>,
    pub neighbors: NeighborTable,
    pub topology: Topology,
    pub sequences: SequenceTracker,
    pub routing_table: RoutingTable,
    /// Sequence number of the next LSU this router originates.
    pub lsu_sequence: u16,
}

impl RouterState {
    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|iface| iface.name == name)
    }

    pub fn interface_mut(&mut self, name: &str) -> Option<&mut Interface> {
        self.interfaces.iter_mut().find(|iface| iface.name == name)
    }

    pub fn owns_address(&self, ip: Ipv4Addr) -> bool {
        self.interfaces.iter().any(|iface| iface.ip == ip)
    }
}

/// Shared handle over all router state. Lock order: `spf_lock`, then
/// `state`, then the ARP cache.
pub struct RouterContext {
    router_id: OnceLock<Ipv4Addr>,
    pub(crate) state: Mutex<RouterState>,
    pub(crate) spf_lock: Mutex<()>,
    spf_trigger: watch::Sender<u64>,
    link: Arc<dyn Link>,
    arp: ArpCache,
    timers: ProtocolTimers,
}

pub type SharedContext = Arc<RouterContext>;

impl RouterContext {
    pub fn new(timers: ProtocolTimers, interfaces: Vec<Interface>, link: Arc<dyn Link>) -> Self {
        let (spf_trigger, _) = watch::channel(0);
        Self {
            router_id: OnceLock::new(),
            state: Mutex::new(RouterState {
                interfaces,
                ..RouterState::default()
            }),
            spf_lock: Mutex::new(()),
            spf_trigger,
            link,
            arp: ArpCache::default(),
            timers,
        }
    }

    pub fn router_id(&self) -> Option<Ipv4Addr> {
        self.router_id.get().copied()
    }

    pub fn timers(&self) -> &ProtocolTimers {
        &self.timers
    }

    pub fn link(&self) -> &dyn Link {
        self.link.as_ref()
    }

    pub fn arp(&self) -> &ArpCache {
        &self.arp
    }

    pub async fn add_interface(&self, interface: Interface) {
        let mut state = self.state.lock().await;
        if state.interface(&interface.name).is_some() {
            warn!("Interface {} already registered", interface.name);
            return;
        }
        state.interfaces.push(interface);
    }

    /// Installs a configured route with distance 0.
    pub async fn add_static_route(&self, route: RouteEntry) {
        let mut state = self.state.lock().await;
        info!("Static route {}", route);
        state.routing_table.add_route(route);
    }

    /// Waits for at least one interface, then fixes the router id to the
    /// highest interface address and seeds one direct route per subnet.
    /// Calling it again returns the id chosen the first time.
    pub async fn startup_election(&self) -> Ipv4Addr {
        if let Some(router_id) = self.router_id() {
            return router_id;
        }

        loop {
            {
                let mut state = self.state.lock().await;
                if let Some(highest) = state.interfaces.iter().map(|iface| iface.ip).max() {
                    let router_id = *self.router_id.get_or_init(|| highest);
                    seed_direct_routes(&mut state);
                    info!("Router id elected: {}", router_id);
                    drop(state);
                    self.trigger_spf();
                    return router_id;
                }
            }
            info!("Waiting for interfaces before electing a router id");
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    /// Requests a route recomputation. Requests issued while one is pending
    /// collapse into a single run.
    pub fn trigger_spf(&self) {
        self.spf_trigger.send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    pub fn subscribe_spf(&self) -> watch::Receiver<u64> {
        self.spf_trigger.subscribe()
    }

    pub async fn routes(&self) -> Vec<RouteEntry> {
        self.state.lock().await.routing_table.iter().cloned().collect()
    }

    pub async fn neighbors(&self) -> Vec<Neighbor> {
        self.state.lock().await.neighbors.iter().cloned().collect()
    }

    pub async fn topology(&self) -> Vec<TopologyEntry> {
        self.state.lock().await.topology.iter().cloned().collect()
    }

    pub async fn interfaces(&self) -> Vec<Interface> {
        self.state.lock().await.interfaces.clone()
    }
}

fn seed_direct_routes(state: &mut RouterState) {
    let mut seeded = Vec::new();
    for iface in &state.interfaces {
        match iface.network() {
            Ok(network) => seeded.push(RouteEntry::direct(network, iface.name.clone())),
            Err(_) => warn!("Interface {} has non-contiguous mask {}", iface.name, iface.mask),
        }
    }

    for route in seeded {
        if state.routing_table.iter().any(|existing| existing.destination == route.destination) {
            continue;
        }
        info!("Direct route {}", route);
        state.routing_table.add_route(route);
    }
}

/// Owns the background loops of one router.
pub struct Router {
    ctx: SharedContext,
    tasks: Option<TaskManager>,
}

impl Router {
    pub fn new(ctx: SharedContext) -> Self {
        Self { ctx, tasks: None }
    }

    pub fn context(&self) -> &SharedContext {
        &self.ctx
    }

    /// Elects the router id and starts every periodic loop.
    pub async fn start(&mut self, status_dump: bool) -> Ipv4Addr {
        let router_id = self.ctx.startup_election().await;
        if let Some(tasks) = self.tasks.take() {
            tasks.shutdown().await;
        }
        self.tasks = Some(TaskManager::start(self.ctx.clone(), status_dump));
        router_id
    }

    pub async fn shutdown(&mut self) {
        if let Some(tasks) = self.tasks.take() {
            tasks.shutdown().await;
        }
        info!("Router stopped");
    }
}
