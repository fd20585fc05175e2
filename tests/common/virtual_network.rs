use pnet::datalink::MacAddr;
use pwospf_router::config::ProtocolTimers;
use pwospf_router::forwarding;
use pwospf_router::network::{Interface, Link};
use pwospf_router::protocol::routing_table::RouteEntry;
use pwospf_router::protocol::{hello_tick, lsu_round, neighbor_manager, route_manager};
use pwospf_router::{RouterContext, SharedContext};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Link that records every transmitted frame.
#[derive(Default)]
pub struct CaptureLink {
    frames: Mutex<Vec<(String, Vec<u8>)>>,
}

impl Link for CaptureLink {
    fn transmit(&self, interface: &str, frame: Vec<u8>) {
        self.frames.lock().unwrap().push((interface.to_string(), frame));
    }
}

impl CaptureLink {
    pub fn drain(&self) -> Vec<(String, Vec<u8>)> {
        std::mem::take(&mut *self.frames.lock().unwrap())
    }
}

pub struct VirtualRouter {
    pub name: String,
    pub ctx: SharedContext,
    pub link: Arc<CaptureLink>,
    pub silent: bool,
}

/// Point-to-point wires between router interfaces, driven one simulated
/// second at a time. Needs a paused tokio clock.
pub struct VirtualNetwork {
    pub routers: Vec<VirtualRouter>,
    wires: Vec<((usize, String), (usize, String))>,
    pub elapsed: u64,
}

pub fn mac_for(router: usize, interface: usize) -> MacAddr {
    MacAddr(0x02, 0, 0, 0, router as u8 + 1, interface as u8 + 1)
}

/// Builds a standalone router with /24 interfaces and an elected id.
pub async fn single_router(interfaces: &[(&str, [u8; 4])]) -> (SharedContext, Arc<CaptureLink>) {
    let link = Arc::new(CaptureLink::default());
    let ifaces = interfaces
        .iter()
        .enumerate()
        .map(|(i, (name, ip))| {
            Interface::new(*name, Ipv4Addr::from(*ip), Ipv4Addr::new(255, 255, 255, 0), mac_for(0, i))
        })
        .collect();
    let ctx = Arc::new(RouterContext::new(ProtocolTimers::default(), ifaces, link.clone()));
    ctx.startup_election().await;
    (ctx, link)
}

impl VirtualNetwork {
    /// `nodes`: router name and its interfaces (all /24).
    /// `wires`: (router, interface, router, interface).
    pub async fn create(nodes: &[(&str, &[(&str, [u8; 4])])], wires: &[(&str, &str, &str, &str)]) -> Self {
        let mut routers = Vec::new();
        for (index, (name, interfaces)) in nodes.iter().enumerate() {
            let link = Arc::new(CaptureLink::default());
            let ifaces = interfaces
                .iter()
                .enumerate()
                .map(|(i, (iface, ip))| {
                    Interface::new(*iface, Ipv4Addr::from(*ip), Ipv4Addr::new(255, 255, 255, 0), mac_for(index, i))
                })
                .collect();
            let ctx = Arc::new(RouterContext::new(ProtocolTimers::default(), ifaces, link.clone()));
            ctx.startup_election().await;
            routers.push(VirtualRouter {
                name: name.to_string(),
                ctx,
                link,
                silent: false,
            });
        }

        let position = |name: &str| {
            routers
                .iter()
                .position(|r| r.name == name)
                .unwrap_or_else(|| panic!("No node {name} found"))
        };
        let wires = wires
            .iter()
            .map(|(a, a_if, b, b_if)| ((position(a), a_if.to_string()), (position(b), b_if.to_string())))
            .collect();

        VirtualNetwork { routers, wires, elapsed: 0 }
    }

    pub fn get_node(&self, name: &str) -> &VirtualRouter {
        self.routers
            .iter()
            .find(|r| r.name == name)
            .unwrap_or_else(|| panic!("No node {name} found"))
    }

    pub fn silence(&mut self, name: &str) {
        if let Some(router) = self.routers.iter_mut().find(|r| r.name == name) {
            router.silent = true;
        }
    }

    fn peer_of(&self, router: usize, interface: &str) -> Option<(usize, String)> {
        self.wires.iter().find_map(|(a, b)| {
            if a.0 == router && a.1 == interface {
                Some(b.clone())
            } else if b.0 == router && b.1 == interface {
                Some(a.clone())
            } else {
                None
            }
        })
    }

    /// Delivers frames until the network is quiet.
    pub async fn flush_packets(&self) {
        for _ in 0..64 {
            let mut in_flight = Vec::new();
            for (index, router) in self.routers.iter().enumerate() {
                for (interface, frame) in router.link.drain() {
                    if router.silent {
                        continue;
                    }
                    if let Some(peer) = self.peer_of(index, &interface) {
                        in_flight.push((peer, frame));
                    }
                }
            }
            if in_flight.is_empty() {
                return;
            }
            for ((peer, interface), frame) in in_flight {
                let router = &self.routers[peer];
                if !router.silent {
                    forwarding::handle_frame(&router.ctx, &frame, &interface).await;
                }
            }
        }
        panic!("network did not go quiet");
    }

    /// One simulated second of every background loop.
    pub async fn tick(&mut self) {
        tokio::time::advance(Duration::from_secs(1)).await;
        self.elapsed += 1;

        for router in self.routers.iter().filter(|r| !r.silent) {
            hello_tick(&router.ctx).await;
            neighbor_manager::neighbor_sweep(&router.ctx).await;
            route_manager::topology_sweep(&router.ctx).await;
            forwarding::arp_sweep(&router.ctx).await;
            if self.elapsed % router.ctx.timers().lsu_interval.as_secs() == 0 {
                lsu_round(&router.ctx).await;
            }
        }
        self.flush_packets().await;

        for router in self.routers.iter().filter(|r| !r.silent) {
            route_manager::recompute_routes(&router.ctx).await;
        }
    }

    pub async fn tick_n(&mut self, times: u64) {
        for _ in 0..times {
            self.tick().await;
        }
    }

    pub async fn get_route(&self, node: &str, destination: &str) -> Option<RouteEntry> {
        let destination = destination.parse().unwrap();
        self.get_node(node)
            .ctx
            .routes()
            .await
            .into_iter()
            .find(|route| route.destination == destination)
    }
}
