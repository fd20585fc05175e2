use ipnet::{Ipv4Net, PrefixLenError};
use pnet::datalink::MacAddr;
use std::net::Ipv4Addr;

/// A router port together with what PWOSPF learned about the far end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub ip: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub mac: MacAddr,
    /// Seconds until the next Hello goes out.
    pub hello_countdown: u16,
    pub neighbor_id: Ipv4Addr,
    pub neighbor_ip: Ipv4Addr,
}

impl Interface {
    pub fn new(name: impl Into<String>, ip: Ipv4Addr, mask: Ipv4Addr, mac: MacAddr) -> Self {
        Self {
            name: name.into(),
            ip,
            mask,
            mac,
            hello_countdown: 0,
            neighbor_id: Ipv4Addr::UNSPECIFIED,
            neighbor_ip: Ipv4Addr::UNSPECIFIED,
        }
    }

    /// The attached subnet, e.g. `10.0.1.0/24` for `10.0.1.1/255.255.255.0`.
    pub fn network(&self) -> Result<Ipv4Net, PrefixLenError> {
        Ipv4Net::with_netmask(self.ip, self.mask).map(|net| net.trunc())
    }

    pub fn has_neighbor(&self) -> bool {
        !self.neighbor_id.is_unspecified()
    }

    pub fn set_neighbor(&mut self, router_id: Ipv4Addr, ip: Ipv4Addr) {
        self.neighbor_id = router_id;
        self.neighbor_ip = ip;
    }

    pub fn clear_neighbor(&mut self) {
        self.neighbor_id = Ipv4Addr::UNSPECIFIED;
        self.neighbor_ip = Ipv4Addr::UNSPECIFIED;
    }
}
