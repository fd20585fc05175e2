use crate::protocol::routing_table::{DISTANCE_STATIC, RouteEntry};
use anyhow::{Context, Result, ensure};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub interfaces: Vec<InterfaceConfig>,
    pub hello_interval: u16, // seconds
    pub lsu_interval: u32,   // seconds
    pub topology_max_age: u32,
    pub workers: usize,
    pub queue_depth: usize,
    pub static_routes: Vec<StaticRouteConfig>,
}

/// Interface to run on. Address fields left out are discovered from the OS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<Ipv4Addr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<Ipv4Addr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticRouteConfig {
    pub destination: String,
    pub gateway: Ipv4Addr,
    pub interface: String,
}

/// Protocol timing shared by the background loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolTimers {
    pub hello_interval: u16,
    pub lsu_interval: Duration,
    pub topology_max_age: Duration,
}

impl ProtocolTimers {
    pub fn dead_interval(&self) -> Duration {
        Duration::from_secs(3 * u64::from(self.hello_interval))
    }
}

impl Default for ProtocolTimers {
    fn default() -> Self {
        RouterConfig::default().timers()
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            interfaces: vec![],
            hello_interval: 5,
            lsu_interval: 30,
            topology_max_age: 90,
            workers: 4,
            queue_depth: 1024,
            static_routes: vec![],
        }
    }
}

impl InterfaceConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ip: None,
            mask: None,
            mac: None,
        }
    }
}

impl StaticRouteConfig {
    pub fn to_route(&self) -> Result<RouteEntry> {
        let destination: Ipv4Net = self
            .destination
            .parse()
            .with_context(|| format!("Invalid static route destination {}", self.destination))?;
        Ok(RouteEntry {
            destination: destination.trunc(),
            gateway: self.gateway,
            interface: self.interface.clone(),
            distance: DISTANCE_STATIC,
        })
    }
}

impl RouterConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: RouterConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.hello_interval > 0, "hello_interval must be positive");
        ensure!(self.lsu_interval > 0, "lsu_interval must be positive");
        ensure!(self.topology_max_age > 0, "topology_max_age must be positive");
        ensure!(!self.interfaces.is_empty(), "no interfaces configured");
        for route in &self.static_routes {
            ensure!(
                self.interfaces.iter().any(|iface| iface.name == route.interface),
                "static route {} uses unknown interface {}",
                route.destination,
                route.interface
            );
        }
        Ok(())
    }

    pub fn timers(&self) -> ProtocolTimers {
        ProtocolTimers {
            hello_interval: self.hello_interval,
            lsu_interval: Duration::from_secs(u64::from(self.lsu_interval)),
            topology_max_age: Duration::from_secs(u64::from(self.topology_max_age)),
        }
    }

    pub fn static_routes(&self) -> Result<Vec<RouteEntry>> {
        self.static_routes.iter().map(StaticRouteConfig::to_route).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: RouterConfig =
            serde_json::from_str(r#"{ "interfaces": [ { "name": "eth0" } ] }"#).unwrap();
        assert_eq!(config.hello_interval, 5);
        assert_eq!(config.lsu_interval, 30);
        assert_eq!(config.topology_max_age, 90);
        assert_eq!(config.interfaces, vec![InterfaceConfig::named("eth0")]);
        assert_eq!(config.timers().dead_interval(), Duration::from_secs(15));
        config.validate().unwrap();
    }

    #[test]
    fn static_routes_parse_with_distance_zero() {
        let config: RouterConfig = serde_json::from_str(
            r#"{
                "interfaces": [ { "name": "eth0", "ip": "10.0.1.1", "mask": "255.255.255.0" } ],
                "static_routes": [ { "destination": "0.0.0.0/0", "gateway": "10.0.1.254", "interface": "eth0" } ]
            }"#,
        )
        .unwrap();

        let routes = config.static_routes().unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].distance, DISTANCE_STATIC);
        assert_eq!(routes[0].destination.prefix_len(), 0);
    }

    #[test]
    fn validation_rejects_unknown_route_interface() {
        let mut config = RouterConfig::default();
        config.interfaces.push(InterfaceConfig::named("eth0"));
        config.static_routes.push(StaticRouteConfig {
            destination: "10.9.0.0/16".to_string(),
            gateway: Ipv4Addr::new(10, 0, 1, 2),
            interface: "eth7".to_string(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_destination_is_an_error() {
        let route = StaticRouteConfig {
            destination: "not-a-network".to_string(),
            gateway: Ipv4Addr::UNSPECIFIED,
            interface: "eth0".to_string(),
        };
        assert!(route.to_route().is_err());
    }
}
