use crate::config::InterfaceConfig;
use crate::network::Interface;
use anyhow::{Result, anyhow, bail};
use log::info;
use pnet::datalink::{self, MacAddr, NetworkInterface};
use std::net::{IpAddr, Ipv4Addr};

/// Builds the interface table from configuration, filling in whatever the
/// configuration leaves out from the operating system.
pub fn resolve_interfaces(configs: &[InterfaceConfig]) -> Result<Vec<Interface>> {
    let system = datalink::interfaces();
    configs
        .iter()
        .map(|config| resolve_interface(config, &system))
        .collect()
}

fn resolve_interface(config: &InterfaceConfig, system: &[NetworkInterface]) -> Result<Interface> {
    let nic = system.iter().find(|nic| nic.name == config.name);

    let mac = match (&config.mac, nic) {
        (Some(mac), _) => mac
            .parse::<MacAddr>()
            .map_err(|e| anyhow!("Invalid MAC {} for {}: {:?}", mac, config.name, e))?,
        (None, Some(nic)) => nic
            .mac
            .ok_or_else(|| anyhow!("Interface {} has no MAC address", config.name))?,
        (None, None) => bail!("Interface {} not found", config.name),
    };

    let (ip, mask) = match (config.ip, config.mask, nic) {
        (Some(ip), Some(mask), _) => (ip, mask),
        (_, _, Some(nic)) => {
            let (ip, mask) = first_ipv4(nic)
                .ok_or_else(|| anyhow!("Interface {} has no IPv4 address", config.name))?;
            (config.ip.unwrap_or(ip), config.mask.unwrap_or(mask))
        }
        (_, _, None) => bail!("Interface {} not found", config.name),
    };

    info!("Interface {}: {}/{} {}", config.name, ip, mask, mac);
    Ok(Interface::new(config.name.clone(), ip, mask, mac))
}

fn first_ipv4(nic: &NetworkInterface) -> Option<(Ipv4Addr, Ipv4Addr)> {
    nic.ips.iter().find_map(|network| match (network.ip(), network.mask()) {
        (IpAddr::V4(ip), IpAddr::V4(mask)) => Some((ip, mask)),
        _ => None,
    })
}
