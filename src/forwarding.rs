//! Forwarding plane: frame classification, ARP, ICMP and next-hop delivery.

use crate::network::Interface;
use crate::protocol::message_handler;
use crate::protocol::messages::{
    ALL_SPF_ROUTERS, ALL_SPF_ROUTERS_MAC, DEFAULT_TTL, ETHERNET_HEADER_LEN, IP_PROTOCOL_OSPF, Ipv4Frame, arp_frame,
    finish_icmp, icmp_error, rewrite_ethernet,
};
use crate::router::RouterContext;
use log::{debug, error, info, warn};
use pnet::datalink::MacAddr;
use pnet::packet::Packet;
use pnet::packet::arp::{ArpOperations, ArpPacket};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::icmp::{IcmpPacket, IcmpTypes};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{self, Ipv4Packet, MutableIpv4Packet};
use std::net::Ipv4Addr;
use tokio::time::Instant;

pub const ICMP_DEST_UNREACHABLE: u8 = 3;
pub const ICMP_TIME_EXCEEDED: u8 = 11;
pub const ICMP_CODE_NET_UNREACHABLE: u8 = 0;
pub const ICMP_CODE_PORT_UNREACHABLE: u8 = 3;
pub const ICMP_CODE_TTL_EXCEEDED: u8 = 0;

/// Bytes of the offending datagram's payload quoted in ICMP errors.
const ICMP_QUOTED_PAYLOAD: usize = 8;

/// Handles one Ethernet frame received on `interface`.
pub async fn handle_frame(ctx: &RouterContext, frame: &[u8], interface: &str) {
    let Some(ethernet) = EthernetPacket::new(frame) else {
        debug!("Dropping runt frame ({} bytes) on {}", frame.len(), interface);
        return;
    };

    // The capture is promiscuous; only accept what this port would receive
    let Some(local_mac) = ctx.state.lock().await.interface(interface).map(|iface| iface.mac) else {
        debug!("Dropping frame on unknown interface {}", interface);
        return;
    };
    let destination = ethernet.get_destination();
    if destination != local_mac && !destination.is_broadcast() && destination != ALL_SPF_ROUTERS_MAC {
        debug!("Dropping frame for {} on {}", destination, interface);
        return;
    }

    match ethernet.get_ethertype() {
        EtherTypes::Arp => handle_arp(ctx, &ethernet, interface).await,
        EtherTypes::Ipv4 => handle_ip(ctx, &ethernet, interface).await,
        other => debug!("Dropping frame with ethertype {:?} on {}", other, interface),
    }
}

async fn handle_arp(ctx: &RouterContext, ethernet: &EthernetPacket<'_>, interface: &str) {
    let Some(arp) = ArpPacket::new(ethernet.payload()) else {
        debug!("Dropping truncated ARP packet on {}", interface);
        return;
    };
    let sender_ip = arp.get_sender_proto_addr();
    let sender_mac = arp.get_sender_hw_addr();

    match arp.get_operation() {
        ArpOperations::Request => {
            let target_ip = arp.get_target_proto_addr();
            let local = {
                let state = ctx.state.lock().await;
                state.interfaces.iter().find(|iface| iface.ip == target_ip).cloned()
            };
            let Some(local) = local else {
                debug!("ARP request for {} is not for us", target_ip);
                return;
            };

            let pending = ctx.arp().insert(sender_ip, sender_mac).await;
            match arp_frame(ArpOperations::Reply, local.mac, local.ip, sender_mac, sender_ip, sender_mac) {
                Ok(reply) => ctx.link().transmit(interface, reply),
                Err(e) => error!("Failed to build ARP reply: {}", e),
            }
            if let Some(request) = pending {
                release_queued(ctx, request.frames, sender_mac);
            }
        }
        ArpOperations::Reply => {
            debug!("ARP reply: {} is at {}", sender_ip, sender_mac);
            if let Some(request) = ctx.arp().insert(sender_ip, sender_mac).await {
                release_queued(ctx, request.frames, sender_mac);
            }
        }
        other => debug!("Ignoring ARP operation {:?}", other),
    }
}

/// Sends frames that were waiting on a resolution, in arrival order.
fn release_queued(ctx: &RouterContext, frames: Vec<crate::network::arp::QueuedFrame>, mac: MacAddr) {
    for mut queued in frames {
        let source = match EthernetPacket::new(&queued.frame) {
            Some(ethernet) => ethernet.get_source(),
            None => continue,
        };
        if rewrite_ethernet(&mut queued.frame, source, mac) {
            ctx.link().transmit(&queued.interface, queued.frame);
        }
    }
}

async fn handle_ip(ctx: &RouterContext, ethernet: &EthernetPacket<'_>, interface: &str) {
    let datagram = ethernet.payload();
    let Some(ip) = Ipv4Packet::new(datagram) else {
        debug!("Dropping truncated IPv4 packet on {}", interface);
        return;
    };

    let header_len = usize::from(ip.get_header_length()) * 4;
    let total_len = usize::from(ip.get_total_length());
    if ip.get_version() != 4 || header_len < 20 || total_len < header_len || total_len > datagram.len() {
        debug!("Dropping malformed IPv4 header on {}", interface);
        return;
    }
    if ipv4::checksum(&ip) != ip.get_checksum() {
        debug!("Dropping IPv4 packet with bad checksum on {}", interface);
        return;
    }

    let datagram = &datagram[..total_len];
    let payload = &datagram[header_len..];
    let source = ip.get_source();
    let destination = ip.get_destination();
    let protocol = ip.get_next_level_protocol();

    let receiver = {
        let state = ctx.state.lock().await;
        let local = state.owns_address(destination);
        state.interface(interface).cloned().map(|iface| (iface, local))
    };
    let Some((receiver, is_local)) = receiver else {
        warn!("Frame on unknown interface {}", interface);
        return;
    };

    if protocol == IP_PROTOCOL_OSPF && (is_local || destination == ALL_SPF_ROUTERS) {
        message_handler::handle_message(ctx, payload, source, interface).await;
        return;
    }

    if is_local {
        if protocol == IpNextHeaderProtocols::Icmp {
            let echo = IcmpPacket::new(payload)
                .is_some_and(|icmp| icmp.get_icmp_type() == IcmpTypes::EchoRequest);
            if echo {
                send_echo_reply(ctx, &receiver, ethernet.get_source(), source, destination, payload);
            } else {
                debug!("Dropping ICMP for local address {}", destination);
            }
        } else {
            send_icmp_error(ctx, datagram, ICMP_DEST_UNREACHABLE, ICMP_CODE_PORT_UNREACHABLE).await;
        }
        return;
    }

    if destination.is_multicast() || destination.is_broadcast() {
        debug!("Dropping {:?} packet for group {}", protocol, destination);
        return;
    }

    if ip.get_ttl() <= 1 {
        debug!("TTL expired for {} -> {}", source, destination);
        send_icmp_error(ctx, datagram, ICMP_TIME_EXCEEDED, ICMP_CODE_TTL_EXCEEDED).await;
        return;
    }

    let lookup = lookup_route(ctx, destination).await;
    let Some((out, next_hop)) = lookup else {
        debug!("No route to {}", destination);
        send_icmp_error(ctx, datagram, ICMP_DEST_UNREACHABLE, ICMP_CODE_NET_UNREACHABLE).await;
        return;
    };

    let mut frame = Vec::with_capacity(ETHERNET_HEADER_LEN + total_len);
    frame.extend_from_slice(&ethernet.packet()[..ETHERNET_HEADER_LEN]);
    frame.extend_from_slice(datagram);
    {
        let Some(mut forwarded) = MutableIpv4Packet::new(&mut frame[ETHERNET_HEADER_LEN..]) else {
            return;
        };
        forwarded.set_ttl(forwarded.get_ttl() - 1);
        let sum = ipv4::checksum(&forwarded.to_immutable());
        forwarded.set_checksum(sum);
    }

    resolve_or_queue(ctx, &out, next_hop, frame).await;
}

/// Longest-prefix lookup returning the outgoing interface and the address to
/// resolve.
async fn lookup_route(ctx: &RouterContext, destination: Ipv4Addr) -> Option<(Interface, Ipv4Addr)> {
    let state = ctx.state.lock().await;
    let route = state.routing_table.find_best_route(destination)?;
    match state.interface(&route.interface) {
        Some(iface) => Some((iface.clone(), route.next_hop_for(destination))),
        None => {
            warn!("Route {} uses unknown interface {}", route.destination, route.interface);
            None
        }
    }
}

fn send_echo_reply(
    ctx: &RouterContext,
    receiver: &Interface,
    requester_mac: MacAddr,
    requester: Ipv4Addr,
    local: Ipv4Addr,
    request: &[u8],
) {
    let mut reply = request.to_vec();
    reply[0] = IcmpTypes::EchoReply.0;
    reply[1] = 0;
    if let Err(e) = finish_icmp(&mut reply) {
        error!("Failed to build echo reply: {}", e);
        return;
    }

    let frame = Ipv4Frame {
        src_mac: receiver.mac,
        dst_mac: requester_mac,
        src_ip: local,
        dst_ip: requester,
        protocol: IpNextHeaderProtocols::Icmp,
        ttl: DEFAULT_TTL,
        payload: &reply,
    }
    .build();

    match frame {
        Ok(frame) => ctx.link().transmit(&receiver.name, frame),
        Err(e) => error!("Failed to build echo reply: {}", e),
    }
}

/// Sends an ICMP error about `datagram` (IP header onward) back to its source.
pub async fn send_icmp_error(ctx: &RouterContext, datagram: &[u8], icmp_type: u8, icmp_code: u8) {
    let Some(original) = Ipv4Packet::new(datagram) else {
        return;
    };
    let header_len = usize::from(original.get_header_length()) * 4;

    // Never answer an error with an error
    if original.get_next_level_protocol() == IpNextHeaderProtocols::Icmp {
        let is_error = datagram
            .get(header_len)
            .is_some_and(|kind| *kind == ICMP_DEST_UNREACHABLE || *kind == ICMP_TIME_EXCEEDED);
        if is_error {
            return;
        }
    }

    let sender = original.get_source();
    let Some((out, next_hop)) = lookup_route(ctx, sender).await else {
        warn!("No route back to {} for ICMP {}/{}", sender, icmp_type, icmp_code);
        return;
    };

    let quoted = &datagram[..datagram.len().min(header_len + ICMP_QUOTED_PAYLOAD)];
    let message = match icmp_error(icmp_type, icmp_code, quoted) {
        Ok(message) => message,
        Err(e) => {
            error!("Failed to build ICMP error: {}", e);
            return;
        }
    };

    let frame = Ipv4Frame {
        src_mac: out.mac,
        dst_mac: MacAddr::zero(),
        src_ip: out.ip,
        dst_ip: sender,
        protocol: IpNextHeaderProtocols::Icmp,
        ttl: DEFAULT_TTL,
        payload: &message,
    }
    .build();

    match frame {
        Ok(frame) => {
            debug!("ICMP {}/{} to {} via {}", icmp_type, icmp_code, sender, out.name);
            resolve_or_queue(ctx, &out, next_hop, frame).await;
        }
        Err(e) => error!("Failed to build ICMP error: {}", e),
    }
}

/// Sends `frame` out `out` toward `next_hop`, or parks it behind an ARP
/// request. Never takes the coordinating lock, so it may be called while
/// holding it.
pub async fn resolve_or_queue(ctx: &RouterContext, out: &Interface, next_hop: Ipv4Addr, mut frame: Vec<u8>) {
    if let Some(mac) = ctx.arp().lookup(next_hop).await {
        if rewrite_ethernet(&mut frame, out.mac, mac) {
            ctx.link().transmit(&out.name, frame);
        }
        return;
    }

    if !rewrite_ethernet(&mut frame, out.mac, MacAddr::zero()) {
        return;
    }
    if ctx.arp().enqueue(next_hop, frame, &out.name).await {
        send_arp_request(ctx, out, next_hop);
    }
}

fn send_arp_request(ctx: &RouterContext, out: &Interface, target: Ipv4Addr) {
    match arp_frame(
        ArpOperations::Request,
        out.mac,
        out.ip,
        MacAddr::zero(),
        target,
        MacAddr::broadcast(),
    ) {
        Ok(request) => {
            debug!("ARP who-has {} on {}", target, out.name);
            ctx.link().transmit(&out.name, request);
        }
        Err(e) => error!("Failed to build ARP request: {}", e),
    }
}

/// Re-sends outstanding ARP requests and drops frames whose next hop never
/// answered.
pub async fn arp_sweep(ctx: &RouterContext) {
    let outcome = ctx.arp().sweep(Instant::now()).await;

    if !outcome.retry.is_empty() {
        let state = ctx.state.lock().await;
        for (ip, interface) in &outcome.retry {
            match state.interface(interface) {
                Some(out) => send_arp_request(ctx, out, *ip),
                None => warn!("ARP retry for {} on unknown interface {}", ip, interface),
            }
        }
    }

    for request in outcome.expired {
        info!(
            "Giving up on ARP for {}: dropping {} queued frames",
            request.ip,
            request.frames.len()
        );
    }
}
