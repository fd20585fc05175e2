use pnet::datalink::MacAddr;
use pnet::packet::Packet;
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::Ipv4Packet;
use pwospf_router::protocol::messages::{
    ALL_SPF_ROUTERS, ALL_SPF_ROUTERS_MAC, IP_PROTOCOL_OSPF, Ipv4Frame, finish_icmp,
};
use pwospf_router::protocol::{Hello, Lsu, OspfMessage};
use std::net::Ipv4Addr;

pub const HOST_MAC: MacAddr = MacAddr(0x02, 0xaa, 0, 0, 0, 1);

pub fn ip_frame(
    dst_mac: MacAddr,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    protocol: IpNextHeaderProtocol,
    ttl: u8,
    payload: &[u8],
) -> Vec<u8> {
    Ipv4Frame {
        src_mac: HOST_MAC,
        dst_mac,
        src_ip: src,
        dst_ip: dst,
        protocol,
        ttl,
        payload,
    }
    .build()
    .unwrap()
}

pub fn hello_frame(hello: &Hello, src: Ipv4Addr) -> Vec<u8> {
    ip_frame(ALL_SPF_ROUTERS_MAC, src, ALL_SPF_ROUTERS, IP_PROTOCOL_OSPF, 64, &hello.to_bytes())
}

pub fn lsu_frame(lsu: &Lsu, src: Ipv4Addr, dst: Ipv4Addr, dst_mac: MacAddr) -> Vec<u8> {
    ip_frame(dst_mac, src, dst, IP_PROTOCOL_OSPF, 64, &lsu.to_bytes())
}

pub fn udp_frame(dst_mac: MacAddr, src: Ipv4Addr, dst: Ipv4Addr, ttl: u8) -> Vec<u8> {
    // source port, destination port, length, checksum, 4 bytes of data
    let datagram = [0x30, 0x39, 0x00, 0x35, 0x00, 0x0c, 0x00, 0x00, 1, 2, 3, 4];
    ip_frame(dst_mac, src, dst, IpNextHeaderProtocols::Udp, ttl, &datagram)
}

pub fn echo_request_frame(dst_mac: MacAddr, src: Ipv4Addr, dst: Ipv4Addr) -> Vec<u8> {
    let mut message = vec![8, 0, 0, 0, 0x12, 0x34, 0x00, 0x01, b'p', b'i', b'n', b'g'];
    finish_icmp(&mut message).unwrap();
    ip_frame(dst_mac, src, dst, IpNextHeaderProtocols::Icmp, 64, &message)
}

/// IPv4 view of a captured frame.
pub struct Captured {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub dst_mac: MacAddr,
    pub ttl: u8,
    pub protocol: IpNextHeaderProtocol,
    pub payload: Vec<u8>,
}

pub fn parse_ip(frame: &[u8]) -> Option<Captured> {
    let ethernet = EthernetPacket::new(frame)?;
    if ethernet.get_ethertype() != EtherTypes::Ipv4 {
        return None;
    }
    let ip = Ipv4Packet::new(ethernet.payload())?;
    Some(Captured {
        src: ip.get_source(),
        dst: ip.get_destination(),
        dst_mac: ethernet.get_destination(),
        ttl: ip.get_ttl(),
        protocol: ip.get_next_level_protocol(),
        payload: ip.payload().to_vec(),
    })
}

pub fn parse_lsu(frame: &[u8]) -> Option<Lsu> {
    let captured = parse_ip(frame)?;
    match OspfMessage::parse(&captured.payload).ok()? {
        OspfMessage::Lsu(lsu) => Some(lsu),
        OspfMessage::Hello(_) => None,
    }
}
