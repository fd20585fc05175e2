use pnet::datalink::MacAddr;
use pnet::packet::arp::{ArpHardwareTypes, ArpOperation, MutableArpPacket};
use pnet::packet::ethernet::{EtherTypes, MutableEthernetPacket};
use pnet::packet::icmp::{self, IcmpCode, IcmpType, MutableIcmpPacket};
use pnet::packet::ip::IpNextHeaderProtocol;
use pnet::packet::ipv4::{self, Ipv4Flags, MutableIpv4Packet};
use pnet::packet::MutablePacket;
use pnet::packet::util::checksum;
use std::net::Ipv4Addr;
use thiserror::Error as ThisError;

pub const OSPF_VERSION: u8 = 2;
pub const OSPF_TYPE_HELLO: u8 = 1;
pub const OSPF_TYPE_LSU: u8 = 3;

/// IP protocol number carried by PWOSPF packets.
pub const IP_PROTOCOL_OSPF: IpNextHeaderProtocol = IpNextHeaderProtocol(89);

/// OSPF AllSPFRouters group, destination of every Hello.
pub const ALL_SPF_ROUTERS: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 5);
pub const ALL_SPF_ROUTERS_MAC: MacAddr = MacAddr(0x01, 0x00, 0x5e, 0x00, 0x00, 0x05);

pub const ETHERNET_HEADER_LEN: usize = 14;
pub const IPV4_HEADER_LEN: usize = 20;
pub const ARP_PACKET_LEN: usize = 28;
pub const OSPF_HEADER_LEN: usize = 24;
pub const HELLO_BODY_LEN: usize = 8;
pub const LSU_BODY_LEN: usize = 8;
pub const LSA_LEN: usize = 12;

/// TTL used for every datagram this router originates.
pub const DEFAULT_TTL: u8 = 64;

/// Word index of the checksum inside the OSPF header (byte offset 12).
const OSPF_CHECKSUM_WORD: usize = 6;

#[derive(Debug, ThisError, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("packet too short: need {needed} bytes, got {actual}")]
    TooShort { needed: usize, actual: usize },
    #[error("unsupported OSPF version {0}")]
    UnsupportedVersion(u8),
    #[error("unknown OSPF packet type {0}")]
    UnknownType(u8),
    #[error("OSPF length field {0} is inconsistent with the packet")]
    BadLength(u16),
    #[error("OSPF checksum mismatch: carried {carried:#06x}, computed {computed:#06x}")]
    Checksum { carried: u16, computed: u16 },
    #[error("buffer too small to build {0}")]
    Buffer(&'static str),
}

/// A PWOSPF Hello as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    pub router_id: Ipv4Addr,
    pub network_mask: Ipv4Addr,
    pub hello_interval: u16,
}

/// One link advertisement inside an LSU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lsa {
    pub subnet: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub router_id: Ipv4Addr,
}

/// A PWOSPF link state update. `router_id` is the originator and survives
/// flooding unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lsu {
    pub router_id: Ipv4Addr,
    pub sequence: u16,
    pub ttl: u8,
    pub advertisements: Vec<Lsa>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OspfMessage {
    Hello(Hello),
    Lsu(Lsu),
}

/// One's-complement checksum over an OSPF packet, ignoring the checksum field.
pub fn ospf_checksum(packet: &[u8]) -> u16 {
    checksum(packet, OSPF_CHECKSUM_WORD)
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn read_addr(bytes: &[u8], at: usize) -> Ipv4Addr {
    Ipv4Addr::from(read_u32(bytes, at))
}

fn ensure_len(bytes: &[u8], needed: usize) -> Result<(), WireError> {
    if bytes.len() < needed {
        return Err(WireError::TooShort { needed, actual: bytes.len() });
    }
    Ok(())
}

/// Writes the common header, appends `body` and fills in length and checksum.
fn encode_ospf(packet_type: u8, router_id: Ipv4Addr, body: &[u8]) -> Vec<u8> {
    let length = OSPF_HEADER_LEN + body.len();
    let mut packet = Vec::with_capacity(length);
    packet.push(OSPF_VERSION);
    packet.push(packet_type);
    packet.extend_from_slice(&(length as u16).to_be_bytes());
    packet.extend_from_slice(&router_id.octets());
    // area id, checksum, auth type, auth data
    packet.extend_from_slice(&0u32.to_be_bytes());
    packet.extend_from_slice(&0u16.to_be_bytes());
    packet.extend_from_slice(&0u16.to_be_bytes());
    packet.extend_from_slice(&0u64.to_be_bytes());
    packet.extend_from_slice(body);

    let sum = ospf_checksum(&packet);
    packet[12..14].copy_from_slice(&sum.to_be_bytes());
    packet
}

impl Hello {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(HELLO_BODY_LEN);
        body.extend_from_slice(&self.network_mask.octets());
        body.extend_from_slice(&self.hello_interval.to_be_bytes());
        body.extend_from_slice(&0u16.to_be_bytes());
        encode_ospf(OSPF_TYPE_HELLO, self.router_id, &body)
    }
}

impl Lsu {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(LSU_BODY_LEN + self.advertisements.len() * LSA_LEN);
        body.extend_from_slice(&self.sequence.to_be_bytes());
        body.push(self.ttl);
        body.push(0);
        body.extend_from_slice(&(self.advertisements.len() as u32).to_be_bytes());
        for lsa in &self.advertisements {
            body.extend_from_slice(&lsa.subnet.octets());
            body.extend_from_slice(&lsa.mask.octets());
            body.extend_from_slice(&lsa.router_id.octets());
        }
        encode_ospf(OSPF_TYPE_LSU, self.router_id, &body)
    }
}

impl OspfMessage {
    /// Parses the OSPF portion of an IP datagram (the IP payload).
    pub fn parse(bytes: &[u8]) -> Result<Self, WireError> {
        ensure_len(bytes, OSPF_HEADER_LEN)?;

        let version = bytes[0];
        if version != OSPF_VERSION {
            return Err(WireError::UnsupportedVersion(version));
        }

        let length = read_u16(bytes, 2);
        if (length as usize) < OSPF_HEADER_LEN || length as usize > bytes.len() {
            return Err(WireError::BadLength(length));
        }
        let packet = &bytes[..length as usize];

        let carried = read_u16(packet, 12);
        let computed = ospf_checksum(packet);
        if carried != computed {
            return Err(WireError::Checksum { carried, computed });
        }

        let router_id = read_addr(packet, 4);
        let body = &packet[OSPF_HEADER_LEN..];

        match packet[1] {
            OSPF_TYPE_HELLO => {
                ensure_len(body, HELLO_BODY_LEN)?;
                Ok(OspfMessage::Hello(Hello {
                    router_id,
                    network_mask: read_addr(body, 0),
                    hello_interval: read_u16(body, 4),
                }))
            }
            OSPF_TYPE_LSU => {
                ensure_len(body, LSU_BODY_LEN)?;
                let count = read_u32(body, 4) as usize;
                let needed = count
                    .checked_mul(LSA_LEN)
                    .and_then(|n| n.checked_add(LSU_BODY_LEN))
                    .ok_or(WireError::BadLength(length))?;
                ensure_len(body, needed)?;

                let advertisements = (0..count)
                    .map(|i| {
                        let at = LSU_BODY_LEN + i * LSA_LEN;
                        Lsa {
                            subnet: read_addr(body, at),
                            mask: read_addr(body, at + 4),
                            router_id: read_addr(body, at + 8),
                        }
                    })
                    .collect();

                Ok(OspfMessage::Lsu(Lsu {
                    router_id,
                    sequence: read_u16(body, 0),
                    ttl: body[2],
                    advertisements,
                }))
            }
            other => Err(WireError::UnknownType(other)),
        }
    }
}

/// Everything needed to wrap a payload into an Ethernet + IPv4 frame.
#[derive(Debug, Clone)]
pub struct Ipv4Frame<'a> {
    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub protocol: IpNextHeaderProtocol,
    pub ttl: u8,
    pub payload: &'a [u8],
}

impl Ipv4Frame<'_> {
    pub fn build(&self) -> Result<Vec<u8>, WireError> {
        let ip_len = IPV4_HEADER_LEN + self.payload.len();
        let mut buffer = vec![0u8; ETHERNET_HEADER_LEN + ip_len];
        {
            let mut ethernet =
                MutableEthernetPacket::new(&mut buffer).ok_or(WireError::Buffer("ethernet header"))?;
            ethernet.set_destination(self.dst_mac);
            ethernet.set_source(self.src_mac);
            ethernet.set_ethertype(EtherTypes::Ipv4);

            let mut ip = MutableIpv4Packet::new(ethernet.payload_mut())
                .ok_or(WireError::Buffer("ipv4 header"))?;
            ip.set_version(4);
            ip.set_header_length((IPV4_HEADER_LEN / 4) as u8);
            ip.set_total_length(ip_len as u16);
            ip.set_flags(Ipv4Flags::DontFragment);
            ip.set_ttl(self.ttl);
            ip.set_next_level_protocol(self.protocol);
            ip.set_source(self.src_ip);
            ip.set_destination(self.dst_ip);
            ip.set_payload(self.payload);
            let sum = ipv4::checksum(&ip.to_immutable());
            ip.set_checksum(sum);
        }
        Ok(buffer)
    }
}

/// Builds an Ethernet-framed ARP packet.
pub fn arp_frame(
    operation: ArpOperation,
    sender_mac: MacAddr,
    sender_ip: Ipv4Addr,
    target_mac: MacAddr,
    target_ip: Ipv4Addr,
    ethernet_destination: MacAddr,
) -> Result<Vec<u8>, WireError> {
    let mut buffer = vec![0u8; ETHERNET_HEADER_LEN + ARP_PACKET_LEN];
    {
        let mut ethernet =
            MutableEthernetPacket::new(&mut buffer).ok_or(WireError::Buffer("ethernet header"))?;
        ethernet.set_destination(ethernet_destination);
        ethernet.set_source(sender_mac);
        ethernet.set_ethertype(EtherTypes::Arp);

        let mut arp =
            MutableArpPacket::new(ethernet.payload_mut()).ok_or(WireError::Buffer("arp packet"))?;
        arp.set_hardware_type(ArpHardwareTypes::Ethernet);
        arp.set_protocol_type(EtherTypes::Ipv4);
        arp.set_hw_addr_len(6);
        arp.set_proto_addr_len(4);
        arp.set_operation(operation);
        arp.set_sender_hw_addr(sender_mac);
        arp.set_sender_proto_addr(sender_ip);
        arp.set_target_hw_addr(target_mac);
        arp.set_target_proto_addr(target_ip);
    }
    Ok(buffer)
}

/// ICMP error message (type 3 or 11): unused word followed by the quoted
/// datagram header and the first 8 bytes of its payload.
pub fn icmp_error(icmp_type: u8, icmp_code: u8, quoted: &[u8]) -> Result<Vec<u8>, WireError> {
    let mut buffer = vec![0u8; 8 + quoted.len()];
    {
        let mut message = MutableIcmpPacket::new(&mut buffer).ok_or(WireError::Buffer("icmp"))?;
        message.set_icmp_type(IcmpType(icmp_type));
        message.set_icmp_code(IcmpCode(icmp_code));
    }
    buffer[8..].copy_from_slice(quoted);
    finish_icmp(&mut buffer)?;
    Ok(buffer)
}

/// Recomputes the checksum of a complete ICMP message in place.
pub fn finish_icmp(message: &mut [u8]) -> Result<(), WireError> {
    let mut packet = MutableIcmpPacket::new(message).ok_or(WireError::Buffer("icmp"))?;
    packet.set_checksum(0);
    let sum = icmp::checksum(&packet.to_immutable());
    packet.set_checksum(sum);
    Ok(())
}

/// Rewrites the Ethernet addresses of an already built frame.
pub fn rewrite_ethernet(frame: &mut [u8], source: MacAddr, destination: MacAddr) -> bool {
    match MutableEthernetPacket::new(frame) {
        Some(mut ethernet) => {
            ethernet.set_source(source);
            ethernet.set_destination(destination);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnet::packet::ethernet::EthernetPacket;
    use pnet::packet::ipv4::Ipv4Packet;
    use pnet::packet::Packet;

    fn sample_lsu() -> Lsu {
        Lsu {
            router_id: Ipv4Addr::new(2, 2, 2, 2),
            sequence: 7,
            ttl: 64,
            advertisements: vec![
                Lsa {
                    subnet: Ipv4Addr::new(10, 0, 1, 0),
                    mask: Ipv4Addr::new(255, 255, 255, 0),
                    router_id: Ipv4Addr::new(1, 1, 1, 1),
                },
                Lsa {
                    subnet: Ipv4Addr::new(10, 0, 20, 0),
                    mask: Ipv4Addr::new(255, 255, 255, 0),
                    router_id: Ipv4Addr::UNSPECIFIED,
                },
            ],
        }
    }

    #[test]
    fn hello_layout_matches_wire_format() {
        let hello = Hello {
            router_id: Ipv4Addr::new(1, 1, 1, 1),
            network_mask: Ipv4Addr::new(255, 255, 255, 0),
            hello_interval: 5,
        };
        let bytes = hello.to_bytes();

        assert_eq!(bytes.len(), OSPF_HEADER_LEN + HELLO_BODY_LEN);
        assert_eq!(bytes[0], OSPF_VERSION);
        assert_eq!(bytes[1], OSPF_TYPE_HELLO);
        assert_eq!(read_u16(&bytes, 2), 32);
        assert_eq!(&bytes[4..8], &[1, 1, 1, 1]);
        assert_eq!(&bytes[24..28], &[255, 255, 255, 0]);
        assert_eq!(read_u16(&bytes, 28), 5);
        assert_eq!(OspfMessage::parse(&bytes), Ok(OspfMessage::Hello(hello)));
    }

    #[test]
    fn lsu_body_carries_sequence_ttl_and_count() {
        let lsu = sample_lsu();
        let bytes = lsu.to_bytes();

        assert_eq!(bytes.len(), OSPF_HEADER_LEN + LSU_BODY_LEN + 2 * LSA_LEN);
        assert_eq!(bytes[1], OSPF_TYPE_LSU);
        assert_eq!(read_u16(&bytes, 24), 7);
        assert_eq!(bytes[26], 64);
        assert_eq!(read_u32(&bytes, 28), 2);
        assert_eq!(OspfMessage::parse(&bytes), Ok(OspfMessage::Lsu(lsu)));
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut bytes = sample_lsu().to_bytes();
        bytes[40] ^= 0xff;
        assert!(matches!(OspfMessage::parse(&bytes), Err(WireError::Checksum { .. })));
    }

    #[test]
    fn truncated_packets_are_rejected() {
        let bytes = sample_lsu().to_bytes();
        assert!(matches!(OspfMessage::parse(&bytes[..10]), Err(WireError::TooShort { .. })));
        assert!(matches!(
            OspfMessage::parse(&bytes[..bytes.len() - 4]),
            Err(WireError::BadLength(_))
        ));
    }

    #[test]
    fn advertisement_count_beyond_packet_is_rejected() {
        let mut lsu = sample_lsu();
        lsu.advertisements.truncate(1);
        let mut bytes = lsu.to_bytes();
        bytes[28..32].copy_from_slice(&5u32.to_be_bytes());
        let sum = ospf_checksum(&bytes);
        bytes[12..14].copy_from_slice(&sum.to_be_bytes());
        assert!(matches!(OspfMessage::parse(&bytes), Err(WireError::TooShort { .. })));
    }

    #[test]
    fn ipv4_frame_has_valid_header_checksum() {
        let payload = sample_lsu().to_bytes();
        let frame = Ipv4Frame {
            src_mac: MacAddr(2, 0, 0, 0, 0, 1),
            dst_mac: ALL_SPF_ROUTERS_MAC,
            src_ip: Ipv4Addr::new(10, 0, 1, 1),
            dst_ip: ALL_SPF_ROUTERS,
            protocol: IP_PROTOCOL_OSPF,
            ttl: DEFAULT_TTL,
            payload: &payload,
        }
        .build()
        .unwrap();

        let ethernet = EthernetPacket::new(&frame).unwrap();
        assert_eq!(ethernet.get_ethertype(), EtherTypes::Ipv4);
        let ip = Ipv4Packet::new(ethernet.payload()).unwrap();
        assert_eq!(ip.get_checksum(), ipv4::checksum(&ip));
        assert_eq!(ip.get_next_level_protocol(), IP_PROTOCOL_OSPF);
        assert_eq!(ip.payload(), payload.as_slice());
    }
}
