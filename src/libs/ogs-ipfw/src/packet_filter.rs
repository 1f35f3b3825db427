//! Packet filter content generation from IPFW rules
//!
//! Component layout follows 3GPP TS 24.008 §10.5.6.12 (Traffic Flow Template).

use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::{BufMut, BytesMut};

use crate::types::*;

/// Packet filter component type identifiers
pub mod filter_type {
    pub const IPV4_REMOTE_ADDRESS_TYPE: u8 = 16;
    pub const IPV4_LOCAL_ADDRESS_TYPE: u8 = 17;
    pub const IPV6_REMOTE_ADDRESS_PREFIX_LENGTH_TYPE: u8 = 33;
    pub const IPV6_LOCAL_ADDRESS_PREFIX_LENGTH_TYPE: u8 = 35;
    pub const PROTOCOL_IDENTIFIER_NEXT_HEADER_TYPE: u8 = 48;
    pub const SINGLE_LOCAL_PORT_TYPE: u8 = 64;
    pub const LOCAL_PORT_RANGE_TYPE: u8 = 65;
    pub const SINGLE_REMOTE_PORT_TYPE: u8 = 80;
    pub const REMOTE_PORT_RANGE_TYPE: u8 = 81;
}

/// Flow direction
pub mod flow_direction {
    pub const UNSPECIFIED: u8 = 0;
    pub const DOWNLINK_ONLY: u8 = 1;
    pub const UPLINK_ONLY: u8 = 2;
    pub const BIDIRECTIONAL: u8 = 3;
}

/// Packet filter component
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PfComponent {
    /// Protocol identifier / next header
    Protocol(u8),
    /// IPv4 address with mask
    Ipv4Address {
        addr: Ipv4Addr,
        mask: Ipv4Addr,
        is_local: bool,
    },
    /// IPv6 address with prefix length
    Ipv6AddressPrefix {
        addr: Ipv6Addr,
        prefix_len: u8,
        is_local: bool,
    },
    /// Single port
    SinglePort { port: u16, is_local: bool },
    /// Port range
    PortRange {
        low: u16,
        high: u16,
        is_local: bool,
    },
}

impl PfComponent {
    /// Get the type identifier for this component
    pub fn type_id(&self) -> u8 {
        use filter_type::*;

        match *self {
            PfComponent::Protocol(_) => PROTOCOL_IDENTIFIER_NEXT_HEADER_TYPE,
            PfComponent::Ipv4Address { is_local: true, .. } => IPV4_LOCAL_ADDRESS_TYPE,
            PfComponent::Ipv4Address { is_local: false, .. } => IPV4_REMOTE_ADDRESS_TYPE,
            PfComponent::Ipv6AddressPrefix { is_local: true, .. } => {
                IPV6_LOCAL_ADDRESS_PREFIX_LENGTH_TYPE
            }
            PfComponent::Ipv6AddressPrefix { is_local: false, .. } => {
                IPV6_REMOTE_ADDRESS_PREFIX_LENGTH_TYPE
            }
            PfComponent::SinglePort { is_local: true, .. } => SINGLE_LOCAL_PORT_TYPE,
            PfComponent::SinglePort { is_local: false, .. } => SINGLE_REMOTE_PORT_TYPE,
            PfComponent::PortRange { is_local: true, .. } => LOCAL_PORT_RANGE_TYPE,
            PfComponent::PortRange { is_local: false, .. } => REMOTE_PORT_RANGE_TYPE,
        }
    }

    /// Get the encoded length of this component, type octet included
    pub fn encoded_len(&self) -> usize {
        match self {
            PfComponent::Protocol(_) => 2,
            PfComponent::Ipv4Address { .. } => 9,
            PfComponent::Ipv6AddressPrefix { .. } => 18,
            PfComponent::SinglePort { .. } => 3,
            PfComponent::PortRange { .. } => 5,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.type_id());
        match self {
            PfComponent::Protocol(proto) => buf.put_u8(*proto),
            PfComponent::Ipv4Address { addr, mask, .. } => {
                buf.put_slice(&addr.octets());
                buf.put_slice(&mask.octets());
            }
            PfComponent::Ipv6AddressPrefix { addr, prefix_len, .. } => {
                buf.put_slice(&addr.octets());
                buf.put_u8(*prefix_len);
            }
            PfComponent::SinglePort { port, .. } => buf.put_u16(*port),
            PfComponent::PortRange { low, high, .. } => {
                buf.put_u16(*low);
                buf.put_u16(*high);
            }
        }
    }
}

/// Packet filter content
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PfContent {
    pub components: Vec<PfComponent>,
}

impl PfContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_component(&mut self, component: PfComponent) {
        self.components.push(component);
    }

    pub fn num_components(&self) -> usize {
        self.components.len()
    }

    /// Total encoded length of all components
    pub fn len(&self) -> usize {
        self.components.iter().map(PfComponent::encoded_len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        for component in &self.components {
            component.encode(buf);
        }
    }
}

/// Generate packet filter content from an IPFW rule
///
/// The source side is remote for downlink and bidirectional filters and
/// local for uplink filters. Callers encoding an uplink filter compiled
/// from a `from <remote> to <ue>` description swap the rule first.
pub fn pf_content_from_ipfw_rule(direction: u8, rule: &IpfwRule) -> PfContent {
    let mut content = PfContent::new();
    let src_is_local = direction == flow_direction::UPLINK_ONLY;

    if rule.proto != proto::ANY {
        content.add_component(PfComponent::Protocol(rule.proto));
    }

    for (endpoint, is_local) in [(&rule.src, src_is_local), (&rule.dst, !src_is_local)] {
        match endpoint.addr {
            Some(IpNetwork::V4 { addr, prefix_len }) => {
                content.add_component(PfComponent::Ipv4Address {
                    addr,
                    mask: ipv4_mask(prefix_len),
                    is_local,
                });
            }
            Some(IpNetwork::V6 { addr, prefix_len }) => {
                content.add_component(PfComponent::Ipv6AddressPrefix {
                    addr,
                    prefix_len,
                    is_local,
                });
            }
            None => {}
        }
    }

    for (endpoint, is_local) in [(&rule.src, src_is_local), (&rule.dst, !src_is_local)] {
        match endpoint.port {
            Some(port) if port.is_single() => {
                content.add_component(PfComponent::SinglePort {
                    port: port.low,
                    is_local,
                });
            }
            Some(port) => {
                content.add_component(PfComponent::PortRange {
                    low: port.low,
                    high: port.high,
                    is_local,
                });
            }
            None => {}
        }
    }

    content
}
