//! IPFW types and structures

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use thiserror::Error;

/// Maximum number of packet filters carried in one TFT (4-bit count)
pub const MAX_NUM_OF_PACKET_FILTER: usize = 15;

/// IPv4 bit length
pub const IPV4_BITLEN: u8 = 32;

/// IPv6 bit length
pub const IPV6_BITLEN: u8 = 128;

/// Protocol numbers accepted by name in a flow description
pub mod proto {
    pub const ANY: u8 = 0;
    pub const ICMP: u8 = 1;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
    pub const ICMPV6: u8 = 58;
}

// ============================================================================
// Addresses and ports
// ============================================================================

/// IP network (address plus prefix length)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpNetwork {
    V4 { addr: Ipv4Addr, prefix_len: u8 },
    V6 { addr: Ipv6Addr, prefix_len: u8 },
}

impl IpNetwork {
    /// Create an IPv4 network, rejecting prefixes longer than 32 bits
    pub fn v4(addr: Ipv4Addr, prefix_len: u8) -> IpfwResult<Self> {
        if prefix_len > IPV4_BITLEN {
            return Err(IpfwError::InvalidAddress(format!("{addr}/{prefix_len}")));
        }
        Ok(IpNetwork::V4 { addr, prefix_len })
    }

    /// Create an IPv6 network, rejecting prefixes longer than 128 bits
    pub fn v6(addr: Ipv6Addr, prefix_len: u8) -> IpfwResult<Self> {
        if prefix_len > IPV6_BITLEN {
            return Err(IpfwError::InvalidAddress(format!("{addr}/{prefix_len}")));
        }
        Ok(IpNetwork::V6 { addr, prefix_len })
    }

    pub fn prefix_len(&self) -> u8 {
        match self {
            IpNetwork::V4 { prefix_len, .. } | IpNetwork::V6 { prefix_len, .. } => *prefix_len,
        }
    }

    /// True when the prefix covers the full address
    pub fn is_host(&self) -> bool {
        match self {
            IpNetwork::V4 { prefix_len, .. } => *prefix_len == IPV4_BITLEN,
            IpNetwork::V6 { prefix_len, .. } => *prefix_len == IPV6_BITLEN,
        }
    }

    pub fn is_ipv4(&self) -> bool {
        matches!(self, IpNetwork::V4 { .. })
    }
}

/// Netmask for an IPv4 prefix length
pub fn ipv4_mask(prefix_len: u8) -> Ipv4Addr {
    match prefix_len {
        0 => Ipv4Addr::UNSPECIFIED,
        n if n >= IPV4_BITLEN => Ipv4Addr::BROADCAST,
        n => Ipv4Addr::from(!((1u32 << (IPV4_BITLEN - n)) - 1)),
    }
}

impl fmt::Display for IpNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpNetwork::V4 { addr, .. } if self.is_host() => write!(f, "{addr}"),
            IpNetwork::V6 { addr, .. } if self.is_host() => write!(f, "{addr}"),
            IpNetwork::V4 { addr, prefix_len } => write!(f, "{addr}/{prefix_len}"),
            IpNetwork::V6 { addr, prefix_len } => write!(f, "{addr}/{prefix_len}"),
        }
    }
}

/// Port range (a single port has `low == high`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub low: u16,
    pub high: u16,
}

impl PortRange {
    pub fn single(port: u16) -> Self {
        Self { low: port, high: port }
    }

    /// Create a port range; `low` must not exceed `high`
    pub fn range(low: u16, high: u16) -> IpfwResult<Self> {
        if low > high {
            return Err(IpfwError::InvalidPort(format!("{low}-{high}")));
        }
        Ok(Self { low, high })
    }

    pub fn is_single(&self) -> bool {
        self.low == self.high
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single() {
            write!(f, "{}", self.low)
        } else {
            write!(f, "{}-{}", self.low, self.high)
        }
    }
}

/// One side of a rule. `addr == None` means `any`/`assigned`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoint {
    pub addr: Option<IpNetwork>,
    pub port: Option<PortRange>,
}

impl Endpoint {
    pub fn is_any(&self) -> bool {
        self.addr.is_none() && self.port.is_none()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.addr {
            Some(addr) => write!(f, "{addr}")?,
            None => f.write_str("any")?,
        }
        if let Some(port) = &self.port {
            write!(f, " {port}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Rule
// ============================================================================

/// Compiled IPFW rule
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpfwRule {
    /// Protocol number (0 = any)
    pub proto: u8,
    /// Source side
    pub src: Endpoint,
    /// Destination side
    pub dst: Endpoint,
}

impl IpfwRule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap source and destination
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.src, &mut self.dst);
    }

    /// Copy and swap source/destination
    pub fn copy_and_swap(&self) -> Self {
        let mut dst = self.clone();
        dst.swap();
        dst
    }

    /// True for `permit out ip from any to any`
    pub fn is_match_all(&self) -> bool {
        self.proto == proto::ANY && self.src.is_any() && self.dst.is_any()
    }
}

// ============================================================================
// Errors
// ============================================================================

/// IPFW error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IpfwError {
    /// Invalid flow description syntax
    #[error("Invalid syntax: {0}")]
    InvalidSyntax(String),

    /// Missing required keyword
    #[error("Missing keyword: {0}")]
    MissingKeyword(String),

    /// Invalid IP address or prefix
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Invalid port or port range
    #[error("Invalid port: {0}")]
    InvalidPort(String),

    /// Invalid protocol
    #[error("Invalid protocol: {0}")]
    InvalidProtocol(String),
}

/// Result type for IPFW operations
pub type IpfwResult<T> = Result<T, IpfwError>;
