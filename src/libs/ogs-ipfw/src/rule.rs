//! IPFW rule compilation
//!
//! Flow description format:
//! `permit out <proto> from <src_addr> [<src_port>] to <dst_addr> [<dst_port>]`
//!
//! Examples:
//! - `permit out ip from any to any`
//! - `permit out 17 from 10.0.0.1 to 192.168.1.1 80`
//! - `permit out tcp from 2001:db8::/32 1000-2000 to assigned`

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::types::*;

/// Compile a flow description string into an IPFW rule
pub fn compile_rule(flow_description: &str) -> IpfwResult<IpfwRule> {
    let tokens: Vec<&str> = flow_description.split_whitespace().collect();
    if tokens.is_empty() {
        return Err(IpfwError::InvalidSyntax("Empty flow description".to_string()));
    }

    expect_keyword(&tokens, 0, "permit")?;
    expect_keyword(&tokens, 1, "out")?;

    let proto = tokens
        .get(2)
        .ok_or_else(|| IpfwError::InvalidSyntax("Missing protocol".to_string()))?;
    let proto = parse_protocol(proto)?;

    expect_keyword(&tokens, 3, "from")?;
    let to_idx = tokens
        .iter()
        .skip(4)
        .position(|&t| t == "to")
        .map(|i| i + 4)
        .ok_or_else(|| IpfwError::MissingKeyword("to".to_string()))?;

    let src = parse_endpoint(&tokens[4..to_idx])?;
    let dst = parse_endpoint(&tokens[to_idx + 1..])?;

    Ok(IpfwRule { proto, src, dst })
}

fn expect_keyword(tokens: &[&str], idx: usize, keyword: &str) -> IpfwResult<()> {
    if tokens.get(idx) != Some(&keyword) {
        return Err(IpfwError::MissingKeyword(keyword.to_string()));
    }
    Ok(())
}

/// Parse protocol string
fn parse_protocol(proto: &str) -> IpfwResult<u8> {
    match proto.to_lowercase().as_str() {
        "ip" => Ok(proto::ANY),
        "icmp" => Ok(proto::ICMP),
        "tcp" => Ok(proto::TCP),
        "udp" => Ok(proto::UDP),
        "icmpv6" | "ipv6-icmp" => Ok(proto::ICMPV6),
        _ => proto
            .parse::<u8>()
            .map_err(|_| IpfwError::InvalidProtocol(proto.to_string())),
    }
}

/// Parse `<addr> [<port>]`
fn parse_endpoint(tokens: &[&str]) -> IpfwResult<Endpoint> {
    let (addr_str, port_str) = match tokens {
        [] => return Err(IpfwError::InvalidSyntax("Missing address".to_string())),
        [addr] => (*addr, None),
        [addr, port] => (*addr, Some(*port)),
        [_, _, extra, ..] => {
            return Err(IpfwError::InvalidSyntax(format!("Unexpected token: {extra}")))
        }
    };

    let addr = match addr_str {
        "any" | "assigned" => None,
        _ => Some(parse_address(addr_str)?),
    };
    let port = port_str.map(parse_port).transpose()?;

    Ok(Endpoint { addr, port })
}

/// Parse IP address (IPv4 or IPv6, with optional prefix)
fn parse_address(addr_str: &str) -> IpfwResult<IpNetwork> {
    let invalid = || IpfwError::InvalidAddress(addr_str.to_string());

    let (addr_part, prefix_len) = match addr_str.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix.parse::<u8>().map_err(|_| invalid())?)),
        None => (addr_str, None),
    };

    if let Ok(ipv4) = Ipv4Addr::from_str(addr_part) {
        return IpNetwork::v4(ipv4, prefix_len.unwrap_or(IPV4_BITLEN));
    }
    if let Ok(ipv6) = Ipv6Addr::from_str(addr_part) {
        return IpNetwork::v6(ipv6, prefix_len.unwrap_or(IPV6_BITLEN));
    }

    Err(invalid())
}

/// Parse port or port range
fn parse_port(port_str: &str) -> IpfwResult<PortRange> {
    let parse = |s: &str| {
        s.parse::<u16>()
            .map_err(|_| IpfwError::InvalidPort(port_str.to_string()))
    };

    match port_str.split_once('-') {
        Some((low, high)) => PortRange::range(parse(low)?, parse(high)?),
        None => Ok(PortRange::single(parse(port_str)?)),
    }
}

/// Encodes back to a flow description
impl fmt::Display for IpfwRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("permit out ")?;
        if self.proto == proto::ANY {
            f.write_str("ip")?;
        } else {
            write!(f, "{}", self.proto)?;
        }
        write!(f, " from {} to {}", self.src, self.dst)
    }
}
