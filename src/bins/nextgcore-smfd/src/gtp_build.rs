//! GTP-C Message Building
//!
//! GTPv2-C (S5/S8) header codec, IE encoding and the S5-C builders used by
//! the Gx handlers and bearer binding (3GPP TS 29.274).
//!
//! Builders return the IE payload only. The transaction layer prepends the
//! header once the sequence number is known.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::{BufMut, Bytes, BytesMut};
use ogs_ipfw::pf_content_from_ipfw_rule;
use ogs_ipfw::{PfContent, MAX_NUM_OF_PACKET_FILTER};

use crate::context::{
    BitRate, CreateSessionRequest, DeleteSessionRequest, FlowDirection, PdnType, Qos,
    SmfBearer, SmfSess,
};
use crate::error::{SmfError, SmfResult};
use crate::gx_message::GxMessage;

// ============================================================================
// GTPv2-C Message Types
// ============================================================================

/// GTPv2-C Message types
pub mod gtp2_message_type {
    pub const CREATE_SESSION_REQUEST: u8 = 32;
    pub const CREATE_SESSION_RESPONSE: u8 = 33;
    pub const DELETE_SESSION_REQUEST: u8 = 36;
    pub const DELETE_SESSION_RESPONSE: u8 = 37;
    pub const CREATE_BEARER_REQUEST: u8 = 95;
    pub const CREATE_BEARER_RESPONSE: u8 = 96;
    pub const UPDATE_BEARER_REQUEST: u8 = 97;
    pub const UPDATE_BEARER_RESPONSE: u8 = 98;
    pub const DELETE_BEARER_REQUEST: u8 = 99;
    pub const DELETE_BEARER_RESPONSE: u8 = 100;
}

/// GTPv2-C Information Element types
pub mod gtp2_ie_type {
    pub const CAUSE: u8 = 2;
    pub const AMBR: u8 = 72;
    pub const EBI: u8 = 73;
    pub const PCO: u8 = 78;
    pub const PAA: u8 = 79;
    pub const BEARER_QOS: u8 = 80;
    pub const BEARER_TFT: u8 = 84;
    pub const F_TEID: u8 = 87;
    pub const BEARER_CONTEXT: u8 = 93;
}

/// GTPv2-C Cause values
pub mod gtp2_cause {
    pub const REQUEST_ACCEPTED: u8 = 16;
    pub const NEW_PDN_TYPE_DUE_TO_NETWORK_PREFERENCE: u8 = 18;
    pub const CONTEXT_NOT_FOUND: u8 = 64;
    pub const NO_RESOURCES_AVAILABLE: u8 = 73;

    /// Acceptance causes occupy 16..=63
    pub fn is_accepted(cause: u8) -> bool {
        (16..=63).contains(&cause)
    }
}

/// F-TEID interface types
pub mod gtp2_f_teid_interface {
    pub const S5_S8_SGW_GTP_U: u8 = 4;
    pub const S5_S8_PGW_GTP_C: u8 = 7;
}

/// TFT operation codes (3GPP TS 24.008)
pub mod tft_code {
    pub const CREATE_NEW_TFT: u8 = 1;
    pub const REPLACE_PACKET_FILTERS_IN_EXISTING: u8 = 4;
}

/// Packet filters one TFT can carry, same as the per-bearer limit
pub const MAX_NUM_OF_PACKET_FILTER_IN_TFT: usize = MAX_NUM_OF_PACKET_FILTER;

// ============================================================================
// Header
// ============================================================================

/// GTPv2-C header length with TEID
pub const GTP2_HEADER_LEN: usize = 12;

/// GTPv2-C header (TEID flag always set)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Gtp2Header {
    pub message_type: u8,
    pub teid: u32,
    /// 24-bit sequence number
    pub sequence: u32,
}

impl Gtp2Header {
    pub fn new(message_type: u8, teid: u32) -> Self {
        Self {
            message_type,
            teid,
            sequence: 0,
        }
    }

    /// Prepend this header to an IE payload
    pub fn encode(&self, payload: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(GTP2_HEADER_LEN + payload.len());

        // Version 2, P=0, T=1
        buf.put_u8(0x48);
        buf.put_u8(self.message_type);
        // Length excludes the first 4 octets
        buf.put_u16((payload.len() + 8) as u16);
        buf.put_u32(self.teid);
        buf.put_u8(((self.sequence >> 16) & 0xff) as u8);
        buf.put_u8(((self.sequence >> 8) & 0xff) as u8);
        buf.put_u8((self.sequence & 0xff) as u8);
        buf.put_u8(0);
        buf.put_slice(payload);

        buf.freeze()
    }

    /// Parse a header, returning it with the IE payload
    pub fn parse(data: &[u8]) -> SmfResult<(Self, &[u8])> {
        if data.len() < GTP2_HEADER_LEN {
            return Err(SmfError::Malformed(format!(
                "GTPv2-C message too short ({} bytes)",
                data.len()
            )));
        }
        let version = data[0] >> 5;
        if version != 2 {
            return Err(SmfError::Malformed(format!("GTP version {version}")));
        }
        if data[0] & 0x08 == 0 {
            return Err(SmfError::Malformed("TEID flag not set".to_string()));
        }

        let length = u16::from_be_bytes([data[2], data[3]]) as usize;
        let end = 4 + length;
        if length < 8 || data.len() < end {
            return Err(SmfError::Malformed(format!(
                "GTPv2-C length {} exceeds {} bytes",
                length,
                data.len()
            )));
        }

        let header = Self {
            message_type: data[1],
            teid: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            sequence: u32::from_be_bytes([0, data[8], data[9], data[10]]),
        };
        Ok((header, &data[GTP2_HEADER_LEN..end]))
    }
}

// ============================================================================
// IE encoding and lookup
// ============================================================================

fn put_ie(buf: &mut BytesMut, ie_type: u8, instance: u8, data: &[u8]) {
    buf.put_u8(ie_type);
    buf.put_u16(data.len() as u16);
    buf.put_u8(instance & 0x0f);
    buf.put_slice(data);
}

/// Find the first IE of a type and instance in an IE list
pub fn find_ie(ies: &[u8], ie_type: u8, instance: u8) -> SmfResult<Option<&[u8]>> {
    let mut rest = ies;
    while !rest.is_empty() {
        if rest.len() < 4 {
            return Err(SmfError::Malformed("truncated IE header".to_string()));
        }
        let len = u16::from_be_bytes([rest[1], rest[2]]) as usize;
        if rest.len() < 4 + len {
            return Err(SmfError::Malformed(format!("truncated IE type {}", rest[0])));
        }
        if rest[0] == ie_type && rest[3] & 0x0f == instance {
            return Ok(Some(&rest[4..4 + len]));
        }
        rest = &rest[4 + len..];
    }
    Ok(None)
}

/// GTPv2-C IE list builder
#[derive(Debug, Default)]
pub struct IeBuilder {
    ies: BytesMut,
}

impl IeBuilder {
    pub fn new() -> Self {
        Self {
            ies: BytesMut::with_capacity(256),
        }
    }

    pub fn add_cause(mut self, cause: u8) -> Self {
        put_ie(&mut self.ies, gtp2_ie_type::CAUSE, 0, &[cause, 0]);
        self
    }

    pub fn add_ebi(mut self, ebi: u8, instance: u8) -> Self {
        put_ie(&mut self.ies, gtp2_ie_type::EBI, instance, &[ebi & 0x0f]);
        self
    }

    pub fn add_f_teid(mut self, f_teid: &FTeid, instance: u8) -> Self {
        put_ie(&mut self.ies, gtp2_ie_type::F_TEID, instance, &f_teid.encode());
        self
    }

    pub fn add_paa(mut self, paa: &Paa) -> Self {
        put_ie(&mut self.ies, gtp2_ie_type::PAA, 0, &paa.encode());
        self
    }

    pub fn add_ambr(mut self, ambr: &BitRate) -> Self {
        let mut data = BytesMut::with_capacity(8);
        data.put_u32(bps_to_kbps_u32(ambr.uplink));
        data.put_u32(bps_to_kbps_u32(ambr.downlink));
        put_ie(&mut self.ies, gtp2_ie_type::AMBR, 0, &data);
        self
    }

    pub fn add_bearer_qos(mut self, qos: &BearerQos) -> Self {
        put_ie(&mut self.ies, gtp2_ie_type::BEARER_QOS, 0, &qos.encode());
        self
    }

    pub fn add_tft(mut self, tft: &[u8]) -> Self {
        put_ie(&mut self.ies, gtp2_ie_type::BEARER_TFT, 0, tft);
        self
    }

    pub fn add_pco(mut self, pco: &[u8]) -> Self {
        put_ie(&mut self.ies, gtp2_ie_type::PCO, 0, pco);
        self
    }

    /// Nest another IE list as a Bearer Context
    pub fn add_bearer_context(mut self, bearer_context: IeBuilder, instance: u8) -> Self {
        put_ie(
            &mut self.ies,
            gtp2_ie_type::BEARER_CONTEXT,
            instance,
            &bearer_context.ies,
        );
        self
    }

    pub fn build(self) -> Bytes {
        self.ies.freeze()
    }
}

fn bps_to_kbps_u32(bps: u64) -> u32 {
    u32::try_from(bps / 1000).unwrap_or(u32::MAX)
}

// ============================================================================
// IE values
// ============================================================================

/// F-TEID (Fully Qualified Tunnel Endpoint Identifier)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FTeid {
    pub interface_type: u8,
    pub teid: u32,
    pub addr: IpAddr,
}

impl FTeid {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(21);
        let version = match self.addr {
            IpAddr::V4(_) => 0x80,
            IpAddr::V6(_) => 0x40,
        };
        buf.put_u8(version | (self.interface_type & 0x3f));
        buf.put_u32(self.teid);
        match self.addr {
            IpAddr::V4(addr) => buf.put_slice(&addr.octets()),
            IpAddr::V6(addr) => buf.put_slice(&addr.octets()),
        }
        buf.to_vec()
    }

    pub fn decode(data: &[u8]) -> SmfResult<Self> {
        let flags = *data
            .first()
            .ok_or_else(|| SmfError::Malformed("empty F-TEID".to_string()))?;
        let addr = match (flags & 0x80 != 0, flags & 0x40 != 0, data.get(5..)) {
            (true, _, Some(rest)) if rest.len() >= 4 => {
                IpAddr::V4(Ipv4Addr::new(rest[0], rest[1], rest[2], rest[3]))
            }
            (false, true, Some(rest)) if rest.len() >= 16 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&rest[..16]);
                IpAddr::V6(Ipv6Addr::from(octets))
            }
            _ => {
                return Err(SmfError::Malformed(format!(
                    "F-TEID of {} bytes (flags 0x{:02x})",
                    data.len(),
                    flags
                )))
            }
        };
        Ok(Self {
            interface_type: flags & 0x3f,
            teid: u32::from_be_bytes([data[1], data[2], data[3], data[4]]),
            addr,
        })
    }
}

/// Bearer QoS encoded length
pub const BEARER_QOS_LEN: usize = 22;

/// Bearer QoS IE value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BearerQos {
    pub pre_emption_capability: bool,
    pub priority_level: u8,
    pub pre_emption_vulnerability: bool,
    pub qci: u8,
    /// Bit rates in kbps
    pub ul_mbr: u64,
    pub dl_mbr: u64,
    pub ul_gbr: u64,
    pub dl_gbr: u64,
}

impl From<&Qos> for BearerQos {
    fn from(qos: &Qos) -> Self {
        Self {
            pre_emption_capability: qos.arp.pre_emption_capability,
            priority_level: qos.arp.priority_level,
            pre_emption_vulnerability: qos.arp.pre_emption_vulnerability,
            qci: qos.qci,
            ul_mbr: qos.mbr.uplink / 1000,
            dl_mbr: qos.mbr.downlink / 1000,
            ul_gbr: qos.gbr.uplink / 1000,
            dl_gbr: qos.gbr.downlink / 1000,
        }
    }
}

impl BearerQos {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(BEARER_QOS_LEN);

        // spare | PCI | PL(4) | spare | PVI; PCI/PVI set means "disabled"
        let mut flags: u8 = (self.priority_level & 0x0f) << 2;
        if !self.pre_emption_capability {
            flags |= 0x40;
        }
        if !self.pre_emption_vulnerability {
            flags |= 0x01;
        }
        buf.put_u8(flags);
        buf.put_u8(self.qci);

        for rate in [self.ul_mbr, self.dl_mbr, self.ul_gbr, self.dl_gbr] {
            buf.put_u8(((rate >> 32) & 0xff) as u8);
            buf.put_u32((rate & 0xffffffff) as u32);
        }

        buf.to_vec()
    }
}

/// PDN Address Allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Paa {
    Ipv4(Ipv4Addr),
    Ipv6 { prefix_len: u8, addr: Ipv6Addr },
    Ipv4v6 { ipv4: Ipv4Addr, prefix_len: u8, ipv6: Ipv6Addr },
}

impl Paa {
    /// PAA for the addresses allocated to a session
    pub fn from_sess(sess: &SmfSess) -> SmfResult<Self> {
        let missing = || SmfError::Build(format!("{} has no {:?} address", sess.id, sess.pdn_type));
        match sess.pdn_type {
            PdnType::Ipv4 => Ok(Paa::Ipv4(sess.ipv4_addr.ok_or_else(missing)?)),
            PdnType::Ipv6 => {
                let (prefix_len, addr) = sess.ipv6_prefix.ok_or_else(missing)?;
                Ok(Paa::Ipv6 { prefix_len, addr })
            }
            PdnType::Ipv4v6 => {
                let ipv4 = sess.ipv4_addr.ok_or_else(missing)?;
                let (prefix_len, ipv6) = sess.ipv6_prefix.ok_or_else(missing)?;
                Ok(Paa::Ipv4v6 { ipv4, prefix_len, ipv6 })
            }
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(22);
        match self {
            Paa::Ipv4(addr) => {
                buf.put_u8(PdnType::Ipv4 as u8);
                buf.put_slice(&addr.octets());
            }
            Paa::Ipv6 { prefix_len, addr } => {
                buf.put_u8(PdnType::Ipv6 as u8);
                buf.put_u8(*prefix_len);
                buf.put_slice(&addr.octets());
            }
            Paa::Ipv4v6 { ipv4, prefix_len, ipv6 } => {
                buf.put_u8(PdnType::Ipv4v6 as u8);
                buf.put_u8(*prefix_len);
                buf.put_slice(&ipv6.octets());
                buf.put_slice(&ipv4.octets());
            }
        }
        buf.to_vec()
    }
}

// ============================================================================
// Traffic Flow Template
// ============================================================================

/// TFT packet filter
#[derive(Debug, Clone)]
pub struct TftPacketFilter {
    /// Wire identifier (0..=15)
    pub identifier: u8,
    pub direction: u8,
    pub precedence: u8,
    pub content: PfContent,
}

/// Traffic Flow Template
#[derive(Debug, Clone)]
pub struct Tft {
    pub code: u8,
    pub pf: Vec<TftPacketFilter>,
}

impl Tft {
    /// Build a TFT from every packet filter of a bearer
    pub fn from_bearer(code: u8, bearer: &SmfBearer) -> SmfResult<Self> {
        if bearer.pf_list.is_empty() {
            return Err(SmfError::Build(format!(
                "bearer ebi={} has no packet filter",
                bearer.ebi
            )));
        }
        if bearer.pf_list.len() > MAX_NUM_OF_PACKET_FILTER_IN_TFT {
            return Err(SmfError::Build(format!(
                "bearer ebi={} has {} packet filters, TFT holds {}",
                bearer.ebi,
                bearer.pf_list.len(),
                MAX_NUM_OF_PACKET_FILTER_IN_TFT
            )));
        }

        let pf = bearer
            .pf_list
            .iter()
            .map(|pf| {
                let direction = pf.direction.as_u8();
                let content = if pf.direction == FlowDirection::UplinkOnly {
                    pf_content_from_ipfw_rule(direction, &pf.rule.copy_and_swap())
                } else {
                    pf_content_from_ipfw_rule(direction, &pf.rule)
                };
                let precedence = u8::try_from(pf.precedence).unwrap_or_else(|_| {
                    log::warn!(
                        "bearer ebi={} PF[{}] precedence {} clamped to {}",
                        bearer.ebi,
                        pf.identifier,
                        pf.precedence,
                        u8::MAX
                    );
                    u8::MAX
                });
                TftPacketFilter {
                    identifier: pf.identifier.saturating_sub(1),
                    direction,
                    precedence,
                    content,
                }
            })
            .collect();

        Ok(Self { code, pf })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(256);

        buf.put_u8((self.code << 5) | (self.pf.len() as u8 & 0x0f));
        for pf in &self.pf {
            buf.put_u8(((pf.direction & 0x03) << 4) | (pf.identifier & 0x0f));
            buf.put_u8(pf.precedence);
            buf.put_u8(pf.content.len() as u8);
            pf.content.encode(&mut buf);
        }

        buf.to_vec()
    }
}

// ============================================================================
// S5-C Messages
// ============================================================================

/// Build Create Session Response
pub fn build_create_session_response(
    smf_gtpc_addr: SocketAddr,
    sess: &SmfSess,
    gx_message: &GxMessage,
    req: &CreateSessionRequest,
) -> SmfResult<Bytes> {
    let default_bearer = sess
        .default_bearer()
        .ok_or_else(|| SmfError::Build(format!("{} has no default bearer", sess.id)))?;

    let cause = if req.pdn_type == PdnType::Ipv4v6 && sess.pdn_type != PdnType::Ipv4v6 {
        gtp2_cause::NEW_PDN_TYPE_DUE_TO_NETWORK_PREFERENCE
    } else {
        gtp2_cause::REQUEST_ACCEPTED
    };

    let f_teid = FTeid {
        interface_type: gtp2_f_teid_interface::S5_S8_PGW_GTP_C,
        teid: sess.smf_s5c_teid,
        addr: smf_gtpc_addr.ip(),
    };

    let mut builder = IeBuilder::new()
        .add_cause(cause)
        .add_f_teid(&f_teid, 1)
        .add_paa(&Paa::from_sess(sess)?);

    let ambr = gx_message.session_data.ambr.unwrap_or(sess.session_ambr);
    if ambr.uplink > 0 || ambr.downlink > 0 {
        builder = builder.add_ambr(&ambr);
    }
    if let Some(pco) = &req.pco {
        builder = builder.add_pco(pco);
    }

    let qos = gx_message.session_data.qos.unwrap_or(default_bearer.qos);
    let bearer_context = IeBuilder::new()
        .add_ebi(default_bearer.ebi, 0)
        .add_cause(gtp2_cause::REQUEST_ACCEPTED)
        .add_bearer_qos(&BearerQos::from(&qos));

    Ok(builder.add_bearer_context(bearer_context, 0).build())
}

/// Build Delete Session Response
pub fn build_delete_session_response(req: &DeleteSessionRequest) -> SmfResult<Bytes> {
    let mut builder = IeBuilder::new().add_cause(gtp2_cause::REQUEST_ACCEPTED);
    if let Some(pco) = &req.pco {
        builder = builder.add_pco(pco);
    }
    Ok(builder.build())
}

/// Build Create Bearer Request
pub fn build_create_bearer_request(sess: &SmfSess, bearer: &SmfBearer) -> SmfResult<Bytes> {
    let linked_ebi = sess
        .default_bearer()
        .map(|b| b.ebi)
        .ok_or_else(|| SmfError::Build(format!("{} has no default bearer", sess.id)))?;
    let tft = Tft::from_bearer(tft_code::CREATE_NEW_TFT, bearer)?;

    // EBI 0: the MME assigns the EBI seen by the UE
    let bearer_context = IeBuilder::new()
        .add_ebi(0, 0)
        .add_bearer_qos(&BearerQos::from(&bearer.qos))
        .add_tft(&tft.encode());

    Ok(IeBuilder::new()
        .add_ebi(linked_ebi, 0)
        .add_bearer_context(bearer_context, 0)
        .build())
}

/// Build Update Bearer Request
pub fn build_update_bearer_request(
    bearer: &SmfBearer,
    qos_presence: bool,
    tft_presence: bool,
) -> SmfResult<Bytes> {
    let mut bearer_context = IeBuilder::new().add_ebi(bearer.ebi, 0);
    if qos_presence {
        bearer_context = bearer_context.add_bearer_qos(&BearerQos::from(&bearer.qos));
    }
    if tft_presence {
        let tft = Tft::from_bearer(tft_code::REPLACE_PACKET_FILTERS_IN_EXISTING, bearer)?;
        bearer_context = bearer_context.add_tft(&tft.encode());
    }

    Ok(IeBuilder::new().add_bearer_context(bearer_context, 0).build())
}

/// Build Delete Bearer Request
pub fn build_delete_bearer_request(bearer: &SmfBearer) -> SmfResult<Bytes> {
    if bearer.is_default() {
        return Err(SmfError::Build(
            "default bearer is released with its session".to_string(),
        ));
    }
    // Instance 1: EPS Bearer IDs (instance 0 would be the Linked EBI)
    Ok(IeBuilder::new().add_ebi(bearer.ebi, 1).build())
}
