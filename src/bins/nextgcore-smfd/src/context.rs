//! SMF Context Management
//!
//! Session, bearer and packet filter store for the Gx/S5-C path.
//!
//! Sessions are addressed by [`SessId`] handles that are never reused, so a
//! handle held by an in-flight transaction either resolves to the same
//! session or to nothing. Bearers and packet filters live inside their
//! session and are addressed by handles unique within it.

use std::collections::HashMap;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use ogs_ipfw::{flow_direction, IpfwRule, MAX_NUM_OF_PACKET_FILTER};

use crate::config::SmfConfig;
use crate::error::{SmfError, SmfResult};

/// EBI of the default bearer
pub const DEFAULT_EBI: u8 = 5;

/// Highest assignable EBI
pub const MAX_EBI: u8 = 15;

// ============================================================================
// Handles
// ============================================================================

/// Session handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessId(pub u64);

impl fmt::Display for SessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sess#{}", self.0)
    }
}

/// Bearer handle, unique within its session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BearerId(pub u64);

/// Packet filter handle, unique within its session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PfId(pub u64);

/// GTP node handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GnodeId(pub u64);

// ============================================================================
// QoS
// ============================================================================

/// Bit rate pair (bps)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BitRate {
    pub uplink: u64,
    pub downlink: u64,
}

/// Allocation and Retention Priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Arp {
    pub priority_level: u8,
    /// May pre-empt other bearers
    pub pre_emption_capability: bool,
    /// May be pre-empted by other bearers
    pub pre_emption_vulnerability: bool,
}

/// QoS parameters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Qos {
    pub qci: u8,
    pub arp: Arp,
    pub mbr: BitRate,
    pub gbr: BitRate,
}

/// The tuple that binds a PCC rule to an existing bearer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QosKey {
    pub qci: u8,
    pub arp: Arp,
}

impl Qos {
    pub fn key(&self) -> QosKey {
        QosKey {
            qci: self.qci,
            arp: self.arp,
        }
    }
}

/// Flow direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowDirection {
    Unspecified,
    DownlinkOnly,
    UplinkOnly,
    #[default]
    Bidirectional,
}

impl From<u8> for FlowDirection {
    fn from(value: u8) -> Self {
        match value {
            flow_direction::UNSPECIFIED => FlowDirection::Unspecified,
            flow_direction::DOWNLINK_ONLY => FlowDirection::DownlinkOnly,
            flow_direction::UPLINK_ONLY => FlowDirection::UplinkOnly,
            _ => FlowDirection::Bidirectional,
        }
    }
}

impl FlowDirection {
    pub fn as_u8(self) -> u8 {
        match self {
            FlowDirection::Unspecified => flow_direction::UNSPECIFIED,
            FlowDirection::DownlinkOnly => flow_direction::DOWNLINK_ONLY,
            FlowDirection::UplinkOnly => flow_direction::UPLINK_ONLY,
            FlowDirection::Bidirectional => flow_direction::BIDIRECTIONAL,
        }
    }
}

/// PDN type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PdnType {
    #[default]
    Ipv4 = 1,
    Ipv6 = 2,
    Ipv4v6 = 3,
}

// ============================================================================
// Request contexts
// ============================================================================

/// What the SMF kept from the Create Session Request it is answering
#[derive(Debug, Clone, Default)]
pub struct CreateSessionRequest {
    /// PDN type the UE asked for
    pub pdn_type: PdnType,
    /// Protocol Configuration Options to echo
    pub pco: Option<Vec<u8>>,
}

/// What the SMF kept from the Delete Session Request it is answering
#[derive(Debug, Clone, Default)]
pub struct DeleteSessionRequest {
    pub pco: Option<Vec<u8>>,
}

// ============================================================================
// GTP Node
// ============================================================================

/// GTP-C peer (SGW)
#[derive(Debug, Clone)]
pub struct GtpNode {
    pub id: GnodeId,
    pub addr: SocketAddr,
}

// ============================================================================
// SMF Packet Filter Context
// ============================================================================

/// SMF Packet Filter context
#[derive(Debug, Clone)]
pub struct SmfPf {
    pub id: PfId,
    /// Identifier within the bearer's TFT (1..=16)
    pub identifier: u8,
    pub direction: FlowDirection,
    pub precedence: u32,
    pub rule: IpfwRule,
}

// ============================================================================
// SMF Bearer Context
// ============================================================================

/// SMF Bearer context
#[derive(Debug, Clone)]
pub struct SmfBearer {
    pub id: BearerId,
    pub ebi: u8,
    /// PCC rule name; `None` only for the default bearer
    pub name: Option<String>,
    pub qos: Qos,
    pub pf_list: Vec<SmfPf>,
    /// SGW S5U TEID learned from the Create Bearer Response
    pub sgw_s5u_teid: u32,
}

impl SmfBearer {
    fn new(id: BearerId, ebi: u8) -> Self {
        Self {
            id,
            ebi,
            name: None,
            qos: Qos::default(),
            pf_list: Vec::new(),
            sgw_s5u_teid: 0,
        }
    }

    pub fn is_default(&self) -> bool {
        self.name.is_none()
    }

    fn free_pf_identifier(&self) -> Option<u8> {
        (1..=MAX_NUM_OF_PACKET_FILTER as u8)
            .find(|id| !self.pf_list.iter().any(|pf| pf.identifier == *id))
    }
}

// ============================================================================
// SMF Session Context
// ============================================================================

/// SMF Session context
#[derive(Debug, Clone)]
pub struct SmfSess {
    pub id: SessId,
    pub sgw_s5c_teid: u32,
    pub smf_s5c_teid: u32,
    /// Gateway node this session talks to
    pub gnode: GnodeId,
    pub apn: String,
    pub pdn_type: PdnType,
    pub ipv4_addr: Option<Ipv4Addr>,
    pub ipv6_prefix: Option<(u8, Ipv6Addr)>,
    pub session_ambr: BitRate,
    pub bearer_list: Vec<SmfBearer>,
    pub create_session_request: Option<CreateSessionRequest>,
    pub delete_session_request: Option<DeleteSessionRequest>,

    max_num_of_bearer: usize,
    next_bearer_id: u64,
    next_pf_id: u64,
}

impl SmfSess {
    fn new(id: SessId, gnode: GnodeId, apn: &str, max_num_of_bearer: usize) -> Self {
        Self {
            id,
            sgw_s5c_teid: 0,
            smf_s5c_teid: 0,
            gnode,
            apn: apn.to_string(),
            pdn_type: PdnType::default(),
            ipv4_addr: None,
            ipv6_prefix: None,
            session_ambr: BitRate::default(),
            bearer_list: Vec::new(),
            create_session_request: None,
            delete_session_request: None,
            max_num_of_bearer,
            next_bearer_id: 1,
            next_pf_id: 1,
        }
    }

    // ========================================================================
    // Bearer Management
    // ========================================================================

    fn bearer_insert(&mut self, ebi: u8) -> BearerId {
        let id = BearerId(self.next_bearer_id);
        self.next_bearer_id += 1;
        self.bearer_list.push(SmfBearer::new(id, ebi));
        id
    }

    /// Add a dedicated bearer with the lowest free EBI
    pub fn bearer_add(&mut self) -> SmfResult<BearerId> {
        if self.bearer_list.len() >= self.max_num_of_bearer {
            return Err(SmfError::ResourceExhausted(format!(
                "{} already has {} bearers",
                self.id, self.max_num_of_bearer
            )));
        }
        let ebi = (DEFAULT_EBI + 1..=MAX_EBI)
            .find(|ebi| !self.bearer_list.iter().any(|b| b.ebi == *ebi))
            .ok_or_else(|| SmfError::ResourceExhausted(format!("{} has no free EBI", self.id)))?;

        let id = self.bearer_insert(ebi);
        log::debug!("[{}] Bearer added (id={}, ebi={})", self.id, id.0, ebi);
        Ok(id)
    }

    pub fn bearer_remove(&mut self, id: BearerId) -> Option<SmfBearer> {
        let idx = self.bearer_list.iter().position(|b| b.id == id)?;
        let bearer = self.bearer_list.remove(idx);
        log::debug!("[{}] Bearer removed (id={}, ebi={})", self.id, id.0, bearer.ebi);
        Some(bearer)
    }

    pub fn bearer(&self, id: BearerId) -> Option<&SmfBearer> {
        self.bearer_list.iter().find(|b| b.id == id)
    }

    pub fn bearer_mut(&mut self, id: BearerId) -> Option<&mut SmfBearer> {
        self.bearer_list.iter_mut().find(|b| b.id == id)
    }

    /// Find a dedicated bearer by QCI and ARP. The default bearer never matches.
    pub fn bearer_find_by_qci_arp(&self, key: QosKey) -> Option<BearerId> {
        self.bearer_list
            .iter()
            .find(|b| !b.is_default() && b.qos.key() == key)
            .map(|b| b.id)
    }

    pub fn bearer_find_by_name(&self, name: &str) -> Option<BearerId> {
        self.bearer_list
            .iter()
            .find(|b| b.name.as_deref() == Some(name))
            .map(|b| b.id)
    }

    pub fn bearer_find_by_ebi(&self, ebi: u8) -> Option<BearerId> {
        self.bearer_list.iter().find(|b| b.ebi == ebi).map(|b| b.id)
    }

    pub fn default_bearer(&self) -> Option<&SmfBearer> {
        self.bearer_list.iter().find(|b| b.is_default())
    }

    // ========================================================================
    // Packet Filter Management
    // ========================================================================

    /// Append a packet filter to a bearer
    pub fn pf_add(
        &mut self,
        bearer_id: BearerId,
        precedence: u32,
        direction: FlowDirection,
        rule: IpfwRule,
    ) -> SmfResult<PfId> {
        let id = PfId(self.next_pf_id);
        let sess_id = self.id;
        let bearer = self.bearer_mut(bearer_id).ok_or_else(|| {
            SmfError::InvariantViolated(format!("{} has no bearer {}", sess_id, bearer_id.0))
        })?;
        let identifier = bearer.free_pf_identifier().ok_or_else(|| {
            SmfError::ResourceExhausted(format!(
                "bearer ebi={} already has {} packet filters",
                bearer.ebi, MAX_NUM_OF_PACKET_FILTER
            ))
        })?;

        bearer.pf_list.push(SmfPf {
            id,
            identifier,
            direction,
            precedence,
            rule,
        });
        self.next_pf_id += 1;

        log::debug!("[{}] PF added (id={}, identifier={})", sess_id, id.0, identifier);
        Ok(id)
    }

    /// Drop every packet filter of a bearer
    pub fn pf_remove_all(&mut self, bearer_id: BearerId) {
        if let Some(bearer) = self.bearer_mut(bearer_id) {
            bearer.pf_list.clear();
        }
    }
}

// ============================================================================
// SMF Context
// ============================================================================

/// Store of sessions and gateway nodes
#[derive(Debug)]
pub struct SmfContext {
    sess_list: HashMap<SessId, SmfSess>,
    gnode_list: HashMap<GnodeId, GtpNode>,
    /// Local GTP-C address advertised in the SMF S5-C F-TEID
    pub gtpc_addr: SocketAddr,
    max_num_of_sess: usize,
    max_num_of_bearer_per_sess: usize,
    next_sess_id: u64,
    next_gnode_id: u64,
    next_teid: u32,
}

impl SmfContext {
    pub fn new(config: &SmfConfig) -> Self {
        log::info!(
            "SMF context initialized (max_sess={}, max_bearer_per_sess={})",
            config.max.sess,
            config.max.bearer_per_sess
        );
        Self {
            sess_list: HashMap::new(),
            gnode_list: HashMap::new(),
            gtpc_addr: config.gtpc.socket_addr(),
            max_num_of_sess: config.max.sess,
            max_num_of_bearer_per_sess: config.max.bearer_per_sess,
            next_sess_id: 1,
            next_gnode_id: 1,
            next_teid: 1,
        }
    }

    // ========================================================================
    // Node Management
    // ========================================================================

    /// Add a GTP node, returning the existing one for a known address
    pub fn gnode_add(&mut self, addr: SocketAddr) -> GnodeId {
        if let Some(id) = self.gnode_find_by_addr(addr) {
            return id;
        }
        let id = GnodeId(self.next_gnode_id);
        self.next_gnode_id += 1;
        self.gnode_list.insert(id, GtpNode { id, addr });
        log::info!("[Added] GTP node [{}] (id={})", addr, id.0);
        id
    }

    pub fn gnode_find_by_addr(&self, addr: SocketAddr) -> Option<GnodeId> {
        self.gnode_list
            .values()
            .find(|node| node.addr == addr)
            .map(|node| node.id)
    }

    pub fn gnode(&self, id: GnodeId) -> Option<&GtpNode> {
        self.gnode_list.get(&id)
    }

    // ========================================================================
    // Session Management
    // ========================================================================

    fn next_smf_teid(&mut self) -> u32 {
        loop {
            let teid = self.next_teid;
            self.next_teid = self.next_teid.wrapping_add(1).max(1);
            if !self.sess_list.values().any(|s| s.smf_s5c_teid == teid) {
                return teid;
            }
        }
    }

    /// Add a session with its default bearer
    pub fn sess_add(
        &mut self,
        gnode: GnodeId,
        sgw_s5c_teid: u32,
        apn: &str,
        default_qos: Qos,
    ) -> SmfResult<SessId> {
        if self.sess_list.len() >= self.max_num_of_sess {
            return Err(SmfError::ResourceExhausted(format!(
                "Maximum number of sessions [{}] reached",
                self.max_num_of_sess
            )));
        }
        if !self.gnode_list.contains_key(&gnode) {
            return Err(SmfError::InvariantViolated(format!(
                "unknown GTP node id={}",
                gnode.0
            )));
        }

        let id = SessId(self.next_sess_id);
        self.next_sess_id += 1;

        let mut sess = SmfSess::new(id, gnode, apn, self.max_num_of_bearer_per_sess);
        sess.sgw_s5c_teid = sgw_s5c_teid;
        sess.smf_s5c_teid = self.next_smf_teid();
        let default_id = sess.bearer_insert(DEFAULT_EBI);
        if let Some(bearer) = sess.bearer_mut(default_id) {
            bearer.qos = default_qos;
        }

        log::debug!(
            "[apn={}] SMF session added ({}, SGW_S5C_TEID[0x{:x}] SMF_S5C_TEID[0x{:x}])",
            apn,
            id,
            sess.sgw_s5c_teid,
            sess.smf_s5c_teid
        );
        self.sess_list.insert(id, sess);
        Ok(id)
    }

    /// Remove a session together with its bearers and packet filters
    pub fn sess_remove(&mut self, id: SessId) -> Option<SmfSess> {
        let sess = self.sess_list.remove(&id)?;
        log::info!(
            "[Removed] SMF session ({}, apn={}, bearers={})",
            id,
            sess.apn,
            sess.bearer_list.len()
        );
        Some(sess)
    }

    pub fn sess(&self, id: SessId) -> Option<&SmfSess> {
        self.sess_list.get(&id)
    }

    pub fn sess_mut(&mut self, id: SessId) -> Option<&mut SmfSess> {
        self.sess_list.get_mut(&id)
    }

    pub fn sess_find_by_smf_teid(&self, teid: u32) -> Option<SessId> {
        self.sess_list
            .values()
            .find(|s| s.smf_s5c_teid == teid)
            .map(|s| s.id)
    }

    pub fn sess_count(&self) -> usize {
        self.sess_list.len()
    }
}
