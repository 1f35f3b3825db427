//! GTP-C Transaction Management
//!
//! Local transactions carry requests the SMF originates (bearer management)
//! and wait for a correlated response or a timeout. Remote transactions
//! carry requests the SMF answers (session create/delete) and finish once
//! the response is committed. Every transaction resolves exactly once and
//! is dropped on resolution; there is no retransmission at this layer.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::context::{BearerId, GnodeId, SessId, SmfContext, SmfSess};
use crate::error::{SmfError, SmfResult};
use crate::gtp_build::{Gtp2Header, GTP2_HEADER_LEN};

/// Largest sequence number (24 bits)
pub const GTP_MAX_SEQUENCE: u32 = 0x00ff_ffff;

/// Timeout callback, invoked with the session the transaction was created for
pub type XactTimeoutCb = fn(&GtpXact, &SmfSess);

/// Transaction handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct XactId(pub u64);

/// Which side opened the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XactOrigin {
    Local,
    Remote,
}

/// GTP transaction state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GtpXactState {
    /// Created, nothing sent yet
    #[default]
    Initial,
    /// Request sent, waiting for response
    WaitingResponse,
}

/// GTP Transaction
#[derive(Debug, Clone)]
pub struct GtpXact {
    pub id: XactId,
    pub origin: XactOrigin,
    pub gnode: GnodeId,
    pub sequence: u32,
    /// Type of the outgoing message (local) or of the incoming request (remote)
    pub message_type: u8,
    pub state: GtpXactState,
    /// Session the transaction belongs to, resolved through the store
    pub sess_id: Option<SessId>,
    /// Bearer a bearer-management request was issued for
    pub bearer_id: Option<BearerId>,
    tx: Option<(Gtp2Header, Bytes)>,
    timeout_cb: Option<XactTimeoutCb>,
    deadline: Option<Instant>,
}

impl GtpXact {
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// Wire message ready for the path layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub gnode: GnodeId,
    pub data: Bytes,
}

/// GTP transaction manager
#[derive(Debug)]
pub struct GtpXactManager {
    xact_list: HashMap<XactId, GtpXact>,
    outbound: VecDeque<OutboundMessage>,
    timeout: Duration,
    next_xact_id: u64,
    next_sequence: u32,
}

impl GtpXactManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            xact_list: HashMap::new(),
            outbound: VecDeque::new(),
            timeout,
            next_xact_id: 1,
            next_sequence: 1,
        }
    }

    fn next_id(&mut self) -> XactId {
        let id = XactId(self.next_xact_id);
        self.next_xact_id += 1;
        id
    }

    /// Next 24-bit sequence number, skipping 0
    fn next_sequence(&mut self) -> u32 {
        let sequence = self.next_sequence;
        self.next_sequence = if sequence >= GTP_MAX_SEQUENCE {
            1
        } else {
            sequence + 1
        };
        sequence
    }

    fn check_payload(payload: &Bytes) -> SmfResult<()> {
        if payload.len() + GTP2_HEADER_LEN - 4 > u16::MAX as usize {
            return Err(SmfError::Xact(format!(
                "payload of {} bytes does not fit a GTPv2-C message",
                payload.len()
            )));
        }
        Ok(())
    }

    /// Create a local transaction for an outgoing request
    pub fn local_create(
        &mut self,
        gnode: GnodeId,
        header: Gtp2Header,
        payload: Bytes,
        timeout_cb: XactTimeoutCb,
        data: SessId,
    ) -> SmfResult<XactId> {
        Self::check_payload(&payload)?;

        let id = self.next_id();
        let sequence = self.next_sequence();
        let header = Gtp2Header { sequence, ..header };

        self.xact_list.insert(
            id,
            GtpXact {
                id,
                origin: XactOrigin::Local,
                gnode,
                sequence,
                message_type: header.message_type,
                state: GtpXactState::Initial,
                sess_id: Some(data),
                bearer_id: None,
                tx: Some((header, payload)),
                timeout_cb: Some(timeout_cb),
                deadline: None,
            },
        );

        log::debug!(
            "[{}] LOCAL Create peer gnode={} type={}",
            sequence,
            gnode.0,
            header.message_type
        );
        Ok(id)
    }

    /// Record an incoming request that will be answered later
    pub fn remote_open(
        &mut self,
        gnode: GnodeId,
        sequence: u32,
        message_type: u8,
        data: Option<SessId>,
    ) -> SmfResult<XactId> {
        let duplicate = self.xact_list.values().any(|x| {
            x.origin == XactOrigin::Remote && x.gnode == gnode && x.sequence == sequence
        });
        if duplicate {
            return Err(SmfError::Xact(format!(
                "request [{}] from gnode={} already open",
                sequence, gnode.0
            )));
        }

        let id = self.next_id();
        self.xact_list.insert(
            id,
            GtpXact {
                id,
                origin: XactOrigin::Remote,
                gnode,
                sequence,
                message_type,
                state: GtpXactState::Initial,
                sess_id: data,
                bearer_id: None,
                tx: None,
                timeout_cb: None,
                deadline: None,
            },
        );

        log::debug!(
            "[{}] REMOTE Open peer gnode={} type={}",
            sequence,
            gnode.0,
            message_type
        );
        Ok(id)
    }

    /// Set the response of an open remote transaction
    pub fn update_tx(&mut self, id: XactId, header: Gtp2Header, payload: Bytes) -> SmfResult<()> {
        Self::check_payload(&payload)?;

        let xact = self
            .xact_list
            .get_mut(&id)
            .ok_or_else(|| SmfError::Xact(format!("no transaction {}", id.0)))?;
        if xact.origin != XactOrigin::Remote || xact.state != GtpXactState::Initial {
            return Err(SmfError::Xact(format!(
                "[{}] transaction {} cannot take a response",
                xact.sequence, id.0
            )));
        }

        let header = Gtp2Header {
            sequence: xact.sequence,
            ..header
        };
        xact.tx = Some((header, payload));
        Ok(())
    }

    /// Queue the transaction's message for transmission
    pub fn commit(&mut self, id: XactId) -> SmfResult<()> {
        let xact = self
            .xact_list
            .get_mut(&id)
            .ok_or_else(|| SmfError::Xact(format!("no transaction {}", id.0)))?;
        if xact.state != GtpXactState::Initial {
            return Err(SmfError::Xact(format!(
                "[{}] transaction {} already committed",
                xact.sequence, id.0
            )));
        }
        let (header, payload) = xact.tx.as_ref().ok_or_else(|| {
            SmfError::Xact(format!("[{}] transaction {} has nothing to send", xact.sequence, id.0))
        })?;

        self.outbound.push_back(OutboundMessage {
            gnode: xact.gnode,
            data: header.encode(payload),
        });

        match xact.origin {
            XactOrigin::Local => {
                xact.state = GtpXactState::WaitingResponse;
                xact.deadline = Some(Instant::now() + self.timeout);
                log::debug!("[{}] LOCAL Commit type={}", xact.sequence, xact.message_type);
            }
            XactOrigin::Remote => {
                log::debug!("[{}] REMOTE Commit type={}", xact.sequence, header.message_type);
                self.xact_list.remove(&id);
            }
        }
        Ok(())
    }

    /// Resolve the local transaction a response answers.
    /// A response of the wrong type leaves the transaction waiting.
    pub fn receive_response(
        &mut self,
        gnode: GnodeId,
        sequence: u32,
        message_type: u8,
    ) -> SmfResult<Option<GtpXact>> {
        let Some(xact) = self.xact_list.values().find(|x| {
            x.origin == XactOrigin::Local
                && x.state == GtpXactState::WaitingResponse
                && x.gnode == gnode
                && x.sequence == sequence
        }) else {
            return Ok(None);
        };
        if message_type != xact.message_type.wrapping_add(1) {
            return Err(SmfError::Malformed(format!(
                "[{}] response type {} does not answer request type {}",
                sequence, message_type, xact.message_type
            )));
        }
        let id = xact.id;
        Ok(self.xact_list.remove(&id))
    }

    /// Resolve every waiting transaction whose deadline has passed
    pub fn expire(&mut self, now: Instant, ctx: &SmfContext) -> usize {
        let mut expired: Vec<XactId> = self
            .xact_list
            .values()
            .filter(|x| x.deadline.is_some_and(|deadline| deadline <= now))
            .map(|x| x.id)
            .collect();
        expired.sort();

        for id in &expired {
            let Some(xact) = self.xact_list.remove(id) else {
                continue;
            };
            let sess = xact.sess_id.and_then(|sess_id| ctx.sess(sess_id));
            match (sess, xact.timeout_cb) {
                (Some(sess), Some(cb)) => cb(&xact, sess),
                (None, _) => log::debug!(
                    "[{}] Stale transaction type={} (session gone)",
                    xact.sequence,
                    xact.message_type
                ),
                (Some(_), None) => {}
            }
        }
        expired.len()
    }

    /// Hand queued messages to the path layer
    pub fn drain_outbound(&mut self) -> Vec<OutboundMessage> {
        self.outbound.drain(..).collect()
    }

    pub fn xact(&self, id: XactId) -> Option<&GtpXact> {
        self.xact_list.get(&id)
    }

    pub fn xact_mut(&mut self, id: XactId) -> Option<&mut GtpXact> {
        self.xact_list.get_mut(&id)
    }

    pub fn count(&self) -> usize {
        self.xact_list.len()
    }
}
