//! SMF Main State Machine
//!
//! Owns the session store and the GTP transaction manager and routes every
//! event to its handler. Events are processed one at a time.

use std::net::SocketAddr;

use bytes::Bytes;

use crate::config::SmfConfig;
use crate::context::{SessId, SmfContext};
use crate::error::{SmfError, SmfResult};
use crate::event::SmfEvent;
use crate::gtp_handler::handle_s5c_message;
use crate::gtp_xact::{GtpXactManager, XactId};
use crate::gx_handler::{
    handle_cca_initial_request, handle_cca_termination_request, handle_re_auth_request,
};
use crate::gx_message::{cmd, CcRequestType, GxMessage};

/// SMF FSM states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmfState {
    /// Initial state
    #[default]
    Initial,
    /// Operational state - handling events
    Operational,
    /// Final state
    Final,
}

/// SMF application state
#[derive(Debug)]
pub struct SmfApp {
    pub state: SmfState,
    pub context: SmfContext,
    pub xact: GtpXactManager,
}

impl SmfApp {
    pub fn new(config: &SmfConfig) -> Self {
        let mut context = SmfContext::new(config);
        for peer in &config.sgw {
            context.gnode_add(peer.socket_addr());
        }
        Self {
            state: SmfState::Initial,
            context,
            xact: GtpXactManager::new(config.xact.timeout()),
        }
    }

    /// Initialize the FSM
    pub fn init(&mut self) {
        log::debug!("smf_state_initial");
        self.state = SmfState::Operational;
    }

    /// Finalize the FSM
    pub fn fini(&mut self) {
        log::debug!("smf_state_final");
        self.state = SmfState::Final;
    }

    /// Dispatch an event
    pub fn dispatch(&mut self, event: SmfEvent) -> SmfResult<()> {
        if self.state != SmfState::Operational {
            log::debug!("[{:?}] Ignore {}", self.state, event.name());
            return Ok(());
        }

        match event {
            SmfEvent::GxMessage {
                sess_id,
                xact,
                message,
            } => self.handle_gx_message(sess_id, xact, &message),
            SmfEvent::S5cMessage { gnode, data } => {
                handle_s5c_message(&mut self.context, &mut self.xact, gnode, &data)
            }
            SmfEvent::GtpXactTimer { now } => {
                let expired = self.xact.expire(now, &self.context);
                if expired > 0 {
                    log::debug!("{} GTP transaction(s) timed out", expired);
                }
                Ok(())
            }
        }
    }

    /// Dispatch a datagram received on the GTP-C path
    pub fn receive(&mut self, addr: SocketAddr, data: Bytes) -> SmfResult<()> {
        let Some(gnode) = self.context.gnode_find_by_addr(addr) else {
            log::warn!("Unknown GTP node [{}], {} bytes dropped", addr, data.len());
            return Ok(());
        };
        self.dispatch(SmfEvent::s5c_message(gnode, data))
    }

    fn handle_gx_message(
        &mut self,
        sess_id: SessId,
        xact: Option<XactId>,
        message: &GxMessage,
    ) -> SmfResult<()> {
        let require_xact = |xact: Option<XactId>| {
            xact.ok_or_else(|| {
                SmfError::InvariantViolated(format!("CCA for {} without GTP transaction", sess_id))
            })
        };

        match message.cmd_code {
            cmd::CREDIT_CONTROL => match message.cc_request_type {
                Some(CcRequestType::InitialRequest) => handle_cca_initial_request(
                    &mut self.context,
                    &mut self.xact,
                    sess_id,
                    message,
                    require_xact(xact)?,
                )
                .map(|_| ()),
                Some(CcRequestType::TerminationRequest) => handle_cca_termination_request(
                    &mut self.context,
                    &mut self.xact,
                    sess_id,
                    message,
                    require_xact(xact)?,
                ),
                Some(other) => {
                    log::error!("Not implemented(cc_request_type:{:?})", other);
                    Ok(())
                }
                None => Err(SmfError::Malformed("No CC-Request-Type".to_string())),
            },
            cmd::RE_AUTH => {
                handle_re_auth_request(&mut self.context, &mut self.xact, sess_id, message)
                    .map(|_| ())
            }
            other => {
                log::error!("Invalid type [{}]", other);
                Ok(())
            }
        }
    }
}
