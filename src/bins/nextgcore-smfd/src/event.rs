//! SMF Event Definitions

use std::time::Instant;

use bytes::Bytes;

use crate::context::{GnodeId, SessId};
use crate::gtp_xact::XactId;
use crate::gx_message::GxMessage;

/// Event types for SMF
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmfEventId {
    /// S5-C (GTPv2-C) message event
    S5cMessage,
    /// Gx (Diameter) message event
    GxMessage,
    /// GTP transaction timer event
    GtpXactTimer,
}

impl SmfEventId {
    /// Get the name of the event
    pub fn name(&self) -> &'static str {
        match self {
            SmfEventId::S5cMessage => "SMF_EVT_S5C_MESSAGE",
            SmfEventId::GxMessage => "SMF_EVT_GX_MESSAGE",
            SmfEventId::GtpXactTimer => "SMF_EVT_GTP_XACT_TIMER",
        }
    }
}

/// SMF Event
#[derive(Debug, Clone)]
pub enum SmfEvent {
    /// Decoded Gx answer or request for a session
    GxMessage {
        sess_id: SessId,
        /// Pending S5-C request a CCA answers
        xact: Option<XactId>,
        message: GxMessage,
    },
    /// Raw GTPv2-C message from a gateway node
    S5cMessage { gnode: GnodeId, data: Bytes },
    /// Periodic tick driving transaction timeouts
    GtpXactTimer { now: Instant },
}

impl SmfEvent {
    pub fn gx_message(sess_id: SessId, message: GxMessage, xact: Option<XactId>) -> Self {
        SmfEvent::GxMessage {
            sess_id,
            xact,
            message,
        }
    }

    pub fn s5c_message(gnode: GnodeId, data: Bytes) -> Self {
        SmfEvent::S5cMessage { gnode, data }
    }

    pub fn id(&self) -> SmfEventId {
        match self {
            SmfEvent::GxMessage { .. } => SmfEventId::GxMessage,
            SmfEvent::S5cMessage { .. } => SmfEventId::S5cMessage,
            SmfEvent::GtpXactTimer { .. } => SmfEventId::GtpXactTimer,
        }
    }

    pub fn name(&self) -> &'static str {
        self.id().name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gx_message::CcRequestType;

    #[test]
    fn test_event_names() {
        let event = SmfEvent::gx_message(
            SessId(1),
            GxMessage::new_cca(CcRequestType::InitialRequest),
            Some(XactId(3)),
        );
        assert_eq!(event.id(), SmfEventId::GxMessage);
        assert_eq!(event.name(), "SMF_EVT_GX_MESSAGE");

        let event = SmfEvent::s5c_message(GnodeId(1), Bytes::from_static(&[0x48]));
        assert_eq!(event.name(), "SMF_EVT_S5C_MESSAGE");

        let event = SmfEvent::GtpXactTimer { now: Instant::now() };
        assert_eq!(event.id(), SmfEventId::GtpXactTimer);
    }
}
