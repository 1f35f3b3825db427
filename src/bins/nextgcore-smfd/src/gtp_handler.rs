//! GTP-C Message Handling
//!
//! S5-C responses to the bearer-management requests the SMF originates.
//! Each response resolves the local transaction it answers; the session is
//! then looked up through the store and may already be gone.

use crate::context::{GnodeId, SmfContext, SmfSess, DEFAULT_EBI, MAX_EBI};
use crate::error::{SmfError, SmfResult};
use crate::gtp_build::{
    find_ie, gtp2_cause, gtp2_f_teid_interface, gtp2_ie_type, gtp2_message_type, FTeid,
    Gtp2Header,
};
use crate::gtp_xact::{GtpXact, GtpXactManager};

/// F-TEID instance of the S5/S8-U SGW tunnel in a Create Bearer Response
const SGW_S5U_F_TEID_INSTANCE: u8 = 2;

// ============================================================================
// Response Parsing
// ============================================================================

/// Fields of a bearer-management response the SMF acts on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BearerResponse {
    pub cause: u8,
    pub ebi: Option<u8>,
    pub bearer_cause: Option<u8>,
    pub sgw_s5u_teid: Option<u32>,
}

impl BearerResponse {
    pub fn parse(ies: &[u8]) -> SmfResult<Self> {
        let cause = find_ie(ies, gtp2_ie_type::CAUSE, 0)?
            .and_then(|data| data.first().copied())
            .ok_or_else(|| SmfError::Malformed("No Cause".to_string()))?;

        let mut rsp = BearerResponse {
            cause,
            ..Default::default()
        };

        if let Some(bearer_context) = find_ie(ies, gtp2_ie_type::BEARER_CONTEXT, 0)? {
            rsp.ebi = find_ie(bearer_context, gtp2_ie_type::EBI, 0)?
                .and_then(|data| data.first())
                .map(|ebi| ebi & 0x0f);
            rsp.bearer_cause = find_ie(bearer_context, gtp2_ie_type::CAUSE, 0)?
                .and_then(|data| data.first().copied());
            if let Some(data) = find_ie(bearer_context, gtp2_ie_type::F_TEID, SGW_S5U_F_TEID_INSTANCE)?
            {
                let f_teid = FTeid::decode(data)?;
                if f_teid.interface_type == gtp2_f_teid_interface::S5_S8_SGW_GTP_U {
                    rsp.sgw_s5u_teid = Some(f_teid.teid);
                }
            }
        }

        Ok(rsp)
    }

    /// Both the message cause and the bearer cause (if any) accept
    pub fn is_accepted(&self) -> bool {
        gtp2_cause::is_accepted(self.cause)
            && self.bearer_cause.map_or(true, gtp2_cause::is_accepted)
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Handle one S5-C message received from a gateway node
pub fn handle_s5c_message(
    ctx: &mut SmfContext,
    xact_mgr: &mut GtpXactManager,
    gnode: GnodeId,
    data: &[u8],
) -> SmfResult<()> {
    let (header, ies) = Gtp2Header::parse(data)?;

    match header.message_type {
        gtp2_message_type::CREATE_BEARER_RESPONSE
        | gtp2_message_type::UPDATE_BEARER_RESPONSE
        | gtp2_message_type::DELETE_BEARER_RESPONSE => {}
        other => {
            log::warn!("Not implemented(type:{})", other);
            return Ok(());
        }
    }

    let Some(xact) = xact_mgr.receive_response(gnode, header.sequence, header.message_type)?
    else {
        log::warn!(
            "[{}] No transaction for response type={} from gnode={}",
            header.sequence,
            header.message_type,
            gnode.0
        );
        return Ok(());
    };

    let rsp = BearerResponse::parse(ies)?;

    let sess = match xact.sess_id {
        Some(sess_id) => ctx.sess_mut(sess_id),
        None => None,
    };
    let Some(sess) = sess else {
        log::debug!(
            "[{}] Stale response type={} (session gone)",
            header.sequence,
            header.message_type
        );
        return Ok(());
    };

    match header.message_type {
        gtp2_message_type::CREATE_BEARER_RESPONSE => {
            handle_create_bearer_response(sess, &xact, &rsp);
        }
        gtp2_message_type::UPDATE_BEARER_RESPONSE => {
            log::debug!("Update Bearer Response");
            if !rsp.is_accepted() {
                log::error!("GTP Cause [Value:{}]", rsp.cause);
            }
        }
        _ => {
            log::debug!("Delete Bearer Response");
            if !rsp.is_accepted() {
                log::error!("GTP Cause [Value:{}]", rsp.cause);
            }
        }
    }
    Ok(())
}

// ============================================================================
// Create Bearer Response
// ============================================================================

fn handle_create_bearer_response(sess: &mut SmfSess, xact: &GtpXact, rsp: &BearerResponse) {
    log::debug!("Create Bearer Response");

    let Some(bearer_id) = xact.bearer_id else {
        log::error!("[{}] Create Bearer transaction without bearer", xact.sequence);
        return;
    };

    if !rsp.is_accepted() {
        log::error!(
            "GTP Cause [Value:{}] Bearer Cause [Value:{:?}]",
            rsp.cause,
            rsp.bearer_cause
        );
        if let Some(bearer) = sess.bearer_remove(bearer_id) {
            log::info!(
                "[Removed] Bearer [{}] (ebi={}, rejected)",
                bearer.name.as_deref().unwrap_or(""),
                bearer.ebi
            );
        }
        return;
    }

    let ebi = rsp
        .ebi
        .filter(|ebi| (DEFAULT_EBI + 1..=MAX_EBI).contains(ebi))
        .filter(|ebi| match sess.bearer_find_by_ebi(*ebi) {
            Some(other) => other == bearer_id,
            None => true,
        });
    let sgw_s5c_teid = sess.sgw_s5c_teid;
    let smf_s5c_teid = sess.smf_s5c_teid;

    let Some(bearer) = sess.bearer_mut(bearer_id) else {
        log::debug!("[{}] Bearer {} already removed", xact.sequence, bearer_id.0);
        return;
    };
    if let Some(ebi) = ebi {
        bearer.ebi = ebi;
    } else if let Some(assigned) = rsp.ebi {
        log::warn!("EBI[{}] from SGW is invalid or already in use", assigned);
    }
    match rsp.sgw_s5u_teid {
        Some(teid) => bearer.sgw_s5u_teid = teid,
        None => log::error!("No SGW TEID"),
    }

    log::debug!(
        "Create Bearer Response : SGW[0x{:x}] --> SMF[0x{:x}] EBI[{}] SGW_S5U_TEID[0x{:x}]",
        sgw_s5c_teid,
        smf_s5c_teid,
        bearer.ebi,
        bearer.sgw_s5u_teid
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{bearer_binding, BearerBindingResult};
    use crate::context::tests::{qos, test_context};
    use crate::context::{BearerId, FlowDirection, SessId};
    use crate::gtp_build::IeBuilder;
    use crate::gx_message::{GxMessage, PccRule};
    use bytes::Bytes;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    fn setup_with_bearer() -> (SmfContext, GtpXactManager, SessId, GnodeId, BearerId, u32) {
        let (mut ctx, gnode) = test_context();
        let sess_id = ctx.sess_add(gnode, 0x3000, "internet", qos(9, 8)).unwrap();
        let mut xm = GtpXactManager::new(Duration::from_secs(3));

        let msg = GxMessage::new_rar().with_rule(
            PccRule::new_install("voice", qos(1, 2), 5)
                .add_flow(FlowDirection::Bidirectional, "permit out ip from any to any"),
        );
        let results = bearer_binding(&mut ctx, &mut xm, sess_id, &msg)
            .into_result()
            .unwrap();
        let BearerBindingResult::Created { bearer_id, xact } = results[0] else {
            panic!("bearer not created");
        };
        let sequence = xm.xact(xact).unwrap().sequence;
        xm.drain_outbound();
        (ctx, xm, sess_id, gnode, bearer_id, sequence)
    }

    fn create_bearer_response(sequence: u32, cause: u8, ebi: u8, teid: u32) -> Bytes {
        let f_teid = FTeid {
            interface_type: gtp2_f_teid_interface::S5_S8_SGW_GTP_U,
            teid,
            addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3)),
        };
        let bearer_context = IeBuilder::new()
            .add_ebi(ebi, 0)
            .add_cause(cause)
            .add_f_teid(&f_teid, SGW_S5U_F_TEID_INSTANCE);
        let ies = IeBuilder::new()
            .add_cause(cause)
            .add_bearer_context(bearer_context, 0)
            .build();
        let header = Gtp2Header {
            message_type: gtp2_message_type::CREATE_BEARER_RESPONSE,
            teid: 1,
            sequence,
        };
        header.encode(&ies)
    }

    #[test]
    fn test_create_bearer_response_accepted() {
        let (mut ctx, mut xm, sess_id, gnode, bearer_id, sequence) = setup_with_bearer();
        let data = create_bearer_response(sequence, gtp2_cause::REQUEST_ACCEPTED, 9, 0x77);

        handle_s5c_message(&mut ctx, &mut xm, gnode, &data).unwrap();
        assert_eq!(xm.count(), 0);

        let bearer = ctx.sess(sess_id).unwrap().bearer(bearer_id).unwrap();
        assert_eq!(bearer.sgw_s5u_teid, 0x77);
        assert_eq!(bearer.ebi, 9);
    }

    #[test]
    fn test_create_bearer_response_rejected_removes_bearer() {
        let (mut ctx, mut xm, sess_id, gnode, bearer_id, sequence) = setup_with_bearer();
        let data = create_bearer_response(sequence, gtp2_cause::NO_RESOURCES_AVAILABLE, 0, 0);

        handle_s5c_message(&mut ctx, &mut xm, gnode, &data).unwrap();
        let sess = ctx.sess(sess_id).unwrap();
        assert!(sess.bearer(bearer_id).is_none());
        assert_eq!(sess.bearer_list.len(), 1);
    }

    #[test]
    fn test_response_keeps_ebi_in_use() {
        let (mut ctx, mut xm, sess_id, gnode, bearer_id, sequence) = setup_with_bearer();
        // EBI 5 belongs to the default bearer
        let data = create_bearer_response(sequence, gtp2_cause::REQUEST_ACCEPTED, 5, 0x77);

        handle_s5c_message(&mut ctx, &mut xm, gnode, &data).unwrap();
        let bearer = ctx.sess(sess_id).unwrap().bearer(bearer_id).unwrap();
        assert_eq!(bearer.ebi, 6);
    }

    #[test]
    fn test_response_keeps_ebi_out_of_range() {
        let (mut ctx, mut xm, sess_id, gnode, bearer_id, sequence) = setup_with_bearer();
        let data = create_bearer_response(sequence, gtp2_cause::REQUEST_ACCEPTED, 0, 0x77);

        handle_s5c_message(&mut ctx, &mut xm, gnode, &data).unwrap();
        let bearer = ctx.sess(sess_id).unwrap().bearer(bearer_id).unwrap();
        assert_eq!(bearer.ebi, 6);
        assert_eq!(bearer.sgw_s5u_teid, 0x77);
    }

    #[test]
    fn test_response_without_transaction_is_ignored() {
        let (mut ctx, mut xm, sess_id, gnode, bearer_id, sequence) = setup_with_bearer();
        let data = create_bearer_response(sequence + 1, gtp2_cause::NO_RESOURCES_AVAILABLE, 0, 0);

        handle_s5c_message(&mut ctx, &mut xm, gnode, &data).unwrap();
        assert_eq!(xm.count(), 1);
        assert!(ctx.sess(sess_id).unwrap().bearer(bearer_id).is_some());
    }

    #[test]
    fn test_response_after_session_release_is_stale() {
        let (mut ctx, mut xm, sess_id, gnode, _, sequence) = setup_with_bearer();
        ctx.sess_remove(sess_id).unwrap();
        let data = create_bearer_response(sequence, gtp2_cause::REQUEST_ACCEPTED, 6, 0x77);

        handle_s5c_message(&mut ctx, &mut xm, gnode, &data).unwrap();
        assert_eq!(xm.count(), 0);
    }

    #[test]
    fn test_response_type_mismatch() {
        let (mut ctx, mut xm, _, gnode, _, sequence) = setup_with_bearer();
        let ies = IeBuilder::new().add_cause(gtp2_cause::REQUEST_ACCEPTED).build();
        let header = Gtp2Header {
            message_type: gtp2_message_type::DELETE_BEARER_RESPONSE,
            teid: 1,
            sequence,
        };

        let err = handle_s5c_message(&mut ctx, &mut xm, gnode, &header.encode(&ies)).unwrap_err();
        assert!(matches!(err, SmfError::Malformed(_)));
        assert_eq!(xm.count(), 1);

        // the real answer still resolves the transaction
        let data = create_bearer_response(sequence, gtp2_cause::REQUEST_ACCEPTED, 6, 0x77);
        handle_s5c_message(&mut ctx, &mut xm, gnode, &data).unwrap();
        assert_eq!(xm.count(), 0);
    }

    #[test]
    fn test_response_without_cause() {
        let (mut ctx, mut xm, _, gnode, _, sequence) = setup_with_bearer();
        let header = Gtp2Header {
            message_type: gtp2_message_type::CREATE_BEARER_RESPONSE,
            teid: 1,
            sequence,
        };

        let err = handle_s5c_message(&mut ctx, &mut xm, gnode, &header.encode(&[])).unwrap_err();
        assert!(matches!(err, SmfError::Malformed(_)));
    }

    #[test]
    fn test_unsupported_message_ignored() {
        let (mut ctx, mut xm, _, gnode, _, _) = setup_with_bearer();
        let data = Gtp2Header::new(gtp2_message_type::CREATE_SESSION_REQUEST, 0).encode(&[]);
        handle_s5c_message(&mut ctx, &mut xm, gnode, &data).unwrap();
        assert_eq!(xm.count(), 1);
    }

    #[test]
    fn test_bearer_response_parse_bearer_cause() {
        let bearer_context = IeBuilder::new()
            .add_ebi(6, 0)
            .add_cause(gtp2_cause::CONTEXT_NOT_FOUND);
        let ies = IeBuilder::new()
            .add_cause(gtp2_cause::REQUEST_ACCEPTED)
            .add_bearer_context(bearer_context, 0)
            .build();
        let rsp = BearerResponse::parse(&ies).unwrap();
        assert_eq!(rsp.ebi, Some(6));
        assert_eq!(rsp.bearer_cause, Some(gtp2_cause::CONTEXT_NOT_FOUND));
        assert!(!rsp.is_accepted());
    }
}
