//! Gx Message Handlers
//!
//! Reacts to the policy decisions the PCRF returns on Gx: answers the
//! pending S5-C session request, then binds PCC rules to bearers.

use crate::binding::{bearer_binding, BearerBindingResult};
use crate::context::{SessId, SmfContext};
use crate::error::{SmfError, SmfResult};
use crate::gtp_build::{
    build_create_session_response, build_delete_session_response, gtp2_message_type, Gtp2Header,
};
use crate::gtp_xact::{GtpXactManager, XactId};
use crate::gx_message::GxMessage;

/// Handle CCA for CC-Request-Type INITIAL_REQUEST
///
/// Answers the Create Session Request held by `xact`, then installs the
/// PCC rules. The response is committed before any bearer request.
pub fn handle_cca_initial_request(
    ctx: &mut SmfContext,
    xact_mgr: &mut GtpXactManager,
    sess_id: SessId,
    gx_message: &GxMessage,
    xact: XactId,
) -> SmfResult<Vec<BearerBindingResult>> {
    let smf_gtpc_addr = ctx.gtpc_addr;
    let sess = ctx
        .sess_mut(sess_id)
        .ok_or(SmfError::SessionNotFound(sess_id))?;
    let req = sess.create_session_request.clone().ok_or_else(|| {
        SmfError::InvariantViolated(format!("{} has no Create Session Request", sess_id))
    })?;

    if let Some(ambr) = gx_message.session_data.ambr {
        sess.session_ambr = ambr;
    }
    if let Some(qos) = gx_message.session_data.qos {
        if let Some(default_bearer) = sess.bearer_list.iter_mut().find(|b| b.is_default()) {
            default_bearer.qos = qos;
        }
    }

    log::debug!("[SMF] Create Session Response");
    log::debug!(
        "    SGW_S5C_TEID[0x{:x}] SMF_S5C_TEID[0x{:x}]",
        sess.sgw_s5c_teid,
        sess.smf_s5c_teid
    );

    let payload = build_create_session_response(smf_gtpc_addr, sess, gx_message, &req)?;
    let header = Gtp2Header::new(gtp2_message_type::CREATE_SESSION_RESPONSE, sess.sgw_s5c_teid);
    xact_mgr.update_tx(xact, header, payload)?;
    xact_mgr.commit(xact)?;

    bearer_binding(ctx, xact_mgr, sess_id, gx_message).into_result()
}

/// Handle CCA for CC-Request-Type TERMINATION_REQUEST
///
/// The session is released before the Delete Session Response is built and
/// stays released if sending it fails.
pub fn handle_cca_termination_request(
    ctx: &mut SmfContext,
    xact_mgr: &mut GtpXactManager,
    sess_id: SessId,
    _gx_message: &GxMessage,
    xact: XactId,
) -> SmfResult<()> {
    let sess = ctx
        .sess_mut(sess_id)
        .ok_or(SmfError::SessionNotFound(sess_id))?;
    let req = sess.delete_session_request.take().ok_or_else(|| {
        SmfError::InvariantViolated(format!("{} has no Delete Session Request", sess_id))
    })?;
    let sgw_s5c_teid = sess.sgw_s5c_teid;

    log::debug!("[SMF] Delete Session Response");
    log::debug!(
        "    SGW_S5C_TEID[0x{:x}] SMF_S5C_TEID[0x{:x}]",
        sess.sgw_s5c_teid,
        sess.smf_s5c_teid
    );

    ctx.sess_remove(sess_id);

    let payload = build_delete_session_response(&req)?;
    let header = Gtp2Header::new(gtp2_message_type::DELETE_SESSION_RESPONSE, sgw_s5c_teid);
    xact_mgr.update_tx(xact, header, payload)?;
    xact_mgr.commit(xact)
}

/// Handle Re-Auth-Request
pub fn handle_re_auth_request(
    ctx: &mut SmfContext,
    xact_mgr: &mut GtpXactManager,
    sess_id: SessId,
    gx_message: &GxMessage,
) -> SmfResult<Vec<BearerBindingResult>> {
    if ctx.sess(sess_id).is_none() {
        return Err(SmfError::SessionNotFound(sess_id));
    }
    bearer_binding(ctx, xact_mgr, sess_id, gx_message).into_result()
}
