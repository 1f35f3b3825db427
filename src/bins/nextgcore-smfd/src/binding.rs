//! SMF Bearer Binding
//!
//! Applies the PCC rules of a Gx policy decision to the dedicated bearers
//! of a session and issues one S5-C request per affected bearer:
//!
//! - INSTALL with no bearer at the rule's QCI/ARP: Create Bearer Request
//! - INSTALL matching an existing bearer: Update Bearer Request, when the
//!   QoS or the packet filters changed
//! - REMOVE: Delete Bearer Request
//!
//! Rules are processed in order. A skipped rule does not stop the batch;
//! a failed one abandons it, leaving earlier rules applied.

use ogs_ipfw::{compile_rule, MAX_NUM_OF_PACKET_FILTER};

use crate::context::{BearerId, Qos, SessId, SmfContext, SmfSess};
use crate::error::{SmfError, SmfResult};
use crate::gtp_build::{
    build_create_bearer_request, build_delete_bearer_request, build_update_bearer_request,
    gtp2_message_type, Gtp2Header,
};
use crate::gtp_xact::{GtpXact, GtpXactManager, XactId};
use crate::gx_message::{GxMessage, PccRule, PccRuleType};

// ============================================================================
// Binding Results
// ============================================================================

/// Why a PCC rule produced no request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingName,
    UnknownType(u8),
    MissingFlowDescription,
    /// Neither QoS nor packet filters differ from the bearer
    NoChange,
}

/// Outcome of one PCC rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BearerBindingResult {
    Created {
        bearer_id: BearerId,
        xact: XactId,
    },
    Modified {
        bearer_id: BearerId,
        xact: XactId,
        qos_presence: bool,
        tft_presence: bool,
    },
    Removed {
        ebi: u8,
        xact: XactId,
    },
    Skipped {
        name: Option<String>,
        reason: SkipReason,
    },
}

/// Result of a whole batch
#[derive(Debug, Default)]
pub struct BindingReport {
    /// One entry per rule processed before the batch ended
    pub results: Vec<BearerBindingResult>,
    /// Failure that abandoned the remaining rules
    pub aborted: Option<SmfError>,
}

impl BindingReport {
    pub fn into_result(self) -> SmfResult<Vec<BearerBindingResult>> {
        match self.aborted {
            Some(e) => Err(e),
            None => Ok(self.results),
        }
    }

    pub fn num_xacts(&self) -> usize {
        self.results
            .iter()
            .filter(|r| !matches!(r, BearerBindingResult::Skipped { .. }))
            .count()
    }
}

// ============================================================================
// Bearer Binding
// ============================================================================

/// Timeout handler for bearer-management requests
pub fn bearer_xact_timeout(xact: &GtpXact, sess: &SmfSess) {
    log::debug!(
        "GTP Timeout : SGW_S5C_TEID[0x{:x}] SMF_S5C_TEID[0x{:x}] Message-Type[{}]",
        sess.sgw_s5c_teid,
        sess.smf_s5c_teid,
        xact.message_type
    );
}

/// Apply every PCC rule of a policy decision to a session
pub fn bearer_binding(
    ctx: &mut SmfContext,
    xact_mgr: &mut GtpXactManager,
    sess_id: SessId,
    gx_message: &GxMessage,
) -> BindingReport {
    let mut report = BindingReport::default();

    for pcc_rule in &gx_message.session_data.pcc_rules {
        let Some(name) = pcc_rule.name.as_deref() else {
            log::error!("No PCC Rule Name");
            report.results.push(BearerBindingResult::Skipped {
                name: None,
                reason: SkipReason::MissingName,
            });
            continue;
        };

        let outcome = match pcc_rule.rule_type {
            PccRuleType::Install => install_rule(ctx, xact_mgr, sess_id, name, pcc_rule),
            PccRuleType::Remove => remove_rule(ctx, xact_mgr, sess_id, name),
            PccRuleType::Unknown(value) => {
                log::error!("Invalid Type[{}]", value);
                Ok(BearerBindingResult::Skipped {
                    name: Some(name.to_string()),
                    reason: SkipReason::UnknownType(value),
                })
            }
        };

        match outcome {
            Ok(result) => report.results.push(result),
            Err(e) => {
                log::error!("[{}] PCC rule [{}] aborted the batch: {}", sess_id, name, e);
                report.aborted = Some(e);
                break;
            }
        }
    }

    report
}

fn sess_mut(ctx: &mut SmfContext, sess_id: SessId) -> SmfResult<&mut SmfSess> {
    ctx.sess_mut(sess_id).ok_or(SmfError::SessionNotFound(sess_id))
}

fn missing_bearer(sess_id: SessId, bearer_id: BearerId) -> SmfError {
    SmfError::InvariantViolated(format!("{} has no bearer {}", sess_id, bearer_id.0))
}

/// Whether an incoming rule's QoS differs from the bearer's.
/// Zero MBR/GBR values in the rule mean "unspecified".
fn qos_changed(stored: &Qos, incoming: &Qos) -> bool {
    let differs = |incoming: u64, stored: u64| incoming != 0 && incoming != stored;

    differs(incoming.mbr.downlink, stored.mbr.downlink)
        || differs(incoming.mbr.uplink, stored.mbr.uplink)
        || differs(incoming.gbr.downlink, stored.gbr.downlink)
        || differs(incoming.gbr.uplink, stored.gbr.uplink)
}

fn merge_qos(stored: &mut Qos, incoming: &Qos) {
    let pick = |incoming: u64, stored: u64| if incoming != 0 { incoming } else { stored };

    stored.mbr.downlink = pick(incoming.mbr.downlink, stored.mbr.downlink);
    stored.mbr.uplink = pick(incoming.mbr.uplink, stored.mbr.uplink);
    stored.gbr.downlink = pick(incoming.gbr.downlink, stored.gbr.downlink);
    stored.gbr.uplink = pick(incoming.gbr.uplink, stored.gbr.uplink);
}

fn install_rule(
    ctx: &mut SmfContext,
    xact_mgr: &mut GtpXactManager,
    sess_id: SessId,
    name: &str,
    pcc_rule: &PccRule,
) -> SmfResult<BearerBindingResult> {
    // Compile every flow before the store is touched
    if pcc_rule.flows.len() > MAX_NUM_OF_PACKET_FILTER {
        return Err(SmfError::ResourceExhausted(format!(
            "PCC rule [{}] has {} flows, a bearer holds {}",
            name,
            pcc_rule.flows.len(),
            MAX_NUM_OF_PACKET_FILTER
        )));
    }
    let mut rules = Vec::with_capacity(pcc_rule.flows.len());
    for flow in &pcc_rule.flows {
        let Some(description) = flow.description.as_deref() else {
            log::error!("No Flow-Description in PCC Rule [{}]", name);
            return Ok(BearerBindingResult::Skipped {
                name: Some(name.to_string()),
                reason: SkipReason::MissingFlowDescription,
            });
        };
        let rule = compile_rule(description).map_err(|e| {
            log::error!("Invalid Flow-Description [{}]: {}", description, e);
            e
        })?;
        rules.push((flow.direction, rule));
    }

    let sess = sess_mut(ctx, sess_id)?;

    let (bearer_id, created, qos_presence, tft_presence) =
        match sess.bearer_find_by_qci_arp(pcc_rule.qos.key()) {
            None => {
                if rules.is_empty() {
                    return Err(SmfError::InvariantViolated(format!(
                        "PCC rule [{}] would create a bearer without packet filters",
                        name
                    )));
                }

                let bearer_id = sess.bearer_add()?;
                let bearer = sess
                    .bearer_mut(bearer_id)
                    .ok_or_else(|| missing_bearer(sess_id, bearer_id))?;
                bearer.name = Some(name.to_string());
                bearer.qos = pcc_rule.qos;

                (bearer_id, true, false, false)
            }
            Some(bearer_id) => {
                let bearer = sess
                    .bearer_mut(bearer_id)
                    .ok_or_else(|| missing_bearer(sess_id, bearer_id))?;
                if bearer.name.as_deref() != Some(name) {
                    return Err(SmfError::InvariantViolated(format!(
                        "bearer ebi={} is bound to PCC rule [{}], not [{}]",
                        bearer.ebi,
                        bearer.name.as_deref().unwrap_or(""),
                        name
                    )));
                }

                let tft_presence = !rules.is_empty();
                let qos_presence = qos_changed(&bearer.qos, &pcc_rule.qos);
                if qos_presence {
                    merge_qos(&mut bearer.qos, &pcc_rule.qos);
                }

                if !qos_presence && !tft_presence {
                    log::warn!("[IGNORE] Update Bearer Request : Both QoS and TFT is NULL");
                    return Ok(BearerBindingResult::Skipped {
                        name: Some(name.to_string()),
                        reason: SkipReason::NoChange,
                    });
                }
                if tft_presence {
                    sess.pf_remove_all(bearer_id);
                }

                (bearer_id, false, qos_presence, tft_presence)
            }
        };

    for (direction, rule) in rules {
        sess.pf_add(bearer_id, pcc_rule.precedence, direction, rule)?;
    }

    let bearer = sess
        .bearer(bearer_id)
        .ok_or_else(|| missing_bearer(sess_id, bearer_id))?;
    let (message_type, payload) = if created {
        (
            gtp2_message_type::CREATE_BEARER_REQUEST,
            build_create_bearer_request(sess, bearer)?,
        )
    } else {
        (
            gtp2_message_type::UPDATE_BEARER_REQUEST,
            build_update_bearer_request(bearer, qos_presence, tft_presence)?,
        )
    };

    let header = Gtp2Header::new(message_type, sess.sgw_s5c_teid);
    let xact = xact_mgr.local_create(sess.gnode, header, payload, bearer_xact_timeout, sess_id)?;
    if let Some(x) = xact_mgr.xact_mut(xact) {
        x.bearer_id = Some(bearer_id);
    }
    xact_mgr.commit(xact)?;

    if created {
        log::info!(
            "[Added] Bearer [{}] (ebi={}, qci={}, pf={})",
            name,
            bearer.ebi,
            bearer.qos.qci,
            bearer.pf_list.len()
        );
        Ok(BearerBindingResult::Created { bearer_id, xact })
    } else {
        log::debug!(
            "[{}] Update Bearer [{}] (qos={}, tft={})",
            sess_id,
            name,
            qos_presence,
            tft_presence
        );
        Ok(BearerBindingResult::Modified {
            bearer_id,
            xact,
            qos_presence,
            tft_presence,
        })
    }
}

fn remove_rule(
    ctx: &mut SmfContext,
    xact_mgr: &mut GtpXactManager,
    sess_id: SessId,
    name: &str,
) -> SmfResult<BearerBindingResult> {
    let sess = sess_mut(ctx, sess_id)?;

    let bearer_id = sess.bearer_find_by_name(name).ok_or_else(|| {
        SmfError::InvariantViolated(format!("No bearer for PCC rule [{}] to remove", name))
    })?;
    let bearer = sess
        .bearer(bearer_id)
        .ok_or_else(|| missing_bearer(sess_id, bearer_id))?;
    let ebi = bearer.ebi;
    let payload = build_delete_bearer_request(bearer)?;

    let header = Gtp2Header::new(gtp2_message_type::DELETE_BEARER_REQUEST, sess.sgw_s5c_teid);
    let xact = xact_mgr.local_create(sess.gnode, header, payload, bearer_xact_timeout, sess_id)?;
    sess.bearer_remove(bearer_id);
    xact_mgr.commit(xact)?;

    log::info!("[Removed] Bearer [{}] (ebi={})", name, ebi);
    Ok(BearerBindingResult::Removed { ebi, xact })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::{qos, test_context};
    use crate::context::{BitRate, FlowDirection, DEFAULT_EBI};
    use crate::error::ErrorKind;
    use crate::gtp_build::{find_ie, gtp2_ie_type, tft_code};
    use crate::gx_message::Flow;
    use std::time::Duration;

    fn setup() -> (SmfContext, GtpXactManager, SessId) {
        let (mut ctx, gnode) = test_context();
        let sess_id = ctx.sess_add(gnode, 0x1000, "internet", qos(9, 8)).unwrap();
        (ctx, GtpXactManager::new(Duration::from_secs(3)), sess_id)
    }

    fn voice_rule() -> PccRule {
        PccRule::new_install("voice", qos(1, 2), 5)
            .add_flow(FlowDirection::DownlinkOnly, "permit out udp from 10.0.0.1 to any 5060")
            .add_flow(FlowDirection::UplinkOnly, "permit out udp from 10.0.0.1 to any 5060")
    }

    fn sent_types(xact_mgr: &mut GtpXactManager) -> Vec<u8> {
        xact_mgr
            .drain_outbound()
            .iter()
            .map(|m| Gtp2Header::parse(&m.data).unwrap().0.message_type)
            .collect()
    }

    #[test]
    fn test_install_creates_bearer() {
        let (mut ctx, mut xm, sess_id) = setup();
        let msg = GxMessage::new_rar().with_rule(voice_rule());

        let results = bearer_binding(&mut ctx, &mut xm, sess_id, &msg).into_result().unwrap();
        let BearerBindingResult::Created { bearer_id, xact } = results[0] else {
            panic!("unexpected result {:?}", results[0]);
        };

        let sess = ctx.sess(sess_id).unwrap();
        let bearer = sess.bearer(bearer_id).unwrap();
        assert_eq!(bearer.name.as_deref(), Some("voice"));
        assert_eq!(bearer.qos, qos(1, 2));
        assert_eq!(bearer.ebi, DEFAULT_EBI + 1);
        assert_eq!(bearer.pf_list.len(), 2);
        assert_eq!(bearer.pf_list[1].direction, FlowDirection::UplinkOnly);
        assert_eq!(xm.xact(xact).unwrap().bearer_id, Some(bearer_id));

        let out = xm.drain_outbound();
        assert_eq!(out.len(), 1);
        let (header, ies) = Gtp2Header::parse(&out[0].data).unwrap();
        assert_eq!(header.message_type, gtp2_message_type::CREATE_BEARER_REQUEST);
        assert_eq!(header.teid, 0x1000);
        let bearer_context = find_ie(ies, gtp2_ie_type::BEARER_CONTEXT, 0).unwrap().unwrap();
        let tft = find_ie(bearer_context, gtp2_ie_type::BEARER_TFT, 0).unwrap().unwrap();
        assert_eq!(tft[0], (tft_code::CREATE_NEW_TFT << 5) | 2);
    }

    #[test]
    fn test_install_same_qos_updates_tft() {
        let (mut ctx, mut xm, sess_id) = setup();
        let msg = GxMessage::new_rar().with_rule(voice_rule());
        bearer_binding(&mut ctx, &mut xm, sess_id, &msg).into_result().unwrap();
        xm.drain_outbound();

        let update = GxMessage::new_rar().with_rule(
            PccRule::new_install("voice", qos(1, 2), 7)
                .add_flow(FlowDirection::Bidirectional, "permit out tcp from any to 10.0.0.9 80"),
        );
        let results = bearer_binding(&mut ctx, &mut xm, sess_id, &update)
            .into_result()
            .unwrap();
        assert!(matches!(
            results[0],
            BearerBindingResult::Modified {
                qos_presence: false,
                tft_presence: true,
                ..
            }
        ));

        let sess = ctx.sess(sess_id).unwrap();
        let bearer = sess.bearer_find_by_name("voice").and_then(|id| sess.bearer(id)).unwrap();
        assert_eq!(bearer.pf_list.len(), 1);
        assert_eq!(bearer.pf_list[0].precedence, 7);
        assert_eq!(bearer.pf_list[0].identifier, 1);

        let out = xm.drain_outbound();
        let (header, ies) = Gtp2Header::parse(&out[0].data).unwrap();
        assert_eq!(header.message_type, gtp2_message_type::UPDATE_BEARER_REQUEST);
        let bearer_context = find_ie(ies, gtp2_ie_type::BEARER_CONTEXT, 0).unwrap().unwrap();
        assert!(find_ie(bearer_context, gtp2_ie_type::BEARER_QOS, 0).unwrap().is_none());
        let tft = find_ie(bearer_context, gtp2_ie_type::BEARER_TFT, 0).unwrap().unwrap();
        assert_eq!(tft[0], (tft_code::REPLACE_PACKET_FILTERS_IN_EXISTING << 5) | 1);
    }

    #[test]
    fn test_install_qos_change_without_flows() {
        let (mut ctx, mut xm, sess_id) = setup();
        let mut first = voice_rule();
        first.qos.mbr = BitRate {
            uplink: 64_000,
            downlink: 64_000,
        };
        bearer_binding(&mut ctx, &mut xm, sess_id, &GxMessage::new_rar().with_rule(first))
            .into_result()
            .unwrap();
        xm.drain_outbound();

        let mut rule = PccRule::new_install("voice", qos(1, 2), 5);
        rule.qos.mbr.downlink = 128_000;
        let results =
            bearer_binding(&mut ctx, &mut xm, sess_id, &GxMessage::new_rar().with_rule(rule))
                .into_result()
                .unwrap();
        assert!(matches!(
            results[0],
            BearerBindingResult::Modified {
                qos_presence: true,
                tft_presence: false,
                ..
            }
        ));

        let sess = ctx.sess(sess_id).unwrap();
        let bearer = sess.bearer_find_by_name("voice").and_then(|id| sess.bearer(id)).unwrap();
        assert_eq!(bearer.qos.mbr.downlink, 128_000);
        // zero in the rule keeps the stored value
        assert_eq!(bearer.qos.mbr.uplink, 64_000);
        assert_eq!(bearer.pf_list.len(), 2);

        let out = xm.drain_outbound();
        let (_, ies) = Gtp2Header::parse(&out[0].data).unwrap();
        let bearer_context = find_ie(ies, gtp2_ie_type::BEARER_CONTEXT, 0).unwrap().unwrap();
        assert!(find_ie(bearer_context, gtp2_ie_type::BEARER_QOS, 0).unwrap().is_some());
        assert!(find_ie(bearer_context, gtp2_ie_type::BEARER_TFT, 0).unwrap().is_none());
    }

    #[test]
    fn test_install_no_change_is_ignored() {
        let (mut ctx, mut xm, sess_id) = setup();
        bearer_binding(&mut ctx, &mut xm, sess_id, &GxMessage::new_rar().with_rule(voice_rule()))
            .into_result()
            .unwrap();
        xm.drain_outbound();
        let xacts = xm.count();

        let rule = PccRule::new_install("voice", qos(1, 2), 5);
        let results =
            bearer_binding(&mut ctx, &mut xm, sess_id, &GxMessage::new_rar().with_rule(rule))
                .into_result()
                .unwrap();
        assert_eq!(
            results[0],
            BearerBindingResult::Skipped {
                name: Some("voice".to_string()),
                reason: SkipReason::NoChange
            }
        );
        assert_eq!(xm.count(), xacts);
        assert!(xm.drain_outbound().is_empty());
    }

    #[test]
    fn test_remove_deletes_bearer() {
        let (mut ctx, mut xm, sess_id) = setup();
        bearer_binding(&mut ctx, &mut xm, sess_id, &GxMessage::new_rar().with_rule(voice_rule()))
            .into_result()
            .unwrap();
        xm.drain_outbound();

        let msg = GxMessage::new_rar().with_rule(PccRule::new_remove("voice"));
        let results = bearer_binding(&mut ctx, &mut xm, sess_id, &msg).into_result().unwrap();
        assert!(matches!(
            results[0],
            BearerBindingResult::Removed { ebi: 6, .. }
        ));

        let sess = ctx.sess(sess_id).unwrap();
        assert!(sess.bearer_find_by_name("voice").is_none());
        assert_eq!(sess.bearer_list.len(), 1);

        let out = xm.drain_outbound();
        let (header, ies) = Gtp2Header::parse(&out[0].data).unwrap();
        assert_eq!(header.message_type, gtp2_message_type::DELETE_BEARER_REQUEST);
        assert_eq!(find_ie(ies, gtp2_ie_type::EBI, 1).unwrap(), Some(&[6u8][..]));
    }

    #[test]
    fn test_remove_unknown_rule_is_contract_violation() {
        let (mut ctx, mut xm, sess_id) = setup();
        let msg = GxMessage::new_rar().with_rule(PccRule::new_remove("nothing"));

        let err = bearer_binding(&mut ctx, &mut xm, sess_id, &msg)
            .into_result()
            .unwrap_err();
        assert!(err.is_contract_violation());
        assert_eq!(xm.count(), 0);
    }

    #[test]
    fn test_create_without_flows_is_contract_violation() {
        let (mut ctx, mut xm, sess_id) = setup();
        let msg = GxMessage::new_rar().with_rule(PccRule::new_install("video", qos(2, 3), 1));

        let err = bearer_binding(&mut ctx, &mut xm, sess_id, &msg)
            .into_result()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ContractViolation);
        assert_eq!(ctx.sess(sess_id).unwrap().bearer_list.len(), 1);
    }

    #[test]
    fn test_name_mismatch_is_contract_violation() {
        let (mut ctx, mut xm, sess_id) = setup();
        bearer_binding(&mut ctx, &mut xm, sess_id, &GxMessage::new_rar().with_rule(voice_rule()))
            .into_result()
            .unwrap();

        let other = PccRule::new_install("other", qos(1, 2), 5)
            .add_flow(FlowDirection::Bidirectional, "permit out ip from any to any");
        let err = bearer_binding(&mut ctx, &mut xm, sess_id, &GxMessage::new_rar().with_rule(other))
            .into_result()
            .unwrap_err();
        assert!(err.is_contract_violation());
    }

    #[test]
    fn test_skipped_rules_do_not_stop_batch() {
        let (mut ctx, mut xm, sess_id) = setup();
        let mut unnamed = voice_rule();
        unnamed.name = None;
        let mut unknown = voice_rule();
        unknown.rule_type = PccRuleType::Unknown(9);
        let mut no_description = PccRule::new_install("video", qos(2, 3), 1);
        no_description.flows.push(Flow {
            direction: FlowDirection::DownlinkOnly,
            description: None,
        });

        let msg = GxMessage::new_rar()
            .with_rule(unnamed)
            .with_rule(unknown)
            .with_rule(no_description)
            .with_rule(voice_rule());
        let report = bearer_binding(&mut ctx, &mut xm, sess_id, &msg);
        assert!(report.aborted.is_none());
        assert_eq!(report.num_xacts(), 1);

        let reasons: Vec<_> = report
            .results
            .iter()
            .filter_map(|r| match r {
                BearerBindingResult::Skipped { reason, .. } => Some(reason.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            reasons,
            vec![
                SkipReason::MissingName,
                SkipReason::UnknownType(9),
                SkipReason::MissingFlowDescription
            ]
        );
        assert!(ctx.sess(sess_id).unwrap().bearer_find_by_name("video").is_none());
    }

    #[test]
    fn test_invalid_flow_aborts_remaining_rules() {
        let (mut ctx, mut xm, sess_id) = setup();
        let bad = PccRule::new_install("video", qos(2, 3), 1)
            .add_flow(FlowDirection::DownlinkOnly, "deny in ip from any to any");
        let msg = GxMessage::new_rar()
            .with_rule(voice_rule())
            .with_rule(bad)
            .with_rule(PccRule::new_remove("voice"));

        let report = bearer_binding(&mut ctx, &mut xm, sess_id, &msg);
        assert!(matches!(report.aborted, Some(SmfError::PacketFilter(_))));
        assert_eq!(report.results.len(), 1);
        assert_eq!(sent_types(&mut xm), vec![gtp2_message_type::CREATE_BEARER_REQUEST]);

        // voice stays, the remove after the failure never ran
        let sess = ctx.sess(sess_id).unwrap();
        assert!(sess.bearer_find_by_name("voice").is_some());
        assert!(sess.bearer_find_by_name("video").is_none());
        assert_eq!(sess.bearer_list.len(), 2);
    }

    #[test]
    fn test_too_many_flows_leaves_no_bearer() {
        let (mut ctx, mut xm, sess_id) = setup();
        let flows = |n: usize| {
            (0..n).fold(PccRule::new_install("video", qos(2, 3), 1), |rule, i| {
                rule.add_flow(
                    FlowDirection::DownlinkOnly,
                    &format!("permit out udp from 10.0.0.{} to any", i + 1),
                )
            })
        };

        let msg = GxMessage::new_rar().with_rule(flows(MAX_NUM_OF_PACKET_FILTER + 1));
        let report = bearer_binding(&mut ctx, &mut xm, sess_id, &msg);
        assert!(matches!(report.aborted, Some(SmfError::ResourceExhausted(_))));
        assert!(xm.drain_outbound().is_empty());
        assert!(ctx.sess(sess_id).unwrap().bearer_find_by_name("video").is_none());

        // a later install still creates the bearer
        let msg = GxMessage::new_rar().with_rule(flows(MAX_NUM_OF_PACKET_FILTER));
        let results = bearer_binding(&mut ctx, &mut xm, sess_id, &msg)
            .into_result()
            .unwrap();
        assert!(matches!(results[0], BearerBindingResult::Created { .. }));
        assert_eq!(sent_types(&mut xm), vec![gtp2_message_type::CREATE_BEARER_REQUEST]);
        let sess = ctx.sess(sess_id).unwrap();
        let bearer = sess
            .bearer_find_by_name("video")
            .and_then(|id| sess.bearer(id))
            .unwrap();
        assert_eq!(bearer.pf_list.len(), MAX_NUM_OF_PACKET_FILTER);
    }

    #[test]
    fn test_unknown_session() {
        let (mut ctx, mut xm, sess_id) = setup();
        ctx.sess_remove(sess_id).unwrap();

        let msg = GxMessage::new_rar().with_rule(voice_rule());
        let err = bearer_binding(&mut ctx, &mut xm, sess_id, &msg)
            .into_result()
            .unwrap_err();
        assert!(matches!(err, SmfError::SessionNotFound(id) if id == sess_id));
    }

    #[test]
    fn test_qos_changed_ignores_unspecified_rates() {
        let mut stored = qos(1, 2);
        stored.mbr.downlink = 1000;
        let mut incoming = qos(1, 2);
        assert!(!qos_changed(&stored, &incoming));
        incoming.mbr.downlink = 1000;
        assert!(!qos_changed(&stored, &incoming));
        incoming.gbr.uplink = 5;
        assert!(qos_changed(&stored, &incoming));
    }
}
