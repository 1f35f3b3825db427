//! Gx policy decision model
//!
//! Decoded form of the CCA/RAR content the bearer binding consumes.
//! Diameter encoding itself lives outside this crate.

use crate::context::{BitRate, FlowDirection, Qos};

/// Diameter command codes
pub mod cmd {
    pub const CREDIT_CONTROL: u32 = 272;
    pub const RE_AUTH: u32 = 258;
}

/// CC-Request-Type AVP values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CcRequestType {
    InitialRequest = 1,
    UpdateRequest = 2,
    TerminationRequest = 3,
    EventRequest = 4,
}

impl TryFrom<u32> for CcRequestType {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(CcRequestType::InitialRequest),
            2 => Ok(CcRequestType::UpdateRequest),
            3 => Ok(CcRequestType::TerminationRequest),
            4 => Ok(CcRequestType::EventRequest),
            other => Err(other),
        }
    }
}

/// PCC rule type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PccRuleType {
    Install,
    Remove,
    Unknown(u8),
}

impl From<u8> for PccRuleType {
    fn from(value: u8) -> Self {
        match value {
            1 => PccRuleType::Install,
            2 => PccRuleType::Remove,
            other => PccRuleType::Unknown(other),
        }
    }
}

impl PccRuleType {
    pub fn as_u8(self) -> u8 {
        match self {
            PccRuleType::Install => 1,
            PccRuleType::Remove => 2,
            PccRuleType::Unknown(value) => value,
        }
    }
}

/// Flow information carried in a PCC rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flow {
    pub direction: FlowDirection,
    /// IPFilterRule text; `None` when the AVP was absent
    pub description: Option<String>,
}

/// PCC rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PccRule {
    pub name: Option<String>,
    pub rule_type: PccRuleType,
    pub qos: Qos,
    pub precedence: u32,
    pub flows: Vec<Flow>,
}

impl PccRule {
    /// Create a new install rule
    pub fn new_install(name: &str, qos: Qos, precedence: u32) -> Self {
        Self {
            name: Some(name.to_string()),
            rule_type: PccRuleType::Install,
            qos,
            precedence,
            flows: Vec::new(),
        }
    }

    /// Create a new remove rule
    pub fn new_remove(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            rule_type: PccRuleType::Remove,
            qos: Qos::default(),
            precedence: 0,
            flows: Vec::new(),
        }
    }

    pub fn add_flow(mut self, direction: FlowDirection, description: &str) -> Self {
        self.flows.push(Flow {
            direction,
            description: Some(description.to_string()),
        });
        self
    }
}

/// Session-level policy content
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionData {
    /// APN-AMBR
    pub ambr: Option<BitRate>,
    /// Default bearer QoS
    pub qos: Option<Qos>,
    pub pcc_rules: Vec<PccRule>,
}

/// Gx message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GxMessage {
    pub cmd_code: u32,
    /// Present on CCA only
    pub cc_request_type: Option<CcRequestType>,
    pub result_code: u32,
    pub session_data: SessionData,
}

/// DIAMETER_SUCCESS
pub const DIAMETER_SUCCESS: u32 = 2001;

impl GxMessage {
    /// Credit-Control-Answer
    pub fn new_cca(cc_request_type: CcRequestType) -> Self {
        Self {
            cmd_code: cmd::CREDIT_CONTROL,
            cc_request_type: Some(cc_request_type),
            result_code: DIAMETER_SUCCESS,
            session_data: SessionData::default(),
        }
    }

    /// Re-Auth-Request
    pub fn new_rar() -> Self {
        Self {
            cmd_code: cmd::RE_AUTH,
            cc_request_type: None,
            result_code: 0,
            session_data: SessionData::default(),
        }
    }

    pub fn with_rule(mut self, rule: PccRule) -> Self {
        self.session_data.pcc_rules.push(rule);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcc_rule_type_from_u8() {
        assert_eq!(PccRuleType::from(1), PccRuleType::Install);
        assert_eq!(PccRuleType::from(2), PccRuleType::Remove);
        assert_eq!(PccRuleType::from(7), PccRuleType::Unknown(7));
        assert_eq!(PccRuleType::Unknown(7).as_u8(), 7);
    }

    #[test]
    fn test_cc_request_type() {
        assert_eq!(CcRequestType::try_from(3), Ok(CcRequestType::TerminationRequest));
        assert_eq!(CcRequestType::try_from(9), Err(9));
    }

    #[test]
    fn test_builders() {
        let msg = GxMessage::new_rar().with_rule(
            PccRule::new_install("rule-A", Qos::default(), 10)
                .add_flow(FlowDirection::DownlinkOnly, "permit out ip from any to any"),
        );
        assert_eq!(msg.cmd_code, cmd::RE_AUTH);
        assert_eq!(msg.session_data.pcc_rules.len(), 1);
        assert_eq!(msg.session_data.pcc_rules[0].flows.len(), 1);
    }
}
