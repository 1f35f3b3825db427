//! NextGCore IP Firewall Library
//!
//! Compiles Diameter/PCC flow descriptions (`permit out ...`) into structured
//! rules and turns them into TFT packet filter components.

mod packet_filter;
mod rule;
mod types;

pub use packet_filter::*;
pub use rule::*;
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_ipfw_rule_default() {
        let rule = IpfwRule::default();
        assert_eq!(rule.proto, 0);
        assert!(rule.is_match_all());
    }

    #[test]
    fn test_compile_simple_rule() {
        let rule = compile_rule("permit out ip from any to any").unwrap();
        assert_eq!(rule.proto, 0);
        assert!(rule.is_match_all());
    }

    #[test]
    fn test_compile_rule_with_proto() {
        let rule = compile_rule("permit out 17 from any to any").unwrap();
        assert_eq!(rule.proto, 17);
        assert!(!rule.is_match_all());
    }

    #[test]
    fn test_compile_rule_with_ipv4() {
        let rule = compile_rule("permit out ip from 10.0.0.1 to 192.168.1.0/24 80").unwrap();
        assert_eq!(
            rule.src.addr,
            Some(IpNetwork::V4 { addr: Ipv4Addr::new(10, 0, 0, 1), prefix_len: 32 })
        );
        assert_eq!(
            rule.dst.addr,
            Some(IpNetwork::V4 { addr: Ipv4Addr::new(192, 168, 1, 0), prefix_len: 24 })
        );
        assert_eq!(rule.dst.port, Some(PortRange::single(80)));
        assert_eq!(rule.src.port, None);
    }

    #[test]
    fn test_compile_empty() {
        assert!(matches!(compile_rule("   "), Err(IpfwError::InvalidSyntax(_))));
    }

    #[test]
    fn test_rule_swap() {
        let mut rule = compile_rule("permit out udp from 10.0.0.1 1000 to 192.168.1.1 80").unwrap();
        let original = rule.clone();

        rule.swap();

        assert_eq!(rule.src, original.dst);
        assert_eq!(rule.dst, original.src);
        assert_eq!(rule.copy_and_swap(), original);
    }

    proptest! {
        #[test]
        fn prop_display_recompiles(
            a in any::<[u8; 4]>(),
            prefix in 0u8..=32,
            lo in 1u16..1000,
            span in 0u16..1000,
            proto in prop_oneof![Just(0u8), Just(6u8), Just(17u8)],
        ) {
            let rule = IpfwRule {
                proto,
                src: Endpoint {
                    addr: Some(IpNetwork::V4 { addr: Ipv4Addr::from(a), prefix_len: prefix }),
                    port: None,
                },
                dst: Endpoint {
                    addr: None,
                    port: Some(PortRange { low: lo, high: lo + span }),
                },
            };
            let compiled = compile_rule(&rule.to_string()).unwrap();
            prop_assert_eq!(compiled, rule);
        }
    }
}
