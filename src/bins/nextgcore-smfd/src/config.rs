//! SMF Configuration
//!
//! YAML layout:
//!
//! ```yaml
//! smf:
//!   gtpc:
//!     address: 127.0.0.4
//!     port: 2123
//!   sgw:
//!     - address: 127.0.0.3
//!   max:
//!     sess: 4096
//!     bearer_per_sess: 8
//!   xact:
//!     timeout_ms: 3000
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SmfError, SmfResult};

/// Default GTP-C port
pub const GTPC_PORT: u16 = 2123;

/// Default maximum number of sessions
pub const MAX_NUM_OF_SESS: usize = 4096;

/// Default maximum number of bearers per session (default bearer included)
pub const MAX_NUM_OF_BEARER_PER_SESS: usize = 8;

/// EBIs 5..=15 leave room for eleven bearers
pub const MAX_EBI_PER_SESS: usize = 11;

/// Default GTP transaction timeout
pub const GTP_XACT_TIMEOUT_MS: u64 = 3000;

/// Top-level configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmfConfigFile {
    #[serde(default)]
    pub smf: SmfConfig,
}

/// SMF configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SmfConfig {
    pub gtpc: GtpcConf,
    pub sgw: Vec<PeerConf>,
    pub max: MaxConf,
    pub xact: XactConf,
}

/// Local GTP-C endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GtpcConf {
    pub address: IpAddr,
    pub port: u16,
}

impl Default for GtpcConf {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 4)),
            port: GTPC_PORT,
        }
    }
}

impl GtpcConf {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

/// Gateway peer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConf {
    pub address: IpAddr,
    #[serde(default = "default_gtpc_port")]
    pub port: u16,
}

fn default_gtpc_port() -> u16 {
    GTPC_PORT
}

impl PeerConf {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

/// Maximum values configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaxConf {
    pub sess: usize,
    pub bearer_per_sess: usize,
}

impl Default for MaxConf {
    fn default() -> Self {
        Self {
            sess: MAX_NUM_OF_SESS,
            bearer_per_sess: MAX_NUM_OF_BEARER_PER_SESS,
        }
    }
}

/// Transaction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct XactConf {
    pub timeout_ms: u64,
}

impl Default for XactConf {
    fn default() -> Self {
        Self {
            timeout_ms: GTP_XACT_TIMEOUT_MS,
        }
    }
}

impl XactConf {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl SmfConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml(yaml: &str) -> SmfResult<Self> {
        let file: SmfConfigFile =
            serde_yaml::from_str(yaml).map_err(|e| SmfError::Config(e.to_string()))?;
        file.smf.validate()?;
        Ok(file.smf)
    }

    /// Load from a file
    pub fn from_file(path: impl AsRef<Path>) -> SmfResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn validate(&self) -> SmfResult<()> {
        if self.gtpc.port == 0 {
            return Err(SmfError::Config("gtpc.port must not be 0".to_string()));
        }
        if let Some(peer) = self.sgw.iter().find(|p| p.port == 0) {
            return Err(SmfError::Config(format!(
                "sgw {} port must not be 0",
                peer.address
            )));
        }
        if self.max.sess == 0 {
            return Err(SmfError::Config("max.sess must not be 0".to_string()));
        }
        if self.max.bearer_per_sess == 0 || self.max.bearer_per_sess > MAX_EBI_PER_SESS {
            return Err(SmfError::Config(format!(
                "max.bearer_per_sess must be within 1..={}",
                MAX_EBI_PER_SESS
            )));
        }
        if self.xact.timeout_ms == 0 {
            return Err(SmfError::Config("xact.timeout_ms must not be 0".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SmfConfig::default();
        assert_eq!(config.gtpc.port, GTPC_PORT);
        assert_eq!(config.max.bearer_per_sess, MAX_NUM_OF_BEARER_PER_SESS);
        assert_eq!(config.xact.timeout(), Duration::from_secs(3));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
smf:
  gtpc:
    address: 10.0.0.4
  sgw:
    - address: 10.0.0.3
    - address: 10.0.0.5
      port: 3123
  xact:
    timeout_ms: 500
"#;
        let config = SmfConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.gtpc.socket_addr(), "10.0.0.4:2123".parse().unwrap());
        assert_eq!(config.sgw.len(), 2);
        assert_eq!(config.sgw[0].port, GTPC_PORT);
        assert_eq!(config.sgw[1].socket_addr(), "10.0.0.5:3123".parse().unwrap());
        assert_eq!(config.xact.timeout_ms, 500);
        assert_eq!(config.max.sess, MAX_NUM_OF_SESS);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = SmfConfig::from_yaml("{}").unwrap();
        assert_eq!(config.gtpc.port, GTPC_PORT);
        assert!(config.sgw.is_empty());
    }

    #[test]
    fn test_validation_errors() {
        let err = SmfConfig::from_yaml("smf:\n  max:\n    bearer_per_sess: 12\n").unwrap_err();
        assert!(matches!(err, SmfError::Config(_)));

        let err = SmfConfig::from_yaml("smf:\n  xact:\n    timeout_ms: 0\n").unwrap_err();
        assert!(matches!(err, SmfError::Config(_)));

        let err = SmfConfig::from_yaml("smf: [").unwrap_err();
        assert!(matches!(err, SmfError::Config(_)));
    }
}
