//! NextGCore SMF (Session Management Function) Library
//!
//! EPC control plane between the PCRF and the SGW:
//! - Gx policy decisions (CCA, RAR) bound to dedicated bearers
//! - S5/S8 GTPv2-C session responses and bearer management requests
//! - GTP-C transactions with timeout handling

pub mod binding;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod gtp_build;
pub mod gtp_handler;
pub mod gtp_path;
pub mod gtp_xact;
pub mod gx_handler;
pub mod gx_message;
pub mod smf_sm;


// Re-export commonly used types
pub use binding::{bearer_binding, BearerBindingResult, BindingReport, SkipReason};
pub use config::SmfConfig;
pub use context::{BearerId, GnodeId, SessId, SmfBearer, SmfContext, SmfSess};
pub use error::{ErrorKind, SmfError, SmfResult};
pub use event::{SmfEvent, SmfEventId};
pub use gtp_path::GtpPath;
pub use gtp_xact::{GtpXactManager, XactId};
pub use gx_message::{GxMessage, PccRule};
pub use smf_sm::{SmfApp, SmfState};
