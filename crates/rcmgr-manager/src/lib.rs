#![forbid(unsafe_code)]
//! rcmgr-manager: the resource manager facade.
//!
//! `ResourceManager` owns the System and Transient scopes, creates service,
//! protocol, and peer scopes on demand, and is the factory for connection and
//! stream scopes. A null variant, selected at construction, accepts every
//! reservation and tracks nothing.

mod handle;
pub mod manager;
pub mod metrics;
pub mod scopes;
pub mod snapshot;

pub use manager::{ResourceManager, ScopeView};
pub use scopes::{
    ConnectionScope, PeerScope, ProtocolScope, ServiceScope, StreamScope, SystemScope,
    TransactionScope, TransientScope,
};
pub use snapshot::ManagerSnapshot;
