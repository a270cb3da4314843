//! Convenient re-exports for downstream crates.

pub use crate::config::LimitConfig;
pub use crate::error::{Error, Result};
pub use crate::id::{PeerId, ProtocolId, ScopeId};
pub use crate::limits::{Limit, LimitPolicy, UnlimitedPolicy, Violation};
pub use crate::scope::{ResourceScope, TransactionalScope};
pub use crate::types::{Direction, MemoryStatus, Resource, ScopeName, ScopeStat};
