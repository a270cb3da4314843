#![forbid(unsafe_code)]
//! rcmgr: resource accounting and admission control for a peer-to-peer stack.
//!
//! Every component reserves memory, streams, connections, and file
//! descriptors against a DAG of scopes before using them:
//!
//! ```text
//! System
//!   +--> Transient ............+...........+
//!   +--> Service ------------- . ---+      .
//!   +--> Protocol ------------ . ---+      .
//!   +--> Peer                  .    |      .
//!          +--> Connection <...+    |      .
//!          +----------------------> Stream <
//! ```
//!
//! A reservation is accepted only if the scope and every ancestor stay
//! within their limits. See [`ResourceManager`] for the entry point.

pub use rcmgr_core::prelude::*;
pub use rcmgr_manager::{
    ConnectionScope, ManagerSnapshot, PeerScope, ProtocolScope, ResourceManager, ScopeView,
    ServiceScope, StreamScope, SystemScope, TransactionScope, TransientScope,
};
pub use rcmgr_scope::{MemoryReservation, PeakTracker, PeakUsage, ScopeArena, ScopedBuf};
