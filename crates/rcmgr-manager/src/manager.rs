//! ResourceManager: scope registry and factory.
//!
//! - Owns one `ScopeArena` (System and Transient are created with it).
//! - Service, protocol, and peer scopes are created lazily on first view and
//!   live as long as the manager.
//! - Connection and stream scopes are opened here and owned by the caller.
//! - The null variant hands out null scopes; nothing is ever rejected.

use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

use rcmgr_core::config::LimitConfig;
use rcmgr_core::error::{Error, Result};
use rcmgr_core::id::{PeerId, ProtocolId, ScopeId};
use rcmgr_core::limits::LimitPolicy;
use rcmgr_core::types::Direction;
use rcmgr_scope::{PeakUsage, ScopeArena};

use crate::handle::ScopeHandle;
use crate::metrics::emit_event;
use crate::scopes::{
    ConnectionScope, PeerScope, ProtocolScope, ServiceScope, StreamScope, SystemScope,
    TransientScope,
};
use crate::snapshot::ManagerSnapshot;

/// A scope borrowed from the manager.
///
/// The view cannot outlive the borrow of the `ResourceManager` it came from;
/// the underlying scope stays usable by other callers concurrently.
#[derive(Debug)]
pub struct ScopeView<'a, T> {
    scope: T,
    _manager: PhantomData<&'a ResourceManager>,
}

impl<T> ScopeView<'_, T> {
    fn new(scope: T) -> Self {
        Self {
            scope,
            _manager: PhantomData,
        }
    }
}

impl<T> Deref for ScopeView<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.scope
    }
}

#[derive(Clone)]
enum Backend {
    Limited(Arc<ScopeArena>),
    Null,
}

/// Entry point to resource accounting. Cloning shares the same scopes.
#[derive(Clone)]
pub struct ResourceManager {
    backend: Backend,
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.backend {
            Backend::Limited(arena) => f
                .debug_struct("ResourceManager")
                .field("closed", &arena.is_closed())
                .finish(),
            Backend::Null => f.write_str("ResourceManager(null)"),
        }
    }
}

/// The null manager, used when no resource management is configured.
impl Default for ResourceManager {
    fn default() -> Self {
        Self::null()
    }
}

impl ResourceManager {
    /// Manager enforcing the ceilings supplied by `policy`.
    pub fn new(policy: impl LimitPolicy) -> Self {
        Self {
            backend: Backend::Limited(Arc::new(ScopeArena::new(policy))),
        }
    }

    /// Manager enforcing a validated `LimitConfig`.
    pub fn from_config(cfg: LimitConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self::new(cfg))
    }

    /// Manager with default limits overridden from `RCMGR_*` variables.
    pub fn from_env() -> Result<Self> {
        Self::from_config(LimitConfig::from_env())
    }

    /// Every operation succeeds, memory status is always `Ok`, and every
    /// stat is zero.
    pub const fn null() -> Self {
        Self {
            backend: Backend::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.backend, Backend::Null)
    }

    fn handle(&self, lookup: impl FnOnce(&ScopeArena) -> Result<ScopeId>) -> Result<ScopeHandle> {
        match &self.backend {
            Backend::Limited(arena) => {
                if arena.is_closed() {
                    return Err(Error::ManagerClosed);
                }
                let id = lookup(arena.as_ref())?;
                Ok(ScopeHandle::tracked(arena, id))
            }
            Backend::Null => Ok(ScopeHandle::Null),
        }
    }

    pub fn view_system(&self) -> Result<ScopeView<'_, SystemScope>> {
        let handle = self.handle(|a| Ok(a.system()))?;
        Ok(ScopeView::new(SystemScope { handle }))
    }

    pub fn view_transient(&self) -> Result<ScopeView<'_, TransientScope>> {
        let handle = self.handle(|a| Ok(a.transient()))?;
        Ok(ScopeView::new(TransientScope { handle }))
    }

    /// Look up or create the scope of service `name`. Creation reserves
    /// nothing and never fails on limits.
    pub fn view_service(&self, name: &str) -> Result<ScopeView<'_, ServiceScope>> {
        let handle = self.handle(|a| a.service(name))?;
        Ok(ScopeView::new(ServiceScope {
            handle,
            name: if self.is_null() {
                String::new()
            } else {
                name.to_string()
            },
        }))
    }

    pub fn view_protocol(&self, proto: &ProtocolId) -> Result<ScopeView<'_, ProtocolScope>> {
        let handle = self.handle(|a| a.protocol(proto))?;
        Ok(ScopeView::new(ProtocolScope {
            handle,
            protocol: if self.is_null() {
                ProtocolId::default()
            } else {
                proto.clone()
            },
        }))
    }

    pub fn view_peer(&self, peer: &PeerId) -> Result<ScopeView<'_, PeerScope>> {
        let handle = self.handle(|a| a.peer(peer))?;
        Ok(ScopeView::new(PeerScope {
            handle,
            peer: if self.is_null() {
                PeerId::default()
            } else {
                peer.clone()
            },
        }))
    }

    /// Open a connection scope under Transient, reserving one connection slot
    /// and, when `usefd` is set, one file descriptor.
    pub fn open_connection(&self, dir: Direction, usefd: bool) -> Result<ConnectionScope> {
        let handle = self.handle(|a| a.open_connection(dir, usefd))?;
        if let Some(id) = handle.id() {
            emit_event(
                "open_connection",
                &[
                    ("conn", id.to_string()),
                    ("dir", format!("{dir:?}")),
                    ("usefd", usefd.to_string()),
                ],
            );
        }
        Ok(ConnectionScope { handle })
    }

    /// Open a stream scope constrained by both Transient and the scope of
    /// `peer` until it is negotiated.
    pub fn open_stream(&self, peer: &PeerId, dir: Direction) -> Result<StreamScope> {
        let handle = self.handle(|a| a.open_stream(peer, dir))?;
        if let Some(id) = handle.id() {
            emit_event(
                "open_stream",
                &[
                    ("stream", id.to_string()),
                    ("peer", peer.to_string()),
                    ("dir", format!("{dir:?}")),
                ],
            );
        }
        Ok(StreamScope { handle })
    }

    /// Usage of every named scope plus open owned-scope counts.
    pub fn snapshot(&self) -> ManagerSnapshot {
        match &self.backend {
            Backend::Limited(arena) => ManagerSnapshot::collect(arena),
            Backend::Null => ManagerSnapshot::default(),
        }
    }

    /// High-water mark of System memory since construction.
    pub fn peak_system_memory(&self) -> i64 {
        match &self.backend {
            Backend::Limited(arena) => arena.peak_memory(),
            Backend::Null => 0,
        }
    }

    /// High-water marks of System memory, streams, connections, and fds.
    pub fn peak_system_usage(&self) -> PeakUsage {
        match &self.backend {
            Backend::Limited(arena) => arena.peak_usage(),
            Backend::Null => PeakUsage::default(),
        }
    }

    /// Tear down the manager. Scopes still open are force-released and every
    /// later operation fails with `Error::ManagerClosed`. Idempotent.
    pub fn close(&self) -> Result<()> {
        if let Backend::Limited(arena) = &self.backend {
            let leaked = arena.close();
            if leaked > 0 {
                #[cfg(feature = "tracing")]
                tracing::warn!(leaked, "resource manager closed with open scopes; force-released");
            }
            emit_event("close", &[("force_released", leaked.to_string())]);
        }
        Ok(())
    }
}
