//! Typed scope handles.
//!
//! System, Transient, Service, Protocol, and Peer scopes are views: they live
//! as long as the manager. Transaction, Connection, and Stream scopes are
//! owned by whoever opened them and are closed with `done`, or on drop.

use rcmgr_core::error::Result;
use rcmgr_core::id::{PeerId, ProtocolId, ScopeId};
use rcmgr_core::scope::{ResourceScope, TransactionalScope};
use rcmgr_core::types::{MemoryStatus, ScopeName, ScopeStat};

use crate::handle::ScopeHandle;
use crate::metrics::emit_event;

macro_rules! impl_resource_scope {
    ($($ty:ty),* $(,)?) => {$(
        impl ResourceScope for $ty {
            type Transaction = TransactionScope;

            fn reserve_memory(&self, size: usize) -> Result<MemoryStatus> {
                self.handle.reserve_memory(size)
            }

            fn release_memory(&self, size: usize) {
                self.handle.release_memory(size)
            }

            fn stat(&self) -> ScopeStat {
                self.handle.stat()
            }

            fn begin_transaction(&self) -> Result<TransactionScope> {
                Ok(TransactionScope {
                    handle: self.handle.begin_transaction()?,
                })
            }
        }
    )*};
}

macro_rules! impl_owned_scope {
    ($($ty:ty),* $(,)?) => {$(
        impl TransactionalScope for $ty {
            fn done(&self) {
                self.handle.done()
            }
        }

        impl Drop for $ty {
            fn drop(&mut self) {
                self.handle.done()
            }
        }

        impl $ty {
            /// Arena id, `None` for null scopes.
            pub fn id(&self) -> Option<ScopeId> {
                self.handle.id()
            }

            /// Names of the scopes this one is currently charged to.
            pub fn parents(&self) -> Vec<ScopeName> {
                self.handle.parents()
            }
        }
    )*};
}

/// The top level scope; constrains every other scope.
#[derive(Debug)]
pub struct SystemScope {
    pub(crate) handle: ScopeHandle,
}

/// Resources of connections before the handshake and of streams before
/// protocol negotiation.
#[derive(Debug)]
pub struct TransientScope {
    pub(crate) handle: ScopeHandle,
}

#[derive(Debug)]
pub struct ServiceScope {
    pub(crate) handle: ScopeHandle,
    pub(crate) name: String,
}

impl ServiceScope {
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug)]
pub struct ProtocolScope {
    pub(crate) handle: ScopeHandle,
    pub(crate) protocol: ProtocolId,
}

impl ProtocolScope {
    pub fn protocol(&self) -> &ProtocolId {
        &self.protocol
    }
}

#[derive(Debug)]
pub struct PeerScope {
    pub(crate) handle: ScopeHandle,
    pub(crate) peer: PeerId,
}

impl PeerScope {
    pub fn peer(&self) -> &PeerId {
        &self.peer
    }
}

/// A temporary child scope. Everything reserved through it, including by its
/// nested transactions, is released on `done`.
///
/// ```ignore
/// let txn = scope.begin_transaction()?;
/// txn.reserve_memory(4096)?;
/// // ... use the memory; dropping `txn` releases it
/// ```
#[derive(Debug)]
pub struct TransactionScope {
    pub(crate) handle: ScopeHandle,
}

/// Connection scope owned by the transport that accepted or dialed it.
#[derive(Debug)]
pub struct ConnectionScope {
    pub(crate) handle: ScopeHandle,
}

/// Stream scope owned by the multiplexer that opened it.
#[derive(Debug)]
pub struct StreamScope {
    pub(crate) handle: ScopeHandle,
}

impl_resource_scope!(
    SystemScope,
    TransientScope,
    ServiceScope,
    ProtocolScope,
    PeerScope,
    TransactionScope,
    ConnectionScope,
    StreamScope,
);

impl_owned_scope!(TransactionScope, ConnectionScope, StreamScope);

fn peer_scope(handle: &ScopeHandle) -> Option<PeerScope> {
    let Some((arena, id)) = handle.arena() else {
        return Some(PeerScope {
            handle: ScopeHandle::Null,
            peer: PeerId::default(),
        });
    };
    let peer = arena.peer_of(id)?;
    let pid = arena.peer(&peer).ok()?;
    Some(PeerScope {
        handle: ScopeHandle::tracked(arena, pid),
        peer,
    })
}

impl ConnectionScope {
    /// The peer this connection belongs to, `None` before `set_peer`.
    pub fn peer_scope(&self) -> Option<PeerScope> {
        peer_scope(&self.handle)
    }

    /// Move this connection out of the transient scope and under `peer`.
    /// Usage already reserved moves along without being re-checked.
    pub fn set_peer(&self, peer: &PeerId) -> Result<()> {
        let Some((arena, id)) = self.handle.arena() else {
            return Ok(());
        };
        arena.set_peer(id, peer)?;
        emit_event(
            "conn_set_peer",
            &[("conn", id.to_string()), ("peer", peer.to_string())],
        );
        Ok(())
    }
}

impl StreamScope {
    /// The peer this stream was opened for.
    pub fn peer_scope(&self) -> Option<PeerScope> {
        peer_scope(&self.handle)
    }

    /// The negotiated protocol, `None` before `set_protocol`.
    pub fn protocol_scope(&self) -> Option<ProtocolScope> {
        let Some((arena, id)) = self.handle.arena() else {
            return Some(ProtocolScope {
                handle: ScopeHandle::Null,
                protocol: ProtocolId::default(),
            });
        };
        let protocol = arena.protocol_of(id)?;
        let pid = arena.protocol(&protocol).ok()?;
        Some(ProtocolScope {
            handle: ScopeHandle::tracked(arena, pid),
            protocol,
        })
    }

    /// The owning service, `None` before `set_service`.
    pub fn service_scope(&self) -> Option<ServiceScope> {
        let Some((arena, id)) = self.handle.arena() else {
            return Some(ServiceScope {
                handle: ScopeHandle::Null,
                name: String::new(),
            });
        };
        let name = arena.service_of(id)?;
        let sid = arena.service(&name).ok()?;
        Some(ServiceScope {
            handle: ScopeHandle::tracked(arena, sid),
            name,
        })
    }

    /// Attach the stream to a negotiated protocol. The stream leaves the
    /// transient scope; calling this again replaces the protocol.
    pub fn set_protocol(&self, proto: &ProtocolId) -> Result<()> {
        let Some((arena, id)) = self.handle.arena() else {
            return Ok(());
        };
        arena.set_protocol(id, proto)?;
        emit_event(
            "stream_set_protocol",
            &[("stream", id.to_string()), ("protocol", proto.to_string())],
        );
        Ok(())
    }

    /// Attach the stream to a service. The stream leaves the transient scope;
    /// calling this again replaces the service.
    pub fn set_service(&self, service: &str) -> Result<()> {
        let Some((arena, id)) = self.handle.arena() else {
            return Ok(());
        };
        arena.set_service(id, service)?;
        emit_event(
            "stream_set_service",
            &[("stream", id.to_string()), ("service", service.to_string())],
        );
        Ok(())
    }
}
