//! The untyped scope handle every public scope type wraps.
//!
//! A handle either points at a record in a shared `ScopeArena` or is the null
//! handle, which accepts everything and tracks nothing. The variant is fixed
//! when the manager is constructed.

use std::fmt;
use std::sync::Arc;

use rcmgr_core::error::Result;
use rcmgr_core::id::ScopeId;
use rcmgr_core::types::{MemoryStatus, ScopeName, ScopeStat};
use rcmgr_scope::ScopeArena;

#[derive(Clone)]
pub enum ScopeHandle {
    Tracked { arena: Arc<ScopeArena>, id: ScopeId },
    Null,
}

impl fmt::Debug for ScopeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeHandle::Tracked { id, .. } => f.debug_tuple("Tracked").field(id).finish(),
            ScopeHandle::Null => f.write_str("Null"),
        }
    }
}

impl ScopeHandle {
    pub fn tracked(arena: &Arc<ScopeArena>, id: ScopeId) -> Self {
        ScopeHandle::Tracked {
            arena: Arc::clone(arena),
            id,
        }
    }

    pub fn id(&self) -> Option<ScopeId> {
        match self {
            ScopeHandle::Tracked { id, .. } => Some(*id),
            ScopeHandle::Null => None,
        }
    }

    pub fn arena(&self) -> Option<(&Arc<ScopeArena>, ScopeId)> {
        match self {
            ScopeHandle::Tracked { arena, id } => Some((arena, *id)),
            ScopeHandle::Null => None,
        }
    }

    pub fn parents(&self) -> Vec<ScopeName> {
        match self.arena() {
            Some((arena, id)) => arena.parents(id),
            None => Vec::new(),
        }
    }

    pub fn reserve_memory(&self, size: usize) -> Result<MemoryStatus> {
        match self.arena() {
            Some((arena, id)) => arena.reserve_memory(id, size),
            None => Ok(MemoryStatus::Ok),
        }
    }

    pub fn release_memory(&self, size: usize) {
        if let Some((arena, id)) = self.arena() {
            arena.release_memory(id, size);
        }
    }

    pub fn stat(&self) -> ScopeStat {
        match self.arena() {
            Some((arena, id)) => arena.stat(id),
            None => ScopeStat::default(),
        }
    }

    /// Handle for a new transaction rooted at this scope.
    pub fn begin_transaction(&self) -> Result<ScopeHandle> {
        match self.arena() {
            Some((arena, id)) => {
                let txn = arena.begin_transaction(id)?;
                Ok(ScopeHandle::tracked(arena, txn))
            }
            None => Ok(ScopeHandle::Null),
        }
    }

    pub fn done(&self) {
        if let Some((arena, id)) = self.arena() {
            arena.done(id);
        }
    }
}
