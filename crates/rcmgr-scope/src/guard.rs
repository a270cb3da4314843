//! RAII memory reservation against any `ResourceScope`.
//!
//! Components that hold memory for a bounded span (buffers, windows, caches)
//! should reserve through a guard. Dropping the guard returns the bytes to the
//! scope and all of its ancestors.

use rcmgr_core::error::Result;
use rcmgr_core::scope::ResourceScope;
use rcmgr_core::types::MemoryStatus;

/// Bytes held in a scope for as long as the guard lives.
pub struct MemoryReservation<'a, S: ResourceScope> {
    scope: &'a S,
    bytes: usize,
    status: MemoryStatus,
}

impl<'a, S: ResourceScope> MemoryReservation<'a, S> {
    /// Reserve `bytes` in `scope`. Zero bytes always succeeds and touches
    /// nothing.
    pub fn new(scope: &'a S, bytes: usize) -> Result<Self> {
        let status = if bytes == 0 {
            MemoryStatus::Ok
        } else {
            scope.reserve_memory(bytes)?
        };
        Ok(Self {
            scope,
            bytes,
            status,
        })
    }

    /// Number of bytes currently accounted for by this guard.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Scope health reported by the most recent successful grow.
    pub fn status(&self) -> MemoryStatus {
        self.status
    }

    pub fn scope(&self) -> &'a S {
        self.scope
    }

    /// Try to resize this guard to `new_bytes`.
    ///
    /// Shrinking always succeeds. Growing reserves only the difference; on
    /// failure the guard keeps its previous size and the error is returned.
    pub fn try_resize(&mut self, new_bytes: usize) -> Result<MemoryStatus> {
        if new_bytes == self.bytes {
            return Ok(self.status);
        }

        if new_bytes < self.bytes {
            self.scope.release_memory(self.bytes - new_bytes);
            self.bytes = new_bytes;
        } else {
            self.status = self.scope.reserve_memory(new_bytes - self.bytes)?;
            self.bytes = new_bytes;
        }
        Ok(self.status)
    }

    /// Give back bytes gained by a grow the caller decided not to keep, and
    /// restore the status that was current before it.
    pub(crate) fn roll_back(&mut self, bytes: usize, status: MemoryStatus) {
        if bytes < self.bytes {
            self.scope.release_memory(self.bytes - bytes);
            self.bytes = bytes;
        }
        self.status = status;
    }

    /// Hand the bytes over to the caller, who becomes responsible for
    /// releasing them.
    pub fn forget(mut self) -> usize {
        std::mem::take(&mut self.bytes)
    }
}

impl<S: ResourceScope> Drop for MemoryReservation<'_, S> {
    fn drop(&mut self) {
        if self.bytes > 0 {
            self.scope.release_memory(self.bytes);
            self.bytes = 0;
        }
    }
}
