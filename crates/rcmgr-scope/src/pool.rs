//! Byte buffers whose capacity is accounted against a scope.
//!
//! Muxers and protocol handlers acquire their receive/send buffers here so
//! the bytes show up in the stream, peer, and system budgets.

use std::ops::{Deref, DerefMut};

use rcmgr_core::error::Result;
use rcmgr_core::scope::ResourceScope;
use rcmgr_core::types::MemoryStatus;

use crate::guard::MemoryReservation;

/// Owned byte buffer that returns its accounted bytes on drop via the guard.
pub struct ScopedBuf<'a, S: ResourceScope> {
    guard: MemoryReservation<'a, S>,
    buf: Vec<u8>,
}

impl<'a, S: ResourceScope> ScopedBuf<'a, S> {
    /// A zeroed buffer of `len` bytes, reserved in `scope`.
    pub fn new_zeroed(scope: &'a S, len: usize) -> Result<Self> {
        let guard = MemoryReservation::new(scope, len)?;
        Ok(Self {
            guard,
            buf: vec![0u8; len],
        })
    }

    /// An empty buffer with capacity `cap`, reserved in `scope`.
    pub fn with_capacity(scope: &'a S, cap: usize) -> Result<Self> {
        let guard = MemoryReservation::new(scope, cap)?;
        Ok(Self {
            guard,
            buf: Vec::with_capacity(cap),
        })
    }

    /// Current accounted size (bytes).
    pub fn accounted_bytes(&self) -> usize {
        self.guard.bytes()
    }

    pub fn status(&self) -> MemoryStatus {
        self.guard.status()
    }

    /// Grow the accounted capacity to `new_cap` as a required allocation.
    pub fn grow(&mut self, new_cap: usize) -> Result<MemoryStatus> {
        if new_cap <= self.guard.bytes() {
            return Ok(self.guard.status());
        }
        let status = self.guard.try_resize(new_cap)?;
        self.buf.reserve_exact(new_cap.saturating_sub(self.buf.len()));
        Ok(status)
    }

    /// Grow the accounted capacity to `new_cap` as an optional allocation,
    /// e.g. a window increase.
    ///
    /// Returns `false` and keeps the current buffer if the reservation fails
    /// or if the scope reports anything but `MemoryStatus::Ok` afterwards; in
    /// the latter case the extra bytes are given back immediately and
    /// `status()` reports what it did before the attempt.
    pub fn try_grow(&mut self, new_cap: usize) -> bool {
        let old = self.guard.bytes();
        if new_cap <= old {
            return true;
        }
        let old_status = self.guard.status();
        match self.guard.try_resize(new_cap) {
            Ok(MemoryStatus::Ok) => {
                self.buf.reserve_exact(new_cap.saturating_sub(self.buf.len()));
                true
            }
            Ok(_) => {
                self.guard.roll_back(old, old_status);
                false
            }
            Err(_) => false,
        }
    }

    /// Expose the inner Vec together with its reservation.
    pub fn into_inner(self) -> (Vec<u8>, MemoryReservation<'a, S>) {
        (self.buf, self.guard)
    }
}

impl<S: ResourceScope> Deref for ScopedBuf<'_, S> {
    type Target = Vec<u8>;
    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl<S: ResourceScope> DerefMut for ScopedBuf<'_, S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}
