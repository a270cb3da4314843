//! Abstract scope interfaces.
//!
//! The concrete handles live in `rcmgr-manager`; helpers such as the RAII
//! reservation in `rcmgr-scope` are written against these traits so they work
//! with any scope, including the null one.

use crate::error::Result;
use crate::types::{MemoryStatus, ScopeStat};

/// The contract every scope offers.
pub trait ResourceScope {
    type Transaction: TransactionalScope;

    /// Reserve `size` bytes in this scope and every ancestor.
    ///
    /// On error nothing was reserved anywhere. On success the status describes
    /// this scope's memory health after the reservation.
    fn reserve_memory(&self, size: usize) -> Result<MemoryStatus>;

    /// Release bytes previously reserved with `reserve_memory`. Never fails.
    fn release_memory(&self, size: usize);

    /// This scope's own counters.
    fn stat(&self) -> ScopeStat;

    /// Start a transaction rooted at this scope.
    fn begin_transaction(&self) -> Result<Self::Transaction>;
}

/// A control-flow delimited scope that releases everything it holds on `done`.
pub trait TransactionalScope: ResourceScope {
    /// Release all reservations held by this scope and its open child
    /// transactions. Idempotent.
    fn done(&self);
}
