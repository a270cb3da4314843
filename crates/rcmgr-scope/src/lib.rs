#![forbid(unsafe_code)]
//! rcmgr-scope: the resource-scope DAG and its reservation protocol.
//!
//! This crate provides the concrete accounting behind the interfaces defined
//! in `rcmgr-core::scope`. Every reservation in the stack flows through a
//! `ScopeArena`, which checks it against the scope and all of its ancestors
//! before committing anything.
//!
//! No manager facade or typed handles live here; see `rcmgr-manager`.

pub mod arena;
pub mod guard;
pub mod pool;
pub mod tracking;

pub use arena::ScopeArena;
pub use guard::MemoryReservation;
pub use pool::ScopedBuf;
pub use tracking::{PeakTracker, PeakUsage};
