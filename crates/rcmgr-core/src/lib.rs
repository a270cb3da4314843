#![forbid(unsafe_code)]
//! rcmgr-core: identifiers, limits, configuration, and scope interfaces.
//!
//! The concrete scope DAG lives in `rcmgr-scope` and the manager facade in
//! `rcmgr-manager`. This crate only carries the vocabulary they share, so that
//! transports and protocol handlers can depend on the API without pulling in
//! the accounting machinery.

pub mod config;
pub mod error;
pub mod id;
pub mod limits;
pub mod prelude;
pub mod scope;
pub mod types;

pub use error::{Error, Result};
