//! Strongly-typed identifiers used across the resource manager.
//!
//! Scope records are addressed by `ScopeId` handles into the arena; peers and
//! protocols are opaque, comparable names supplied by the networking stack.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! new_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(v: u64) -> Self {
                Self(v)
            }
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

macro_rules! new_name {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(v: impl Into<String>) -> Self {
                Self(v.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(v: &str) -> Self {
                Self(v.to_string())
            }
        }

        impl From<String> for $name {
            fn from(v: String) -> Self {
                Self(v)
            }
        }
    };
}

new_id!(ScopeId);

new_name!(
    /// Identity of a remote peer. The empty id is what the null manager reports.
    PeerId
);
new_name!(
    /// Negotiated protocol identifier, e.g. `/ipfs/ping/1.0.0`.
    ProtocolId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_transparent_in_json() {
        let p = PeerId::new("QmPeer");
        assert_eq!(serde_json::to_string(&p).unwrap(), "\"QmPeer\"");
        let back: PeerId = serde_json::from_str("\"QmPeer\"").unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn scope_id_display() {
        assert_eq!(ScopeId::new(7).to_string(), "ScopeId(7)");
        assert!(ProtocolId::default().is_empty());
    }
}
