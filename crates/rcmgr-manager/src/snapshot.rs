//! Serializable usage snapshot of a whole manager.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use rcmgr_core::types::{ScopeName, ScopeStat};
use rcmgr_scope::ScopeArena;

/// Counters of every named scope plus the number of open owned scopes.
///
/// Maps are keyed by name so the JSON form is stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerSnapshot {
    pub system: ScopeStat,
    pub transient: ScopeStat,
    pub services: BTreeMap<String, ScopeStat>,
    pub protocols: BTreeMap<String, ScopeStat>,
    pub peers: BTreeMap<String, ScopeStat>,
    pub open_connections: usize,
    pub open_streams: usize,
    pub open_transactions: usize,
    pub peak_memory: i64,
}

impl ManagerSnapshot {
    pub(crate) fn collect(arena: &ScopeArena) -> Self {
        let mut snap = Self {
            peak_memory: arena.peak_memory(),
            ..Self::default()
        };
        for (name, stat) in arena.stats() {
            match name {
                ScopeName::System => snap.system = stat,
                ScopeName::Transient => snap.transient = stat,
                ScopeName::Service(s) => {
                    snap.services.insert(s, stat);
                }
                ScopeName::Protocol(p) => {
                    snap.protocols.insert(p.to_string(), stat);
                }
                ScopeName::Peer(p) => {
                    snap.peers.insert(p.to_string(), stat);
                }
                ScopeName::Connection(_) => snap.open_connections += 1,
                ScopeName::Stream(_) => snap.open_streams += 1,
                ScopeName::Transaction(_) => snap.open_transactions += 1,
            }
        }
        snap
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
