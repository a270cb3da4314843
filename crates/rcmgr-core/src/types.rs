//! Plain data types shared by every scope: directions, usage snapshots,
//! memory health, and scope identities.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::id::{PeerId, ProtocolId, ScopeId};

/// Direction of a connection or stream relative to the local node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Health of a scope's memory after a successful reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MemoryStatus {
    /// At most half of the ceiling is in use.
    Ok,
    /// More than 50% and at most 80% of the ceiling is in use; optional
    /// allocations should back off.
    Caution,
    /// More than 80% of the ceiling is in use.
    Critical,
}

impl MemoryStatus {
    /// Classify `used` bytes against a `limit` ceiling.
    pub fn from_usage(used: i64, limit: i64) -> Self {
        if limit <= 0 {
            return if used > 0 {
                MemoryStatus::Critical
            } else {
                MemoryStatus::Ok
            };
        }
        // Widen so that ceilings near i64::MAX do not overflow.
        let used = used.max(0) as i128;
        let limit = limit as i128;
        if used * 10 > limit * 8 {
            MemoryStatus::Critical
        } else if used * 2 > limit {
            MemoryStatus::Caution
        } else {
            MemoryStatus::Ok
        }
    }
}

/// Point-in-time copy of one scope's own counters.
///
/// Also used as the delta applied by a reservation: opening an outbound
/// stream is `ScopeStat { num_streams_outbound: 1, ..Default::default() }`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeStat {
    pub num_streams_inbound: usize,
    pub num_streams_outbound: usize,
    pub num_conns_inbound: usize,
    pub num_conns_outbound: usize,
    pub num_fd: usize,
    pub memory: i64,
}

impl ScopeStat {
    pub fn memory(bytes: i64) -> Self {
        Self {
            memory: bytes,
            ..Self::default()
        }
    }

    pub fn stream(dir: Direction) -> Self {
        match dir {
            Direction::Inbound => Self {
                num_streams_inbound: 1,
                ..Self::default()
            },
            Direction::Outbound => Self {
                num_streams_outbound: 1,
                ..Self::default()
            },
        }
    }

    pub fn conn(dir: Direction, usefd: bool) -> Self {
        let mut stat = match dir {
            Direction::Inbound => Self {
                num_conns_inbound: 1,
                ..Self::default()
            },
            Direction::Outbound => Self {
                num_conns_outbound: 1,
                ..Self::default()
            },
        };
        if usefd {
            stat.num_fd = 1;
        }
        stat
    }

    pub fn num_streams(&self) -> usize {
        self.num_streams_inbound + self.num_streams_outbound
    }

    pub fn num_conns(&self) -> usize {
        self.num_conns_inbound + self.num_conns_outbound
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Add `delta` to every counter.
    pub fn add(&mut self, delta: &ScopeStat) {
        self.num_streams_inbound = self
            .num_streams_inbound
            .saturating_add(delta.num_streams_inbound);
        self.num_streams_outbound = self
            .num_streams_outbound
            .saturating_add(delta.num_streams_outbound);
        self.num_conns_inbound = self.num_conns_inbound.saturating_add(delta.num_conns_inbound);
        self.num_conns_outbound = self.num_conns_outbound.saturating_add(delta.num_conns_outbound);
        self.num_fd = self.num_fd.saturating_add(delta.num_fd);
        self.memory = self.memory.saturating_add(delta.memory);
    }

    /// Per-counter minimum of `self` and `held`.
    pub fn clamped_to(&self, held: &ScopeStat) -> ScopeStat {
        ScopeStat {
            num_streams_inbound: self.num_streams_inbound.min(held.num_streams_inbound),
            num_streams_outbound: self.num_streams_outbound.min(held.num_streams_outbound),
            num_conns_inbound: self.num_conns_inbound.min(held.num_conns_inbound),
            num_conns_outbound: self.num_conns_outbound.min(held.num_conns_outbound),
            num_fd: self.num_fd.min(held.num_fd),
            memory: self.memory.min(held.memory.max(0)),
        }
    }

    /// Subtract `delta`, clamping every counter at zero.
    ///
    /// Returns `false` if any counter had to be clamped, i.e. more was released
    /// than was held.
    pub fn sub_clamped(&mut self, delta: &ScopeStat) -> bool {
        fn take(cur: &mut usize, d: usize) -> bool {
            let ok = *cur >= d;
            *cur = cur.saturating_sub(d);
            ok
        }

        let mut ok = take(&mut self.num_streams_inbound, delta.num_streams_inbound);
        ok &= take(&mut self.num_streams_outbound, delta.num_streams_outbound);
        ok &= take(&mut self.num_conns_inbound, delta.num_conns_inbound);
        ok &= take(&mut self.num_conns_outbound, delta.num_conns_outbound);
        ok &= take(&mut self.num_fd, delta.num_fd);
        if self.memory >= delta.memory {
            self.memory -= delta.memory;
        } else {
            self.memory = 0;
            ok = false;
        }
        ok
    }
}

/// A resource dimension that a reservation can exhaust.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resource {
    Memory,
    StreamsInbound,
    StreamsOutbound,
    Streams,
    ConnsInbound,
    ConnsOutbound,
    Conns,
    FileDescriptors,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Resource::Memory => "memory",
            Resource::StreamsInbound => "inbound streams",
            Resource::StreamsOutbound => "outbound streams",
            Resource::Streams => "streams",
            Resource::ConnsInbound => "inbound connections",
            Resource::ConnsOutbound => "outbound connections",
            Resource::Conns => "connections",
            Resource::FileDescriptors => "file descriptors",
        };
        f.write_str(s)
    }
}

/// Identity of a scope in the DAG.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeName {
    System,
    Transient,
    Service(String),
    Protocol(ProtocolId),
    Peer(PeerId),
    Connection(ScopeId),
    Stream(ScopeId),
    Transaction(ScopeId),
}

impl ScopeName {
    /// Scopes that are created per network object and closed with `done`.
    pub fn is_owned(&self) -> bool {
        matches!(
            self,
            ScopeName::Connection(_) | ScopeName::Stream(_) | ScopeName::Transaction(_)
        )
    }
}

impl fmt::Display for ScopeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeName::System => f.write_str("system"),
            ScopeName::Transient => f.write_str("transient"),
            ScopeName::Service(s) => write!(f, "service:{s}"),
            ScopeName::Protocol(p) => write!(f, "protocol:{p}"),
            ScopeName::Peer(p) => write!(f, "peer:{p}"),
            ScopeName::Connection(id) => write!(f, "conn-{}", id.get()),
            ScopeName::Stream(id) => write!(f, "stream-{}", id.get()),
            ScopeName::Transaction(id) => write!(f, "txn-{}", id.get()),
        }
    }
}
