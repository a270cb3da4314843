//! Limit ceilings and the policy interface that supplies them.
//!
//! The arena in `rcmgr-scope` asks the policy for a scope's `Limit` on every
//! reservation, so a policy may change its answers over time. Only the
//! dimensions a reservation actually touches are checked.

use serde::{Deserialize, Serialize};

use crate::types::{Resource, ScopeName, ScopeStat};

/// Numeric ceilings for one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limit {
    /// Bytes.
    pub memory: i64,
    /// Inbound + outbound streams.
    pub streams: usize,
    pub streams_inbound: usize,
    pub streams_outbound: usize,
    /// Inbound + outbound connections.
    pub conns: usize,
    pub conns_inbound: usize,
    pub conns_outbound: usize,
    pub fd: usize,
}

impl Default for Limit {
    fn default() -> Self {
        Self::unlimited()
    }
}

/// The first ceiling a reservation would cross.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Violation {
    pub resource: Resource,
    pub requested: i64,
    pub used: i64,
    pub limit: i64,
}

fn count(v: usize) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn over(resource: Resource, used: usize, requested: usize, limit: usize) -> Option<Violation> {
    if requested == 0 || used.saturating_add(requested) <= limit {
        return None;
    }
    Some(Violation {
        resource,
        requested: count(requested),
        used: count(used),
        limit: count(limit),
    })
}

impl Limit {
    pub const fn unlimited() -> Self {
        Self {
            memory: i64::MAX,
            streams: usize::MAX,
            streams_inbound: usize::MAX,
            streams_outbound: usize::MAX,
            conns: usize::MAX,
            conns_inbound: usize::MAX,
            conns_outbound: usize::MAX,
            fd: usize::MAX,
        }
    }

    /// Convenience constructor for a memory-only ceiling; counts are unlimited.
    pub const fn memory_only(memory: i64) -> Self {
        let mut l = Self::unlimited();
        l.memory = memory;
        l
    }

    /// Check whether adding `delta` to `current` stays within this limit.
    pub fn check(&self, current: &ScopeStat, delta: &ScopeStat) -> Option<Violation> {
        if delta.memory > 0 && current.memory.saturating_add(delta.memory) > self.memory {
            return Some(Violation {
                resource: Resource::Memory,
                requested: delta.memory,
                used: current.memory,
                limit: self.memory,
            });
        }
        over(
            Resource::StreamsInbound,
            current.num_streams_inbound,
            delta.num_streams_inbound,
            self.streams_inbound,
        )
        .or_else(|| {
            over(
                Resource::StreamsOutbound,
                current.num_streams_outbound,
                delta.num_streams_outbound,
                self.streams_outbound,
            )
        })
        .or_else(|| {
            over(
                Resource::Streams,
                current.num_streams(),
                delta.num_streams(),
                self.streams,
            )
        })
        .or_else(|| {
            over(
                Resource::ConnsInbound,
                current.num_conns_inbound,
                delta.num_conns_inbound,
                self.conns_inbound,
            )
        })
        .or_else(|| {
            over(
                Resource::ConnsOutbound,
                current.num_conns_outbound,
                delta.num_conns_outbound,
                self.conns_outbound,
            )
        })
        .or_else(|| over(Resource::Conns, current.num_conns(), delta.num_conns(), self.conns))
        .or_else(|| over(Resource::FileDescriptors, current.num_fd, delta.num_fd, self.fd))
    }
}

/// Supplies the ceilings for a scope.
///
/// Transactions are never passed to the policy: they inherit the limit of the
/// scope they were begun from.
pub trait LimitPolicy: Send + Sync + 'static {
    fn limit(&self, scope: &ScopeName) -> Limit;
}

/// Enforces nothing. Every scope gets `Limit::unlimited()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnlimitedPolicy;

impl LimitPolicy for UnlimitedPolicy {
    fn limit(&self, _scope: &ScopeName) -> Limit {
        Limit::unlimited()
    }
}

impl<F> LimitPolicy for F
where
    F: Fn(&ScopeName) -> Limit + Send + Sync + 'static,
{
    fn limit(&self, scope: &ScopeName) -> Limit {
        self(scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Direction;

    #[test]
    fn memory_ceiling_is_inclusive() {
        let l = Limit::memory_only(100);
        assert!(l.check(&ScopeStat::memory(60), &ScopeStat::memory(40)).is_none());
        let v = l
            .check(&ScopeStat::memory(60), &ScopeStat::memory(41))
            .expect("should exceed");
        assert_eq!(v.resource, Resource::Memory);
        assert_eq!(v.used, 60);
        assert_eq!(v.requested, 41);
    }

    #[test]
    fn directional_checked_before_total() {
        let l = Limit {
            streams: 3,
            streams_outbound: 1,
            ..Limit::unlimited()
        };
        let cur = ScopeStat::stream(Direction::Outbound);
        let v = l.check(&cur, &ScopeStat::stream(Direction::Outbound)).unwrap();
        assert_eq!(v.resource, Resource::StreamsOutbound);

        let mut cur = ScopeStat::default();
        cur.num_streams_inbound = 3;
        let v = l.check(&cur, &ScopeStat::stream(Direction::Inbound)).unwrap();
        assert_eq!(v.resource, Resource::Streams);
    }

    #[test]
    fn untouched_dimensions_are_not_checked() {
        let l = Limit {
            fd: 0,
            ..Limit::unlimited()
        };
        let mut cur = ScopeStat::default();
        cur.num_fd = 5;
        assert!(l.check(&cur, &ScopeStat::memory(1)).is_none());
        let v = l.check(&cur, &ScopeStat::conn(Direction::Inbound, true)).unwrap();
        assert_eq!(v.resource, Resource::FileDescriptors);
    }

    #[test]
    fn closures_are_policies() {
        let policy = |name: &ScopeName| match name {
            ScopeName::System => Limit::memory_only(10),
            _ => Limit::unlimited(),
        };
        assert_eq!(policy.limit(&ScopeName::System).memory, 10);
        assert_eq!(UnlimitedPolicy.limit(&ScopeName::Transient), Limit::unlimited());
    }
}
