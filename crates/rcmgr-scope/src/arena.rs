//! Scope arena: every scope record of one manager, addressed by `ScopeId`.
//!
//! Records hold their own counters and a list of parent handles. A reservation
//! on a scope is checked against the scope itself and every distinct ancestor
//! reachable through its parents, and is committed only if all of them
//! accept. The whole check-and-commit runs under the arena lock, so two
//! concurrent reservations can never both pass a shared ancestor's check and
//! together exceed its limit.
//!
//! Re-parenting (SetPeer/SetProtocol/SetService) rewrites the parent list and
//! moves the scope's current usage from ancestors that left the chain to
//! ancestors that joined it. The moved usage is not re-checked.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rcmgr_core::error::{Error, Result};
use rcmgr_core::id::{PeerId, ProtocolId, ScopeId};
use rcmgr_core::limits::{Limit, LimitPolicy};
use rcmgr_core::types::{Direction, MemoryStatus, ScopeName, ScopeStat};

use crate::tracking::{PeakTracker, PeakUsage};

const SYSTEM: ScopeId = ScopeId::new(0);
const TRANSIENT: ScopeId = ScopeId::new(1);

struct ScopeRecord {
    name: ScopeName,
    /// Everything charged here, including usage of descendants.
    stat: ScopeStat,
    /// Only what was reserved on this scope itself; the release ceiling.
    own: ScopeStat,
    parents: Vec<ScopeId>,
    /// Open transactions begun from this scope.
    children: Vec<ScopeId>,
    peer: Option<ScopeId>,
    protocol: Option<ScopeId>,
    service: Option<ScopeId>,
}

impl ScopeRecord {
    fn new(name: ScopeName, parents: Vec<ScopeId>) -> Self {
        Self {
            name,
            stat: ScopeStat::default(),
            own: ScopeStat::default(),
            parents,
            children: Vec::new(),
            peer: None,
            protocol: None,
            service: None,
        }
    }

    /// Parents of a stream once it has left the transient scope.
    fn negotiated_parents(&self) -> Vec<ScopeId> {
        [self.peer, self.protocol, self.service]
            .into_iter()
            .flatten()
            .collect()
    }
}

struct ArenaState {
    next_id: u64,
    records: HashMap<ScopeId, ScopeRecord>,
    services: HashMap<String, ScopeId>,
    protocols: HashMap<ProtocolId, ScopeId>,
    peers: HashMap<PeerId, ScopeId>,
    closed: bool,
}

fn closed_scope(id: ScopeId) -> Error {
    Error::ScopeClosed {
        scope: id.to_string(),
    }
}

impl ArenaState {
    fn new() -> Self {
        let mut records = HashMap::new();
        records.insert(SYSTEM, ScopeRecord::new(ScopeName::System, Vec::new()));
        records.insert(
            TRANSIENT,
            ScopeRecord::new(ScopeName::Transient, vec![SYSTEM]),
        );
        Self {
            next_id: 2,
            records,
            services: HashMap::new(),
            protocols: HashMap::new(),
            peers: HashMap::new(),
            closed: false,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::ManagerClosed)
        } else {
            Ok(())
        }
    }

    fn record(&self, id: ScopeId) -> Result<&ScopeRecord> {
        self.ensure_open()?;
        self.records.get(&id).ok_or_else(|| closed_scope(id))
    }

    fn record_mut(&mut self, id: ScopeId) -> Result<&mut ScopeRecord> {
        self.ensure_open()?;
        self.records.get_mut(&id).ok_or_else(|| closed_scope(id))
    }

    fn insert(&mut self, name: impl FnOnce(ScopeId) -> ScopeName, parents: Vec<ScopeId>) -> ScopeId {
        let id = ScopeId::new(self.next_id);
        self.next_id += 1;
        self.records.insert(id, ScopeRecord::new(name(id), parents));
        id
    }

    fn service(&mut self, name: &str) -> ScopeId {
        if let Some(id) = self.services.get(name) {
            return *id;
        }
        let owned = name.to_string();
        let id = self.insert(|_| ScopeName::Service(owned), vec![SYSTEM]);
        self.services.insert(name.to_string(), id);
        id
    }

    fn protocol(&mut self, proto: &ProtocolId) -> ScopeId {
        if let Some(id) = self.protocols.get(proto) {
            return *id;
        }
        let owned = proto.clone();
        let id = self.insert(|_| ScopeName::Protocol(owned), vec![SYSTEM]);
        self.protocols.insert(proto.clone(), id);
        id
    }

    fn peer(&mut self, peer: &PeerId) -> ScopeId {
        if let Some(id) = self.peers.get(peer) {
            return *id;
        }
        let owned = peer.clone();
        let id = self.insert(|_| ScopeName::Peer(owned), vec![SYSTEM]);
        self.peers.insert(peer.clone(), id);
        id
    }

    /// Distinct ancestors of `id`, nearest first. A scope reachable through
    /// several parents appears once.
    fn ancestors(&self, id: ScopeId) -> Vec<ScopeId> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut queue: VecDeque<ScopeId> = self
            .records
            .get(&id)
            .map(|r| r.parents.iter().copied().collect())
            .unwrap_or_default();

        while let Some(next) = queue.pop_front() {
            if !seen.insert(next) {
                continue;
            }
            out.push(next);
            if let Some(rec) = self.records.get(&next) {
                queue.extend(rec.parents.iter().copied());
            }
        }
        out
    }

    /// Transactions are bounded by the limit of the scope they were begun from.
    fn limit_of(&self, policy: &dyn LimitPolicy, mut id: ScopeId) -> Limit {
        loop {
            let Some(rec) = self.records.get(&id) else {
                return Limit::unlimited();
            };
            match (&rec.name, rec.parents.first()) {
                (ScopeName::Transaction(_), Some(parent)) => id = *parent,
                (name, _) => return policy.limit(name),
            }
        }
    }

    /// All-or-nothing reservation of `delta` on `id` and its ancestors.
    fn reserve(&mut self, policy: &dyn LimitPolicy, id: ScopeId, delta: &ScopeStat) -> Result<()> {
        self.record(id)?;
        let mut chain = vec![id];
        chain.extend(self.ancestors(id));

        for sid in &chain {
            let Some(rec) = self.records.get(sid) else {
                continue;
            };
            let limit = self.limit_of(policy, *sid);
            if let Some(v) = limit.check(&rec.stat, delta) {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    scope = %rec.name,
                    resource = %v.resource,
                    requested = v.requested,
                    used = v.used,
                    limit = v.limit,
                    "reservation rejected"
                );
                return Err(Error::LimitExceeded {
                    scope: rec.name.to_string(),
                    resource: v.resource,
                    requested: v.requested,
                    used: v.used,
                    limit: v.limit,
                });
            }
        }

        for sid in &chain {
            if let Some(rec) = self.records.get_mut(sid) {
                rec.stat.add(delta);
            }
        }
        if let Some(rec) = self.records.get_mut(&id) {
            rec.own.add(delta);
        }
        Ok(())
    }

    /// Release `delta` from `id` and its ancestors, clamping at zero.
    ///
    /// The amount is first capped at what was reserved on `id` directly. Usage
    /// of descendants (child transactions, streams under a peer) is released by
    /// their own `done`, so releasing it here would subtract it twice from
    /// every shared ancestor.
    fn release(&mut self, id: ScopeId, delta: &ScopeStat) {
        let Some(rec) = self.records.get_mut(&id) else {
            return;
        };
        let effective = delta.clamped_to(&rec.own);
        if effective != *delta {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                scope = %rec.name,
                requested = delta.memory,
                held = rec.own.memory,
                "released more than was reserved; release capped at held amount"
            );
        }
        rec.own.sub_clamped(&effective);
        let mut chain = vec![id];
        chain.extend(self.ancestors(id));
        for sid in chain {
            self.release_one(sid, &effective);
        }
    }

    fn release_one(&mut self, id: ScopeId, delta: &ScopeStat) {
        if let Some(rec) = self.records.get_mut(&id) {
            if !rec.stat.sub_clamped(delta) {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    scope = %rec.name,
                    memory = delta.memory,
                    "released more than was reserved; counters clamped at zero"
                );
            }
        }
    }

    fn begin_transaction(&mut self, parent: ScopeId) -> Result<ScopeId> {
        self.record(parent)?;
        let id = self.insert(ScopeName::Transaction, vec![parent]);
        if let Some(rec) = self.records.get_mut(&parent) {
            rec.children.push(id);
        }
        Ok(id)
    }

    /// Close an owned scope: first its open child transactions, then its own
    /// remaining usage is released from every ancestor.
    fn done(&mut self, id: ScopeId) {
        let children = match self.records.get(&id) {
            Some(rec) if rec.name.is_owned() => rec.children.clone(),
            _ => return,
        };
        for child in children {
            self.done(child);
        }

        let ancestors = self.ancestors(id);
        let Some(rec) = self.records.remove(&id) else {
            return;
        };
        for sid in ancestors {
            self.release_one(sid, &rec.stat);
        }
        if let (ScopeName::Transaction(_), Some(parent)) = (&rec.name, rec.parents.first()) {
            if let Some(p) = self.records.get_mut(parent) {
                p.children.retain(|c| *c != id);
            }
        }
    }

    /// Replace the parents of `id`, moving its usage to the new chain.
    fn reparent(&mut self, id: ScopeId, parents: Vec<ScopeId>) -> Result<()> {
        let old: HashSet<ScopeId> = self.ancestors(id).into_iter().collect();
        let stat = {
            let rec = self.record_mut(id)?;
            rec.parents = parents;
            rec.stat
        };
        let new: HashSet<ScopeId> = self.ancestors(id).into_iter().collect();

        for sid in old.difference(&new) {
            self.release_one(*sid, &stat);
        }
        for sid in new.difference(&old) {
            if let Some(rec) = self.records.get_mut(sid) {
                rec.stat.add(&stat);
            }
        }
        Ok(())
    }

    /// Release every owned scope and zero all remaining counters.
    fn close(&mut self) -> usize {
        let owned: Vec<ScopeId> = self
            .records
            .iter()
            .filter(|(_, r)| r.name.is_owned())
            .map(|(id, _)| *id)
            .collect();
        let count = owned.len();
        for id in owned {
            self.done(id);
        }
        for rec in self.records.values_mut() {
            rec.stat = ScopeStat::default();
            rec.own = ScopeStat::default();
            rec.children.clear();
        }
        self.closed = true;
        count
    }
}

/// The resource-constraint DAG of one manager.
pub struct ScopeArena {
    policy: Box<dyn LimitPolicy>,
    state: Mutex<ArenaState>,
    peak: PeakTracker,
}

impl ScopeArena {
    pub fn new(policy: impl LimitPolicy) -> Self {
        Self {
            policy: Box::new(policy),
            state: Mutex::new(ArenaState::new()),
            peak: PeakTracker::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ArenaState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn observe_system(&self, st: &ArenaState) {
        if let Some(sys) = st.records.get(&SYSTEM) {
            self.peak.observe(&sys.stat);
        }
    }

    pub fn system(&self) -> ScopeId {
        SYSTEM
    }

    pub fn transient(&self) -> ScopeId {
        TRANSIENT
    }

    /// Look up or lazily create the scope for service `name`.
    pub fn service(&self, name: &str) -> Result<ScopeId> {
        let mut st = self.lock();
        st.ensure_open()?;
        Ok(st.service(name))
    }

    pub fn protocol(&self, proto: &ProtocolId) -> Result<ScopeId> {
        let mut st = self.lock();
        st.ensure_open()?;
        Ok(st.protocol(proto))
    }

    pub fn peer(&self, peer: &PeerId) -> Result<ScopeId> {
        let mut st = self.lock();
        st.ensure_open()?;
        Ok(st.peer(peer))
    }

    /// Names of the immediate parents of `id`.
    pub fn parents(&self, id: ScopeId) -> Vec<ScopeName> {
        let st = self.lock();
        st.records
            .get(&id)
            .map(|r| {
                r.parents
                    .iter()
                    .filter_map(|p| st.records.get(p).map(|pr| pr.name.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_open(&self, id: ScopeId) -> bool {
        let st = self.lock();
        !st.closed && st.records.contains_key(&id)
    }

    pub fn reserve_memory(&self, id: ScopeId, size: usize) -> Result<MemoryStatus> {
        let mut st = self.lock();
        st.record(id)?;
        let size = i64::try_from(size).unwrap_or(i64::MAX);
        if size > 0 {
            st.reserve(&*self.policy, id, &ScopeStat::memory(size))?;
            self.observe_system(&st);
        }
        let used = st.records.get(&id).map(|r| r.stat.memory).unwrap_or(0);
        let limit = st.limit_of(&*self.policy, id);
        Ok(MemoryStatus::from_usage(used, limit.memory))
    }

    pub fn release_memory(&self, id: ScopeId, size: usize) {
        let size = i64::try_from(size).unwrap_or(i64::MAX);
        if size == 0 {
            return;
        }
        let mut st = self.lock();
        if st.closed {
            return;
        }
        st.release(id, &ScopeStat::memory(size));
    }

    /// Counters of `id` alone. Closed scopes report zeros.
    pub fn stat(&self, id: ScopeId) -> ScopeStat {
        self.lock()
            .records
            .get(&id)
            .map(|r| r.stat)
            .unwrap_or_default()
    }

    pub fn begin_transaction(&self, parent: ScopeId) -> Result<ScopeId> {
        self.lock().begin_transaction(parent)
    }

    /// Close an owned scope (transaction, connection, or stream). Idempotent;
    /// ids of named scopes are ignored.
    pub fn done(&self, id: ScopeId) {
        let mut st = self.lock();
        if st.closed {
            return;
        }
        st.done(id);
    }

    /// New connection scope under Transient, holding one connection slot and
    /// optionally one fd. Nothing is left behind on failure.
    pub fn open_connection(&self, dir: Direction, usefd: bool) -> Result<ScopeId> {
        let mut st = self.lock();
        st.ensure_open()?;
        let id = st.insert(ScopeName::Connection, vec![TRANSIENT]);
        if let Err(e) = st.reserve(&*self.policy, id, &ScopeStat::conn(dir, usefd)) {
            st.records.remove(&id);
            return Err(e);
        }
        self.observe_system(&st);
        Ok(id)
    }

    /// New stream scope constrained by both Transient and the peer's scope.
    pub fn open_stream(&self, peer: &PeerId, dir: Direction) -> Result<ScopeId> {
        let mut st = self.lock();
        st.ensure_open()?;
        let peer_id = st.peer(peer);
        let id = st.insert(ScopeName::Stream, vec![peer_id, TRANSIENT]);
        if let Some(rec) = st.records.get_mut(&id) {
            rec.peer = Some(peer_id);
        }
        if let Err(e) = st.reserve(&*self.policy, id, &ScopeStat::stream(dir)) {
            st.records.remove(&id);
            return Err(e);
        }
        self.observe_system(&st);
        Ok(id)
    }

    /// Move a connection from Transient (or a previous peer) under `peer`.
    pub fn set_peer(&self, id: ScopeId, peer: &PeerId) -> Result<()> {
        let mut st = self.lock();
        st.record(id)?;
        let peer_id = st.peer(peer);
        st.record_mut(id)?.peer = Some(peer_id);
        st.reparent(id, vec![peer_id])
    }

    /// Attach a stream to `proto`, detaching it from Transient.
    pub fn set_protocol(&self, id: ScopeId, proto: &ProtocolId) -> Result<()> {
        let mut st = self.lock();
        st.record(id)?;
        let proto_id = st.protocol(proto);
        let rec = st.record_mut(id)?;
        rec.protocol = Some(proto_id);
        let parents = rec.negotiated_parents();
        st.reparent(id, parents)
    }

    /// Attach a stream to service `name`, detaching it from Transient.
    pub fn set_service(&self, id: ScopeId, name: &str) -> Result<()> {
        let mut st = self.lock();
        st.record(id)?;
        let svc_id = st.service(name);
        let rec = st.record_mut(id)?;
        rec.service = Some(svc_id);
        let parents = rec.negotiated_parents();
        st.reparent(id, parents)
    }

    pub fn peer_of(&self, id: ScopeId) -> Option<PeerId> {
        let st = self.lock();
        let pid = st.records.get(&id)?.peer?;
        match &st.records.get(&pid)?.name {
            ScopeName::Peer(p) => Some(p.clone()),
            _ => None,
        }
    }

    pub fn protocol_of(&self, id: ScopeId) -> Option<ProtocolId> {
        let st = self.lock();
        let pid = st.records.get(&id)?.protocol?;
        match &st.records.get(&pid)?.name {
            ScopeName::Protocol(p) => Some(p.clone()),
            _ => None,
        }
    }

    pub fn service_of(&self, id: ScopeId) -> Option<String> {
        let st = self.lock();
        let sid = st.records.get(&id)?.service?;
        match &st.records.get(&sid)?.name {
            ScopeName::Service(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Names and counters of every live scope.
    pub fn stats(&self) -> Vec<(ScopeName, ScopeStat)> {
        self.lock()
            .records
            .values()
            .map(|r| (r.name.clone(), r.stat))
            .collect()
    }

    /// Force-release every open owned scope and refuse further work.
    ///
    /// Returns the number of owned scopes that were still open. Idempotent.
    pub fn close(&self) -> usize {
        let mut st = self.lock();
        if st.closed {
            return 0;
        }
        st.close()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// High-water mark of System memory.
    pub fn peak_memory(&self) -> i64 {
        self.peak.memory()
    }

    /// High-water marks of every System dimension.
    pub fn peak_usage(&self) -> PeakUsage {
        self.peak.usage()
    }
}
