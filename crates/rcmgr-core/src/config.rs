//! Limit configuration that downstream crates can serialize/deserialize.
//!
//! `LimitConfig` is the stock `LimitPolicy`: fixed ceilings per scope kind,
//! with optional per-name overrides for services, protocols, and peers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::limits::{Limit, LimitPolicy};
use crate::types::ScopeName;

const KIB: i64 = 1024;
const MIB: i64 = 1024 * KIB;
const GIB: i64 = 1024 * MIB;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitConfig {
    /// Global hard limits. Every reservation in the stack is charged here.
    pub system: Limit,

    /// Connections before the handshake and streams before negotiation.
    pub transient: Limit,

    /// Applied to any service without an override.
    pub service_default: Limit,
    pub protocol_default: Limit,
    pub peer_default: Limit,

    /// Per connection and per stream scope.
    pub conn: Limit,
    pub stream: Limit,

    pub service_overrides: HashMap<String, Limit>,
    pub protocol_overrides: HashMap<String, Limit>,
    pub peer_overrides: HashMap<String, Limit>,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            system: Limit {
                memory: GIB,
                streams: 16 * 1024,
                streams_inbound: 4 * 1024,
                streams_outbound: 16 * 1024,
                conns: 1024,
                conns_inbound: 256,
                conns_outbound: 1024,
                fd: 512,
            },
            transient: Limit {
                memory: 128 * MIB,
                streams: 512,
                streams_inbound: 128,
                streams_outbound: 512,
                conns: 128,
                conns_inbound: 32,
                conns_outbound: 128,
                fd: 128,
            },
            service_default: Limit {
                memory: 64 * MIB,
                streams: 8 * 1024,
                streams_inbound: 2 * 1024,
                streams_outbound: 8 * 1024,
                ..Limit::unlimited()
            },
            protocol_default: Limit {
                memory: 64 * MIB,
                streams: 4 * 1024,
                streams_inbound: 1024,
                streams_outbound: 4 * 1024,
                ..Limit::unlimited()
            },
            peer_default: Limit {
                memory: 64 * MIB,
                streams: 1024,
                streams_inbound: 512,
                streams_outbound: 1024,
                conns: 16,
                conns_inbound: 8,
                conns_outbound: 16,
                fd: 8,
            },
            conn: Limit {
                memory: MIB,
                streams: 0,
                streams_inbound: 0,
                streams_outbound: 0,
                conns: 1,
                conns_inbound: 1,
                conns_outbound: 1,
                fd: 1,
            },
            stream: Limit {
                memory: 16 * MIB,
                streams: 1,
                streams_inbound: 1,
                streams_outbound: 1,
                conns: 0,
                conns_inbound: 0,
                conns_outbound: 0,
                fd: 0,
            },
            service_overrides: HashMap::new(),
            protocol_overrides: HashMap::new(),
            peer_overrides: HashMap::new(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

/// Overlay `RCMGR_<PREFIX>_{MEMORY,STREAMS,CONNS,FD}` onto `limit`.
fn overlay_env(prefix: &str, limit: &mut Limit) {
    if let Some(v) = env_parse::<i64>(&format!("RCMGR_{prefix}_MEMORY")) {
        limit.memory = v;
    }
    if let Some(v) = env_parse::<usize>(&format!("RCMGR_{prefix}_STREAMS")) {
        limit.streams = v;
    }
    if let Some(v) = env_parse::<usize>(&format!("RCMGR_{prefix}_CONNS")) {
        limit.conns = v;
    }
    if let Some(v) = env_parse::<usize>(&format!("RCMGR_{prefix}_FD")) {
        limit.fd = v;
    }
}

impl LimitConfig {
    /// Defaults, overridden by any `RCMGR_*` environment variables that parse.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        overlay_env("SYSTEM", &mut cfg.system);
        overlay_env("TRANSIENT", &mut cfg.transient);
        overlay_env("SERVICE", &mut cfg.service_default);
        overlay_env("PROTOCOL", &mut cfg.protocol_default);
        overlay_env("PEER", &mut cfg.peer_default);
        overlay_env("CONN", &mut cfg.conn);
        overlay_env("STREAM", &mut cfg.stream);
        cfg
    }

    /// Parse a JSON document; missing fields fall back to the defaults.
    pub fn from_json(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let named = [
            ("system", &self.system),
            ("transient", &self.transient),
            ("service_default", &self.service_default),
            ("protocol_default", &self.protocol_default),
            ("peer_default", &self.peer_default),
            ("conn", &self.conn),
            ("stream", &self.stream),
        ];
        let overrides = self
            .service_overrides
            .iter()
            .chain(self.protocol_overrides.iter())
            .chain(self.peer_overrides.iter())
            .map(|(k, v)| (k.as_str(), v));

        for (name, limit) in named.into_iter().chain(overrides) {
            if limit.memory < 0 {
                return Err(Error::Config(format!(
                    "negative memory limit for '{name}': {}",
                    limit.memory
                )));
            }
        }
        Ok(())
    }
}

impl LimitPolicy for LimitConfig {
    fn limit(&self, scope: &ScopeName) -> Limit {
        match scope {
            ScopeName::System => self.system,
            ScopeName::Transient => self.transient,
            ScopeName::Service(name) => *self
                .service_overrides
                .get(name)
                .unwrap_or(&self.service_default),
            ScopeName::Protocol(p) => *self
                .protocol_overrides
                .get(p.as_str())
                .unwrap_or(&self.protocol_default),
            ScopeName::Peer(p) => *self
                .peer_overrides
                .get(p.as_str())
                .unwrap_or(&self.peer_default),
            ScopeName::Connection(_) => self.conn,
            ScopeName::Stream(_) => self.stream,
            ScopeName::Transaction(_) => Limit::unlimited(),
        }
    }
}
