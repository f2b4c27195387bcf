//! Shared session → backend route table.
//!
//! The table is the one piece of mutable state the proxy shares between the
//! reload task and request handlers. Reads go through [`ArcSwap::load`] and
//! never block; a reload builds a complete snapshot off to the side and swaps
//! it in with a single pointer store, so a request sees either the old or the
//! new mapping and never a half-applied one.
use std::{collections::HashMap, fmt, net::Ipv6Addr, sync::Arc};

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

/// Backend process a session is routed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port` authority used for the upstream connection.
    ///
    /// IPv6 literals are bracketed (`[::1]:8080`).
    pub fn authority(&self) -> String {
        if self.host.parse::<Ipv6Addr>().is_ok() {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority())
    }
}

/// A single route table entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub target: Target,
}

impl Route {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            target: Target::new(host, port),
        }
    }
}

/// Immutable snapshot of the whole mapping.
pub type RouteSnapshot = HashMap<String, Route>;

/// Outcome of reconciling a new snapshot against the previous one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    pub added: usize,
    pub removed: usize,
    pub updated: usize,
    pub total: usize,
}

impl ReloadSummary {
    pub fn is_unchanged(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.updated == 0
    }
}

/// Session id → [`Route`] mapping, replaced atomically on reload.
pub struct RouteTable {
    routes: ArcSwap<RouteSnapshot>,
}

impl RouteTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            routes: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Create a table pre-populated with `snapshot`.
    pub fn with_routes(snapshot: RouteSnapshot) -> Self {
        Self {
            routes: ArcSwap::from_pointee(snapshot),
        }
    }

    /// Exact-match lookup of a session id.
    pub fn get(&self, session_id: &str) -> Option<Route> {
        self.routes.load().get(session_id).cloned()
    }

    /// Exact-match lookup returning only the target.
    pub fn target(&self, session_id: &str) -> Option<Target> {
        self.routes
            .load()
            .get(session_id)
            .map(|route| route.target.clone())
    }

    pub fn len(&self) -> usize {
        self.routes.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.load().is_empty()
    }

    /// Current snapshot. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<RouteSnapshot> {
        self.routes.load_full()
    }

    /// Replace the table with `snapshot`.
    ///
    /// Keys missing from `snapshot` disappear, keys present are added or
    /// overwritten. The returned summary describes the difference to the
    /// snapshot that was replaced.
    pub fn replace(&self, snapshot: RouteSnapshot) -> ReloadSummary {
        let next = Arc::new(snapshot);
        let previous = self.routes.swap(next.clone());
        Self::diff(&previous, &next)
    }

    fn diff(previous: &RouteSnapshot, next: &RouteSnapshot) -> ReloadSummary {
        let mut summary = ReloadSummary {
            total: next.len(),
            ..ReloadSummary::default()
        };

        for (key, route) in next {
            match previous.get(key) {
                None => summary.added += 1,
                Some(old) if old != route => summary.updated += 1,
                Some(_) => {}
            }
        }
        summary.removed = previous.keys().filter(|k| !next.contains_key(*k)).count();

        summary
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field("routes", &self.len())
            .finish()
    }
}
