//! Configuration data structures for gxproxy.
//!
//! `ProxyConfig` maps directly to a TOML (also JSON / YAML) file, to
//! `GXPROXY_*` environment variables and to the command line flags. Every
//! field has a default so a config file may set as little as `sessions`.
use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{adapters::route_watcher::WatchOptions, core::session::DEFAULT_SESSION_COOKIE};

/// Top-level proxy configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Interface to bind the listener to
    pub ip: String,
    /// Port to listen on
    pub port: u16,
    /// Name of the cookie carrying the session id
    pub cookie: String,
    /// Session map: a JSON file, or a SQLite database if the name ends in `.sqlite`
    pub sessions: Option<PathBuf>,
    /// Rewrite `http://localhost/` redirects to include the listening port
    pub reverse_proxy: bool,
    /// Log session resolution and routing decisions
    pub verbose: bool,
    /// Upper bound on waiting for a backend's response headers
    pub upstream_timeout_secs: Option<u64>,
    /// Reload the session map on a timer as well as on change events
    pub poll_interval_secs: Option<u64>,
    /// Quiet period after a change event before reloading
    pub debounce_ms: u64,
    /// Emit logs as JSON lines instead of human-readable output
    pub log_json: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            ip: "localhost".to_string(),
            port: 8000,
            cookie: DEFAULT_SESSION_COOKIE.to_string(),
            sessions: None,
            reverse_proxy: false,
            verbose: false,
            upstream_timeout_secs: None,
            poll_interval_secs: None,
            debounce_ms: 100,
            log_json: false,
        }
    }
}

impl ProxyConfig {
    /// `ip:port` as given, for logging.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    pub fn upstream_timeout(&self) -> Option<Duration> {
        self.upstream_timeout_secs.map(Duration::from_secs)
    }

    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            debounce: Duration::from_millis(self.debounce_ms),
            poll_interval: self.poll_interval_secs.map(Duration::from_secs),
        }
    }
}
