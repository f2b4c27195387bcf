//! Session cookie extraction and route resolution.
use std::sync::Arc;

use http::{HeaderMap, header};

use crate::core::route_table::{RouteTable, Target};

/// Default name of the cookie carrying the session id.
pub const DEFAULT_SESSION_COOKIE: &str = "galaxysession";

/// Resolves requests to backend targets through the session cookie.
///
/// Holds a reference to the live [`RouteTable`]; it never copies the table,
/// so reloads performed by the watcher are visible on the next request.
#[derive(Debug, Clone)]
pub struct SessionRouter {
    cookie_name: String,
    routes: Arc<RouteTable>,
    verbose: bool,
}

impl SessionRouter {
    pub fn new(cookie_name: impl Into<String>, routes: Arc<RouteTable>, verbose: bool) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            routes,
            verbose,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    /// Extract the session id from the request's `Cookie` header(s).
    ///
    /// Returns `None` when there is no `Cookie` header or none of the cookies
    /// carries the configured name.
    pub fn find_session(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|raw| find_cookie(raw, &self.cookie_name))
    }

    /// Look up the target for the request's session.
    pub fn target_for_request(&self, headers: &HeaderMap) -> Option<Target> {
        let session_id = self.find_session(headers)?;
        let target = self.routes.target(&session_id);

        if self.verbose {
            match &target {
                Some(target) => {
                    tracing::debug!(session = %session_id, target = %target, "Resolved session route")
                }
                None => tracing::debug!(session = %session_id, "No route for session"),
            }
        }

        target
    }
}

/// Find `name` in a single `Cookie` header value and URL-unescape its value.
fn find_cookie(raw: &str, name: &str) -> Option<String> {
    raw.split(';').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key.trim() != name {
            return None;
        }
        let value = value.trim();
        Some(match urlencoding::decode(value) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => value.to_string(),
        })
    })
}
