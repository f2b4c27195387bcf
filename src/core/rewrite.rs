//! Request and response header rewrites applied around every proxied exchange.
//!
//! Two kinds of massaging happen here:
//! * backend compatibility shims on the outgoing request (a fixed,
//!   enumerable list keyed by a URL substring)
//! * response fix-ups: CORS credentials for the UI origin and, in
//!   reverse-proxy mode, restoring the external port on `localhost` redirects
use http::{HeaderMap, HeaderValue, StatusCode, header, request};

/// Content type RStudio rejects; it only accepts the bare form.
const FORM_URLENCODED_WITH_CHARSET: &str = "application/x-www-form-urlencoded; charset=UTF-8";
const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// URL substrings selecting backends whose HTTP parser needs mixed-case
/// header names.
const CASE_SENSITIVE_BACKENDS: &[&str] = &["rstudio"];

const LOCALHOST_PREFIX: &str = "http://localhost/";

/// How header names are spelled on the wire towards the backend.
///
/// `http::HeaderMap` always stores names lowercased; a request carrying
/// `HeaderCase::Title` in its extensions is written with `Content-Type`
/// style names by the upstream client instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HeaderCase {
    #[default]
    Lower,
    Title,
}

impl HeaderCase {
    /// Case requested for the request, defaulting to lowercase.
    pub fn of<B>(req: &http::Request<B>) -> Self {
        req.extensions().get::<HeaderCase>().copied().unwrap_or_default()
    }
}

/// Apply backend-specific compatibility rewrites to an outgoing request.
///
/// Returns `true` if anything changed. Calling it again on the same request
/// is a no-op.
pub fn rewrite_request(parts: &mut request::Parts) -> bool {
    let url = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| parts.uri.path());

    if !CASE_SENSITIVE_BACKENDS
        .iter()
        .any(|needle| url.contains(needle))
    {
        return false;
    }

    let mut changed = false;

    if parts.extensions.get::<HeaderCase>() != Some(&HeaderCase::Title) {
        parts.extensions.insert(HeaderCase::Title);
        changed = true;
    }

    let needs_plain_form = parts
        .headers
        .get(header::CONTENT_TYPE)
        .is_some_and(|value| value.as_bytes() == FORM_URLENCODED_WITH_CHARSET.as_bytes());
    if needs_plain_form {
        parts.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(FORM_URLENCODED),
        );
        changed = true;
    }

    changed
}

/// Response header rewrite settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseRewrite {
    /// Externally visible port; `Some` enables `Location` rewriting.
    pub reverse_proxy_port: Option<u16>,
}

impl ResponseRewrite {
    pub fn new(reverse_proxy: bool, external_port: u16) -> Self {
        Self {
            reverse_proxy_port: reverse_proxy.then_some(external_port),
        }
    }

    /// Rewrite the headers of an upstream response before it reaches the
    /// client. Failures are logged and leave the offending header untouched.
    pub fn apply(&self, status: StatusCode, headers: &mut HeaderMap, origin: Option<&HeaderValue>) {
        if let Some(port) = self.reverse_proxy_port {
            if status == StatusCode::FOUND {
                rewrite_location(headers, port);
            }
        }
        apply_cors(headers, origin);
    }
}

/// Turn `Location: http://localhost/...` into `http://localhost:<port>/...`.
pub fn rewrite_location(headers: &mut HeaderMap, port: u16) {
    let Some(location) = headers.get(header::LOCATION) else {
        return;
    };
    let Ok(location) = location.to_str() else {
        tracing::warn!("Skipping Location rewrite: header is not valid UTF-8");
        return;
    };
    let Some(rest) = location.strip_prefix(LOCALHOST_PREFIX) else {
        return;
    };

    let rewritten = format!("http://localhost:{port}/{rest}");
    match HeaderValue::from_str(&rewritten) {
        Ok(value) => {
            tracing::debug!(from = %location, to = %rewritten, "Rewrote redirect location");
            headers.insert(header::LOCATION, value);
        }
        Err(e) => tracing::warn!("Failed to rewrite Location header {}: {}", location, e),
    }
}

/// Allow credentialed cross-origin access from the requesting origin.
pub fn apply_cors(headers: &mut HeaderMap, origin: Option<&HeaderValue>) {
    if let Some(origin) = origin {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
}
