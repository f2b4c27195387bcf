use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response};
use thiserror::Error;

use crate::core::route_table::Target;

/// Custom error type for upstream HTTP operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpClientError {
    /// Error when connection to the backend fails
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error when the backend does not answer in time
    #[error("Timeout error after {0:?}")]
    Timeout(Duration),

    /// Error when the request cannot be forwarded as built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type alias for HTTP client operations
pub type HttpClientResult<T> = Result<T, HttpClientError>;

/// HttpClient defines the port (interface) for forwarding requests to a
/// session's backend
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Forward an ordinary HTTP request to `target`.
    ///
    /// The request URI is expected in origin form (`/path?query`); the
    /// implementation points it at the target.
    async fn send_request(
        &self,
        target: &Target,
        req: Request<AxumBody>,
    ) -> HttpClientResult<Response<AxumBody>>;

    /// Forward a protocol upgrade handshake (WebSocket) to `target`.
    ///
    /// On `101 Switching Protocols` the implementation relays bytes between
    /// the client's and the backend's upgraded connections until either side
    /// closes, and returns the backend's response to be sent to the client.
    async fn send_upgrade(
        &self,
        target: &Target,
        req: Request<AxumBody>,
    ) -> HttpClientResult<Response<AxumBody>>;
}
