use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::route_table::RouteSnapshot;

/// Error type for route source loading
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RouteSourceError {
    /// The source could not be read
    #[error("Failed to read route source {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The JSON document is malformed or has the wrong shape
    #[error("Invalid JSON in route source {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The SQLite database could not be opened or queried
    #[error("SQLite error in route source {path}: {source}")]
    Sqlite {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    /// An entry carries a port that is not a valid TCP port
    #[error("Invalid port {value:?} for session {session}")]
    InvalidPort { session: String, value: String },

    /// An entry could not be interpreted as a route
    #[error("Invalid route for session {session}: {message}")]
    InvalidRoute { session: String, message: String },

    /// The blocking loader task died
    #[error("Route loader task failed: {0}")]
    Task(String),
}

/// Result type for route source operations
pub type RouteSourceResult<T> = Result<T, RouteSourceError>;

/// RouteSource defines the port (interface) for loading the session map
/// from external storage.
///
/// A load either yields a complete snapshot or fails; implementations must
/// never hand back a partially parsed mapping.
#[async_trait]
pub trait RouteSource: Send + Sync {
    /// Load a full snapshot of the session → route mapping.
    async fn load(&self) -> RouteSourceResult<RouteSnapshot>;

    /// Path of the backing file, used for change detection.
    fn path(&self) -> &Path;

    /// Short name of the backend kind for logging.
    fn kind(&self) -> &'static str;
}

/// Coerce a port value read from a route source into a TCP port.
pub fn coerce_port(session: &str, value: &str) -> RouteSourceResult<u16> {
    match value.trim().parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(RouteSourceError::InvalidPort {
            session: session.to_string(),
            value: value.to_string(),
        }),
    }
}
