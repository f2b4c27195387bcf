use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{
    core::route_table::{Route, RouteSnapshot},
    ports::route_source::{RouteSource, RouteSourceError, RouteSourceResult, coerce_port},
};

/// Route source backed by a JSON file mapping session ids to targets.
///
/// ```json
/// {
///   "3f2a...": { "host": "10.0.0.5", "port": 8888 },
///   "9bc1...": { "host": "10.0.0.6", "port": "8889", "container_ids": ["..."] },
///   "77de...": "10.0.0.7:8890"
/// }
/// ```
#[derive(Debug, Clone)]
pub struct JsonRouteSource {
    path: PathBuf,
}

impl JsonRouteSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RouteSource for JsonRouteSource {
    async fn load(&self) -> RouteSourceResult<RouteSnapshot> {
        let display = self.path.display().to_string();
        let contents =
            tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|source| RouteSourceError::Io {
                    path: display.clone(),
                    source,
                })?;

        parse_routes(&display, &contents)
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn kind(&self) -> &'static str {
        "json"
    }
}

/// Parse a JSON session map into a snapshot.
///
/// The whole document is rejected if any entry is malformed.
pub fn parse_routes(path: &str, contents: &str) -> RouteSourceResult<RouteSnapshot> {
    let entries: Map<String, Value> =
        serde_json::from_str(contents).map_err(|source| RouteSourceError::Json {
            path: path.to_string(),
            source,
        })?;

    entries
        .into_iter()
        .map(|(session, entry)| {
            let route = parse_entry(&session, entry)?;
            Ok((session, route))
        })
        .collect()
}

fn parse_entry(session: &str, entry: Value) -> RouteSourceResult<Route> {
    match entry {
        Value::String(shorthand) => {
            let (host, port) =
                shorthand
                    .rsplit_once(':')
                    .ok_or_else(|| RouteSourceError::InvalidRoute {
                        session: session.to_string(),
                        message: format!("expected \"host:port\", got {shorthand:?}"),
                    })?;
            Ok(Route::new(host, coerce_port(session, port)?))
        }
        Value::Object(fields) => {
            let host = match fields.get("host") {
                Some(Value::String(host)) => host.clone(),
                other => {
                    return Err(RouteSourceError::InvalidRoute {
                        session: session.to_string(),
                        message: format!("missing or non-string host: {other:?}"),
                    });
                }
            };
            let port = match fields.get("port") {
                Some(Value::Number(n)) => coerce_port(session, &n.to_string())?,
                Some(Value::String(s)) => coerce_port(session, s)?,
                other => {
                    return Err(RouteSourceError::InvalidRoute {
                        session: session.to_string(),
                        message: format!("missing or invalid port: {other:?}"),
                    });
                }
            };
            Ok(Route::new(host, port))
        }
        other => Err(RouteSourceError::InvalidRoute {
            session: session.to_string(),
            message: format!("expected an object or \"host:port\" string, got {other}"),
        }),
    }
}
