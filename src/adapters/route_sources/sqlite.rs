use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::{Connection, OpenFlags, types::Value};

use crate::{
    core::route_table::{Route, RouteSnapshot},
    ports::route_source::{RouteSource, RouteSourceError, RouteSourceResult, coerce_port},
};

const SELECT_ROUTES: &str = "SELECT key, host, port FROM gxproxy2";

/// Route source backed by the `gxproxy2(key, host, port)` SQLite table.
///
/// Every load opens a fresh read-only connection and closes it again, so no
/// handle is held between reloads.
#[derive(Debug, Clone)]
pub struct SqliteRouteSource {
    path: PathBuf,
}

impl SqliteRouteSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RouteSource for SqliteRouteSource {
    async fn load(&self) -> RouteSourceResult<RouteSnapshot> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || load_blocking(&path))
            .await
            .map_err(|e| RouteSourceError::Task(e.to_string()))?
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn kind(&self) -> &'static str {
        "sqlite"
    }
}

fn load_blocking(path: &Path) -> RouteSourceResult<RouteSnapshot> {
    let display = path.display().to_string();
    let sqlite_err = |source: rusqlite::Error| RouteSourceError::Sqlite {
        path: display.clone(),
        source,
    };

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(sqlite_err)?;

    let mut snapshot = RouteSnapshot::new();
    {
        let mut stmt = conn.prepare(SELECT_ROUTES).map_err(sqlite_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Value>(2)?,
                ))
            })
            .map_err(sqlite_err)?;

        for row in rows {
            let (key, host, port) = row.map_err(sqlite_err)?;
            let port = match port {
                Value::Integer(n) => coerce_port(&key, &n.to_string())?,
                Value::Text(s) => coerce_port(&key, &s)?,
                other => {
                    return Err(RouteSourceError::InvalidPort {
                        session: key,
                        value: format!("{other:?}"),
                    });
                }
            };
            snapshot.insert(key, Route::new(host, port));
        }
    }

    conn.close().map_err(|(_, source)| sqlite_err(source))?;
    Ok(snapshot)
}
