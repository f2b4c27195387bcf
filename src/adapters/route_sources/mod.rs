pub mod json;
pub mod sqlite;

use std::{path::Path, sync::Arc};

pub use json::JsonRouteSource;
pub use sqlite::SqliteRouteSource;

use crate::ports::route_source::RouteSource;

/// Pick the loader for a session map path: `.sqlite` files are read as
/// SQLite databases, anything else as JSON.
pub fn route_source_for_path(path: impl AsRef<Path>) -> Arc<dyn RouteSource> {
    let path = path.as_ref();
    if path.to_string_lossy().ends_with(".sqlite") {
        Arc::new(SqliteRouteSource::new(path))
    } else {
        Arc::new(JsonRouteSource::new(path))
    }
}
