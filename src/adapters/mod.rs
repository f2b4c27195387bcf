pub mod http_client;
pub mod http_handler;
pub mod route_sources;
pub mod route_watcher;

/// Re-export commonly used types from adapters
pub use http_client::HttpClientAdapter;
pub use http_handler::{HttpHandler, build_router};
pub use route_sources::{JsonRouteSource, SqliteRouteSource, route_source_for_path};
pub use route_watcher::{RouteWatcher, WatchOptions};
