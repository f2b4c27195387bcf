//! gxproxy - a session-routing HTTP and WebSocket reverse proxy.
//!
//! Every incoming request carries a session cookie (`galaxysession` by
//! default). gxproxy looks the session up in a route table and forwards the
//! request, or the WebSocket connection, to the backend registered for it.
//! The route table is fed from a session map on disk, either a JSON file or a
//! SQLite database with a `gxproxy2(key, host, port)` table, and is reloaded
//! whenever that file changes.
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations)
//! while keeping routing and rewrite logic inside `core`:
//! - [`core::RouteTable`] holds an atomically swapped snapshot of routes
//! - [`core::SessionRouter`] resolves a request's session cookie to a target
//! - [`adapters::RouteWatcher`] loads and reloads the session map
//! - [`adapters::HttpHandler`] proxies requests and upgrades via an
//!   [`HttpClient`]
//! - [`ProxyApp`] wires them together from a [`config::ProxyConfig`]
//!
//! # Quick Example
//! ```no_run
//! use gxproxy::{ProxyApp, config::ProxyConfig, utils::GracefulShutdown};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let config = ProxyConfig {
//!     sessions: Some("sessions.json".into()),
//!     ..Default::default()
//! };
//! let app = ProxyApp::from_config(&config).await?;
//! let listener = tokio::net::TcpListener::bind(("localhost", config.port)).await?;
//! app.serve(listener, GracefulShutdown::new()).await?;
//! # Ok(()) }
//! ```
//!
//! # Error Handling
//! Fallible application-level APIs return `eyre::Result<T>`; ports expose
//! `thiserror` error enums. Per-request failures never escape the handler:
//! an unknown session is a 404 and an unreachable backend a 502.
pub mod app;
pub mod config;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{HttpClientAdapter, HttpHandler, RouteWatcher, WatchOptions},
    app::ProxyApp,
    core::{RouteTable, SessionRouter},
    ports::http_client::HttpClient,
    utils::GracefulShutdown,
};
