//! Wires configuration, the route watcher and the HTTP handler into a
//! servable application.
use std::{net::SocketAddr, sync::Arc};

use axum::Router;
use eyre::{Result, WrapErr};
use tokio::net::TcpListener;

use crate::{
    adapters::{HttpClientAdapter, HttpHandler, RouteWatcher, build_router},
    config::models::ProxyConfig,
    core::{ResponseRewrite, RouteTable, SessionRouter},
    utils::GracefulShutdown,
};

/// A configured proxy: live routes plus the axum router that serves them.
pub struct ProxyApp {
    watcher: RouteWatcher,
    router: Router,
}

impl ProxyApp {
    /// Load the session map and assemble the handler stack.
    ///
    /// Fails if the session map cannot be loaded initially.
    pub async fn from_config(config: &ProxyConfig) -> Result<Self> {
        let sessions = config
            .sessions
            .as_ref()
            .ok_or_else(|| eyre::eyre!("No session map configured"))?;

        let watcher = RouteWatcher::start(sessions, config.watch_options()).await?;

        let router = SessionRouter::new(config.cookie.clone(), watcher.table(), config.verbose);
        let http_client = Arc::new(HttpClientAdapter::with_timeout(config.upstream_timeout()));
        let response_rewrite = ResponseRewrite::new(config.reverse_proxy, config.port);

        let handler = Arc::new(HttpHandler::new(router, http_client, response_rewrite));

        Ok(Self {
            watcher,
            router: build_router(handler),
        })
    }

    pub fn routes(&self) -> Arc<RouteTable> {
        self.watcher.table()
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` fires, then drain in-flight requests.
    pub async fn serve(self, listener: TcpListener, shutdown: GracefulShutdown) -> Result<()> {
        let local_addr = listener
            .local_addr()
            .wrap_err("Failed to get local addr")?;
        tracing::info!("gxproxy listening on {}", local_addr);

        let Self { watcher, router } = self;

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let reason = shutdown.wait_for_shutdown_signal().await;
            tracing::info!("Shutdown signal received: {:?}", reason);
        })
        .await
        .wrap_err("Server error")?;

        // Stop watching only once no request can consult the table any more
        drop(watcher);
        tracing::info!("Graceful shutdown completed");
        Ok(())
    }
}
