use std::{convert::Infallible, sync::Arc};

use axum::{
    Router,
    body::Body as AxumBody,
    extract::{Request as AxumRequest, State},
    http::{HeaderMap, StatusCode, header},
    response::Response as AxumResponse,
};
use eyre::{Result, WrapErr};
use hyper::{Request, Response};
use tower_http::trace::TraceLayer;

use crate::{
    core::{
        rewrite::{ResponseRewrite, rewrite_request},
        route_table::Target,
        session::SessionRouter,
    },
    ports::http_client::HttpClient,
};

/// HTTP handler for the session-routing proxy
pub struct HttpHandler {
    router: SessionRouter,
    http_client: Arc<dyn HttpClient>,
    response_rewrite: ResponseRewrite,
}

impl HttpHandler {
    pub fn new(
        router: SessionRouter,
        http_client: Arc<dyn HttpClient>,
        response_rewrite: ResponseRewrite,
    ) -> Self {
        Self {
            router,
            http_client,
            response_rewrite,
        }
    }

    /// Entry point: dispatch WebSocket handshakes and plain requests.
    pub async fn handle_request(&self, req: Request<AxumBody>) -> Result<Response<AxumBody>> {
        if is_websocket_upgrade(req.headers()) {
            self.handle_ws(req).await
        } else {
            self.handle_proxy_request(req).await
        }
    }

    /// Proxy an ordinary HTTP request to the session's backend.
    pub async fn handle_proxy_request(
        &self,
        req: Request<AxumBody>,
    ) -> Result<Response<AxumBody>> {
        let Some(target) = self.router.target_for_request(req.headers()) else {
            return self.no_route(&req);
        };

        let origin = req.headers().get(header::ORIGIN).cloned();

        let (mut parts, body) = req.into_parts();
        rewrite_request(&mut parts);
        let req = Request::from_parts(parts, body);

        tracing::debug!("Proxying {} {} to {}", req.method(), req.uri(), target);

        match self.http_client.send_request(&target, req).await {
            Ok(mut response) => {
                let status = response.status();
                self.response_rewrite
                    .apply(status, response.headers_mut(), origin.as_ref());
                Ok(response)
            }
            Err(e) => bad_gateway(&target, e),
        }
    }

    /// Proxy a WebSocket upgrade handshake and relay the upgraded stream.
    pub async fn handle_ws(&self, req: Request<AxumBody>) -> Result<Response<AxumBody>> {
        let Some(target) = self.router.target_for_request(req.headers()) else {
            return self.no_route(&req);
        };

        let origin = req.headers().get(header::ORIGIN).cloned();

        let (mut parts, body) = req.into_parts();
        rewrite_request(&mut parts);
        let req = Request::from_parts(parts, body);

        tracing::debug!("Proxying WebSocket {} to {}", req.uri(), target);

        match self.http_client.send_upgrade(&target, req).await {
            Ok(mut response) => {
                // A declined upgrade is an ordinary HTTP response
                let status = response.status();
                if status != StatusCode::SWITCHING_PROTOCOLS {
                    self.response_rewrite
                        .apply(status, response.headers_mut(), origin.as_ref());
                }
                Ok(response)
            }
            Err(e) => bad_gateway(&target, e),
        }
    }

    fn no_route(&self, req: &Request<AxumBody>) -> Result<Response<AxumBody>> {
        match self.router.find_session(req.headers()) {
            Some(_) => tracing::warn!(
                "No route for session cookie '{}' on {} {}",
                self.router.cookie_name(),
                req.method(),
                req.uri()
            ),
            None => tracing::warn!(
                "Missing session cookie '{}' on {} {}",
                self.router.cookie_name(),
                req.method(),
                req.uri()
            ),
        }

        Response::builder()
            .status(StatusCode::NOT_FOUND)
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(AxumBody::from("No route for session"))
            .wrap_err("Failed to build not found response")
    }
}

fn bad_gateway(target: &Target, error: impl std::fmt::Display) -> Result<Response<AxumBody>> {
    tracing::error!("Proxy error for backend {}: {}", target, error);

    Response::builder()
        .status(StatusCode::BAD_GATEWAY)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(AxumBody::from("Proxy target unavailable"))
        .wrap_err("Failed to build bad gateway response")
}

/// `Upgrade: websocket` together with a `Connection` header listing `upgrade`.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    let upgrade_websocket = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"));

    let connection_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));

    upgrade_websocket && connection_upgrade
}

async fn proxy_entry(
    State(handler): State<Arc<HttpHandler>>,
    req: AxumRequest,
) -> Result<AxumResponse, Infallible> {
    match handler.handle_request(req).await {
        Ok(response) => Ok(response),
        Err(e) => {
            tracing::error!("Request handling error: {:?}", e);
            let error_response = Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(AxumBody::from("Internal Server Error"))
                .unwrap_or_else(|_| Response::new(AxumBody::from("Internal Server Error")));
            Ok(error_response)
        }
    }
}

/// Axum application routing every path and method through `handler`.
pub fn build_router(handler: Arc<HttpHandler>) -> Router {
    Router::new()
        .fallback(proxy_entry)
        .layer(TraceLayer::new_for_http())
        .with_state(handler)
}
