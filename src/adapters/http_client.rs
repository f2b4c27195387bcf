use std::{future::Future, time::Duration};

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{
    Request, Response, StatusCode, Uri, Version, client::conn::http1, header, header::HeaderValue,
};
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::{TokioExecutor, TokioIo},
};
use tokio::{net::TcpStream, time::timeout};
use tracing::Instrument;

use crate::{
    core::{rewrite::HeaderCase, route_table::Target},
    ports::http_client::{HttpClient, HttpClientError, HttpClientResult},
};

/// Plain-HTTP upstream client built on hyper (HTTP/1.1 only).
///
/// Responsibilities:
/// * Points origin-form request URIs at the session's target
/// * Keeps the client's `Host` header (the backend sees the public host)
/// * Honours [`HeaderCase::Title`] by using a title-casing connection pool
/// * Relays WebSocket upgrades over a dedicated connection
/// * Bounds time-to-response-headers when an upstream timeout is configured
///
/// No retries; each session has exactly one backend.
pub struct HttpClientAdapter {
    client: Client<HttpConnector, AxumBody>,
    title_case_client: Client<HttpConnector, AxumBody>,
    timeout: Option<Duration>,
}

impl HttpClientAdapter {
    /// Create a new client without an upstream timeout.
    pub fn new() -> Self {
        Self::with_timeout(None)
    }

    /// Create a new client; `timeout` bounds connect + response headers.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        tracing::debug!(?timeout, "Created upstream HTTP client");
        Self {
            client: Self::build_client(false),
            title_case_client: Self::build_client(true),
            timeout,
        }
    }

    fn build_client(title_case_headers: bool) -> Client<HttpConnector, AxumBody> {
        let mut builder = Client::builder(TokioExecutor::new());
        builder.http1_title_case_headers(title_case_headers);
        builder.build_http()
    }

    /// Absolute URI for `req_uri` on `target`.
    fn upstream_uri(target: &Target, req_uri: &Uri) -> HttpClientResult<Uri> {
        let path_and_query = req_uri.path_and_query().map_or("/", |pq| pq.as_str());
        format!("http://{}{}", target.authority(), path_and_query)
            .parse()
            .map_err(|e| HttpClientError::InvalidRequest(format!("Invalid upstream URI: {e}")))
    }

    /// Fill in `Host` for clients that did not send one (HTTP/2).
    fn ensure_host(target: &Target, req: &mut Request<AxumBody>) {
        if req.headers().contains_key(header::HOST) {
            return;
        }
        let host = req
            .uri()
            .authority()
            .map(|a| a.to_string())
            .unwrap_or_else(|| target.authority());
        match HeaderValue::from_str(&host) {
            Ok(value) => {
                req.headers_mut().insert(header::HOST, value);
            }
            Err(e) => tracing::warn!("Cannot set Host header to {}: {}", host, e),
        }
    }

    async fn within_timeout<T, F>(&self, fut: F) -> HttpClientResult<T>
    where
        F: Future<Output = HttpClientResult<T>>,
    {
        match self.timeout {
            Some(limit) => timeout(limit, fut)
                .await
                .map_err(|_| HttpClientError::Timeout(limit))?,
            None => fut.await,
        }
    }
}

impl Default for HttpClientAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for HttpClientAdapter {
    async fn send_request(
        &self,
        target: &Target,
        mut req: Request<AxumBody>,
    ) -> HttpClientResult<Response<AxumBody>> {
        Self::ensure_host(target, &mut req);
        let client = match HeaderCase::of(&req) {
            HeaderCase::Title => self.title_case_client.clone(),
            HeaderCase::Lower => self.client.clone(),
        };

        let (mut parts, body) = req.into_parts();
        parts.uri = Self::upstream_uri(target, &parts.uri)?;
        parts.version = Version::HTTP_11;

        let span = tracing::debug_span!(
            "backend_request",
            backend = %target,
            http.method = %parts.method,
            http.path = %parts.uri.path(),
            http.status_code = tracing::field::Empty,
        );

        tracing::debug!(parent: &span, "Outgoing request headers: {:?}", parts.headers);

        let method = parts.method.clone();
        let uri = parts.uri.clone();
        let outgoing = Request::from_parts(parts, body);

        let response = self
            .within_timeout(async move {
                client.request(outgoing).await.map_err(|e| {
                    HttpClientError::ConnectionError(format!("{method} {uri} failed: {e}"))
                })
            })
            .instrument(span.clone())
            .await?;

        span.record("http.status_code", response.status().as_u16());

        let (mut parts, hyper_body) = response.into_parts();
        // Framing is re-done by the server side
        parts.headers.remove(header::TRANSFER_ENCODING);

        Ok(Response::from_parts(parts, AxumBody::new(hyper_body)))
    }

    async fn send_upgrade(
        &self,
        target: &Target,
        mut req: Request<AxumBody>,
    ) -> HttpClientResult<Response<AxumBody>> {
        Self::ensure_host(target, &mut req);
        let title_case = HeaderCase::of(&req) == HeaderCase::Title;

        let client_upgrade = hyper::upgrade::on(&mut req);

        let (mut parts, body) = req.into_parts();
        parts.uri = parts
            .uri
            .path_and_query()
            .map_or("/", |pq| pq.as_str())
            .parse()
            .map_err(|e| HttpClientError::InvalidRequest(format!("Invalid upgrade URI: {e}")))?;
        parts.version = Version::HTTP_11;
        let outgoing = Request::from_parts(parts, body);

        let authority = target.authority();
        let mut response = self
            .within_timeout(async move {
                let stream = TcpStream::connect(&authority).await.map_err(|e| {
                    HttpClientError::ConnectionError(format!("Connect to {authority} failed: {e}"))
                })?;

                let (mut sender, conn) = http1::Builder::new()
                    .title_case_headers(title_case)
                    .handshake::<_, AxumBody>(TokioIo::new(stream))
                    .await
                    .map_err(|e| {
                        HttpClientError::ConnectionError(format!(
                            "Handshake with {authority} failed: {e}"
                        ))
                    })?;

                let conn_authority = authority.clone();
                tokio::spawn(async move {
                    if let Err(e) = conn.with_upgrades().await {
                        tracing::debug!("Upgrade connection to {} ended: {}", conn_authority, e);
                    }
                });

                sender.send_request(outgoing).await.map_err(|e| {
                    HttpClientError::ConnectionError(format!(
                        "Upgrade request to {authority} failed: {e}"
                    ))
                })
            })
            .await?;

        if response.status() != StatusCode::SWITCHING_PROTOCOLS {
            tracing::debug!(
                status = %response.status(),
                "Backend {} declined protocol upgrade",
                target
            );
            let (parts, body) = response.into_parts();
            return Ok(Response::from_parts(parts, AxumBody::new(body)));
        }

        let backend_upgrade = hyper::upgrade::on(&mut response);
        let relay_target = target.clone();
        tokio::spawn(async move {
            let (client, backend) = match tokio::try_join!(client_upgrade, backend_upgrade) {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::error!("WebSocket upgrade with {} failed: {}", relay_target, e);
                    return;
                }
            };

            let mut client = TokioIo::new(client);
            let mut backend = TokioIo::new(backend);
            match tokio::io::copy_bidirectional(&mut client, &mut backend).await {
                Ok((to_backend, to_client)) => tracing::debug!(
                    backend = %relay_target,
                    to_backend,
                    to_client,
                    "WebSocket relay closed"
                ),
                Err(e) => tracing::debug!("WebSocket relay with {} ended: {}", relay_target, e),
            }
        });

        let (parts, _) = response.into_parts();
        Ok(Response::from_parts(parts, AxumBody::empty()))
    }
}
