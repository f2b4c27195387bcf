#![allow(dead_code)]

use std::{future::Future, net::SocketAddr, path::Path, sync::Arc, time::Duration};

use axum::{
    Router,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use gxproxy::{ProxyApp, RouteTable, config::ProxyConfig, utils::GracefulShutdown};
use http_body_util::{BodyExt, Empty};
use hyper::{Request, body::Bytes};
use hyper_util::{client::legacy::Client, rt::TokioExecutor};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};

pub struct RunningProxy {
    pub addr: SocketAddr,
    pub routes: Arc<RouteTable>,
    pub shutdown: GracefulShutdown,
}

impl Drop for RunningProxy {
    fn drop(&mut self) {
        self.shutdown
            .trigger_shutdown(gxproxy::utils::ShutdownReason::Requested);
    }
}

/// Start the full proxy on an ephemeral port.
pub async fn start_proxy(config: ProxyConfig) -> RunningProxy {
    let app = ProxyApp::from_config(&config).await.unwrap();
    let routes = app.routes();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = GracefulShutdown::new();
    let serve_shutdown = shutdown.clone();
    tokio::spawn(async move {
        app.serve(listener, serve_shutdown).await.unwrap();
    });

    RunningProxy {
        addr,
        routes,
        shutdown,
    }
}

pub fn config_for(sessions: &Path) -> ProxyConfig {
    ProxyConfig {
        sessions: Some(sessions.to_path_buf()),
        debounce_ms: 20,
        ..Default::default()
    }
}

pub fn sessions_json(entries: &[(&str, SocketAddr)]) -> String {
    let map: serde_json::Map<String, serde_json::Value> = entries
        .iter()
        .map(|(session, addr)| {
            (
                session.to_string(),
                serde_json::json!({ "host": addr.ip().to_string(), "port": addr.port() }),
            )
        })
        .collect();
    serde_json::Value::Object(map).to_string()
}

/// Axum backend answering `/hello`, `/redirect` and `/host`.
pub async fn spawn_backend(name: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    serve_backend(name, listener)
}

/// Same routes as [`spawn_backend`], served on an already bound listener.
pub fn serve_backend(name: &'static str, listener: TcpListener) -> SocketAddr {
    let app = Router::new()
        .route("/hello", get(move || async move { format!("hello from {name}") }))
        .route(
            "/redirect",
            get(|| async {
                (
                    StatusCode::FOUND,
                    [(header::LOCATION, "http://localhost/foo")],
                )
                    .into_response()
            }),
        )
        .route(
            "/host",
            get(|headers: HeaderMap| async move {
                headers
                    .get(header::HOST)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string()
            }),
        );

    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Backend that answers every request with the raw request head it received.
pub async fn spawn_raw_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut chunk = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => head.extend_from_slice(&chunk[..n]),
                    }
                }
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    head.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.write_all(&head).await;
            });
        }
    });
    addr
}

/// WebSocket backend echoing text and binary frames.
pub async fn spawn_ws_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    if (msg.is_text() || msg.is_binary()) && ws.send(msg).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    addr
}

/// A port nothing listens on.
pub fn refused_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

pub async fn get_with(proxy: SocketAddr, path: &str, headers: &[(&str, &str)]) -> TestResponse {
    let client = Client::builder(TokioExecutor::new()).build_http::<Empty<Bytes>>();

    let mut builder = Request::builder().uri(format!("http://{proxy}{path}"));
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let response = client
        .request(builder.body(Empty::new()).unwrap())
        .await
        .unwrap();

    let (parts, body) = response.into_parts();
    let bytes = body.collect().await.unwrap().to_bytes();
    TestResponse {
        status: parts.status,
        headers: parts.headers,
        body: String::from_utf8_lossy(&bytes).into_owned(),
    }
}

pub async fn get_with_session(proxy: SocketAddr, path: &str, session: &str) -> TestResponse {
    let cookie = format!("galaxysession={session}");
    get_with(proxy, path, &[("cookie", cookie.as_str())]).await
}

/// Poll `check` until it holds or five seconds pass.
pub async fn eventually<F, Fut>(check: F) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .is_ok()
}
