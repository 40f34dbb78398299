// src/proxy/server.rs

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;
use tracing::{debug, error, info, warn};

use crate::proxy::reload::{self, ReloadHub, CLIENT_PATH, EVENTS_PATH, RESERVED_PREFIX};
use crate::proxy::routes::RouteTable;
use crate::proxy::ProxySettings;

/// Largest request or HTML response body buffered by the proxy. Other
/// response bodies stream through unbuffered.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Clone)]
struct ProxyState {
    routes: Arc<RouteTable>,
    client: reqwest::Client,
}

/// A bound, serving development proxy.
///
/// The server task is aborted when this handle is dropped.
#[derive(Debug)]
pub struct ProxyServer {
    local_addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl Drop for ProxyServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl ProxyServer {
    /// Bind `settings.host:settings.port` and start serving.
    ///
    /// A relative `base_dir` resolves against `root`.
    pub async fn bind(settings: &ProxySettings, root: &Path, hub: ReloadHub) -> Result<Self> {
        let app = router(settings, root, hub)?;

        let address = format!("{}:{}", settings.host, settings.port);
        let listener = TcpListener::bind(&address)
            .await
            .with_context(|| format!("binding dev proxy on {address}"))?;
        let local_addr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "dev proxy server stopped");
            }
        });

        info!(url = %format!("http://{local_addr}/"), "dev proxy listening");
        Ok(Self { local_addr, handle })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

fn router(settings: &ProxySettings, root: &Path, hub: ReloadHub) -> Result<Router> {
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .context("building upstream HTTP client")?;
    let state = ProxyState {
        routes: Arc::new(RouteTable::new(settings.routes.iter().cloned())),
        client,
    };
    let base_dir = root.join(&settings.base_dir);
    debug!(base_dir = %base_dir.display(), routes = state.routes.routes().len(), "building dev proxy router");

    Ok(Router::new()
        .route(EVENTS_PATH, get(reload::events))
        .route(CLIENT_PATH, get(reload::client_script))
        .with_state(hub)
        .fallback_service(ServeDir::new(base_dir))
        .layer(middleware::from_fn_with_state(state, proxy_requests))
        .layer(middleware::from_fn(inject_reload_client)))
}

/// Forward requests matching a route upstream; everything else continues
/// to the reserved endpoints and static files.
async fn proxy_requests(State(state): State<ProxyState>, req: Request, next: Next) -> Response {
    let path = req.uri().path();
    if path.starts_with(RESERVED_PREFIX) {
        return next.run(req).await;
    }
    let Some(target) = state.routes.resolve(path, req.uri().query()) else {
        return next.run(req).await;
    };

    debug!(method = %req.method(), path = %req.uri().path(), %target, "proxying request");
    match forward(&state.client, &target, req).await {
        Ok(resp) => resp,
        Err(e) => {
            warn!(%target, error = %format!("{e:#}"), "upstream request failed");
            (StatusCode::BAD_GATEWAY, format!("bad gateway: {e}")).into_response()
        }
    }
}

async fn forward(client: &reqwest::Client, target: &str, req: Request) -> Result<Response> {
    let (parts, body) = req.into_parts();
    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .context("reading request body")?;

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);
    // Keep upstream bodies uncompressed so HTML can be rewritten.
    headers.remove(header::ACCEPT_ENCODING);

    let upstream = client
        .request(parts.method, target)
        .headers(headers)
        .body(body)
        .send()
        .await
        .with_context(|| format!("sending request to {target}"))?;

    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    strip_hop_by_hop(&mut headers);

    let mut resp = Response::new(Body::from_stream(upstream.bytes_stream()));
    *resp.status_mut() = status;
    *resp.headers_mut() = headers;
    Ok(resp)
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Add the live-reload client to uncompressed HTML responses.
async fn inject_reload_client(req: Request, next: Next) -> Response {
    let is_head = req.method() == Method::HEAD;
    let resp = next.run(req).await;
    if is_head || !is_plain_html(resp.headers()) {
        return resp;
    }

    let (mut parts, body) = resp.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "failed to buffer HTML response for reload injection");
            return (StatusCode::BAD_GATEWAY, "failed to read response body").into_response();
        }
    };

    parts.headers.remove(header::CONTENT_LENGTH);
    match std::str::from_utf8(&bytes) {
        Ok(html) => Response::from_parts(parts, Body::from(reload::inject_client(html))),
        Err(_) => Response::from_parts(parts, Body::from(bytes)),
    }
}

fn is_plain_html(headers: &HeaderMap) -> bool {
    if headers.contains_key(header::CONTENT_ENCODING) {
        return false;
    }
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.trim_start().to_ascii_lowercase().starts_with("text/html"))
}
