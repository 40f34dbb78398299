// tests/proxy_server.rs

use std::error::Error;
use std::net::SocketAddr;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::RawQuery;
use axum::http::{StatusCode, Uri};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use futures::stream::{self, StreamExt};
use pipeworks::dag::Graph;
use pipeworks::engine::Runner;
use pipeworks::exec::{TaskAction, TaskContext};
use pipeworks::proxy::{ProxyAction, ProxyServer, ProxySettings, ReloadHub, Route, CLIENT_PATH, EVENTS_PATH};
use pipeworks::types::ReloadKind;
use pipeworks_test_utils::{init_tracing, wait_until, with_timeout};
use tokio::net::TcpListener;

type TestResult = Result<(), Box<dyn Error>>;

const CLIENT_TAG: &str = "<script src=\"/__pipeworks/client.js\"></script>";

/// Upstream echoing which server answered, the path it saw and the query.
async fn upstream(label: &'static str) -> Result<SocketAddr, Box<dyn Error>> {
    let app = Router::new()
        .route(
            "/page",
            get(|| async { Html("<html><body><h1>app</h1></body></html>") }),
        )
        .route(
            "/ticks",
            get(|| async {
                // First chunk right away, then the stream stays open.
                let first = stream::once(async { Ok::<_, std::io::Error>(Bytes::from("tick\n")) });
                Body::from_stream(first.chain(stream::pending()))
            }),
        )
        .fallback(move |uri: Uri, RawQuery(query): RawQuery| async move {
            format!("{label} {} {}", uri.path(), query.unwrap_or_default())
        });
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(addr)
}

fn settings(routes: Vec<Route>) -> ProxySettings {
    ProxySettings {
        host: "127.0.0.1".to_string(),
        port: 0,
        routes,
        ..ProxySettings::default()
    }
}

async fn get_text(url: String) -> Result<(StatusCode, String), Box<dyn Error>> {
    let resp = reqwest::get(url).await?;
    let status = resp.status();
    Ok((status, resp.text().await?))
}

#[tokio::test]
async fn longest_prefix_wins_and_prefix_is_stripped() -> TestResult {
    init_tracing();
    let app = upstream("app").await?;
    let assets = upstream("assets").await?;
    let tmp = tempfile::tempdir()?;

    let server = ProxyServer::bind(
        &settings(vec![
            Route::new("/", &format!("http://{app}")),
            Route::new("/assets/js/", &format!("http://{assets}/assets/js")),
        ]),
        tmp.path(),
        ReloadHub::new(),
    )
    .await?;
    let base = format!("http://{}", server.local_addr());

    let (status, body) = with_timeout(get_text(format!("{base}/assets/js/main.js?v=2"))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "assets /assets/js/main.js v=2");

    let (_, body) = with_timeout(get_text(format!("{base}/api/users"))).await?;
    assert_eq!(body, "app /api/users ");

    // Segment boundary: `/assets/jsx` is not under `/assets/js/`.
    let (_, body) = with_timeout(get_text(format!("{base}/assets/jsx"))).await?;
    assert_eq!(body, "app /assets/jsx ");
    Ok(())
}

#[tokio::test]
async fn proxied_html_gets_the_reload_client() -> TestResult {
    init_tracing();
    let app = upstream("app").await?;
    let tmp = tempfile::tempdir()?;
    let server = ProxyServer::bind(
        &settings(vec![Route::new("/", &format!("http://{app}"))]),
        tmp.path(),
        ReloadHub::new(),
    )
    .await?;

    let (status, body) =
        with_timeout(get_text(format!("http://{}/page", server.local_addr()))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        format!("<html><body><h1>app</h1>{CLIENT_TAG}</body></html>")
    );
    Ok(())
}

#[tokio::test]
async fn unrouted_requests_are_served_from_base_dir() -> TestResult {
    init_tracing();
    let app = upstream("app").await?;
    let tmp = tempfile::tempdir()?;
    std::fs::write(tmp.path().join("index.html"), "<body>static</body>")?;
    std::fs::write(tmp.path().join("app.css"), "body{}")?;

    let server = ProxyServer::bind(
        &settings(vec![Route::new("/api", &format!("http://{app}"))]),
        tmp.path(),
        ReloadHub::new(),
    )
    .await?;
    let base = format!("http://{}", server.local_addr());

    let (_, body) = with_timeout(get_text(format!("{base}/index.html"))).await?;
    assert_eq!(body, format!("<body>static{CLIENT_TAG}</body>"));

    let (_, body) = with_timeout(get_text(format!("{base}/app.css"))).await?;
    assert_eq!(body, "body{}");

    let (status, _) = with_timeout(get_text(format!("{base}/missing.png"))).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = with_timeout(get_text(format!("{base}/api/x"))).await?;
    assert_eq!(body, "app /x ");
    Ok(())
}

#[tokio::test]
async fn dead_upstream_is_a_bad_gateway() -> TestResult {
    init_tracing();
    let closed = {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        listener.local_addr()?
    };
    let tmp = tempfile::tempdir()?;
    let server = ProxyServer::bind(
        &settings(vec![Route::new("/", &format!("http://{closed}"))]),
        tmp.path(),
        ReloadHub::new(),
    )
    .await?;

    let (status, _) =
        with_timeout(get_text(format!("http://{}/anything", server.local_addr()))).await?;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    Ok(())
}

#[tokio::test]
async fn reserved_paths_are_never_proxied() -> TestResult {
    init_tracing();
    let app = upstream("app").await?;
    let tmp = tempfile::tempdir()?;
    let server = ProxyServer::bind(
        &settings(vec![Route::new("/", &format!("http://{app}"))]),
        tmp.path(),
        ReloadHub::new(),
    )
    .await?;

    let resp = with_timeout(reqwest::get(format!(
        "http://{}{CLIENT_PATH}",
        server.local_addr()
    )))
    .await?;
    let content_type = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("application/javascript"));
    assert!(resp.text().await?.contains("EventSource"));
    Ok(())
}

#[tokio::test]
async fn reload_signals_reach_event_stream_clients() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let hub = ReloadHub::new();
    let server = ProxyServer::bind(&settings(Vec::new()), tmp.path(), hub.clone()).await?;

    let mut resp = with_timeout(reqwest::get(format!(
        "http://{}{EVENTS_PATH}",
        server.local_addr()
    )))
    .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let subscribed = wait_until(Duration::from_secs(2), || hub.client_count() > 0).await;
    assert!(subscribed);
    hub.notify(ReloadKind::Css);

    let mut received = String::new();
    while !received.contains("event: css") {
        let chunk = with_timeout(resp.chunk()).await?.ok_or("event stream closed")?;
        received.push_str(&String::from_utf8_lossy(&chunk));
    }
    assert!(received.contains("data: css"));
    Ok(())
}

#[tokio::test]
async fn proxy_task_binds_once() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let action = ProxyAction::new(settings(Vec::new()));
    let ctx = TaskContext {
        task: "connect".to_string(),
        run_id: 1,
        root: std::sync::Arc::new(tmp.path().to_path_buf()),
        reload: ReloadHub::new(),
    };

    with_timeout(action.start(ctx.clone())).await?;
    let first = action.local_addr().await.ok_or("proxy not bound")?;
    with_timeout(action.start(ctx)).await?;
    assert_eq!(action.local_addr().await, Some(first));

    // Also runnable as a graph task.
    let mut graph = Graph::new();
    graph.register("connect", Vec::<String>::new(), action.clone());
    with_timeout(Runner::new(graph).with_root(tmp.path()).run(&["connect"])).await?;
    assert_eq!(action.local_addr().await, Some(first));
    Ok(())
}

#[tokio::test]
async fn open_ended_upstream_bodies_stream_through() -> TestResult {
    init_tracing();
    let app = upstream("app").await?;
    let tmp = tempfile::tempdir()?;
    let server = ProxyServer::bind(
        &settings(vec![Route::new("/", &format!("http://{app}"))]),
        tmp.path(),
        ReloadHub::new(),
    )
    .await?;

    let mut resp =
        with_timeout(reqwest::get(format!("http://{}/ticks", server.local_addr()))).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let chunk = with_timeout(resp.chunk()).await?.ok_or("stream closed early")?;
    assert_eq!(&chunk[..], b"tick\n");
    Ok(())
}

#[tokio::test]
async fn head_requests_are_not_rewritten() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let page = "<body>static</body>";
    std::fs::write(tmp.path().join("index.html"), page)?;
    let server = ProxyServer::bind(&settings(Vec::new()), tmp.path(), ReloadHub::new()).await?;

    let resp = with_timeout(
        reqwest::Client::new()
            .head(format!("http://{}/index.html", server.local_addr()))
            .send(),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let length = resp
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    assert_eq!(length, Some(page.len().to_string()));
    assert!(resp.text().await?.is_empty());
    Ok(())
}
