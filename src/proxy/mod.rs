// src/proxy/mod.rs

//! Development proxy: prefix routing to upstream servers, static files,
//! and live-reload signalling to connected browsers.
//!
//! - [`routes`] holds the longest-prefix routing table.
//! - [`reload`] holds the reload hub, the client script and HTML injection.
//! - [`server`] binds the axum server that ties both together.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::exec::action::{ActionFuture, TaskAction, TaskContext};

pub mod reload;
pub mod routes;
pub mod server;

pub use reload::{inject_client, ReloadHub, CLIENT_PATH, EVENTS_PATH};
pub use routes::{Route, RouteTable};
pub use server::ProxyServer;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;

/// Where the proxy listens, which directory it serves and where it routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    pub host: String,
    pub port: u16,
    /// Static file root; relative paths resolve against the project root.
    pub base_dir: PathBuf,
    pub routes: Vec<Route>,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            base_dir: PathBuf::from("."),
            routes: Vec::new(),
        }
    }
}

/// Task action that starts the dev proxy once and keeps it running.
#[derive(Clone)]
pub struct ProxyAction {
    settings: Arc<ProxySettings>,
    server: Arc<Mutex<Option<ProxyServer>>>,
}

impl ProxyAction {
    pub fn new(settings: ProxySettings) -> Self {
        Self {
            settings: Arc::new(settings),
            server: Arc::new(Mutex::new(None)),
        }
    }

    /// Address the proxy is bound to, once started.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.server.lock().await.as_ref().map(ProxyServer::local_addr)
    }
}

impl TaskAction for ProxyAction {
    fn start(&self, ctx: TaskContext) -> ActionFuture {
        let settings = Arc::clone(&self.settings);
        let server = Arc::clone(&self.server);
        Box::pin(async move {
            let mut slot = server.lock().await;
            if let Some(running) = slot.as_ref() {
                debug!(task = %ctx.task, addr = %running.local_addr(), "dev proxy already running");
                return Ok(());
            }
            *slot = Some(ProxyServer::bind(&settings, ctx.root(), ctx.reload.clone()).await?);
            Ok(())
        })
    }

    fn describe(&self) -> Option<String> {
        Some(format!(
            "proxy: http://{}:{}/",
            self.settings.host, self.settings.port
        ))
    }
}
