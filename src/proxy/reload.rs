// src/proxy/reload.rs

//! Live-reload signalling: a broadcast hub shared by tasks and the proxy,
//! the browser client script, and HTML injection of that script.

use std::convert::Infallible;

use axum::extract::State;
use axum::http::header;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures::stream::{self, Stream};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::types::ReloadKind;

/// Server-sent events endpoint browsers subscribe to.
pub const EVENTS_PATH: &str = "/__pipeworks/events";
/// Path the injected client script is served from.
pub const CLIENT_PATH: &str = "/__pipeworks/client.js";
/// Requests under this prefix are handled by the proxy itself.
pub const RESERVED_PREFIX: &str = "/__pipeworks/";

const CHANNEL_CAPACITY: usize = 16;

/// Broadcast channel of reload signals.
///
/// Cloning is cheap; every clone publishes to the same subscribers.
#[derive(Debug, Clone)]
pub struct ReloadHub {
    tx: broadcast::Sender<ReloadKind>,
}

impl Default for ReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ReloadHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish a reload signal. Returns the number of subscribers reached.
    pub fn notify(&self, kind: ReloadKind) -> usize {
        self.tx.send(kind).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReloadKind> {
        self.tx.subscribe()
    }

    /// Number of connected subscribers.
    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

pub const CLIENT_JS: &str = r#"(function () {
  var source = new EventSource("/__pipeworks/events");
  source.addEventListener("reload", function () {
    window.location.reload();
  });
  source.addEventListener("css", function () {
    var links = document.querySelectorAll('link[rel="stylesheet"]');
    for (var i = 0; i < links.length; i++) {
      var url = new URL(links[i].href, window.location.href);
      url.searchParams.set("__pipeworks", Date.now().toString());
      links[i].href = url.toString();
    }
  });
})();
"#;

const CLIENT_TAG: &str = "<script src=\"/__pipeworks/client.js\"></script>";

/// Insert the reload client `<script>` before the last `</body>` (matched
/// case-insensitively), or append it when there is none.
pub fn inject_client(html: &str) -> String {
    let lowered = html.to_ascii_lowercase();
    let mut out = String::with_capacity(html.len() + CLIENT_TAG.len());
    match lowered.rfind("</body>") {
        Some(idx) => {
            out.push_str(&html[..idx]);
            out.push_str(CLIENT_TAG);
            out.push_str(&html[idx..]);
        }
        None => {
            out.push_str(html);
            out.push_str(CLIENT_TAG);
        }
    }
    out
}

pub(crate) async fn client_script() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        CLIENT_JS,
    )
}

pub(crate) async fn events(
    State(hub): State<ReloadHub>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!(clients = hub.client_count() + 1, "live-reload client connected");
    let stream = stream::unfold(hub.subscribe(), |mut rx| async move {
        let kind = match rx.recv().await {
            Ok(kind) => kind,
            // Missed signals collapse into a full reload.
            Err(RecvError::Lagged(_)) => ReloadKind::Page,
            Err(RecvError::Closed) => return None,
        };
        Some((Ok::<_, Infallible>(reload_event(kind)), rx))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn reload_event(kind: ReloadKind) -> Event {
    Event::default().event(kind.event_name()).data(kind.event_name())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injects_before_last_closing_body() {
        let html = "<html><BODY><p>x</p></Body></html>";
        let out = inject_client(html);
        assert_eq!(
            out,
            format!("<html><BODY><p>x</p>{CLIENT_TAG}</Body></html>")
        );
    }

    #[test]
    fn appends_when_body_tag_is_missing() {
        assert_eq!(inject_client("<p>fragment</p>"), format!("<p>fragment</p>{CLIENT_TAG}"));
    }

    #[tokio::test]
    async fn notify_reaches_subscribers() {
        let hub = ReloadHub::new();
        assert_eq!(hub.notify(ReloadKind::Page), 0);

        let mut rx = hub.subscribe();
        assert_eq!(hub.clone().notify(ReloadKind::Css), 1);
        assert_eq!(rx.recv().await.unwrap(), ReloadKind::Css);
    }
}
