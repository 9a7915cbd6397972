//! Development server with live reload.
//!
//! Serves the build directory and keeps a WebSocket open to every page that
//! loaded the client script. The watcher publishes through [`LiveReload`].

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, HeaderValue},
    middleware::map_response,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::config;

const SOCKET_ROUTE: &str = "/__livereload";
const SCRIPT_ROUTE: &str = "/__livereload.js";
const SCRIPT_TAG: &str = "<script src=\"/__livereload.js\"></script>";

/// Pages larger than this are served without the client script
const MAX_INJECT_BYTES: usize = 16 * 1024 * 1024;

const CLIENT_SCRIPT: &str = r#"(function () {
  function connect() {
    var socket = new WebSocket((location.protocol === "https:" ? "wss://" : "ws://") + location.host + "/__livereload");
    socket.onmessage = function (event) {
      var msg = JSON.parse(event.data);
      if (msg.type === "reload") {
        location.reload();
      } else if (msg.type === "css") {
        var links = document.querySelectorAll('link[rel="stylesheet"]');
        for (var i = 0; i < links.length; i++) {
          var url = new URL(links[i].href, location.href);
          if (msg.paths.indexOf(url.pathname) !== -1) {
            url.searchParams.set("livereload", Date.now());
            links[i].href = url.toString();
          }
        }
      }
    };
    socket.onclose = function () {
      setTimeout(connect, 1000);
    };
  }
  connect();
})();
"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReloadMessage {
    Reload,
    Css { paths: Vec<String> },
}

/// Fan-out to connected browsers.
#[derive(Debug, Clone)]
pub struct LiveReload {
    tx: broadcast::Sender<ReloadMessage>,
}

impl Default for LiveReload {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveReload {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.tx.subscribe()
    }

    pub fn clients(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn reload(&self) {
        // No receivers just means no browser is open
        let _ = self.tx.send(ReloadMessage::Reload);
    }

    pub fn inject_css(&self, paths: Vec<String>) {
        let _ = self.tx.send(ReloadMessage::Css { paths });
    }
}

pub fn router(build_dir: PathBuf, live_reload: LiveReload) -> Router {
    Router::new()
        .route(SOCKET_ROUTE, get(ws_handler))
        .route(SCRIPT_ROUTE, get(client_script))
        .fallback_service(ServeDir::new(build_dir))
        .layer(map_response(inject_client))
        .layer(CorsLayer::permissive())
        .with_state(live_reload)
}

/// Serve `build_dir` until the listener fails.
pub async fn serve(
    settings: &config::Server,
    build_dir: PathBuf,
    live_reload: LiveReload,
) -> Result<()> {
    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    println!(
        "🚀 {} http://{}",
        "Serving".green().bold(),
        listener.local_addr()?
    );
    println!("   Press Ctrl+C to stop\n");

    axum::serve(listener, router(build_dir, live_reload)).await?;
    Ok(())
}

async fn client_script() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        CLIENT_SCRIPT,
    )
}

async fn ws_handler(
    State(live_reload): State<LiveReload>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, live_reload))
}

async fn handle_socket(mut socket: WebSocket, live_reload: LiveReload) {
    let mut rx = live_reload.subscribe();

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(msg) => {
                        if let Ok(json) = serde_json::to_string(&msg) {
                            if socket.send(Message::Text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = socket.send(Message::Pong(data)).await;
                    }
                    _ => {}
                }
            }
        }
    }
}

fn is_html(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("text/html"))
        .unwrap_or(false)
}

/// Insert the client script before `</body>`, or append it when absent.
pub fn inject_script(html: &str) -> String {
    match html.rfind("</body>") {
        Some(at) => format!("{}{}{}", &html[..at], SCRIPT_TAG, &html[at..]),
        None => format!("{}{}", html, SCRIPT_TAG),
    }
}

async fn inject_client(response: Response) -> Response {
    if !response.status().is_success() || !is_html(&response) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_INJECT_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return Response::from_parts(parts, Body::empty()),
    };

    let html = match std::str::from_utf8(&bytes) {
        Ok(html) => inject_script(html),
        Err(_) => return Response::from_parts(parts, Body::from(bytes)),
    };

    parts.headers.remove(header::CONTENT_LENGTH);
    if let Ok(len) = HeaderValue::from_str(&html.len().to_string()) {
        parts.headers.insert(header::CONTENT_LENGTH, len);
    }
    Response::from_parts(parts, Body::from(html))
}
