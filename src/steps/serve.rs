//! Static dev server with live-reload.
//!
//! Files are served from the output root. HTML responses carry a small
//! script that subscribes to [`LIVERELOAD_PATH`] (server-sent events); a
//! watcher on the output root broadcasts a reload whenever a build writes
//! there.

use async_trait::async_trait;
use axum::{
    extract::State,
    http::{header, StatusCode, Uri},
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Router,
};
use futures::stream::{self, Stream};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::convert::Infallible;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::core::Step;
use crate::orchestration::Runner;
use crate::util::in_node_modules;
use crate::{klog, klog_debug, klog_error, klog_trace, Error, Result};

pub const LIVERELOAD_PATH: &str = "/__livereload";

const LIVERELOAD_SCRIPT: &str = "<script>new EventSource(\"/__livereload\").addEventListener(\"reload\", function () { location.reload(); });</script>";

#[derive(Clone)]
pub struct ServeState {
    root: Arc<PathBuf>,
    livereload: bool,
    reload: broadcast::Sender<()>,
    cancel: CancellationToken,
}

impl ServeState {
    pub fn new(root: PathBuf, livereload: bool, cancel: CancellationToken) -> Self {
        let (reload, _) = broadcast::channel(16);
        Self {
            root: Arc::new(root),
            livereload,
            reload,
            cancel,
        }
    }

    /// Tell every connected page to reload.
    pub fn reload(&self) {
        // No subscribers is fine.
        let _ = self.reload.send(());
    }
}

/// Map a request path onto the output root.
///
/// Returns `None` for paths that would leave the root.
pub fn resolve_request(root: &Path, request_path: &str) -> Option<PathBuf> {
    let mut path = root.to_path_buf();
    for segment in request_path.split('/') {
        if segment.is_empty() || segment.contains('\\') {
            continue;
        }
        match Path::new(segment).components().next() {
            Some(Component::Normal(part)) => path.push(part),
            Some(Component::CurDir) => {}
            _ => return None,
        }
    }
    Some(path)
}

pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" => "application/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "eot" => "application/vnd.ms-fontobject",
        _ => "application/octet-stream",
    }
}

/// Insert the live-reload client before the last `</body>`, or at the end.
pub fn with_reload_script(html: &str) -> String {
    match html.rfind("</body>") {
        Some(at) => format!("{}{}{}", &html[..at], LIVERELOAD_SCRIPT, &html[at..]),
        None => format!("{}{}", html, LIVERELOAD_SCRIPT),
    }
}

async fn serve_file(State(state): State<ServeState>, uri: Uri) -> Response {
    let Some(mut path) = resolve_request(&state.root, uri.path()) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if path.is_dir() {
        path.push("index.html");
    }

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return StatusCode::NOT_FOUND.into_response();
        }
        Err(e) => {
            klog_error!("webserver: {}: {}", path.display(), e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    klog_trace!("webserver: GET {}", uri.path());

    let mime = content_type(&path);
    if state.livereload && mime.starts_with("text/html") {
        let html = with_reload_script(&String::from_utf8_lossy(&bytes));
        return ([(header::CONTENT_TYPE, mime)], html).into_response();
    }
    ([(header::CONTENT_TYPE, mime)], bytes).into_response()
}

async fn livereload(
    State(state): State<ServeState>,
) -> Sse<impl Stream<Item = std::result::Result<SseEvent, Infallible>>> {
    let rx = state.reload.subscribe();
    let cancel = state.cancel.clone();
    // The stream ends on cancellation so graceful shutdown is not held open.
    let events = stream::unfold((rx, cancel), |(mut rx, cancel)| async move {
        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => return None,
                received = rx.recv() => received,
            };
            match received {
                Ok(()) => {
                    let event = SseEvent::default().event("reload").data("reload");
                    return Some((Ok(event), (rx, cancel)));
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

pub fn router(state: ServeState) -> Router {
    Router::new()
        .route(LIVERELOAD_PATH, get(livereload))
        .fallback(serve_file)
        .with_state(state)
}

/// Serve on `listener` until the state's token is cancelled.
pub async fn serve(listener: TcpListener, state: ServeState) -> Result<()> {
    let shutdown = state.cancel.clone().cancelled_owned();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Server(e.to_string()))
}

/// Broadcast a reload for every change under `root`.
fn watch_output(root: &Path, state: ServeState) -> notify::Result<RecommendedWatcher> {
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let relevant = (event.kind.is_create()
                    || event.kind.is_modify()
                    || event.kind.is_remove())
                    && event.paths.iter().any(|p| !in_node_modules(p));
                if relevant {
                    klog_debug!("webserver: reload after {:?}", event.paths);
                    state.reload();
                }
            }
            Err(e) => klog_error!("webserver watch error: {}", e),
        },
        notify::Config::default(),
    )?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    Ok(watcher)
}

/// Serve the output root on 127.0.0.1 until Ctrl-C.
pub struct ServeStep;

#[async_trait]
impl Step for ServeStep {
    fn description(&self) -> &str {
        "Serve the output directory with live-reload"
    }

    async fn run(&self, runner: &Runner) -> Result<()> {
        let config = runner.config();
        let root = config.resolve(&config.paths.dist);
        tokio::fs::create_dir_all(&root).await?;

        let port = config.server.port;
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|e| Error::Server(format!("cannot bind 127.0.0.1:{}: {}", port, e)))?;

        let state = ServeState::new(
            root.clone(),
            config.server.livereload,
            runner.cancel_token().clone(),
        );
        let _watcher = if config.server.livereload {
            Some(watch_output(&root, state.clone())?)
        } else {
            None
        };

        klog!(
            "Server started http://{} serving {}",
            listener.local_addr()?,
            root.display()
        );
        serve(listener, state).await?;
        klog!("Server stopped");
        Ok(())
    }
}
