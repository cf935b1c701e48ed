//! HTTP Surface
//!
//! This module wires the frame-streaming engine to its HTTP boundary:
//! - Resolves the requested frame set from the first path segment
//! - Redirects non-terminal clients to the project page
//! - Serves the frame-set listing at `/list`
//! - Starts one stream driver per streaming connection and tracks live
//!   sessions for connection logs
//!
//! ```text
//!                      Router
//!                        │
//!         ┌──────────────┼──────────────┐
//!         │              │              │
//!     GET /list      GET /<name>      GET /
//!     (listing)      (stream)     (default stream)
//!         │              │              │
//!         └──────────────┴──────────────┘
//!                        │
//!            FrameStore ──▶ StreamDriver
//! ```
//!
//! A streaming response body is an unbounded sequence of chunks fed by the
//! session's driver; dropping the body (client disconnect) closes the sink,
//! which tears the driver down on the same scheduler turn.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use framecast_core::{
    DriverConfig, Frame, FrameStore, ServiceConfig, SessionId, StreamDriver,
};

/// Reserved path segment that returns the frame-set listing instead of a
/// stream.
const LIST_KEYWORD: &str = "list";

/// User-agent fragment that marks a terminal client; everyone else is
/// redirected to the project page.
const TERMINAL_AGENT: &str = "curl";

/// Metadata for one live streaming session, kept for connection logs.
struct ActiveSession {
    set: String,
    started_at: Instant,
}

/// Shared state passed to all request handlers.
#[derive(Clone)]
pub struct AppState {
    store: Arc<FrameStore>,
    config: Arc<ServiceConfig>,
    sessions: Arc<DashMap<SessionId, ActiveSession>>,
}

impl AppState {
    /// Bundle the store and resolved configuration for the router.
    pub fn new(store: Arc<FrameStore>, config: Arc<ServiceConfig>) -> Self {
        Self {
            store,
            config,
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Number of currently live streaming sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route("/{*path}", get(handle_path))
        .with_state(state)
}

async fn handle_root(State(state): State<AppState>, headers: HeaderMap) -> Response {
    handle_request(state, &headers, "").await
}

async fn handle_path(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Response {
    handle_request(state, &headers, &path).await
}

/// The first path segment names the frame set; anything after it is
/// ignored.
fn first_segment(path: &str) -> &str {
    path.trim_start_matches('/')
        .split('/')
        .next()
        .unwrap_or_default()
}

async fn handle_request(state: AppState, headers: &HeaderMap, path: &str) -> Response {
    // Browsers land on the project page; only terminal clients get a
    // stream. A request with no user-agent header at all is assumed to be
    // a terminal.
    if let Some(agent) = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
    {
        if !agent.contains(TERMINAL_AGENT) {
            debug!(agent, "redirecting non-terminal client");
            return (
                StatusCode::FOUND,
                [(header::LOCATION, state.config.redirect_url.clone())],
                "",
            )
                .into_response();
        }
    }

    let resource = first_segment(path);

    let available = match state.store.list_frame_sets().await {
        Ok(sets) => sets,
        Err(e) => {
            error!(error = %e, "failed to enumerate frame sets");
            return internal_error();
        }
    };

    if resource == LIST_KEYWORD {
        return match serde_json::to_string_pretty(&available) {
            Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
            Err(e) => {
                error!(error = %e, "failed to encode frame-set listing");
                internal_error()
            }
        };
    }

    let resource = if resource.is_empty() {
        state.config.default_set.as_str()
    } else {
        resource
    };

    if !available.iter().any(|set| set == resource) {
        debug!(set = resource, "requested frame set does not exist");
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    }

    let frames = match state.store.ensure_cached(resource).await {
        Ok(frames) => frames,
        Err(e) => {
            error!(set = resource, error = %e, "failed to load frame set");
            return internal_error();
        }
    };

    if frames.is_empty() {
        // Diagnostic body instead of a stream; the finite response closes
        // the connection once sent.
        warn!(set = resource, "frame set has no frames");
        return format!("No frames found for frameset {resource}").into_response();
    }

    start_stream(&state, resource, frames)
}

fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
}

/// Spawn a stream driver bound to the response body and register the
/// session.
fn start_stream(state: &AppState, set: &str, frames: Arc<[Frame]>) -> Response {
    let (tx, rx) = mpsc::unbounded_channel::<Bytes>();
    let driver = StreamDriver::new(
        frames,
        DriverConfig {
            tick_interval: state.config.tick_interval,
        },
    );
    let session_id = driver.session_id();
    let handle = driver.start(tx);

    state.sessions.insert(
        session_id,
        ActiveSession {
            set: set.to_owned(),
            started_at: Instant::now(),
        },
    );
    info!(
        session_id = %session_id,
        set,
        active_sessions = state.session_count(),
        "stream session started"
    );

    // Reap the registry entry once the driver winds down (client gone or
    // server shutdown).
    let sessions = Arc::clone(&state.sessions);
    tokio::spawn(async move {
        handle.join().await;
        if let Some((_, session)) = sessions.remove(&session_id) {
            info!(
                session_id = %session_id,
                set = %session.set,
                duration_ms = session.started_at.elapsed().as_millis() as u64,
                active_sessions = sessions.len(),
                "stream session ended"
            );
        }
    });

    let body = Body::from_stream(UnboundedReceiverStream::new(rx).map(Ok::<_, Infallible>));
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;
    use std::fs;
    use std::net::SocketAddr;
    use std::time::Duration;

    use framecast_core::CLEAR_SCREEN;
    use tempfile::TempDir;

    const TEST_REDIRECT: &str = "https://example.com/framecast";

    fn write_set(root: &std::path::Path, set: &str, frames: &[(&str, &str)]) {
        let dir = root.join(set);
        fs::create_dir_all(&dir).unwrap();
        for (name, content) in frames {
            fs::write(dir.join(name), content).unwrap();
        }
    }

    /// Bind the router to an ephemeral port over a temp frame root.
    async fn spawn_app(root: &std::path::Path) -> SocketAddr {
        let config = ServiceConfig {
            frames_dir: root.to_owned(),
            redirect_url: TEST_REDIRECT.to_owned(),
            tick_interval: Duration::from_millis(10),
            ..ServiceConfig::default()
        };
        let store = Arc::new(FrameStore::new(root));
        let state = AppState::new(store, Arc::new(config));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        addr
    }

    fn terminal_client() -> reqwest::Client {
        reqwest::Client::builder()
            .user_agent("curl/8.5.0")
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap()
    }

    #[test]
    fn first_segment_takes_only_the_first() {
        assert_eq!(first_segment(""), "");
        assert_eq!(first_segment("parrot"), "parrot");
        assert_eq!(first_segment("/parrot"), "parrot");
        assert_eq!(first_segment("parrot/ignored/rest"), "parrot");
    }

    #[tokio::test]
    async fn list_returns_available_sets() {
        let root = TempDir::new().unwrap();
        write_set(root.path(), "parrot", &[("0", "A")]);
        write_set(root.path(), "dance", &[("0", "B")]);
        fs::write(root.path().join("notes.txt"), "stray").unwrap();

        let addr = spawn_app(root.path()).await;
        let response = terminal_client()
            .get(format!("http://{addr}/list"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        let body = response.text().await.unwrap();
        // Pretty-printed, set equality (order is unspecified).
        assert!(body.contains('\n'));
        let sets: HashSet<String> = serde_json::from_str(&body).unwrap();
        assert_eq!(
            sets,
            HashSet::from(["parrot".to_owned(), "dance".to_owned()])
        );
    }

    #[tokio::test]
    async fn unknown_set_is_not_found() {
        let root = TempDir::new().unwrap();
        write_set(root.path(), "parrot", &[("0", "A")]);

        let addr = spawn_app(root.path()).await;
        let response = terminal_client()
            .get(format!("http://{addr}/doesnotexist"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 404);
        assert_eq!(response.text().await.unwrap(), "Not found");
    }

    #[tokio::test]
    async fn browser_agents_are_redirected() {
        let root = TempDir::new().unwrap();
        write_set(root.path(), "parrot", &[("0", "A")]);
        let addr = spawn_app(root.path()).await;

        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36")
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        // Redirected regardless of the requested path.
        for path in ["/", "/parrot", "/list", "/doesnotexist"] {
            let response = client
                .get(format!("http://{addr}{path}"))
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), 302, "path {path}");
            assert_eq!(response.headers()[header::LOCATION], TEST_REDIRECT);
        }
    }

    #[tokio::test]
    async fn missing_user_agent_gets_a_stream() {
        let root = TempDir::new().unwrap();
        write_set(root.path(), "parrot", &[("0", "A")]);
        let addr = spawn_app(root.path()).await;

        // No user_agent on the builder: reqwest sends no User-Agent header.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();
        let mut response = client
            .get(format!("http://{addr}/parrot"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let chunk = response.chunk().await.unwrap().unwrap();
        assert!(chunk.starts_with(CLEAR_SCREEN.as_bytes()));
    }

    #[tokio::test]
    async fn empty_set_gets_a_diagnostic_and_closes() {
        let root = TempDir::new().unwrap();
        write_set(root.path(), "parrot", &[("0", "A")]);
        fs::create_dir(root.path().join("void")).unwrap();

        let addr = spawn_app(root.path()).await;
        let response = terminal_client()
            .get(format!("http://{addr}/void"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        // A complete (finite) body proves the connection was closed rather
        // than left streaming.
        assert_eq!(
            response.text().await.unwrap(),
            "No frames found for frameset void"
        );
    }

    #[tokio::test]
    async fn root_streams_the_default_set() {
        let root = TempDir::new().unwrap();
        write_set(root.path(), "parrot", &[("0", "only-frame")]);

        let addr = spawn_app(root.path()).await;
        let mut response = terminal_client()
            .get(format!("http://{addr}/"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        let chunk = response.chunk().await.unwrap().unwrap();
        let text = String::from_utf8(chunk.to_vec()).unwrap();
        assert!(text.starts_with(CLEAR_SCREEN));
        assert!(text.contains("only-frame"));
    }

    #[tokio::test]
    async fn stream_loops_in_order() {
        let root = TempDir::new().unwrap();
        write_set(root.path(), "parrot", &[("0", "A"), ("1", "B")]);

        let addr = spawn_app(root.path()).await;
        let mut response = terminal_client()
            .get(format!("http://{addr}/parrot"))
            .send()
            .await
            .unwrap();

        // Collect enough bytes for three full chunks; the network may split
        // or merge them arbitrarily.
        let mut buf = Vec::new();
        while buf_chunks(&buf).len() < 4 {
            let chunk = response.chunk().await.unwrap().expect("stream ended early");
            buf.extend_from_slice(&chunk);
        }

        let payloads: Vec<String> = buf_chunks(&buf)
            .into_iter()
            .take(3)
            .map(|c| strip_color(&c))
            .collect();
        assert_eq!(payloads, vec!["A", "B", "A"]);
    }

    /// Split a byte buffer on the clear-screen marker into chunk bodies.
    fn buf_chunks(buf: &[u8]) -> Vec<String> {
        String::from_utf8_lossy(buf)
            .split(CLEAR_SCREEN)
            .skip(1)
            .map(str::to_owned)
            .collect()
    }

    /// Strip `ESC[3Xm` ... `ESC[39m` color wrapping from a chunk body.
    fn strip_color(chunk: &str) -> String {
        let rest = chunk.strip_prefix("\x1b[").expect("SGR open");
        let (_code, rest) = rest.split_once('m').expect("SGR code");
        rest.strip_suffix("\x1b[39m")
            .expect("SGR reset")
            .to_owned()
    }
}
