//! Exposes an in-process HTTP server to run benchmarks against.
//!
//! ```
//! use goben_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = TestServer::new().await;
//!    let url = server.url("/ok");
//!    // point the engine at the URL...
//! }
//! ```
//!
//! The server answers on these routes:
//!
//! - `/ok`: `200` with a one byte body
//! - `/slow`: `200` with a one byte body after [`SLOW_DELAY`]
//! - `/hang`: never responds
//! - `/error`: `500` with a short body
//! - `/redirect`: `307` pointing at `/ok`

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Redirect;
use axum::routing::get;

/// How long the `/slow` route waits before answering.
pub const SLOW_DELAY: Duration = Duration::from_millis(20);

type Hits = Arc<AtomicU64>;

/// An in-process test server for use in integration tests.
///
/// It listens on a random available port on localhost and is shut down when dropped.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    hits: Hits,
}

impl TestServer {
    /// Starts the server on the current runtime.
    pub async fn new() -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let hits = Hits::default();
        let app = Router::new()
            .route("/ok", get(ok))
            .route("/slow", get(slow))
            .route("/hang", get(hang))
            .route("/error", get(error))
            .route("/redirect", get(redirect))
            .with_state(Arc::clone(&hits));

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            handle,
            socket,
            hits,
        }
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses the loopback IP as hostname, so no resolver is involved.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("http://{}/{}", self.socket, path)
    }

    /// Returns the number of requests that reached a route so far.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn ok(State(hits): State<Hits>) -> &'static str {
    hits.fetch_add(1, Ordering::SeqCst);
    "x"
}

async fn slow(State(hits): State<Hits>) -> &'static str {
    hits.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(SLOW_DELAY).await;
    "x"
}

async fn hang(State(hits): State<Hits>) -> &'static str {
    hits.fetch_add(1, Ordering::SeqCst);
    std::future::pending().await
}

async fn error(State(hits): State<Hits>) -> (StatusCode, &'static str) {
    hits.fetch_add(1, Ordering::SeqCst);
    (StatusCode::INTERNAL_SERVER_ERROR, "boom")
}

async fn redirect(State(hits): State<Hits>) -> Redirect {
    hits.fetch_add(1, Ordering::SeqCst);
    Redirect::temporary("/ok")
}
