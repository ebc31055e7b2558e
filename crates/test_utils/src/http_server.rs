//! An embedded http server serving certificate-artifact style fixtures
//! for integration tests.
//!
//! Every fixture named `name` responds with the body `-name-\n`, so a
//! test can assert byte-exact bodies without carrying fixture files.
//!
//! Routes:
//! - `/{name}` - 200, body `-{name}-\n`
//! - `/slow/{ms}/{name}` - same, after a delay of `ms` milliseconds
//! - `/redirect/{name}` - 302 to `/{name}`
//! - `/redirect-https` - 302 to an https url
//! - `/cacheable/{name}` - same as `/{name}`, cacheable for one hour
//! - `/gzipped/{name}` - same as `/{name}`, gzip content encoding
//! - `/status/{code}` - responds with the given status code

use axum::body::Body;
use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing;
use axum::Router;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// The embedded fixture server. Dropping it stops the server.
pub struct TestHttpServer {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestHttpServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Clone)]
struct SrvState {
    hits: Arc<AtomicUsize>,
}

impl TestHttpServer {
    /// Bind an ephemeral local port and start serving fixtures.
    pub async fn start() -> std::io::Result<Self> {
        let hits = Arc::new(AtomicUsize::new(0));

        let app = Router::new()
            .route("/{name}", routing::get(handle_fixture))
            .route("/slow/{ms}/{name}", routing::get(handle_slow))
            .route("/redirect/{name}", routing::get(handle_redirect))
            .route("/redirect-https", routing::get(handle_redirect_https))
            .route("/cacheable/{name}", routing::get(handle_cacheable))
            .route("/gzipped/{name}", routing::get(handle_gzipped))
            .route("/status/{code}", routing::get(handle_status))
            .with_state(SrvState { hits: hits.clone() });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown, on_shutdown) = tokio::sync::oneshot::channel();
        let task = tokio::task::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = on_shutdown.await;
                })
                .await;
        });

        tracing::debug!(%addr, "test http server listening");

        Ok(Self {
            addr,
            hits,
            shutdown: Some(shutdown),
            task,
        })
    }

    /// The absolute url for a path on this server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// The fixture body served for `name`.
    pub fn fixture_body(name: &str) -> Vec<u8> {
        format!("-{name}-\n").into_bytes()
    }

    /// How many requests this server has handled.
    pub fn request_count(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Stop the server and wait until the port is released.
    pub async fn shutdown(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = (&mut self.task).await;
    }
}

fn fixture_response(name: &str) -> Response {
    Response::builder()
        .status(200)
        .header("Content-Type", "application/pkix-cert")
        .body(Body::from(TestHttpServer::fixture_body(name)))
        .expect("failed to encode response")
}

async fn handle_fixture(
    State(state): State<SrvState>,
    Path(name): Path<String>,
) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    fixture_response(&name)
}

async fn handle_slow(
    State(state): State<SrvState>,
    Path((ms, name)): Path<(u64, String)>,
) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
    fixture_response(&name)
}

async fn handle_redirect(
    State(state): State<SrvState>,
    Path(name): Path<String>,
) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    Response::builder()
        .status(302)
        .header("Location", format!("/{name}"))
        .body(Body::empty())
        .expect("failed to encode response")
}

async fn handle_redirect_https(State(state): State<SrvState>) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    Response::builder()
        .status(302)
        .header("Location", "https://foopy/foo.crt")
        .body(Body::empty())
        .expect("failed to encode response")
}

async fn handle_cacheable(
    State(state): State<SrvState>,
    Path(name): Path<String>,
) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    Response::builder()
        .status(200)
        .header("Content-Type", "application/pkix-cert")
        .header("Cache-Control", "max-age=3600")
        .body(Body::from(TestHttpServer::fixture_body(&name)))
        .expect("failed to encode response")
}

async fn handle_gzipped(
    State(state): State<SrvState>,
    Path(name): Path<String>,
) -> Response {
    use std::io::Write;

    state.hits.fetch_add(1, Ordering::SeqCst);

    let mut enc = flate2::write::GzEncoder::new(
        Vec::new(),
        flate2::Compression::default(),
    );
    enc.write_all(&TestHttpServer::fixture_body(&name))
        .expect("failed to gzip fixture");
    let gz = enc.finish().expect("failed to gzip fixture");

    Response::builder()
        .status(200)
        .header("Content-Type", "application/pkix-crl")
        .header("Content-Encoding", "gzip")
        .body(Body::from(gz))
        .expect("failed to encode response")
}

async fn handle_status(
    State(state): State<SrvState>,
    Path(code): Path<u16>,
) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    Response::builder()
        .status(code)
        .body(Body::from(format!("-status {code}-\n")))
        .expect("failed to encode response")
}
