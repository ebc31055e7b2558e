//! The in-memory http client test double provided by certnet_core.
//! This is NOT a production module. It is for testing only.
//! It serves scripted responses within the same process, counts the
//! requests issued to it, and tracks how many response bodies are
//! currently live so tests can observe cancellation.

use bytes::Bytes;
use certnet_api::*;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// The in-memory http client test double provided by certnet_core.
/// This is NOT a production module. It is for testing only.
#[derive(Debug)]
pub struct MemHttpClientFactory {}

impl MemHttpClientFactory {
    /// Construct a new MemHttpClientFactory.
    pub fn create() -> DynHttpClientFactory {
        let out: DynHttpClientFactory = Arc::new(MemHttpClientFactory {});
        out
    }
}

impl HttpClientFactory for MemHttpClientFactory {
    fn default_config(
        &self,
        _config: &mut config::Config,
    ) -> FetchResult<()> {
        Ok(())
    }

    fn validate_config(&self, _config: &config::Config) -> FetchResult<()> {
        Ok(())
    }

    fn create(
        &self,
        _builder: Arc<builder::Builder>,
    ) -> BoxFut<'static, FetchResult<DynHttpClient>> {
        Box::pin(async move {
            let out: DynHttpClient = Arc::new(MemHttpClient::new());
            Ok(out)
        })
    }
}

/// A scripted response for one url served by [MemHttpClient].
#[derive(Debug, Clone)]
pub struct MemRoute {
    /// The status code to respond with.
    pub status: u16,

    /// The response body.
    pub body: Bytes,

    /// Deliver the body in chunks of at most this size. Defaults to the
    /// whole body in one chunk.
    pub chunk_size: usize,

    /// Delay before the response head becomes available.
    pub head_delay: Option<Duration>,

    /// Never produce a response head at all.
    pub never_respond: bool,

    /// Respond by redirecting to this absolute url instead. The client
    /// follows it internally, to plain http targets only, the way a real
    /// transport under the redirect policy would.
    pub redirect_to: Option<String>,
}

impl MemRoute {
    /// A 200 response with the given body.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            chunk_size: usize::MAX,
            head_delay: None,
            never_respond: false,
            redirect_to: None,
        }
    }

    /// A response with the given non-200 status.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            ..Self::ok(Bytes::new())
        }
    }

    /// A redirect to another absolute url.
    pub fn redirect(to: impl Into<String>) -> Self {
        Self {
            status: 302,
            redirect_to: Some(to.into()),
            ..Self::ok(Bytes::new())
        }
    }

    /// A response whose head never arrives.
    pub fn hang() -> Self {
        Self {
            never_respond: true,
            ..Self::ok(Bytes::new())
        }
    }

    /// Delay the response head.
    pub fn with_head_delay(mut self, head_delay: Duration) -> Self {
        self.head_delay = Some(head_delay);
        self
    }

    /// Deliver the body in chunks of at most this size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}

#[derive(Debug, Default)]
struct MemHttpInner {
    routes: Mutex<HashMap<String, MemRoute>>,
    started: AtomicUsize,
    active: AtomicUsize,
}

/// An in-memory [HttpClient] serving scripted responses.
///
/// Clones share the same scripted routes and counters, so a test can
/// keep one clone for scripting and assertions while the fetcher under
/// test drives the other.
#[derive(Debug, Clone, Default)]
pub struct MemHttpClient(Arc<MemHttpInner>);

impl MemHttpClient {
    /// Construct a new MemHttpClient with no routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a response for a url.
    pub fn set_route(&self, url: impl Into<String>, route: MemRoute) {
        self.0.routes.lock().unwrap().insert(url.into(), route);
    }

    /// How many underlying requests have been started.
    pub fn request_count(&self) -> usize {
        self.0.started.load(Ordering::SeqCst)
    }

    /// How many responses are currently live, i.e. their head was
    /// delivered and their body is neither fully consumed nor dropped.
    pub fn active_response_count(&self) -> usize {
        self.0.active.load(Ordering::SeqCst)
    }
}

impl HttpClient for MemHttpClient {
    fn start(
        &self,
        request: HttpRequest,
    ) -> BoxFut<'static, FetchResult<DynHttpResponse>> {
        let inner = self.0.clone();
        Box::pin(async move {
            inner.started.fetch_add(1, Ordering::SeqCst);

            let mut url = request.url.as_str().to_string();
            loop {
                let route = inner.routes.lock().unwrap().get(&url).cloned();
                let Some(route) = route else {
                    // Stands in for a connection or resolution failure.
                    return Err(FetchError::http_failed(format!(
                        "no responder for {url}"
                    )));
                };

                if let Some(head_delay) = route.head_delay {
                    tokio::time::sleep(head_delay).await;
                }
                if route.never_respond {
                    std::future::pending::<()>().await;
                }

                if let Some(to) = route.redirect_to {
                    if !to.starts_with("http:") {
                        return Err(FetchError::disallowed_scheme(&to));
                    }
                    url = to;
                    continue;
                }

                let mut chunks = VecDeque::new();
                let chunk_size = route.chunk_size.max(1);
                let mut at = 0;
                while at < route.body.len() {
                    let end = usize::min(at + chunk_size, route.body.len());
                    chunks.push_back(route.body.slice(at..end));
                    at = end;
                }

                inner.active.fetch_add(1, Ordering::SeqCst);
                let out: DynHttpResponse = Box::new(MemHttpResponse {
                    status: route.status,
                    chunks,
                    inner,
                });
                return Ok(out);
            }
        })
    }
}

struct MemHttpResponse {
    status: u16,
    chunks: VecDeque<Bytes>,
    inner: Arc<MemHttpInner>,
}

impl std::fmt::Debug for MemHttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemHttpResponse")
            .field("status", &self.status)
            .finish()
    }
}

impl Drop for MemHttpResponse {
    fn drop(&mut self) {
        self.inner.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl HttpResponse for MemHttpResponse {
    fn status(&self) -> u16 {
        self.status
    }

    fn read_chunk(&mut self) -> BoxFut<'_, FetchResult<Option<Bytes>>> {
        Box::pin(async move { Ok(self.chunks.pop_front()) })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    fn get(url: &str) -> HttpRequest {
        HttpRequest {
            url: FetchUrl::from_str(url).unwrap(),
            verb: HttpVerb::Get,
            body: None,
            timeout_hint: None,
        }
    }

    async fn read_all(mut response: DynHttpResponse) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = response.read_chunk().await.unwrap() {
            out.extend_from_slice(&chunk);
        }
        out
    }

    #[tokio::test]
    async fn scripted_body_and_counters() {
        let client = MemHttpClient::new();
        client.set_route(
            "http://example.com/cert.crt",
            MemRoute::ok("-cert.crt-\n").with_chunk_size(4),
        );

        let response = client
            .start(get("http://example.com/cert.crt"))
            .await
            .unwrap();
        assert_eq!(200, response.status());
        assert_eq!(1, client.request_count());
        assert_eq!(1, client.active_response_count());

        assert_eq!(b"-cert.crt-\n".to_vec(), read_all(response).await);
        assert_eq!(0, client.active_response_count());
    }

    #[tokio::test]
    async fn redirects_follow_http_only() {
        let client = MemHttpClient::new();
        client.set_route(
            "http://example.com/old",
            MemRoute::redirect("http://example.com/new"),
        );
        client.set_route("http://example.com/new", MemRoute::ok("hi"));
        client.set_route(
            "http://example.com/secure",
            MemRoute::redirect("https://example.com/new"),
        );

        let response =
            client.start(get("http://example.com/old")).await.unwrap();
        assert_eq!(b"hi".to_vec(), read_all(response).await);

        let err = client
            .start(get("http://example.com/secure"))
            .await
            .unwrap_err();
        assert_eq!(Some(FetchErrorKind::DisallowedScheme), err.kind());

        // one count per start call, however many hops it took
        assert_eq!(2, client.request_count());
    }

    #[tokio::test]
    async fn missing_route_is_a_transport_failure() {
        let client = MemHttpClient::new();
        let err = client
            .start(get("http://example.com/nothing"))
            .await
            .unwrap_err();
        assert_eq!(Some(FetchErrorKind::HttpFailed), err.kind());
    }
}
