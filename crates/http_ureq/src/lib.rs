#![deny(missing_docs)]
//! A production [HttpClient](certnet_api::HttpClient) module for certnet
//! backed by [ureq].
//!
//! Contract fidelity:
//!
//! - Redirects are resolved here rather than inside ureq, so every hop
//!   can be checked against the plain-http scheme policy. A redirect to
//!   any other scheme fails the request with
//!   [DisallowedScheme](certnet_api::FetchErrorKind::DisallowedScheme).
//! - Responses with gzip content encoding are decoded transparently by
//!   ureq before the fetcher sees the bytes.
//! - No cookies and no credentials are ever attached; the agent carries
//!   no cookie store.
//! - 200-status GET responses are cached in memory according to their
//!   Cache-Control response directives, standing in for the http-layer
//!   cache that certificate fetches rely on.
//!
//! The blocking ureq calls run on the tokio blocking thread pool.
//! Cancellation is observed between body chunks, so a dropped response
//! stops its worker at the next chunk boundary; a worker stuck inside a
//! blocking read is bounded by the request's timeout hint.

use bytes::Bytes;
use certnet_api::*;
use std::sync::Arc;

mod cache;
use cache::ResponseCache;

/// Matches the transfer size used when pulling body bytes off a
/// response.
const READ_CHUNK_BYTES: usize = 4096;

/// UreqHttpClient configuration types.
pub mod config {
    /// Configuration parameters for
    /// [UreqHttpClientFactory](super::UreqHttpClientFactory).
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct UreqHttpClientConfig {
        /// Maximum redirect hops to follow for one request. Default: 10.
        pub max_redirects: u32,

        /// Byte budget for the in-memory response cache. Default:
        /// 32 MiB.
        pub cache_max_bytes: u32,
    }

    impl Default for UreqHttpClientConfig {
        fn default() -> Self {
            Self {
                max_redirects: 10,
                cache_max_bytes: 32 * 1024 * 1024,
            }
        }
    }

    /// Module-level configuration for UreqHttpClient.
    #[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct UreqHttpClientModConfig {
        /// UreqHttpClient configuration.
        #[serde(default)]
        pub ureq_http_client: UreqHttpClientConfig,
    }

    impl certnet_api::config::ModConfig for UreqHttpClientModConfig {}
}

pub use config::*;

/// A production-ready http client module backed by ureq.
#[derive(Debug)]
pub struct UreqHttpClientFactory {}

impl UreqHttpClientFactory {
    /// Construct a new UreqHttpClientFactory.
    pub fn create() -> DynHttpClientFactory {
        let out: DynHttpClientFactory = Arc::new(UreqHttpClientFactory {});
        out
    }
}

impl HttpClientFactory for UreqHttpClientFactory {
    fn default_config(
        &self,
        config: &mut certnet_api::config::Config,
    ) -> FetchResult<()> {
        config.set_module_config(&UreqHttpClientModConfig::default())
    }

    fn validate_config(
        &self,
        config: &certnet_api::config::Config,
    ) -> FetchResult<()> {
        let _config: UreqHttpClientModConfig = config.get_module_config()?;
        Ok(())
    }

    fn create(
        &self,
        builder: Arc<builder::Builder>,
    ) -> BoxFut<'static, FetchResult<DynHttpClient>> {
        Box::pin(async move {
            let config: UreqHttpClientModConfig =
                builder.config.get_module_config()?;
            let out: DynHttpClient =
                Arc::new(UreqHttpClient::new(config.ureq_http_client));
            Ok(out)
        })
    }
}

struct Inner {
    agent: ureq::Agent,
    cache: ResponseCache,
    max_redirects: u32,
}

/// The ureq backed [HttpClient].
#[derive(Clone)]
pub struct UreqHttpClient(Arc<Inner>);

impl std::fmt::Debug for UreqHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("UreqHttpClient")
    }
}

impl UreqHttpClient {
    /// Construct a new UreqHttpClient.
    pub fn new(config: UreqHttpClientConfig) -> Self {
        // Redirects stay disabled at the agent level; they are resolved
        // hop by hop in resolve_redirects under the scheme policy.
        // Non-200 statuses are responses here, not transport errors.
        let agent_config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .max_redirects(0)
            .build();

        Self(Arc::new(Inner {
            agent: agent_config.new_agent(),
            cache: ResponseCache::new(config.cache_max_bytes as usize),
            max_redirects: config.max_redirects,
        }))
    }
}

impl HttpClient for UreqHttpClient {
    fn start(
        &self,
        request: HttpRequest,
    ) -> BoxFut<'static, FetchResult<DynHttpResponse>> {
        let inner = self.0.clone();
        Box::pin(async move {
            if request.verb == HttpVerb::Get {
                if let Some(body) = inner.cache.get(request.url.as_str()) {
                    tracing::debug!(
                        url = %request.url,
                        "serving fetch from http cache"
                    );
                    let out: DynHttpResponse =
                        Box::new(CachedResponse { body: Some(body) });
                    return Ok(out);
                }
            }

            let (head_send, head_recv) = tokio::sync::oneshot::channel();
            let (chunk_send, chunk_recv) =
                tokio::sync::mpsc::unbounded_channel();

            tokio::task::spawn_blocking(move || {
                blocking_fetch(inner, request, head_send, chunk_send)
            });

            match head_recv.await {
                Err(_) => {
                    Err(FetchError::http_failed("http worker terminated"))
                }
                Ok(Err(err)) => Err(err),
                Ok(Ok(status)) => {
                    let out: DynHttpResponse = Box::new(UreqHttpResponse {
                        status,
                        chunk_recv,
                    });
                    Ok(out)
                }
            }
        })
    }
}

type ChunkSend = tokio::sync::mpsc::UnboundedSender<FetchResult<Bytes>>;
type ChunkRecv = tokio::sync::mpsc::UnboundedReceiver<FetchResult<Bytes>>;
type HeadSend = tokio::sync::oneshot::Sender<FetchResult<u16>>;

/// Runs on the blocking pool: resolve redirects, hand the status over,
/// then stream the body until it ends or the receiving side is gone.
fn blocking_fetch(
    inner: Arc<Inner>,
    request: HttpRequest,
    head_send: HeadSend,
    chunk_send: ChunkSend,
) {
    let response = match resolve_redirects(&inner, &request) {
        Ok(response) => response,
        Err(err) => {
            let _ = head_send.send(Err(err));
            return;
        }
    };

    let status = response.status().as_u16();

    // Freshness comes off the headers before the body consumes the
    // response.
    let cache_ttl = if request.verb == HttpVerb::Get && status == 200 {
        cache::freshness(response.headers())
    } else {
        None
    };

    if head_send.send(Ok(status)).is_err() {
        // cancelled before the head was consumed
        return;
    }

    let mut reader = response.into_body().into_reader();
    let mut cache_buf = cache_ttl.map(|ttl| (ttl, Vec::new()));

    let mut buf = [0u8; READ_CHUNK_BYTES];
    loop {
        use std::io::Read;

        match reader.read(&mut buf) {
            Ok(0) => {
                if let Some((ttl, full)) = cache_buf {
                    inner.cache.put(
                        request.url.as_str(),
                        Bytes::from(full),
                        ttl,
                    );
                }
                return;
            }
            Ok(n) => {
                let chunk = Bytes::copy_from_slice(&buf[..n]);
                if let Some((_, full)) = cache_buf.as_mut() {
                    full.extend_from_slice(&chunk);
                    if full.len() > inner.cache.max_entry_bytes() {
                        cache_buf = None;
                    }
                }
                if chunk_send.send(Ok(chunk)).is_err() {
                    // the response was dropped; stop transferring
                    return;
                }
            }
            Err(err) => {
                let _ = chunk_send.send(Err(FetchError::http_failed_src(
                    "failed reading http response body",
                    err,
                )));
                return;
            }
        }
    }
}

fn resolve_redirects(
    inner: &Inner,
    request: &HttpRequest,
) -> FetchResult<ureq::http::Response<ureq::Body>> {
    let mut url = ::url::Url::parse(request.url.as_str()).map_err(|err| {
        FetchError::fetch_src(
            FetchErrorKind::InvalidUrl,
            "could not parse request url",
            err,
        )
    })?;

    let mut hops = 0;
    loop {
        // every hop is held to the same scheme policy as the initial url
        if url.scheme() != "http" {
            return Err(FetchError::disallowed_scheme(&url));
        }

        let response = issue(inner, request, url.as_str())?;

        if !response.status().is_redirection() {
            return Ok(response);
        }

        hops += 1;
        if hops > inner.max_redirects {
            return Err(FetchError::http_failed(format!(
                "more than {} redirects",
                inner.max_redirects
            )));
        }

        let location = response
            .headers()
            .get(ureq::http::header::LOCATION)
            .and_then(|location| location.to_str().ok())
            .ok_or_else(|| {
                FetchError::http_failed("redirect without a location header")
            })?;

        url = url.join(location).map_err(|err| {
            FetchError::http_failed_src("invalid redirect location", err)
        })?;
    }
}

fn issue(
    inner: &Inner,
    request: &HttpRequest,
    url: &str,
) -> FetchResult<ureq::http::Response<ureq::Body>> {
    match request.verb {
        HttpVerb::Get => {
            let mut req = inner.agent.get(url);
            if let Some(hint) = request.timeout_hint {
                req = req.config().timeout_global(Some(hint)).build();
            }
            req.call()
        }
        HttpVerb::Post => {
            let mut req = inner
                .agent
                .post(url)
                .header("Content-Type", "application/ocsp-request");
            if let Some(hint) = request.timeout_hint {
                req = req.config().timeout_global(Some(hint)).build();
            }
            req.send(request.body.as_deref().unwrap_or(&[]))
        }
    }
    .map_err(|err| FetchError::http_failed_src("http request failed", err))
}

struct UreqHttpResponse {
    status: u16,
    chunk_recv: ChunkRecv,
}

impl std::fmt::Debug for UreqHttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UreqHttpResponse")
            .field("status", &self.status)
            .finish()
    }
}

impl HttpResponse for UreqHttpResponse {
    fn status(&self) -> u16 {
        self.status
    }

    fn read_chunk(&mut self) -> BoxFut<'_, FetchResult<Option<Bytes>>> {
        Box::pin(async move {
            match self.chunk_recv.recv().await {
                Some(Ok(chunk)) => Ok(Some(chunk)),
                Some(Err(err)) => Err(err),
                // the worker closed the channel: end of body
                None => Ok(None),
            }
        })
    }
}

#[derive(Debug)]
struct CachedResponse {
    body: Option<Bytes>,
}

impl HttpResponse for CachedResponse {
    fn status(&self) -> u16 {
        200
    }

    fn read_chunk(&mut self) -> BoxFut<'_, FetchResult<Option<Bytes>>> {
        Box::pin(async move {
            Ok(self.body.take().filter(|body| !body.is_empty()))
        })
    }
}
