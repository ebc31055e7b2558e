//! Http transport related types.
//!
//! The fetcher core does not speak HTTP itself. It drives an
//! implementation of the [HttpClient] trait, which is expected to
//! provide:
//!
//! - issuing a GET or POST to a plain http url
//! - automatic redirect following restricted to plain http targets; a
//!   redirect to any other scheme fails the request with
//!   [FetchErrorKind::DisallowedScheme]
//! - transparent decompression, so [HttpResponse::read_chunk] yields
//!   decoded bytes
//! - no cookies and no credentials attached to any request
//! - cancellation by dropping the pending future or the response
//! - optionally, a response cache honoring standard HTTP cache-control
//!   semantics
//!
//! All futures returned by these traits are polled on the fetcher's
//! network thread.

use crate::*;
use std::sync::Arc;

/// The HTTP verb to issue a request with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpVerb {
    /// An HTTP GET.
    Get,

    /// An HTTP POST. Used for large OCSP requests per RFC 6960 §A.1.
    Post,
}

/// Parameters of a single underlying HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// The url to request. The fetcher only ever passes plain http urls.
    pub url: FetchUrl,

    /// The verb to issue the request with.
    pub verb: HttpVerb,

    /// Request body, only meaningful for [HttpVerb::Post].
    pub body: Option<bytes::Bytes>,

    /// Advisory bound for the total transfer time.
    ///
    /// The network thread enforces its own deadline independently of the
    /// transport; implementations may use this hint to release transport
    /// resources (sockets, worker threads) for requests whose result no
    /// one will consume anymore.
    pub timeout_hint: Option<std::time::Duration>,
}

/// An HTTP response with its headers received and its body streaming in.
pub trait HttpResponse: 'static + Send + std::fmt::Debug {
    /// The final HTTP status code.
    fn status(&self) -> u16;

    /// Pull the next chunk of the decoded response body.
    ///
    /// Resolves to `None` at the end of the body. Chunks are delivered
    /// in network order. Dropping the response cancels the transfer.
    fn read_chunk(&mut self) -> BoxFut<'_, FetchResult<Option<bytes::Bytes>>>;
}

/// Trait object [HttpResponse].
pub type DynHttpResponse = Box<dyn HttpResponse>;

/// Trait for implementing the HTTP transport collaborator of the
/// fetcher. See the module docs for the contract an implementation must
/// uphold.
pub trait HttpClient: 'static + Send + Sync + std::fmt::Debug {
    /// Start an HTTP request. The returned future resolves once response
    /// headers are available, yielding the streaming response body.
    ///
    /// Dropping the future before it resolves cancels the request.
    fn start(
        &self,
        request: HttpRequest,
    ) -> BoxFut<'static, FetchResult<DynHttpResponse>>;
}

/// Trait object [HttpClient].
pub type DynHttpClient = Arc<dyn HttpClient>;

/// A factory for creating HttpClient instances.
pub trait HttpClientFactory: 'static + Send + Sync + std::fmt::Debug {
    /// Help the builder construct a default config from the chosen
    /// module factories.
    fn default_config(&self, config: &mut config::Config) -> FetchResult<()>;

    /// Validate configuration.
    fn validate_config(&self, config: &config::Config) -> FetchResult<()>;

    /// Construct an HttpClient instance.
    fn create(
        &self,
        builder: Arc<builder::Builder>,
    ) -> BoxFut<'static, FetchResult<DynHttpClient>>;
}

/// Trait object [HttpClientFactory].
pub type DynHttpClientFactory = Arc<dyn HttpClientFactory>;
