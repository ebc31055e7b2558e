//! Certnet fetch types.
//!
//! The [CertNetFetcher] trait is the front door of this crate: a
//! thread-safe service for fetching certificate-related artifacts by
//! url. Fetch operations return immediately with a [FetchRequest]
//! handle; the eventual result is read by blocking on
//! [FetchRequest::wait_for_result], and dropping a handle without
//! waiting cancels the fetch for that caller.
//!
//! Concurrent fetches with an equal [FetchKey] are coalesced onto a
//! single underlying HTTP request.

use crate::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// The kind of certificate artifact a fetch names.
///
/// The method selects the HTTP verb and the default response size cap
/// applied when the caller does not specify one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchMethod {
    /// CA issuer certificates named by an AIA caIssuers access
    /// description.
    CaIssuers,

    /// A certificate revocation list.
    Crl,

    /// An OCSP response.
    Ocsp,
}

/// The identity under which two fetches may be coalesced.
///
/// While a job exists for a key, every concurrent fetch with an equal
/// key attaches to that job instead of issuing another underlying HTTP
/// request. The timeout is deliberately not part of the key; the first
/// fetch for a key arms the job deadline and later joiners inherit it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchKey {
    /// The url to fetch.
    pub url: FetchUrl,

    /// The artifact kind being fetched.
    pub method: FetchMethod,

    /// The resolved response size cap in bytes.
    pub max_response_bytes: usize,
}

/// A handle to a fetch in progress.
///
/// Dropping the handle without waiting cancels the fetch for this
/// caller. If every handle attached to a job is dropped, the underlying
/// HTTP request is cancelled as well.
pub trait FetchRequest: 'static + Send + std::fmt::Debug {
    /// Block the calling thread until the fetch completes, and take the
    /// result.
    ///
    /// On success the full decoded response body is returned in one
    /// contiguous buffer. On failure the error's [FetchErrorKind]
    /// classifies what went wrong; no partial body is ever delivered.
    ///
    /// Must not be called from the fetcher's network thread: the network
    /// thread is the one that would deliver the result, so waiting there
    /// deadlocks. Debug builds panic instead.
    fn wait_for_result(self: Box<Self>) -> FetchResult<bytes::Bytes>;
}

/// Trait object [FetchRequest].
pub type DynFetchRequest = Box<dyn FetchRequest>;

/// Trait for implementing a certificate artifact fetcher.
///
/// All operations are callable from any thread and return without
/// blocking on the network thread. Errors — including rejection of
/// non-http urls — are delivered exclusively through the returned
/// handle, never synchronously.
///
/// Dropping the last reference to a fetcher tears it down: every
/// in-flight fetch is cancelled and its handles resolve with
/// [FetchErrorKind::Aborted].
pub trait CertNetFetcher: 'static + Send + Sync + std::fmt::Debug {
    /// Fetch CA issuer certificates from an AIA caIssuers url.
    ///
    /// `timeout` and `max_response_bytes` fall back to the configured
    /// per-method defaults when `None`.
    fn fetch_ca_issuers(
        &self,
        url: FetchUrl,
        timeout: Option<Duration>,
        max_response_bytes: Option<usize>,
    ) -> DynFetchRequest;

    /// Fetch a certificate revocation list.
    ///
    /// `timeout` and `max_response_bytes` fall back to the configured
    /// per-method defaults when `None`.
    fn fetch_crl(
        &self,
        url: FetchUrl,
        timeout: Option<Duration>,
        max_response_bytes: Option<usize>,
    ) -> DynFetchRequest;

    /// Fetch an OCSP response.
    ///
    /// `timeout` and `max_response_bytes` fall back to the configured
    /// per-method defaults when `None`.
    fn fetch_ocsp(
        &self,
        url: FetchUrl,
        timeout: Option<Duration>,
        max_response_bytes: Option<usize>,
    ) -> DynFetchRequest;

    /// Get a state summary from the fetcher.
    ///
    /// Must not be awaited from the fetcher's network thread.
    fn state_summary(&self) -> BoxFut<'_, FetchResult<FetcherStateSummary>>;
}

/// Trait object [CertNetFetcher].
pub type DynCertNetFetcher = Arc<dyn CertNetFetcher>;

/// A factory for creating CertNetFetcher instances.
pub trait CertNetFetcherFactory: 'static + Send + Sync + std::fmt::Debug {
    /// Help the builder construct a default config from the chosen
    /// module factories.
    fn default_config(&self, config: &mut config::Config) -> FetchResult<()>;

    /// Validate configuration.
    fn validate_config(&self, config: &config::Config) -> FetchResult<()>;

    /// Construct a CertNetFetcher instance.
    fn create(
        &self,
        builder: Arc<builder::Builder>,
        http_client: DynHttpClient,
    ) -> BoxFut<'static, FetchResult<DynCertNetFetcher>>;
}

/// Trait object [CertNetFetcherFactory].
pub type DynCertNetFetcherFactory = Arc<dyn CertNetFetcherFactory>;

/// Summary of the fetcher state.
#[derive(Debug)]
pub struct FetcherStateSummary {
    /// The jobs currently in flight, with the number of request handles
    /// attached to each.
    pub jobs: HashMap<FetchKey, usize>,
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    fn key(url: &str, method: FetchMethod, max: usize) -> FetchKey {
        FetchKey {
            url: FetchUrl::from_str(url).unwrap(),
            method,
            max_response_bytes: max,
        }
    }

    #[test]
    fn key_identity() {
        let a = key("http://example.com/a.crt", FetchMethod::CaIssuers, 64);
        assert_eq!(
            a,
            key("http://example.com/a.crt", FetchMethod::CaIssuers, 64),
        );

        // every field participates in the identity
        assert_ne!(
            a,
            key("http://example.com/b.crt", FetchMethod::CaIssuers, 64),
        );
        assert_ne!(a, key("http://example.com/a.crt", FetchMethod::Ocsp, 64));
        assert_ne!(
            a,
            key("http://example.com/a.crt", FetchMethod::CaIssuers, 65),
        );
    }
}
