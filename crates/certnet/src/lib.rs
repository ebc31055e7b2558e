#![deny(missing_docs)]
//! Certnet fetches certificate-related artifacts (CA issuer
//! certificates, certificate revocation lists, OCSP responses) over
//! plain http, on behalf of a certificate verifier running on a
//! different thread from the network I/O machinery.
//!
//! Fetch operations are callable from any thread and return a handle
//! immediately; results are read by blocking on the handle, and
//! dropping a handle cancels the fetch for that caller. Concurrent
//! fetches for the same url are coalesced onto a single underlying HTTP
//! request.
//!
//! ## Example
//!
//! ```no_run
//! # async fn example() -> certnet_api::FetchResult<()> {
//! use certnet_api::*;
//! use std::str::FromStr;
//!
//! let builder = certnet::default_builder().with_default_config()?.build();
//! let fetcher = certnet::build_fetcher(builder).await?;
//!
//! let request = fetcher.fetch_ca_issuers(
//!     FetchUrl::from_str("http://example.com/int.crt")?,
//!     None,
//!     None,
//! );
//!
//! // reading the result blocks, so hand it to a thread that may block
//! let body = tokio::task::spawn_blocking(move || {
//!     request.wait_for_result()
//! })
//! .await
//! .unwrap()?;
//! # Ok(())
//! # }
//! ```

use certnet_api::builder::Builder;
use certnet_api::config::Config;
use certnet_api::{DynCertNetFetcher, FetchResult};
use std::sync::Arc;

/// Construct a production-ready default builder.
///
/// - `http_client` - The default http client is
///   [factories::UreqHttpClientFactory].
/// - `fetcher` - The default fetcher is
///   [factories::CoreCertNetFetcherFactory].
pub fn default_builder() -> Builder {
    Builder {
        config: Config::default(),
        http_client: factories::UreqHttpClientFactory::create(),
        fetcher: factories::CoreCertNetFetcherFactory::create(),
    }
}

/// Create the http client and fetcher modules from a frozen builder.
pub async fn build_fetcher(
    builder: Arc<Builder>,
) -> FetchResult<DynCertNetFetcher> {
    let http_client = builder.http_client.create(builder.clone()).await?;
    builder.fetcher.create(builder.clone(), http_client).await
}

pub mod factories;
