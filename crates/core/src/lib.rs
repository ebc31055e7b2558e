#![deny(missing_docs)]
//! Reference implementations of the [Certnet API](certnet_api).

use certnet_api::*;

/// Construct a default builder for use in tests.
///
/// - `http_client` - The default http client is the in-memory
///   [factories::MemHttpClientFactory].
/// - `fetcher` - The default fetcher is
///   [factories::CoreCertNetFetcherFactory].
pub fn default_test_builder() -> builder::Builder {
    builder::Builder {
        config: config::Config::default(),
        http_client: factories::MemHttpClientFactory::create(),
        fetcher: factories::CoreCertNetFetcherFactory::create(),
    }
}

pub mod factories;
