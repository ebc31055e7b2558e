//! Factories for generating instances of certnet modules.

pub use certnet_core::factories::{
    CertNetFetcherConfig, CertNetFetcherModConfig, CoreCertNetFetcherFactory,
    MemHttpClient, MemHttpClientFactory, MemRoute,
};
pub use certnet_http_ureq::{
    UreqHttpClient, UreqHttpClientConfig, UreqHttpClientFactory,
    UreqHttpClientModConfig,
};
