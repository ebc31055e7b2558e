#![deny(missing_docs)]
//! Certnet API contains the certnet module traits and the basic types
//! required to define the api of those traits.
//!
//! The fetcher defined here retrieves certificate-related artifacts
//! (CA issuer certificates, certificate revocation lists, OCSP responses)
//! identified by URL, on behalf of a certificate verifier that runs on a
//! different thread from the network I/O machinery.
//!
//! If you want a ready-to-use fetcher, please see the certnet crate.

/// Boxed future type.
pub type BoxFut<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

pub mod builder;
pub mod config;

mod error;
pub use error::*;

mod url;
pub use url::*;

pub mod fetch;
pub use fetch::*;

pub mod http;
pub use http::*;
