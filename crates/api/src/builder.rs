//! Builder-related types.

use crate::*;
use std::sync::Arc;

/// The general certnet builder.
/// This contains both configuration and factory instances,
/// allowing construction of runtime module instances.
pub struct Builder {
    /// The module configuration to be used when building modules.
    /// This can be loaded from disk or modified before freezing the
    /// builder.
    pub config: config::Config,

    /// The [http::HttpClientFactory] to be used for creating
    /// [http::HttpClient] instances.
    pub http_client: http::DynHttpClientFactory,

    /// The [fetch::CertNetFetcherFactory] to be used for creating
    /// [fetch::CertNetFetcher] instances.
    pub fetcher: fetch::DynCertNetFetcherFactory,
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("config", &self.config)
            .finish()
    }
}

impl Builder {
    /// Populate the config with defaults given the configured module
    /// factories. Note, this should be called before freezing the
    /// Builder instance in an Arc<>.
    pub fn set_default_config(&mut self) -> FetchResult<()> {
        let Self {
            config,
            http_client,
            fetcher,
        } = self;

        http_client.default_config(config)?;
        fetcher.default_config(config)?;

        Ok(())
    }

    /// Chaining version of [Builder::set_default_config].
    pub fn with_default_config(mut self) -> FetchResult<Self> {
        self.set_default_config()?;
        Ok(self)
    }

    /// Validate the configuration against the configured module
    /// factories.
    pub fn validate_config(&self) -> FetchResult<()> {
        self.http_client.validate_config(&self.config)?;
        self.fetcher.validate_config(&self.config)?;
        Ok(())
    }

    /// Freeze this builder so module factories can be invoked with it.
    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }
}
