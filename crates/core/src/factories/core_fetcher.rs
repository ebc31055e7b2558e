//! CoreCertNetFetcher is a certnet module for fetching certificate
//! artifacts over plain http on behalf of callers on other threads.
//!
//! In particular it accepts fetch calls from any thread, coalesces
//! duplicate concurrent fetches onto a single underlying HTTP request,
//! enforces per-request deadlines and response size caps, and delivers
//! results back through blocking request handles.
//!
//! It consists of multiple parts:
//! - The front end object CoreCertNetFetcher that callers hold
//! - A dedicated network thread running a single-threaded command loop
//! - Per-key jobs living on the network thread, each driving one
//!   underlying HTTP request
//! - Request slots shared between a caller and the network thread
//!
//! ### Front end CoreCertNetFetcher
//!
//! - Exposes the [CertNetFetcher] fetch operations. Each constructs a
//!   request handle, posts a start command to the network thread and
//!   returns immediately; it never blocks on network work.
//! - Dropping the front end posts a teardown command which cancels every
//!   job, resolves every attached handle as aborted and stops the
//!   network thread.
//!
//! ### Network thread
//!
//! All job and registry state is confined to a single command loop task,
//! so no locking is needed around it. The loop owns the job registry, a
//! map of fetch key to job. Commands arrive over an unbounded channel in
//! FIFO order:
//!
//! - Start commands either attach the handle to the existing job for its
//!   key, or create a new job, arm its deadline and start its HTTP
//!   request.
//! - Cancel commands detach one handle by id; they are no-ops when the
//!   id is attached to nothing, which resolves the race between a caller
//!   dropping its handle and the job completing. A job whose last handle
//!   detaches is cancelled and discarded.
//! - Job events (body data, completion, deadline expiry) are posted by
//!   per-job helper tasks and are tagged with a job id so events from an
//!   already-completed job are discarded.
//!
//! ### Request slots
//!
//! The only state shared across threads is each handle's result slot: a
//! mutex and condvar pair written once by the network thread and read
//! once by the caller in [FetchRequest::wait_for_result].

use certnet_api::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

mod reactor;
use reactor::*;

mod request;
use request::*;

/// CoreCertNetFetcher configuration types.
pub mod config {
    use certnet_api::fetch::FetchMethod;
    use std::time::Duration;

    /// Configuration parameters for
    /// [CoreCertNetFetcherFactory](super::CoreCertNetFetcherFactory).
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct CertNetFetcherConfig {
        /// Timeout in ms applied to fetches that do not specify one.
        /// Default: 15 seconds.
        pub timeout_ms: u32,

        /// Response size cap in bytes applied to CA issuer and OCSP
        /// fetches that do not specify one. Default: 64 KiB.
        pub max_aia_response_bytes: u32,

        /// Response size cap in bytes applied to CRL fetches that do not
        /// specify one. Default: 5 MiB.
        pub max_crl_response_bytes: u32,
    }

    impl Default for CertNetFetcherConfig {
        fn default() -> Self {
            Self {
                timeout_ms: 15_000,
                max_aia_response_bytes: 64 * 1024,
                max_crl_response_bytes: 5 * 1024 * 1024,
            }
        }
    }

    impl CertNetFetcherConfig {
        /// Get the default timeout as a [Duration].
        pub fn timeout(&self) -> Duration {
            Duration::from_millis(self.timeout_ms as u64)
        }

        /// Get the default response size cap for a fetch method.
        pub fn max_response_bytes(&self, method: FetchMethod) -> usize {
            match method {
                FetchMethod::CaIssuers | FetchMethod::Ocsp => {
                    self.max_aia_response_bytes as usize
                }
                FetchMethod::Crl => self.max_crl_response_bytes as usize,
            }
        }
    }

    /// Module-level configuration for CoreCertNetFetcher.
    #[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct CertNetFetcherModConfig {
        /// CoreCertNetFetcher configuration.
        #[serde(default)]
        pub cert_net_fetcher: CertNetFetcherConfig,
    }

    impl certnet_api::config::ModConfig for CertNetFetcherModConfig {}
}

pub use config::*;

/// A production-ready certificate artifact fetcher module.
#[derive(Debug)]
pub struct CoreCertNetFetcherFactory {}

impl CoreCertNetFetcherFactory {
    /// Construct a new CoreCertNetFetcherFactory.
    pub fn create() -> DynCertNetFetcherFactory {
        let out: DynCertNetFetcherFactory = Arc::new(Self {});
        out
    }
}

impl CertNetFetcherFactory for CoreCertNetFetcherFactory {
    fn default_config(
        &self,
        config: &mut certnet_api::config::Config,
    ) -> FetchResult<()> {
        config.set_module_config(&CertNetFetcherModConfig::default())
    }

    fn validate_config(
        &self,
        config: &certnet_api::config::Config,
    ) -> FetchResult<()> {
        let config: CertNetFetcherModConfig = config.get_module_config()?;
        let config = config.cert_net_fetcher;

        if config.timeout_ms == 0 {
            return Err(FetchError::other(
                "certNetFetcher.timeoutMs must be positive",
            ));
        }
        if config.max_aia_response_bytes == 0
            || config.max_crl_response_bytes == 0
        {
            return Err(FetchError::other(
                "certNetFetcher response size caps must be positive",
            ));
        }

        Ok(())
    }

    fn create(
        &self,
        builder: Arc<builder::Builder>,
        http_client: DynHttpClient,
    ) -> BoxFut<'static, FetchResult<DynCertNetFetcher>> {
        Box::pin(async move {
            let config: CertNetFetcherModConfig =
                builder.config.get_module_config()?;
            let out: DynCertNetFetcher = Arc::new(CoreCertNetFetcher::new(
                config.cert_net_fetcher,
                http_client,
            )?);
            Ok(out)
        })
    }
}

#[derive(Debug)]
struct CoreCertNetFetcher {
    config: CertNetFetcherConfig,
    cmd_send: CmdSend,
    reactor_thread: std::thread::ThreadId,
    next_handle_id: AtomicU64,
    reactor_join: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl CoreCertNetFetcher {
    fn new(
        config: CertNetFetcherConfig,
        http_client: DynHttpClient,
    ) -> FetchResult<Self> {
        let (cmd_send, cmd_recv) = tokio::sync::mpsc::unbounded_channel();

        let task_send = cmd_send.clone();
        let reactor_join = std::thread::Builder::new()
            .name("certnet-reactor".into())
            .spawn(move || reactor_thread(http_client, task_send, cmd_recv))
            .map_err(|err| {
                FetchError::other_src("failed to spawn network thread", err)
            })?;
        let reactor_thread = reactor_join.thread().id();

        Ok(Self {
            config,
            cmd_send,
            reactor_thread,
            next_handle_id: AtomicU64::new(0),
            reactor_join: Mutex::new(Some(reactor_join)),
        })
    }

    fn do_fetch(
        &self,
        method: FetchMethod,
        url: FetchUrl,
        timeout: Option<Duration>,
        max_response_bytes: Option<usize>,
    ) -> DynFetchRequest {
        let timeout = timeout.unwrap_or_else(|| self.config.timeout());
        let max_response_bytes = max_response_bytes
            .unwrap_or_else(|| self.config.max_response_bytes(method));

        let key = FetchKey {
            url,
            method,
            max_response_bytes,
        };
        let handle_id =
            HandleId(self.next_handle_id.fetch_add(1, Ordering::Relaxed));
        let slot = Arc::new(RequestSlot::new(self.reactor_thread));

        // The send only fails once the network thread is gone, at which
        // point the fetch is aborted by definition.
        if self
            .cmd_send
            .send(Cmd::StartFetch {
                key: key.clone(),
                timeout,
                handle_id,
                slot: slot.clone(),
            })
            .is_err()
        {
            slot.complete(Err(FetchError::aborted()));
        }

        Box::new(CoreFetchRequest::new(
            key,
            handle_id,
            slot,
            self.cmd_send.clone(),
        ))
    }
}

impl CertNetFetcher for CoreCertNetFetcher {
    fn fetch_ca_issuers(
        &self,
        url: FetchUrl,
        timeout: Option<Duration>,
        max_response_bytes: Option<usize>,
    ) -> DynFetchRequest {
        self.do_fetch(FetchMethod::CaIssuers, url, timeout, max_response_bytes)
    }

    fn fetch_crl(
        &self,
        url: FetchUrl,
        timeout: Option<Duration>,
        max_response_bytes: Option<usize>,
    ) -> DynFetchRequest {
        self.do_fetch(FetchMethod::Crl, url, timeout, max_response_bytes)
    }

    fn fetch_ocsp(
        &self,
        url: FetchUrl,
        timeout: Option<Duration>,
        max_response_bytes: Option<usize>,
    ) -> DynFetchRequest {
        self.do_fetch(FetchMethod::Ocsp, url, timeout, max_response_bytes)
    }

    fn state_summary(&self) -> BoxFut<'_, FetchResult<FetcherStateSummary>> {
        Box::pin(async move {
            let (reply, recv) = tokio::sync::oneshot::channel();
            self.cmd_send
                .send(Cmd::StateSummary { reply })
                .map_err(|_| FetchError::other("network thread stopped"))?;
            recv.await
                .map_err(|_| FetchError::other("network thread stopped"))
        })
    }
}

impl Drop for CoreCertNetFetcher {
    fn drop(&mut self) {
        let _ = self.cmd_send.send(Cmd::Teardown);
        // The teardown command makes the command loop exit promptly even
        // with jobs in flight, so this join is short.
        if let Some(join) = self.reactor_join.lock().unwrap().take() {
            let _ = join.join();
        }
    }
}

#[cfg(test)]
mod test;
