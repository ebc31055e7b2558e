//! Test utilities for certnet.

pub mod http_server;

/// Enable tracing with the RUST_LOG environment variable.
///
/// This is intended to be used in tests, so it defaults to DEBUG level.
pub fn enable_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::Level::DEBUG.into())
                .from_env_lossy(),
        )
        .try_init();
}

/// Run a check block repeatedly until it breaks out, panicking if it
/// has not done so within the timeout (in ms, default 1000).
///
/// ```ignore
/// iter_check!({
///     if done() {
///         break;
///     }
/// });
/// ```
#[macro_export]
macro_rules! iter_check {
    ($timeout_ms:literal, $body:block) => {{
        let deadline = std::time::Instant::now()
            + std::time::Duration::from_millis($timeout_ms);
        loop {
            $body

            if std::time::Instant::now() > deadline {
                panic!("iter_check timed out");
            }

            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }};
    ($body:block) => {
        $crate::iter_check!(1000, $body)
    };
}
