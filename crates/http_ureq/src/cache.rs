//! A small in-memory response cache honoring Cache-Control response
//! directives.
//!
//! Certificate fetches lean on the http layer for caching rather than
//! caching anything themselves, so this sits below the fetcher the way a
//! full http cache would. Only GET responses with status 200 land here.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Parse the freshness lifetime from response headers.
///
/// Honors `Cache-Control: max-age` and treats `no-store` / `no-cache`
/// as not cacheable. Responses carrying neither are treated as not
/// cacheable: for certificate artifacts, re-fetching beats heuristic
/// freshness.
pub(crate) fn freshness(
    headers: &ureq::http::HeaderMap,
) -> Option<Duration> {
    let cache_control = headers
        .get(ureq::http::header::CACHE_CONTROL)?
        .to_str()
        .ok()?;

    let mut max_age = None;
    for directive in cache_control.split(',') {
        let directive = directive.trim();
        if directive.eq_ignore_ascii_case("no-store")
            || directive.eq_ignore_ascii_case("no-cache")
        {
            return None;
        }
        if let Some(value) = directive.strip_prefix("max-age=") {
            max_age = value.parse::<u64>().ok().map(Duration::from_secs);
        }
    }

    max_age.filter(|age| !age.is_zero())
}

struct Entry {
    body: Bytes,
    fresh_until: Instant,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Entry>,
    total_bytes: usize,
}

/// An in-memory response cache with a byte budget.
pub(crate) struct ResponseCache {
    max_bytes: usize,
    state: Mutex<CacheState>,
}

impl ResponseCache {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// The largest single body this cache accepts, so one large CRL
    /// cannot monopolize the budget.
    pub fn max_entry_bytes(&self) -> usize {
        self.max_bytes / 4
    }

    /// Get the cached body for a url, if it is still fresh. Stale
    /// entries are discarded on lookup.
    pub fn get(&self, url: &str) -> Option<Bytes> {
        let mut state = self.state.lock().unwrap();

        let fresh = state
            .entries
            .get(url)
            .map(|entry| entry.fresh_until > Instant::now())?;

        if !fresh {
            let stale = state.entries.remove(url).expect("entry present");
            state.total_bytes -= stale.body.len();
            return None;
        }

        state.entries.get(url).map(|entry| entry.body.clone())
    }

    /// Store a body for a url with the given freshness lifetime.
    pub fn put(&self, url: &str, body: Bytes, ttl: Duration) {
        if body.len() > self.max_entry_bytes() {
            return;
        }

        let mut state = self.state.lock().unwrap();

        if let Some(old) = state.entries.remove(url) {
            state.total_bytes -= old.body.len();
        }

        // Make room: stale entries go first, then arbitrary ones.
        // Certificate fetch working sets are tiny, so eviction order is
        // not worth more bookkeeping than this.
        let now = Instant::now();
        if state.total_bytes + body.len() > self.max_bytes {
            let stale = state
                .entries
                .iter()
                .filter(|(_, entry)| entry.fresh_until <= now)
                .map(|(url, _)| url.clone())
                .collect::<Vec<_>>();
            for url in stale {
                let entry =
                    state.entries.remove(&url).expect("entry present");
                state.total_bytes -= entry.body.len();
            }
        }
        while state.total_bytes + body.len() > self.max_bytes {
            let Some(url) = state.entries.keys().next().cloned() else {
                break;
            };
            let entry = state.entries.remove(&url).expect("entry present");
            state.total_bytes -= entry.body.len();
        }

        state.total_bytes += body.len();
        state.entries.insert(
            url.to_string(),
            Entry {
                body,
                fresh_until: now + ttl,
            },
        );
    }
}
