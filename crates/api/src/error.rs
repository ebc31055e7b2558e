//! Certnet error types.

use std::sync::Arc;

/// A clonable trait-object inner error.
#[derive(Clone, Default)]
pub struct DynInnerError(
    pub Option<Arc<dyn std::error::Error + 'static + Send + Sync>>,
);

impl std::fmt::Debug for DynInnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for DynInnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.as_ref() {
            None => f.write_str("None"),
            Some(s) => s.fmt(f),
        }
    }
}

impl std::error::Error for DynInnerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.as_ref().map(|s| {
            let out: &(dyn std::error::Error + 'static) = &**s;
            out
        })
    }
}

impl DynInnerError {
    /// Construct a new DynInnerError from a source error.
    pub fn new<E: std::error::Error + 'static + Send + Sync>(e: E) -> Self {
        Self(Some(Arc::new(e)))
    }
}

/// Classification of a failed fetch, as delivered through a request
/// handle.
///
/// A successful fetch is represented by `Ok(body)`, so there is no `Ok`
/// member here. Failed fetches always carry an empty body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    /// The initial URL or a redirect target was not plain http.
    DisallowedScheme,

    /// The accumulated response body would have exceeded the response
    /// size cap for this fetch.
    FileTooBig,

    /// The deadline elapsed before the fetch completed.
    TimedOut,

    /// Transport-level failure, name resolution failure, or a non-200
    /// final HTTP status.
    HttpFailed,

    /// The fetch was abandoned because the fetcher was torn down.
    Aborted,

    /// The URL could not be parsed. Never delivered through a request
    /// handle; surfaced synchronously when constructing a [FetchUrl].
    ///
    /// [FetchUrl]: crate::FetchUrl
    InvalidUrl,
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::DisallowedScheme => "DisallowedScheme",
            Self::FileTooBig => "FileTooBig",
            Self::TimedOut => "TimedOut",
            Self::HttpFailed => "HttpFailed",
            Self::Aborted => "Aborted",
            Self::InvalidUrl => "InvalidUrl",
        })
    }
}

/// The core certnet error type. This type is used in all external
/// certnet apis as well as internally in some modules.
///
/// This type is required to implement `Clone` because a completed fetch
/// fans its result out to every request handle attached to the job.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// A failed fetch, classified by [FetchErrorKind].
    #[error("{kind}: {ctx} (src: {src})")]
    Fetch {
        /// The failure classification.
        kind: FetchErrorKind,

        /// Any context associated with this error.
        ctx: Arc<str>,

        /// The inner error (if any).
        #[source]
        src: DynInnerError,
    },

    /// Generic certnet internal error.
    #[error("{ctx} (src: {src})")]
    Other {
        /// Any context associated with this error.
        ctx: Arc<str>,

        /// The inner error (if any).
        #[source]
        src: DynInnerError,
    },
}

impl FetchError {
    /// Construct a classified fetch failure.
    pub fn fetch<C: std::fmt::Display>(kind: FetchErrorKind, ctx: C) -> Self {
        Self::Fetch {
            kind,
            ctx: ctx.to_string().into_boxed_str().into(),
            src: DynInnerError::default(),
        }
    }

    /// Construct a classified fetch failure with an inner source error.
    pub fn fetch_src<
        C: std::fmt::Display,
        S: std::error::Error + 'static + Send + Sync,
    >(
        kind: FetchErrorKind,
        ctx: C,
        src: S,
    ) -> Self {
        Self::Fetch {
            kind,
            ctx: ctx.to_string().into_boxed_str().into(),
            src: DynInnerError::new(src),
        }
    }

    /// Construct an "other" error.
    pub fn other<C: std::fmt::Display>(ctx: C) -> Self {
        Self::Other {
            ctx: ctx.to_string().into_boxed_str().into(),
            src: DynInnerError::default(),
        }
    }

    /// Construct an "other" error with an inner source error.
    pub fn other_src<
        C: std::fmt::Display,
        S: std::error::Error + 'static + Send + Sync,
    >(
        ctx: C,
        src: S,
    ) -> Self {
        Self::Other {
            ctx: ctx.to_string().into_boxed_str().into(),
            src: DynInnerError::new(src),
        }
    }

    /// The failure classification, if this is a classified fetch failure.
    pub fn kind(&self) -> Option<FetchErrorKind> {
        match self {
            Self::Fetch { kind, .. } => Some(*kind),
            Self::Other { .. } => None,
        }
    }

    /// Shorthand for a [FetchErrorKind::DisallowedScheme] failure.
    pub fn disallowed_scheme<C: std::fmt::Display>(url: C) -> Self {
        Self::fetch(
            FetchErrorKind::DisallowedScheme,
            format!("only plain http urls may be fetched: {url}"),
        )
    }

    /// Shorthand for a [FetchErrorKind::FileTooBig] failure.
    pub fn file_too_big(max_response_bytes: usize) -> Self {
        Self::fetch(
            FetchErrorKind::FileTooBig,
            format!("response body exceeds {max_response_bytes} bytes"),
        )
    }

    /// Shorthand for a [FetchErrorKind::TimedOut] failure.
    pub fn timed_out() -> Self {
        Self::fetch(FetchErrorKind::TimedOut, "fetch deadline elapsed")
    }

    /// Shorthand for a [FetchErrorKind::HttpFailed] failure.
    pub fn http_failed<C: std::fmt::Display>(ctx: C) -> Self {
        Self::fetch(FetchErrorKind::HttpFailed, ctx)
    }

    /// Shorthand for a [FetchErrorKind::HttpFailed] failure with an inner
    /// source error.
    pub fn http_failed_src<
        C: std::fmt::Display,
        S: std::error::Error + 'static + Send + Sync,
    >(
        ctx: C,
        src: S,
    ) -> Self {
        Self::fetch_src(FetchErrorKind::HttpFailed, ctx, src)
    }

    /// Shorthand for a [FetchErrorKind::Aborted] failure.
    pub fn aborted() -> Self {
        Self::fetch(FetchErrorKind::Aborted, "fetch abandoned")
    }

    /// Ensure this error carries a classification, applying the given
    /// kind when it does not.
    pub fn classify_or(self, kind: FetchErrorKind) -> Self {
        match self {
            Self::Other { ctx, src } => Self::Fetch { kind, ctx, src },
            classified => classified,
        }
    }
}

/// The core certnet result type.
pub type FetchResult<T> = Result<T, FetchError>;
