//! Url-related types.

use crate::*;

// We're using bytes::Bytes as the storage type for urls instead of String,
// even though it adds a little complexity overhead to the accessor
// functions here, because fetch keys are cloned on every coalescing
// lookup and Bytes are more cheaply clone-able.

/// A validated absolute url naming a certificate artifact to fetch.
///
/// Any parseable scheme is accepted at construction time. The fetcher
/// only ever issues requests for plain http urls, but rejection of other
/// schemes is delivered asynchronously through the request handle, so the
/// url type itself must be able to carry them.
///
/// Equality is byte-exact on the form supplied by the caller. No
/// canonicalization is performed; two spellings of the same url are two
/// distinct fetch keys.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FetchUrl(bytes::Bytes);

impl From<FetchUrl> for bytes::Bytes {
    fn from(u: FetchUrl) -> Self {
        u.0
    }
}

impl From<&FetchUrl> for bytes::Bytes {
    fn from(u: &FetchUrl) -> Self {
        u.0.clone()
    }
}

impl AsRef<str> for FetchUrl {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::convert::TryFrom<bytes::Bytes> for FetchUrl {
    type Error = FetchError;

    fn try_from(b: bytes::Bytes) -> Result<Self, Self::Error> {
        Self::new(b)
    }
}

impl std::fmt::Display for FetchUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Debug for FetchUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl std::str::FromStr for FetchUrl {
    type Err = FetchError;

    fn from_str(src: &str) -> Result<Self, Self::Err> {
        Self::new(bytes::Bytes::copy_from_slice(src.as_bytes()))
    }
}

impl FetchUrl {
    /// Construct a new validated FetchUrl.
    pub fn new(src: bytes::Bytes) -> FetchResult<Self> {
        let str_src = std::str::from_utf8(&src).map_err(|err| {
            FetchError::fetch_src(
                FetchErrorKind::InvalidUrl,
                "fetch url is not valid utf8",
                err,
            )
        })?;

        ::url::Url::parse(str_src).map_err(|err| {
            FetchError::fetch_src(
                FetchErrorKind::InvalidUrl,
                "could not parse fetch url",
                err,
            )
        })?;

        Ok(Self(src))
    }

    /// Get the url as a string slice.
    pub fn as_str(&self) -> &str {
        // Checked in the constructor.
        std::str::from_utf8(&self.0).expect("fetch url is valid utf8")
    }

    /// Get the scheme of this url.
    pub fn scheme(&self) -> &str {
        let s = self.as_str();
        // An absolute url always carries a `:` after its scheme,
        // checked in the constructor.
        &s[..s.find(':').expect("fetch url is absolute")]
    }

    /// Whether this url may be fetched at all, i.e. is plain http.
    pub fn is_http(&self) -> bool {
        self.scheme().eq_ignore_ascii_case("http")
    }
}
