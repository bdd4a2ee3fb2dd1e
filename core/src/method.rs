//! HTTP methods a route can be registered for.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A registrable HTTP method.
///
/// Covers the common verbs, the WebDAV-style extension verbs, and [`Method::All`],
/// which matches any inbound method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Method {
    Checkout,
    Copy,
    Delete,
    Get,
    Head,
    Lock,
    Merge,
    MkActivity,
    MkCol,
    Move,
    MSearch,
    Notify,
    Options,
    Patch,
    Post,
    Purge,
    Put,
    Report,
    Search,
    Subscribe,
    Trace,
    Unlock,
    Unsubscribe,
    All,
}

/// The method string did not name a known verb.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown HTTP method `{0}`")]
pub struct UnknownMethod(pub String);

impl Method {
    /// Every method, in registration-surface order.
    pub const VARIANTS: [Self; 24] = [
        Self::Checkout,
        Self::Copy,
        Self::Delete,
        Self::Get,
        Self::Head,
        Self::Lock,
        Self::Merge,
        Self::MkActivity,
        Self::MkCol,
        Self::Move,
        Self::MSearch,
        Self::Notify,
        Self::Options,
        Self::Patch,
        Self::Post,
        Self::Purge,
        Self::Put,
        Self::Report,
        Self::Search,
        Self::Subscribe,
        Self::Trace,
        Self::Unlock,
        Self::Unsubscribe,
        Self::All,
    ];

    /// Wire name of the method (`"*"` for [`Method::All`]).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Checkout => "CHECKOUT",
            Self::Copy => "COPY",
            Self::Delete => "DELETE",
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Lock => "LOCK",
            Self::Merge => "MERGE",
            Self::MkActivity => "MKACTIVITY",
            Self::MkCol => "MKCOL",
            Self::Move => "MOVE",
            Self::MSearch => "M-SEARCH",
            Self::Notify => "NOTIFY",
            Self::Options => "OPTIONS",
            Self::Patch => "PATCH",
            Self::Post => "POST",
            Self::Purge => "PURGE",
            Self::Put => "PUT",
            Self::Report => "REPORT",
            Self::Search => "SEARCH",
            Self::Subscribe => "SUBSCRIBE",
            Self::Trace => "TRACE",
            Self::Unlock => "UNLOCK",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::All => "*",
        }
    }

    /// Whether a route registered for `self` accepts an inbound `method`.
    ///
    /// `HEAD` requests are also accepted by `GET` routes.
    #[must_use]
    pub fn accepts(self, method: &http::Method) -> bool {
        match self {
            Self::All => true,
            Self::Get => method == http::Method::GET || method == http::Method::HEAD,
            other => method.as_str() == other.as_str(),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" || s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        Self::VARIANTS
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownMethod(s.to_string()))
    }
}

impl TryFrom<&http::Method> for Method {
    type Error = UnknownMethod;

    fn try_from(method: &http::Method) -> Result<Self, Self::Error> {
        method.as_str().parse()
    }
}
