//! Request admissibility and response storability decisions.

use std::collections::HashSet;
use std::fmt;

use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use axum_extra::extract::cookie::CookieJar;

use super::aggregator::AggregatedCacheInfo;
use super::config::CacheConfig;
use super::keys::CacheKey;
use super::tags::sanitize_tags;

/// Request extension set by authentication middleware for a logged-in visitor.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthenticatedSession;

/// The request attributes the admissibility decision looks at.
#[derive(Debug, Clone)]
pub struct RequestFacts<'a> {
    pub method: &'a Method,
    pub host: Option<&'a str>,
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub cookie_names: Vec<String>,
    pub has_auth_signal: bool,
}

impl<'a> RequestFacts<'a> {
    pub fn from_request<B>(request: &'a Request<B>) -> Self {
        let headers = request.headers();
        let host = headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .or_else(|| request.uri().host());
        let cookie_names = CookieJar::from_headers(headers)
            .iter()
            .map(|cookie| cookie.name().to_string())
            .collect();
        let has_auth_signal = headers.contains_key(header::AUTHORIZATION)
            || request.extensions().get::<AuthenticatedSession>().is_some();

        Self {
            method: request.method(),
            host,
            path: request.uri().path(),
            query: request.uri().query(),
            cookie_names,
            has_auth_signal,
        }
    }
}

/// Why a generated response was not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    UncacheableSegment,
    SetCookie,
    NoTags,
    ZeroLifetime,
    Status(StatusCode),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UncacheableSegment => f.write_str("uncacheable_segment"),
            Self::SetCookie => f.write_str("set_cookie"),
            Self::NoTags => f.write_str("no_tags"),
            Self::ZeroLifetime => f.write_str("zero_lifetime"),
            Self::Status(status) => write!(f, "status_{}", status.as_u16()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Storability {
    Storable {
        tags: Vec<String>,
        lifetime: Option<u64>,
    },
    NotStorable(Rejection),
}

/// Pure cacheability decisions derived from [`CacheConfig`].
#[derive(Debug, Clone)]
pub struct Classifier {
    allowed_query: HashSet<String>,
    ignored_query: HashSet<String>,
    ignored_cookies: HashSet<String>,
}

impl Classifier {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            allowed_query: config.query_params.allow.iter().cloned().collect(),
            ignored_query: config.query_params.ignore.iter().cloned().collect(),
            ignored_cookies: config.cookie_params.ignore.iter().cloned().collect(),
        }
    }

    pub fn classify<B>(&self, request: &Request<B>) -> Option<CacheKey> {
        self.classify_request(&RequestFacts::from_request(request))
    }

    /// Cache key for an admissible request, `None` when it must bypass the cache.
    pub fn classify_request(&self, facts: &RequestFacts<'_>) -> Option<CacheKey> {
        if facts.method != Method::GET && facts.method != Method::HEAD {
            return None;
        }

        let mut kept = Vec::new();
        if let Some(query) = facts.query {
            for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
                if self.allowed_query.contains(name.as_ref()) {
                    kept.push((name.into_owned(), value.into_owned()));
                } else if !self.ignored_query.contains(name.as_ref()) {
                    return None;
                }
            }
        }

        if facts
            .cookie_names
            .iter()
            .any(|name| !self.ignored_cookies.contains(name))
        {
            return None;
        }

        if facts.has_auth_signal {
            return None;
        }

        Some(CacheKey::from_parts(facts.host, facts.path, &kept))
    }

    /// Whether a freshly generated response may be stored.
    pub fn classify_response(
        &self,
        info: &AggregatedCacheInfo,
        status: StatusCode,
        headers: &HeaderMap,
    ) -> Storability {
        if info.has_uncacheable_segment {
            return Storability::NotStorable(Rejection::UncacheableSegment);
        }
        if headers.contains_key(header::SET_COOKIE) {
            return Storability::NotStorable(Rejection::SetCookie);
        }
        if info.tags.is_empty() {
            return Storability::NotStorable(Rejection::NoTags);
        }
        if info.lifetime == Some(0) {
            return Storability::NotStorable(Rejection::ZeroLifetime);
        }
        if status != StatusCode::OK {
            return Storability::NotStorable(Rejection::Status(status));
        }

        Storability::Storable {
            tags: sanitize_tags(&info.tags).into_iter().collect(),
            lifetime: info.lifetime,
        }
    }
}
