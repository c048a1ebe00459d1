//! Request provenance checks based on the `Origin` and `Referer` headers.
//!
//! [`SameOrigin`] is deliberately stricter than most CSRF filters: a request
//! carrying neither header is never considered same-origin. Clients that strip
//! both headers cannot make state-changing requests through the middleware,
//! even with a valid token pair. Substitute your own [`OriginCheck`] if this
//! is not the policy you want.

use std::fmt;
use std::str::FromStr;

use actix_web::dev::RequestHead;
use actix_web::http::header::{self, HeaderMap};
use actix_web::http::Uri;
use serde::Deserialize;

use crate::ConfigError;

/// The (scheme, host, port) triple requests are expected to come from.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Deserialize)]
#[serde(try_from = "String")]
pub struct ExpectedOrigin {
    scheme: String,
    host: String,
    port: Option<u16>,
    default_ports: bool,
}

impl ExpectedOrigin {
    /// Creates an expected origin. Scheme and host are matched
    /// case-insensitively.
    ///
    /// The port is compared exactly as given: `None` only matches origins
    /// without an explicit port. See
    /// [`with_default_ports`](Self::with_default_ports) to relax this.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOrigin`] if the scheme or host is empty
    /// or contains characters that cannot appear in an origin.
    pub fn new<S, H>(scheme: S, host: H, port: Option<u16>) -> Result<Self, ConfigError>
    where
        S: AsRef<str>,
        H: AsRef<str>,
    {
        let (scheme, host) = (scheme.as_ref(), host.as_ref());
        let valid_scheme = scheme
            .bytes()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
            && scheme
                .bytes()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, b'+' | b'-' | b'.'));
        let valid_host = !host.is_empty()
            && !host
                .bytes()
                .any(|c| c.is_ascii_whitespace() || matches!(c, b'/' | b'?' | b'#' | b'@'));

        if !valid_scheme || !valid_host {
            return Err(ConfigError::InvalidOrigin(format!("{scheme}://{host}")));
        }

        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            host: host.to_ascii_lowercase(),
            port,
            default_ports: false,
        })
    }

    /// When enabled, a missing port is treated as the scheme's default port
    /// (80 for `http`, 443 for `https`) on both sides of the comparison.
    #[must_use]
    pub const fn with_default_ports(mut self, enabled: bool) -> Self {
        self.default_ports = enabled;
        self
    }

    /// The expected scheme, lowercased.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The expected host, lowercased.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The expected port, if one was given.
    #[must_use]
    pub const fn port(&self) -> Option<u16> {
        self.port
    }

    /// Returns true if the scheme, host and port of `uri` match.
    #[must_use]
    pub fn matches(&self, uri: &Uri) -> bool {
        let (Some(scheme), Some(host)) = (uri.scheme_str(), uri.host()) else {
            return false;
        };

        scheme.eq_ignore_ascii_case(&self.scheme)
            && host.eq_ignore_ascii_case(&self.host)
            && self.effective_port(uri.port_u16()) == self.effective_port(self.port)
    }

    fn effective_port(&self, port: Option<u16>) -> Option<u16> {
        if !self.default_ports {
            return port;
        }

        port.or(match self.scheme.as_str() {
            "http" => Some(80),
            "https" => Some(443),
            _ => None,
        })
    }
}

impl fmt::Display for ExpectedOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        Ok(())
    }
}

impl FromStr for ExpectedOrigin {
    type Err = ConfigError;

    /// Parses an origin such as `https://example.com:8443`. A trailing `/` is
    /// allowed; any other path, query or user info is not.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidOrigin(s.to_owned());
        let uri: Uri = s.parse().map_err(|_| invalid())?;

        let path_is_root = matches!(uri.path(), "" | "/");
        let has_user_info = uri
            .authority()
            .is_some_and(|authority| authority.as_str().contains('@'));
        if !path_is_root || uri.query().is_some() || has_user_info {
            return Err(invalid());
        }

        match (uri.scheme_str(), uri.host()) {
            (Some(scheme), Some(host)) => Self::new(scheme, host, uri.port_u16()),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for ExpectedOrigin {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Decides whether a request comes from the expected origin.
///
/// Implemented for [`SameOrigin`] and for any
/// `Fn(&RequestHead, &ExpectedOrigin) -> bool` closure, so checks can be
/// swapped out without wrapping the middleware.
pub trait OriginCheck: Send + Sync {
    /// Returns true if the request should be treated as same-origin.
    fn check(&self, req: &RequestHead, expected: &ExpectedOrigin) -> bool;
}

impl<F> OriginCheck for F
where
    F: Fn(&RequestHead, &ExpectedOrigin) -> bool + Send + Sync,
{
    fn check(&self, req: &RequestHead, expected: &ExpectedOrigin) -> bool {
        self(req, expected)
    }
}

/// The default [`OriginCheck`].
///
/// 1. If `Origin` is present, it alone decides.
/// 2. Otherwise, if `Referer` is present, its scheme, host and port decide.
/// 3. Otherwise the request is rejected.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct SameOrigin;

impl OriginCheck for SameOrigin {
    fn check(&self, req: &RequestHead, expected: &ExpectedOrigin) -> bool {
        is_same_origin(&req.headers, expected)
    }
}

/// Runs the [`SameOrigin`] algorithm over a header map.
#[must_use]
pub fn is_same_origin(headers: &HeaderMap, expected: &ExpectedOrigin) -> bool {
    let source = headers
        .get(header::ORIGIN)
        .or_else(|| headers.get(header::REFERER));

    source
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<Uri>().ok())
        .is_some_and(|uri| expected.matches(&uri))
}

#[cfg(test)]
mod tests {
    use actix_web::test::TestRequest;

    use super::*;

    fn expected() -> ExpectedOrigin {
        ExpectedOrigin::new("https", "example.com", None).unwrap()
    }

    fn check(req: TestRequest, expected: &ExpectedOrigin) -> bool {
        SameOrigin.check(req.to_http_request().head(), expected)
    }

    #[test]
    fn matching_origin() {
        let req = TestRequest::default().insert_header((header::ORIGIN, "https://example.com"));
        assert!(check(req, &expected()));
    }

    #[test]
    fn origin_is_case_insensitive() {
        let req = TestRequest::default().insert_header((header::ORIGIN, "HTTPS://Example.COM"));
        assert!(check(req, &expected()));
    }

    #[test]
    fn mismatched_origin() {
        for origin in [
            "https://evil.com",
            "http://example.com",
            "https://example.com:8443",
            "https://example.com.evil.com",
            "null",
            "",
        ] {
            let req = TestRequest::default().insert_header((header::ORIGIN, origin));
            assert!(!check(req, &expected()), "{origin} accepted");
        }
    }

    #[test]
    fn origin_wins_over_referer() {
        let req = TestRequest::default()
            .insert_header((header::ORIGIN, "https://evil.com"))
            .insert_header((header::REFERER, "https://example.com/form"));
        assert!(!check(req, &expected()));

        let req = TestRequest::default()
            .insert_header((header::ORIGIN, "https://example.com"))
            .insert_header((header::REFERER, "https://evil.com/form"));
        assert!(check(req, &expected()));
    }

    #[test]
    fn unusable_origin_does_not_fall_back_to_referer() {
        for origin in ["null", "not a uri", ""] {
            let req = TestRequest::default()
                .insert_header((header::ORIGIN, origin))
                .insert_header((header::REFERER, "https://example.com/form"));
            assert!(!check(req, &expected()), "{origin} fell back to referer");
        }
    }

    #[test]
    fn referer_fallback() {
        let req = TestRequest::default()
            .insert_header((header::REFERER, "https://example.com/some/path?query=param"));
        assert!(check(req, &expected()));

        let req = TestRequest::default().insert_header((header::REFERER, "https://evil.com/"));
        assert!(!check(req, &expected()));
    }

    #[test]
    fn missing_headers_fail_closed() {
        assert!(!check(TestRequest::default(), &expected()));
    }

    #[test]
    fn ports_compare_exactly_by_default() {
        let with_port = ExpectedOrigin::new("https", "example.com", Some(443)).unwrap();
        let req = TestRequest::default().insert_header((header::ORIGIN, "https://example.com"));
        assert!(!check(req, &with_port));

        let req =
            TestRequest::default().insert_header((header::ORIGIN, "https://example.com:443"));
        assert!(!check(req, &expected()));

        let req =
            TestRequest::default().insert_header((header::ORIGIN, "https://example.com:443"));
        assert!(check(req, &with_port));
    }

    #[test]
    fn default_ports_when_enabled() {
        let lenient = expected().with_default_ports(true);
        let req =
            TestRequest::default().insert_header((header::ORIGIN, "https://example.com:443"));
        assert!(check(req, &lenient));

        let req = TestRequest::default().insert_header((header::ORIGIN, "https://example.com:80"));
        assert!(!check(req, &lenient));
    }

    #[test]
    fn closures_are_checks() {
        let allow_all = |_: &RequestHead, _: &ExpectedOrigin| true;
        assert!(allow_all.check(TestRequest::default().to_http_request().head(), &expected()));
    }

    #[test]
    fn parse_expected_origin() {
        let origin: ExpectedOrigin = "https://Example.com:8443/".parse().unwrap();
        assert_eq!(origin.scheme(), "https");
        assert_eq!(origin.host(), "example.com");
        assert_eq!(origin.port(), Some(8443));
        assert_eq!(origin.to_string(), "https://example.com:8443");

        for bad in [
            "example.com",
            "https://example.com/path",
            "https://example.com/?q=1",
            "https://user@example.com",
            "",
        ] {
            assert!(bad.parse::<ExpectedOrigin>().is_err(), "{bad} parsed");
        }
    }
}
