//! Immutable policy shared by every request a middleware handles.

use std::collections::HashSet;

use actix_web::http::Method;
use cookie::SameSite;
use serde::{Deserialize, Deserializer};

use crate::origin::ExpectedOrigin;
use crate::{DEFAULT_CSRF_COOKIE_NAME, DEFAULT_CSRF_HEADER_NAME};

/// Configuration of a [`CsrfMiddleware`](crate::CsrfMiddleware).
///
/// Usually assembled through the builder methods on the middleware, but it
/// can also be deserialized from an application's configuration file. Only
/// `expected_origin` is required:
///
/// ```
/// use actix_signed_csrf::CsrfConfig;
///
/// let config: CsrfConfig = serde_json::from_str(r#"{
///     "expected_origin": "https://example.com",
///     "header_name": "X-CSRF-Token",
///     "same_site": "lax"
/// }"#).unwrap();
/// assert_eq!(config.header_name(), "X-CSRF-Token");
/// ```
#[derive(Clone, Eq, PartialEq, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CsrfConfig {
    pub(crate) expected_origin: ExpectedOrigin,
    #[serde(default = "default_cookie_name")]
    pub(crate) cookie_name: String,
    #[serde(default = "default_header_name")]
    pub(crate) header_name: String,
    #[serde(default = "default_true")]
    pub(crate) create_if_not_found: bool,
    #[serde(default = "default_true")]
    pub(crate) rotate: bool,
    /// If false, will not check at all for CSRF tokens
    #[serde(default = "default_true")]
    pub(crate) enabled: bool,
    #[serde(
        default = "default_safe_methods",
        deserialize_with = "deserialize_methods"
    )]
    pub(crate) safe_methods: HashSet<Method>,
    #[serde(default = "default_true")]
    pub(crate) http_only: bool,
    #[serde(default = "default_true")]
    pub(crate) secure: bool,
    #[serde(
        default = "default_same_site",
        deserialize_with = "deserialize_same_site"
    )]
    pub(crate) same_site: Option<SameSite>,
    #[serde(default)]
    pub(crate) domain: Option<String>,
    #[serde(default = "default_path")]
    pub(crate) path: String,
}

impl CsrfConfig {
    /// Creates a configuration with secure defaults for the given origin.
    #[must_use]
    pub fn new(expected_origin: ExpectedOrigin) -> Self {
        Self {
            expected_origin,
            cookie_name: default_cookie_name(),
            header_name: default_header_name(),
            create_if_not_found: true,
            rotate: true,
            enabled: true,
            safe_methods: default_safe_methods(),
            http_only: true,
            secure: true,
            same_site: default_same_site(),
            domain: None,
            path: default_path(),
        }
    }

    /// Returns true if requests with this method skip token validation.
    #[must_use]
    pub fn is_safe(&self, method: &Method) -> bool {
        self.safe_methods.contains(method)
    }

    /// The origin unsafe requests must come from.
    #[must_use]
    pub const fn expected_origin(&self) -> &ExpectedOrigin {
        &self.expected_origin
    }

    /// Name of the cookie carrying the token.
    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Name of the request header carrying the token on unsafe requests.
    #[must_use]
    pub fn header_name(&self) -> &str {
        &self.header_name
    }

    /// Whether safe requests without a valid token get a new one.
    #[must_use]
    pub const fn create_if_not_found(&self) -> bool {
        self.create_if_not_found
    }

    /// Whether valid tokens are re-encoded on every response.
    #[must_use]
    pub const fn rotate(&self) -> bool {
        self.rotate
    }

    /// Whether the middleware does anything at all.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }
}

fn default_cookie_name() -> String {
    DEFAULT_CSRF_COOKIE_NAME.to_owned()
}

fn default_header_name() -> String {
    DEFAULT_CSRF_HEADER_NAME.to_owned()
}

const fn default_true() -> bool {
    true
}

fn default_safe_methods() -> HashSet<Method> {
    [Method::GET, Method::HEAD, Method::OPTIONS, Method::TRACE]
        .into_iter()
        .collect()
}

#[allow(clippy::unnecessary_wraps)]
const fn default_same_site() -> Option<SameSite> {
    Some(SameSite::Strict)
}

fn default_path() -> String {
    "/".to_owned()
}

fn deserialize_methods<'de, D>(deserializer: D) -> Result<HashSet<Method>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<String>::deserialize(deserializer)?
        .into_iter()
        .map(|method| {
            Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .map_err(|_| serde::de::Error::custom(format!("invalid method {method:?}")))
        })
        .collect()
}

fn deserialize_same_site<'de, D>(deserializer: D) -> Result<Option<SameSite>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|value| match value.to_ascii_lowercase().as_str() {
            "strict" => Ok(SameSite::Strict),
            "lax" => Ok(SameSite::Lax),
            "none" => Ok(SameSite::None),
            _ => Err(serde::de::Error::custom(format!(
                "invalid SameSite value {value:?}"
            ))),
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config: CsrfConfig =
            serde_json::from_str(r#"{ "expected_origin": "https://example.com" }"#).unwrap();
        let origin = ExpectedOrigin::new("https", "example.com", None).unwrap();
        assert_eq!(config, CsrfConfig::new(origin));
        assert!(config.is_safe(&Method::GET));
        assert!(config.is_safe(&Method::TRACE));
        assert!(!config.is_safe(&Method::POST));
        assert_eq!(config.cookie_name(), DEFAULT_CSRF_COOKIE_NAME);
        assert_eq!(config.same_site, Some(SameSite::Strict));
    }

    #[test]
    fn overrides() {
        let config: CsrfConfig = serde_json::from_str(
            r#"{
                "expected_origin": "http://localhost:8080",
                "cookie_name": "csrf",
                "create_if_not_found": false,
                "rotate": false,
                "safe_methods": ["get", "HEAD"],
                "same_site": null,
                "domain": "example.com"
            }"#,
        )
        .unwrap();
        assert_eq!(config.expected_origin().port(), Some(8080));
        assert_eq!(config.cookie_name(), "csrf");
        assert!(!config.create_if_not_found());
        assert!(!config.rotate());
        assert!(config.is_safe(&Method::HEAD));
        assert!(!config.is_safe(&Method::OPTIONS));
        assert_eq!(config.same_site, None);
        assert_eq!(config.domain.as_deref(), Some("example.com"));
    }

    #[test]
    fn rejects_bad_values() {
        for bad in [
            r#"{}"#,
            r#"{ "expected_origin": "not an origin" }"#,
            r#"{ "expected_origin": "https://example.com", "same_site": "sometimes" }"#,
            r#"{ "expected_origin": "https://example.com", "safe_methods": ["GE T"] }"#,
            r#"{ "expected_origin": "https://example.com", "typo": true }"#,
        ] {
            assert!(serde_json::from_str::<CsrfConfig>(bad).is_err(), "{bad}");
        }
    }
}
