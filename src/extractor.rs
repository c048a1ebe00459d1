//! Extractors used to read CSRF tokens from requests.
//!
//! [`CsrfToken`] is the one most handlers need: it holds the token the
//! middleware is about to send back in the `Set-Cookie` header, so it can be
//! embedded in a form or handed to JavaScript. [`CsrfHeader`] and
//! [`CsrfCookie`] expose the raw submitted values.

use std::future::{ready, Ready};

use actix_web::dev::{Payload, ServiceRequest};
use actix_web::{FromRequest, HttpMessage, HttpRequest};
use serde::Serialize;

use crate::codec::WireToken;
use crate::{CsrfError, DEFAULT_CSRF_COOKIE_NAME, DEFAULT_CSRF_HEADER_NAME};

/// The token that will be attached to the response.
///
/// Available whenever the middleware issued or rotated a token for this
/// request, or left a valid cookie alone because rotation is disabled. Use
/// `Option<CsrfToken>` in handlers where neither may apply.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Serialize)]
#[serde(transparent)]
pub struct CsrfToken(WireToken);

impl CsrfToken {
    pub(crate) const fn new(token: WireToken) -> Self {
        Self(token)
    }

    /// Retrieves the token value.
    #[must_use]
    pub fn get(&self) -> &str {
        self.0.as_str()
    }

    /// Consumes the struct, returning the underlying string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0.into_inner()
    }
}

impl AsRef<str> for CsrfToken {
    fn as_ref(&self) -> &str {
        self.get()
    }
}

impl FromRequest for CsrfToken {
    type Error = CsrfError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<Self>()
                .cloned()
                .ok_or(CsrfError::MissingToken),
        )
    }
}

/// The token submitted in the CSRF request header.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct CsrfHeader(String);

impl CsrfHeader {
    pub(crate) fn from_service_request(
        header_name: &str,
        req: &ServiceRequest,
    ) -> Result<Self, CsrfError> {
        from_headers(header_name, req.headers())
    }

    /// Retrieves the submitted value.
    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    /// Consumes the struct, returning the underlying string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for CsrfHeader {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromRequest for CsrfHeader {
    type Error = CsrfError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let header_name = req
            .app_data::<CsrfNames>()
            .map_or(DEFAULT_CSRF_HEADER_NAME, |names| names.header_name.as_str());

        ready(from_headers(header_name, req.headers()))
    }
}

fn from_headers(
    header_name: &str,
    headers: &actix_web::http::header::HeaderMap,
) -> Result<CsrfHeader, CsrfError> {
    headers
        .get(header_name)
        .ok_or(CsrfError::MissingToken)
        .and_then(|header| header.to_str().map_err(|_| CsrfError::MalformedToken))
        .map(String::from)
        .map(CsrfHeader)
}

/// The token submitted in the CSRF cookie.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct CsrfCookie(String);

impl CsrfCookie {
    pub(crate) fn from_service_request(
        cookie_name: &str,
        req: &ServiceRequest,
    ) -> Result<Self, CsrfError> {
        req.cookie(cookie_name)
            .ok_or(CsrfError::MissingCookie)
            .map(|cookie| Self(cookie.value().to_string()))
    }

    /// Retrieves the submitted value.
    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    /// Consumes the struct, returning the underlying string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for CsrfCookie {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromRequest for CsrfCookie {
    type Error = CsrfError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let cookie_name = req
            .app_data::<CsrfNames>()
            .map_or(DEFAULT_CSRF_COOKIE_NAME, |names| names.cookie_name.as_str());

        ready(
            req.cookie(cookie_name)
                .ok_or(CsrfError::MissingCookie)
                .map(|cookie| Self(cookie.value().to_string())),
        )
    }
}

/// Cookie and header names for the [`CsrfHeader`] and [`CsrfCookie`]
/// extractors. Register it as app data when not using the default names; see
/// [`CsrfMiddleware::names`](crate::CsrfMiddleware::names).
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct CsrfNames {
    cookie_name: String,
    header_name: String,
}

impl CsrfNames {
    /// Creates a new set of names.
    #[must_use]
    pub const fn new(cookie_name: String, header_name: String) -> Self {
        Self {
            cookie_name,
            header_name,
        }
    }
}

impl Default for CsrfNames {
    fn default() -> Self {
        Self::new(
            DEFAULT_CSRF_COOKIE_NAME.to_owned(),
            DEFAULT_CSRF_HEADER_NAME.to_owned(),
        )
    }
}
