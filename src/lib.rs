#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery, clippy::cargo, missing_docs)]

//! This crate provides a CSRF middleware to help protect endpoints.
//!
//! The primary entry point is [`CsrfMiddleware`], which provides a stateless
//! CSRF mitigation through a signed double-submit cookie pattern, combined
//! with an `Origin`/`Referer` check.
//!
//! ## The Double-Submit Cookie Pattern
//!
//! [`CsrfMiddleware`] uses the double-submit cookie pattern as the mechanism
//! for CSRF mitigation. Generally speaking, the double-submit process is as
//! follows:
//!
//! - User submits a safe request (such as a `GET` for a login form). The
//! server will respond with a `Set-Cookie` header containing the CSRF token.
//! - The user then submits a state-changing request that contains the CSRF
//! token in a custom header, in addition to the cookie.
//! - The server then validates that the token in the header and the token in
//! the cookie carry the same secret. If they do, and the request comes from
//! the expected origin, the request is allowed to proceed.
//!
//! For more information why this works, see the [Owasp Cheat Sheet][double
//! submit] on Double-Submit Cookies.
//!
//! ## Signed, Rotating Tokens
//!
//! The secret bound to a client (a [`RawVerifier`]) is never sent as is.
//! Every time it leaves the server it is salted with a fresh [`Clock`]
//! reading and signed with the middleware's [`SigningKey`], producing a
//! [`WireToken`]. The cookie is re-encoded on every successful response, so
//! two responses never carry the same token bytes even though the secret
//! stays the same. This defeats compression side channels such as
//! [BREACH](http://breachattack.com/), and the signature means forged or
//! tampered tokens are refused before they are ever compared.
//!
//! ## Request Handling
//!
//! - Safe methods (`GET`, `HEAD`, `OPTIONS`, `TRACE` by default) always reach
//! the handler. A valid cookie is rotated; a missing or invalid one is
//! replaced with a new token if
//! [`create_if_not_found`](CsrfMiddleware::create_if_not_found) is set.
//! - Every other method needs the token in both the cookie and the header.
//! Both must be validly signed, carry the same verifier, and the request must
//! pass the [`OriginCheck`]. Otherwise the response is `403 Forbidden`, and no
//! cookie is set.
//!
//! The default [`SameOrigin`] check rejects requests that carry neither an
//! `Origin` nor a `Referer` header, even with a valid token pair. This is a
//! deliberate fail-closed policy; supply a different [`OriginCheck`] to relax
//! it.
//!
//! ## Usage
//!
//! Build the middleware once and share it between workers, so that every
//! worker signs with the same key:
//!
//! ```no_run
//! # use actix_web::{App, HttpServer};
//! use actix_signed_csrf::{CsrfMiddleware, ExpectedOrigin};
//! use rand::rngs::StdRng;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let origin: ExpectedOrigin = "https://example.com".parse()?;
//! let csrf = CsrfMiddleware::<StdRng>::new(origin)?;
//!
//! HttpServer::new(move || App::new().wrap(csrf.clone()))
//!     .bind(("127.0.0.1", 8080))?
//!     .run()
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! Handlers that need the token, for example to embed it in a page, can use
//! the [`CsrfToken`](extractor::CsrfToken) extractor:
//!
//! ```
//! # use actix_web::{HttpResponse, Responder, get};
//! use actix_signed_csrf::extractor::CsrfToken;
//!
//! #[get("/login")]
//! async fn login_ui(token: CsrfToken) -> impl Responder {
//!     // `token` holds the value that will be sent as a cookie. Any encoding
//!     // of the same secret is accepted in the header, so this can be
//!     // rendered into the page for scripts to send back.
//!     HttpResponse::Ok().body(format!("<meta name=\"csrf\" content=\"{}\">", token.get()))
//! }
//! ```
//!
//! ## Defense-in-depth Measures
//!
//! By default, this middleware uses various defense-in-depth measures, such
//! as using a `__Host-` prefix, requiring the cookie to be `secure`,
//! `HttpOnly`, and `SameSite=Strict`. However, it is always recommended to
//! implement more; suggestions are deferred to the [Owasp Cheat Sheet].
//!
//! [double submit]: https://cheatsheetseries.owasp.org/cheatsheets/Cross-Site_Request_Forgery_Prevention_Cheat_Sheet.html#double-submit-cookie
//! [Owasp Cheat sheet]: https://cheatsheetseries.owasp.org/cheatsheets/Cross-Site_Request_Forgery_Prevention_Cheat_Sheet.html

use std::fmt;
use std::future::{self, Future, Ready};
use std::marker::PhantomData;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};

use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{self, HeaderValue};
use actix_web::http::{Method, StatusCode};
use actix_web::{HttpMessage, HttpResponse, ResponseError};
use cookie::{Cookie, SameSite};
use rand::rngs::OsRng;
use rand::SeedableRng;
use tracing::{debug, error, warn};

use crate::extractor::{CsrfCookie, CsrfHeader, CsrfNames, CsrfToken};

pub mod extractor;

mod clock;
mod codec;
mod config;
mod key;
mod origin;
mod token_rng;

pub use crate::clock::{Clock, SystemClock};
pub use crate::codec::{is_equal, RawVerifier, TokenCodec, WireToken};
pub use crate::config::CsrfConfig;
pub use crate::key::{SigningKey, KEY_LEN};
pub use crate::origin::{is_same_origin, ExpectedOrigin, OriginCheck, SameOrigin};
pub use crate::token_rng::{TokenRng, VERIFIER_LEN};

macro_rules! token_name {
    () => {
        "Csrf-Token"
    };
}

#[macro_export]
#[doc(hidden)]
macro_rules! host_prefix {
    () => {
        "__Host-"
    };
}

#[macro_export]
#[doc(hidden)]
macro_rules! secure_prefix {
    () => {
        "__Secure-"
    };
}

/// Default name of the request header carrying the token.
pub const DEFAULT_CSRF_HEADER_NAME: &str = token_name!();
/// Default name of the cookie carrying the token.
pub const DEFAULT_CSRF_COOKIE_NAME: &str = concat!(host_prefix!(), token_name!());

/// Reasons a request was refused.
///
/// Every variant produces the same `403 Forbidden` response with an empty
/// body; the distinction only shows up in logs.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, thiserror::Error)]
pub enum CsrfError {
    /// No CSRF Token in the cookies.
    #[error("The CSRF Cookie is missing")]
    MissingCookie,
    /// No CSRF Token in the request header.
    #[error("The CSRF Header is missing")]
    MissingToken,
    /// A token does not have the expected structure.
    #[error("The CSRF Token is malformed")]
    MalformedToken,
    /// A token is well formed but was not signed by this middleware.
    #[error("The CSRF Token signature is invalid")]
    InvalidSignature,
    /// The token in the cookie and the token in the header do not match.
    #[error("The CSRF Tokens do not match")]
    TokenMismatch,
    /// The request did not come from the expected origin.
    #[error("The request origin is missing or not allowed")]
    OriginMismatch,
}

impl ResponseError for CsrfError {
    fn status_code(&self) -> StatusCode {
        StatusCode::FORBIDDEN
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::Forbidden().finish()
    }
}

/// Errors that prevent a middleware from being built.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Supplied key material has the wrong length.
    #[error("signing key must be {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Required length.
        expected: usize,
        /// Supplied length.
        actual: usize,
    },
    /// Supplied key material is not valid base64.
    #[error("signing key is not valid base64: {0}")]
    KeyEncoding(#[from] base64::DecodeError),
    /// The operating system RNG failed.
    #[error("failed to gather randomness: {0}")]
    Rng(#[from] rand::Error),
    /// The expected origin could not be parsed.
    #[error("invalid origin {0:?}")]
    InvalidOrigin(String),
}

/// CSRF middleware to manage CSRF cookies and tokens.
///
/// `Rng` is the RNG new verifiers are drawn from. Each worker seeds its own
/// instance from the operating system.
pub struct CsrfMiddleware<Rng> {
    config: CsrfConfig,
    key: Arc<SigningKey>,
    clock: Arc<dyn Clock>,
    origin_check: Arc<dyn OriginCheck>,
    rng: PhantomData<fn() -> Rng>,
}

impl<Rng> CsrfMiddleware<Rng> {
    /// Creates a CSRF middleware with secure defaults and a freshly generated
    /// signing key. Namely:
    ///
    /// - The CSRF cookie will be prefixed with `__Host-`. This also implies the
    /// following:
    ///   - `Secure` is set.
    ///   - `Domain` is _not_ set.
    ///   - `Path` is set to `/`.
    /// - `SameSite` is set to `Strict`.
    /// - `HttpOnly` is set.
    /// - Unsafe requests must come from `expected_origin`, as reported by the
    /// `Origin` or `Referer` header.
    ///
    /// This represents the strictest possible configuration. Requests must be
    /// always sent over HTTPS. Users must explicitly relax these restrictions.
    ///
    /// # Errors
    ///
    /// Returns an error if the signing key could not be generated.
    pub fn new(expected_origin: ExpectedOrigin) -> Result<Self, ConfigError> {
        Ok(Self::with_key(SigningKey::generate()?, expected_origin))
    }

    /// Creates a CSRF middleware with secure defaults, signing with `key`.
    /// Use this when tokens must stay valid across restarts or across
    /// several processes.
    #[must_use]
    pub fn with_key(key: SigningKey, expected_origin: ExpectedOrigin) -> Self {
        Self::from_config(CsrfConfig::new(expected_origin), key)
    }

    /// Creates a CSRF middleware from an existing configuration.
    #[must_use]
    pub fn from_config(config: CsrfConfig, key: SigningKey) -> Self {
        Self {
            config,
            key: Arc::new(key),
            clock: Arc::new(SystemClock::new()),
            origin_check: Arc::new(SameOrigin),
            rng: PhantomData,
        }
    }

    /// Control whether we check for the token on requests.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// Control whether safe requests without a valid token receive a new one.
    /// Enabled by default.
    #[must_use]
    pub const fn create_if_not_found(mut self, enabled: bool) -> Self {
        self.config.create_if_not_found = enabled;
        self
    }

    /// Control whether valid tokens are re-encoded on every response. Enabled
    /// by default; disabling it gives up the protection against compression
    /// side channels.
    #[must_use]
    pub const fn rotate(mut self, enabled: bool) -> Self {
        self.config.rotate = enabled;
        self
    }

    /// Sets the methods that skip token validation. Defaults to `GET`,
    /// `HEAD`, `OPTIONS` and `TRACE`.
    #[must_use]
    pub fn safe_methods<I: IntoIterator<Item = Method>>(mut self, methods: I) -> Self {
        self.config.safe_methods = methods.into_iter().collect();
        self
    }

    /// Sets the name of the request header carrying the token.
    #[must_use]
    pub fn header_name<T: Into<String>>(mut self, name: T) -> Self {
        self.config.header_name = name.into();
        self
    }

    /// Sets the cookie name. Consider using [`host_prefixed_cookie_name`][1] or
    /// [`secure_prefixed_cookie_name`][2] to prefix the cookie name with
    /// `__Host-` or `__Secure-` on your behalf, or prefixing it manually.
    ///
    /// [1]: Self::host_prefixed_cookie_name
    /// [2]: Self::secure_prefixed_cookie_name
    #[must_use]
    pub fn cookie_name<T: Into<String>>(mut self, name: T) -> Self {
        self.config.cookie_name = name.into();
        self
    }

    /// Sets the cookie name, with `__Host-` automatically prefixed.
    ///
    /// # Examples
    ///
    /// This functionally is equivalent to prefixing the cookie name with
    /// `__Host-`:
    /// ```
    /// use actix_signed_csrf::{CsrfMiddleware, SigningKey};
    /// use rand::rngs::StdRng;
    ///
    /// let origin = "https://example.com".parse().unwrap();
    /// let host_prefixed = CsrfMiddleware::<StdRng>::new(origin)
    ///     .unwrap()
    ///     .host_prefixed_cookie_name("my_special_cookie");
    /// assert_eq!(host_prefixed.config().cookie_name(), "__Host-my_special_cookie");
    /// ```
    #[must_use]
    pub fn host_prefixed_cookie_name<T: AsRef<str>>(mut self, name: T) -> Self {
        let mut prefixed = host_prefix!().to_owned();
        prefixed.push_str(name.as_ref());
        self.config.cookie_name = prefixed;
        self
    }

    /// Sets the cookie name, with `__Secure-` automatically prefixed.
    /// Consider using [`host_prefixed_cookie_name`][1] instead for increased
    /// defense-in-depth measures.
    ///
    /// [1]: Self::host_prefixed_cookie_name
    #[must_use]
    pub fn secure_prefixed_cookie_name<T: AsRef<str>>(mut self, name: T) -> Self {
        let mut prefixed = secure_prefix!().to_owned();
        prefixed.push_str(name.as_ref());
        self.config.cookie_name = prefixed;
        self
    }

    /// Sets the `SameSite` attribute on the cookie.
    #[must_use]
    pub const fn same_site(mut self, same_site: Option<SameSite>) -> Self {
        self.config.same_site = same_site;
        self
    }

    /// Sets the `HttpOnly` attribute on the cookie.
    #[must_use]
    pub const fn http_only(mut self, enabled: bool) -> Self {
        self.config.http_only = enabled;
        self
    }

    /// Sets the `Secure` attribute on the cookie.
    #[must_use]
    pub const fn secure(mut self, enabled: bool) -> Self {
        self.config.secure = enabled;
        self
    }

    /// Sets the `Path` attribute on the cookie. Note that a `__Host-` cookie
    /// is only accepted by browsers with a path of `/`.
    #[must_use]
    pub fn path<T: Into<String>>(mut self, path: T) -> Self {
        self.config.path = path.into();
        self
    }

    /// Sets the domain of the cookie.
    ///
    /// This will replace the `__Host-` prefix with `__Secure-` instead, if the
    /// cookie name starts with `__Host-` as `__Host-` requires a non-existent
    /// Domain attribute. This weakens a defense-in-depth measure and is not
    /// recommended unless there is an unavoidable need and the security
    /// implications have been fully considered.
    #[must_use]
    pub fn domain<S: Into<String>>(mut self, domain: impl Into<Option<S>>) -> Self {
        if let Some(stripped) = self.config.cookie_name.strip_prefix(host_prefix!()) {
            self.config.cookie_name = format!(concat!(secure_prefix!(), "{}"), stripped);
        }
        self.config.domain = domain.into().map(Into::into);
        self
    }

    /// Replaces the [`SameOrigin`] check.
    #[must_use]
    pub fn origin_check<C: OriginCheck + 'static>(mut self, check: C) -> Self {
        self.origin_check = Arc::new(check);
        self
    }

    /// Replaces the [`SystemClock`] used to salt tokens.
    #[must_use]
    pub fn clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// The configuration this middleware will run with.
    #[must_use]
    pub const fn config(&self) -> &CsrfConfig {
        &self.config
    }

    /// Produces the names needed by the [`CsrfHeader`] and [`CsrfCookie`]
    /// extractors, determined from the current middleware state. Note that
    /// this is **not** needed if you are using default names.
    #[must_use]
    pub fn names(&self) -> CsrfNames {
        CsrfNames::new(self.config.cookie_name.clone(), self.config.header_name.clone())
    }
}

impl<Rng> Clone for CsrfMiddleware<Rng> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            key: Arc::clone(&self.key),
            clock: Arc::clone(&self.clock),
            origin_check: Arc::clone(&self.origin_check),
            rng: PhantomData,
        }
    }
}

impl<Rng> fmt::Debug for CsrfMiddleware<Rng> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrfMiddleware")
            .field("config", &self.config)
            .field("key", &self.key)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl<S, Rng> Transform<S, ServiceRequest> for CsrfMiddleware<Rng>
where
    S: Service<ServiceRequest, Response = ServiceResponse>,
    Rng: TokenRng + SeedableRng,
{
    type Response = ServiceResponse;
    type Error = S::Error;
    type InitError = ();
    type Transform = CsrfMiddlewareImpl<S, Rng>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        let rng = match Rng::from_rng(OsRng) {
            Ok(rng) => rng,
            Err(e) => {
                error!(error = %e, "Failed to seed CSRF token generator");
                return future::ready(Err(()));
            }
        };

        future::ready(Ok(CsrfMiddlewareImpl {
            service,
            inner: Rc::new(Inner {
                codec: TokenCodec::new(Arc::clone(&self.key), Arc::clone(&self.clock), rng),
                config: self.config.clone(),
                origin_check: Arc::clone(&self.origin_check),
            }),
        }))
    }
}

#[doc(hidden)]
pub struct CsrfMiddlewareImpl<S, Rng> {
    service: S,
    inner: Rc<Inner<Rng>>,
}

struct Inner<Rng> {
    codec: TokenCodec<Rng>,
    config: CsrfConfig,
    origin_check: Arc<dyn OriginCheck>,
}

impl<Rng: TokenRng> Inner<Rng> {
    /// Decodes the cookie of a request, if it carries a valid one.
    fn valid_cookie(&self, req: &ServiceRequest) -> Option<(CsrfCookie, RawVerifier)> {
        let cookie = CsrfCookie::from_service_request(&self.config.cookie_name, req).ok()?;
        match self.codec.verify(cookie.get()) {
            Ok(verifier) => Some((cookie, verifier)),
            Err(e) => {
                debug!(error = %e, "Ignoring invalid CSRF cookie");
                None
            }
        }
    }

    /// Picks the token the response should carry for a request holding a
    /// valid cookie, along with whether it needs to be sent as a cookie.
    fn refresh(&self, cookie: CsrfCookie, verifier: &RawVerifier) -> (WireToken, bool) {
        if self.config.rotate {
            (self.codec.encode(verifier), true)
        } else {
            (WireToken::verified(cookie.into_inner()), false)
        }
    }

    /// Picks the token a safe request's response should carry.
    fn token_for_safe_request(&self, req: &ServiceRequest) -> Option<(WireToken, bool)> {
        if let Some((cookie, verifier)) = self.valid_cookie(req) {
            return Some(self.refresh(cookie, &verifier));
        }

        if !self.config.create_if_not_found {
            return None;
        }

        match self.codec.generate() {
            Ok(token) => Some((token, true)),
            Err(e) => {
                error!(error = %e, "Failed to generate CSRF token");
                None
            }
        }
    }

    /// Runs every check an unsafe request must pass, returning the cookie and
    /// the verifier it proved knowledge of.
    fn validate(&self, req: &ServiceRequest) -> Result<(CsrfCookie, RawVerifier), CsrfError> {
        let header = CsrfHeader::from_service_request(&self.config.header_name, req)?;
        let cookie = CsrfCookie::from_service_request(&self.config.cookie_name, req)?;

        let header_verifier = self.codec.verify(header.get())?;
        let cookie_verifier = self.codec.verify(cookie.get())?;
        if header_verifier != cookie_verifier {
            return Err(CsrfError::TokenMismatch);
        }

        if !self
            .origin_check
            .check(req.head(), &self.config.expected_origin)
        {
            return Err(CsrfError::OriginMismatch);
        }

        Ok((cookie, cookie_verifier))
    }

    /// Renders the `Set-Cookie` header for `token`.
    fn set_cookie_header(&self, token: &WireToken) -> Option<HeaderValue> {
        let config = &self.config;
        let mut cookie_builder = Cookie::build(config.cookie_name.as_str(), token.as_str())
            .http_only(config.http_only)
            .secure(config.secure)
            .path(config.path.as_str());

        if let Some(same_site) = config.same_site {
            cookie_builder = cookie_builder.same_site(same_site);
        }

        if let Some(domain) = &config.domain {
            cookie_builder = cookie_builder.domain(domain.as_str());
        }

        // The characters allowed in a cookie should be a strict subset of the
        // characters allowed in a header.
        match HeaderValue::from_str(&cookie_builder.finish().to_string()) {
            Ok(header) => Some(header),
            Err(e) => {
                error!(error = %e, "CSRF cookie is not a valid header value");
                None
            }
        }
    }
}

impl<S, Rng> Service<ServiceRequest> for CsrfMiddlewareImpl<S, Rng>
where
    S: Service<ServiceRequest, Response = ServiceResponse>,
    Rng: TokenRng,
{
    type Response = ServiceResponse;
    type Error = S::Error;
    type Future = CsrfMiddlewareImplFuture<S>;

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let inner = &self.inner;
        if !inner.config.enabled {
            return CsrfMiddlewareImplFuture::Passthrough(Passthrough {
                cookie: None,
                service: Box::pin(self.service.call(req)),
            });
        }

        let token = if inner.config.is_safe(req.method()) {
            inner.token_for_safe_request(&req)
        } else {
            match inner.validate(&req) {
                Ok((cookie, verifier)) => Some(inner.refresh(cookie, &verifier)),
                Err(e) => {
                    warn!(
                        error = %e,
                        method = %req.method(),
                        path = req.path(),
                        "Potential CSRF attack"
                    );
                    return CsrfMiddlewareImplFuture::CsrfError(future::ready(Ok(
                        req.error_response(e)
                    )));
                }
            }
        };

        let cookie = token.and_then(|(token, send)| {
            let header = if send {
                debug!("Attaching CSRF token to response");
                inner.set_cookie_header(&token)
            } else {
                None
            };
            req.extensions_mut().insert(CsrfToken::new(token));
            header
        });

        CsrfMiddlewareImplFuture::Passthrough(Passthrough {
            cookie,
            service: Box::pin(self.service.call(req)),
        })
    }

    fn poll_ready(&self, ctx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }
}

#[doc(hidden)]
pub enum CsrfMiddlewareImplFuture<S: Service<ServiceRequest>> {
    /// A CSRF issue was detected.
    CsrfError(Ready<Result<ServiceResponse, S::Error>>),
    /// No CSRF issue was detected, so we pass the request through.
    Passthrough(Passthrough<S::Future>),
}

impl<S> Future for CsrfMiddlewareImplFuture<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse>,
{
    type Output = Result<ServiceResponse, S::Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.get_mut() {
            CsrfMiddlewareImplFuture::CsrfError(error) => Pin::new(error).poll(cx),
            CsrfMiddlewareImplFuture::Passthrough(inner) => match inner.service.as_mut().poll(cx) {
                Poll::Ready(Ok(mut res)) => {
                    if let Some(cookie) = inner.cookie.take() {
                        res.response_mut()
                            .headers_mut()
                            .append(header::SET_COOKIE, cookie);
                    }

                    Poll::Ready(Ok(res))
                }
                other => other,
            },
        }
    }
}

#[doc(hidden)]
pub struct Passthrough<Fut> {
    cookie: Option<HeaderValue>,
    service: Pin<Box<Fut>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    use actix_web::http::StatusCode;
    use actix_web::test::{self, TestRequest};
    use actix_web::{web, App, HttpResponse};
    use rand::rngs::StdRng;

    const ORIGIN: &str = "https://example.com";

    fn middleware() -> CsrfMiddleware<StdRng> {
        CsrfMiddleware::with_key(
            SigningKey::from_bytes(&[3; KEY_LEN]).unwrap(),
            ORIGIN.parse().unwrap(),
        )
    }

    fn set_cookies(resp: &ServiceResponse) -> Vec<String> {
        resp.headers()
            .get_all(header::SET_COOKIE)
            .map(|value| value.to_str().expect("header to be valid string").to_owned())
            .collect()
    }

    fn get_cookie_from_resp(resp: &ServiceResponse) -> Cookie<'static> {
        let set_cookies = set_cookies(resp);
        assert_eq!(1, set_cookies.len());
        Cookie::parse(set_cookies[0].clone()).expect("cookie to parse")
    }

    macro_rules! service {
        ($csrf:expr) => {
            test::init_service(
                App::new().wrap($csrf).service(
                    web::resource("/")
                        .route(web::get().to(|| HttpResponse::Ok()))
                        .route(web::post().to(|| HttpResponse::Ok())),
                ),
            )
            .await
        };
    }

    #[tokio::test]
    async fn attaches_token() {
        let srv = service!(middleware());
        let resp = test::call_service(&srv, TestRequest::with_uri("/").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let cookie = get_cookie_from_resp(&resp);
        assert_eq!(cookie.name(), DEFAULT_CSRF_COOKIE_NAME);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.domain(), None);
        assert_eq!(cookie.max_age(), None);
    }

    #[tokio::test]
    async fn cookie_attributes_are_configurable() {
        let srv = service!(middleware()
            .cookie_name("csrf")
            .http_only(false)
            .secure(false)
            .same_site(Some(SameSite::Lax))
            .path("/app"));
        let resp = test::call_service(&srv, TestRequest::with_uri("/").to_request()).await;

        let cookie = get_cookie_from_resp(&resp);
        assert_eq!(cookie.name(), "csrf");
        // Disabled attributes are simply not rendered.
        assert_ne!(cookie.http_only(), Some(true));
        assert_ne!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/app"));
    }

    #[tokio::test]
    async fn domain_attribute_is_set() {
        let csrf = middleware().domain("example.com");
        assert_eq!(csrf.config().cookie_name(), "__Secure-Csrf-Token");

        let srv = service!(csrf);
        let resp = test::call_service(&srv, TestRequest::with_uri("/").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(get_cookie_from_resp(&resp).domain(), Some("example.com"));
    }

    #[tokio::test]
    async fn post_request_rejected_without_header() {
        let srv = service!(middleware());
        let resp = test::call_service(&srv, TestRequest::post().uri("/").to_request()).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert!(set_cookies(&resp).is_empty());
    }

    #[tokio::test]
    async fn disabled_middleware_passes_through() {
        let srv = service!(middleware().enabled(false));

        let resp = test::call_service(&srv, TestRequest::post().uri("/").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(set_cookies(&resp).is_empty());

        let resp = test::call_service(&srv, TestRequest::with_uri("/").to_request()).await;
        assert!(set_cookies(&resp).is_empty());
    }

    #[tokio::test]
    async fn safe_methods_are_configurable() {
        let srv = service!(middleware().safe_methods([Method::HEAD]));
        let resp = test::call_service(&srv, TestRequest::with_uri("/").to_request()).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert!(set_cookies(&resp).is_empty());
    }

    /// Will use double submit method.
    #[tokio::test]
    async fn double_submit_correct_token() {
        let srv = service!(middleware());

        // First, let's get the token as a client.
        let resp = test::call_service(&srv, TestRequest::with_uri("/").to_request()).await;
        let cookie = get_cookie_from_resp(&resp);

        // Now we can do another request to a protected endpoint.
        let req = TestRequest::post()
            .uri("/")
            .cookie(cookie.clone())
            .insert_header((DEFAULT_CSRF_HEADER_NAME, cookie.value()))
            .insert_header((header::ORIGIN, ORIGIN))
            .to_request();

        let resp = test::call_service(&srv, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_ne!(get_cookie_from_resp(&resp).value(), cookie.value());
    }

    #[tokio::test]
    async fn custom_header_name() {
        let srv = service!(middleware().header_name("X-CSRF-Token"));

        let resp = test::call_service(&srv, TestRequest::with_uri("/").to_request()).await;
        let cookie = get_cookie_from_resp(&resp);

        let req = TestRequest::post()
            .uri("/")
            .cookie(cookie.clone())
            .insert_header((DEFAULT_CSRF_HEADER_NAME, cookie.value()))
            .insert_header((header::ORIGIN, ORIGIN))
            .to_request();
        let resp = test::call_service(&srv, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let req = TestRequest::post()
            .uri("/")
            .cookie(cookie.clone())
            .insert_header(("X-CSRF-Token", cookie.value()))
            .insert_header((header::ORIGIN, ORIGIN))
            .to_request();
        let resp = test::call_service(&srv, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn rejection_body_does_not_reveal_reason() {
        let srv = service!(middleware());

        let missing = test::call_service(&srv, TestRequest::post().uri("/").to_request()).await;
        let forged = test::call_service(
            &srv,
            TestRequest::post()
                .uri("/")
                .cookie(Cookie::new(DEFAULT_CSRF_COOKIE_NAME, "1.abc.def"))
                .insert_header((DEFAULT_CSRF_HEADER_NAME, "1.abc.def"))
                .insert_header((header::ORIGIN, ORIGIN))
                .to_request(),
        )
        .await;

        for resp in [missing, forged] {
            assert_eq!(resp.status(), StatusCode::FORBIDDEN);
            assert!(set_cookies(&resp).is_empty());
            let body = test::read_body(resp).await;
            assert!(body.is_empty());
        }
    }
}
