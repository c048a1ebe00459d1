//! Signing, salting and verification of CSRF tokens.
//!
//! A [`RawVerifier`] is the secret bound to a client. It never leaves the
//! server unsigned: on the wire it always travels as a [`WireToken`] of the
//! form
//!
//! ```text
//! <salt>.<verifier>.<signature>
//! ```
//!
//! where `salt` is a decimal [`Clock`] reading, `verifier` is the raw verifier
//! and `signature` is the URL-safe base64 HMAC-SHA256 of `<salt>.<verifier>`.
//!
//! Since the salt changes on every encoding, the same verifier renders to
//! different bytes every time it is sent. This keeps compression oracles
//! (BREACH and friends) from learning anything about the secret across
//! responses.

use std::cell::RefCell;
use std::fmt;
use std::hint::black_box;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Serialize;

use crate::clock::Clock;
use crate::key::{SigningKey, SIGNATURE_LEN};
use crate::token_rng::TokenRng;
use crate::CsrfError;

const SEPARATOR: char = '.';

/// The unsigned secret bound to a client.
///
/// Equality is checked in constant time.
#[derive(Clone, Hash)]
pub struct RawVerifier(String);

impl RawVerifier {
    pub(crate) const fn new(value: String) -> Self {
        Self(value)
    }

    /// Returns the verifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for RawVerifier {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq(self.0.as_bytes(), other.0.as_bytes())
    }
}

impl Eq for RawVerifier {}

impl fmt::Debug for RawVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RawVerifier").field(&"<redacted>").finish()
    }
}

/// A signed, salted encoding of a [`RawVerifier`], safe to use as a cookie or
/// header value.
///
/// Only the codec mints these. Arbitrary strings cannot be turned into one:
///
/// ```compile_fail
/// use actix_signed_csrf::WireToken;
///
/// let _: WireToken = serde_json::from_str("\"1.forged.token\"").unwrap();
/// ```
#[derive(Clone, Eq, PartialEq, Hash, Debug, Serialize)]
#[serde(transparent)]
pub struct WireToken(String);

impl WireToken {
    /// Wraps a value that already passed [`TokenCodec::verify`].
    pub(crate) const fn verified(token: String) -> Self {
        Self(token)
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the token, returning the underlying string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for WireToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WireToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encodes raw verifiers into wire tokens and back.
///
/// The codec owns the verifier RNG, so it is meant to live inside a single
/// worker. The key and clock are shared between workers.
pub struct TokenCodec<Rng> {
    key: Arc<SigningKey>,
    clock: Arc<dyn Clock>,
    rng: RefCell<Rng>,
}

impl<Rng> fmt::Debug for TokenCodec<Rng> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("key", &self.key)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl<Rng: TokenRng> TokenCodec<Rng> {
    /// Creates a codec signing with `key`, salting with `clock` and drawing
    /// new verifiers from `rng`.
    pub fn new(key: Arc<SigningKey>, clock: Arc<dyn Clock>, rng: Rng) -> Self {
        Self {
            key,
            clock,
            rng: RefCell::new(rng),
        }
    }

    /// Creates a brand new verifier and returns its wire encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if the RNG fails to produce a verifier.
    pub fn generate(&self) -> Result<WireToken, rand::Error> {
        let verifier = self.rng.borrow_mut().generate_verifier()?;
        Ok(self.encode(&verifier))
    }

    /// Produces a fresh wire token for an existing verifier. Every call uses
    /// a new salt, so repeated calls give different bytes.
    pub fn encode(&self, verifier: &RawVerifier) -> WireToken {
        let salt = self.clock.tick().to_string();
        let signature = URL_SAFE_NO_PAD.encode(self.signature(&salt, verifier.as_str()));

        let mut token =
            String::with_capacity(salt.len() + verifier.0.len() + signature.len() + 2);
        token.push_str(&salt);
        token.push(SEPARATOR);
        token.push_str(verifier.as_str());
        token.push(SEPARATOR);
        token.push_str(&signature);
        WireToken(token)
    }

    /// Verifies a wire token, returning its verifier if the token is well
    /// formed and correctly signed.
    #[must_use]
    pub fn decode(&self, token: &str) -> Option<RawVerifier> {
        self.verify(token).ok()
    }

    /// Like [`decode`](Self::decode), but reports why a token was refused.
    ///
    /// # Errors
    ///
    /// Returns [`CsrfError::MalformedToken`] if the token does not have the
    /// expected structure, and [`CsrfError::InvalidSignature`] if it does but
    /// its signature is wrong.
    pub fn verify(&self, token: &str) -> Result<RawVerifier, CsrfError> {
        let mut parts = token.split(SEPARATOR);
        let (Some(salt), Some(verifier), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CsrfError::MalformedToken);
        };

        if !is_salt(salt) || !is_verifier(verifier) {
            return Err(CsrfError::MalformedToken);
        }

        let provided = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| CsrfError::MalformedToken)?;
        if provided.len() != SIGNATURE_LEN {
            return Err(CsrfError::MalformedToken);
        }

        if constant_time_eq(&self.signature(salt, verifier), &provided) {
            Ok(RawVerifier(verifier.to_owned()))
        } else {
            Err(CsrfError::InvalidSignature)
        }
    }

    fn signature(&self, salt: &str, verifier: &str) -> [u8; SIGNATURE_LEN] {
        self.key
            .sign(&[salt.as_bytes(), &[SEPARATOR as u8], verifier.as_bytes()])
    }
}

fn is_salt(salt: &str) -> bool {
    !salt.is_empty() && salt.bytes().all(|c| c.is_ascii_digit()) && salt.parse::<u64>().is_ok()
}

fn is_verifier(verifier: &str) -> bool {
    !verifier.is_empty()
        && verifier
            .bytes()
            .all(|c| c.is_ascii_alphanumeric() || c == b'-' || c == b'_')
}

/// Compares two externally supplied tokens without leaking where they
/// diverge.
#[must_use]
pub fn is_equal(a: &str, b: &str) -> bool {
    constant_time_eq(a.as_bytes(), b.as_bytes())
}

/// Compares two byte slices in time that depends only on their length.
///
/// Slices of different lengths are unequal without inspecting their content.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0_u8;
    for (x, y) in a.iter().zip(b) {
        diff |= black_box(x ^ y);
    }
    black_box(diff) == 0
}
