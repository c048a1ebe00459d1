//! The symmetric key used to sign and verify CSRF tokens.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::ConfigError;

type HmacSha256 = Hmac<Sha256>;

/// Length of a signing key, in bytes.
pub const KEY_LEN: usize = 32;

/// Length of a signature produced by [`SigningKey::sign`], in bytes.
pub(crate) const SIGNATURE_LEN: usize = 32;

/// Secret key used to sign CSRF tokens with HMAC-SHA256.
///
/// The key material is wiped from memory when the key is dropped, and is never
/// printed by the [`Debug`](fmt::Debug) implementation.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SigningKey([u8; KEY_LEN]);

impl SigningKey {
    /// Generates a fresh key from the operating system's RNG.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Rng`] if the operating system could not provide
    /// randomness.
    pub fn generate() -> Result<Self, ConfigError> {
        let mut bytes = [0; KEY_LEN];
        OsRng.try_fill_bytes(&mut bytes)?;
        Ok(Self(bytes))
    }

    /// Uses caller supplied key material. The slice must be exactly
    /// [`KEY_LEN`] bytes long.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidKeyLength`] for any other length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let bytes: [u8; KEY_LEN] =
            bytes
                .try_into()
                .map_err(|_| ConfigError::InvalidKeyLength {
                    expected: KEY_LEN,
                    actual: bytes.len(),
                })?;
        Ok(Self(bytes))
    }

    /// Decodes a key stored as URL-safe, unpadded base64, which is how keys
    /// are usually kept in configuration files or environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::KeyEncoding`] if the input is not valid base64,
    /// or [`ConfigError::InvalidKeyLength`] if it does not decode to
    /// [`KEY_LEN`] bytes.
    pub fn from_base64(encoded: &str) -> Result<Self, ConfigError> {
        let mut decoded = URL_SAFE_NO_PAD.decode(encoded.trim())?;
        let key = Self::from_bytes(&decoded);
        decoded.zeroize();
        key
    }

    /// Signs the concatenation of `parts`.
    pub(crate) fn sign(&self, parts: &[&[u8]]) -> [u8; SIGNATURE_LEN] {
        let mut mac =
            HmacSha256::new_from_slice(&self.0).expect("HMAC can take key of any size");
        for part in parts {
            mac.update(part);
        }
        let mut signature = [0; SIGNATURE_LEN];
        signature.copy_from_slice(&mac.finalize().into_bytes());
        signature
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SigningKey").field(&"<redacted>").finish()
    }
}
