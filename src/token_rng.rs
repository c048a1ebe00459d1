//! Raw verifier generation and related crypto functions.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::{CryptoRng, Error, Fill, RngCore};

use crate::codec::RawVerifier;

/// Number of random bytes in a raw verifier.
pub const VERIFIER_LEN: usize = 32;

/// Used to generate raw CSRF verifiers.
///
/// This trait is implemented for all CSRNG (Cryptographically Secure RNG)
/// types. This should not be implemented directly; instead, implement
/// [`CryptoRng`] and [`RngCore`] instead.
///
/// For blanket implementations, a verifier is 32 bytes of random data,
/// encoded as URL-safe base64 without padding.
pub trait TokenRng: CryptoRng {
    /// Generates a raw verifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying RNG fails to generate a verifier.
    fn generate_verifier(&mut self) -> Result<RawVerifier, Error>;
}

impl<Rng: CryptoRng + RngCore> TokenRng for Rng {
    fn generate_verifier(&mut self) -> Result<RawVerifier, Error> {
        let mut buf = [0; VERIFIER_LEN];
        buf.try_fill(self)?;
        Ok(RawVerifier::new(URL_SAFE_NO_PAD.encode(buf)))
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn verifiers_are_unique_and_url_safe() {
        let mut rng = StdRng::from_entropy();
        let a = rng.generate_verifier().unwrap();
        let b = rng.generate_verifier().unwrap();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 43);
        assert!(a
            .as_str()
            .bytes()
            .all(|c| c.is_ascii_alphanumeric() || c == b'-' || c == b'_'));
    }
}
