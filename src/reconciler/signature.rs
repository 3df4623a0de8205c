//! Webhook signature verification
//!
//! When a shared secret is configured the processor must sign the raw
//! request body with HMAC-SHA256 and send it as
//! `X-Webhook-Signature: sha256=<hex>`.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use crate::{Error, Result};

/// Header carrying the body signature
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

type HmacSha256 = Hmac<Sha256>;

/// Verifies webhook bodies against a shared secret
#[derive(Debug)]
pub struct SignatureVerifier {
    secret: SecretString,
}

impl SignatureVerifier {
    #[must_use]
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"))
    }

    /// Check `header` (the raw signature header value) against `body`
    ///
    /// # Errors
    ///
    /// Returns `InvalidSignature` if the header is missing, malformed, or
    /// does not match
    pub fn verify(&self, header: Option<&str>, body: &[u8]) -> Result<()> {
        let hex_sig = header
            .map(str::trim)
            .and_then(|h| h.strip_prefix("sha256="))
            .ok_or(Error::InvalidSignature)?;
        let expected = hex::decode(hex_sig).map_err(|_| Error::InvalidSignature)?;

        let mut mac = self.mac();
        mac.update(body);
        mac.verify_slice(&expected)
            .map_err(|_| Error::InvalidSignature)
    }

    /// Produce the header value for `body`
    #[must_use]
    pub fn sign(&self, body: &[u8]) -> String {
        let mut mac = self.mac();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::new(SecretString::new("whsec_test".into()))
    }

    #[test]
    fn accepts_own_signature() {
        let v = verifier();
        let body = br#"{"status":"completed"}"#;
        let header = v.sign(body);
        assert!(v.verify(Some(&header), body).is_ok());
    }

    #[test]
    fn rejects_tampered_body() {
        let v = verifier();
        let header = v.sign(br#"{"amount":1}"#);
        assert!(matches!(
            v.verify(Some(&header), br#"{"amount":500}"#),
            Err(Error::InvalidSignature)
        ));
    }

    #[test]
    fn rejects_missing_or_malformed_header() {
        let v = verifier();
        assert!(v.verify(None, b"{}").is_err());
        assert!(v.verify(Some("deadbeef"), b"{}").is_err());
        assert!(v.verify(Some("sha256=not-hex"), b"{}").is_err());
    }

    #[test]
    fn rejects_other_secret() {
        let other = SignatureVerifier::new(SecretString::new("other".into()));
        let header = other.sign(b"{}");
        assert!(verifier().verify(Some(&header), b"{}").is_err());
    }
}
