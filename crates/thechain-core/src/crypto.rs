//! Ticket payload signing
//!
//! Tickets carry a base64 HMAC-SHA256 tag over their encoded payload. The
//! signer holds a keyed MAC state built once from the configured secret and
//! clones it per call, so signing is infallible and the raw secret bytes are
//! not retained.

use crate::config::ChainConfig;
use crate::errors::{ChainError, ChainResult};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 signer for ticket payloads
#[derive(Clone)]
pub struct TicketSigner {
    keyed: HmacSha256,
}

impl TicketSigner {
    /// Build a signer from raw secret bytes
    pub fn new(secret: &[u8]) -> ChainResult<Self> {
        if secret.is_empty() {
            return Err(ChainError::invalid("signing secret must not be empty"));
        }
        let keyed = HmacSha256::new_from_slice(secret)
            .map_err(|e| ChainError::invalid(format!("unusable signing secret: {e}")))?;
        Ok(Self { keyed })
    }

    /// Build a signer from the configured secret
    pub fn from_config(config: &ChainConfig) -> ChainResult<Self> {
        Self::new(config.signing_secret.as_bytes())
    }

    /// Base64 tag over `payload`
    pub fn sign(&self, payload: &str) -> String {
        let mut mac = self.keyed.clone();
        mac.update(payload.as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }

    /// Whether `signature` is the tag of `payload` under this key.
    ///
    /// Malformed base64 and wrong-length tags are simply rejected. The final
    /// comparison is constant-time.
    pub fn verify(&self, payload: &str, signature: &str) -> bool {
        let Ok(tag) = STANDARD.decode(signature.trim()) else {
            return false;
        };
        let mut mac = self.keyed.clone();
        mac.update(payload.as_bytes());
        mac.verify_slice(&tag).is_ok()
    }
}

impl fmt::Debug for TicketSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TicketSigner")
            .field("algorithm", &"HMAC-SHA256")
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn test_sign_is_deterministic() {
        let signer = TicketSigner::new(SECRET).unwrap();
        let payload = "1|1700000000000|1700086400000|nonce";
        assert_eq!(signer.sign(payload), signer.sign(payload));
        assert!(signer.verify(payload, &signer.sign(payload)));
    }

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2
        let signer = TicketSigner::new(b"Jefe").unwrap();
        let tag = signer.sign("what do ya want for nothing?");
        let raw = STANDARD.decode(tag).unwrap();
        let hex: String = raw.iter().map(|b| format!("{b:02x}")).collect();
        assert_eq!(
            hex,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_verify_rejects_garbage_without_panicking() {
        let signer = TicketSigner::new(SECRET).unwrap();
        assert!(!signer.verify("payload", ""));
        assert!(!signer.verify("payload", "not base64 !!"));
        assert!(!signer.verify("payload", "AAAA"));
    }

    #[test]
    fn test_other_key_rejects() {
        let a = TicketSigner::new(SECRET).unwrap();
        let b = TicketSigner::new(b"fedcba9876543210fedcba9876543210").unwrap();
        assert!(!b.verify("payload", &a.sign("payload")));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(TicketSigner::new(b"").is_err());
    }

    #[test]
    fn test_debug_hides_key() {
        let signer = TicketSigner::new(SECRET).unwrap();
        let rendered = format!("{signer:?}");
        assert!(!rendered.contains("0123456789abcdef"));
    }

    proptest! {
        #[test]
        fn prop_payload_tamper_is_detected(
            payload in "[0-9a-z|]{1,64}",
            idx in any::<prop::sample::Index>(),
            replacement in "[0-9A-Z]",
        ) {
            let signer = TicketSigner::new(SECRET).unwrap();
            let sig = signer.sign(&payload);
            prop_assert!(signer.verify(&payload, &sig));

            let mut chars: Vec<char> = payload.chars().collect();
            let i = idx.index(chars.len());
            let new_char = replacement.chars().next().unwrap();
            prop_assume!(chars[i] != new_char);
            chars[i] = new_char;
            let tampered: String = chars.into_iter().collect();
            prop_assert!(!signer.verify(&tampered, &sig));
        }

        #[test]
        fn prop_signature_tamper_is_detected(
            payload in ".{0,64}",
            flip in 0usize..32,
            bit in 0u8..8,
        ) {
            let signer = TicketSigner::new(SECRET).unwrap();
            let mut raw = STANDARD.decode(signer.sign(&payload)).unwrap();
            raw[flip] ^= 1 << bit;
            prop_assert!(!signer.verify(&payload, &STANDARD.encode(raw)));
        }
    }
}
