//! One-time login secrets.
//!
//! A secret is shown exactly once, in the response that created the identity.
//! Only its SHA-256 digest is stored; nothing can reveal it again later.

use base64::{engine::general_purpose, Engine as _};
use rand::{thread_rng, Rng};
use serde::Serialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OneTimeCredential {
    pub identity_id: Uuid,
    pub secret: String,
}

/// 32 bytes from the thread CSPRNG, URL-safe base64 without padding.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    thread_rng().fill(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

pub fn digest_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn verify_secret(candidate: &str, stored_digest: &str) -> bool {
    let computed = digest_secret(candidate);
    computed.as_bytes().ct_eq(stored_digest.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_unique_and_verify_against_their_digest() {
        let a = generate_secret();
        let b = generate_secret();
        assert_ne!(a, b);

        let digest = digest_secret(&a);
        assert!(verify_secret(&a, &digest));
        assert!(!verify_secret(&b, &digest));
        assert!(!verify_secret(&a, "short"));
    }

    #[test]
    fn secrets_carry_256_url_safe_bits() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 43);
        assert!(secret.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));

        let raw = general_purpose::URL_SAFE_NO_PAD.decode(&secret).unwrap();
        assert_eq!(raw.len(), 32);
    }

    #[test]
    fn digest_mismatch_in_last_byte_is_rejected() {
        let digest = digest_secret("s3cret");
        let mut tampered = digest.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == '0' { '1' } else { '0' });
        assert!(verify_secret("s3cret", &digest));
        assert!(!verify_secret("s3cret", &tampered));
    }
}
