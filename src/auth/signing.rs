//! HMAC signing for compact tokens
//!
//! Token format: base64url(payload).base64url(hmac_sha256(payload)).
//! Shared by session tokens and account action tokens; no server-side
//! token storage is involved.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Sign a payload with the process-wide secret key
pub(crate) fn sign(secret: &str, payload: &[u8]) -> Result<String, crate::error::AppError> {
    let payload_b64 = URL_SAFE_NO_PAD.encode(payload);

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| crate::error::AppError::Internal(anyhow::anyhow!("HMAC init: {e}")))?;
    mac.update(payload_b64.as_bytes());
    let signature_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{}.{}", payload_b64, signature_b64))
}

/// Verify a token's signature and return the raw payload
///
/// Returns `Err(())` for any malformed or tampered token; callers map
/// this to their own uniform failure.
pub(crate) fn verify(secret: &str, token: &str) -> Result<Vec<u8>, ()> {
    let (payload_b64, signature_b64) = token.split_once('.').ok_or(())?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| ())?;
    mac.update(payload_b64.as_bytes());

    let signature = URL_SAFE_NO_PAD.decode(signature_b64).map_err(|_| ())?;
    mac.verify_slice(&signature).map_err(|_| ())?;

    URL_SAFE_NO_PAD.decode(payload_b64).map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_roundtrips() {
        let secret = "0123456789abcdef0123456789abcdef";
        let token = sign(secret, b"hello").unwrap();
        assert_eq!(verify(secret, &token).unwrap(), b"hello");
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let token = sign("0123456789abcdef0123456789abcdef", b"hello").unwrap();
        assert!(verify("another-secret-another-secret-xx", &token).is_err());
    }

    #[test]
    fn verify_rejects_any_flipped_byte() {
        let secret = "0123456789abcdef0123456789abcdef";
        let token = sign(secret, b"payload-bytes").unwrap();

        for i in 0..token.len() {
            let mut bytes = token.clone().into_bytes();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            let Ok(tampered) = String::from_utf8(bytes) else {
                continue;
            };
            if tampered == token {
                continue;
            }
            assert!(verify(secret, &tampered).is_err(), "byte {} accepted", i);
        }
    }

    #[test]
    fn verify_rejects_malformed_tokens() {
        let secret = "0123456789abcdef0123456789abcdef";
        assert!(verify(secret, "").is_err());
        assert!(verify(secret, "no-dot-here").is_err());
        assert!(verify(secret, "a.b.c").is_err());
        assert!(verify(secret, "!!!.???").is_err());
    }
}
