use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `payload` under `secret`.
pub fn sign(secret: &[u8], payload: &[u8]) -> Result<String, anyhow::Error> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;

    mac.update(payload);
    let result = mac.finalize();

    Ok(hex::encode(result.into_bytes()))
}

/// Verify a hex HMAC-SHA256 signature using constant-time comparison
pub fn verify(secret: &[u8], payload: &[u8], signature: &str) -> Result<bool, anyhow::Error> {
    let expected_signature = sign(secret, payload)?;

    let expected_bytes = expected_signature.as_bytes();
    let signature_bytes = signature.as_bytes();

    if expected_bytes.len() != signature_bytes.len() {
        return Ok(false);
    }

    Ok(expected_bytes.ct_eq(signature_bytes).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_generation_and_verification() {
        let secret = b"my_secret_key";
        let payload = b"random_nonce_123";

        let signature = sign(secret, payload).unwrap();
        assert_eq!(signature.len(), 64);
        assert!(verify(secret, payload, &signature).unwrap());
    }

    #[test]
    fn test_invalid_signature() {
        let secret = b"my_secret_key";
        let signature = sign(secret, b"payload").unwrap();

        assert!(!verify(secret, b"other payload", &signature).unwrap());
        assert!(!verify(b"other_secret", b"payload", &signature).unwrap());
        assert!(!verify(secret, b"payload", "deadbeef").unwrap());
    }
}
