//! Double-submit CSRF tokens.
//!
//! A token is `<nonce>.<hmac>`: a random hex nonce plus its HMAC-SHA256 under
//! the server secret. The same value travels in a script-readable cookie and a
//! request header.

use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use service_core::utils::signature;
use subtle::ConstantTimeEq;

use super::ServiceError;

pub const CSRF_COOKIE: &str = "csrf_token";
pub const CSRF_HEADER: &str = "x-csrf-token";

#[derive(Clone)]
pub struct CsrfService {
    secret: Secret<String>,
}

impl CsrfService {
    pub fn new(secret: Secret<String>) -> Self {
        Self { secret }
    }

    pub fn issue(&self) -> Result<String, ServiceError> {
        let mut nonce = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut nonce);
        let nonce = hex::encode(nonce);

        let sig = signature::sign(self.secret.expose_secret().as_bytes(), nonce.as_bytes())?;
        Ok(format!("{}.{}", nonce, sig))
    }

    /// Every failure (missing value, mismatch, bad signature) is `InvalidCsrf`.
    pub fn verify(&self, cookie: Option<&str>, header: Option<&str>) -> Result<(), ServiceError> {
        let (Some(cookie), Some(header)) = (cookie, header) else {
            return Err(ServiceError::InvalidCsrf);
        };

        if cookie.is_empty() || !bool::from(cookie.as_bytes().ct_eq(header.as_bytes())) {
            return Err(ServiceError::InvalidCsrf);
        }

        let Some((nonce, sig)) = cookie.split_once('.') else {
            return Err(ServiceError::InvalidCsrf);
        };

        match signature::verify(self.secret.expose_secret().as_bytes(), nonce.as_bytes(), sig) {
            Ok(true) => Ok(()),
            _ => Err(ServiceError::InvalidCsrf),
        }
    }
}
