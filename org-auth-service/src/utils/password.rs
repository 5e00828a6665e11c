use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
    },
    Algorithm, Argon2, Params, Version,
};

/// Newtype for a plaintext password so it never lands in logs.
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Newtype for a PHC-formatted password hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// One-way password hashing with a constant-time compare.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &Password) -> Result<PasswordHashString, anyhow::Error>;

    /// Returns `Ok(false)` on mismatch; `Err` only when the stored hash is malformed.
    fn verify(&self, password: &Password, hash: &PasswordHashString)
        -> Result<bool, anyhow::Error>;
}

/// Argon2id hasher. Salt is generated per hash and embedded in the output.
#[derive(Clone)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    pub fn new() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }

    /// Build with explicit cost parameters (tests use cheap ones).
    pub fn with_params(params: Params) -> Self {
        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, password: &Password) -> Result<PasswordHashString, anyhow::Error> {
        let salt = SaltString::generate(&mut OsRng);

        let password_hash = self
            .argon2
            .hash_password(password.as_str().as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
            .to_string();

        Ok(PasswordHashString::new(password_hash))
    }

    fn verify(
        &self,
        password: &Password,
        hash: &PasswordHashString,
    ) -> Result<bool, anyhow::Error> {
        let parsed_hash = PasswordHash::new(hash.as_str())
            .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;

        match self
            .argon2
            .verify_password(password.as_str().as_bytes(), &parsed_hash)
        {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(anyhow::anyhow!("Password verification failed: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> Argon2Hasher {
        Argon2Hasher::with_params(Params::new(1024, 1, 1, None).unwrap())
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = hasher();
        let password = Password::new("mySecurePassword123");
        let hash = hasher.hash(&password).unwrap();

        assert!(hash.as_str().starts_with("$argon2id"));
        assert!(hasher.verify(&password, &hash).unwrap());
        assert!(!hasher.verify(&Password::new("wrong"), &hash).unwrap());
    }

    #[test]
    fn test_same_password_different_salts() {
        let hasher = hasher();
        let password = Password::new("mySecurePassword123");
        let h1 = hasher.hash(&password).unwrap();
        let h2 = hasher.hash(&password).unwrap();

        assert_ne!(h1, h2);
        assert!(hasher.verify(&password, &h1).unwrap());
        assert!(hasher.verify(&password, &h2).unwrap());
    }

    #[test]
    fn test_malformed_hash_is_error() {
        let result = hasher().verify(
            &Password::new("x"),
            &PasswordHashString::new("not-a-hash".to_string()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_redacts() {
        assert_eq!(format!("{:?}", Password::new("hunter2")), "Password(***)");
    }
}
