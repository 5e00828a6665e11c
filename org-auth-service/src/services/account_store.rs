use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::ServiceError;
use crate::models::{Account, PendingVerification};

/// Persistence port for accounts.
///
/// There is no whole-row update: each mutation writes only the columns its use
/// case owns, and is conditional wherever it depends on an earlier read.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fails `Conflict` when the email is already taken.
    async fn create(&self, account: &Account) -> Result<(), ServiceError>;

    /// Replace the password hash only if it still equals `expected`, clearing
    /// the session marker in the same write.
    ///
    /// Returns `false` when the stored hash differs (or the account is gone).
    async fn swap_password_hash(
        &self,
        account_id: Uuid,
        expected: &str,
        new: &str,
    ) -> Result<bool, ServiceError>;

    /// Install a pending verification on an account that is still unverified.
    ///
    /// Returns `false` when the account is already verified (or gone).
    async fn replace_verification(
        &self,
        account_id: Uuid,
        verification: &PendingVerification,
    ) -> Result<bool, ServiceError>;

    /// Consume `token`: mark the account verified and drop the pending
    /// verification. `None` when the account no longer holds that token.
    async fn mark_verified(
        &self,
        account_id: Uuid,
        token: &str,
    ) -> Result<Option<Account>, ServiceError>;

    /// Attach an external identity, mark the account verified and drop any
    /// pending verification. The avatar is only filled in when unset.
    async fn link_external_identity(
        &self,
        account_id: Uuid,
        external_id: &str,
        avatar_url: Option<&str>,
    ) -> Result<Account, ServiceError>;

    async fn find_by_id(&self, account_id: Uuid) -> Result<Option<Account>, ServiceError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, ServiceError>;

    async fn find_by_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<Account>, ServiceError>;

    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Account>, ServiceError>;

    /// Unconditionally overwrite the marker. Fails `NotFound` for unknown accounts.
    async fn set_session_marker(
        &self,
        account_id: Uuid,
        marker: Option<&str>,
    ) -> Result<(), ServiceError>;

    /// Atomically replace the marker only if it currently equals `expected`.
    ///
    /// Returns `false` when the stored marker differs (or the account is gone).
    async fn swap_session_marker(
        &self,
        account_id: Uuid,
        expected: Option<&str>,
        new: Option<&str>,
    ) -> Result<bool, ServiceError>;

    async fn health_check(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

/// Process-local account store used by tests and local development.
#[derive(Default)]
pub struct InMemoryAccountStore {
    accounts: Mutex<HashMap<Uuid, Account>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, Account>>, ServiceError> {
        self.accounts
            .lock()
            .map_err(|e| anyhow::anyhow!("Account store lock poisoned: {}", e).into())
    }

    fn find_where(
        &self,
        predicate: impl Fn(&Account) -> bool,
    ) -> Result<Option<Account>, ServiceError> {
        Ok(self.lock()?.values().find(|a| predicate(a)).cloned())
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn create(&self, account: &Account) -> Result<(), ServiceError> {
        let mut accounts = self.lock()?;
        if accounts.values().any(|a| a.email == account.email) {
            return Err(ServiceError::conflict("Email already registered"));
        }
        accounts.insert(account.account_id, account.clone());
        Ok(())
    }

    async fn swap_password_hash(
        &self,
        account_id: Uuid,
        expected: &str,
        new: &str,
    ) -> Result<bool, ServiceError> {
        let mut accounts = self.lock()?;
        match accounts.get_mut(&account_id) {
            Some(stored) if stored.password_hash.as_deref() == Some(expected) => {
                stored.password_hash = Some(new.to_string());
                stored.session_marker = None;
                stored.updated_utc = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn replace_verification(
        &self,
        account_id: Uuid,
        verification: &PendingVerification,
    ) -> Result<bool, ServiceError> {
        let mut accounts = self.lock()?;
        match accounts.get_mut(&account_id) {
            Some(stored) if !stored.is_verified => {
                stored.verification = Some(verification.clone());
                stored.updated_utc = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_verified(
        &self,
        account_id: Uuid,
        token: &str,
    ) -> Result<Option<Account>, ServiceError> {
        let mut accounts = self.lock()?;
        match accounts.get_mut(&account_id) {
            Some(stored) if stored.verification.as_ref().is_some_and(|v| v.token == token) => {
                stored.is_verified = true;
                stored.verification = None;
                stored.updated_utc = Utc::now();
                Ok(Some(stored.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn link_external_identity(
        &self,
        account_id: Uuid,
        external_id: &str,
        avatar_url: Option<&str>,
    ) -> Result<Account, ServiceError> {
        let mut accounts = self.lock()?;
        if accounts
            .values()
            .any(|a| a.account_id != account_id && a.external_id.as_deref() == Some(external_id))
        {
            return Err(ServiceError::conflict("Account identity already in use"));
        }

        let stored = accounts
            .get_mut(&account_id)
            .ok_or_else(|| ServiceError::not_found("Account not found"))?;
        stored.external_id = Some(external_id.to_string());
        stored.is_verified = true;
        stored.verification = None;
        if stored.profile.avatar_url.is_none() {
            stored.profile.avatar_url = avatar_url.map(str::to_string);
        }
        stored.updated_utc = Utc::now();
        Ok(stored.clone())
    }

    async fn find_by_id(&self, account_id: Uuid) -> Result<Option<Account>, ServiceError> {
        Ok(self.lock()?.get(&account_id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, ServiceError> {
        self.find_where(|a| a.email == email)
    }

    async fn find_by_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<Account>, ServiceError> {
        self.find_where(|a| a.verification.as_ref().is_some_and(|v| v.token == token))
    }

    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Account>, ServiceError> {
        self.find_where(|a| a.external_id.as_deref() == Some(external_id))
    }

    async fn set_session_marker(
        &self,
        account_id: Uuid,
        marker: Option<&str>,
    ) -> Result<(), ServiceError> {
        let mut accounts = self.lock()?;
        let stored = accounts
            .get_mut(&account_id)
            .ok_or_else(|| ServiceError::not_found("Account not found"))?;
        stored.session_marker = marker.map(str::to_string);
        Ok(())
    }

    async fn swap_session_marker(
        &self,
        account_id: Uuid,
        expected: Option<&str>,
        new: Option<&str>,
    ) -> Result<bool, ServiceError> {
        let mut accounts = self.lock()?;
        match accounts.get_mut(&account_id) {
            Some(stored) if stored.session_marker.as_deref() == expected => {
                stored.session_marker = new.map(str::to_string);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
