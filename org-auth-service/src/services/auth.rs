//! Session lifecycle: registration, login, refresh-token rotation, logout,
//! email verification, password change and external account linking.
//!
//! Each account stores exactly one session marker. A refresh token is honoured
//! only while the session id it embeds equals that marker, so issuing a new
//! session (login, refresh, OAuth) retires every earlier refresh token.

use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Account, AccountProfile, AccountResponse, PendingVerification};
use crate::services::{
    AccountStore, DomainEvent, EmailNotifier, EventPublisher, IdentityClaims, PolicyService,
    ServiceError, TokenIssuer, TokenPair,
};
use crate::utils::{Password, PasswordHashString, PasswordHasher};

/// Knobs the session manager needs from configuration.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub public_base_url: String,
    pub verification_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub profile: AccountProfile,
}

/// An account together with a freshly issued token pair.
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub account: AccountResponse,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

#[derive(Clone)]
pub struct AuthService {
    accounts: Arc<dyn AccountStore>,
    hasher: Arc<dyn PasswordHasher>,
    tokens: Arc<dyn TokenIssuer>,
    email: Arc<dyn EmailNotifier>,
    events: Arc<dyn EventPublisher>,
    settings: AuthSettings,
}

impl AuthService {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        hasher: Arc<dyn PasswordHasher>,
        tokens: Arc<dyn TokenIssuer>,
        email: Arc<dyn EmailNotifier>,
        events: Arc<dyn EventPublisher>,
        settings: AuthSettings,
    ) -> Self {
        Self {
            accounts,
            hasher,
            tokens,
            email,
            events,
            settings,
        }
    }

    pub async fn register(&self, input: RegisterInput) -> Result<AuthSession, ServiceError> {
        let email = PolicyService::normalize_email(&input.email);
        PolicyService::validate_email(&email)?;
        PolicyService::validate_password(&input.password)?;

        if self.accounts.find_by_email(&email).await?.is_some() {
            return Err(ServiceError::conflict("Email already registered"));
        }

        let password_hash = self.hasher.hash(&Password::new(input.password))?;

        let mut account = Account::new_local(email, password_hash.into_string(), input.profile);
        account.verification = Some(self.new_verification());

        self.accounts.create(&account).await?;

        tracing::info!(account_id = %account.account_id, "Account registered");
        self.events.publish(DomainEvent::AccountRegistered {
            account_id: account.account_id,
            email: account.email.clone(),
        });

        self.send_verification(&account).await;

        let tokens = self.issue_session(&account).await?;
        Ok(AuthSession {
            account: account.sanitized(),
            tokens,
        })
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession, ServiceError> {
        let email = PolicyService::normalize_email(email);
        let account = self
            .accounts
            .find_by_email(&email)
            .await?
            .ok_or_else(|| ServiceError::not_found("Account not found"))?;

        let Some(hash) = account.password_hash.clone() else {
            tracing::info!(account_id = %account.account_id, "Password login attempted on external-only account");
            return Err(ServiceError::InvalidCredentials);
        };

        if !self
            .hasher
            .verify(&Password::new(password), &PasswordHashString::new(hash))?
        {
            tracing::info!(account_id = %account.account_id, "Login rejected: wrong password");
            return Err(ServiceError::InvalidCredentials);
        }

        let tokens = self.issue_session(&account).await?;
        tracing::info!(account_id = %account.account_id, "Account logged in");

        Ok(AuthSession {
            account: account.sanitized(),
            tokens,
        })
    }

    /// Exchange a refresh token for a new pair. The presented token is single-use.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, ServiceError> {
        let presented = self.tokens.verify_refresh_token(refresh_token)?;
        let account_id = presented.identity.account_id;

        let account = self
            .accounts
            .find_by_id(account_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Account not found"))?;

        let next_session = self.tokens.new_random_id();
        let rotated = self
            .accounts
            .swap_session_marker(
                account_id,
                Some(&presented.session_id),
                Some(&next_session),
            )
            .await?;

        if !rotated {
            tracing::warn!(account_id = %account_id, "Refresh rejected: session marker mismatch");
            return Err(ServiceError::TokenRevoked);
        }

        let tokens = self.issue_tokens(&account, &next_session)?;
        tracing::info!(account_id = %account_id, "Session rotated");

        Ok(AuthSession {
            account: account.sanitized(),
            tokens,
        })
    }

    /// Best-effort: clears the marker only if the token still owns the session.
    pub async fn logout(&self, refresh_token: &str) {
        let presented = match self.tokens.verify_refresh_token(refresh_token) {
            Ok(presented) => presented,
            Err(e) => {
                tracing::debug!(error = %e, "Logout with unusable refresh token ignored");
                return;
            }
        };
        let account_id = presented.identity.account_id;

        match self
            .accounts
            .swap_session_marker(account_id, Some(&presented.session_id), None)
            .await
        {
            Ok(true) => tracing::info!(account_id = %account_id, "Account logged out"),
            Ok(false) => {
                tracing::debug!(account_id = %account_id, "Logout for superseded session ignored")
            }
            Err(e) => tracing::error!(account_id = %account_id, error = %e, "Logout failed"),
        }
    }

    pub async fn verify_email(&self, token: &str) -> Result<AccountResponse, ServiceError> {
        let account = self
            .accounts
            .find_by_verification_token(token)
            .await?
            .ok_or(ServiceError::InvalidToken)?;

        let expired = account
            .verification
            .as_ref()
            .map_or(true, |v| v.is_expired_at(Utc::now()));
        if expired {
            return Err(ServiceError::TokenExpired);
        }

        // a concurrent resend or verify may already have consumed the token
        let account = self
            .accounts
            .mark_verified(account.account_id, token)
            .await?
            .ok_or(ServiceError::InvalidToken)?;

        tracing::info!(account_id = %account.account_id, "Email verified");
        Ok(account.sanitized())
    }

    pub async fn resend_verification(&self, email: &str) -> Result<(), ServiceError> {
        let email = PolicyService::normalize_email(email);
        let mut account = self
            .accounts
            .find_by_email(&email)
            .await?
            .ok_or_else(|| ServiceError::not_found("Account not found"))?;

        if account.is_verified {
            return Err(ServiceError::AlreadyVerified);
        }

        let verification = self.new_verification();
        if !self
            .accounts
            .replace_verification(account.account_id, &verification)
            .await?
        {
            return Err(ServiceError::AlreadyVerified);
        }
        account.verification = Some(verification);

        tracing::info!(account_id = %account.account_id, "Verification token reissued");
        self.send_verification(&account).await;
        Ok(())
    }

    /// Change the password and end the current session.
    pub async fn update_password(
        &self,
        account_id: Uuid,
        old_password: Option<&str>,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        let account = self
            .accounts
            .find_by_id(account_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Account not found"))?;

        let Some(current_hash) = account.password_hash else {
            return Err(ServiceError::invalid_input(
                "Account has no password; sign in with your identity provider",
            ));
        };

        if let Some(old_password) = old_password {
            let matches = self.hasher.verify(
                &Password::new(old_password),
                &PasswordHashString::new(current_hash.clone()),
            )?;
            if !matches {
                return Err(ServiceError::InvalidCredentials);
            }
            if old_password == new_password {
                return Err(ServiceError::invalid_input(
                    "New password must differ from the old password",
                ));
            }
        }

        PolicyService::validate_password(new_password)?;

        let new_hash = self.hasher.hash(&Password::new(new_password))?;
        // conditional on the hash that was checked, so no stale write can restore it
        if !self
            .accounts
            .swap_password_hash(account_id, &current_hash, new_hash.as_str())
            .await?
        {
            tracing::warn!(account_id = %account_id, "Password changed concurrently, update rejected");
            return Err(ServiceError::conflict("Password was changed concurrently"));
        }

        tracing::info!(account_id = %account_id, "Password changed, session cleared");
        Ok(())
    }

    /// Resolve an identity-provider login to an account and open a session.
    ///
    /// Lookup order: external id, then email (linking the local account and
    /// marking it verified), otherwise a new password-less account.
    pub async fn find_or_create_external_account(
        &self,
        external_id: &str,
        email: &str,
        profile: AccountProfile,
    ) -> Result<AuthSession, ServiceError> {
        let email = PolicyService::normalize_email(email);

        let account = if let Some(account) = self.accounts.find_by_external_id(external_id).await?
        {
            account
        } else if let Some(account) = self.accounts.find_by_email(&email).await? {
            let account = self
                .accounts
                .link_external_identity(
                    account.account_id,
                    external_id,
                    profile.avatar_url.as_deref(),
                )
                .await?;

            tracing::info!(account_id = %account.account_id, "External identity linked to existing account");
            account
        } else {
            PolicyService::validate_email(&email)?;
            let account = Account::new_external(email, external_id.to_string(), profile);
            self.accounts.create(&account).await?;

            tracing::info!(account_id = %account.account_id, "Account created from external identity");
            self.events.publish(DomainEvent::AccountRegistered {
                account_id: account.account_id,
                email: account.email.clone(),
            });
            account
        };

        let tokens = self.issue_session(&account).await?;
        Ok(AuthSession {
            account: account.sanitized(),
            tokens,
        })
    }

    pub async fn get_account(&self, account_id: Uuid) -> Result<AccountResponse, ServiceError> {
        self.accounts
            .find_by_id(account_id)
            .await?
            .map(|a| a.sanitized())
            .ok_or_else(|| ServiceError::not_found("Account not found"))
    }

    /// New marker, overwriting any previous one, plus a token pair bound to it.
    async fn issue_session(&self, account: &Account) -> Result<TokenPair, ServiceError> {
        let session_id = self.tokens.new_random_id();
        self.accounts
            .set_session_marker(account.account_id, Some(&session_id))
            .await?;
        self.issue_tokens(account, &session_id)
    }

    fn issue_tokens(&self, account: &Account, session_id: &str) -> Result<TokenPair, ServiceError> {
        let claims = IdentityClaims {
            account_id: account.account_id,
            email: account.email.clone(),
        };

        Ok(TokenPair {
            access_token: self.tokens.issue_access_token(&claims)?,
            refresh_token: self.tokens.issue_refresh_token(&claims, session_id)?,
            token_type: "Bearer".to_string(),
            expires_in: self.tokens.access_token_expiry_seconds(),
        })
    }

    fn new_verification(&self) -> PendingVerification {
        PendingVerification::new(self.tokens.new_random_id(), self.settings.verification_ttl)
    }

    async fn send_verification(&self, account: &Account) {
        let Some(verification) = &account.verification else {
            return;
        };
        let link = format!(
            "{}/auth/verify?token={}",
            self.settings.public_base_url.trim_end_matches('/'),
            verification.token
        );

        if let Err(e) = self.email.send_verification_email(&account.email, &link).await {
            tracing::error!(
                account_id = %account.account_id,
                error = %e,
                "Failed to send verification email"
            );
        }
    }
}
