use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};
use secrecy::ExposeSecret;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::ServiceError;
use crate::config::SmtpConfig;

/// Delivers verification links. Callers log failures instead of propagating them.
#[async_trait]
pub trait EmailNotifier: Send + Sync {
    async fn send_verification_email(&self, to_email: &str, link: &str)
        -> Result<(), ServiceError>;
}

#[derive(Clone)]
pub struct SmtpEmailService {
    mailer: SmtpTransport,
    from_email: String,
}

impl SmtpEmailService {
    pub fn new(config: &SmtpConfig) -> Result<Self, ServiceError> {
        let creds = Credentials::new(
            config.user.clone(),
            config.password.expose_secret().clone(),
        );

        let mailer = SmtpTransport::starttls_relay(&config.host)
            .map_err(|e| anyhow::anyhow!("Invalid SMTP relay {}: {}", config.host, e))?
            .credentials(creds)
            .port(config.port)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!(host = %config.host, port = config.port, "SMTP email service initialized");

        Ok(Self {
            mailer,
            from_email: config.from_email.clone(),
        })
    }

    async fn send_plain(&self, to_email: &str, subject: &str, body: String) -> Result<(), ServiceError> {
        let from = self
            .from_email
            .parse()
            .map_err(|e: lettre::address::AddressError| anyhow::anyhow!(e))?;
        let to = to_email
            .parse()
            .map_err(|e: lettre::address::AddressError| anyhow::anyhow!(e))?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| anyhow::anyhow!("Failed to build email: {}", e))?;

        // SmtpTransport is blocking
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| anyhow::anyhow!("Email task failed: {}", e))?;

        match result {
            Ok(_) => {
                tracing::info!(to = %to_email, subject = %subject, "Email sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, to = %to_email, "Failed to send email");
                Err(anyhow::anyhow!("SMTP delivery failed: {}", e).into())
            }
        }
    }
}

#[async_trait]
impl EmailNotifier for SmtpEmailService {
    async fn send_verification_email(
        &self,
        to_email: &str,
        link: &str,
    ) -> Result<(), ServiceError> {
        let body = format!(
            "Welcome! Please verify your email address by visiting the link below:\n\n{}\n\n\
             If you didn't request this, please ignore this email.",
            link
        );

        self.send_plain(to_email, "Verify Your Email Address", body)
            .await
    }
}

/// A delivery captured by [`MockEmailService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub to: String,
    pub link: String,
}

/// In-process notifier that records deliveries; can be switched to fail.
#[derive(Clone, Default)]
pub struct MockEmailService {
    sent: Arc<Mutex<Vec<SentEmail>>>,
    fail: bool,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Arc::default(),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn last_link_for(&self, email: &str) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|s| s.to == email)
            .map(|s| s.link)
    }
}

#[async_trait]
impl EmailNotifier for MockEmailService {
    async fn send_verification_email(
        &self,
        to_email: &str,
        link: &str,
    ) -> Result<(), ServiceError> {
        if self.fail {
            return Err(anyhow::anyhow!("mock email delivery failure").into());
        }

        tracing::info!(to = %to_email, "Mock email: verification link recorded");
        self.sent
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock email lock poisoned: {}", e))?
            .push(SentEmail {
                to: to_email.to_string(),
                link: link.to_string(),
            });
        Ok(())
    }
}
