//! Outbound notification capability.
//!
//! Only the verification-code feature sends anything; the core treats
//! delivery as a fallible external call with no interesting state.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::error::AuthError;

/// Delivers a plain-text message to an address.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, address: &str, subject: &str, body: &str) -> Result<(), AuthError>;
}

/// SMTP notifier over lettre's async transport.
pub struct SmtpNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpNotifier {
    pub fn new(
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        from: &str,
    ) -> Result<Self, AuthError> {
        let creds = Credentials::new(username.to_string(), password.to_string());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| AuthError::Notify(e.to_string()))?
            .port(port)
            .credentials(creds)
            .build();
        Ok(Self {
            mailer,
            from: from.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, address: &str, subject: &str, body: &str) -> Result<(), AuthError> {
        let email = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| AuthError::Notify(format!("invalid from address: {e}")))?,
            )
            .to(address
                .parse()
                .map_err(|e| AuthError::Notify(format!("invalid recipient address: {e}")))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| AuthError::Notify(format!("failed to build message: {e}")))?;

        self.mailer
            .send(email)
            .await
            .map_err(|e| AuthError::Notify(e.to_string()))?;
        tracing::debug!("[notifier] [sent] to={}", address);
        Ok(())
    }
}

/// Stand-in for deployments without SMTP configured. Every send fails, so
/// issuing a verification code surfaces the missing configuration instead
/// of silently dropping the mail.
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn send(&self, _address: &str, _subject: &str, _body: &str) -> Result<(), AuthError> {
        Err(AuthError::Notify("no mail transport configured".into()))
    }
}
