//! Async SMTP mailer.

use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::{debug, info};

/// Notifier errors.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("invalid email address: {0}")]
    Address(String),
}

/// Sends a message to a recipient.
#[tonic::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// Configuration for the SMTP transport.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// SMTP server hostname (e.g. "smtp.gmail.com").
    pub host: String,
    /// SMTP server port; 587 for STARTTLS.
    pub port: u16,
    /// Optional username for SMTP authentication.
    pub username: Option<String>,
    /// Optional password for SMTP authentication.
    pub password: Option<String>,
    /// Address the notifications appear to come from.
    pub from_address: String,
    /// Use STARTTLS for the connection.
    pub use_tls: bool,
}

/// Async SMTP notifier.
///
/// The transport pools connections internally; the actual connection is made
/// lazily on the first send.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_mailbox: Mailbox,
}

impl SmtpNotifier {
    /// Create a new notifier from the given configuration.
    pub fn new(config: SmtpConfig) -> Result<Self, NotifyError> {
        let from_mailbox: Mailbox = config
            .from_address
            .parse()
            .map_err(|e| NotifyError::Address(format!("{e}")))?;

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| NotifyError::Connection(format!("{e}")))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let mut builder = builder.port(config.port);

        if let (Some(username), Some(password)) = (config.username, config.password) {
            builder = builder.credentials(Credentials::new(username, password));
        }

        debug!("SMTP notifier initialized");

        Ok(Self {
            transport: builder.build(),
            from_mailbox,
        })
    }
}

#[tonic::async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        let to_mailbox: Mailbox = to.parse().map_err(|e| NotifyError::Address(format!("{e}")))?;

        let message = Message::builder()
            .from(self.from_mailbox.clone())
            .to(to_mailbox)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| NotifyError::Send(format!("failed to build message: {e}")))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Send(format!("{e}")))?;

        info!(to, subject, "Email sent");
        Ok(())
    }
}
