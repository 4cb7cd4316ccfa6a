use async_trait::async_trait;
use lettre::message::{Mailbox, Mailboxes, header};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::EmailConfig;
use crate::error::Error;
use crate::model::NotificationEvent;
use crate::notifier::Notifier;

pub const SUBJECT: &str = "Your product is now in stock";

/// Sends one plain-text mail per event to every recipient in a single
/// transaction, over a STARTTLS-upgraded connection.
pub struct EmailNotifier {
    config: EmailConfig,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// # Errors
    ///
    /// Returns [`Error::Email`] if an address does not parse or the message
    /// cannot be assembled.
    pub fn compose(&self, body: &str) -> Result<Message, Error> {
        let from: Mailbox = self.config.sender.parse()?;
        let to: Mailboxes = self
            .config
            .recipients
            .iter()
            .map(|r| r.parse::<Mailbox>())
            .collect::<Result<_, _>>()?;

        let message = Message::builder()
            .from(from)
            .mailbox(header::To::from(to))
            .subject(SUBJECT)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body.to_string())?;
        Ok(message)
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, Error> {
        // connect, EHLO, STARTTLS, EHLO, AUTH; QUIT after the send
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)?
            .port(self.config.smtp_port)
            .credentials(Credentials::new(
                self.config.sender.clone(),
                self.config.password.clone().unwrap_or_default(),
            ))
            .build();
        Ok(transport)
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn channel(&self) -> &'static str {
        "email"
    }

    async fn notify(&self, event: &NotificationEvent) -> Result<(), Error> {
        let message = self.compose(&event.message_text)?;
        self.transport()?.send(message).await?;
        Ok(())
    }
}
