//! Best-effort outbound email. Delivery failures are logged, never returned to API callers.

pub mod templates;

use log::{error, info, warn};
use std::sync::Arc;

use crate::core::config::EmailConfig;
pub use templates::{EmailContent, TicketEmailContext};

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub to: String,
    pub content: EmailContent,
}

pub trait MailTransport: Send + Sync {
    fn deliver(&self, email: &OutgoingEmail) -> anyhow::Result<()>;
}

#[cfg(feature = "mail")]
mod smtp {
    use anyhow::{Context, Result};
    use lettre::{
        message::{Mailbox, MultiPart},
        transport::smtp::authentication::Credentials,
        Message, SmtpTransport, Transport,
    };

    use super::{MailTransport, OutgoingEmail};
    use crate::core::config::EmailConfig;

    const DISPLAY_NAME: &str = "IT Support Desk";

    pub struct SmtpMailTransport {
        mailer: SmtpTransport,
        from: Mailbox,
    }

    impl SmtpMailTransport {
        pub fn from_config(config: &EmailConfig) -> Result<Self> {
            let creds = Credentials::new(config.username.clone(), config.password.clone());
            // 465 is implicit TLS; anything else negotiates STARTTLS.
            let builder = if config.smtp_port == 465 {
                SmtpTransport::relay(&config.smtp_server)
            } else {
                SmtpTransport::starttls_relay(&config.smtp_server)
            }
            .with_context(|| format!("SMTP relay error for {}", config.smtp_server))?;

            let from = format!("{DISPLAY_NAME} <{}>", config.sender())
                .parse::<Mailbox>()
                .context("Invalid from address")?;

            Ok(Self {
                mailer: builder.port(config.smtp_port).credentials(creds).build(),
                from,
            })
        }
    }

    impl MailTransport for SmtpMailTransport {
        fn deliver(&self, email: &OutgoingEmail) -> Result<()> {
            let message = Message::builder()
                .from(self.from.clone())
                .to(email.to.parse().context("Invalid to address")?)
                .subject(email.content.subject.clone())
                .multipart(MultiPart::alternative_plain_html(
                    email.content.text.clone(),
                    email.content.html.clone(),
                ))
                .context("Failed to build email")?;

            self.mailer.send(&message).context("Failed to send email")?;
            Ok(())
        }
    }
}

#[cfg(feature = "mail")]
pub use smtp::SmtpMailTransport;

#[cfg(feature = "mail")]
fn smtp_service(config: &EmailConfig) -> EmailService {
    match SmtpMailTransport::from_config(config) {
        Ok(transport) => {
            info!("Email notifications via {}:{}", config.smtp_server, config.smtp_port);
            EmailService::with_transport(Arc::new(transport))
        }
        Err(e) => {
            error!("Email notifications disabled: {e:#}");
            EmailService::disabled()
        }
    }
}

#[cfg(not(feature = "mail"))]
fn smtp_service(_config: &EmailConfig) -> EmailService {
    warn!("Built without the mail feature, email notifications disabled");
    EmailService::disabled()
}

#[derive(Clone, Default)]
pub struct EmailService {
    transport: Option<Arc<dyn MailTransport>>,
}

impl EmailService {
    pub fn from_config(config: &EmailConfig) -> Self {
        if !config.is_configured() {
            warn!("SMTP credentials not configured, email notifications disabled");
            return Self::disabled();
        }

        smtp_service(config)
    }

    pub fn disabled() -> Self {
        Self { transport: None }
    }

    pub fn with_transport(transport: Arc<dyn MailTransport>) -> Self {
        Self {
            transport: Some(transport),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    /// Delivers on the blocking pool. Returns whether the message went out.
    pub async fn send(&self, email: OutgoingEmail) -> bool {
        let Some(transport) = self.transport.clone() else {
            warn!("Skipping email '{}' to {}: SMTP not configured", email.content.subject, email.to);
            return false;
        };

        let to = email.to.clone();
        let result = tokio::task::spawn_blocking(move || transport.deliver(&email)).await;
        match result {
            Ok(Ok(())) => {
                info!("Email sent to {to}");
                true
            }
            Ok(Err(e)) => {
                error!("Failed to send email to {to}: {e:#}");
                false
            }
            Err(e) => {
                error!("Email task for {to} panicked: {e}");
                false
            }
        }
    }

    /// Fire-and-forget delivery of a batch.
    pub fn send_all(&self, emails: Vec<OutgoingEmail>) {
        if emails.is_empty() {
            return;
        }
        let service = self.clone();
        tokio::spawn(async move {
            for email in emails {
                service.send(email).await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<OutgoingEmail>>,
        fail: bool,
    }

    impl MailTransport for RecordingTransport {
        fn deliver(&self, email: &OutgoingEmail) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("connection refused");
            }
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    fn email() -> OutgoingEmail {
        OutgoingEmail {
            to: "client@example.com".into(),
            content: EmailContent {
                subject: "Ticket #1 Resolved".into(),
                text: "done".into(),
                html: "<p>done</p>".into(),
            },
        }
    }

    #[tokio::test]
    async fn test_send_records_delivery() {
        let transport = Arc::new(RecordingTransport::default());
        let service = EmailService::with_transport(transport.clone());
        assert!(service.send(email()).await);
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_send_failure_is_swallowed() {
        let transport = Arc::new(RecordingTransport {
            fail: true,
            ..Default::default()
        });
        let service = EmailService::with_transport(transport);
        assert!(!service.send(email()).await);
    }

    #[tokio::test]
    async fn test_disabled_service_skips() {
        let service = EmailService::from_config(&EmailConfig::default());
        assert!(!service.is_enabled());
        assert!(!service.send(email()).await);
    }
}
