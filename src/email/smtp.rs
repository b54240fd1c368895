use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use secrecy::ExposeSecret;

use crate::{
    config::SmtpConfig,
    email::{EmailError, Mailer, OutgoingEmail},
};

/// STARTTLS SMTP relay sending multipart (plain text + HTML) messages.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Returns `Ok(None)` when credentials are not configured.
    pub fn from_config(config: &SmtpConfig) -> Result<Option<Self>, EmailError> {
        let (Some(username), Some(password)) = (&config.username, &config.password) else {
            return Ok(None);
        };
        if !config.is_configured() {
            return Ok(None);
        }

        let from = format!("{} <{}>", config.from_name, username)
            .parse::<Mailbox>()
            .map_err(|_| EmailError::InvalidAddress(username.clone()))?;

        let credentials = Credentials::new(username.clone(), password.expose_secret().to_string());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port)
            .credentials(credentials)
            .build();

        Ok(Some(Self { transport, from }))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError> {
        let to = email
            .to
            .parse::<Mailbox>()
            .map_err(|_| EmailError::InvalidAddress(email.to.clone()))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.as_str())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(email.text_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(email.html_body),
                    ),
            )?;

        self.transport.send(message).await?;

        tracing::info!(to = %email.to, subject = %email.subject, "email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn smtp(user: Option<&str>, pass: Option<&str>) -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".into(),
            port: 587,
            username: user.map(str::to_string),
            password: pass.map(|p| SecretString::from(p.to_string())),
            from_name: "DVIT GOLF".into(),
        }
    }

    #[test]
    fn unconfigured_smtp_yields_no_mailer() {
        assert!(SmtpMailer::from_config(&smtp(None, None)).expect("ok").is_none());
        assert!(
            SmtpMailer::from_config(&smtp(Some("shop@example.com"), Some("")))
                .expect("ok")
                .is_none()
        );
    }

    #[tokio::test]
    async fn configured_smtp_builds_transport() {
        let mailer = SmtpMailer::from_config(&smtp(Some("shop@example.com"), Some("secret")))
            .expect("ok")
            .expect("mailer");
        assert_eq!(mailer.from.email.to_string(), "shop@example.com");
    }
}
