//! SMTP email sender using Lettre.

use async_trait::async_trait;
use hibiscus_core::notify::{EmailMessage, EmailSender};
use hibiscus_core::{CoreError, CoreResult};
use hibiscus_store::app_config::SmtpConfig;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

const IMPLICIT_TLS_PORT: u16 = 465;

#[derive(Clone)]
pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_email: String,
    from_name: String,
}

impl SmtpEmailSender {
    /// `timeout` bounds each SMTP exchange, connection included.
    pub fn new(config: &SmtpConfig, timeout: Duration) -> CoreResult<Self> {
        let credentials = Credentials::new(config.username.clone(), config.password.clone());

        let builder = if config.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.server)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.server)
        }
        .map_err(|e| CoreError::upstream(format!("SMTP relay error: {e}")))?;

        let transport = builder
            .port(config.port)
            .credentials(credentials)
            .timeout(Some(timeout))
            .build();

        Ok(Self {
            transport,
            from_email: config.from_email.clone(),
            from_name: config.from_name.clone(),
        })
    }

    fn from_header(&self) -> String {
        format!("{} <{}>", self.from_name, self.from_email)
    }

    fn build(&self, message: &EmailMessage) -> CoreResult<Message> {
        let builder = Message::builder()
            .from(
                self.from_header()
                    .parse()
                    .map_err(|e| CoreError::Validation(format!("Invalid from address: {e}")))?,
            )
            .to(message
                .to
                .parse()
                .map_err(|e| CoreError::Validation(format!("Invalid to address: {e}")))?)
            .subject(message.subject.clone());

        let built = match &message.calendar_invite {
            Some(ics) => {
                let calendar_type = ContentType::parse("text/calendar; method=REQUEST; charset=UTF-8")
                    .map_err(|e| CoreError::upstream(format!("Invalid content type: {e}")))?;
                builder.multipart(
                    MultiPart::mixed()
                        .singlepart(SinglePart::html(message.html_body.clone()))
                        .singlepart(Attachment::new("invite.ics".to_string()).body(ics.clone(), calendar_type)),
                )
            }
            None => builder
                .header(ContentType::TEXT_HTML)
                .body(message.html_body.clone()),
        };

        built.map_err(|e| CoreError::upstream(format!("Failed to build email: {e}")))
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send_email(&self, message: &EmailMessage) -> CoreResult<()> {
        let email = self.build(message)?;
        self.transport
            .send(email)
            .await
            .map_err(|e| CoreError::upstream(format!("Failed to send email: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn config(port: u16) -> SmtpConfig {
        SmtpConfig {
            server: "127.0.0.1".into(),
            port,
            username: "mailer".into(),
            password: "secret".into(),
            from_email: "bookings@hibiscus.test".into(),
            from_name: "Hibiscus Shuttles".into(),
        }
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        // Accepts the connection but never greets
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let sender = SmtpEmailSender::new(&config(port), Duration::from_secs(1)).unwrap();
        let message = EmailMessage {
            to: "ana@example.com".into(),
            subject: "Booking H1".into(),
            html_body: "<p>Confirmed</p>".into(),
            calendar_invite: None,
        };

        let result = tokio::time::timeout(Duration::from_secs(10), sender.send_email(&message))
            .await
            .expect("send was not bounded by the SMTP timeout");
        assert!(matches!(result, Err(CoreError::UpstreamUnavailable(_))));
    }

    #[test]
    fn test_invite_is_attached() {
        let sender = SmtpEmailSender::new(&config(587), Duration::from_secs(5)).unwrap();
        let message = EmailMessage {
            to: "ana@example.com".into(),
            subject: "Booking H1".into(),
            html_body: "<p>Confirmed</p>".into(),
            calendar_invite: Some("BEGIN:VCALENDAR\r\nEND:VCALENDAR".into()),
        };
        let raw = String::from_utf8(sender.build(&message).unwrap().formatted()).unwrap();
        assert!(raw.contains("invite.ics"));
        assert!(raw.contains("From: Hibiscus Shuttles <bookings@hibiscus.test>"));
    }
}
