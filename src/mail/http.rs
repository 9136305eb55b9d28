//! HTTP mail-API transport (Mailtrap send API compatible).

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, instrument};

use super::{EmailMessage, EmailTransport, Mailbox};
use crate::config::MailConfig;
use crate::error::{NotifierError, NotifierResult};

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a Mailbox,
    to: [&'a Mailbox; 1],
    subject: &'a str,
    html: &'a str,
}

pub struct HttpMailTransport {
    client: Client,
    endpoint: String,
    api_token: String,
}

impl HttpMailTransport {
    pub fn new(config: &MailConfig) -> NotifierResult<Self> {
        if config.api_token.is_empty() {
            return Err(NotifierError::configuration(
                "mail.api_token is required for the HTTP mail transport",
            ));
        }

        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| NotifierError::configuration(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_token: config.api_token.clone(),
        })
    }
}

#[async_trait]
impl EmailTransport for HttpMailTransport {
    #[instrument(skip(self, message), fields(to = %message.to.email, subject = %message.subject))]
    async fn send(&self, message: &EmailMessage) -> NotifierResult<()> {
        let body = SendRequest {
            from: &message.from,
            to: [&message.to],
            subject: &message.subject,
            html: &message.html_body,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(%status, "Mail API accepted message");
            return Ok(());
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                NotifierError::transport(format!("mail API rejected credentials ({status})"))
            }
            _ => NotifierError::transport(format!("mail API returned {status}: {error_text}")),
        })
    }

    fn transport_name(&self) -> &'static str {
        "http"
    }
}

impl std::fmt::Debug for HttpMailTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpMailTransport")
            .field("endpoint", &self.endpoint)
            .field("api_token", &"[REDACTED]")
            .finish()
    }
}
