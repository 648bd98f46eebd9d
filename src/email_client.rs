use crate::domain::UserEmail;
use reqwest::{Client, Error};
use secrecy::{ExposeSecret, Secret};
use serde::Serialize;
use std::time::Duration;

/// Outgoing transactional email. `tag` groups messages on the provider side.
#[derive(Debug)]
pub struct Message<'a> {
    pub tag: &'a str,
    pub subject: &'a str,
    pub html_body: &'a str,
    pub text_body: &'a str,
}

#[derive(Clone)]
pub struct EmailClient {
    http_client: Client,
    base_url: String,
    sender: UserEmail,
    authorization_token: Secret<String>,
}

impl EmailClient {
    pub fn new(
        base_url: String,
        sender: UserEmail,
        authorization_token: Secret<String>,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let http_client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            base_url,
            sender,
            authorization_token,
        })
    }

    #[tracing::instrument(name = "Send email", skip(self, message), fields(tag = message.tag))]
    pub async fn send_email(&self, recipient: &UserEmail, message: Message<'_>) -> Result<(), Error> {
        let url = format!("{}/email", self.base_url.trim_end_matches('/'));
        let request_body = SendEmailRequest {
            from: self.sender.as_ref(),
            to: recipient.as_ref(),
            subject: message.subject,
            html_body: message.html_body,
            text_body: message.text_body,
            tag: message.tag,
        };

        self.http_client
            .post(&url)
            .header(
                "X-Postmark-Server-Token",
                self.authorization_token.expose_secret(),
            )
            .json(&request_body)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html_body: &'a str,
    text_body: &'a str,
    tag: &'a str,
}
