//! Minimal client for the Twilio REST API: send a message, place a call,
//! read back a call's status.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use std::time::Duration;

use crate::error::Error;

pub const DEFAULT_API_BASE_URL: &str = "https://api.twilio.com";

/// Operations the SMS and voice channels need from a telephony provider.
#[async_trait]
pub trait Telephony: Send + Sync {
    async fn create_message(&self, to: &str, from: &str, body: &str) -> Result<(), Error>;

    /// Places an outbound call and returns its id.
    async fn create_call(
        &self,
        to: &str,
        from: &str,
        callback_url: &str,
        timeout_secs: u64,
    ) -> Result<String, Error>;

    async fn call_status(&self, call_id: &str) -> Result<String, Error>;
}

#[derive(Debug, Deserialize)]
struct CallResource {
    sid: String,
    status: String,
}

pub struct TwilioClient {
    client: Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
}

impl TwilioClient {
    /// # Errors
    ///
    /// Returns [`Error::HttpRequest`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, account_sid: &str, auth_token: &str) -> Result<Self, Error> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            account_sid: account_sid.to_string(),
            auth_token: auth_token.to_string(),
        })
    }

    fn resource_url(&self, resource: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/{resource}",
            self.base_url, self.account_sid
        )
    }

    async fn post_form(&self, resource: &str, form: &[(&str, &str)]) -> Result<Response, Error> {
        let response = self
            .client
            .post(self.resource_url(resource))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(form)
            .send()
            .await?;
        ensure_success(response).await
    }
}

async fn ensure_success(response: Response) -> Result<Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Telephony {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl Telephony for TwilioClient {
    async fn create_message(&self, to: &str, from: &str, body: &str) -> Result<(), Error> {
        self.post_form("Messages.json", &[("To", to), ("From", from), ("Body", body)])
            .await?;
        Ok(())
    }

    async fn create_call(
        &self,
        to: &str,
        from: &str,
        callback_url: &str,
        timeout_secs: u64,
    ) -> Result<String, Error> {
        let timeout = timeout_secs.to_string();
        let call: CallResource = self
            .post_form(
                "Calls.json",
                &[
                    ("To", to),
                    ("From", from),
                    ("Url", callback_url),
                    ("Timeout", timeout.as_str()),
                ],
            )
            .await?
            .json()
            .await?;
        Ok(call.sid)
    }

    async fn call_status(&self, call_id: &str) -> Result<String, Error> {
        let response = self
            .client
            .get(self.resource_url(&format!("Calls/{call_id}.json")))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await?;
        let call: CallResource = ensure_success(response).await?.json().await?;
        Ok(call.status)
    }
}
