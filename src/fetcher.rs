use chrono::Local;
use log::debug;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

use crate::error::Error;
use crate::model::{AvailabilitySnapshot, FetchOutcome, Status, TransportErrorKind};
use crate::stores::StoreTarget;

#[derive(Debug, Deserialize)]
struct PickupResponse {
    body: PickupBody,
}

#[derive(Debug, Deserialize)]
struct PickupBody {
    stores: Vec<PickupStore>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PickupStore {
    parts_availability: HashMap<String, PartAvailability>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartAvailability {
    pickup_search_quote: String,
    pickup_display: Option<String>,
}

/// Issues one GET per store against the pickup-availability endpoint.
pub struct AvailabilityFetcher {
    client: Client,
    endpoint: Url,
    product_code: String,
}

impl AvailabilityFetcher {
    /// # Errors
    ///
    /// Returns an error if the endpoint is not a valid URL or the HTTP client
    /// cannot be built.
    pub fn new(endpoint: &str, product_code: &str, timeout_secs: u64) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: Url::parse(endpoint)?,
            product_code: product_code.to_string(),
        })
    }

    /// Fetches one store. Never fails: every problem is folded into the outcome.
    pub async fn fetch(&self, target: &StoreTarget) -> FetchOutcome {
        let mut url = self.endpoint.clone();
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &target.query_params {
                pairs.append_pair(key, value);
            }
        }
        debug!("GET {url}");

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return transport_error(&e),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return transport_error(&e),
        };

        if status != StatusCode::OK {
            return FetchOutcome::HttpError {
                status_code: status.as_u16(),
                body,
            };
        }

        match self.parse(&target.display_name, &body) {
            Ok(snapshot) => FetchOutcome::Success(snapshot),
            Err(message) => FetchOutcome::TransportError {
                kind: TransportErrorKind::MalformedPayload,
                message,
            },
        }
    }

    fn parse(&self, store_name: &str, body: &str) -> Result<AvailabilitySnapshot, String> {
        let response: PickupResponse =
            serde_json::from_str(body).map_err(|e| format!("unexpected response body: {e}"))?;

        let store = response
            .body
            .stores
            .into_iter()
            .next()
            .ok_or_else(|| "response contains no stores".to_string())?;

        let part = store
            .parts_availability
            .get(&self.product_code)
            .ok_or_else(|| format!("no availability entry for {}", self.product_code))?;

        Ok(AvailabilitySnapshot {
            store_name: store_name.to_string(),
            status: Status::from_display(part.pickup_display.as_deref()),
            display_text: part.pickup_display.clone().unwrap_or_default(),
            raw_quote: part.pickup_search_quote.clone(),
            observed_at: Local::now(),
        })
    }
}

fn transport_error(err: &reqwest::Error) -> FetchOutcome {
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() {
        TransportErrorKind::Connect
    } else if err.is_decode() || err.is_body() {
        TransportErrorKind::MalformedPayload
    } else {
        TransportErrorKind::Request
    };

    FetchOutcome::TransportError {
        kind,
        message: err.to_string(),
    }
}
