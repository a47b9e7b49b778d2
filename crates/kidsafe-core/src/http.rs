//! Thin JSON-over-HTTPS client shared by the hosted embedding, chat and
//! rerank providers.
//!
//! Failures are classified into the crate error taxonomy: timeouts, connection
//! failures, 429 and 5xx become [`Error::Transient`]; 401/403 become
//! [`Error::InvalidConfig`] (a rejected credential is not worth retrying).

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use crate::error::Error;

#[derive(Clone)]
pub struct JsonClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl JsonClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> anyhow::Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::InvalidConfig(format!("no API key configured for {base_url}")).into());
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string(), api_key: api_key.to_string() })
    }

    pub fn base_url(&self) -> &str { &self.base_url }

    pub async fn post<B, R>(&self, path: &str, body: &B) -> anyhow::Result<R>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(classify_send_error)
            .with_context(|| format!("POST {url}"))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), &text)).with_context(|| format!("POST {url}"));
        }
        resp.json::<R>().await.with_context(|| format!("Failed to decode response from {url}"))
    }
}

fn classify_send_error(err: reqwest::Error) -> Error {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        Error::Transient(err.to_string())
    } else {
        Error::Operation(err.to_string())
    }
}

/// Map a non-success HTTP status to the error taxonomy.
pub fn status_error(status: u16, body: &str) -> Error {
    let body: String = body.chars().take(300).collect();
    match status {
        401 | 403 => Error::InvalidConfig(format!("credential rejected ({status}): {body}")),
        408 | 429 => Error::Transient(format!("HTTP {status}: {body}")),
        s if s >= 500 => Error::Transient(format!("HTTP {status}: {body}")),
        _ => Error::Operation(format!("HTTP {status}: {body}")),
    }
}
