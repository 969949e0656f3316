//! HTTP delivery seam.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::error::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// 2xx.
    Delivered(u16),
    /// Any other status, with the response body.
    Rejected(u16, String),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered(_))
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, payload: &Value) -> Result<DeliveryOutcome, TransportError>;
}

/// POSTs JSON to a fixed endpoint.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    /// Without `timeout` a request may hang as long as the connection allows.
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, TransportError> {
        Ok(Self { client: build_client(timeout)?, url: url.into() })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn deliver(&self, payload: &Value) -> Result<DeliveryOutcome, TransportError> {
        post_json(&self.client, &self.url, payload).await
    }
}

pub(crate) fn build_client(timeout: Option<Duration>) -> Result<reqwest::Client, TransportError> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}

pub(crate) async fn post_json<T: Serialize + ?Sized>(
    client: &reqwest::Client,
    url: &str,
    body: &T,
) -> Result<DeliveryOutcome, TransportError> {
    let response = client.post(url).json(body).send().await?;
    let status = response.status();
    if status.is_success() {
        Ok(DeliveryOutcome::Delivered(status.as_u16()))
    } else {
        let text = response.text().await.unwrap_or_default();
        Ok(DeliveryOutcome::Rejected(status.as_u16(), text))
    }
}
