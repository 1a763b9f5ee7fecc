//! HTTP transport over `reqwest`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::{header, Client, Url};

use super::{ExchangeOutcome, Transport};
use crate::error::{NpjwiError, Result};

/// JSON-over-HTTP POST transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
}

impl HttpTransport {
    /// Create a transport posting to `endpoint`.
    pub fn new(endpoint: Url) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| NpjwiError::Network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self::with_client(client, endpoint))
    }

    /// Create a transport reusing an existing `reqwest` client.
    pub fn with_client(client: Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }

    /// Endpoint requests are posted to
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl Transport for HttpTransport {
    fn exchange(
        &self,
        body: String,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = ExchangeOutcome> + Send + '_>> {
        Box::pin(async move {
            tracing::trace!(endpoint = %self.endpoint, %body, "POST");

            let request = self
                .client
                .post(self.endpoint.clone())
                .header(header::CONTENT_TYPE, "application/json")
                .timeout(timeout)
                .body(body);

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) if e.is_timeout() => return ExchangeOutcome::TimedOut,
                Err(e) => return ExchangeOutcome::Failed(e.to_string()),
            };

            let status = response.status().as_u16();
            match response.text().await {
                Ok(body) => {
                    tracing::trace!(status, %body, "response");
                    ExchangeOutcome::Completed { status, body }
                }
                Err(e) if e.is_timeout() => ExchangeOutcome::TimedOut,
                Err(e) => ExchangeOutcome::Failed(format!("Failed to read response: {e}")),
            }
        })
    }

    fn name(&self) -> &'static str {
        "HTTP"
    }
}
