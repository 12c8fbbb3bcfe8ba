//! Delivery of signed requests to the gateway.
//!
//! The protocol only needs "POST a form body, read the reply text". The
//! [`Transport`] trait captures exactly that, so tests and hosts with their own
//! HTTP stack can swap the reqwest-backed [`HttpTransport`] out.

use crate::errors::{QuickpayError, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Content type of every direct API request.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Trait for anything that can POST a form-encoded body and return the reply body.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `body` to `url` and returns the raw reply text.
    ///
    /// Implementations must report network failures, timeouts and non-success
    /// statuses as errors for which [`QuickpayError::is_transport`] is true.
    async fn post_form(&self, url: &Url, body: String) -> Result<String>;
}

/// reqwest-backed transport.
///
/// TLS certificates are verified unless [`HttpTransport::danger_accept_invalid_certs`]
/// was used to build it.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Creates a transport with certificate verification and no timeout.
    pub fn new() -> Result<Self> {
        Self::build(true, None)
    }

    /// Creates a transport with a request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Self::build(true, Some(timeout))
    }

    /// Creates a transport that does not verify the server certificate.
    ///
    /// This exposes card data and the signed request to anyone able to
    /// intercept the connection. Only for test gateways.
    pub fn danger_accept_invalid_certs(timeout: Option<Duration>) -> Result<Self> {
        Self::build(false, timeout)
    }

    pub(crate) fn build(verify_tls: bool, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder().danger_accept_invalid_certs(!verify_tls);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Wraps an already configured reqwest client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_form(&self, url: &Url, body: String) -> Result<String> {
        debug!(url = %url, bytes = body.len(), "posting form to gateway");

        let response = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(QuickpayError::TransportError(format!(
                "gateway answered with status {}",
                status
            )));
        }

        Ok(response.text().await?)
    }
}
