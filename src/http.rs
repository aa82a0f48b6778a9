//! HTTP client construction and body-logging helpers.

use reqwest::{Client, RequestBuilder};

use crate::error::ClientError;
use crate::options::ClientConfig;

/// Header carrying a per-request correlation id generated by this client.
pub const CLIENT_REQUEST_ID: &str = "x-client-request-id";
/// Header the platform uses to echo its own request id.
pub const REQUEST_ID: &str = "x-request-id";

/// Build the shared HTTP client from configuration.
pub fn build_http_client(config: &ClientConfig) -> Result<Client, ClientError> {
    let mut builder = Client::builder().timeout(config.timeout);

    if let Some(proxy_url) = &config.proxy {
        let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| {
            ClientError::configuration(format!("invalid proxy `{proxy_url}`: {e}"))
        })?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| ClientError::configuration(format!("failed to build HTTP client: {e}")))
}

/// Add extra headers from configuration to a request.
pub fn add_extra_headers(mut request: RequestBuilder, config: &ClientConfig) -> RequestBuilder {
    for (key, value) in &config.headers {
        request = request.header(key, value);
    }
    request
}

/// Extension trait for RequestBuilder that logs request body.
pub trait RequestBuilderExt {
    /// Set JSON request body and log it. Returns the RequestBuilder for chaining.
    fn json_logged<T: serde::Serialize + ?Sized>(self, json: &T) -> Self;
}

impl RequestBuilderExt for RequestBuilder {
    fn json_logged<T: serde::Serialize + ?Sized>(self, json: &T) -> Self {
        if let Ok(req_body) = serde_json::to_string_pretty(json) {
            tracing::debug!("API request body ({} bytes):\n{}", req_body.len(), req_body);
        }

        self.json(json)
    }
}

/// Extension trait for Response that logs response body.
#[async_trait::async_trait]
pub trait ResponseExt {
    /// Platform request id, if the server sent one.
    fn request_id(&self) -> Option<String>;

    /// Get response text and log it. Consumes the response.
    async fn text_logged(self) -> Result<String, reqwest::Error>;
}

#[async_trait::async_trait]
impl ResponseExt for reqwest::Response {
    fn request_id(&self) -> Option<String> {
        self.headers()
            .get(REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    async fn text_logged(self) -> Result<String, reqwest::Error> {
        let text = self.text().await?;
        tracing::debug!("API response ({} bytes):\n{}", text.len(), text);
        Ok(text)
    }
}
