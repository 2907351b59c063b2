//! Webhook HTTP transport
//!
//! Performs one request per call against the configured endpoint and
//! hands back the raw response body. The transport is deliberately
//! infallible: network and body-read failures degrade to an empty body,
//! and callers apply their own JSON fallback policy.

use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use tracing::{debug, warn};

use crate::config::{ChatConfig, HttpMethod};
use crate::error::Error;
use crate::webhook::Attachment;

/// HTTP client for the configured webhook endpoint
#[derive(Clone)]
pub struct WebhookClient {
    client: Client,
    url: String,
    method: HttpMethod,
    headers: HeaderMap,
}

impl WebhookClient {
    /// Create a new webhook client from the chat configuration
    pub fn new(config: &ChatConfig) -> crate::Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(Error::Http)?;

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = name
                .parse::<HeaderName>()
                .map_err(|e| Error::Config(format!("Invalid header name '{}': {}", name, e)))?;
            let value = value
                .parse::<HeaderValue>()
                .map_err(|e| Error::Config(format!("Invalid header value for '{}': {}", name, e)))?;
            headers.insert(name, value);
        }

        Ok(Self {
            client,
            url: config.webhook_url.clone(),
            method: config.method,
            headers,
        })
    }

    /// Perform one request and return the response body
    ///
    /// GET serializes the parameters as the query string; attachments are
    /// ignored since GET carries no body. POST sends a multipart form
    /// with one text part per parameter and one `files` part per
    /// attachment. Failures are logged and yield an empty body.
    pub async fn execute(&self, params: &[(String, String)], attachments: Vec<Attachment>) -> String {
        let request = match self.method {
            HttpMethod::Get => {
                if !attachments.is_empty() {
                    debug!("Dropping {} attachments on GET request", attachments.len());
                }
                self.client
                    .get(&self.url)
                    .headers(self.headers.clone())
                    .query(params)
            }
            HttpMethod::Post => {
                let mut form = Form::new();
                for (key, value) in params {
                    form = form.text(key.clone(), value.clone());
                }
                for attachment in attachments {
                    let part =
                        Part::bytes(attachment.data).file_name(attachment.file_name.clone());
                    let part = match part.mime_str(attachment.mime_type.as_ref()) {
                        Ok(part) => part,
                        Err(e) => {
                            // Unreachable for a parsed mime::Mime, but never fatal
                            warn!("Skipping attachment '{}': {}", attachment.file_name, e);
                            continue;
                        }
                    };
                    form = form.part("files", part);
                }
                self.client
                    .post(&self.url)
                    .headers(self.headers.clone())
                    .multipart(form)
            }
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Webhook request failed: {}", e);
                return String::new();
            }
        };

        debug!("Webhook responded with status {}", response.status());

        match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to read webhook response body: {}", e);
                String::new()
            }
        }
    }
}
