//! HTTP embedding provider.
//!
//! Speaks the common `POST {endpoint}` JSON shape: `{"model", "input"}` in,
//! `{"data": [{"embedding": [...]}]}` out.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header};
use serde::Serialize;
use tracing::{debug, instrument};
use url::Url;

use crate::application::search::{EmbeddingError, EmbeddingProvider, EmbeddingResponse};
use crate::infra::error::InfraError;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Clone)]
pub struct HttpEmbeddingClient {
    client: Client,
    endpoint: Url,
    model: String,
    api_token: Option<String>,
}

impl HttpEmbeddingClient {
    pub fn new(
        endpoint: &str,
        model: impl Into<String>,
        api_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, InfraError> {
        let endpoint = Url::parse(endpoint).map_err(|err| {
            InfraError::configuration(format!("semantic.endpoint `{endpoint}`: {err}"))
        })?;
        let client = Client::builder()
            .user_agent(concat!("edgepress/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|err| InfraError::http(err.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            model: model.into(),
            api_token: api_token.filter(|token| !token.is_empty()),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingClient {
    #[instrument(skip(self, text), fields(model = %self.model, chars = text.chars().count()))]
    async fn embed(&self, text: &str) -> Result<EmbeddingResponse, EmbeddingError> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(header::ACCEPT, "application/json")
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            });
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|err| EmbeddingError::provider(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::provider(format!("status {status}: {body}")));
        }

        let parsed = response
            .json::<EmbeddingResponse>()
            .await
            .map_err(|err| EmbeddingError::provider(format!("invalid response body: {err}")))?;
        debug!(vectors = parsed.data.len(), "embedding received");
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_endpoint() {
        let result = HttpEmbeddingClient::new("not a url", "model", None, Duration::from_secs(1));
        assert!(matches!(result, Err(InfraError::Configuration { .. })));
    }

    #[test]
    fn blank_token_is_dropped() {
        let client = HttpEmbeddingClient::new(
            "https://embeddings.example.com/v1/embeddings",
            "model",
            Some(String::new()),
            Duration::from_secs(1),
        )
        .unwrap();
        assert!(client.api_token.is_none());
        assert_eq!(client.endpoint().host_str(), Some("embeddings.example.com"));
    }

    #[test]
    fn request_body_uses_input_field() {
        let body = serde_json::to_value(EmbeddingRequest {
            model: "@cf/baai/bge-base-en-v1.5",
            input: "hello",
        })
        .unwrap();
        assert_eq!(body["input"], "hello");
        assert_eq!(body["model"], "@cf/baai/bge-base-en-v1.5");
    }
}
