//! HTTP-backed [`GenerativeClient`] for a hosted text-generation endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::GenerativeClient;
use crate::error::ExtractError;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    text: String,
}

/// Client for a JSON completion endpoint: POST `{"prompt": ...}` with a
/// bearer token, get `{"text": ...}` back.
pub struct HttpGenerativeClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpGenerativeClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl GenerativeClient for HttpGenerativeClient {
    async fn generate(&self, prompt: &str) -> Result<String, ExtractError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&GenerateRequest { prompt })
            .send()
            .await
            .map_err(|e| ExtractError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ExtractError::Generation {
                status: status.as_u16(),
                message,
            });
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ExtractError::MalformedResponse(e.to_string()))?;
        Ok(body.text)
    }
}
