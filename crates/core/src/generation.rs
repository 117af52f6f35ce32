use crate::error::RagError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, RagError>;
}

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub endpoint: String,
    pub model: String,
    /// Bearer token; some local deployments run without one.
    pub api_key: Option<String>,
}

/// Single-attempt generation client. Unlike embeddings, generation calls
/// are not retried: a failed answer surfaces to the caller immediately.
pub struct HttpGenerationClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpGenerationClient {
    pub fn new(config: GenerationConfig) -> Result<Self, RagError> {
        if config.endpoint.trim().is_empty() {
            return Err(RagError::Config("generation API endpoint".to_string()));
        }
        if config.model.trim().is_empty() {
            return Err(RagError::Config("generation model".to_string()));
        }
        Url::parse(&config.endpoint)?;

        Ok(Self {
            client: Client::new(),
            endpoint: config.endpoint,
            model: config.model,
            api_key: config.api_key,
        })
    }
}

#[async_trait]
impl TextGenerator for HttpGenerationClient {
    async fn generate(&self, prompt: &str) -> Result<String, RagError> {
        let mut request = self.client.post(&self.endpoint).json(&GenerationRequest {
            model: &self.model,
            prompt,
            stream: false,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Upstream {
                provider: "generation",
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerationResponse = response.json().await?;
        match parsed.response {
            Some(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
            _ => Err(RagError::MalformedResponse {
                provider: "generation",
                details: "missing response text".to_string(),
            }),
        }
    }
}

#[derive(Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerationResponse {
    response: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_endpoint_fails_fast() {
        let config = GenerationConfig {
            endpoint: String::new(),
            model: "llama3".to_string(),
            api_key: None,
        };
        assert!(matches!(
            HttpGenerationClient::new(config),
            Err(RagError::Config(_))
        ));
    }

    #[test]
    fn missing_model_fails_fast() {
        let config = GenerationConfig {
            endpoint: "http://localhost:11434/api/generate".to_string(),
            model: "  ".to_string(),
            api_key: None,
        };
        assert!(matches!(
            HttpGenerationClient::new(config),
            Err(RagError::Config(_))
        ));
    }
}
