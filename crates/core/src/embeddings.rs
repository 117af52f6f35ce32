use crate::error::RagError;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

/// Deterministic content hash used for chunk deduplication and query
/// cache keys. Independent of any provider call.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[async_trait]
pub trait TextEmbedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;
}

/// Provider API families with distinct payload and response shapes.
/// Selected explicitly in configuration; the endpoint-substring fallback
/// exists for parity with deployments that only set the URL.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderFamily {
    /// Header-keyed API with nested content parts (Google generative
    /// language endpoints).
    Gemini,
    /// Bearer-token API with an `input` field (`/v1/` style endpoints).
    OpenAi,
    /// Bearer-token API with a `prompt` field (Ollama-style endpoints).
    Prompt,
}

impl ProviderFamily {
    pub fn infer_from_endpoint(endpoint: &str) -> Self {
        if endpoint.contains("generativelanguage.googleapis.com") {
            ProviderFamily::Gemini
        } else if endpoint.contains("/v1/") {
            ProviderFamily::OpenAi
        } else {
            ProviderFamily::Prompt
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub family: Option<ProviderFamily>,
}

pub struct HttpEmbeddingClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    family: ProviderFamily,
    retry: RetryPolicy,
}

impl HttpEmbeddingClient {
    /// Fails fast on missing or invalid configuration, before any
    /// network call is made.
    pub fn new(config: EmbeddingConfig, retry: RetryPolicy) -> Result<Self, RagError> {
        if config.api_key.trim().is_empty() {
            return Err(RagError::Config("embedding API key".to_string()));
        }
        if config.endpoint.trim().is_empty() {
            return Err(RagError::Config("embedding API endpoint".to_string()));
        }
        if config.model.trim().is_empty() {
            return Err(RagError::Config("embedding model".to_string()));
        }
        Url::parse(&config.endpoint)?;

        let family = config
            .family
            .unwrap_or_else(|| ProviderFamily::infer_from_endpoint(&config.endpoint));

        Ok(Self {
            client: Client::new(),
            endpoint: config.endpoint,
            api_key: config.api_key,
            model: config.model,
            family,
            retry,
        })
    }

    pub fn family(&self) -> ProviderFamily {
        self.family
    }

    async fn request_once(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let mut request = self.client.post(&self.endpoint);
        request = match self.family {
            ProviderFamily::Gemini => request.header("x-goog-api-key", &self.api_key),
            _ => request.bearer_auth(&self.api_key),
        };

        let response = match self.family {
            ProviderFamily::Gemini => {
                request
                    .json(&GeminiRequest {
                        model: &self.model,
                        content: GeminiContent {
                            parts: vec![GeminiPart { text }],
                        },
                    })
                    .send()
                    .await?
            }
            ProviderFamily::OpenAi => {
                request
                    .json(&OpenAiRequest {
                        model: &self.model,
                        input: text,
                    })
                    .send()
                    .await?
            }
            ProviderFamily::Prompt => {
                request
                    .json(&PromptRequest {
                        model: &self.model,
                        prompt: text,
                    })
                    .send()
                    .await?
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Upstream {
                provider: "embedding",
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        decode_embedding(self.family, &body)
    }
}

#[async_trait]
impl TextEmbedder for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        self.retry
            .run(
                || self.request_once(text),
                |error| matches!(error, RagError::Upstream { .. }),
            )
            .await
    }
}

#[derive(Serialize)]
struct GeminiRequest<'a> {
    model: &'a str,
    content: GeminiContent<'a>,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Serialize)]
struct PromptRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct GeminiResponse {
    embedding: Option<GeminiValues>,
    #[serde(rename = "embeddingList")]
    embedding_list: Option<Vec<GeminiValues>>,
}

#[derive(Deserialize)]
struct GeminiValues {
    values: Option<Vec<f32>>,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    data: Option<Vec<OpenAiDatum>>,
}

#[derive(Deserialize)]
struct OpenAiDatum {
    embedding: Option<Vec<f32>>,
}

#[derive(Deserialize)]
struct PromptResponse {
    embedding: Option<Vec<f32>>,
    embeddings: Option<Vec<Vec<f32>>>,
}

/// One decoder per provider family instead of a single shape-sniffing
/// chain, so a response that does not match its own family fails loudly.
fn decode_embedding(family: ProviderFamily, body: &str) -> Result<Vec<f32>, RagError> {
    let malformed = |details: &str| RagError::MalformedResponse {
        provider: "embedding",
        details: details.to_string(),
    };

    let embedding = match family {
        ProviderFamily::Gemini => {
            let parsed: GeminiResponse =
                serde_json::from_str(body).map_err(|_| malformed("not a Gemini payload"))?;
            parsed
                .embedding
                .and_then(|values| values.values)
                .or_else(|| {
                    parsed
                        .embedding_list
                        .and_then(|mut list| list.drain(..).next())
                        .and_then(|values| values.values)
                })
        }
        ProviderFamily::OpenAi => {
            let parsed: OpenAiResponse =
                serde_json::from_str(body).map_err(|_| malformed("not an OpenAI payload"))?;
            parsed
                .data
                .and_then(|mut data| data.drain(..).next())
                .and_then(|datum| datum.embedding)
        }
        ProviderFamily::Prompt => {
            let parsed: PromptResponse =
                serde_json::from_str(body).map_err(|_| malformed("not an embedding payload"))?;
            parsed
                .embedding
                .or_else(|| parsed.embeddings.and_then(|mut list| list.drain(..).next()))
        }
    };

    match embedding {
        Some(vector) if !vector.is_empty() => Ok(vector),
        _ => Err(malformed("missing embedding vector")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_deterministic() {
        let first = content_hash("kebutuhan kalori harian");
        let second = content_hash("kebutuhan kalori harian");
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn content_hash_differs_on_one_char() {
        assert_ne!(content_hash("protein"), content_hash("proteins"));
    }

    #[test]
    fn family_inference_matches_endpoint_shapes() {
        assert_eq!(
            ProviderFamily::infer_from_endpoint(
                "https://generativelanguage.googleapis.com/v1beta/models/embedding-001:embedContent"
            ),
            ProviderFamily::Gemini
        );
        assert_eq!(
            ProviderFamily::infer_from_endpoint("https://api.openai.com/v1/embeddings"),
            ProviderFamily::OpenAi
        );
        assert_eq!(
            ProviderFamily::infer_from_endpoint("http://localhost:11434/api/embeddings"),
            ProviderFamily::Prompt
        );
    }

    #[test]
    fn missing_config_fails_before_any_network_call() {
        let config = EmbeddingConfig {
            endpoint: "https://api.openai.com/v1/embeddings".to_string(),
            api_key: "  ".to_string(),
            model: "text-embedding-3-small".to_string(),
            family: None,
        };
        let result = HttpEmbeddingClient::new(config, RetryPolicy::default());
        assert!(matches!(result, Err(RagError::Config(_))));
    }

    #[test]
    fn gemini_decoder_reads_nested_values() {
        let body = r#"{"embedding": {"values": [0.1, 0.2, 0.3]}}"#;
        let vector = decode_embedding(ProviderFamily::Gemini, body).expect("decodes");
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn gemini_decoder_falls_back_to_batch_list() {
        let body = r#"{"embeddingList": [{"values": [1.0, 2.0]}]}"#;
        let vector = decode_embedding(ProviderFamily::Gemini, body).expect("decodes");
        assert_eq!(vector, vec![1.0, 2.0]);
    }

    #[test]
    fn openai_decoder_reads_data_array() {
        let body = r#"{"data": [{"embedding": [0.5, 0.6]}]}"#;
        let vector = decode_embedding(ProviderFamily::OpenAi, body).expect("decodes");
        assert_eq!(vector, vec![0.5, 0.6]);
    }

    #[test]
    fn prompt_decoder_reads_flat_embedding() {
        let body = r#"{"embedding": [0.9]}"#;
        let vector = decode_embedding(ProviderFamily::Prompt, body).expect("decodes");
        assert_eq!(vector, vec![0.9]);
    }

    #[test]
    fn wrong_shape_is_a_malformed_response() {
        let body = r#"{"data": [{"embedding": [0.5]}]}"#;
        let result = decode_embedding(ProviderFamily::Gemini, body);
        assert!(matches!(result, Err(RagError::MalformedResponse { .. })));
    }
}
