//! Text generation clients
//!
//! [`TextGenerator`] is the seam between report assembly and the remote
//! service. [`HttpTextGenerator`] talks to an OpenAI-compatible
//! chat-completions endpoint; [`CachedGenerator`] wraps any generator with a
//! content-addressed response cache.

use crate::config::GenerationConfig;
use crate::error::GenerationError;
use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Produces text for a prompt
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a response of at most `max_tokens` tokens
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, GenerationError>;
}

#[async_trait]
impl<G: TextGenerator + ?Sized> TextGenerator for std::sync::Arc<G> {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, GenerationError> {
        (**self).generate(prompt, max_tokens).await
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Trimmed `choices[0].message.content` of a chat-completions body
///
/// # Errors
/// `Malformed` when the body is not JSON or the content is absent.
pub fn parse_completion(body: &str) -> Result<String, GenerationError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| GenerationError::Malformed(e.to_string()))?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .ok_or_else(|| GenerationError::Malformed("missing choices[0].message.content".to_string()))
}

/// Chat-completions client with timeout and bounded retry
#[derive(Debug, Clone)]
pub struct HttpTextGenerator {
    client: reqwest::Client,
    config: GenerationConfig,
    token: String,
}

impl HttpTextGenerator {
    /// Create a client reading the token from `config.token_env`
    ///
    /// # Errors
    /// `MissingToken` when the variable is unset or empty.
    pub fn from_env(config: GenerationConfig) -> Result<Self, GenerationError> {
        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| GenerationError::MissingToken(config.token_env.clone()))?;
        Self::with_token(config, token)
    }

    /// Create a client with an explicit token
    ///
    /// # Errors
    /// `Transport` when the HTTP client cannot be built.
    pub fn with_token(config: GenerationConfig, token: impl Into<String>) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            config,
            token: token.into(),
        })
    }

    async fn attempt(&self, prompt: &str, max_tokens: u32) -> Result<String, GenerationError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens,
        };
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }
        parse_completion(&body)
    }
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, GenerationError> {
        let mut attempt = 0;
        loop {
            info!(model = %self.config.model, max_tokens, "sent prompt");
            match self.attempt(prompt, max_tokens).await {
                Ok(text) => {
                    info!(chars = text.len(), "received response");
                    return Ok(text);
                }
                Err(err) if err.is_transient() && attempt < self.config.max_retries => {
                    let delay = self.config.backoff(attempt);
                    warn!(attempt = attempt + 1, ?delay, error = %err, "transient generation failure, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Response cache keyed by the blake3 hash of `(max_tokens, prompt)`
#[derive(Debug, Clone)]
pub struct CachedGenerator<G> {
    inner: G,
    cache: Cache<String, String>,
}

impl<G: TextGenerator> CachedGenerator<G> {
    /// Wrap `inner`, keeping up to `capacity` responses
    #[must_use]
    pub fn new(inner: G, capacity: u64) -> Self {
        Self {
            inner,
            cache: Cache::new(capacity),
        }
    }

    /// Cache key of a request
    #[must_use]
    pub fn key(prompt: &str, max_tokens: u32) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&max_tokens.to_le_bytes());
        hasher.update(prompt.as_bytes());
        hex::encode(hasher.finalize().as_bytes())
    }

    /// Wrapped generator
    #[must_use]
    pub fn inner(&self) -> &G {
        &self.inner
    }
}

#[async_trait]
impl<G: TextGenerator> TextGenerator for CachedGenerator<G> {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, GenerationError> {
        let key = Self::key(prompt, max_tokens);
        if let Some(hit) = self.cache.get(&key).await {
            debug!(key = %&key[..12], "response cache hit");
            return Ok(hit);
        }
        let text = self.inner.generate(prompt, max_tokens).await?;
        self.cache.insert(key, text.clone()).await;
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextGenerator for Counting {
        async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{max_tokens}:{prompt}"))
        }
    }

    #[test]
    fn completion_content_is_trimmed() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  hello \n"}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "hello");
    }

    #[test]
    fn completion_without_choices_is_malformed() {
        assert!(matches!(parse_completion(r#"{"choices":[]}"#), Err(GenerationError::Malformed(_))));
        assert!(matches!(parse_completion("not json"), Err(GenerationError::Malformed(_))));
        assert!(matches!(
            parse_completion(r#"{"choices":[{"message":{"content":null}}]}"#),
            Err(GenerationError::Malformed(_))
        ));
    }

    #[test]
    fn request_body_shape() {
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: [ChatMessage {
                role: "user",
                content: "hi",
            }],
            max_tokens: 1000,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "model": "gpt-4o-mini",
                "messages": [{"role": "user", "content": "hi"}],
                "max_tokens": 1000
            })
        );
    }

    #[test]
    fn keys_depend_on_token_limit() {
        assert_ne!(
            CachedGenerator::<Counting>::key("p", 1000),
            CachedGenerator::<Counting>::key("p", 2000)
        );
        assert_eq!(CachedGenerator::<Counting>::key("p", 1000).len(), 64);
    }

    #[tokio::test]
    async fn identical_prompts_hit_service_once() {
        let cached = CachedGenerator::new(
            Counting {
                calls: AtomicUsize::new(0),
            },
            16,
        );
        assert_eq!(cached.generate("q", 10).await.unwrap(), "10:q");
        assert_eq!(cached.generate("q", 10).await.unwrap(), "10:q");
        cached.generate("other", 10).await.unwrap();
        assert_eq!(cached.inner().calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn missing_token_is_reported() {
        let config = GenerationConfig {
            token_env: "AUTOLYSIS_TEST_UNSET_TOKEN".to_string(),
            ..GenerationConfig::default()
        };
        assert_eq!(
            HttpTextGenerator::from_env(config).unwrap_err(),
            GenerationError::MissingToken("AUTOLYSIS_TEST_UNSET_TOKEN".into())
        );
    }
}
