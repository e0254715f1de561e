//! Generation client for a locally hosted inference service
//!
//! Wraps the Ollama HTTP contract: `POST /api/generate` for text,
//! `GET /api/tags` / `POST /api/pull` for readiness. One call in, one
//! response out; failures and timeouts surface as
//! `AgentError::GenerationFailed`, never as a partial or empty success.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use coderail_core::InferenceSettings;

/// Sampling overrides applied on top of the default profile
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    pub repeat_penalty: Option<f64>,
    pub max_tokens: Option<u32>,
}

/// The default sampling profile used when a field has no override
#[derive(Debug, Clone)]
pub struct SamplingProfile {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub repeat_penalty: f64,
    pub max_tokens: u32,
}

impl Default for SamplingProfile {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            top_p: 0.9,
            top_k: 40,
            repeat_penalty: 1.1,
            max_tokens: 2048,
        }
    }
}

impl SamplingProfile {
    /// Merge request-level overrides over this profile
    pub fn merged(&self, overrides: &GenerationOptions) -> SamplingProfile {
        SamplingProfile {
            temperature: overrides.temperature.unwrap_or(self.temperature),
            top_p: overrides.top_p.unwrap_or(self.top_p),
            top_k: overrides.top_k.unwrap_or(self.top_k),
            repeat_penalty: overrides.repeat_penalty.unwrap_or(self.repeat_penalty),
            max_tokens: overrides.max_tokens.unwrap_or(self.max_tokens),
        }
    }
}

/// Result of one generation call
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub text: String,
    pub tokens_used: u64,
    pub latency_ms: u64,
}

/// Text generation boundary, implemented by the inference client and by
/// scripted doubles in tests
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        overrides: Option<GenerationOptions>,
    ) -> Result<GenerationOutput>;
}

/// Embedding boundary: single text in, single vector out (no batching)
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Client for an Ollama-contract inference service
pub struct OllamaClient {
    client: reqwest::Client,
    settings: InferenceSettings,
    profile: SamplingProfile,
}

impl OllamaClient {
    pub fn new(settings: InferenceSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| AgentError::GenerationFailed(format!("http client: {e}")))?;
        Ok(Self {
            client,
            settings,
            profile: SamplingProfile::default(),
        })
    }

    pub fn with_profile(mut self, profile: SamplingProfile) -> Self {
        self.profile = profile;
        self
    }

    async fn post_json(&self, url: String, body: serde_json::Value) -> Result<serde_json::Value> {
        let mut retries = 0;
        loop {
            let response = self.client.post(&url).json(&body).send().await;
            match response {
                Ok(resp) if resp.status().is_success() => {
                    return resp
                        .json()
                        .await
                        .map_err(|e| AgentError::GenerationFailed(format!("bad response: {e}")));
                }
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    if status.is_server_error() && retries < self.settings.max_retries {
                        let backoff = Duration::from_millis(500 * (retries + 1) as u64);
                        tracing::warn!("Inference HTTP {}, retrying in {:?}", status, backoff);
                        tokio::time::sleep(backoff).await;
                        retries += 1;
                        continue;
                    }
                    return Err(AgentError::GenerationFailed(format!("HTTP {status}: {text}")));
                }
                Err(e) if e.is_timeout() => {
                    // A timed-out call is a failure, never a hang
                    if retries < self.settings.max_retries {
                        let backoff = Duration::from_millis(500 * (retries + 1) as u64);
                        tracing::warn!("Inference timeout, retrying in {:?}", backoff);
                        tokio::time::sleep(backoff).await;
                        retries += 1;
                        continue;
                    }
                    return Err(AgentError::GenerationFailed(format!(
                        "timeout after {} retries",
                        self.settings.max_retries
                    )));
                }
                Err(e) => return Err(AgentError::GenerationFailed(e.to_string())),
            }
        }
    }

    /// Whether the inference service is reachable
    pub async fn health(&self) -> bool {
        let url = format!("{}/api/tags", self.settings.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// List models available on the service
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.settings.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await?
            .json::<serde_json::Value>()
            .await?;
        let models = resp["models"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["name"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        Ok(models)
    }

    /// Ask the service to pull a model
    pub async fn pull_model(&self, name: &str) -> Result<()> {
        let url = format!("{}/api/pull", self.settings.base_url);
        let body = serde_json::json!({ "name": name, "stream": false });
        self.post_json(url, body).await?;
        Ok(())
    }
}

#[async_trait]
impl TextGenerator for OllamaClient {
    async fn generate(
        &self,
        prompt: &str,
        overrides: Option<GenerationOptions>,
    ) -> Result<GenerationOutput> {
        let start = Instant::now();
        let sampling = self.profile.merged(&overrides.unwrap_or_default());

        let url = format!("{}/api/generate", self.settings.base_url);
        let body = serde_json::json!({
            "model": self.settings.model,
            "prompt": prompt,
            "options": {
                "temperature": sampling.temperature,
                "top_p": sampling.top_p,
                "top_k": sampling.top_k,
                "repeat_penalty": sampling.repeat_penalty,
                "num_predict": sampling.max_tokens,
            },
            "stream": false,
        });

        let json = self.post_json(url, body).await?;
        let text = json["response"].as_str().unwrap_or_default().to_string();
        if text.is_empty() {
            return Err(AgentError::GenerationFailed(
                "inference service returned an empty response".to_string(),
            ));
        }
        let tokens_used = json["eval_count"].as_u64().unwrap_or(0);
        let latency_ms = start.elapsed().as_millis() as u64;

        tracing::debug!("Generated {} tokens in {}ms", tokens_used, latency_ms);
        Ok(GenerationOutput {
            text,
            tokens_used,
            latency_ms,
        })
    }
}

#[async_trait]
impl EmbeddingClient for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.settings.base_url);
        let body = serde_json::json!({
            "model": self.settings.embed_model,
            "prompt": text,
        });
        let json = self
            .post_json(url, body)
            .await
            .map_err(|e| AgentError::EmbeddingFailed(e.to_string()))?;
        let embedding = json["embedding"]
            .as_array()
            .ok_or_else(|| AgentError::EmbeddingFailed("missing embedding field".to_string()))?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect::<Vec<f32>>();
        if embedding.is_empty() {
            return Err(AgentError::EmbeddingFailed("empty embedding".to_string()));
        }
        Ok(embedding)
    }
}

/// Scripted generator used by tests and offline runs: pops pre-seeded
/// replies in order and records every prompt it receives.
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, text: impl Into<String>) {
        self.replies.lock().push_back(Ok(text.into()));
    }

    pub fn push_failure(&self, message: impl Into<String>) {
        self.replies.lock().push_back(Err(message.into()));
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        prompt: &str,
        _overrides: Option<GenerationOptions>,
    ) -> Result<GenerationOutput> {
        self.prompts.lock().push(prompt.to_string());
        let reply = self
            .replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err("no scripted reply".to_string()));
        match reply {
            Ok(text) => {
                let tokens_used = coderail_core::estimate_tokens(&text);
                Ok(GenerationOutput {
                    text,
                    tokens_used,
                    latency_ms: 0,
                })
            }
            Err(message) => Err(AgentError::GenerationFailed(message)),
        }
    }
}
