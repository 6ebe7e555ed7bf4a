
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::config::EmbeddingConfig;
use crate::{DocQaError, Result};

/// Capability interface over the external embedding service.
///
/// The pipelines only depend on this trait, so tests run against
/// deterministic fakes instead of a live model server. Implementations must
/// be deterministic per model version: identical text always maps to an
/// identical vector.
pub trait EmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Client for an Ollama-compatible embedding endpoint.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingClient {
    base_url: Url,
    model: String,
    batch_size: usize,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    model: String,
    #[serde(rename = "input")]
    inputs: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl HttpEmbeddingClient {
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base_url = config.service_url()?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.model.clone(),
            batch_size: config.batch_size as usize,
            agent,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    /// Check that the embedding server is reachable.
    #[inline]
    pub fn ping(&self) -> Result<()> {
        let url = self
            .base_url
            .join("/api/tags")
            .map_err(|e| DocQaError::Embedding(format!("failed to build ping URL: {e}")))?;

        debug!("pinging embedding server at {url}");

        self.agent
            .get(url.as_str())
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| map_transport_error("ping", e))?;

        Ok(())
    }

    fn post_json(&self, url: &Url, body: &str) -> Result<String> {
        self.agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(body)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| map_transport_error("embedding request", e))
    }

    fn embed_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.len() == 1 {
            return Ok(vec![self.embed(&texts[0])?]);
        }

        let url = self
            .base_url
            .join("/api/embed")
            .map_err(|e| DocQaError::Embedding(format!("failed to build embedding URL: {e}")))?;
        let request = serde_json::to_string(&BatchEmbedRequest {
            model: self.model.clone(),
            inputs: texts.to_vec(),
        })
        .map_err(|e| {
            DocQaError::Embedding(format!("failed to serialize batch embedding request: {e}"))
        })?;

        let response_text = self.post_json(&url, &request)?;
        let response: BatchEmbedResponse = serde_json::from_str(&response_text).map_err(|e| {
            DocQaError::Embedding(format!("failed to parse batch embedding response: {e}"))
        })?;

        if response.embeddings.len() != texts.len() {
            return Err(DocQaError::Embedding(format!(
                "embedding count mismatch: sent {} texts, received {} embeddings",
                texts.len(),
                response.embeddings.len()
            )));
        }

        Ok(response.embeddings)
    }
}

impl EmbeddingProvider for HttpEmbeddingClient {
    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!("generating embedding for text of length {}", text.len());

        let url = self
            .base_url
            .join("/api/embed")
            .map_err(|e| DocQaError::Embedding(format!("failed to build embedding URL: {e}")))?;
        let request = serde_json::to_string(&EmbedRequest {
            model: self.model.clone(),
            prompt: text.to_string(),
        })
        .map_err(|e| {
            DocQaError::Embedding(format!("failed to serialize embedding request: {e}"))
        })?;

        let response_text = self.post_json(&url, &request)?;
        let response: EmbedResponse = serde_json::from_str(&response_text).map_err(|e| {
            DocQaError::Embedding(format!("failed to parse embedding response: {e}"))
        })?;

        Ok(response.embedding)
    }

    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size.max(1)) {
            results.extend(self.embed_single_batch(batch)?);
        }

        Ok(results)
    }
}

fn map_transport_error(operation: &str, error: ureq::Error) -> DocQaError {
    match error {
        ureq::Error::StatusCode(status) => {
            DocQaError::Embedding(format!("{operation} failed: embedding service returned HTTP {status}"))
        }
        other => DocQaError::Embedding(format!("{operation} failed: {other}")),
    }
}
