#[cfg(test)]
mod tests;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::config::GenerationConfig;
use crate::{DocQaError, Result};

/// Capability interface over the external generative completion service.
pub trait GenerationProvider {
    fn generate(&self, contents: &[PromptContent]) -> Result<String>;
}

/// One turn of prompt content in the wire shape the completion service
/// expects: a role plus a list of text parts.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PromptContent {
    pub role: String,
    pub parts: Vec<PromptPart>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PromptPart {
    pub text: String,
}

impl PromptContent {
    #[inline]
    pub fn new(role: &str, text: String) -> Self {
        Self {
            role: role.to_string(),
            parts: vec![PromptPart { text }],
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: &'a [PromptContent],
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Client for a Gemini-style `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    base_url: Url,
    model: String,
    api_key: String,
    agent: ureq::Agent,
}

impl GeminiClient {
    #[inline]
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            DocQaError::Config(format!(
                "invalid generation base URL '{}': {e}",
                config.base_url
            ))
        })?;
        let api_key = config.resolve_api_key()?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.model.clone(),
            api_key,
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

    fn generate_url(&self) -> Result<Url> {
        let path = format!("/v1beta/models/{}:generateContent", self.model);
        let mut url = self.base_url.join(&path).map_err(|e| {
            DocQaError::Generation(format!("failed to build generation URL: {e}"))
        })?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }
}

impl GenerationProvider for GeminiClient {
    #[inline]
    fn generate(&self, contents: &[PromptContent]) -> Result<String> {
        let url = self.generate_url()?;
        let body = serde_json::to_string(&GenerateRequest { contents }).map_err(|e| {
            DocQaError::Generation(format!("failed to serialize generation request: {e}"))
        })?;

        debug!(
            "requesting completion from model {} ({} content turns)",
            self.model,
            contents.len()
        );

        let response_text = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(&body)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| match e {
                ureq::Error::StatusCode(status) => DocQaError::Generation(format!(
                    "generation service returned HTTP {status}"
                )),
                other => DocQaError::Generation(format!("generation request failed: {other}")),
            })?;

        let response: GenerateResponse = serde_json::from_str(&response_text).map_err(|e| {
            DocQaError::Generation(format!("failed to parse generation response: {e}"))
        })?;

        let answer = response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .and_then(|content| content.parts.into_iter().next())
            .and_then(|part| part.text)
            .ok_or_else(|| {
                DocQaError::Generation(
                    "generation response contained no candidate text".to_string(),
                )
            })?;

        if answer.trim().is_empty() {
            return Err(DocQaError::Generation(
                "generation response contained an empty answer".to_string(),
            ));
        }

        debug!("received answer of length {}", answer.len());
        Ok(answer)
    }
}
