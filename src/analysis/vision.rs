//! Transport to the external vision model.
//!
//! The pipeline only needs "prompt + image in, text out", so the transport is
//! a trait. [`GeminiVision`] speaks the Generative Language REST API.

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, warn};

use super::types::EncodedImage;
use crate::error::AnalysisError;

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const API_KEY_HEADER: &str = "x-goog-api-key";
const MAX_LOGGED_BODY: usize = 1024;

/// Issues one request carrying `prompt` and `image`, returning the raw completion.
///
/// Implementations return [`AnalysisError::AnalysisUnavailable`] when the call
/// cannot be completed (network failure, non-success status). A completed call
/// whose text is empty or nonsense is still `Ok`.
#[async_trait]
pub trait VisionTransport: Send + Sync {
    async fn complete(&self, prompt: &str, image: &EncodedImage) -> Result<String, AnalysisError>;
}

/// Sampling options. Low temperature keeps estimates stable between runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingConfig {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            top_k: 32,
            top_p: 0.95,
            max_output_tokens: 4096,
        }
    }
}

#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub sampling: SamplingConfig,
    pub timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            sampling: SamplingConfig::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl Debug for GeminiConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"[redacted]")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("sampling", &self.sampling)
            .field("timeout", &self.timeout)
            .finish()
    }
}

// --- wire types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text {
        text: &'a str,
    },
    Image {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: u32,
}

impl From<SamplingConfig> for GenerationConfig {
    fn from(s: SamplingConfig) -> Self {
        Self {
            temperature: s.temperature,
            top_k: s.top_k,
            top_p: s.top_p,
            max_output_tokens: s.max_output_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Text parts of the first candidate, concatenated.
    fn into_text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default()
    }
}

// --- transport ---

pub struct GeminiVision {
    client: Client,
    config: GeminiConfig,
}

impl GeminiVision {
    pub fn new(config: GeminiConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("build vision http client")?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl VisionTransport for GeminiVision {
    #[instrument(skip_all, fields(model = %self.config.model, image_bytes = image.len()))]
    async fn complete(&self, prompt: &str, image: &EncodedImage) -> Result<String, AnalysisError> {
        let body = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![
                    RequestPart::Text { text: prompt },
                    RequestPart::Image {
                        inline_data: InlineData {
                            mime_type: image.mime_type,
                            data: image.to_base64(),
                        },
                    },
                ],
            }],
            generation_config: self.config.sampling.into(),
        };

        let response = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "vision request failed");
                AnalysisError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            let snippet: String = text.chars().take(MAX_LOGGED_BODY).collect();
            error!(%status, body = %snippet, "vision API returned an error");
            return Err(AnalysisError::AnalysisUnavailable(format!(
                "vision API returned status {}",
                status.as_u16()
            )));
        }

        let parsed: GenerateContentResponse = response.json().await.map_err(|e| {
            error!(error = %e, "vision API response is not a generateContent payload");
            AnalysisError::AnalysisUnavailable("malformed vision API response".to_string())
        })?;

        if let Some(reason) = parsed
            .candidates
            .first()
            .and_then(|c| c.finish_reason.as_deref())
        {
            debug!(finish_reason = reason, "vision completion finished");
        }

        let text = parsed.into_text();
        if text.trim().is_empty() {
            warn!("vision API returned no text");
        }
        Ok(text)
    }
}
