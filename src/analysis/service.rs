//! Orchestrates one analysis: encode, request, extract, normalize.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info, instrument};

use super::extract::extract_payload;
use super::image_prep::{EncodeOptions, ImagePreprocessor};
use super::normalize::Normalizer;
use super::prompts::FOOD_ANALYSIS_PROMPT;
use super::types::AnalysisResult;
use super::vision::VisionTransport;
use crate::error::AnalysisError;

/// Lifecycle of a single analysis. `Done` is reached on both the parsed and
/// the fallback path; only image and transport failures leave early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Encoding,
    Requesting,
    Extracting,
    Normalizing,
    Done,
}

impl Stage {
    /// Rough completion hint for progress bars.
    pub fn percent(self) -> u8 {
        match self {
            Stage::Idle => 0,
            Stage::Encoding => 5,
            Stage::Requesting => 20,
            Stage::Extracting => 90,
            Stage::Normalizing => 95,
            Stage::Done => 100,
        }
    }
}

/// Receives stage transitions as they happen.
pub trait ProgressSink: Send + Sync {
    fn stage_changed(&self, stage: Stage);
}

impl<F> ProgressSink for F
where
    F: Fn(Stage) + Send + Sync,
{
    fn stage_changed(&self, stage: Stage) {
        self(stage)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn stage_changed(&self, _stage: Stage) {}
}

/// Emits transitions as debug events on the current span.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn stage_changed(&self, stage: Stage) {
        debug!(?stage, percent = stage.percent(), "analysis stage");
    }
}

#[derive(Clone)]
pub struct AnalysisService {
    preprocessor: Arc<dyn ImagePreprocessor>,
    transport: Arc<dyn VisionTransport>,
    normalizer: Normalizer,
    encode_options: EncodeOptions,
    prompt: String,
}

impl AnalysisService {
    pub fn new(
        preprocessor: Arc<dyn ImagePreprocessor>,
        transport: Arc<dyn VisionTransport>,
    ) -> Self {
        Self {
            preprocessor,
            transport,
            normalizer: Normalizer::default(),
            encode_options: EncodeOptions::default(),
            prompt: FOOD_ANALYSIS_PROMPT.to_string(),
        }
    }

    #[must_use]
    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    #[must_use]
    pub fn with_encode_options(mut self, options: EncodeOptions) -> Self {
        self.encode_options = options;
        self
    }

    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Configured instruction prompt.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Shared handle to the preprocessor, for callers that store photos.
    pub fn preprocessor(&self) -> Arc<dyn ImagePreprocessor> {
        Arc::clone(&self.preprocessor)
    }

    pub async fn analyze(&self, image: Bytes, prompt: &str) -> Result<AnalysisResult, AnalysisError> {
        self.analyze_with_progress(image, prompt, &NoProgress).await
    }

    /// Runs the full pipeline with exactly one request to the vision model.
    ///
    /// # Errors
    ///
    /// `ImageDecode`/`Encode` when the image cannot be prepared, and
    /// `AnalysisUnavailable` when the vision call cannot be completed. An
    /// unusable completion is not an error: the result comes back with
    /// `synthetic` set.
    #[instrument(skip_all, fields(image_bytes = image.len()))]
    pub async fn analyze_with_progress(
        &self,
        image: Bytes,
        prompt: &str,
        progress: &dyn ProgressSink,
    ) -> Result<AnalysisResult, AnalysisError> {
        progress.stage_changed(Stage::Encoding);
        let preprocessor = Arc::clone(&self.preprocessor);
        let options = self.encode_options;
        let encoded = tokio::task::spawn_blocking(move || preprocessor.encode(&image, options))
            .await
            .map_err(|e| AnalysisError::Encode(format!("encoder task failed: {e}")))??;

        progress.stage_changed(Stage::Requesting);
        let raw = self.transport.complete(prompt, &encoded).await?;

        progress.stage_changed(Stage::Extracting);
        let candidate = extract_payload(&raw);

        progress.stage_changed(Stage::Normalizing);
        let result = self.normalizer.normalize_completion(candidate);

        progress.stage_changed(Stage::Done);
        info!(
            items = result.food_items.len(),
            calories = result.total_nutrition.calories,
            synthetic = result.synthetic,
            "food analysis finished"
        );
        Ok(result)
    }
}
