use thiserror::Error;

/// Failures that end an analysis request.
///
/// An unparseable model completion is deliberately absent here: the
/// normalizer absorbs it and returns a synthetic result instead.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("could not decode image: {0}")]
    ImageDecode(String),

    #[error("could not encode image: {0}")]
    Encode(String),

    #[error("analysis unavailable: {0}")]
    AnalysisUnavailable(String),
}

impl AnalysisError {
    /// Message safe to show an end user; details stay in the logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            AnalysisError::ImageDecode(_) => "Could not read the image. Please try another photo.",
            AnalysisError::Encode(_) => "Could not prepare the image. Please try again.",
            AnalysisError::AnalysisUnavailable(_) => {
                "Food analysis is unavailable right now. Please try again."
            }
        }
    }
}

impl From<image::ImageError> for AnalysisError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Encoding(_) => AnalysisError::Encode(err.to_string()),
            other => AnalysisError::ImageDecode(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for AnalysisError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AnalysisError::AnalysisUnavailable("vision request timed out".to_string())
        } else {
            AnalysisError::AnalysisUnavailable(err.to_string())
        }
    }
}
