//! Meal photo analysis: image preparation, the vision call and tolerant
//! parsing of its free-form answer.
//!
//! Nothing here knows about HTTP routing, the database or authentication.
//! The vision transport and image preprocessor are traits so any caller can
//! supply its own.

pub mod extract;
pub mod image_prep;
pub mod normalize;
pub mod prompts;
pub mod service;
pub mod types;
pub mod vision;

pub use extract::extract_payload;
pub use image_prep::{EncodeOptions, ImagePreprocessor, JpegPreprocessor};
pub use normalize::{normalize, Normalizer, DEFAULT_FALLBACK};
pub use service::{AnalysisService, NoProgress, ProgressSink, Stage, TracingProgress};
pub use types::{AnalysisResult, EncodedImage, FoodItem, NutritionTotals};
pub use vision::{GeminiConfig, GeminiVision, SamplingConfig, VisionTransport};
