use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, ensure, Context};

use crate::analysis::image_prep::{
    EncodeOptions, DEFAULT_MAX_WIDTH, DEFAULT_QUALITY, THUMBNAIL_MAX_WIDTH, THUMBNAIL_QUALITY,
};
use crate::analysis::normalize::DEFAULT_FALLBACK;
use crate::analysis::prompts::FOOD_ANALYSIS_PROMPT;
use crate::analysis::vision::{GeminiConfig, SamplingConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::analysis::NutritionTotals;

/// Tokens are minted by the external auth provider; we only verify them.
#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub audience: String,
    pub issuer: Option<String>,
}

impl Debug for AuthConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("AuthConfig")
            .field("secret", &"[redacted]")
            .field("audience", &self.audience)
            .field("issuer", &self.issuer)
            .finish()
    }
}

#[derive(Clone)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

impl Debug for StorageConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("StorageConfig")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("access_key", &"[redacted]")
            .field("secret_key", &"[redacted]")
            .field("region", &self.region)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageConfig {
    pub analysis: EncodeOptions,
    pub thumbnail: EncodeOptions,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            analysis: EncodeOptions::default(),
            thumbnail: EncodeOptions::thumbnail(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub auth: AuthConfig,
    pub gemini: GeminiConfig,
    pub prompt: String,
    pub images: ImageConfig,
    pub fallback: NutritionTotals,
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source.
    pub fn from_lookup<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let auth = AuthConfig {
            secret: required(&get, "AUTH_JWT_SECRET")?,
            audience: get("AUTH_JWT_AUDIENCE").unwrap_or_else(|| "authenticated".into()),
            issuer: get("AUTH_JWT_ISSUER").filter(|s| !s.trim().is_empty()),
        };

        let defaults = SamplingConfig::default();
        let sampling = SamplingConfig {
            temperature: parsed(&get, "GEMINI_TEMPERATURE", defaults.temperature)?,
            top_k: parsed(&get, "GEMINI_TOP_K", defaults.top_k)?,
            top_p: parsed(&get, "GEMINI_TOP_P", defaults.top_p)?,
            max_output_tokens: parsed(&get, "GEMINI_MAX_OUTPUT_TOKENS", defaults.max_output_tokens)?,
        };
        let gemini = GeminiConfig {
            api_key: required(&get, "GEMINI_API_KEY")?,
            model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
            base_url: get("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into()),
            sampling,
            timeout: Duration::from_secs(parsed(&get, "GEMINI_TIMEOUT_SECS", 60u64)?),
        };

        let images = ImageConfig {
            analysis: EncodeOptions::new(
                parsed(&get, "IMAGE_MAX_WIDTH", DEFAULT_MAX_WIDTH)?,
                parsed(&get, "IMAGE_QUALITY", DEFAULT_QUALITY)?,
            ),
            thumbnail: EncodeOptions::new(
                parsed(&get, "THUMBNAIL_MAX_WIDTH", THUMBNAIL_MAX_WIDTH)?,
                parsed(&get, "THUMBNAIL_QUALITY", THUMBNAIL_QUALITY)?,
            ),
        };

        let fallback = NutritionTotals {
            calories: parsed(&get, "FALLBACK_CALORIES", DEFAULT_FALLBACK.calories)?,
            protein: parsed(&get, "FALLBACK_PROTEIN", DEFAULT_FALLBACK.protein)?,
            carbs: parsed(&get, "FALLBACK_CARBS", DEFAULT_FALLBACK.carbs)?,
            fat: parsed(&get, "FALLBACK_FAT", DEFAULT_FALLBACK.fat)?,
        };

        let storage = StorageConfig {
            endpoint: required(&get, "MINIO_ENDPOINT")?,
            bucket: required(&get, "MINIO_BUCKET")?,
            access_key: required(&get, "MINIO_ACCESS_KEY")?,
            secret_key: required(&get, "MINIO_SECRET_KEY")?,
            region: get("MINIO_REGION").unwrap_or_else(|| "us-east-1".into()),
        };

        let config = Self {
            host: get("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed(&get, "APP_PORT", 8080u16)?,
            database_url: required(&get, "DATABASE_URL")?,
            auth,
            gemini,
            prompt: get("ANALYSIS_PROMPT")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| FOOD_ANALYSIS_PROMPT.into()),
            images,
            fallback,
            storage,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }

    fn validate(&self) -> anyhow::Result<()> {
        for (name, options) in [
            ("IMAGE", self.images.analysis),
            ("THUMBNAIL", self.images.thumbnail),
        ] {
            ensure!(options.max_width > 0, "{name}_MAX_WIDTH must be positive");
            ensure!(
                (0.0..=1.0).contains(&options.quality),
                "{name}_QUALITY must be between 0 and 1"
            );
        }
        let f = self.fallback;
        ensure!(
            [f.calories, f.protein, f.carbs, f.fat]
                .iter()
                .all(|v| v.is_finite() && *v >= 0.0),
            "FALLBACK_* values must be non-negative numbers"
        );
        ensure!(
            !self.gemini.timeout.is_zero(),
            "GEMINI_TIMEOUT_SECS must be positive"
        );
        Ok(())
    }
}

fn required<F>(get: &F, key: &str) -> anyhow::Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    get(key)
        .filter(|v| !v.trim().is_empty())
        .with_context(|| format!("{key} must be set"))
}

fn parsed<F, T>(get: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{key}: invalid value {raw:?}: {e}")),
    }
}
