use std::sync::Arc;

use crate::analysis::{AnalysisService, GeminiVision, JpegPreprocessor, Normalizer};
use crate::config::AppConfig;
use crate::db;
use crate::meals::repo::{MealStore, PgMealStore};
use crate::storage::{S3Storage, StorageClient};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn MealStore>,
    pub storage: Arc<dyn StorageClient>,
    pub analyzer: Arc<AnalysisService>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let pool = db::connect(&config.database_url).await?;
        db::migrate(&pool).await?;
        let store = Arc::new(PgMealStore::new(pool)) as Arc<dyn MealStore>;

        let storage = Arc::new(S3Storage::new(&config.storage).await?) as Arc<dyn StorageClient>;

        let vision = GeminiVision::new(config.gemini.clone())?;
        let analyzer = AnalysisService::new(Arc::new(JpegPreprocessor), Arc::new(vision))
            .with_normalizer(Normalizer::new(config.fallback))
            .with_encode_options(config.images.analysis)
            .with_prompt(config.prompt.clone());

        Ok(Self::from_parts(config, store, storage, Arc::new(analyzer)))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        store: Arc<dyn MealStore>,
        storage: Arc<dyn StorageClient>,
        analyzer: Arc<AnalysisService>,
    ) -> Self {
        Self {
            config,
            store,
            storage,
            analyzer,
        }
    }
}
