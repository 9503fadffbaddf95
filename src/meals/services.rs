use bytes::Bytes;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::dto::CreateMealRequest;
use super::repo_types::{MealRow, NewMeal};
use crate::analysis::{AnalysisResult, Normalizer, TracingProgress};
use crate::error::AnalysisError;
use crate::images::services::{decode_base64_image, delete_photos, prepare_photo, upload_photo};
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum SaveMealError {
    #[error("analysis must be a JSON object")]
    InvalidAnalysis,

    #[error("imageBase64 is not valid base64")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error(transparent)]
    Image(#[from] AnalysisError),

    #[error("could not save meal: {0:#}")]
    Persist(anyhow::Error),
}

/// Analyses one photo and appends the result to the user's analysis log.
/// A failed log write is reported but does not fail the analysis.
pub async fn analyze_and_record(
    st: &AppState,
    user_id: Uuid,
    image: Bytes,
) -> Result<AnalysisResult, AnalysisError> {
    let result = st
        .analyzer
        .analyze_with_progress(image, st.analyzer.prompt(), &TracingProgress)
        .await?;

    if let Err(e) = st.store.record_analysis(user_id, &result).await {
        warn!(error = %e, %user_id, "failed to record analysis result");
    }
    Ok(result)
}

/// Stores the optional photo, then the meal and its items.
pub async fn save_meal(
    st: &AppState,
    user_id: Uuid,
    req: CreateMealRequest,
) -> Result<MealRow, SaveMealError> {
    let analysis = Normalizer::new(st.config.fallback)
        .from_value(&req.analysis)
        .ok_or(SaveMealError::InvalidAnalysis)?;
    let mut meal = NewMeal::from_analysis(req.title_or_default(), &analysis);
    meal.meal_time = req.meal_time;

    if let Some(raw) = req.image_base64.as_deref().filter(|s| !s.trim().is_empty()) {
        let bytes = decode_base64_image(raw)?;
        let photo = prepare_photo(st.analyzer.preprocessor(), st.config.images, bytes).await?;
        let stored = upload_photo(st.storage.as_ref(), user_id, photo)
            .await
            .map_err(SaveMealError::Persist)?;
        meal.image_ref = Some(stored.image_ref);
        meal.thumbnail_ref = Some(stored.thumbnail_ref);
    }

    match st.store.create_meal(user_id, &meal).await {
        Ok(row) => {
            info!(meal_id = %row.id, %user_id, items = meal.items.len(), "meal saved");
            Ok(row)
        }
        Err(e) => {
            let keys: Vec<&str> = [&meal.image_ref, &meal.thumbnail_ref]
                .into_iter()
                .flatten()
                .map(String::as_str)
                .collect();
            delete_photos(st.storage.as_ref(), &keys).await;
            Err(SaveMealError::Persist(e))
        }
    }
}

/// Deletes the meal and, best effort, its stored photos.
/// Returns `false` when the user has no such meal.
pub async fn remove_meal(st: &AppState, user_id: Uuid, meal_id: Uuid) -> anyhow::Result<bool> {
    let Some(row) = st.store.delete_meal(user_id, meal_id).await? else {
        return Ok(false);
    };
    let keys: Vec<&str> = [&row.image_ref, &row.thumbnail_ref]
        .into_iter()
        .flatten()
        .map(String::as_str)
        .collect();
    delete_photos(st.storage.as_ref(), &keys).await;
    info!(%meal_id, %user_id, "meal deleted");
    Ok(true)
}
