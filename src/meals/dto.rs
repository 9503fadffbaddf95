use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::meals::repo_types::{FoodItemRow, MealRow};

pub const DEFAULT_MEAL_TITLE: &str = "Lunch";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeBase64Request {
    #[serde(default)]
    pub image_base64: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMealRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub meal_time: Option<OffsetDateTime>,
    #[serde(default)]
    pub image_base64: Option<String>,
    /// Untrusted; coerced by the normalizer before it is stored.
    pub analysis: serde_json::Value,
}

impl CreateMealRequest {
    pub fn title_or_default(&self) -> String {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_MEAL_TITLE)
            .to_string()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MealSummary {
    pub id: Uuid,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_ref: Option<String>,
    pub total_calories: f64,
    pub total_protein: f64,
    pub total_carbs: f64,
    pub total_fat: f64,
    pub synthetic: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub meal_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<MealRow> for MealSummary {
    fn from(m: MealRow) -> Self {
        Self {
            id: m.id,
            title: m.title,
            image_ref: m.image_ref,
            thumbnail_ref: m.thumbnail_ref,
            total_calories: m.total_calories,
            total_protein: m.total_protein,
            total_carbs: m.total_carbs,
            total_fat: m.total_fat,
            synthetic: m.synthetic,
            meal_time: m.meal_time,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MealItem {
    pub id: Uuid,
    pub name: String,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portion: Option<String>,
    pub quantity: i32,
}

impl From<FoodItemRow> for MealItem {
    fn from(f: FoodItemRow) -> Self {
        Self {
            id: f.id,
            name: f.name,
            calories: f.calories,
            protein: f.protein_grams,
            carbs: f.carbs_grams,
            fat: f.fat_grams,
            portion: f.portion,
            quantity: f.quantity,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MealDetails {
    #[serde(flatten)]
    pub meal: MealSummary,
    pub food_items: Vec<MealItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

impl Pagination {
    /// Limit within 1..=100 and a non-negative offset.
    pub fn clamped(&self) -> (i64, i64) {
        (self.limit.clamp(1, 100), self.offset.max(0))
    }
}
