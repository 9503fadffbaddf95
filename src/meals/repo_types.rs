use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::analysis::{AnalysisResult, FoodItem};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MealRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub image_ref: Option<String>,
    pub thumbnail_ref: Option<String>,
    pub total_calories: f64,
    pub total_protein: f64,
    pub total_carbs: f64,
    pub total_fat: f64,
    pub synthetic: bool,
    pub meal_time: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct FoodItemRow {
    pub id: Uuid,
    pub name: String,
    pub calories: f64,
    pub protein_grams: f64,
    pub carbs_grams: f64,
    pub fat_grams: f64,
    pub portion: Option<String>,
    pub quantity: i32,
}

/// What gets written when a user saves an analysed meal.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMeal {
    pub title: String,
    pub image_ref: Option<String>,
    pub thumbnail_ref: Option<String>,
    pub meal_time: Option<OffsetDateTime>,
    pub total_calories: f64,
    pub total_protein: f64,
    pub total_carbs: f64,
    pub total_fat: f64,
    pub synthetic: bool,
    pub items: Vec<FoodItem>,
}

impl NewMeal {
    pub fn from_analysis(title: impl Into<String>, analysis: &AnalysisResult) -> Self {
        let totals = analysis.total_nutrition;
        Self {
            title: title.into(),
            image_ref: None,
            thumbnail_ref: None,
            meal_time: None,
            total_calories: totals.calories,
            total_protein: totals.protein,
            total_carbs: totals.carbs,
            total_fat: totals.fat,
            synthetic: analysis.synthetic,
            items: analysis.food_items.clone(),
        }
    }
}
