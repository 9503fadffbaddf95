//! Meal photo nutrition analysis service.

pub mod analysis;
pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod images;
pub mod meals;
pub mod state;
pub mod storage;

pub use analysis::{AnalysisResult, AnalysisService, FoodItem, NutritionTotals};
pub use error::AnalysisError;
