use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Placeholder used whenever the model omits a food name.
pub const UNKNOWN_FOOD_NAME: &str = "Unknown Food Item";

/// One recognised component of a meal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodItem {
    pub name: String,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portion: Option<String>,
}

/// Aggregate nutrition for the whole plate. Grams for macros, kcal for calories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NutritionTotals {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

impl NutritionTotals {
    pub fn zero() -> Self {
        Self::default()
    }
}

/// Canonical output of one analysis.
///
/// `food_items` keeps the order the model reported. `synthetic` is set when the
/// completion could not be parsed and the numbers are fallback values rather
/// than an estimate, so callers can warn the user before they log it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    #[serde(default)]
    pub food_items: Vec<FoodItem>,
    #[serde(default)]
    pub total_nutrition: NutritionTotals,
    #[serde(default)]
    pub synthetic: bool,
}

impl AnalysisResult {
    /// Single placeholder item carrying `nutrition`, flagged as synthetic.
    pub fn fallback(nutrition: NutritionTotals) -> Self {
        Self {
            food_items: vec![FoodItem {
                name: UNKNOWN_FOOD_NAME.to_string(),
                calories: nutrition.calories,
                protein: nutrition.protein,
                carbs: nutrition.carbs,
                fat: nutrition.fat,
                portion: None,
            }],
            total_nutrition: nutrition,
            synthetic: true,
        }
    }
}

/// A re-encoded image ready to be embedded in a request body.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Bytes,
    pub width: u32,
    pub height: u32,
    pub mime_type: &'static str,
}

impl EncodedImage {
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_serializes_camel_case() {
        let result = AnalysisResult {
            food_items: vec![FoodItem {
                name: "Apple".into(),
                calories: 95.0,
                protein: 0.5,
                carbs: 25.0,
                fat: 0.3,
                portion: Some("1 medium".into()),
            }],
            total_nutrition: NutritionTotals {
                calories: 95.0,
                protein: 0.5,
                carbs: 25.0,
                fat: 0.3,
            },
            synthetic: false,
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["foodItems"][0]["name"], "Apple");
        assert_eq!(json["foodItems"][0]["portion"], "1 medium");
        assert_eq!(json["totalNutrition"]["calories"], 95.0);
        assert_eq!(json["synthetic"], false);
    }

    #[test]
    fn portion_omitted_when_absent() {
        let item = FoodItem {
            name: "Rice".into(),
            calories: 112.0,
            protein: 2.6,
            carbs: 23.5,
            fat: 0.9,
            portion: None,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert!(json.get("portion").is_none());
    }

    #[test]
    fn fallback_has_single_placeholder() {
        let totals = NutritionTotals {
            calories: 200.0,
            protein: 10.0,
            carbs: 20.0,
            fat: 5.0,
        };
        let result = AnalysisResult::fallback(totals);
        assert!(result.synthetic);
        assert_eq!(result.food_items.len(), 1);
        assert_eq!(result.food_items[0].name, UNKNOWN_FOOD_NAME);
        assert_eq!(result.food_items[0].calories, 200.0);
        assert_eq!(result.total_nutrition, totals);
    }

    #[test]
    fn encoded_image_base64() {
        let img = EncodedImage {
            bytes: Bytes::from_static(b"abc"),
            width: 1,
            height: 1,
            mime_type: "image/jpeg",
        };
        assert_eq!(img.to_base64(), "YWJj");
        assert_eq!(img.len(), 3);
    }
}
