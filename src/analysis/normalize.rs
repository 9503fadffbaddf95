//! Coerces an extracted payload into an [`AnalysisResult`].
//!
//! This never fails. Anything that does not parse as a JSON object becomes
//! the synthetic fallback result so the caller always has something to show.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::types::{AnalysisResult, FoodItem, NutritionTotals, UNKNOWN_FOOD_NAME};

/// Values reported when the completion is unusable.
pub const DEFAULT_FALLBACK: NutritionTotals = NutritionTotals {
    calories: 200.0,
    protein: 10.0,
    carbs: 20.0,
    fat: 5.0,
};

const LOGGED_RAW_CHARS: usize = 512;

lazy_static! {
    static ref FENCE_MARKER: Regex = Regex::new(r"(?i)```json|```").unwrap();
}

#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    fallback: NutritionTotals,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_FALLBACK)
    }
}

impl Normalizer {
    pub fn new(fallback: NutritionTotals) -> Self {
        Self { fallback }
    }

    pub fn fallback(&self) -> AnalysisResult {
        AnalysisResult::fallback(self.fallback)
    }

    /// Coerces a serialized result. A `synthetic` key in the payload is kept,
    /// so `normalize(serialize(result)) == result` for well-formed results.
    pub fn normalize(&self, candidate: &str) -> AnalysisResult {
        self.normalize_with(candidate, SyntheticKey::Honor)
    }

    /// Coerces a model completion. The model cannot mark its own estimate as
    /// fallback data, so a `synthetic` key in the payload is ignored.
    pub fn normalize_completion(&self, candidate: &str) -> AnalysisResult {
        self.normalize_with(candidate, SyntheticKey::Ignore)
    }

    /// Coerces an already-parsed payload, e.g. one submitted by a client.
    /// Returns `None` when the payload is not a JSON object.
    pub fn from_value(&self, payload: &Value) -> Option<AnalysisResult> {
        match payload {
            Value::Object(fields) => Some(from_payload(fields, SyntheticKey::Honor)),
            _ => None,
        }
    }

    fn normalize_with(&self, candidate: &str, synthetic: SyntheticKey) -> AnalysisResult {
        let cleaned = FENCE_MARKER.replace_all(candidate, "");
        let cleaned = cleaned.trim();

        match serde_json::from_str::<Value>(cleaned) {
            Ok(Value::Object(payload)) => from_payload(&payload, synthetic),
            Ok(other) => {
                warn!(
                    kind = json_kind(&other),
                    raw = %truncated(candidate),
                    "completion payload is not an object, using fallback"
                );
                self.fallback()
            }
            Err(e) => {
                warn!(
                    error = %e,
                    raw = %truncated(candidate),
                    "could not parse completion payload, using fallback"
                );
                self.fallback()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyntheticKey {
    Honor,
    Ignore,
}

/// [`Normalizer::normalize`] with the default fallback values.
pub fn normalize(candidate: &str) -> AnalysisResult {
    Normalizer::default().normalize(candidate)
}

fn from_payload(payload: &Map<String, Value>, synthetic: SyntheticKey) -> AnalysisResult {
    let food_items = match payload.get("foodItems") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(fields) => Some(food_item(fields)),
                other => {
                    debug!(kind = json_kind(other), "skipping non-object food item");
                    None
                }
            })
            .collect(),
        _ => Vec::new(),
    };

    let total_nutrition = match payload.get("totalNutrition") {
        Some(Value::Object(fields)) => totals(fields),
        _ => NutritionTotals::zero(),
    };

    AnalysisResult {
        food_items,
        total_nutrition,
        synthetic: synthetic == SyntheticKey::Honor
            && payload
                .get("synthetic")
                .and_then(Value::as_bool)
                .unwrap_or(false),
    }
}

fn food_item(fields: &Map<String, Value>) -> FoodItem {
    let name = fields
        .get("name")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(UNKNOWN_FOOD_NAME)
        .to_string();
    let portion = fields
        .get("portion")
        .and_then(Value::as_str)
        .map(str::to_string);

    FoodItem {
        name,
        calories: amount(fields, "calories"),
        protein: amount(fields, "protein"),
        carbs: amount(fields, "carbs"),
        fat: amount(fields, "fat"),
        portion,
    }
}

fn totals(fields: &Map<String, Value>) -> NutritionTotals {
    NutritionTotals {
        calories: amount(fields, "calories"),
        protein: amount(fields, "protein"),
        carbs: amount(fields, "carbs"),
        fat: amount(fields, "fat"),
    }
}

/// Non-negative number, or 0 when absent, non-numeric or negative.
fn amount(fields: &Map<String, Value>, key: &str) -> f64 {
    fields
        .get(key)
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite() && *v >= 0.0)
        .unwrap_or(0.0)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn truncated(text: &str) -> String {
    text.chars().take(LOGGED_RAW_CHARS).collect()
}
