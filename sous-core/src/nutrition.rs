//! Nutrition estimation.
//!
//! One request/response call per recipe: the ingredient list goes in, whole-recipe
//! calories and macros come out.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SousError;
use crate::llm::OpenAiClient;
use crate::models::{Ingredient, NutritionEstimate};

const NUTRITION_SYSTEM_PROMPT: &str = "You are a nutrition expert. Provide accurate nutritional estimates based on the ingredients list. Respond with a JSON object with the numeric fields calories, protein, carbs and fats.";

#[async_trait]
pub trait NutritionEstimator: Send + Sync {
    async fn estimate(&self, ingredients: &[Ingredient]) -> Result<NutritionEstimate, SousError>;
}

/// "2 cups rice, 1 tbsp oil" style list used in the prompt.
pub fn ingredient_list(ingredients: &[Ingredient]) -> String {
    ingredients
        .iter()
        .map(|i| format!("{} {}", i.amount, i.name).trim().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn nutrition_prompt(ingredients: &[Ingredient]) -> String {
    format!(
        "Estimate the nutritional information (calories, protein, carbs, fat) for a recipe with the following ingredients: {}. Please provide numerical values only for the entire recipe.",
        ingredient_list(ingredients)
    )
}

/// Read an estimate from loosely-shaped model output. Accepts `fat` for `fats`
/// and numeric strings such as `"32g"`.
pub fn estimate_from_value(value: &Value) -> Result<NutritionEstimate, SousError> {
    let field = |names: &[&str]| -> Result<f64, SousError> {
        names
            .iter()
            .find_map(|n| value.get(*n).and_then(number_like))
            .ok_or_else(|| {
                SousError::Network(format!("nutrition response is missing '{}'", names[0]))
            })
    };

    Ok(NutritionEstimate {
        calories: field(&["calories"])?,
        protein: field(&["protein"])?,
        carbs: field(&["carbs", "carbohydrates"])?,
        fats: field(&["fats", "fat"])?,
    })
}

fn number_like(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let numeric: String = s
                .trim()
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            numeric.parse().ok()
        }
        _ => None,
    }
}

#[async_trait]
impl NutritionEstimator for OpenAiClient {
    async fn estimate(&self, ingredients: &[Ingredient]) -> Result<NutritionEstimate, SousError> {
        if ingredients.is_empty() {
            return Err(SousError::InvalidInput(
                "Ingredients are required".to_string(),
            ));
        }

        let value = self
            .complete_json(NUTRITION_SYSTEM_PROMPT, &nutrition_prompt(ingredients))
            .await?;
        let estimate = estimate_from_value(&value)?;

        tracing::debug!(
            model = %self.nutrition_model(),
            ingredients = ingredients.len(),
            calories = estimate.calories,
            "Nutrition estimated"
        );
        Ok(estimate)
    }
}
