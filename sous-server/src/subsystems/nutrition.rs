//! `/nutrition`: whole-recipe macro estimate for an ingredient list.

use axum::http::StatusCode;
use serde::Deserialize;

use sous_core::models::Ingredient;

use crate::http::{ok_json, HttpState};

#[derive(Debug, Deserialize, Default)]
pub struct NutritionRequest {
    #[serde(default)]
    pub ingredients: Option<Vec<Ingredient>>,
}

pub async fn nutrition_inner(
    state: &HttpState,
    req: NutritionRequest,
) -> (StatusCode, serde_json::Value) {
    let ingredients = match req.ingredients {
        Some(list) if !list.is_empty() => list,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": "Ingredients are required" }),
            );
        }
    };

    match state.estimator.estimate(&ingredients).await {
        Ok(estimate) => ok_json(StatusCode::OK, &estimate),
        Err(e) => {
            tracing::error!(error = %e, ingredients = ingredients.len(), "Nutrition estimate failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({
                    "error": "Failed to get nutritional information",
                    "details": e.to_string(),
                }),
            )
        }
    }
}
