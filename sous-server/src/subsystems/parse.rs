//! `/parse-recipe`: extract and validate a recipe from assistant text.
//!
//! Every attempt that found a JSON candidate is written to the chat log under
//! the `recipe-parsing` session: the normalized recipe on success, the raw
//! candidate on failure.

use axum::http::{HeaderMap, StatusCode};
use serde::Deserialize;
use uuid::Uuid;

use sous_core::models::{NewChatMessage, Role};
use sous_core::store::PARSE_AUDIT_SESSION;
use sous_core::{extract_recipe_block, normalize_candidate, SousError};

use crate::auth::authorize;
use crate::http::{error_response, ok_json, HttpState};

#[derive(Debug, Deserialize, Default)]
pub struct ParseRecipeRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

pub async fn parse_recipe_inner(
    state: &HttpState,
    headers: &HeaderMap,
    req: ParseRecipeRequest,
) -> (StatusCode, serde_json::Value) {
    let user_id = match authorize(state.store.as_ref(), headers, req.user_id).await {
        Ok(u) => u,
        Err(e) => return error_response(&e),
    };

    let text = match req.text {
        Some(t) if !t.trim().is_empty() => t,
        _ => {
            return error_response(&SousError::InvalidInput("text is required".to_string()));
        }
    };

    let candidate = match extract_recipe_block(&text).candidate() {
        Some(c) => c.to_string(),
        None => {
            return error_response(&SousError::Parse(
                "no JSON recipe found in text".to_string(),
            ));
        }
    };

    match normalize_candidate(&candidate) {
        Ok(recipe) => {
            let value = match serde_json::to_value(&recipe) {
                Ok(v) => v,
                Err(e) => return error_response(&SousError::Other(e.to_string())),
            };
            audit(state, user_id, value.to_string(), Some(value.clone())).await;
            tracing::info!(user_id = %user_id, title = %recipe.title, "Recipe parsed");
            ok_json(StatusCode::OK, &value)
        }
        Err(e) => {
            audit(state, user_id, candidate, None).await;
            tracing::warn!(user_id = %user_id, error = %e, "Recipe rejected");
            let (status, mut body) = error_response(&e);
            body["details"] = serde_json::Value::String(e.to_string());
            (status, body)
        }
    }
}

/// Audit failures are logged and otherwise ignored.
async fn audit(
    state: &HttpState,
    user_id: Uuid,
    content: String,
    recipe_data: Option<serde_json::Value>,
) {
    let entry = NewChatMessage {
        user_id,
        session_id: PARSE_AUDIT_SESSION.to_string(),
        role: Role::System,
        content,
        recipe_data,
    };
    if let Err(e) = state.store.append_message(entry).await {
        tracing::warn!(user_id = %user_id, error = %e, "Failed to write parse audit entry");
    }
}
