//! Recipe CRUD.
//!
//! Recipes without an owner are public: anyone may read them, nobody may change
//! them. Owned recipes are visible and writable only by their owner.

use axum::http::{HeaderMap, StatusCode};
use uuid::Uuid;

use sous_core::emoji::resolve_emoji;
use sous_core::models::{NewRecipe, PersistedRecipe, RecipeUpdate};
use sous_core::SousError;

use crate::auth::{authorize, require_user};
use crate::http::{error_response, ok_json, HttpState};

pub async fn list_inner(
    state: &HttpState,
    headers: &HeaderMap,
    user_id: Option<Uuid>,
) -> (StatusCode, serde_json::Value) {
    let owner = match user_id {
        Some(claimed) => match authorize(state.store.as_ref(), headers, Some(claimed)).await {
            Ok(u) => Some(u),
            Err(e) => return error_response(&e),
        },
        None => None,
    };

    match state.store.list_recipes(owner).await {
        Ok(recipes) => {
            let count = recipes.len();
            match serde_json::to_value(&recipes) {
                Ok(list) => (
                    StatusCode::OK,
                    serde_json::json!({ "recipes": list, "count": count }),
                ),
                Err(e) => error_response(&SousError::Other(e.to_string())),
            }
        }
        Err(e) => error_response(&e),
    }
}

pub async fn create_inner(
    state: &HttpState,
    headers: &HeaderMap,
    mut recipe: NewRecipe,
) -> (StatusCode, serde_json::Value) {
    let user_id = match authorize(state.store.as_ref(), headers, recipe.user_id).await {
        Ok(u) => u,
        Err(e) => return error_response(&e),
    };

    let empty = recipe.empty_required_fields();
    if !empty.is_empty() {
        return error_response(&SousError::MissingFields { fields: empty });
    }

    recipe.notes.emoji = Some(resolve_emoji(recipe.notes.emoji.as_deref(), &recipe.title));

    match state.store.insert_recipe(recipe).await {
        Ok(saved) => {
            tracing::info!(user_id = %user_id, recipe_id = %saved.id, "Recipe created");
            ok_json(StatusCode::CREATED, &saved)
        }
        Err(e) => error_response(&SousError::Persistence(e.to_string())),
    }
}

pub async fn get_inner(
    state: &HttpState,
    headers: &HeaderMap,
    id: Uuid,
) -> (StatusCode, serde_json::Value) {
    let recipe = match find(state, id).await {
        Ok(r) => r,
        Err(e) => return error_response(&e),
    };

    if recipe.is_public() {
        return ok_json(StatusCode::OK, &recipe);
    }

    match authorize(state.store.as_ref(), headers, recipe.user_id).await {
        Ok(_) => ok_json(StatusCode::OK, &recipe),
        // Do not reveal that someone else's recipe exists.
        Err(SousError::Auth(_)) if headers_have_session(headers) => {
            error_response(&SousError::NotFound(format!("recipe {id}")))
        }
        Err(e) => error_response(&e),
    }
}

pub async fn update_inner(
    state: &HttpState,
    headers: &HeaderMap,
    id: Uuid,
    update: RecipeUpdate,
) -> (StatusCode, serde_json::Value) {
    if let Err(e) = writable(state, headers, id).await {
        return error_response(&e);
    }

    let empty = update.empty_required_fields();
    if !empty.is_empty() {
        return error_response(&SousError::MissingFields { fields: empty });
    }

    match state.store.update_recipe(id, update).await {
        Ok(Some(updated)) => ok_json(StatusCode::OK, &updated),
        Ok(None) => error_response(&SousError::NotFound(format!("recipe {id}"))),
        Err(e) => error_response(&e),
    }
}

pub async fn delete_inner(
    state: &HttpState,
    headers: &HeaderMap,
    id: Uuid,
) -> (StatusCode, serde_json::Value) {
    if let Err(e) = writable(state, headers, id).await {
        return error_response(&e);
    }

    match state.store.delete_recipe(id).await {
        Ok(deleted) => {
            tracing::info!(recipe_id = %id, deleted, "Recipe delete");
            (
                StatusCode::OK,
                serde_json::json!({ "id": id, "deleted": deleted }),
            )
        }
        Err(e) => error_response(&e),
    }
}

async fn find(state: &HttpState, id: Uuid) -> Result<PersistedRecipe, SousError> {
    state
        .store
        .get_recipe(id)
        .await?
        .ok_or_else(|| SousError::NotFound(format!("recipe {id}")))
}

/// Caller must be signed in and own the recipe. The session is checked before
/// the recipe is looked up.
async fn writable(state: &HttpState, headers: &HeaderMap, id: Uuid) -> Result<(), SousError> {
    let caller = require_user(state.store.as_ref(), headers).await?;
    let recipe = find(state, id).await?;
    match recipe.user_id {
        Some(owner) if owner == caller => Ok(()),
        Some(_) => Err(SousError::Forbidden(format!("recipe {id} belongs to another user"))),
        None => Err(SousError::Forbidden(format!("recipe {id} is public"))),
    }
}

fn headers_have_session(headers: &HeaderMap) -> bool {
    crate::auth::session_token(headers).is_some()
}
