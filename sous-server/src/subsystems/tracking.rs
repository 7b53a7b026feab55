//! Macro tracking: goals, daily intake and meal logs.

use axum::http::{HeaderMap, StatusCode};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use sous_core::models::{GoalsUpdate, NewMeal};
use sous_core::SousError;

use crate::auth::authorize;
use crate::http::{error_response, ok_json, HttpState};

const DEFAULT_MEAL_LIMIT: i64 = 50;
const MAX_MEAL_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct GoalsRequest {
    pub user_id: Option<Uuid>,
    #[serde(flatten)]
    pub update: GoalsUpdate,
}

pub async fn goals_inner(
    state: &HttpState,
    headers: &HeaderMap,
    user_id: Option<Uuid>,
) -> (StatusCode, serde_json::Value) {
    let user_id = match authorize(state.store.as_ref(), headers, user_id).await {
        Ok(u) => u,
        Err(e) => return error_response(&e),
    };

    match state.store.goals(user_id).await {
        Ok(goals) => ok_json(StatusCode::OK, &goals),
        Err(e) => error_response(&e),
    }
}

pub async fn update_goals_inner(
    state: &HttpState,
    headers: &HeaderMap,
    req: GoalsRequest,
) -> (StatusCode, serde_json::Value) {
    let user_id = match authorize(state.store.as_ref(), headers, req.user_id).await {
        Ok(u) => u,
        Err(e) => return error_response(&e),
    };

    let targets = [
        req.update.protein_target,
        req.update.carbs_target,
        req.update.fats_target,
        req.update.calories_target,
    ];
    if targets.iter().flatten().any(|v| !v.is_finite() || *v < 0.0) {
        return error_response(&SousError::InvalidInput(
            "targets must be non-negative numbers".to_string(),
        ));
    }

    match state.store.update_goals(user_id, req.update).await {
        Ok(goals) => ok_json(StatusCode::OK, &goals),
        Err(e) => error_response(&e),
    }
}

/// Intake for one day (today when no date is given) with goals and what is left.
pub async fn intake_inner(
    state: &HttpState,
    headers: &HeaderMap,
    user_id: Option<Uuid>,
    date: Option<NaiveDate>,
) -> (StatusCode, serde_json::Value) {
    let user_id = match authorize(state.store.as_ref(), headers, user_id).await {
        Ok(u) => u,
        Err(e) => return error_response(&e),
    };
    let date = date.unwrap_or_else(|| Utc::now().date_naive());

    let goals = match state.store.goals(user_id).await {
        Ok(g) => g,
        Err(e) => return error_response(&e),
    };
    let intake = match state.store.daily_intake(user_id, date).await {
        Ok(i) => i,
        Err(e) => return error_response(&e),
    };
    let gap = intake.gap(&goals);

    ok_json(
        StatusCode::OK,
        &serde_json::json!({
            "date": date,
            "intake": intake,
            "goals": goals,
            "remaining": gap,
        }),
    )
}

pub async fn log_meal_inner(
    state: &HttpState,
    headers: &HeaderMap,
    meal: NewMeal,
) -> (StatusCode, serde_json::Value) {
    if let Err(e) = authorize(state.store.as_ref(), headers, Some(meal.user_id)).await {
        return error_response(&e);
    }
    if let Err(msg) = meal.validate() {
        return error_response(&SousError::InvalidInput(msg));
    }

    match state.store.log_meal(meal).await {
        Ok((log, intake)) => ok_json(
            StatusCode::CREATED,
            &serde_json::json!({ "meal": log, "intake": intake }),
        ),
        Err(e) => error_response(&e),
    }
}

pub async fn list_meals_inner(
    state: &HttpState,
    headers: &HeaderMap,
    user_id: Option<Uuid>,
    limit: Option<i64>,
) -> (StatusCode, serde_json::Value) {
    let user_id = match authorize(state.store.as_ref(), headers, user_id).await {
        Ok(u) => u,
        Err(e) => return error_response(&e),
    };
    let limit = limit.unwrap_or(DEFAULT_MEAL_LIMIT).clamp(1, MAX_MEAL_LIMIT);

    match state.store.list_meals(user_id, limit).await {
        Ok(meals) => {
            let count = meals.len();
            match serde_json::to_value(&meals) {
                Ok(list) => (
                    StatusCode::OK,
                    serde_json::json!({ "meals": list, "count": count }),
                ),
                Err(e) => error_response(&SousError::Other(e.to_string())),
            }
        }
        Err(e) => error_response(&e),
    }
}
