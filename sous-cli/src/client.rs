//! HTTP client for the SousChef server.
//!
//! `ServerClient` implements the same traits the server wires to OpenAI and
//! Postgres, so `ChefSession` and `Submitter` run unchanged in the terminal:
//! chat streams come from `POST /chef`, parsing from `POST /parse-recipe`,
//! nutrition from `POST /nutrition` and recipe storage from `/recipes`.
//!
//! Every request carries the session cookie when a token is configured.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::StreamExt;
use reqwest::header::COOKIE;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use uuid::Uuid;

use sous_core::models::{
    CandidateRecipe, DailyIntake, GoalsUpdate, Ingredient, MacroGap, MealLog, NewMeal, NewRecipe,
    NutritionEstimate, NutritionGoals, PersistedRecipe, RecipeUpdate, Role,
};
use sous_core::stream::TextStream;
use sous_core::{ChatBackend, ChefRequest, NutritionEstimator, RecipeParser, RecipeStore, SousError};

/// Cookie the server reads the session token from.
pub const SESSION_COOKIE: &str = "sous_session";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
// Covers the whole streamed body, so it has to outlast a long reply.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// ============================================================================
// Response shapes
// ============================================================================

#[derive(Debug, Deserialize)]
struct RecipeList {
    recipes: Vec<PersistedRecipe>,
}

#[derive(Debug, Deserialize)]
struct MealList {
    meals: Vec<MealLog>,
}

#[derive(Debug, Deserialize)]
struct Deleted {
    deleted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntakeReport {
    pub date: NaiveDate,
    pub intake: DailyIntake,
    pub goals: NutritionGoals,
    pub remaining: MacroGap,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MealLogged {
    pub meal: MealLog,
    pub intake: DailyIntake,
}

// ============================================================================
// Client
// ============================================================================

#[derive(Clone)]
pub struct ServerClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ServerClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, SousError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SousError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.header(COOKIE, format!("{SESSION_COOKIE}={token}")),
            None => builder,
        }
    }

    async fn send(builder: RequestBuilder) -> Result<Response, SousError> {
        let resp = builder
            .send()
            .await
            .map_err(|e| SousError::Network(format!("server unreachable: {e}")))?;
        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(status_error(resp).await)
        }
    }

    async fn send_json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, SousError> {
        Self::send(builder)
            .await?
            .json::<T>()
            .await
            .map_err(|e| SousError::Network(format!("unexpected server response: {e}")))
    }

    pub async fn health(&self) -> Result<serde_json::Value, SousError> {
        Self::send_json(self.request(Method::GET, "/health")).await
    }

    pub async fn goals(&self, user_id: Uuid) -> Result<NutritionGoals, SousError> {
        Self::send_json(
            self.request(Method::GET, "/goals")
                .query(&[("user_id", user_id.to_string())]),
        )
        .await
    }

    pub async fn update_goals(
        &self,
        user_id: Uuid,
        update: &GoalsUpdate,
    ) -> Result<NutritionGoals, SousError> {
        let mut body = serde_json::to_value(update).map_err(|e| SousError::Other(e.to_string()))?;
        body["user_id"] = serde_json::json!(user_id);
        Self::send_json(self.request(Method::PUT, "/goals").json(&body)).await
    }

    pub async fn intake(
        &self,
        user_id: Uuid,
        date: Option<NaiveDate>,
    ) -> Result<IntakeReport, SousError> {
        let mut query = vec![("user_id", user_id.to_string())];
        if let Some(date) = date {
            query.push(("date", date.to_string()));
        }
        Self::send_json(self.request(Method::GET, "/intake").query(&query)).await
    }

    pub async fn log_meal(&self, meal: &NewMeal) -> Result<MealLogged, SousError> {
        Self::send_json(self.request(Method::POST, "/meals").json(meal)).await
    }

    pub async fn list_meals(&self, user_id: Uuid, limit: i64) -> Result<Vec<MealLog>, SousError> {
        let list: MealList = Self::send_json(self.request(Method::GET, "/meals").query(&[
            ("user_id", user_id.to_string()),
            ("limit", limit.to_string()),
        ]))
        .await?;
        Ok(list.meals)
    }
}

/// Turn a non-2xx response into the matching error, keeping the server's message.
async fn status_error(resp: Response) -> SousError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let msg = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v["error"].as_str().map(str::to_string))
        .unwrap_or(body);

    match status {
        StatusCode::UNAUTHORIZED => SousError::Auth(msg),
        StatusCode::FORBIDDEN => SousError::Forbidden(msg),
        StatusCode::NOT_FOUND => SousError::NotFound(msg),
        StatusCode::BAD_REQUEST => SousError::InvalidInput(msg),
        _ => SousError::Network(format!("server returned {status}: {msg}")),
    }
}

// ============================================================================
// Pipeline traits
// ============================================================================

#[async_trait]
impl ChatBackend for ServerClient {
    async fn stream_chat(&self, request: &ChefRequest) -> Result<TextStream, SousError> {
        // With a session id the server replays stored history itself, so only
        // the newest user message goes over the wire.
        let body = match &request.session_id {
            Some(_) => ChefRequest {
                messages: request
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .cloned()
                    .into_iter()
                    .collect(),
                ..request.clone()
            },
            None => request.clone(),
        };

        let resp = Self::send(self.request(Method::POST, "/chef").json(&body)).await?;
        let chunks = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| SousError::Network(e.to_string())));
        Ok(chunks.boxed())
    }

    fn name(&self) -> &str {
        "sous-server"
    }
}

#[async_trait]
impl RecipeParser for ServerClient {
    async fn parse(&self, text: &str, user_id: Option<Uuid>) -> Result<CandidateRecipe, SousError> {
        let body = serde_json::json!({ "text": text, "user_id": user_id });
        Self::send_json(self.request(Method::POST, "/parse-recipe").json(&body))
            .await
            .map_err(|e| match e {
                SousError::InvalidInput(msg) => SousError::Parse(msg),
                other => other,
            })
    }
}

#[async_trait]
impl NutritionEstimator for ServerClient {
    async fn estimate(&self, ingredients: &[Ingredient]) -> Result<NutritionEstimate, SousError> {
        let body = serde_json::json!({ "ingredients": ingredients });
        Self::send_json(self.request(Method::POST, "/nutrition").json(&body)).await
    }
}

#[async_trait]
impl RecipeStore for ServerClient {
    async fn insert_recipe(&self, recipe: NewRecipe) -> Result<PersistedRecipe, SousError> {
        Self::send_json(self.request(Method::POST, "/recipes").json(&recipe))
            .await
            .map_err(|e| match e {
                SousError::Network(msg) => SousError::Persistence(msg),
                other => other,
            })
    }

    async fn list_recipes(&self, owner: Option<Uuid>) -> Result<Vec<PersistedRecipe>, SousError> {
        let mut builder = self.request(Method::GET, "/recipes");
        if let Some(owner) = owner {
            builder = builder.query(&[("user_id", owner.to_string())]);
        }
        let list: RecipeList = Self::send_json(builder).await?;
        Ok(list.recipes)
    }

    async fn get_recipe(&self, id: Uuid) -> Result<Option<PersistedRecipe>, SousError> {
        match Self::send_json(self.request(Method::GET, &format!("/recipes/{id}"))).await {
            Ok(recipe) => Ok(Some(recipe)),
            Err(SousError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn update_recipe(
        &self,
        id: Uuid,
        update: RecipeUpdate,
    ) -> Result<Option<PersistedRecipe>, SousError> {
        let builder = self
            .request(Method::PATCH, &format!("/recipes/{id}"))
            .json(&update);
        match Self::send_json(builder).await {
            Ok(recipe) => Ok(Some(recipe)),
            Err(SousError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn delete_recipe(&self, id: Uuid) -> Result<bool, SousError> {
        match Self::send_json::<Deleted>(self.request(Method::DELETE, &format!("/recipes/{id}")))
            .await
        {
            Ok(d) => Ok(d.deleted),
            Err(SousError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
