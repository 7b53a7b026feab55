//! Postgres-backed store (sqlx, runtime-checked queries).
//!
//! JSON-shaped columns (ingredients, instructions, notes, transcript, nutrition)
//! are JSONB and cross the boundary through `sqlx::types::Json`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{ChatLogStore, NutritionStore, RecipeStore, SessionStore};
use crate::error::SousError;
use crate::models::{
    ConversationMessage, DailyIntake, GoalsUpdate, Ingredient, Instruction, MealLog,
    NewChatMessage, NewMeal, NewRecipe, NutritionEstimate, NutritionGoals, PersistedRecipe,
    RecipeNotes, RecipeUpdate, Role, StoredChatMessage,
};

const RECIPE_COLUMNS: &str = "id, user_id, title, description, ingredients, instructions, notes, \
     prep_time, cook_time, servings, image_url, is_ai_generated, generation_chat_log, nutrition, \
     created_at, updated_at";

const MEAL_COLUMNS: &str = "id, user_id, recipe_id, meal_name, servings, protein_consumed, \
     carbs_consumed, fats_consumed, calories_consumed, consumed_at";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ============================================================================
// Row types (private)
// ============================================================================

#[derive(sqlx::FromRow)]
struct RecipeRow {
    id: Uuid,
    user_id: Option<Uuid>,
    title: String,
    description: Option<String>,
    ingredients: Json<Vec<Ingredient>>,
    instructions: Json<Vec<Instruction>>,
    notes: Json<RecipeNotes>,
    prep_time: Option<i32>,
    cook_time: Option<i32>,
    servings: Option<i32>,
    image_url: Option<String>,
    is_ai_generated: bool,
    generation_chat_log: Option<Json<Vec<ConversationMessage>>>,
    nutrition: Option<Json<NutritionEstimate>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RecipeRow> for PersistedRecipe {
    fn from(row: RecipeRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            description: row.description,
            ingredients: row.ingredients.0,
            instructions: row.instructions.0,
            notes: row.notes.0,
            prep_time: row.prep_time,
            cook_time: row.cook_time,
            servings: row.servings,
            image_url: row.image_url,
            is_ai_generated: row.is_ai_generated,
            generation_chat_log: row.generation_chat_log.map(|j| j.0),
            nutrition: row.nutrition.map(|j| j.0),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ChatRow {
    id: Uuid,
    user_id: Uuid,
    session_id: String,
    role: String,
    content: String,
    recipe_data: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ChatRow> for StoredChatMessage {
    type Error = SousError;

    fn try_from(row: ChatRow) -> Result<Self, Self::Error> {
        let role = Role::parse(&row.role)
            .ok_or_else(|| SousError::Other(format!("unknown chat role '{}'", row.role)))?;
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            session_id: row.session_id,
            role,
            content: row.content,
            recipe_data: row.recipe_data,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct GoalsRow {
    user_id: Uuid,
    protein_target: f64,
    carbs_target: f64,
    fats_target: f64,
    calories_target: Option<f64>,
    updated_at: DateTime<Utc>,
}

impl From<GoalsRow> for NutritionGoals {
    fn from(row: GoalsRow) -> Self {
        Self {
            user_id: row.user_id,
            protein_target: row.protein_target,
            carbs_target: row.carbs_target,
            fats_target: row.fats_target,
            calories_target: row.calories_target,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct IntakeRow {
    user_id: Uuid,
    date: NaiveDate,
    protein_consumed: f64,
    carbs_consumed: f64,
    fats_consumed: f64,
    calories_consumed: Option<f64>,
}

impl From<IntakeRow> for DailyIntake {
    fn from(row: IntakeRow) -> Self {
        Self {
            user_id: row.user_id,
            date: row.date,
            protein_consumed: row.protein_consumed,
            carbs_consumed: row.carbs_consumed,
            fats_consumed: row.fats_consumed,
            calories_consumed: row.calories_consumed,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MealRow {
    id: Uuid,
    user_id: Uuid,
    recipe_id: Option<Uuid>,
    meal_name: String,
    servings: Option<f64>,
    protein_consumed: f64,
    carbs_consumed: f64,
    fats_consumed: f64,
    calories_consumed: Option<f64>,
    consumed_at: DateTime<Utc>,
}

impl From<MealRow> for MealLog {
    fn from(row: MealRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            recipe_id: row.recipe_id,
            meal_name: row.meal_name,
            servings: row.servings,
            protein_consumed: row.protein_consumed,
            carbs_consumed: row.carbs_consumed,
            fats_consumed: row.fats_consumed,
            calories_consumed: row.calories_consumed,
            consumed_at: row.consumed_at,
        }
    }
}

// ============================================================================
// RecipeStore
// ============================================================================

#[async_trait]
impl RecipeStore for PgStore {
    async fn insert_recipe(&self, recipe: NewRecipe) -> Result<PersistedRecipe, SousError> {
        let row: RecipeRow = sqlx::query_as(&format!(
            "INSERT INTO recipes (id, user_id, title, description, ingredients, instructions, notes, \
             prep_time, cook_time, servings, image_url, is_ai_generated, generation_chat_log, nutrition) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             RETURNING {RECIPE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(recipe.user_id)
        .bind(&recipe.title)
        .bind(&recipe.description)
        .bind(Json(&recipe.ingredients))
        .bind(Json(&recipe.instructions))
        .bind(Json(&recipe.notes))
        .bind(recipe.prep_time)
        .bind(recipe.cook_time)
        .bind(recipe.servings)
        .bind(&recipe.image_url)
        .bind(recipe.is_ai_generated)
        .bind(recipe.generation_chat_log.as_ref().map(Json))
        .bind(recipe.nutrition.map(Json))
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(recipe_id = %row.id, title = %row.title, "Recipe inserted");
        Ok(row.into())
    }

    async fn list_recipes(&self, owner: Option<Uuid>) -> Result<Vec<PersistedRecipe>, SousError> {
        let rows: Vec<RecipeRow> = sqlx::query_as(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes \
             WHERE user_id IS NOT DISTINCT FROM $1 \
             ORDER BY created_at DESC"
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_recipe(&self, id: Uuid) -> Result<Option<PersistedRecipe>, SousError> {
        let row: Option<RecipeRow> =
            sqlx::query_as(&format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Into::into))
    }

    async fn update_recipe(
        &self,
        id: Uuid,
        update: RecipeUpdate,
    ) -> Result<Option<PersistedRecipe>, SousError> {
        let row: Option<RecipeRow> = sqlx::query_as(&format!(
            "UPDATE recipes SET \
                title = COALESCE($2, title), \
                description = COALESCE($3, description), \
                ingredients = COALESCE($4, ingredients), \
                instructions = COALESCE($5, instructions), \
                notes = COALESCE($6, notes), \
                prep_time = COALESCE($7, prep_time), \
                cook_time = COALESCE($8, cook_time), \
                servings = COALESCE($9, servings), \
                image_url = COALESCE($10, image_url), \
                updated_at = now() \
             WHERE id = $1 \
             RETURNING {RECIPE_COLUMNS}"
        ))
        .bind(id)
        .bind(update.title)
        .bind(update.description)
        .bind(update.ingredients.map(Json))
        .bind(update.instructions.map(Json))
        .bind(update.notes.map(Json))
        .bind(update.prep_time)
        .bind(update.cook_time)
        .bind(update.servings)
        .bind(update.image_url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn delete_recipe(&self, id: Uuid) -> Result<bool, SousError> {
        let result = sqlx::query("DELETE FROM recipes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// ============================================================================
// ChatLogStore
// ============================================================================

#[async_trait]
impl ChatLogStore for PgStore {
    async fn append_message(
        &self,
        message: NewChatMessage,
    ) -> Result<StoredChatMessage, SousError> {
        let row: ChatRow = sqlx::query_as(
            "INSERT INTO chat_messages (id, user_id, session_id, role, content, recipe_data) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, user_id, session_id, role, content, recipe_data, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(message.user_id)
        .bind(&message.session_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&message.recipe_data)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn list_messages(
        &self,
        user_id: Uuid,
        session_id: &str,
    ) -> Result<Vec<StoredChatMessage>, SousError> {
        let rows: Vec<ChatRow> = sqlx::query_as(
            "SELECT id, user_id, session_id, role, content, recipe_data, created_at \
             FROM chat_messages \
             WHERE user_id = $1 AND session_id = $2 \
             ORDER BY created_at ASC",
        )
        .bind(user_id)
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

// ============================================================================
// NutritionStore
// ============================================================================

#[async_trait]
impl NutritionStore for PgStore {
    async fn goals(&self, user_id: Uuid) -> Result<NutritionGoals, SousError> {
        // No-op upsert so the row is created on first read and returned either way.
        let row: GoalsRow = sqlx::query_as(
            "INSERT INTO nutrition_goals (user_id) VALUES ($1) \
             ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id \
             RETURNING user_id, protein_target, carbs_target, fats_target, calories_target, updated_at",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn update_goals(
        &self,
        user_id: Uuid,
        update: GoalsUpdate,
    ) -> Result<NutritionGoals, SousError> {
        let row: GoalsRow = sqlx::query_as(
            "INSERT INTO nutrition_goals (user_id, protein_target, carbs_target, fats_target, calories_target) \
             VALUES ($1, COALESCE($2, 150), COALESCE($3, 200), COALESCE($4, 60), $5) \
             ON CONFLICT (user_id) DO UPDATE SET \
                protein_target = COALESCE($2, nutrition_goals.protein_target), \
                carbs_target = COALESCE($3, nutrition_goals.carbs_target), \
                fats_target = COALESCE($4, nutrition_goals.fats_target), \
                calories_target = COALESCE($5, nutrition_goals.calories_target), \
                updated_at = now() \
             RETURNING user_id, protein_target, carbs_target, fats_target, calories_target, updated_at",
        )
        .bind(user_id)
        .bind(update.protein_target)
        .bind(update.carbs_target)
        .bind(update.fats_target)
        .bind(update.calories_target)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(user_id = %user_id, "Nutrition goals updated");
        Ok(row.into())
    }

    async fn daily_intake(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> Result<DailyIntake, SousError> {
        let row: IntakeRow = sqlx::query_as(
            "INSERT INTO daily_intake (user_id, date) VALUES ($1, $2) \
             ON CONFLICT (user_id, date) DO UPDATE SET user_id = EXCLUDED.user_id \
             RETURNING user_id, date, protein_consumed, carbs_consumed, fats_consumed, calories_consumed",
        )
        .bind(user_id)
        .bind(date)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn log_meal(&self, meal: NewMeal) -> Result<(MealLog, DailyIntake), SousError> {
        let consumed_at = meal.consumed_at.unwrap_or_else(Utc::now);
        let mut tx = self.pool.begin().await?;

        let log: MealRow = sqlx::query_as(&format!(
            "INSERT INTO meal_logs (id, user_id, recipe_id, meal_name, servings, \
             protein_consumed, carbs_consumed, fats_consumed, calories_consumed, consumed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {MEAL_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(meal.user_id)
        .bind(meal.recipe_id)
        .bind(&meal.meal_name)
        .bind(meal.servings)
        .bind(meal.protein)
        .bind(meal.carbs)
        .bind(meal.fats)
        .bind(meal.calories)
        .bind(consumed_at)
        .fetch_one(&mut *tx)
        .await?;

        let intake: IntakeRow = sqlx::query_as(
            "INSERT INTO daily_intake (user_id, date, protein_consumed, carbs_consumed, fats_consumed, calories_consumed) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (user_id, date) DO UPDATE SET \
                protein_consumed = daily_intake.protein_consumed + EXCLUDED.protein_consumed, \
                carbs_consumed = daily_intake.carbs_consumed + EXCLUDED.carbs_consumed, \
                fats_consumed = daily_intake.fats_consumed + EXCLUDED.fats_consumed, \
                calories_consumed = CASE \
                    WHEN EXCLUDED.calories_consumed IS NULL THEN daily_intake.calories_consumed \
                    ELSE COALESCE(daily_intake.calories_consumed, 0) + EXCLUDED.calories_consumed \
                END, \
                updated_at = now() \
             RETURNING user_id, date, protein_consumed, carbs_consumed, fats_consumed, calories_consumed",
        )
        .bind(meal.user_id)
        .bind(consumed_at.date_naive())
        .bind(meal.protein)
        .bind(meal.carbs)
        .bind(meal.fats)
        .bind(meal.calories)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(user_id = %meal.user_id, meal = %meal.meal_name, "Meal logged");
        Ok((log.into(), intake.into()))
    }

    async fn list_meals(&self, user_id: Uuid, limit: i64) -> Result<Vec<MealLog>, SousError> {
        let rows: Vec<MealRow> = sqlx::query_as(&format!(
            "SELECT {MEAL_COLUMNS} FROM meal_logs WHERE user_id = $1 \
             ORDER BY consumed_at DESC LIMIT $2"
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

// ============================================================================
// SessionStore
// ============================================================================

#[async_trait]
impl SessionStore for PgStore {
    async fn resolve_session(&self, token: &str) -> Result<Option<Uuid>, SousError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT user_id FROM user_sessions \
             WHERE token = $1 AND (expires_at IS NULL OR expires_at > now())",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(user_id,)| user_id))
    }

    async fn health(&self) -> Result<String, SousError> {
        Ok(crate::db::health_check(&self.pool).await?)
    }
}
