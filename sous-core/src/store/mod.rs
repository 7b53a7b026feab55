//! Storage contracts.
//!
//! The pipeline only ever talks to these traits. `PgStore` backs the server in
//! production; `MemoryStore` backs tests and `database.backend = "memory"`.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::SousError;
use crate::models::{
    DailyIntake, GoalsUpdate, MealLog, NewChatMessage, NewMeal, NewRecipe, NutritionGoals,
    PersistedRecipe, RecipeUpdate, StoredChatMessage,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Session id under which every recipe-parsing attempt is logged.
pub const PARSE_AUDIT_SESSION: &str = "recipe-parsing";

#[async_trait]
pub trait RecipeStore: Send + Sync {
    async fn insert_recipe(&self, recipe: NewRecipe) -> Result<PersistedRecipe, SousError>;

    /// Newest first. `None` lists public recipes, `Some(user)` that user's own.
    async fn list_recipes(&self, owner: Option<Uuid>) -> Result<Vec<PersistedRecipe>, SousError>;

    async fn get_recipe(&self, id: Uuid) -> Result<Option<PersistedRecipe>, SousError>;

    /// Returns `None` when no recipe with that id exists.
    async fn update_recipe(
        &self,
        id: Uuid,
        update: RecipeUpdate,
    ) -> Result<Option<PersistedRecipe>, SousError>;

    /// Returns whether a row was removed.
    async fn delete_recipe(&self, id: Uuid) -> Result<bool, SousError>;
}

#[async_trait]
pub trait ChatLogStore: Send + Sync {
    async fn append_message(&self, message: NewChatMessage)
        -> Result<StoredChatMessage, SousError>;

    /// Oldest first.
    async fn list_messages(
        &self,
        user_id: Uuid,
        session_id: &str,
    ) -> Result<Vec<StoredChatMessage>, SousError>;
}

#[async_trait]
pub trait NutritionStore: Send + Sync {
    /// Creates the default goals row on first read.
    async fn goals(&self, user_id: Uuid) -> Result<NutritionGoals, SousError>;

    async fn update_goals(
        &self,
        user_id: Uuid,
        update: GoalsUpdate,
    ) -> Result<NutritionGoals, SousError>;

    /// Creates a zeroed row on first read.
    async fn daily_intake(&self, user_id: Uuid, date: NaiveDate)
        -> Result<DailyIntake, SousError>;

    /// Appends the meal and adds its macros to that day's intake in one step.
    async fn log_meal(&self, meal: NewMeal) -> Result<(MealLog, DailyIntake), SousError>;

    /// Newest first.
    async fn list_meals(&self, user_id: Uuid, limit: i64) -> Result<Vec<MealLog>, SousError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Resolve a session token to its user, ignoring expired sessions.
    async fn resolve_session(&self, token: &str) -> Result<Option<Uuid>, SousError>;

    async fn health(&self) -> Result<String, SousError>;
}

/// Everything the HTTP server needs from storage.
pub trait Store: RecipeStore + ChatLogStore + NutritionStore + SessionStore {}

impl<T> Store for T where T: RecipeStore + ChatLogStore + NutritionStore + SessionStore {}
