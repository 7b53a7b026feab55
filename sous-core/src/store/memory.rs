//! In-process store. Lost on restart.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::{ChatLogStore, NutritionStore, RecipeStore, SessionStore};
use crate::error::SousError;
use crate::models::{
    DailyIntake, GoalsUpdate, MealLog, NewChatMessage, NewMeal, NewRecipe, NutritionGoals,
    PersistedRecipe, RecipeUpdate, StoredChatMessage,
};

#[derive(Debug, Default)]
struct Tables {
    recipes: Vec<PersistedRecipe>,
    chat: Vec<StoredChatMessage>,
    goals: HashMap<Uuid, NutritionGoals>,
    intake: HashMap<(Uuid, NaiveDate), DailyIntake>,
    meals: Vec<MealLog>,
    sessions: HashMap<String, (Uuid, Option<DateTime<Utc>>)>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session token. Sign-in lives outside this service, so tests and
    /// local runs seed sessions directly.
    pub fn insert_session(
        &self,
        token: impl Into<String>,
        user_id: Uuid,
        expires_at: Option<DateTime<Utc>>,
    ) {
        self.lock().sessions.insert(token.into(), (user_id, expires_at));
    }

    pub fn recipe_count(&self) -> usize {
        self.lock().recipes.len()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RecipeStore for MemoryStore {
    async fn insert_recipe(&self, recipe: NewRecipe) -> Result<PersistedRecipe, SousError> {
        let stored = PersistedRecipe::from_new(Uuid::new_v4(), recipe, Utc::now());
        self.lock().recipes.push(stored.clone());
        Ok(stored)
    }

    async fn list_recipes(&self, owner: Option<Uuid>) -> Result<Vec<PersistedRecipe>, SousError> {
        let mut recipes: Vec<PersistedRecipe> = self
            .lock()
            .recipes
            .iter()
            .filter(|r| r.user_id == owner)
            .cloned()
            .collect();
        recipes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(recipes)
    }

    async fn get_recipe(&self, id: Uuid) -> Result<Option<PersistedRecipe>, SousError> {
        Ok(self.lock().recipes.iter().find(|r| r.id == id).cloned())
    }

    async fn update_recipe(
        &self,
        id: Uuid,
        update: RecipeUpdate,
    ) -> Result<Option<PersistedRecipe>, SousError> {
        let mut tables = self.lock();
        Ok(tables.recipes.iter_mut().find(|r| r.id == id).map(|r| {
            r.apply(update, Utc::now());
            r.clone()
        }))
    }

    async fn delete_recipe(&self, id: Uuid) -> Result<bool, SousError> {
        let mut tables = self.lock();
        let before = tables.recipes.len();
        tables.recipes.retain(|r| r.id != id);
        Ok(tables.recipes.len() != before)
    }
}

#[async_trait]
impl ChatLogStore for MemoryStore {
    async fn append_message(
        &self,
        message: NewChatMessage,
    ) -> Result<StoredChatMessage, SousError> {
        let stored = StoredChatMessage {
            id: Uuid::new_v4(),
            user_id: message.user_id,
            session_id: message.session_id,
            role: message.role,
            content: message.content,
            recipe_data: message.recipe_data,
            created_at: Utc::now(),
        };
        self.lock().chat.push(stored.clone());
        Ok(stored)
    }

    async fn list_messages(
        &self,
        user_id: Uuid,
        session_id: &str,
    ) -> Result<Vec<StoredChatMessage>, SousError> {
        Ok(self
            .lock()
            .chat
            .iter()
            .filter(|m| m.user_id == user_id && m.session_id == session_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl NutritionStore for MemoryStore {
    async fn goals(&self, user_id: Uuid) -> Result<NutritionGoals, SousError> {
        Ok(self
            .lock()
            .goals
            .entry(user_id)
            .or_insert_with(|| NutritionGoals::defaults_for(user_id))
            .clone())
    }

    async fn update_goals(
        &self,
        user_id: Uuid,
        update: GoalsUpdate,
    ) -> Result<NutritionGoals, SousError> {
        let mut tables = self.lock();
        let goals = tables
            .goals
            .entry(user_id)
            .or_insert_with(|| NutritionGoals::defaults_for(user_id));
        goals.apply(&update);
        Ok(goals.clone())
    }

    async fn daily_intake(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> Result<DailyIntake, SousError> {
        Ok(self
            .lock()
            .intake
            .entry((user_id, date))
            .or_insert_with(|| DailyIntake::empty(user_id, date))
            .clone())
    }

    async fn log_meal(&self, meal: NewMeal) -> Result<(MealLog, DailyIntake), SousError> {
        let consumed_at = meal.consumed_at.unwrap_or_else(Utc::now);
        let date = consumed_at.date_naive();
        let log = MealLog {
            id: Uuid::new_v4(),
            user_id: meal.user_id,
            recipe_id: meal.recipe_id,
            meal_name: meal.meal_name.clone(),
            servings: meal.servings,
            protein_consumed: meal.protein,
            carbs_consumed: meal.carbs,
            fats_consumed: meal.fats,
            calories_consumed: meal.calories,
            consumed_at,
        };

        // One guard for both writes keeps them atomic.
        let mut tables = self.lock();
        let intake = tables
            .intake
            .entry((meal.user_id, date))
            .or_insert_with(|| DailyIntake::empty(meal.user_id, date));
        intake.add(&meal);
        let intake = intake.clone();
        tables.meals.push(log.clone());
        Ok((log, intake))
    }

    async fn list_meals(&self, user_id: Uuid, limit: i64) -> Result<Vec<MealLog>, SousError> {
        let mut meals: Vec<MealLog> = self
            .lock()
            .meals
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        meals.sort_by(|a, b| b.consumed_at.cmp(&a.consumed_at));
        meals.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(meals)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn resolve_session(&self, token: &str) -> Result<Option<Uuid>, SousError> {
        let now = Utc::now();
        Ok(self
            .lock()
            .sessions
            .get(token)
            .filter(|(_, expires)| expires.map_or(true, |e| e > now))
            .map(|(user, _)| *user))
    }

    async fn health(&self) -> Result<String, SousError> {
        Ok("memory".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Ingredient, Instruction, RecipeNotes, Role};
    use chrono::{Duration, TimeZone};

    fn new_recipe(owner: Option<Uuid>, title: &str) -> NewRecipe {
        NewRecipe {
            user_id: owner,
            title: title.to_string(),
            description: None,
            ingredients: vec![Ingredient {
                name: "rice".to_string(),
                amount: "1 cup".to_string(),
            }],
            instructions: vec![Instruction::Text("Cook".to_string())],
            notes: RecipeNotes::default(),
            prep_time: None,
            cook_time: None,
            servings: None,
            image_url: None,
            is_ai_generated: false,
            generation_chat_log: None,
            nutrition: None,
        }
    }

    #[tokio::test]
    async fn test_list_separates_public_and_owned() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store.insert_recipe(new_recipe(None, "Public")).await.unwrap();
        store.insert_recipe(new_recipe(Some(user), "Mine")).await.unwrap();
        store
            .insert_recipe(new_recipe(Some(Uuid::new_v4()), "Theirs"))
            .await
            .unwrap();

        let public = store.list_recipes(None).await.unwrap();
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].title, "Public");

        let mine = store.list_recipes(Some(user)).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].title, "Mine");
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = MemoryStore::new();
        let created = store.insert_recipe(new_recipe(None, "Rice")).await.unwrap();

        let updated = store
            .update_recipe(
                created.id,
                RecipeUpdate {
                    servings: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.servings, Some(2));
        assert_eq!(updated.title, "Rice");

        assert!(store
            .update_recipe(Uuid::new_v4(), RecipeUpdate::default())
            .await
            .unwrap()
            .is_none());
        assert!(store.delete_recipe(created.id).await.unwrap());
        assert!(!store.delete_recipe(created.id).await.unwrap());
        assert_eq!(store.recipe_count(), 0);
    }

    #[tokio::test]
    async fn test_chat_log_is_scoped_by_session() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        for (session, content) in [("a", "one"), ("b", "two"), ("a", "three")] {
            store
                .append_message(NewChatMessage {
                    user_id: user,
                    session_id: session.to_string(),
                    role: Role::User,
                    content: content.to_string(),
                    recipe_data: None,
                })
                .await
                .unwrap();
        }
        let a: Vec<String> = store
            .list_messages(user, "a")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(a, vec!["one", "three"]);
    }

    #[tokio::test]
    async fn test_log_meal_updates_intake_for_its_day() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let at = Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap();
        let meal = NewMeal {
            user_id: user,
            recipe_id: None,
            meal_name: "Lunch".to_string(),
            servings: None,
            protein: 40.0,
            carbs: 60.0,
            fats: 15.0,
            calories: Some(550.0),
            consumed_at: Some(at),
        };

        let (log, intake) = store.log_meal(meal.clone()).await.unwrap();
        assert_eq!(log.protein_consumed, 40.0);
        assert_eq!(intake.date, at.date_naive());

        let (_, intake) = store.log_meal(meal).await.unwrap();
        assert_eq!(intake.protein_consumed, 80.0);
        assert_eq!(intake.calories_consumed, Some(1100.0));

        let next_day = store
            .daily_intake(user, at.date_naive() + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(next_day.protein_consumed, 0.0);
        assert_eq!(store.list_meals(user, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_goals_default_then_update() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let goals = store.goals(user).await.unwrap();
        assert_eq!(goals.protein_target, 150.0);

        let goals = store
            .update_goals(
                user,
                GoalsUpdate {
                    protein_target: Some(180.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(goals.protein_target, 180.0);
        assert_eq!(goals.carbs_target, 200.0);
    }

    #[tokio::test]
    async fn test_expired_session_does_not_resolve() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store.insert_session("live", user, None);
        store.insert_session("stale", user, Some(Utc::now() - Duration::hours(1)));

        assert_eq!(store.resolve_session("live").await.unwrap(), Some(user));
        assert_eq!(store.resolve_session("stale").await.unwrap(), None);
        assert_eq!(store.resolve_session("missing").await.unwrap(), None);
    }
}
