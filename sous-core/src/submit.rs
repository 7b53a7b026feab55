//! Persistence submitter.
//!
//! Enriches a validated recipe with a nutrition estimate and a display emoji,
//! writes it under the signed-in user, and only then adds it to the collection.
//!
//! States: `Idle → FetchingNutrition → {Failed | Enriching} → Persisting →
//! {Failed | Succeeded}`. There is no retry; a failed attempt leaves storage and
//! the collection untouched.

use std::sync::Arc;
use uuid::Uuid;

use crate::collection::RecipeCollection;
use crate::emoji::resolve_emoji;
use crate::error::SousError;
use crate::models::{CandidateRecipe, ConversationMessage, NewRecipe, PersistedRecipe, RecipeNotes};
use crate::nutrition::NutritionEstimator;
use crate::store::RecipeStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    FetchingNutrition,
    Enriching,
    Persisting,
    Succeeded,
    Failed,
}

impl SubmissionState {
    fn can_advance_to(self, next: SubmissionState) -> bool {
        use SubmissionState::*;
        matches!(
            (self, next),
            (Idle, FetchingNutrition)
                | (FetchingNutrition, Enriching)
                | (FetchingNutrition, Failed)
                | (Enriching, Persisting)
                | (Persisting, Succeeded)
                | (Persisting, Failed)
        )
    }
}

/// Tracks one submission through its states.
#[derive(Debug)]
pub struct SubmissionAttempt {
    state: SubmissionState,
}

impl Default for SubmissionAttempt {
    fn default() -> Self {
        Self {
            state: SubmissionState::Idle,
        }
    }
}

impl SubmissionAttempt {
    pub fn state(&self) -> SubmissionState {
        self.state
    }

    pub fn advance(&mut self, next: SubmissionState) -> Result<(), SousError> {
        if !self.state.can_advance_to(next) {
            return Err(SousError::Other(format!(
                "illegal submission transition {:?} -> {:?}",
                self.state, next
            )));
        }
        tracing::trace!(from = ?self.state, to = ?next, "Submission state");
        self.state = next;
        Ok(())
    }

    fn fail(&mut self, error: SousError) -> SousError {
        match self.advance(SubmissionState::Failed) {
            Ok(()) => error,
            Err(illegal) => illegal,
        }
    }
}

#[derive(Clone)]
pub struct Submitter {
    estimator: Arc<dyn NutritionEstimator>,
    store: Arc<dyn RecipeStore>,
    collection: RecipeCollection,
}

impl Submitter {
    pub fn new(
        estimator: Arc<dyn NutritionEstimator>,
        store: Arc<dyn RecipeStore>,
        collection: RecipeCollection,
    ) -> Self {
        Self {
            estimator,
            store,
            collection,
        }
    }

    pub fn collection(&self) -> &RecipeCollection {
        &self.collection
    }

    /// Enrich and persist one recipe.
    ///
    /// An anonymous caller is rejected before any network or storage call.
    pub async fn submit(
        &self,
        recipe: &CandidateRecipe,
        user_id: Option<Uuid>,
        chat_log: Option<Vec<ConversationMessage>>,
    ) -> Result<PersistedRecipe, SousError> {
        let user_id = user_id.ok_or_else(|| {
            SousError::Auth("you must be signed in to save recipes".to_string())
        })?;

        let empty = recipe.empty_required_fields();
        if !empty.is_empty() {
            return Err(SousError::MissingFields { fields: empty });
        }

        let mut attempt = SubmissionAttempt::default();
        attempt.advance(SubmissionState::FetchingNutrition)?;

        let nutrition = match self.estimator.estimate(&recipe.ingredients).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(user_id = %user_id, title = %recipe.title, error = %e, "Nutrition estimate failed");
                return Err(attempt.fail(SousError::Network(
                    "Failed to fetch nutritional information.".to_string(),
                )));
            }
        };

        attempt.advance(SubmissionState::Enriching)?;
        let notes = recipe.notes.clone().unwrap_or_default();
        let emoji = resolve_emoji(notes.emoji.as_deref(), &recipe.title);
        let record = NewRecipe {
            user_id: Some(user_id),
            title: recipe.title.clone(),
            description: recipe.description.clone(),
            ingredients: recipe.ingredients.clone(),
            instructions: recipe.instructions.clone(),
            notes: RecipeNotes {
                emoji: Some(emoji),
                text: notes.text,
            },
            prep_time: recipe.prep_time,
            cook_time: recipe.cook_time,
            servings: recipe.servings,
            image_url: None,
            is_ai_generated: true,
            generation_chat_log: chat_log,
            nutrition: Some(nutrition),
        };

        attempt.advance(SubmissionState::Persisting)?;
        let saved = match self.store.insert_recipe(record).await {
            Ok(saved) => saved,
            Err(e) => {
                tracing::error!(user_id = %user_id, title = %recipe.title, error = %e, "Recipe insert failed");
                return Err(attempt.fail(SousError::Persistence(e.to_string())));
            }
        };

        attempt.advance(SubmissionState::Succeeded)?;
        self.collection.append(saved.clone());
        tracing::info!(user_id = %user_id, recipe_id = %saved.id, title = %saved.title, "Recipe saved");
        Ok(saved)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::models::{Ingredient, NutritionEstimate, RecipeUpdate};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub struct FixedEstimator {
        pub result: Result<NutritionEstimate, String>,
        pub calls: AtomicUsize,
    }

    impl FixedEstimator {
        pub fn ok() -> Self {
            Self {
                result: Ok(NutritionEstimate {
                    calories: 320.0,
                    protein: 6.0,
                    carbs: 28.0,
                    fats: 21.0,
                }),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing() -> Self {
            Self {
                result: Err("model unavailable".to_string()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl NutritionEstimator for FixedEstimator {
        async fn estimate(
            &self,
            _ingredients: &[Ingredient],
        ) -> Result<NutritionEstimate, SousError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone().map_err(SousError::Network)
        }
    }

    /// Store whose writes always fail. Reads are empty.
    pub struct BrokenStore {
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl RecipeStore for BrokenStore {
        async fn insert_recipe(&self, _recipe: NewRecipe) -> Result<PersistedRecipe, SousError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(SousError::Other("disk full".to_string()))
        }

        async fn list_recipes(
            &self,
            _owner: Option<Uuid>,
        ) -> Result<Vec<PersistedRecipe>, SousError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        }

        async fn get_recipe(&self, _id: Uuid) -> Result<Option<PersistedRecipe>, SousError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }

        async fn update_recipe(
            &self,
            _id: Uuid,
            _update: RecipeUpdate,
        ) -> Result<Option<PersistedRecipe>, SousError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }

        async fn delete_recipe(&self, _id: Uuid) -> Result<bool, SousError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(false)
        }
    }

    pub fn tomato_soup() -> CandidateRecipe {
        crate::normalize::normalize_candidate(
            "{\"title\":\"Tomato Soup\",\"ingredients\":[{\"name\":\"tomato\",\"amount\":\"4\"}],\"instructions\":[\"Boil\",\"Blend\"]}",
        )
        .unwrap()
    }
}
