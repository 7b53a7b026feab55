use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

use crate::models::PersistedRecipe;

/// The user's recipe list as held by the client.
///
/// Clones share one list. Readers get snapshots; the only writer outside
/// start-up sync is the submitter's success path.
#[derive(Debug, Clone, Default)]
pub struct RecipeCollection {
    inner: Arc<RwLock<Vec<PersistedRecipe>>>,
}

impl RecipeCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<PersistedRecipe> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, id: Uuid) -> Option<PersistedRecipe> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the whole list with what storage returned.
    pub fn replace_all(&self, recipes: Vec<PersistedRecipe>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = recipes;
    }

    pub(crate) fn append(&self, recipe: PersistedRecipe) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(recipe);
    }
}
