use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::message::ConversationMessage;
use super::nutrition::NutritionEstimate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub amount: String,
}

/// A recipe step. Models emit either bare strings or `{ "text": ... }` records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Instruction {
    Text(String),
    Step { text: String },
}

impl Instruction {
    pub fn text(&self) -> &str {
        match self {
            Instruction::Text(t) => t,
            Instruction::Step { text } => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecipeNotes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Untrusted recipe extracted from assistant output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecipe {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub ingredients: Vec<Ingredient>,
    pub instructions: Vec<Instruction>,
    #[serde(default, deserialize_with = "lenient_minutes", skip_serializing_if = "Option::is_none")]
    pub prep_time: Option<i32>,
    #[serde(default, deserialize_with = "lenient_minutes", skip_serializing_if = "Option::is_none")]
    pub cook_time: Option<i32>,
    #[serde(default, deserialize_with = "lenient_minutes", skip_serializing_if = "Option::is_none")]
    pub servings: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<RecipeNotes>,
}

impl CandidateRecipe {
    /// Fields that are present but empty. Such a recipe must not be stored.
    pub fn empty_required_fields(&self) -> Vec<&'static str> {
        empty_required_fields(&self.title, &self.ingredients, &self.instructions)
    }
}

/// A stored recipe needs a non-blank title and at least one ingredient and step.
fn empty_required_fields(
    title: &str,
    ingredients: &[Ingredient],
    instructions: &[Instruction],
) -> Vec<&'static str> {
    let mut empty = Vec::new();
    if title.trim().is_empty() {
        empty.push("title");
    }
    if ingredients.is_empty() {
        empty.push("ingredients");
    }
    if instructions.is_empty() {
        empty.push("instructions");
    }
    empty
}

/// Record handed to storage for insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecipe {
    pub user_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub ingredients: Vec<Ingredient>,
    pub instructions: Vec<Instruction>,
    #[serde(default)]
    pub notes: RecipeNotes,
    pub prep_time: Option<i32>,
    pub cook_time: Option<i32>,
    pub servings: Option<i32>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub is_ai_generated: bool,
    #[serde(default)]
    pub generation_chat_log: Option<Vec<ConversationMessage>>,
    #[serde(default)]
    pub nutrition: Option<NutritionEstimate>,
}

impl NewRecipe {
    /// Names of the fields that would violate the "never empty" storage invariant.
    pub fn empty_required_fields(&self) -> Vec<&'static str> {
        empty_required_fields(&self.title, &self.ingredients, &self.instructions)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecipe {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub ingredients: Vec<Ingredient>,
    pub instructions: Vec<Instruction>,
    pub notes: RecipeNotes,
    pub prep_time: Option<i32>,
    pub cook_time: Option<i32>,
    pub servings: Option<i32>,
    pub image_url: Option<String>,
    pub is_ai_generated: bool,
    pub generation_chat_log: Option<Vec<ConversationMessage>>,
    pub nutrition: Option<NutritionEstimate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PersistedRecipe {
    pub fn from_new(id: Uuid, recipe: NewRecipe, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: recipe.user_id,
            title: recipe.title,
            description: recipe.description,
            ingredients: recipe.ingredients,
            instructions: recipe.instructions,
            notes: recipe.notes,
            prep_time: recipe.prep_time,
            cook_time: recipe.cook_time,
            servings: recipe.servings,
            image_url: recipe.image_url,
            is_ai_generated: recipe.is_ai_generated,
            generation_chat_log: recipe.generation_chat_log,
            nutrition: recipe.nutrition,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_public(&self) -> bool {
        self.user_id.is_none()
    }

    /// Apply a partial update in place. Fields left `None` keep their value.
    pub fn apply(&mut self, update: RecipeUpdate, now: DateTime<Utc>) {
        if let Some(title) = update.title {
            self.title = title;
        }
        if let Some(description) = update.description {
            self.description = Some(description);
        }
        if let Some(ingredients) = update.ingredients {
            self.ingredients = ingredients;
        }
        if let Some(instructions) = update.instructions {
            self.instructions = instructions;
        }
        if let Some(notes) = update.notes {
            self.notes = notes;
        }
        if let Some(v) = update.prep_time {
            self.prep_time = Some(v);
        }
        if let Some(v) = update.cook_time {
            self.cook_time = Some(v);
        }
        if let Some(v) = update.servings {
            self.servings = Some(v);
        }
        if let Some(url) = update.image_url {
            self.image_url = Some(url);
        }
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub ingredients: Option<Vec<Ingredient>>,
    #[serde(default)]
    pub instructions: Option<Vec<Instruction>>,
    #[serde(default)]
    pub notes: Option<RecipeNotes>,
    #[serde(default)]
    pub prep_time: Option<i32>,
    #[serde(default)]
    pub cook_time: Option<i32>,
    #[serde(default)]
    pub servings: Option<i32>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl RecipeUpdate {
    /// An update may not blank out a field the storage invariant requires.
    pub fn empty_required_fields(&self) -> Vec<&'static str> {
        let mut empty = Vec::new();
        if self.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            empty.push("title");
        }
        if self.ingredients.as_ref().is_some_and(|i| i.is_empty()) {
            empty.push("ingredients");
        }
        if self.instructions.as_ref().is_some_and(|i| i.is_empty()) {
            empty.push("instructions");
        }
        empty
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Accepts `15`, `15.0`, `"15"` or `"15 minutes"`; anything else reads as absent.
fn lenient_minutes<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .and_then(|v| i32::try_from(v).ok()),
        Value::String(s) => {
            let digits: String = s
                .trim()
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            digits.parse().ok()
        }
        _ => None,
    })
}
