pub mod message;
pub mod nutrition;
pub mod recipe;

pub use message::{ChatEntry, ConversationMessage, NewChatMessage, PromptMessage, Role, StoredChatMessage};
pub use nutrition::{
    DailyIntake, GoalsUpdate, MacroGap, MealLog, NewMeal, NutritionEstimate, NutritionGoals,
};
pub use recipe::{
    CandidateRecipe, Ingredient, Instruction, NewRecipe, PersistedRecipe, RecipeNotes, RecipeUpdate,
};
