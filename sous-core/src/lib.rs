pub mod chef;
pub mod collection;
pub mod config;
pub mod db;
pub mod emoji;
pub mod error;
pub mod extract;
pub mod llm;
pub mod models;
pub mod normalize;
pub mod nutrition;
pub mod store;
pub mod stream;
pub mod submit;

pub use chef::{ChefSession, TurnOutcome};
pub use collection::RecipeCollection;
pub use config::SousConfig;
pub use error::SousError;
pub use extract::{extract_recipe_block, Extraction};
pub use llm::{ChatBackend, ChatMode, ChefRequest, OpenAiClient};
pub use normalize::{normalize_candidate, normalize_value, LocalRecipeParser, RecipeParser};
pub use nutrition::NutritionEstimator;
pub use store::{ChatLogStore, MemoryStore, NutritionStore, PgStore, RecipeStore, SessionStore, Store};
pub use submit::{SubmissionState, Submitter};
