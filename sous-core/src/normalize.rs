//! Candidate recipe parsing and validation.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::error::SousError;
use crate::extract::extract_recipe_block;
use crate::models::CandidateRecipe;

/// Turns assistant text that contains a recipe block into a validated recipe.
#[async_trait]
pub trait RecipeParser: Send + Sync {
    async fn parse(&self, text: &str, user_id: Option<Uuid>) -> Result<CandidateRecipe, SousError>;
}

/// Extract and normalize in-process, without an audit trail.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalRecipeParser;

#[async_trait]
impl RecipeParser for LocalRecipeParser {
    async fn parse(&self, text: &str, _user_id: Option<Uuid>) -> Result<CandidateRecipe, SousError> {
        let candidate = extract_recipe_block(text)
            .candidate()
            .ok_or_else(|| SousError::Parse("no JSON recipe found in response".to_string()))?;
        normalize_candidate(candidate)
    }
}

/// Parse a candidate JSON string into a validated recipe.
///
/// A top-level object-valued `recipe` field is elevated before validation,
/// since models sometimes wrap their answer in one.
pub fn normalize_candidate(candidate: &str) -> Result<CandidateRecipe, SousError> {
    let value: Value =
        serde_json::from_str(candidate).map_err(|e| SousError::Parse(e.to_string()))?;
    normalize_value(value)
}

pub fn normalize_value(value: Value) -> Result<CandidateRecipe, SousError> {
    let value = unwrap_recipe(value);

    let missing = missing_fields(&value);
    if !missing.is_empty() {
        return Err(SousError::MissingFields { fields: missing });
    }

    serde_json::from_value(value).map_err(|e| SousError::Parse(e.to_string()))
}

fn unwrap_recipe(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.get("recipe").is_some_and(Value::is_object) => {
            map.remove("recipe").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn missing_fields(value: &Value) -> Vec<&'static str> {
    let mut missing = Vec::new();
    let has_title = value["title"]
        .as_str()
        .is_some_and(|t| !t.trim().is_empty());
    if !has_title {
        missing.push("title");
    }
    if !value["ingredients"].is_array() {
        missing.push("ingredients");
    }
    if !value["instructions"].is_array() {
        missing.push("instructions");
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Instruction;
    use serde_json::json;

    const TOMATO_JSON: &str = "{\"title\":\"Tomato Soup\",\"ingredients\":[{\"name\":\"tomato\",\"amount\":\"4\"}],\"instructions\":[\"Boil\",\"Blend\"]}";

    #[test]
    fn test_tomato_soup_unchanged() {
        let recipe = normalize_candidate(TOMATO_JSON).unwrap();
        assert_eq!(recipe.title, "Tomato Soup");
        assert_eq!(recipe.ingredients.len(), 1);
        assert_eq!(recipe.ingredients[0].name, "tomato");
        assert_eq!(recipe.ingredients[0].amount, "4");
        assert_eq!(
            recipe.instructions,
            vec![
                Instruction::Text("Boil".to_string()),
                Instruction::Text("Blend".to_string())
            ]
        );
        assert_eq!(recipe.notes, None);

        let reserialized = serde_json::to_value(&recipe).unwrap();
        let original: Value = serde_json::from_str(TOMATO_JSON).unwrap();
        assert_eq!(reserialized, original);
    }

    #[test]
    fn test_recipe_wrapper_is_elevated() {
        let wrapped = json!({
            "recipe": {
                "title": "Wrapped Curry",
                "ingredients": [],
                "instructions": [{"text": "Simmer"}]
            },
            "message": "here it is"
        });
        let recipe = normalize_value(wrapped).unwrap();
        assert_eq!(recipe.title, "Wrapped Curry");
        assert_eq!(recipe.instructions[0].text(), "Simmer");
    }

    #[test]
    fn test_wrapper_contents_are_what_gets_validated() {
        // Outer object has every field, the wrapped one does not.
        let wrapped = json!({
            "title": "Outer",
            "ingredients": [],
            "instructions": [],
            "recipe": {"title": "Inner"}
        });
        match normalize_value(wrapped) {
            Err(SousError::MissingFields { fields }) => {
                assert_eq!(fields, vec!["ingredients", "instructions"]);
            }
            other => panic!("expected MissingFields, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_fields_are_named() {
        let cases = [
            (json!({"ingredients": [], "instructions": []}), vec!["title"]),
            (json!({"title": "x", "instructions": []}), vec!["ingredients"]),
            (json!({"title": "x", "ingredients": []}), vec!["instructions"]),
            (json!({}), vec!["title", "ingredients", "instructions"]),
            (
                json!({"title": "   ", "ingredients": "flour", "instructions": []}),
                vec!["title", "ingredients"],
            ),
        ];
        for (value, expected) in cases {
            match normalize_value(value.clone()) {
                Err(SousError::MissingFields { fields }) => assert_eq!(fields, expected),
                other => panic!("expected MissingFields for {}, got {:?}", value, other),
            }
        }
    }

    #[test]
    fn test_syntax_error_is_parse_error() {
        let result = normalize_candidate("{\"title\": \"Broken\",");
        assert!(matches!(result, Err(SousError::Parse(_))));
    }

    #[test]
    fn test_wrong_ingredient_shape_is_parse_error() {
        let result = normalize_value(json!({
            "title": "Odd",
            "ingredients": ["just a string"],
            "instructions": []
        }));
        assert!(matches!(result, Err(SousError::Parse(_))));
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let input = json!({
            "recipe": {
                "title": "Chicken Bowl",
                "description": "Quick",
                "ingredients": [{"name": "chicken", "amount": 200}],
                "instructions": ["Grill", {"text": "Slice"}],
                "prep_time": "10 min",
                "servings": 2,
                "notes": {"text": "Spicy"}
            }
        });
        let first = normalize_value(input).unwrap();
        let second = normalize_value(serde_json::to_value(&first).unwrap()).unwrap();
        assert_eq!(first, second);

        let third = normalize_candidate(&serde_json::to_string(&second).unwrap()).unwrap();
        assert_eq!(second, third);
    }

    #[tokio::test]
    async fn test_local_parser_extracts_then_normalizes() {
        let text = format!("Sure! ```json\n{}\n```", TOMATO_JSON);
        let recipe = LocalRecipeParser.parse(&text, None).await.unwrap();
        assert_eq!(recipe.title, "Tomato Soup");

        let result = LocalRecipeParser.parse("just chatting", None).await;
        assert!(matches!(result, Err(SousError::Parse(_))));
    }
}
