//! Recipe generation on top of the chat-completion client.
//!
//! Turns a user's existing recipes and dietary preference signals into a
//! deterministic prompt plus a fixed structured-output schema, then
//! delegates to [`ChatCompletionClient::complete`].

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, instrument};

use crate::client::ChatCompletionClient;
use crate::error::{LlmError, Result};
use crate::types::{CompletionRequest, CompletionResponse, Message, StructuredOutput};

/// Schema name echoed back by the service.
const RECIPE_SCHEMA_NAME: &str = "generated_recipe";

/// System persona for all generation requests.
const SYSTEM_PROMPT: &str = "You are a culinary assistant. You create a single new recipe \
     tailored to the user's cooking history and dietary preferences, and you reply only \
     with the requested JSON object.";

// ============================================================================
// Input parameters
// ============================================================================

/// A recipe the user already has, summarized for prompt context.
#[derive(Debug, Clone)]
pub struct ExistingRecipe {
    pub title: String,
    pub description: Option<String>,
    pub ingredients: Vec<String>,
}

/// Dietary preference signals from the user's profile.
#[derive(Debug, Clone, Default)]
pub struct DietaryPreferences {
    /// Diets followed (e.g. "vegetarian", "keto").
    pub diets: Vec<String>,
    /// Ingredients the user is allergic to.
    pub allergies: Vec<String>,
    /// Ingredients the user dislikes.
    pub disliked_ingredients: Vec<String>,
    /// Free-form request from the user (e.g. "something quick for weeknights").
    pub custom_request: Option<String>,
}

impl DietaryPreferences {
    /// True when at least one preference signal is present.
    pub fn has_signal(&self) -> bool {
        !self.diets.is_empty()
            || !self.allergies.is_empty()
            || !self.disliked_ingredients.is_empty()
            || self
                .custom_request
                .as_deref()
                .map(|s| !s.trim().is_empty())
                .unwrap_or(false)
    }
}

/// Parameters for one recipe-generation call.
#[derive(Debug, Clone)]
pub struct RecipeGenerationParams {
    /// Model identifier to use for generation.
    pub model: String,
    /// Recipes the user already owns; may be empty.
    pub existing_recipes: Vec<ExistingRecipe>,
    /// Preference signals; may be empty.
    pub preferences: DietaryPreferences,
}

/// How the prompt is framed, based on what input is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    /// At least one existing recipe: ask for something in the same spirit.
    InspiredByExisting,
    /// No recipes, but preference signals: derive purely from preferences.
    FromPreferences,
}

// ============================================================================
// Generated output
// ============================================================================

/// Difficulty rating of a generated recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// One ingredient line of a generated recipe.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedIngredient {
    pub name: String,
    pub quantity: String,
}

/// A recipe decoded from the structured reply content.
///
/// Optional fields mirror the schema: everything the schema does not list
/// as required may be absent.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedRecipe {
    pub title: String,
    pub description: Option<String>,
    pub ingredients: Vec<GeneratedIngredient>,
    pub instructions: Vec<String>,
    pub prep_time_minutes: Option<u32>,
    pub cook_time_minutes: Option<u32>,
    pub servings: Option<u32>,
    pub difficulty: Option<Difficulty>,
}

impl GeneratedRecipe {
    /// Decode a recipe from the first choice of a completion response.
    pub fn from_response(response: &CompletionResponse) -> Result<Self> {
        let content = response
            .first_content()
            .and_then(|c| c.as_json())
            .ok_or_else(|| {
                LlmError::Internal("completion response carried no structured content".to_string())
            })?;
        serde_json::from_value(content.clone()).map_err(|e| {
            debug!(error = %e, "generated recipe failed to decode");
            LlmError::Internal("generated recipe did not match the expected shape".to_string())
        })
    }
}

// ============================================================================
// Schema
// ============================================================================

/// The fixed structured-output schema for a generated recipe.
///
/// `description`, timing fields, `servings`, and `difficulty` are declared
/// but not required. Strict structured-output mode requires every declared
/// property to be required, so this schema must always be issued with
/// `strict = false`; flipping it to strict would make the service reject
/// the schema outright.
fn recipe_schema() -> JsonValue {
    json!({
        "type": "object",
        "properties": {
            "title": {"type": "string"},
            "description": {"type": "string"},
            "ingredients": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "quantity": {"type": "string"}
                    },
                    "required": ["name", "quantity"]
                }
            },
            "instructions": {
                "type": "array",
                "items": {"type": "string"}
            },
            "prep_time_minutes": {"type": "integer"},
            "cook_time_minutes": {"type": "integer"},
            "servings": {"type": "integer"},
            "difficulty": {"type": "string", "enum": ["easy", "medium", "hard"]}
        },
        "required": ["title", "ingredients", "instructions"]
    })
}

// ============================================================================
// Mode selection and prompt rendering
// ============================================================================

/// Pick the generation mode, failing when there is nothing to generate from.
fn select_mode(params: &RecipeGenerationParams) -> Result<GenerationMode> {
    if !params.existing_recipes.is_empty() {
        return Ok(GenerationMode::InspiredByExisting);
    }
    if params.preferences.has_signal() {
        return Ok(GenerationMode::FromPreferences);
    }
    let mut details = HashMap::new();
    details.insert(
        "existing_recipes".to_string(),
        "no recipes to draw inspiration from".to_string(),
    );
    details.insert(
        "preferences".to_string(),
        "no dietary preference signals present".to_string(),
    );
    Err(LlmError::validation(
        "recipe generation needs at least one existing recipe or preference signal",
        details,
    ))
}

/// Render the user prompt. Output is fully determined by the input: same
/// params, same prompt.
fn render_prompt(params: &RecipeGenerationParams, mode: GenerationMode) -> String {
    let mut prompt = String::new();

    match mode {
        GenerationMode::InspiredByExisting => {
            prompt.push_str(
                "Create one new recipe inspired by my existing recipes below, \
                 without duplicating any of them.\n",
            );
            prompt.push_str("\nMy existing recipes:\n");
            for recipe in &params.existing_recipes {
                prompt.push_str("- ");
                prompt.push_str(&recipe.title);
                if let Some(description) = &recipe.description {
                    prompt.push_str(": ");
                    prompt.push_str(description);
                }
                if !recipe.ingredients.is_empty() {
                    prompt.push_str(" (ingredients: ");
                    prompt.push_str(&recipe.ingredients.join(", "));
                    prompt.push(')');
                }
                prompt.push('\n');
            }
        }
        GenerationMode::FromPreferences => {
            prompt.push_str(
                "Create one new recipe based purely on my stated preferences below.\n",
            );
            // Recipe-context section is deliberately empty in this mode.
        }
    }

    let preferences = &params.preferences;
    if preferences.has_signal() {
        prompt.push_str("\nMy preferences:\n");
        if !preferences.diets.is_empty() {
            prompt.push_str("- Diets: ");
            prompt.push_str(&preferences.diets.join(", "));
            prompt.push('\n');
        }
        if !preferences.allergies.is_empty() {
            prompt.push_str("- Allergies (must avoid): ");
            prompt.push_str(&preferences.allergies.join(", "));
            prompt.push('\n');
        }
        if !preferences.disliked_ingredients.is_empty() {
            prompt.push_str("- Disliked ingredients: ");
            prompt.push_str(&preferences.disliked_ingredients.join(", "));
            prompt.push('\n');
        }
        if let Some(custom) = preferences.custom_request.as_deref() {
            if !custom.trim().is_empty() {
                prompt.push_str("- Request: ");
                prompt.push_str(custom.trim());
                prompt.push('\n');
            }
        }
    }

    prompt
}

/// Build the full completion request for a generation call.
///
/// Exposed within the crate so the request shape is testable without a
/// transport.
pub(crate) fn build_generation_request(
    params: &RecipeGenerationParams,
) -> Result<CompletionRequest> {
    let mode = select_mode(params)?;
    debug!(?mode, recipes = params.existing_recipes.len(), "building generation request");

    let prompt = render_prompt(params, mode);
    let request = CompletionRequest::new(
        params.model.clone(),
        vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)],
    )
    // Never strict: the recipe schema declares optional properties.
    .with_response_schema(StructuredOutput::new(
        RECIPE_SCHEMA_NAME,
        false,
        recipe_schema(),
    ));
    Ok(request)
}

impl ChatCompletionClient {
    /// Generate one new recipe from the user's existing recipes and/or
    /// dietary preferences.
    ///
    /// Fails with a validation error, before any network call, when the
    /// params carry neither an existing recipe nor a preference signal.
    #[instrument(skip(self, params), fields(model = %params.model))]
    pub async fn generate_recipe(
        &self,
        params: &RecipeGenerationParams,
    ) -> Result<CompletionResponse> {
        let request = build_generation_request(params)?;
        self.complete(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipe(title: &str) -> ExistingRecipe {
        ExistingRecipe {
            title: title.to_string(),
            description: None,
            ingredients: vec![],
        }
    }

    fn params_with(
        recipes: Vec<ExistingRecipe>,
        preferences: DietaryPreferences,
    ) -> RecipeGenerationParams {
        RecipeGenerationParams {
            model: "openai/gpt-4o".to_string(),
            existing_recipes: recipes,
            preferences,
        }
    }

    // ------------------------------------------------------------------
    // Mode selection
    // ------------------------------------------------------------------

    #[test]
    fn test_mode_inspired_when_recipes_present() {
        let params = params_with(vec![recipe("Pad Thai")], DietaryPreferences::default());
        assert_eq!(
            select_mode(&params).unwrap(),
            GenerationMode::InspiredByExisting
        );
    }

    #[test]
    fn test_mode_preferences_when_only_signals() {
        let preferences = DietaryPreferences {
            diets: vec!["vegetarian".to_string()],
            ..Default::default()
        };
        let params = params_with(vec![], preferences);
        assert_eq!(select_mode(&params).unwrap(), GenerationMode::FromPreferences);
    }

    #[test]
    fn test_mode_recipes_win_over_signals() {
        let preferences = DietaryPreferences {
            allergies: vec!["peanuts".to_string()],
            ..Default::default()
        };
        let params = params_with(vec![recipe("Ramen")], preferences);
        assert_eq!(
            select_mode(&params).unwrap(),
            GenerationMode::InspiredByExisting
        );
    }

    #[test]
    fn test_mode_fails_with_no_input() {
        let params = params_with(vec![], DietaryPreferences::default());
        let error = select_mode(&params).unwrap_err();
        match error {
            LlmError::Validation {
                details: Some(d), ..
            } => {
                assert!(d.contains_key("existing_recipes"));
                assert!(d.contains_key("preferences"));
            }
            other => panic!("expected Validation, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_custom_request_is_not_a_signal() {
        let preferences = DietaryPreferences {
            custom_request: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(!preferences.has_signal());

        let preferences = DietaryPreferences {
            custom_request: Some("something spicy".to_string()),
            ..Default::default()
        };
        assert!(preferences.has_signal());
    }

    // ------------------------------------------------------------------
    // Prompt rendering
    // ------------------------------------------------------------------

    #[test]
    fn test_prompt_lists_existing_recipes() {
        let params = params_with(
            vec![
                ExistingRecipe {
                    title: "Pad Thai".to_string(),
                    description: Some("Quick noodle dish".to_string()),
                    ingredients: vec!["rice noodles".to_string(), "tamarind".to_string()],
                },
                recipe("Shakshuka"),
            ],
            DietaryPreferences::default(),
        );
        let prompt = render_prompt(&params, GenerationMode::InspiredByExisting);
        assert!(prompt.contains("My existing recipes:"));
        assert!(prompt.contains("- Pad Thai: Quick noodle dish (ingredients: rice noodles, tamarind)"));
        assert!(prompt.contains("- Shakshuka"));
    }

    #[test]
    fn test_prompt_from_preferences_has_empty_recipe_context() {
        let preferences = DietaryPreferences {
            diets: vec!["vegan".to_string()],
            allergies: vec!["shellfish".to_string()],
            disliked_ingredients: vec!["cilantro".to_string()],
            custom_request: Some("30 minutes or less".to_string()),
        };
        let params = params_with(vec![], preferences);
        let prompt = render_prompt(&params, GenerationMode::FromPreferences);
        assert!(!prompt.contains("My existing recipes:"));
        assert!(prompt.contains("- Diets: vegan"));
        assert!(prompt.contains("- Allergies (must avoid): shellfish"));
        assert!(prompt.contains("- Disliked ingredients: cilantro"));
        assert!(prompt.contains("- Request: 30 minutes or less"));
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let params = params_with(
            vec![recipe("Pad Thai")],
            DietaryPreferences {
                diets: vec!["pescatarian".to_string()],
                ..Default::default()
            },
        );
        let first = render_prompt(&params, GenerationMode::InspiredByExisting);
        let second = render_prompt(&params, GenerationMode::InspiredByExisting);
        assert_eq!(first, second);
    }

    // ------------------------------------------------------------------
    // Request shape
    // ------------------------------------------------------------------

    #[test]
    fn test_generation_request_is_never_strict() {
        let params = params_with(vec![recipe("Pad Thai")], DietaryPreferences::default());
        let request = build_generation_request(&params).unwrap();
        let schema = request.response_schema.unwrap();
        assert_eq!(schema.name, RECIPE_SCHEMA_NAME);
        assert!(!schema.strict);
    }

    #[test]
    fn test_generation_request_message_shape() {
        let params = params_with(vec![recipe("Pad Thai")], DietaryPreferences::default());
        let request = build_generation_request(&params).unwrap();
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].content, SYSTEM_PROMPT);
        assert!(request.messages[1].content.contains("Pad Thai"));
    }

    #[test]
    fn test_schema_declares_optional_fields_outside_required() {
        let schema = recipe_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(required, ["title", "ingredients", "instructions"]);

        let properties = schema["properties"].as_object().unwrap();
        for optional in ["description", "prep_time_minutes", "cook_time_minutes", "servings", "difficulty"] {
            assert!(properties.contains_key(optional));
            assert!(!required.contains(&optional));
        }
    }

    // ------------------------------------------------------------------
    // Decoding generated output
    // ------------------------------------------------------------------

    #[test]
    fn test_generated_recipe_decodes_minimal_shape() {
        let value = json!({
            "title": "Miso Glazed Eggplant",
            "ingredients": [{"name": "eggplant", "quantity": "2"}],
            "instructions": ["Halve the eggplant.", "Glaze and roast."]
        });
        let recipe: GeneratedRecipe = serde_json::from_value(value).unwrap();
        assert_eq!(recipe.title, "Miso Glazed Eggplant");
        assert_eq!(recipe.ingredients.len(), 1);
        assert_eq!(recipe.instructions.len(), 2);
        assert!(recipe.description.is_none());
        assert!(recipe.difficulty.is_none());
    }

    #[test]
    fn test_generated_recipe_decodes_full_shape() {
        let value = json!({
            "title": "Lentil Curry",
            "description": "Weeknight staple",
            "ingredients": [
                {"name": "red lentils", "quantity": "200g"},
                {"name": "coconut milk", "quantity": "400ml"}
            ],
            "instructions": ["Simmer lentils.", "Add coconut milk."],
            "prep_time_minutes": 10,
            "cook_time_minutes": 25,
            "servings": 4,
            "difficulty": "easy"
        });
        let recipe: GeneratedRecipe = serde_json::from_value(value).unwrap();
        assert_eq!(recipe.servings, Some(4));
        assert_eq!(recipe.difficulty, Some(Difficulty::Easy));
        assert_eq!(recipe.prep_time_minutes, Some(10));
    }
}
