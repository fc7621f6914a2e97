//! Prompt builders for every OpenAI call the service makes.

use crate::models::{IngredientInput, Recipe, RecipeIngredient};

/// Ask for three recipes as a JSON array using the given ingredients.
pub fn recipe_generation(ingredients: &[IngredientInput], dietary_preferences: &[String]) -> String {
    let ingredient_list = ingredients
        .iter()
        .map(|i| match i.quantity_text() {
            Some(q) => format!("{} ({})", i.name, q),
            None => i.name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ");

    let preferences = if dietary_preferences.is_empty() {
        String::new()
    } else {
        format!(
            " The recipes must respect these dietary preferences: {}.",
            dietary_preferences.join(", ")
        )
    };

    format!(
        r#"I have the following ingredients: {ingredient_list}.{preferences} Please provide me with three different delicious and diverse recipes. You may add common pantry staples, but the listed ingredients should be the main components.

Respond with a JSON array only, no other text. Each element must have this shape:
{{
  "name": "Recipe name",
  "ingredients": [{{"name": "Ingredient", "quantity": "Amount"}}],
  "instructions": ["Step one", "Step two"],
  "dietaryPreference": ["Preference"],
  "additionalInformation": {{
    "tips": "Cooking tips",
    "variations": "Possible variations",
    "servingSuggestions": "How to serve",
    "nutritionalInformation": "Approximate nutrition"
  }},
  "categories": ["Category"]
}}"#
    )
}

/// Describe a plated dish for image generation.
pub fn image_generation(name: &str, ingredients: &[RecipeIngredient]) -> String {
    let ingredient_names = ingredients
        .iter()
        .map(|i| i.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Create a high-resolution, photorealistic image of a delicious {name} made of these ingredients: {ingredient_names}. \
         The dish is plated on a clean table in natural light. No text, labels or people in the image."
    )
}

/// Ask whether a name is a real cooking ingredient.
pub fn ingredient_validation(name: &str) -> String {
    format!(
        r#"You are an expert in culinary ingredients. Determine whether "{name}" is a valid cooking ingredient.

Respond with JSON only, no other text: {{"isValid": true, "possibleVariations": ["variation1", "variation2"]}}

"isValid" is true only for a real, edible ingredient. "possibleVariations" lists up to three close alternatives or corrected spellings, and may be empty."#
    )
}

/// Turn a saved recipe into a script for spoken narration.
pub fn recipe_narration(recipe: &Recipe) -> String {
    let ingredients = recipe
        .ingredients
        .iter()
        .map(|i| format!("{} {}", i.quantity, i.name))
        .collect::<Vec<_>>()
        .join(", ");
    let instructions = recipe
        .instructions
        .iter()
        .enumerate()
        .map(|(n, step)| format!("{}. {}", n + 1, step))
        .collect::<Vec<_>>()
        .join("\n");
    let info = &recipe.additional_information;

    format!(
        r#"Convert the following recipe into a warm, engaging narration suitable for listening while cooking. Read it naturally as a host would, without markdown, lists or headings.

Recipe: {name}
Ingredients: {ingredients}
Instructions:
{instructions}
Tips: {tips}
Variations: {variations}
Serving suggestions: {serving}
Nutritional information: {nutrition}"#,
        name = recipe.name,
        tips = info.tips,
        variations = info.variations,
        serving = info.serving_suggestions,
        nutrition = info.nutritional_information,
    )
}

/// Ask for search keywords for a saved recipe.
pub fn recipe_tagging(recipe: &Recipe) -> String {
    let ingredients = recipe
        .ingredients
        .iter()
        .map(|i| i.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"Generate up to 10 relevant tags for the following recipe. Tags should help users find it by cuisine, main ingredients, dietary preference, meal type and cooking method.

Recipe name: {name}
Ingredients: {ingredients}
Dietary preferences: {preferences}
Categories: {categories}

Respond with a JSON array of lower-case strings only, no other text, for example: ["tag1", "tag2"]"#,
        name = recipe.name,
        preferences = recipe.dietary_preference.join(", "),
        categories = recipe.categories.join(", "),
    )
}

/// System prompt for the per-recipe chat assistant.
pub fn chat_system(recipe: &Recipe) -> String {
    let ingredients = recipe
        .ingredients
        .iter()
        .map(|i| format!("- {} {}", i.quantity, i.name))
        .collect::<Vec<_>>()
        .join("\n");
    let instructions = recipe
        .instructions
        .iter()
        .enumerate()
        .map(|(n, step)| format!("{}. {}", n + 1, step))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a friendly cooking assistant helping a user with the recipe "{name}".
Only answer questions about this recipe, its ingredients, substitutions, techniques, nutrition and serving. Politely decline anything unrelated. Keep answers short and practical.

Ingredients:
{ingredients}

Instructions:
{instructions}

Dietary preferences: {preferences}"#,
        name = recipe.name,
        preferences = recipe.dietary_preference.join(", "),
    )
}

/// Strip a surrounding markdown code fence from a model answer.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
