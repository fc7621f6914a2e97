//! Recipe generation and saving endpoints.

use axum::{extract::State, Extension};
use serde::{Deserialize, Serialize};

use super::{success, ApiJson, ApiResult};
use crate::ai::GeneratedRecipes;
use crate::auth::SessionUser;
use crate::errors::AppError;
use crate::models::{IngredientInput, NewRecipe, FALLBACK_IMAGE};
use crate::storage::{ImageUpload, UploadResult};
use crate::AppState;

/// Body of a generation request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRecipesRequest {
    #[serde(default)]
    pub ingredients: Vec<IngredientInput>,
    #[serde(default)]
    pub dietary_preferences: Vec<String>,
}

/// Body of a save request; recipes are checked one by one.
#[derive(Debug, Deserialize)]
pub struct SaveRecipesRequest {
    #[serde(default)]
    pub recipes: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct SaveRecipesResponse {
    pub status: String,
}

/// POST /api/generate-recipes - Ask the model for recipes from the chosen ingredients.
pub async fn generate_recipes(
    State(state): State<AppState>,
    Extension(session): Extension<SessionUser>,
    ApiJson(request): ApiJson<GenerateRecipesRequest>,
) -> ApiResult<GeneratedRecipes> {
    if request.ingredients.is_empty() {
        return Err(AppError::Validation("Ingredients are required".to_string()));
    }

    tracing::info!(
        user_id = session.id(),
        ingredients = request.ingredients.len(),
        "Generating recipes"
    );
    let generated = state
        .ai
        .generate_recipe(
            &request.ingredients,
            &request.dietary_preferences,
            session.id(),
        )
        .await?;

    success(generated)
}

/// POST /api/save-recipes - Generate images, store them and save the recipes.
pub async fn save_recipes(
    State(state): State<AppState>,
    Extension(session): Extension<SessionUser>,
    ApiJson(request): ApiJson<SaveRecipesRequest>,
) -> ApiResult<SaveRecipesResponse> {
    let recipes = parse_recipes(request.recipes)?;
    let user_id = session.id();

    tracing::info!(user_id, count = recipes.len(), "Saving recipes");
    let images = state.ai.generate_images(&recipes, user_id).await;

    let uploads: Vec<ImageUpload> = images
        .iter()
        .zip(&recipes)
        .map(|(image, recipe)| ImageUpload {
            source_url: image.img_link.clone(),
            user_id: user_id.to_string(),
            location: recipe.openai_prompt_id.clone(),
        })
        .collect();
    let upload_results = state.storage.upload_images(&uploads).await;

    let entries: Vec<(NewRecipe, String)> = recipes
        .into_iter()
        .map(|recipe| {
            let img_link = image_link(&upload_results, &recipe.openai_prompt_id);
            (recipe, img_link)
        })
        .collect();

    let saved = state.repo.insert_recipes(user_id, &entries).await?;
    tracing::info!(user_id, count = saved.len(), "Saved recipes");

    for recipe in saved {
        let ai = state.ai.clone();
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            ai.generate_recipe_tags(&recipe, &user_id).await;
        });
    }

    success(SaveRecipesResponse {
        status: "Saved Recipes and generated the Images!".to_string(),
    })
}

/// Decode and check every submitted recipe.
fn parse_recipes(raw: serde_json::Value) -> Result<Vec<NewRecipe>, AppError> {
    let items = match raw {
        serde_json::Value::Array(items) if !items.is_empty() => items,
        _ => {
            return Err(AppError::Validation(
                "No valid recipes provided".to_string(),
            ))
        }
    };

    items
        .into_iter()
        .map(|item| {
            serde_json::from_value::<NewRecipe>(item)
                .ok()
                .filter(NewRecipe::is_valid)
                .ok_or_else(|| {
                    tracing::warn!("Rejected invalid recipe data");
                    AppError::Validation("Invalid recipe data provided".to_string())
                })
        })
        .collect()
}

/// Uploaded URL for the recipe keyed by `prompt_id`, or the fallback image.
fn image_link(results: &[UploadResult], prompt_id: &str) -> String {
    let suffix = format!("/{}", prompt_id);
    results
        .iter()
        .find(|r| r.location.ends_with(&suffix))
        .filter(|r| r.uploaded)
        .map(|r| r.location.clone())
        .unwrap_or_else(|| FALLBACK_IMAGE.to_string())
}
