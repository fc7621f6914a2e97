//! Ingredient catalogue endpoints.

use axum::{extract::State, Extension};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{success, ApiJson, ApiResult};
use crate::ai::parse_ingredient_verdict;
use crate::auth::SessionUser;
use crate::errors::AppError;
use crate::models::{format_ingredient_name, Ingredient};
use crate::AppState;

/// Ingredient picker payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngredientListResponse {
    pub reached_limit: bool,
    pub ingredient_list: Vec<Ingredient>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateIngredientRequest {
    #[serde(default)]
    pub ingredient_name: String,
}

/// Outcome of an ingredient validation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateIngredientResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_ingredient: Option<Ingredient>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested: Option<Vec<String>>,
}

/// GET /api/get-ingredients - Ingredient catalogue, empty once the free limit is used up.
pub async fn get_ingredients(
    State(state): State<AppState>,
    Extension(session): Extension<SessionUser>,
) -> ApiResult<IngredientListResponse> {
    let owned = state.repo.count_owned_recipes(session.id()).await?;
    let subscribed = session.0.subscription.is_active_at(Utc::now());

    if owned >= state.config.free_recipe_limit && !subscribed {
        tracing::debug!(user_id = session.id(), owned, "Free recipe limit reached");
        return success(IngredientListResponse {
            reached_limit: true,
            ingredient_list: Vec::new(),
        });
    }

    success(IngredientListResponse {
        reached_limit: false,
        ingredient_list: state.repo.list_ingredients().await?,
    })
}

/// POST /api/validate-ingredient - Check a new ingredient with the model and add it.
pub async fn validate_ingredient(
    State(state): State<AppState>,
    Extension(session): Extension<SessionUser>,
    ApiJson(request): ApiJson<ValidateIngredientRequest>,
) -> ApiResult<ValidateIngredientResponse> {
    let name = request.ingredient_name.trim();
    if name.is_empty() {
        return Err(AppError::Validation(
            "Valid ingredient name is required".to_string(),
        ));
    }

    let answer = state
        .ai
        .validate_ingredient(name, session.id())
        .await?
        .ok_or_else(|| {
            AppError::Upstream("Failed to get validation response from OpenAI".to_string())
        })?;
    let verdict = parse_ingredient_verdict(&answer).ok_or_else(|| {
        tracing::error!(answer = %answer, "Unparseable ingredient validation");
        AppError::Upstream("Invalid response format from validation service".to_string())
    })?;

    if !verdict.is_valid {
        return success(ValidateIngredientResponse {
            message: "Invalid".to_string(),
            new_ingredient: None,
            suggested: Some(verdict.possible_variations),
        });
    }

    let formatted = format_ingredient_name(name);
    if state.repo.find_ingredient_by_name(&formatted).await?.is_some() {
        return success(ValidateIngredientResponse {
            message: "Error: This ingredient already exists".to_string(),
            new_ingredient: None,
            suggested: None,
        });
    }

    let ingredient = state
        .repo
        .create_ingredient(&formatted, session.id())
        .await?;
    tracing::info!(ingredient = %ingredient.name, user_id = session.id(), "Added ingredient");

    success(ValidateIngredientResponse {
        message: "Success".to_string(),
        new_ingredient: Some(ingredient),
        suggested: Some(verdict.possible_variations),
    })
}
