//! User API endpoints.

use axum::{extract::State, Extension};
use serde::Serialize;

use super::{recipes::to_views, success, ApiJson, ApiResult};
use crate::auth::SessionUser;
use crate::errors::AppError;
use crate::models::{RecipeView, SignInRequest, User};
use crate::AppState;

/// Profile page payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub recipes: Vec<RecipeView>,
    #[serde(rename = "AIusage")]
    pub ai_usage: i64,
    pub total_generated_count: i64,
    pub api_request_limit: i64,
}

/// POST /api/auth/signin - Create or refresh the user behind a sign-in.
pub async fn sign_in(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SignInRequest>,
) -> ApiResult<User> {
    if request.email.trim().is_empty() {
        return Err(AppError::Validation("Email is required".to_string()));
    }
    if request.name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }

    let user = state.repo.upsert_user(&request).await?;
    tracing::info!(user_id = %user.id, "User signed in");
    success(user)
}

/// GET /api/profile - Recipes owned or liked by the viewer, with usage against the free limit.
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(session): Extension<SessionUser>,
) -> ApiResult<ProfileResponse> {
    let viewer = session.id();

    let (recipes, total_generated_count) = tokio::try_join!(
        state.repo.list_profile_recipes(viewer),
        state.repo.count_owned_recipes(viewer),
    )?;
    let recipes = to_views(&state, recipes, viewer).await?;

    let api_request_limit = state.config.free_recipe_limit;
    success(ProfileResponse {
        recipes,
        ai_usage: usage_percent(total_generated_count, api_request_limit),
        total_generated_count,
        api_request_limit,
    })
}

/// Share of `limit` used, rounded and capped at 100.
fn usage_percent(count: i64, limit: i64) -> i64 {
    if limit <= 0 {
        return 100;
    }
    let percent = (count as f64 / limit as f64 * 100.0).round() as i64;
    percent.min(100)
}
