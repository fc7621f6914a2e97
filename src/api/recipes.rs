//! Recipe browsing, liking and deletion endpoints.

use axum::{
    extract::{Path, Query, State},
    Extension,
};
use serde::Serialize;

use super::{success, ApiJson, ApiResult, RecipeIdRequest};
use crate::auth::SessionUser;
use crate::errors::AppError;
use crate::models::{Recipe, RecipeView, TagCount};
use crate::pagination::{total_pages, PaginationParams, RecipeQuery, POPULAR_TAGS_LIMIT};
use crate::AppState;

/// One page of a recipe listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipePage {
    pub recipes: Vec<RecipeView>,
    pub current_page: i64,
    pub total_pages: i64,
    pub total_recipes: i64,
    pub popular_tags: Vec<TagCount>,
}

/// Response of a delete.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// GET /api/get-recipes - Paginated recipe listing.
pub async fn get_recipes(
    State(state): State<AppState>,
    Extension(session): Extension<SessionUser>,
    Query(params): Query<PaginationParams>,
) -> ApiResult<RecipePage> {
    let mut query = RecipeQuery::from_params(&params, session.id());
    query.search = None;
    list_page(&state, query).await
}

/// GET /api/search-recipes - Listing restricted to recipes matching `query`.
pub async fn search_recipes(
    State(state): State<AppState>,
    Extension(session): Extension<SessionUser>,
    Query(params): Query<PaginationParams>,
) -> ApiResult<RecipePage> {
    let query = RecipeQuery::from_params(&params, session.id());
    if query.search.is_none() {
        return Err(AppError::Validation(
            "Search query (tag) is required".to_string(),
        ));
    }
    list_page(&state, query).await
}

/// GET /api/recipes/{id} - Get a single recipe.
pub async fn get_recipe(
    State(state): State<AppState>,
    Extension(session): Extension<SessionUser>,
    Path(id): Path<String>,
) -> ApiResult<RecipeView> {
    let recipe = find_recipe(&state, &id).await?;
    let mut views = to_views(&state, vec![recipe], session.id()).await?;
    match views.pop() {
        Some(view) => success(view),
        None => Err(AppError::NotFound(format!("Recipe {} not found", id))),
    }
}

/// PUT /api/like-recipe - Toggle the viewer's like on a recipe.
pub async fn like_recipe(
    State(state): State<AppState>,
    Extension(session): Extension<SessionUser>,
    ApiJson(request): ApiJson<RecipeIdRequest>,
) -> ApiResult<RecipeView> {
    let id = request.id()?;
    let viewer = session.id();

    let recipe = find_recipe(&state, id).await?;
    if recipe.owner_id == viewer {
        return Err(AppError::BadRequest(
            "You cannot like your own recipe".to_string(),
        ));
    }

    let liked = state.repo.toggle_like(id, viewer).await?;
    tracing::debug!(recipe_id = id, user_id = viewer, liked, "Toggled like");

    let recipe = find_recipe(&state, id).await?;
    let mut views = to_views(&state, vec![recipe], viewer).await?;
    match views.pop() {
        Some(view) => success(view),
        None => Err(AppError::NotFound(format!("Recipe {} not found", id))),
    }
}

/// DELETE /api/delete-recipe - Delete a recipe owned by the viewer.
pub async fn delete_recipe(
    State(state): State<AppState>,
    Extension(session): Extension<SessionUser>,
    ApiJson(request): ApiJson<RecipeIdRequest>,
) -> ApiResult<MessageResponse> {
    let id = request.id()?;

    let recipe = find_recipe(&state, id).await?;
    if recipe.owner_id != session.id() {
        return Err(AppError::Forbidden(
            "You are not allowed to delete this recipe".to_string(),
        ));
    }

    state.repo.delete_recipe(id).await?;
    tracing::info!(recipe_id = id, user_id = session.id(), "Deleted recipe");

    success(MessageResponse {
        message: format!("Deleted recipe with id {}", id),
    })
}

pub(super) async fn find_recipe(state: &AppState, id: &str) -> Result<Recipe, AppError> {
    state
        .repo
        .get_recipe(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Recipe {} not found", id)))
}

/// Resolve owner and like references and build the viewer's views.
pub(super) async fn to_views(
    state: &AppState,
    recipes: Vec<Recipe>,
    viewer_id: &str,
) -> Result<Vec<RecipeView>, AppError> {
    let mut user_ids: Vec<String> = recipes
        .iter()
        .flat_map(|r| std::iter::once(&r.owner_id).chain(r.liked_by.iter()))
        .cloned()
        .collect();
    user_ids.sort();
    user_ids.dedup();

    let users = state.repo.get_user_summaries(&user_ids).await?;
    Ok(recipes
        .into_iter()
        .map(|r| RecipeView::for_viewer(r, &users, viewer_id))
        .collect())
}

async fn list_page(state: &AppState, query: RecipeQuery) -> ApiResult<RecipePage> {
    let (recipes, total_recipes, popular_tags) = tokio::try_join!(
        state.repo.list_recipes(&query),
        state.repo.count_recipes(&query),
        state.repo.popular_tags(POPULAR_TAGS_LIMIT),
    )?;

    let recipes = to_views(state, recipes, &query.viewer_id).await?;

    success(RecipePage {
        recipes,
        current_page: query.page,
        total_pages: total_pages(total_recipes, query.limit),
        total_recipes,
        popular_tags,
    })
}
