//! Recipe chat assistant endpoint.

use axum::{extract::State, Extension};
use serde::Deserialize;

use super::{recipes::find_recipe, success, ApiJson, ApiResult};
use crate::ai::{ChatMessage, ChatReply};
use crate::auth::SessionUser;
use crate::errors::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub recipe_id: String,
    /// Earlier turns of the conversation, oldest first
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

/// POST /api/chat-assistant - Answer a question about a recipe.
pub async fn chat_assistant(
    State(state): State<AppState>,
    Extension(session): Extension<SessionUser>,
    ApiJson(request): ApiJson<ChatRequest>,
) -> ApiResult<ChatReply> {
    let message = request.message.trim();
    if message.is_empty() {
        return Err(AppError::Validation("Message is required".to_string()));
    }
    let recipe_id = request.recipe_id.trim();
    if recipe_id.is_empty() {
        return Err(AppError::Validation("Recipe ID is required".to_string()));
    }

    let recipe = find_recipe(&state, recipe_id).await?;
    let reply = state
        .ai
        .chat_response(message, &recipe, &request.history, session.id())
        .await;

    success(reply)
}
