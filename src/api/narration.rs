//! Text-to-speech narration endpoint.

use axum::{extract::State, Extension};
use serde::Serialize;

use super::{recipes::find_recipe, success, ApiJson, ApiResult, RecipeIdRequest};
use crate::auth::SessionUser;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct NarrationResponse {
    pub audio: String,
}

/// POST /api/tts - Narrated audio for a recipe, generated once and then reused.
pub async fn narrate_recipe(
    State(state): State<AppState>,
    Extension(session): Extension<SessionUser>,
    ApiJson(request): ApiJson<RecipeIdRequest>,
) -> ApiResult<NarrationResponse> {
    let id = request.id()?;
    let recipe = find_recipe(&state, id).await?;

    if let Some(audio) = recipe.audio.as_deref().filter(|a| !a.is_empty()) {
        return success(NarrationResponse {
            audio: audio.to_string(),
        });
    }

    let mp3 = state.ai.narrate(&recipe, session.id()).await?;
    let audio = state
        .storage
        .upload_audio(mp3, &format!("{}.mp3", recipe.id))
        .await?;
    state.repo.set_recipe_audio(&recipe.id, &audio).await?;

    tracing::info!(recipe_id = %recipe.id, "Stored narration audio");
    success(NarrationResponse { audio })
}
