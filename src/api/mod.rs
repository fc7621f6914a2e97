//! REST API module.
//!
//! Contains all API routes and handlers following the frontend contract.

mod chat;
mod generate;
mod ingredients;
mod narration;
mod payment;
mod recipes;
mod users;

pub use chat::*;
pub use generate::*;
pub use ingredients::*;
pub use narration::*;
pub use payment::*;
pub use recipes::*;
pub use users::*;

use axum::{
    extract::FromRequest,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::AppError;

/// Success response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppError>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(ApiResponse::new(data))
}

/// JSON body extractor whose rejections use the error envelope.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Body of the routes that act on a single recipe.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeIdRequest {
    #[serde(default)]
    pub recipe_id: String,
}

impl RecipeIdRequest {
    /// Trimmed id, or a validation error when blank.
    pub fn id(&self) -> Result<&str, AppError> {
        let id = self.recipe_id.trim();
        if id.is_empty() {
            return Err(AppError::Validation("Recipe ID is required".to_string()));
        }
        Ok(id)
    }
}
