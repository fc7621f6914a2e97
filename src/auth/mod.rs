//! Request authentication.
//!
//! Two layers guard the API. The PSK layer proves the caller is the trusted web front
//! end; the session layer resolves the signed-in user that front end forwards.
//! Key comparison is constant-time to mitigate timing attacks.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::db::Repository;
use crate::errors::AppError;
use crate::models::User;

/// Header name for the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header carrying the id of the signed-in user.
pub const USER_ID_HEADER: &str = "x-user-id";

const LOGIN_REQUIRED: &str = "You must be logged in.";

/// The signed-in user, available to handlers as `Extension<SessionUser>`.
#[derive(Debug, Clone)]
pub struct SessionUser(pub User);

impl SessionUser {
    pub fn id(&self) -> &str {
        &self.0.id
    }
}

/// PSK authentication layer function that takes the expected PSK as a parameter.
pub async fn psk_auth_layer(
    expected_psk: Option<String>,
    request: Request,
    next: Next,
) -> Response {
    // If no PSK is configured, allow all requests (dev mode)
    let Some(expected) = expected_psk else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    match provided {
        Some(provided_key) => {
            if constant_time_compare(&provided_key, &expected) {
                next.run(request).await
            } else {
                unauthorized_response("Invalid API key")
            }
        }
        None => {
            // Also check Authorization header as bearer token
            let bearer = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
                .map(|s| s.to_string());

            match bearer {
                Some(bearer_key) if constant_time_compare(&bearer_key, &expected) => {
                    next.run(request).await
                }
                _ => unauthorized_response("Missing or invalid API key"),
            }
        }
    }
}

/// Resolve the `x-user-id` header to a stored user and attach it as [`SessionUser`].
pub async fn session_layer(
    State(repo): State<Arc<Repository>>,
    mut request: Request,
    next: Next,
) -> Response {
    let user_id = request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string);

    let Some(user_id) = user_id else {
        return unauthorized_response(LOGIN_REQUIRED);
    };

    match repo.get_user(&user_id).await {
        Ok(Some(user)) => {
            request.extensions_mut().insert(SessionUser(user));
            next.run(request).await
        }
        Ok(None) => {
            tracing::warn!(user_id = %user_id, "Session user not found");
            unauthorized_response(LOGIN_REQUIRED)
        }
        Err(err) => err.into_response(),
    }
}

/// Perform constant-time string comparison.
pub(crate) fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn unauthorized_response(message: &str) -> Response {
    AppError::Unauthorized(message.to_string()).into_response()
}
