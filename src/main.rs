//! Cuisinova Backend
//!
//! REST backend for AI recipe generation with SQLite persistence, OpenAI, S3 storage
//! and PayMongo subscriptions.

mod ai;
mod api;
mod auth;
mod config;
mod db;
mod errors;
mod models;
mod pagination;
mod payment;
mod storage;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ai::AiService;
use config::Config;
use db::Repository;
use payment::PayMongoClient;
use storage::ObjectStore;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub ai: Arc<AiService>,
    pub storage: Arc<ObjectStore>,
    pub payment: Arc<PayMongoClient>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire every service from the configuration and an open repository.
    pub fn new(config: Config, repo: Arc<Repository>) -> Self {
        let ai = AiService::new(&config.openai, repo.clone(), config.ai_request_limit);
        let storage = ObjectStore::new(&config.storage);
        let payment = PayMongoClient::new(&config.payment);

        Self {
            repo,
            ai: Arc::new(ai),
            storage: Arc::new(storage),
            payment: Arc::new(payment),
            config: Arc::new(config),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Cuisinova Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (CUISINOVA_API_PSK). Authentication is disabled!");
    }
    if config.openai.api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY is not set; AI features will fail");
    }
    if config.payment.secret_key.is_none() {
        tracing::warn!("PAYMONGO_SECRET_KEY is not set; payments will fail");
    }
    if config.payment.webhook_secret.is_none() {
        tracing::warn!("PAYMONGO_WEBHOOK_SECRET is not set; webhook signatures are not checked");
    }
    match config.ai_request_limit {
        Some(limit) => tracing::info!("AI request limit: {} per user", limit),
        None => tracing::info!("AI request limit disabled"),
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    let bind_addr = config.bind_addr;
    let state = AppState::new(config, repo);
    if !state.storage.is_configured() {
        tracing::warn!("S3 storage is not configured; images fall back to the logo");
    }

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone PSK for the auth layer
    let psk = state.config.api_psk.clone();

    // Routes acting for a signed-in user
    let session_routes = Router::new()
        // Recipes
        .route("/get-recipes", get(api::get_recipes))
        .route("/search-recipes", get(api::search_recipes))
        .route("/recipes/{id}", get(api::get_recipe))
        .route("/like-recipe", put(api::like_recipe))
        .route("/delete-recipe", delete(api::delete_recipe))
        // Generation
        .route("/generate-recipes", post(api::generate_recipes))
        .route("/save-recipes", post(api::save_recipes))
        .route("/tts", post(api::narrate_recipe))
        .route("/chat-assistant", post(api::chat_assistant))
        // Ingredients
        .route("/get-ingredients", get(api::get_ingredients))
        .route("/validate-ingredient", post(api::validate_ingredient))
        // Users and payments
        .route("/profile", get(api::get_profile))
        .route("/payment/initiate", post(api::initiate_payment))
        .layer(middleware::from_fn_with_state(
            state.repo.clone(),
            auth::session_layer,
        ));

    // API routes
    let api_routes = Router::new()
        .route("/auth/signin", post(api::sign_in))
        .merge(session_routes)
        // Apply PSK auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }))
        // Called by PayMongo, verified by signature instead
        .route("/payment/webhook", post(api::payment_webhook));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
