//! Configuration module for the Cuisinova backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Error raised when an environment variable holds a malformed value.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// OpenAI API settings.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub chat_model: String,
    pub image_model: String,
    pub tts_model: String,
}

/// S3 bucket settings for generated images and narration audio.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub region: String,
    pub bucket: Option<String>,
    /// Endpoint objects are PUT to (virtual-hosted bucket URL by default)
    pub endpoint: Option<String>,
    /// Base URL handed back to clients for uploaded objects
    pub public_url: Option<String>,
}

/// PayMongo settings.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub secret_key: Option<String>,
    pub base_url: String,
    pub webhook_secret: Option<String>,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for API authentication (required in production)
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Public URL of the web front end, used for checkout redirects
    pub public_url: String,
    /// Owned recipes allowed before a subscription is required
    pub free_recipe_limit: i64,
    /// Per-user cap on audited AI calls; `None` disables the check
    pub ai_request_limit: Option<i64>,
    pub openai: OpenAiConfig,
    pub storage: StorageConfig,
    pub payment: PaymentConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let api_psk = env::var("CUISINOVA_API_PSK").ok();

        let db_path = env::var("CUISINOVA_DB_PATH")
            .unwrap_or_else(|_| "./data/cuisinova.sqlite".to_string())
            .into();

        let bind_raw =
            env::var("CUISINOVA_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let bind_addr = bind_raw.parse().map_err(|_| ConfigError::Invalid {
            name: "CUISINOVA_BIND_ADDR",
            value: bind_raw.clone(),
        })?;

        let log_level = env::var("CUISINOVA_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let public_url = env::var("CUISINOVA_PUBLIC_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        let free_recipe_limit =
            parse_var("CUISINOVA_FREE_RECIPE_LIMIT")?.unwrap_or(DEFAULT_FREE_RECIPE_LIMIT);
        let ai_request_limit = parse_var("CUISINOVA_AI_REQUEST_LIMIT")?;

        let openai = OpenAiConfig {
            api_key: env::var("OPENAI_API_KEY").ok(),
            base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com".to_string()),
            chat_model: env::var("OPENAI_CHAT_MODEL")
                .unwrap_or_else(|_| "gpt-3.5-turbo".to_string()),
            image_model: env::var("OPENAI_IMAGE_MODEL").unwrap_or_else(|_| "dall-e-2".to_string()),
            tts_model: env::var("OPENAI_TTS_MODEL").unwrap_or_else(|_| "tts-1".to_string()),
        };

        let storage = StorageConfig {
            access_key_id: env::var("AWS_ACCESS_KEY_ID").ok(),
            secret_access_key: env::var("AWS_SECRET_ACCESS_KEY").ok(),
            region: env::var("AWS_REGION").unwrap_or_else(|_| "ap-southeast-2".to_string()),
            bucket: env::var("S3_BUCKET_NAME").ok(),
            endpoint: env::var("S3_ENDPOINT").ok(),
            public_url: env::var("S3_PUBLIC_URL").ok(),
        };

        let payment = PaymentConfig {
            secret_key: env::var("PAYMONGO_SECRET_KEY").ok(),
            base_url: env::var("PAYMONGO_BASE_URL")
                .unwrap_or_else(|_| "https://api.paymongo.com".to_string()),
            webhook_secret: env::var("PAYMONGO_WEBHOOK_SECRET").ok(),
        };

        Ok(Self {
            api_psk,
            db_path,
            bind_addr,
            log_level,
            public_url,
            free_recipe_limit,
            ai_request_limit,
            openai,
            storage,
            payment,
        })
    }
}

const DEFAULT_FREE_RECIPE_LIMIT: i64 = 10;

fn parse_var(name: &'static str) -> Result<Option<i64>, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(None),
    }
}
