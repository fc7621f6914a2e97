//! AI features built on OpenAI.
//!
//! [`AiService`] wraps the OpenAI client with the application's rules: which model and
//! token budget each feature uses, where a failure degrades to a fallback value instead
//! of an error, and the audit log every call is written to.

mod client;
pub mod prompts;

pub use client::*;

use std::sync::Arc;

use async_openai::types::ImageSize;
use futures::future::join_all;
use rand::seq::SliceRandom;
use serde::Serialize;

use crate::config::OpenAiConfig;
use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{IngredientInput, NewRecipe, Recipe, FALLBACK_IMAGE};

const IMAGE_SIZE: ImageSize = ImageSize::S1024x1024;
const RECIPE_MAX_TOKENS: u32 = 1500;
const VALIDATION_MAX_TOKENS: u32 = 800;
const NARRATION_MAX_TOKENS: u32 = 1500;
const TAGGING_MAX_TOKENS: u32 = 1500;
const CHAT_MAX_TOKENS: u32 = 1000;

/// Prompt id handed out when the audit write for a generation failed.
pub const NULL_PROMPT_ID: &str = "null-prompt-id";

/// Reply sent whenever the chat assistant cannot produce an answer.
pub const CHAT_FALLBACK_REPLY: &str = "Sorry, I had trouble responding.";

const NARRATION_VOICES: [&str; 6] = ["alloy", "echo", "fable", "onyx", "nova", "shimmer"];

/// Raw recipe generation output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedRecipes {
    /// Completion text, expected to be a JSON array of recipes
    pub recipes: Option<String>,
    pub openai_prompt_id: String,
}

/// Generated image link for one recipe.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecipeImage {
    pub img_link: String,
    pub name: String,
}

/// Chat assistant answer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub reply: String,
    pub total_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reached_limit: Option<bool>,
}

impl ChatReply {
    fn fallback() -> Self {
        Self {
            reply: CHAT_FALLBACK_REPLY.to_string(),
            total_tokens: 0,
            reached_limit: None,
        }
    }
}

/// Parsed answer of the ingredient validation prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngredientVerdict {
    pub is_valid: bool,
    pub possible_variations: Vec<String>,
}

/// OpenAI-backed features with audit logging and the optional usage limit.
pub struct AiService {
    client: OpenAiClient,
    repo: Arc<Repository>,
    chat_model: String,
    image_model: String,
    tts_model: String,
    request_limit: Option<i64>,
}

impl AiService {
    pub fn new(config: &OpenAiConfig, repo: Arc<Repository>, request_limit: Option<i64>) -> Self {
        Self {
            client: OpenAiClient::new(config),
            repo,
            chat_model: config.chat_model.clone(),
            image_model: config.image_model.clone(),
            tts_model: config.tts_model.clone(),
            request_limit,
        }
    }

    /// Generate three recipes for the given ingredients.
    pub async fn generate_recipe(
        &self,
        ingredients: &[IngredientInput],
        dietary_preferences: &[String],
        user_id: &str,
    ) -> Result<GeneratedRecipes, AppError> {
        self.ensure_within_limit(user_id).await?;

        let prompt = prompts::recipe_generation(ingredients, dietary_preferences);
        let completion = self
            .client
            .chat(
                &self.chat_model,
                &[ChatMessage::user(prompt.as_str())],
                RECIPE_MAX_TOKENS,
            )
            .await?;

        tracing::info!(
            user_id,
            model = %self.chat_model,
            tokens = completion.total_tokens,
            "Generated recipes"
        );

        let openai_prompt_id = self
            .record(user_id, &prompt, &completion.raw, &self.chat_model)
            .await
            .unwrap_or_else(|| NULL_PROMPT_ID.to_string());

        Ok(GeneratedRecipes {
            recipes: completion.content,
            openai_prompt_id,
        })
    }

    /// Generate one image per recipe, in input order.
    ///
    /// Never fails: a recipe whose image could not be generated gets [`FALLBACK_IMAGE`].
    pub async fn generate_images(&self, recipes: &[NewRecipe], user_id: &str) -> Vec<RecipeImage> {
        let calls = recipes.iter().map(|recipe| {
            let prompt = prompts::image_generation(&recipe.name, &recipe.ingredients);
            async move {
                self.client
                    .generate_image(&self.image_model, &prompt, IMAGE_SIZE)
                    .await
            }
        });
        let results = join_all(calls).await;

        let mut raw_responses = Vec::with_capacity(results.len());
        let images: Vec<RecipeImage> = recipes
            .iter()
            .zip(results)
            .map(|(recipe, result)| {
                let url = match result {
                    Ok(image) => {
                        raw_responses.push(image.raw);
                        image.url
                    }
                    Err(err) => {
                        raw_responses.push(serde_json::Value::Null);
                        tracing::error!(recipe = %recipe.name, error = %err, "Image generation failed");
                        None
                    }
                };
                RecipeImage {
                    img_link: url.unwrap_or_else(|| {
                        tracing::warn!(recipe = %recipe.name, "Using fallback image");
                        FALLBACK_IMAGE.to_string()
                    }),
                    name: recipe.name.clone(),
                }
            })
            .collect();

        let names = recipes
            .iter()
            .map(|r| r.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        self.record_detached(
            user_id,
            format!("Image generation for recipe names {names} (note: not exact prompt)"),
            serde_json::Value::Array(raw_responses),
            &self.image_model,
        );

        images
    }

    /// Ask the model whether `name` is a real ingredient; returns the raw answer.
    pub async fn validate_ingredient(
        &self,
        name: &str,
        user_id: &str,
    ) -> Result<Option<String>, AppError> {
        self.ensure_within_limit(user_id).await?;

        let prompt = prompts::ingredient_validation(name);
        let completion = self
            .client
            .chat(
                &self.chat_model,
                &[ChatMessage::user(prompt.as_str())],
                VALIDATION_MAX_TOKENS,
            )
            .await?;

        self.record_detached(user_id, prompt, completion.raw, &self.chat_model);
        Ok(completion.content)
    }

    /// Narrate a recipe and synthesize it to mp3 with a random voice.
    pub async fn narrate(&self, recipe: &Recipe, user_id: &str) -> Result<Vec<u8>, AppError> {
        self.ensure_within_limit(user_id).await?;

        let prompt = prompts::recipe_narration(recipe);
        tracing::info!(recipe_id = %recipe.id, "Requesting narration text");
        let completion = self
            .client
            .chat(
                &self.chat_model,
                &[ChatMessage::user(prompt.as_str())],
                NARRATION_MAX_TOKENS,
            )
            .await?;
        self.record_detached(user_id, prompt, completion.raw, &self.chat_model);

        let text = completion
            .content
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                AppError::Upstream("Unable to get text for recipe narration".to_string())
            })?;

        let voice = pick_voice();
        tracing::info!(recipe_id = %recipe.id, voice, "Requesting narration audio");
        let audio = self.client.speech(&self.tts_model, voice, &text).await?;

        self.record_detached(
            user_id,
            text,
            serde_json::json!({ "voice": voice, "bytes": audio.len() }),
            &self.tts_model,
        );

        Ok(audio)
    }

    /// Generate and store search tags for a freshly saved recipe.
    ///
    /// Runs detached from the request; every failure is logged and swallowed.
    pub async fn generate_recipe_tags(&self, recipe: &Recipe, user_id: &str) {
        match self.reached_limit(user_id).await {
            Ok(None) => {}
            Ok(Some(limit)) => {
                tracing::warn!(user_id, limit, "AI request limit reached, skipping tags");
                return;
            }
            Err(err) => {
                tracing::error!(recipe_id = %recipe.id, error = %err, "Failed to check AI usage");
                return;
            }
        }

        let prompt = prompts::recipe_tagging(recipe);
        let completion = match self
            .client
            .chat(
                &self.chat_model,
                &[ChatMessage::user(prompt.as_str())],
                TAGGING_MAX_TOKENS,
            )
            .await
        {
            Ok(completion) => completion,
            Err(err) => {
                tracing::error!(recipe_id = %recipe.id, error = %err, "Failed to generate tags");
                return;
            }
        };
        self.record(user_id, &prompt, &completion.raw, &self.chat_model)
            .await;

        let tags = parse_tags(completion.content.as_deref(), recipe);
        if tags.is_empty() {
            return;
        }

        tracing::info!(recipe_id = %recipe.id, tags = ?tags, "Adding generated tags");
        if let Err(err) = self.repo.set_recipe_tags(&recipe.id, &tags).await {
            tracing::error!(recipe_id = %recipe.id, error = %err, "Failed to store tags");
        }
    }

    /// Answer a chat message about `recipe`.
    ///
    /// Never fails: errors produce [`CHAT_FALLBACK_REPLY`] with zero tokens.
    pub async fn chat_response(
        &self,
        message: &str,
        recipe: &Recipe,
        history: &[ChatMessage],
        user_id: &str,
    ) -> ChatReply {
        match self.reached_limit(user_id).await {
            Ok(None) => {}
            Ok(Some(limit)) => {
                return ChatReply {
                    reply: format!(
                        "You have reached your limit of {limit} AI-generated content. Please try again later."
                    ),
                    total_tokens: 0,
                    reached_limit: Some(true),
                };
            }
            Err(err) => {
                tracing::error!(user_id, error = %err, "Failed to check AI usage");
                return ChatReply::fallback();
            }
        }

        let messages = chat_messages(message, recipe, history);
        let completion = match self
            .client
            .chat(&self.chat_model, &messages, CHAT_MAX_TOKENS)
            .await
        {
            Ok(completion) => completion,
            Err(err) => {
                tracing::error!(recipe_id = %recipe.id, error = %err, "Chat completion failed");
                return ChatReply::fallback();
            }
        };

        // Only the opening exchange of a session is audited
        if history.len() == 1 {
            self.record_detached(
                user_id,
                format!(
                    "Chat session started for recipe: {}, first message: {}",
                    recipe.name, message
                ),
                completion.raw,
                &self.chat_model,
            );
        }

        ChatReply {
            reply: completion
                .content
                .unwrap_or_else(|| CHAT_FALLBACK_REPLY.to_string()),
            total_tokens: completion.total_tokens,
            reached_limit: None,
        }
    }

    async fn reached_limit(&self, user_id: &str) -> Result<Option<i64>, AppError> {
        let Some(limit) = self.request_limit else {
            return Ok(None);
        };
        let used = self.repo.count_ai_responses(user_id).await?;
        Ok((used >= limit).then_some(limit))
    }

    async fn ensure_within_limit(&self, user_id: &str) -> Result<(), AppError> {
        match self.reached_limit(user_id).await? {
            Some(limit) => Err(AppError::LimitReached(format!(
                "You have reached your limit of {limit} AI-generated requests."
            ))),
            None => Ok(()),
        }
    }

    /// Write an audit entry and return its id, or `None` if the write failed.
    async fn record(
        &self,
        user_id: &str,
        prompt: &str,
        response: &serde_json::Value,
        model: &str,
    ) -> Option<String> {
        match self
            .repo
            .save_ai_response(user_id, prompt, response, Some(model))
            .await
        {
            Ok(record) => Some(record.id),
            Err(err) => {
                tracing::error!(user_id, error = %err, "Failed to save AI response");
                None
            }
        }
    }

    fn record_detached(
        &self,
        user_id: &str,
        prompt: String,
        response: serde_json::Value,
        model: &str,
    ) {
        let repo = self.repo.clone();
        let user_id = user_id.to_string();
        let model = model.to_string();
        tokio::spawn(async move {
            if let Err(err) = repo
                .save_ai_response(&user_id, &prompt, &response, Some(&model))
                .await
            {
                tracing::error!(user_id = %user_id, error = %err, "Failed to save AI response");
            }
        });
    }
}

fn pick_voice() -> &'static str {
    NARRATION_VOICES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(NARRATION_VOICES[0])
}

/// Build the chat transcript sent to the model.
///
/// Client-supplied system messages are dropped. The new message is appended unless the
/// history already ends with it.
fn chat_messages(message: &str, recipe: &Recipe, history: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(prompts::chat_system(recipe)));
    messages.extend(history.iter().filter(|m| m.role != Role::System).cloned());

    let already_sent = history
        .last()
        .is_some_and(|m| m.role == Role::User && m.content == message);
    if !already_sent {
        messages.push(ChatMessage::user(message));
    }
    messages
}

/// Tags used when the model's answer is not a JSON array of strings.
pub fn default_tags(recipe: &Recipe) -> Vec<String> {
    std::iter::once("recipe".to_string())
        .chain(std::iter::once(recipe.name.to_lowercase()))
        .chain(recipe.ingredients.iter().map(|i| i.name.to_lowercase()))
        .collect()
}

/// Lower-cased tags from a tagging answer; empty when the model returned nothing.
pub fn parse_tags(raw: Option<&str>, recipe: &Recipe) -> Vec<String> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Vec::new();
    };

    let tags = match serde_json::from_str::<Vec<String>>(prompts::strip_code_fence(raw)) {
        Ok(tags) => tags,
        Err(err) => {
            tracing::warn!(recipe_id = %recipe.id, error = %err, raw, "Malformed tags, using defaults");
            default_tags(recipe)
        }
    };

    tags.into_iter().map(|t| t.to_lowercase()).collect()
}

/// Parse the ingredient validation answer; `None` when it is not JSON.
///
/// Any JSON value other than an object reads as an invalid ingredient with no variations.
pub fn parse_ingredient_verdict(raw: &str) -> Option<IngredientVerdict> {
    let value: serde_json::Value = serde_json::from_str(prompts::strip_code_fence(raw)).ok()?;
    let Some(object) = value.as_object() else {
        return Some(IngredientVerdict {
            is_valid: false,
            possible_variations: Vec::new(),
        });
    };

    let is_valid = object
        .get("isValid")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);
    let possible_variations = object
        .get("possibleVariations")
        .and_then(serde_json::Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    Some(IngredientVerdict {
        is_valid,
        possible_variations,
    })
}
